//! Upstream payload fixtures and mock mounting helpers

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Wrap a table under `MRData` the way upstream does
pub fn mr_data(total: usize, table: &str, body: Value) -> Value {
    let mut data = json!({
        "limit": "100",
        "offset": "0",
        "total": total.to_string(),
    });
    data[table] = body;
    json!({ "MRData": data })
}

pub fn circuits() -> Value {
    mr_data(
        1,
        "CircuitTable",
        json!({"Circuits": [{
            "circuitId": "bahrain",
            "circuitName": "Bahrain International Circuit",
            "url": "http://en.wikipedia.org/wiki/Bahrain_International_Circuit",
            "Location": {"lat": "26.0325", "long": "50.5106", "locality": "Sakhir", "country": "Bahrain"}
        }]}),
    )
}

pub fn seasons() -> Value {
    mr_data(
        1,
        "SeasonTable",
        json!({"Seasons": [{"season": "2024", "url": "http://en.wikipedia.org/wiki/2024_Formula_One_World_Championship"}]}),
    )
}

pub fn constructors() -> Value {
    mr_data(
        1,
        "ConstructorTable",
        json!({"Constructors": [{
            "constructorId": "red_bull",
            "name": "Red Bull",
            "nationality": "Austrian",
            "url": "http://en.wikipedia.org/wiki/Red_Bull_Racing"
        }]}),
    )
}

pub fn drivers() -> Value {
    mr_data(
        1,
        "DriverTable",
        json!({"Drivers": [{
            "driverId": "max_verstappen",
            "permanentNumber": "33",
            "code": "VER",
            "givenName": "Max",
            "familyName": "Verstappen",
            "dateOfBirth": "1997-09-30",
            "nationality": "Dutch",
            "url": "http://en.wikipedia.org/wiki/Max_Verstappen"
        }]}),
    )
}

fn race_header() -> Value {
    json!({
        "season": "2024",
        "round": "1",
        "url": "http://en.wikipedia.org/wiki/2024_Bahrain_Grand_Prix",
        "raceName": "Bahrain Grand Prix",
        "Circuit": {"circuitId": "bahrain", "circuitName": "Bahrain International Circuit"},
        "date": "2024-03-02",
        "time": "15:00:00Z"
    })
}

fn race_with(key: &str, entries: Value) -> Value {
    let mut race = race_header();
    race[key] = entries;
    mr_data(1, "RaceTable", json!({"season": "2024", "Races": [race]}))
}

pub fn races() -> Value {
    mr_data(1, "RaceTable", json!({"season": "2024", "Races": [race_header()]}))
}

/// One classified finisher driving for `driver_id`
pub fn results_for(driver_id: &str) -> Value {
    race_with(
        "Results",
        json!([{
            "number": "1",
            "position": "1",
            "positionText": "1",
            "points": "26",
            "Driver": {"driverId": driver_id},
            "Constructor": {"constructorId": "red_bull"},
            "grid": "1",
            "laps": "57",
            "status": "Finished",
            "Time": {"millis": "5504742", "time": "1:31:44.742"},
            "FastestLap": {"rank": "1", "lap": "39", "Time": {"time": "1:32.608"}, "AverageSpeed": {"units": "kph", "speed": "210.383"}}
        }]),
    )
}

pub fn qualifying() -> Value {
    race_with(
        "QualifyingResults",
        json!([{
            "number": "1",
            "position": "1",
            "Driver": {"driverId": "max_verstappen"},
            "Constructor": {"constructorId": "red_bull"},
            "Q1": "1:30.031",
            "Q2": "1:29.374",
            "Q3": "1:29.179"
        }]),
    )
}

pub fn driver_standings() -> Value {
    mr_data(
        1,
        "StandingsTable",
        json!({"season": "2024", "StandingsLists": [{
            "season": "2024",
            "round": "1",
            "DriverStandings": [{
                "position": "1",
                "positionText": "1",
                "points": "26",
                "wins": "1",
                "Driver": {"driverId": "max_verstappen"}
            }]
        }]}),
    )
}

pub fn constructor_standings() -> Value {
    mr_data(
        1,
        "StandingsTable",
        json!({"season": "2024", "StandingsLists": [{
            "season": "2024",
            "round": "1",
            "ConstructorStandings": [{
                "position": "1",
                "positionText": "1",
                "points": "44",
                "wins": "1",
                "Constructor": {"constructorId": "red_bull"}
            }]
        }]}),
    )
}

/// Serve `body` for `GET {route}`
pub async fn mount_json(server: &MockServer, route: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mount a one-race 2024 season; everything not mounted (pit stops included) answers 404
///
/// Results are credited to `result_driver`, so an unknown driver produces a dangling reference.
pub async fn mount_season(server: &MockServer, result_driver: &str) {
    mount_json(server, "/circuits.json", circuits()).await;
    mount_json(server, "/seasons.json", seasons()).await;
    mount_json(server, "/constructors.json", constructors()).await;
    mount_json(server, "/drivers.json", drivers()).await;
    mount_json(server, "/2024/races.json", races()).await;
    mount_json(server, "/2024/1/results.json", results_for(result_driver)).await;
    mount_json(server, "/2024/1/qualifying.json", qualifying()).await;
    mount_json(server, "/2024/driverStandings.json", driver_standings()).await;
    mount_json(server, "/2024/constructorStandings.json", constructor_standings()).await;
}
