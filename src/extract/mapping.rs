//! Upstream item → flat row mapping
//!
//! Only shape normalization happens here: nested identifiers are pulled up,
//! numeric-looking strings become numbers and absent optional fields get
//! defaults. No cross-table lookups.

use crate::types::{Row, Value, parse_int, race_id};
use regex::Regex;
use serde_json::Value as Json;
use std::sync::LazyLock;

use super::payload::as_list;

static LAP_TIME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(\d+):(\d+(?:\.\d+)?)$").ok());

/// Which standings list a standings payload carries
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StandingsKind {
    /// `ConstructorStandings` entries keyed by constructor
    Constructor,
    /// `DriverStandings` entries keyed by driver
    Driver,
}

fn scalar(item: &Json, key: &str) -> Option<String> {
    match item.get(key)? {
        Json::String(s) => Some(s.trim().to_string()),
        Json::Number(n) => Some(n.to_string()),
        Json::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn nested<'a>(item: &'a Json, key: &str) -> &'a Json {
    static NULL: Json = Json::Null;
    item.get(key).unwrap_or(&NULL)
}

fn text(item: &Json, key: &str) -> Value {
    scalar(item, key).map_or(Value::Null, Value::text_or_null)
}

fn int(item: &Json, key: &str) -> Value {
    scalar(item, key).and_then(|s| parse_int(&s)).into()
}

fn int_or(item: &Json, key: &str, default: i64) -> Value {
    Value::Int(scalar(item, key).and_then(|s| parse_int(&s)).unwrap_or(default))
}

fn float(item: &Json, key: &str) -> Value {
    scalar(item, key).and_then(|s| s.parse::<f64>().ok()).into()
}

fn float_or(item: &Json, key: &str, default: f64) -> Value {
    Value::Float(scalar(item, key).and_then(|s| s.parse().ok()).unwrap_or(default))
}

fn round_of(item: &Json, fallback: u32) -> u32 {
    scalar(item, "round")
        .and_then(|s| s.parse().ok())
        .unwrap_or(fallback)
}

/// Parse `"2.456"` or `"1:02.345"` into milliseconds
pub fn parse_duration_ms(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(secs) = raw.parse::<f64>() {
        return secs.is_finite().then(|| (secs * 1000.0).round() as i64);
    }
    let caps = LAP_TIME.as_ref()?.captures(raw)?;
    let minutes: f64 = caps.get(1)?.as_str().parse().ok()?;
    let seconds: f64 = caps.get(2)?.as_str().parse().ok()?;
    Some(((minutes * 60.0 + seconds) * 1000.0).round() as i64)
}

/// Circuit row without its surrogate id
pub fn circuit(item: &Json) -> Row {
    let location = nested(item, "Location");
    Row::new()
        .with("circuit_ref", text(item, "circuitId"))
        .with("circuit_name", text(item, "circuitName"))
        .with("location", text(location, "locality"))
        .with("country", text(location, "country"))
        .with("lat", float(location, "lat"))
        .with("lng", float(location, "long"))
        .with("altitude", float(location, "alt"))
        .with("url", text(item, "url"))
}

/// Season row
pub fn season(item: &Json) -> Row {
    Row::new()
        .with("year", int_or(item, "season", 0))
        .with("url", text(item, "url"))
}

/// Constructor row without its surrogate id
pub fn constructor(item: &Json) -> Row {
    Row::new()
        .with("constructor_ref", text(item, "constructorId"))
        .with("constructor_name", text(item, "name"))
        .with("nationality", text(item, "nationality"))
        .with("url", text(item, "url"))
}

/// Driver row without its surrogate id
pub fn driver(item: &Json) -> Row {
    Row::new()
        .with("driver_ref", text(item, "driverId"))
        .with("driver_number", int(item, "permanentNumber"))
        .with("code", text(item, "code"))
        .with("forename", text(item, "givenName"))
        .with("surname", text(item, "familyName"))
        .with("dob", text(item, "dateOfBirth"))
        .with("nationality", text(item, "nationality"))
        .with("url", text(item, "url"))
}

/// Race calendar row for `year`
pub fn race(year: i32, item: &Json) -> Row {
    let round = round_of(item, 0);
    let race_time = scalar(item, "time")
        .map(|t| t.trim_end_matches('Z').to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "00:00:00".to_string());
    Row::new()
        .with("race_id", race_id(year, round))
        .with("year", year)
        .with("round", round)
        .with("circuit_ref", text(nested(item, "Circuit"), "circuitId"))
        .with("race_name", text(item, "raceName"))
        .with("race_date", text(item, "date"))
        .with("race_time", race_time)
        .with("url", text(item, "url"))
}

/// Classification rows of one race payload
pub fn results(year: i32, fallback_round: u32, race: &Json) -> Vec<Row> {
    let race_id = race_id(year, round_of(race, fallback_round));
    as_list(race.get("Results"))
        .into_iter()
        .map(|result| {
            let fastest = nested(result, "FastestLap");
            let position = scalar(result, "position").and_then(|p| parse_int(&p));
            Row::new()
                .with("race_id", race_id)
                .with("driver_ref", text(nested(result, "Driver"), "driverId"))
                .with("constructor_ref", text(nested(result, "Constructor"), "constructorId"))
                .with("number", int(result, "number"))
                .with("grid", int(result, "grid"))
                .with("position", position)
                .with("position_text", text(result, "positionText"))
                .with("position_order", position.unwrap_or(999))
                .with("points", float_or(result, "points", 0.0))
                .with("laps", int(result, "laps"))
                .with("time_result", text(nested(result, "Time"), "time"))
                .with("milliseconds", int(nested(result, "Time"), "millis"))
                .with("fastest_lap", int(fastest, "lap"))
                .with("fastest_lap_rank", int(fastest, "rank"))
                .with("fastest_lap_time", text(nested(fastest, "Time"), "time"))
                .with("fastest_lap_speed", text(nested(fastest, "AverageSpeed"), "speed"))
                .with(
                    "status",
                    scalar(result, "status").unwrap_or_else(|| "Finished".to_string()),
                )
        })
        .collect()
}

/// Qualifying rows of one race payload
pub fn qualifying(year: i32, fallback_round: u32, race: &Json) -> Vec<Row> {
    let race_id = race_id(year, round_of(race, fallback_round));
    as_list(race.get("QualifyingResults"))
        .into_iter()
        .map(|entry| {
            Row::new()
                .with("race_id", race_id)
                .with("driver_ref", text(nested(entry, "Driver"), "driverId"))
                .with("constructor_ref", text(nested(entry, "Constructor"), "constructorId"))
                .with("number", int(entry, "number"))
                .with("position", int(entry, "position"))
                .with("q1", text(entry, "Q1"))
                .with("q2", text(entry, "Q2"))
                .with("q3", text(entry, "Q3"))
        })
        .collect()
}

/// Pit stop rows of one race payload
pub fn pit_stops(year: i32, fallback_round: u32, race: &Json) -> Vec<Row> {
    let race_id = race_id(year, round_of(race, fallback_round));
    as_list(race.get("PitStops"))
        .into_iter()
        .map(|stop| {
            let duration = scalar(stop, "duration").unwrap_or_default();
            Row::new()
                .with("race_id", race_id)
                .with("driver_ref", text(nested(stop, "Driver"), "driverId"))
                .with("stop", int_or(stop, "stop", 0))
                .with("lap", int_or(stop, "lap", 0))
                .with("time_of_day", text(stop, "time"))
                .with("milliseconds", parse_duration_ms(&duration))
                .with("duration", Value::text_or_null(duration))
        })
        .collect()
}

/// Standings rows of one `StandingsLists` entry; rounds ≤ 0 yield nothing
pub fn standings(year: i32, list: &Json, kind: StandingsKind) -> Vec<Row> {
    let round = scalar(list, "round").and_then(|s| parse_int(&s)).unwrap_or(0);
    let Ok(round) = u32::try_from(round) else {
        return Vec::new();
    };
    if round == 0 {
        return Vec::new();
    }
    let race_id = race_id(year, round);
    let (entries, owner, owner_id, ref_column) = match kind {
        StandingsKind::Constructor => (
            "ConstructorStandings",
            "Constructor",
            "constructorId",
            "constructor_ref",
        ),
        StandingsKind::Driver => ("DriverStandings", "Driver", "driverId", "driver_ref"),
    };
    as_list(list.get(entries))
        .into_iter()
        .map(|entry| {
            Row::new()
                .with("race_id", race_id)
                .with(ref_column, text(nested(entry, owner), owner_id))
                .with("points", float_or(entry, "points", 0.0))
                .with("position", int_or(entry, "position", 0))
                .with("position_text", text(entry, "positionText"))
                .with("wins", int_or(entry, "wins", 0))
        })
        .collect()
}
