//! Locating the row list inside upstream payloads
//!
//! Every response is wrapped as `{"MRData": {"total": "...", "<X>Table": {"<List>": [...]}}}`.
//! Each collection has an explicit rule naming the table and list fields; a
//! scan for any `*Table` holding a list is only used when the rule misses, and
//! is logged when it triggers.

use serde_json::Value as Json;

/// Upstream collection with a known payload shape
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Collection {
    /// `CircuitTable.Circuits`
    Circuits,
    /// `SeasonTable.Seasons`
    Seasons,
    /// `ConstructorTable.Constructors`
    Constructors,
    /// `DriverTable.Drivers`
    Drivers,
    /// `RaceTable.Races` (races, results, qualifying, pit stops)
    Races,
    /// `StandingsTable.StandingsLists`
    Standings,
}

impl Collection {
    /// `(table field, list field)` under `MRData`
    pub fn rule(&self) -> (&'static str, &'static str) {
        match self {
            Collection::Circuits => ("CircuitTable", "Circuits"),
            Collection::Seasons => ("SeasonTable", "Seasons"),
            Collection::Constructors => ("ConstructorTable", "Constructors"),
            Collection::Drivers => ("DriverTable", "Drivers"),
            Collection::Races => ("RaceTable", "Races"),
            Collection::Standings => ("StandingsTable", "StandingsLists"),
        }
    }
}

/// Row list of `collection` in `payload`; empty when absent
pub fn extract_list<'a>(payload: &'a Json, collection: Collection) -> &'a [Json] {
    let Some(mr_data) = payload.get("MRData").and_then(Json::as_object) else {
        return &[];
    };
    let (table, list) = collection.rule();
    if let Some(items) = mr_data
        .get(table)
        .and_then(|t| t.get(list))
        .and_then(Json::as_array)
    {
        return items;
    }

    for (key, value) in mr_data {
        if !key.ends_with("Table") {
            continue;
        }
        let Some(fields) = value.as_object() else {
            continue;
        };
        if let Some((field, items)) = fields
            .iter()
            .find_map(|(field, v)| v.as_array().map(|items| (field, items)))
        {
            tracing::warn!(
                expected = %format!("{table}.{list}"),
                found = %format!("{key}.{field}"),
                "Payload did not match its extraction rule; using fallback scan"
            );
            return items;
        }
    }
    &[]
}

/// `MRData.total` as a number (upstream sends it as a string)
pub fn total(payload: &Json) -> u64 {
    match payload.get("MRData").and_then(|m| m.get("total")) {
        Some(Json::String(s)) => s.trim().parse().unwrap_or(0),
        Some(Json::Number(n)) => n.as_u64().unwrap_or(0),
        _ => 0,
    }
}

/// Nested list that upstream may collapse to a single object
pub fn as_list<'a>(value: Option<&'a Json>) -> Vec<&'a Json> {
    match value {
        Some(Json::Array(items)) => items.iter().collect(),
        Some(obj @ Json::Object(_)) => vec![obj],
        _ => Vec::new(),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rule_locates_each_collection() {
        let fixtures = [
            (Collection::Circuits, json!({"MRData": {"CircuitTable": {"Circuits": [{"circuitId": "monza"}]}}})),
            (Collection::Seasons, json!({"MRData": {"SeasonTable": {"Seasons": [{"season": "2024"}]}}})),
            (Collection::Constructors, json!({"MRData": {"ConstructorTable": {"Constructors": [{"constructorId": "ferrari"}]}}})),
            (Collection::Drivers, json!({"MRData": {"DriverTable": {"Drivers": [{"driverId": "leclerc"}]}}})),
            (Collection::Races, json!({"MRData": {"RaceTable": {"season": "2024", "Races": [{"round": "1"}]}}})),
            (Collection::Standings, json!({"MRData": {"StandingsTable": {"season": "2024", "StandingsLists": [{"round": "1"}]}}})),
        ];
        for (collection, payload) in fixtures {
            assert_eq!(extract_list(&payload, collection).len(), 1, "{collection:?}");
        }
    }

    #[test]
    fn fallback_scan_finds_renamed_list() {
        let payload = json!({"MRData": {"CircuitsTable": {"Items": [{"circuitId": "spa"}, {"circuitId": "imola"}]}}});
        assert_eq!(extract_list(&payload, Collection::Circuits).len(), 2);
    }

    #[test]
    fn missing_wrapper_yields_empty_list() {
        assert!(extract_list(&json!({}), Collection::Races).is_empty());
        assert!(extract_list(&json!({"MRData": {"total": "0"}}), Collection::Races).is_empty());
        assert!(extract_list(&json!({"MRData": {"RaceTable": {"Races": "nope"}}}), Collection::Races).is_empty());
    }

    #[test]
    fn total_accepts_string_and_number() {
        assert_eq!(total(&json!({"MRData": {"total": "58"}})), 58);
        assert_eq!(total(&json!({"MRData": {"total": 7}})), 7);
        assert_eq!(total(&json!({"MRData": {"total": "many"}})), 0);
        assert_eq!(total(&json!({})), 0);
    }

    #[test]
    fn single_object_is_treated_as_one_item_list() {
        let race = json!({"Results": {"position": "1"}});
        assert_eq!(as_list(race.get("Results")).len(), 1);
        assert!(as_list(race.get("PitStops")).is_empty());
    }
}
