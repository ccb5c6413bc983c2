//! Core types for f1-etl

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Upstream entity handled by the pipeline
///
/// The set is fixed; each kind owns its raw row-file name and header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Race circuits (static)
    Circuits,
    /// Championship seasons (static)
    Seasons,
    /// Constructors (static)
    Constructors,
    /// Drivers (static)
    Drivers,
    /// Race calendar, one row per (year, round)
    Races,
    /// Race classification, extracted per (year, round)
    Results,
    /// Qualifying classification, extracted per (year, round)
    Qualifying,
    /// Pit stops, extracted per (year, round)
    PitStops,
    /// Constructor championship standings after each round
    ConstructorStandings,
    /// Driver championship standings after each round
    DriverStandings,
}

impl EntityKind {
    /// Every entity in extraction order
    pub const ALL: [EntityKind; 10] = [
        EntityKind::Circuits,
        EntityKind::Seasons,
        EntityKind::Constructors,
        EntityKind::Drivers,
        EntityKind::Races,
        EntityKind::Results,
        EntityKind::Qualifying,
        EntityKind::PitStops,
        EntityKind::ConstructorStandings,
        EntityKind::DriverStandings,
    ];

    /// Table / file stem for this entity
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Circuits => "circuits",
            EntityKind::Seasons => "seasons",
            EntityKind::Constructors => "constructors",
            EntityKind::Drivers => "drivers",
            EntityKind::Races => "races",
            EntityKind::Results => "results",
            EntityKind::Qualifying => "qualifying",
            EntityKind::PitStops => "pit_stops",
            EntityKind::ConstructorStandings => "constructor_standings",
            EntityKind::DriverStandings => "driver_standings",
        }
    }

    /// Raw row-file name (e.g. `results.csv`)
    pub fn file_name(&self) -> String {
        format!("{}.csv", self.name())
    }

    /// Progress file name for round-based entities
    pub fn progress_file(&self) -> String {
        format!("{}_progress.json", self.name())
    }

    /// Whether extraction walks `(year, round)` units tracked by the progress store
    pub fn is_round_based(&self) -> bool {
        matches!(
            self,
            EntityKind::Results | EntityKind::Qualifying | EntityKind::PitStops
        )
    }

    /// Fixed raw header for this entity's row file
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Circuits => &[
                "circuit_id",
                "circuit_ref",
                "circuit_name",
                "location",
                "country",
                "lat",
                "lng",
                "altitude",
                "url",
            ],
            EntityKind::Seasons => &["year", "url"],
            EntityKind::Constructors => &[
                "constructor_id",
                "constructor_ref",
                "constructor_name",
                "nationality",
                "url",
            ],
            EntityKind::Drivers => &[
                "driver_id",
                "driver_ref",
                "driver_number",
                "code",
                "forename",
                "surname",
                "dob",
                "nationality",
                "url",
            ],
            EntityKind::Races => &[
                "race_id",
                "year",
                "round",
                "circuit_ref",
                "race_name",
                "race_date",
                "race_time",
                "url",
            ],
            EntityKind::Results => &[
                "race_id",
                "driver_ref",
                "constructor_ref",
                "number",
                "grid",
                "position",
                "position_text",
                "position_order",
                "points",
                "laps",
                "time_result",
                "milliseconds",
                "fastest_lap",
                "fastest_lap_rank",
                "fastest_lap_time",
                "fastest_lap_speed",
                "status",
            ],
            EntityKind::Qualifying => &[
                "race_id",
                "driver_ref",
                "constructor_ref",
                "number",
                "position",
                "q1",
                "q2",
                "q3",
            ],
            EntityKind::PitStops => &[
                "race_id",
                "driver_ref",
                "stop",
                "lap",
                "time_of_day",
                "duration",
                "milliseconds",
            ],
            EntityKind::ConstructorStandings => &[
                "race_id",
                "constructor_ref",
                "points",
                "position",
                "position_text",
                "wins",
            ],
            EntityKind::DriverStandings => &[
                "race_id",
                "driver_ref",
                "points",
                "position",
                "position_text",
                "wins",
            ],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown entity: {s}"))
    }
}

/// Compose the race identifier used across tables (`2024`, round `1` → `202401`)
pub fn race_id(year: i32, round: u32) -> i64 {
    i64::from(year) * 100 + i64::from(round)
}

/// Split a race identifier back into `(year, round)`
pub fn split_race_id(race_id: i64) -> Option<(i32, u32)> {
    if race_id < 100 {
        return None;
    }
    let year = i32::try_from(race_id / 100).ok()?;
    let round = u32::try_from(race_id % 100).ok()?;
    Some((year, round))
}

/// Inclusive range of championship years
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    /// First year (inclusive)
    pub start: i32,
    /// Last year (inclusive)
    pub end: i32,
}

impl YearRange {
    /// Create a new range (may be empty if `start > end`)
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    /// Iterate over every year in the range
    pub fn years(&self) -> impl Iterator<Item = i32> {
        self.start..=self.end
    }

    /// True if the range contains no years
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Number of years covered
    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.end - self.start + 1) as usize
        }
    }

    /// True if `year` falls inside the range
    pub fn contains(&self, year: i32) -> bool {
        year >= self.start && year <= self.end
    }

    /// Clamp into `[earliest, latest]`; the flag reports whether anything moved
    pub fn clamp(&self, earliest: i32, latest: i32) -> (YearRange, bool) {
        let start = self.start.max(earliest);
        let end = self.end.min(latest);
        let clamped = start != self.start || end != self.end;
        (YearRange { start, end }, clamped)
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Type class of a scalar, as seen by schema contracts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeClass {
    /// Integer or float
    Numeric,
    /// Free text
    String,
    /// Calendar date
    Datetime,
    /// Missing value (compatible with every class)
    Null,
}

/// Scalar cell value of a row record
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing value
    #[default]
    Null,
    /// Integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Text
    Text(String),
    /// Calendar date
    Date(NaiveDate),
}

impl Value {
    /// Build a text value, mapping the empty string to `Null`
    pub fn text_or_null(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() { Value::Null } else { Value::Text(s) }
    }

    /// Type class for contract checks
    pub fn class(&self) -> TypeClass {
        match self {
            Value::Null => TypeClass::Null,
            Value::Int(_) | Value::Float(_) => TypeClass::Numeric,
            Value::Text(_) => TypeClass::String,
            Value::Date(_) => TypeClass::Datetime,
        }
    }

    /// True for `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view (floats with no fractional part and numeric text included)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Value::Text(s) => parse_int(s),
            _ => None,
        }
    }

    /// Float view (numeric text included)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text view
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Rendering used in row files; `Null` renders as the empty field
    pub fn to_field(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Text(s) => s.clone(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Strict integer parse: optional sign followed by digits only
pub(crate) fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// One upstream entity instance as a flat column → scalar mapping
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    /// Empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Set a column value
    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.0.insert(column.to_string(), value.into());
    }

    /// Column value, if the column is present
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Column value, treating absent columns as `Null`
    pub fn value(&self, column: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.0.get(column).unwrap_or(&NULL)
    }

    /// Mutable access to a column value
    pub fn get_mut(&mut self, column: &str) -> Option<&mut Value> {
        self.0.get_mut(column)
    }

    /// Whether the column is present
    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    /// Remove a column
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.0.remove(column)
    }

    /// Column names present in this row (sorted)
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Integer view of a column
    pub fn int(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    /// Text view of a column
    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }
}

/// Write mode applied by the loader
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Reset the store, then replace every table's contents
    #[default]
    FullRefresh,
    /// Upsert into existing contents by each table's declared key
    Incremental,
}

impl LoadMode {
    /// Stable storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadMode::FullRefresh => "full_refresh",
            LoadMode::Incremental => "incremental",
        }
    }
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full_refresh" => Ok(LoadMode::FullRefresh),
            "incremental" => Ok(LoadMode::Incremental),
            other => Err(format!("unknown load mode: {other}")),
        }
    }
}

/// Lifecycle state of a load run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Tables are being loaded
    Running,
    /// Every table loaded
    Success,
    /// At least one table load raised
    Failed,
}

impl RunStatus {
    /// Stable storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// Opaque identifier of a load run
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Borrow the inner token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn race_id_round_trips_through_split() {
        assert_eq!(race_id(2024, 1), 202401);
        assert_eq!(race_id(2021, 22), 202122);
        assert_eq!(split_race_id(202122), Some((2021, 22)));
        assert_eq!(split_race_id(7), None);
    }

    #[test]
    fn year_range_clamp_reports_movement() {
        let (range, clamped) = YearRange::new(2010, 2030).clamp(2015, 2025);
        assert_eq!(range, YearRange::new(2015, 2025));
        assert!(clamped);

        let (range, clamped) = YearRange::new(2018, 2020).clamp(2015, 2025);
        assert_eq!(range, YearRange::new(2018, 2020));
        assert!(!clamped);
    }

    #[test]
    fn year_range_empty_when_inverted() {
        let range = YearRange::new(2026, 2025);
        assert!(range.is_empty());
        assert_eq!(range.len(), 0);
        assert_eq!(range.years().count(), 0);
    }

    #[test]
    fn entity_kind_parses_from_table_name() {
        assert_eq!("pit_stops".parse::<EntityKind>(), Ok(EntityKind::PitStops));
        assert!("laps".parse::<EntityKind>().is_err());
        assert_eq!(EntityKind::Results.progress_file(), "results_progress.json");
        assert!(EntityKind::Qualifying.is_round_based());
        assert!(!EntityKind::Races.is_round_based());
    }

    #[test]
    fn value_rendering_is_stable() {
        assert_eq!(Value::Float(25.0).to_field(), "25");
        assert_eq!(Value::Float(52.07).to_field(), "52.07");
        assert_eq!(Value::Null.to_field(), "");
        let date = NaiveDate::from_ymd_opt(1997, 9, 30).unwrap();
        assert_eq!(Value::Date(date).to_field(), "1997-09-30");
    }

    #[test]
    fn value_numeric_views() {
        assert_eq!(Value::Text(" 42 ".into()).as_i64(), Some(42));
        assert_eq!(Value::Text("4a".into()).as_i64(), None);
        assert_eq!(Value::Float(3.0).as_i64(), Some(3));
        assert_eq!(Value::Float(3.5).as_i64(), None);
        assert_eq!(Value::Text("220.5".into()).as_f64(), Some(220.5));
    }

    #[test]
    fn row_value_defaults_to_null_for_absent_columns() {
        let row = Row::new().with("race_id", 202401_i64);
        assert_eq!(row.int("race_id"), Some(202401));
        assert!(row.value("points").is_null());
        assert!(!row.contains("points"));
    }

    #[test]
    fn run_status_parses_storage_names() {
        for status in [RunStatus::Running, RunStatus::Success, RunStatus::Failed] {
            assert_eq!(status.as_str().parse::<RunStatus>(), Ok(status));
        }
    }

    #[test]
    fn generated_run_ids_are_unique() {
        assert_ne!(RunId::generate(), RunId::generate());
    }
}
