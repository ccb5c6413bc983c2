//! Reference resolution between raw and processed row files
//!
//! Raw files carry upstream references (`circuit_ref`, `driver_ref`,
//! `constructor_ref`) and result status text. The transform step swaps them for
//! surrogate ids, fills per-table defaults and writes `{table}_clean.csv` under
//! the processed directory with each table's contract header.
//!
//! Child tables keep the raw driver or constructor reference next to its id.
//! Their keys use the reference, so two unresolved entries in one race stay
//! apart even though both carry [`UNMAPPED_ID`].

use crate::config::PathsConfig;
use crate::error::Result;
use crate::extract::parse_duration_ms;
use crate::output::{self, OutputHealth};
use crate::schema;
use crate::types::{EntityKind, Row, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Status id applied to status text with no known id ("Retired")
pub const DEFAULT_STATUS_ID: i64 = 14;

/// Id applied to references that cannot be resolved
pub const UNMAPPED_ID: i64 = 0;

const STATUS_IDS: [(&str, i64); 9] = [
    ("Finished", 1),
    ("Disqualified", 2),
    ("Accident", 3),
    ("Collision", 4),
    ("Engine", 5),
    ("+1 Lap", 11),
    ("+2 Laps", 12),
    ("+3 Laps", 13),
    ("Retired", 14),
];

/// Outcome of resolving one reference
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Reference has a known id
    Mapped(i64),
    /// Reference is unknown (or absent); `default` was applied instead
    Unmapped {
        /// Reference as found in the raw row (empty when absent)
        reference: String,
        /// Id written in its place
        default: i64,
    },
}

impl Resolution {
    /// Id to write, mapped or not
    pub fn id(&self) -> i64 {
        match self {
            Resolution::Mapped(id) => *id,
            Resolution::Unmapped { default, .. } => *default,
        }
    }

    /// True for [`Resolution::Mapped`]
    pub fn is_mapped(&self) -> bool {
        matches!(self, Resolution::Mapped(_))
    }
}

/// Map result status text to its status id
pub fn resolve_status(status: &Value) -> Resolution {
    let text = status.as_str().unwrap_or_default();
    STATUS_IDS
        .iter()
        .find(|(name, _)| *name == text)
        .map(|(_, id)| Resolution::Mapped(*id))
        .unwrap_or_else(|| Resolution::Unmapped {
            reference: text.to_string(),
            default: DEFAULT_STATUS_ID,
        })
}

/// Lookup from upstream reference to surrogate id
#[derive(Debug, Default)]
struct RefIndex {
    ids: HashMap<String, i64>,
}

impl RefIndex {
    fn build(rows: &[Row], ref_column: &str, id_column: &str) -> Self {
        let ids = rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| {
                let reference = row.text(ref_column)?;
                let id = row.int(id_column).unwrap_or(i as i64 + 1);
                Some((reference.to_string(), id))
            })
            .collect();
        Self { ids }
    }

    fn resolve(&self, reference: &Value) -> Resolution {
        let text = reference.as_str().unwrap_or_default();
        match self.ids.get(text) {
            Some(id) => Resolution::Mapped(*id),
            None => Resolution::Unmapped {
                reference: text.to_string(),
                default: UNMAPPED_ID,
            },
        }
    }
}

/// Per-table outcome of the transform step
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableTransform {
    /// Rows written to the processed file
    pub rows: usize,
    /// Unresolved lookups per target column
    pub unmapped: BTreeMap<String, usize>,
}

/// Outcome of [`Transformer::transform_all`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransformReport {
    /// Outcome per table
    pub tables: BTreeMap<String, TableTransform>,
}

impl TransformReport {
    /// Rows written for `table`
    pub fn rows(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.rows)
    }

    /// Unresolved lookups for `table.column`
    pub fn unmapped(&self, table: &str, column: &str) -> usize {
        self.tables
            .get(table)
            .and_then(|t| t.unmapped.get(column))
            .copied()
            .unwrap_or(0)
    }

    /// Unresolved lookups across every table
    pub fn total_unmapped(&self) -> usize {
        self.tables
            .values()
            .flat_map(|t| t.unmapped.values())
            .sum()
    }
}

/// Collects unresolved references for one table while it is being shaped
#[derive(Default)]
struct Tally {
    unmapped: BTreeMap<String, BTreeSet<String>>,
    counts: BTreeMap<String, usize>,
}

impl Tally {
    fn apply(&mut self, row: &mut Row, column: &str, resolution: Resolution) {
        row.set(column, resolution.id());
        if let Resolution::Unmapped { reference, .. } = resolution {
            *self.counts.entry(column.to_string()).or_default() += 1;
            self.unmapped
                .entry(column.to_string())
                .or_default()
                .insert(reference);
        }
    }

    fn finish(self, table: &str, rows: usize) -> TableTransform {
        for (column, references) in &self.unmapped {
            let count = self.counts.get(column).copied().unwrap_or(0);
            let sample: Vec<&str> = references.iter().take(5).map(String::as_str).collect();
            tracing::warn!(
                table,
                column = column.as_str(),
                count,
                references = ?sample,
                "Unmapped references replaced by default id"
            );
        }
        TableTransform {
            rows,
            unmapped: self.counts,
        }
    }
}

fn fill(row: &mut Row, column: &str, default: impl Into<Value>) {
    if row.value(column).is_null() {
        row.set(column, default);
    }
}

fn int_or(row: &mut Row, column: &str, default: i64) {
    let value = row.value(column).as_f64().map_or(default, |v| v.round() as i64);
    row.set(column, value);
}

/// Turns raw row files into processed row files
#[derive(Clone, Debug)]
pub struct Transformer {
    raw_dir: PathBuf,
    processed_dir: PathBuf,
    min_output_bytes: u64,
}

impl Transformer {
    /// Create a transformer over the configured raw and processed directories
    pub fn new(paths: &PathsConfig, min_output_bytes: u64) -> Self {
        Self {
            raw_dir: paths.raw_dir.clone(),
            processed_dir: paths.processed_dir.clone(),
            min_output_bytes,
        }
    }

    /// Processed row file path of a table
    pub fn processed_path(&self, table: &str) -> PathBuf {
        processed_path(&self.processed_dir, table)
    }

    fn read_raw(&self, kind: EntityKind) -> Result<Vec<Row>> {
        let path = self.raw_dir.join(kind.file_name());
        match output::health_check(&path, self.min_output_bytes, 0) {
            OutputHealth::Missing | OutputHealth::Undersized { .. } => {
                tracing::warn!(entity = %kind, path = %path.display(), "Raw file empty or missing");
                Ok(Vec::new())
            }
            _ => output::read_rows(&path),
        }
    }

    fn write(&self, table: &str, rows: &[Row]) -> Result<()> {
        let columns = schema::contract(table).map_or(&[][..], |c| c.required);
        output::write_rows(&self.processed_path(table), columns, rows)?;
        tracing::info!(table, rows = rows.len(), "Transformed table");
        Ok(())
    }

    /// Transform every raw file, returning per-table row and unmapped counts
    pub fn transform_all(&self) -> Result<TransformReport> {
        std::fs::create_dir_all(&self.processed_dir)?;

        let circuits = self.read_raw(EntityKind::Circuits)?;
        let constructors = self.read_raw(EntityKind::Constructors)?;
        let drivers = self.read_raw(EntityKind::Drivers)?;

        let circuit_ids = RefIndex::build(&circuits, "circuit_ref", "circuit_id");
        let constructor_ids = RefIndex::build(&constructors, "constructor_ref", "constructor_id");
        let driver_ids = RefIndex::build(&drivers, "driver_ref", "driver_id");

        let mut report = TransformReport::default();
        let mut record = |table: &str, rows: Vec<Row>, tally: Tally| -> Result<()> {
            self.write(table, &rows)?;
            report
                .tables
                .insert(table.to_string(), tally.finish(table, rows.len()));
            Ok(())
        };

        record("circuits", transform_circuits(circuits), Tally::default())?;
        record("seasons", self.read_raw(EntityKind::Seasons)?, Tally::default())?;
        record(
            "constructors",
            with_ids(constructors, "constructor_id"),
            Tally::default(),
        )?;
        record("drivers", transform_drivers(drivers), Tally::default())?;

        let mut tally = Tally::default();
        let races = transform_races(self.read_raw(EntityKind::Races)?, &circuit_ids, &mut tally);
        record("races", races, tally)?;

        let mut tally = Tally::default();
        let results = transform_results(
            self.read_raw(EntityKind::Results)?,
            &driver_ids,
            &constructor_ids,
            &mut tally,
        );
        record("results", results, tally)?;

        let mut tally = Tally::default();
        let qualifying = transform_qualifying(
            self.read_raw(EntityKind::Qualifying)?,
            &driver_ids,
            &constructor_ids,
            &mut tally,
        );
        record("qualifying", qualifying, tally)?;

        let mut tally = Tally::default();
        let pit_stops =
            transform_pit_stops(self.read_raw(EntityKind::PitStops)?, &driver_ids, &mut tally);
        record("pit_stops", pit_stops, tally)?;

        let mut tally = Tally::default();
        let standings = transform_standings(
            self.read_raw(EntityKind::ConstructorStandings)?,
            ("constructor_ref", "constructor_id"),
            &constructor_ids,
            &mut tally,
        );
        record("constructor_standings", standings, tally)?;

        let mut tally = Tally::default();
        let standings = transform_standings(
            self.read_raw(EntityKind::DriverStandings)?,
            ("driver_ref", "driver_id"),
            &driver_ids,
            &mut tally,
        );
        record("driver_standings", standings, tally)?;

        tracing::info!(
            tables = report.tables.len(),
            unmapped = report.total_unmapped(),
            "Transform complete"
        );
        Ok(report)
    }
}

/// Processed row file path of `table` under `dir`
pub fn processed_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{table}_clean.csv"))
}

fn with_ids(mut rows: Vec<Row>, id_column: &str) -> Vec<Row> {
    for (i, row) in rows.iter_mut().enumerate() {
        fill(row, id_column, i as i64 + 1);
    }
    rows
}

fn transform_circuits(rows: Vec<Row>) -> Vec<Row> {
    let mut rows = with_ids(rows, "circuit_id");
    for row in &mut rows {
        fill(row, "altitude", 0);
    }
    rows
}

fn transform_drivers(rows: Vec<Row>) -> Vec<Row> {
    let mut rows = with_ids(rows, "driver_id");
    for row in &mut rows {
        int_or(row, "driver_number", 0);
    }
    rows
}

fn transform_races(mut rows: Vec<Row>, circuits: &RefIndex, tally: &mut Tally) -> Vec<Row> {
    for row in &mut rows {
        fill(row, "race_time", "00:00:00");
        let resolution = circuits.resolve(row.value("circuit_ref"));
        tally.apply(row, "circuit_id", resolution);
    }
    rows
}

fn transform_results(
    mut rows: Vec<Row>,
    drivers: &RefIndex,
    constructors: &RefIndex,
    tally: &mut Tally,
) -> Vec<Row> {
    for row in &mut rows {
        let driver = drivers.resolve(row.value("driver_ref"));
        tally.apply(row, "driver_id", driver);
        let constructor = constructors.resolve(row.value("constructor_ref"));
        tally.apply(row, "constructor_id", constructor);

        for column in ["laps", "grid", "number", "fastest_lap", "fastest_lap_rank"] {
            int_or(row, column, 0);
        }
        fill(row, "points", 0);
        int_or(row, "milliseconds", 0);
        int_or(row, "position_order", 999);

        let status = resolve_status(row.value("status"));
        tally.apply(row, "status_id", status);
    }
    rows
}

fn transform_qualifying(
    mut rows: Vec<Row>,
    drivers: &RefIndex,
    constructors: &RefIndex,
    tally: &mut Tally,
) -> Vec<Row> {
    for row in &mut rows {
        let driver = drivers.resolve(row.value("driver_ref"));
        tally.apply(row, "driver_id", driver);
        let constructor = constructors.resolve(row.value("constructor_ref"));
        tally.apply(row, "constructor_id", constructor);

        for column in ["q1", "q2", "q3"] {
            fill(row, column, "");
        }
        int_or(row, "position", 0);
        int_or(row, "number", 0);
    }
    rows
}

fn transform_pit_stops(mut rows: Vec<Row>, drivers: &RefIndex, tally: &mut Tally) -> Vec<Row> {
    for row in &mut rows {
        let driver = drivers.resolve(row.value("driver_ref"));
        tally.apply(row, "driver_id", driver);
        fill(row, "time_of_day", "00:00:00");

        if row.value("milliseconds").is_null() {
            let derived = row.text("duration").and_then(parse_duration_ms);
            row.set("milliseconds", derived);
        }
        int_or(row, "milliseconds", 0);
    }
    rows
}

fn transform_standings(
    mut rows: Vec<Row>,
    (ref_column, id_column): (&str, &str),
    index: &RefIndex,
    tally: &mut Tally,
) -> Vec<Row> {
    for row in &mut rows {
        let resolution = index.resolve(row.value(ref_column));
        tally.apply(row, id_column, resolution);
        fill(row, "points", 0);
        fill(row, "wins", 0);
    }
    rows
}
