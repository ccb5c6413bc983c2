//! Declarative table contracts and row-set validation
//!
//! A contract names the columns a processed row set must carry, groups them by
//! type class and declares the table's uniqueness key. Validation never mutates
//! rows; coercion happens beforehand in the loader.

use crate::types::{Row, TypeClass};
use std::collections::BTreeSet;
use std::fmt;

/// Contract of one relational table
#[derive(Debug)]
pub struct TableContract {
    /// Table name
    pub table: &'static str,
    /// Columns every row set must carry, in processed-file order
    pub required: &'static [&'static str],
    /// Columns that must hold numbers
    pub numeric: &'static [&'static str],
    /// Columns that must hold text
    pub string: &'static [&'static str],
    /// Columns that must hold dates
    pub datetime: &'static [&'static str],
    /// Uniqueness key used by incremental upserts
    pub key: &'static [&'static str],
}

impl TableContract {
    /// Declared type class of a column, if any
    pub fn class_of(&self, column: &str) -> Option<TypeClass> {
        if self.numeric.contains(&column) {
            Some(TypeClass::Numeric)
        } else if self.string.contains(&column) {
            Some(TypeClass::String)
        } else if self.datetime.contains(&column) {
            Some(TypeClass::Datetime)
        } else {
            None
        }
    }
}

/// Tables in load order: referenced entities before the entities referencing them
pub const LOAD_ORDER: [&str; 10] = [
    "seasons",
    "circuits",
    "constructors",
    "drivers",
    "races",
    "results",
    "qualifying",
    "pit_stops",
    "constructor_standings",
    "driver_standings",
];

static CONTRACTS: [TableContract; 10] = [
    TableContract {
        table: "circuits",
        required: &[
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
        numeric: &["circuit_id", "lat", "lng", "altitude"],
        string: &["circuit_ref", "circuit_name", "location", "country", "url"],
        datetime: &[],
        key: &["circuit_id"],
    },
    TableContract {
        table: "seasons",
        required: &["year", "url"],
        numeric: &["year"],
        string: &["url"],
        datetime: &[],
        key: &["year"],
    },
    TableContract {
        table: "constructors",
        required: &[
            "constructor_id",
            "constructor_ref",
            "constructor_name",
            "nationality",
            "url",
        ],
        numeric: &["constructor_id"],
        string: &["constructor_ref", "constructor_name", "nationality", "url"],
        datetime: &[],
        key: &["constructor_id"],
    },
    TableContract {
        table: "drivers",
        required: &[
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
        numeric: &["driver_id", "driver_number"],
        string: &["driver_ref", "code", "forename", "surname", "nationality", "url"],
        datetime: &["dob"],
        key: &["driver_id"],
    },
    TableContract {
        table: "races",
        required: &[
            "race_id",
            "year",
            "round",
            "circuit_id",
            "race_name",
            "race_date",
            "race_time",
            "url",
        ],
        numeric: &["race_id", "year", "round", "circuit_id"],
        string: &["race_name", "race_time", "url"],
        datetime: &["race_date"],
        key: &["race_id"],
    },
    TableContract {
        table: "results",
        required: &[
            "race_id",
            "driver_id",
            "driver_ref",
            "constructor_id",
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
            "status_id",
            "status",
        ],
        numeric: &[
            "race_id",
            "driver_id",
            "constructor_id",
            "number",
            "grid",
            "position",
            "position_order",
            "points",
            "laps",
            "milliseconds",
            "fastest_lap",
            "fastest_lap_rank",
            "status_id",
        ],
        string: &[
            "driver_ref",
            "position_text",
            "time_result",
            "fastest_lap_time",
            "fastest_lap_speed",
            "status",
        ],
        datetime: &[],
        key: &["race_id", "driver_ref"],
    },
    TableContract {
        table: "qualifying",
        required: &[
            "race_id",
            "driver_id",
            "driver_ref",
            "constructor_id",
            "number",
            "position",
            "q1",
            "q2",
            "q3",
        ],
        numeric: &["race_id", "driver_id", "constructor_id", "number", "position"],
        string: &["driver_ref", "q1", "q2", "q3"],
        datetime: &[],
        key: &["race_id", "driver_ref"],
    },
    TableContract {
        table: "pit_stops",
        required: &[
            "race_id",
            "driver_id",
            "driver_ref",
            "stop",
            "lap",
            "time_of_day",
            "duration",
            "milliseconds",
        ],
        numeric: &["race_id", "driver_id", "stop", "lap", "milliseconds"],
        string: &["driver_ref", "time_of_day", "duration"],
        datetime: &[],
        key: &["race_id", "driver_ref", "stop"],
    },
    TableContract {
        table: "constructor_standings",
        required: &[
            "race_id",
            "constructor_id",
            "constructor_ref",
            "points",
            "position",
            "position_text",
            "wins",
        ],
        numeric: &["race_id", "constructor_id", "points", "position", "wins"],
        string: &["constructor_ref", "position_text"],
        datetime: &[],
        key: &["race_id", "constructor_ref"],
    },
    TableContract {
        table: "driver_standings",
        required: &[
            "race_id",
            "driver_id",
            "driver_ref",
            "points",
            "position",
            "position_text",
            "wins",
        ],
        numeric: &["race_id", "driver_id", "points", "position", "wins"],
        string: &["driver_ref", "position_text"],
        datetime: &[],
        key: &["race_id", "driver_ref"],
    },
];

/// Contract for `table`, if one is declared
pub fn contract(table: &str) -> Option<&'static TableContract> {
    CONTRACTS.iter().find(|c| c.table == table)
}

/// One contract violation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaIssue {
    /// Table has no declared contract
    NoContract(String),
    /// Required columns are absent from the row set
    MissingColumns(Vec<String>),
    /// A declared-numeric column holds non-numeric values
    NotNumeric(String),
    /// A declared-string column holds non-text values
    NotString(String),
    /// A declared-datetime column holds non-date values
    NotDatetime(String),
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaIssue::NoContract(table) => write!(f, "no schema contract defined for {table}"),
            SchemaIssue::MissingColumns(cols) => {
                write!(f, "missing required columns: {}", cols.join(", "))
            }
            SchemaIssue::NotNumeric(col) => write!(f, "{col} is not numeric"),
            SchemaIssue::NotString(col) => write!(f, "{col} is not string-like"),
            SchemaIssue::NotDatetime(col) => write!(f, "{col} is not datetime-like"),
        }
    }
}

/// Check a row set against the contract of `table`
///
/// `columns` is the row set's header; `Null` cells are compatible with every
/// type class.
pub fn validate(table: &str, columns: &[String], rows: &[Row]) -> Vec<SchemaIssue> {
    let Some(contract) = contract(table) else {
        return vec![SchemaIssue::NoContract(table.to_string())];
    };
    let present: BTreeSet<&str> = columns.iter().map(String::as_str).collect();

    let mut issues = Vec::new();
    let missing: Vec<String> = contract
        .required
        .iter()
        .filter(|col| !present.contains(*col))
        .map(|col| col.to_string())
        .collect();
    if !missing.is_empty() {
        issues.push(SchemaIssue::MissingColumns(missing));
    }

    let groups: [(&[&str], TypeClass, fn(String) -> SchemaIssue); 3] = [
        (contract.numeric, TypeClass::Numeric, SchemaIssue::NotNumeric),
        (contract.string, TypeClass::String, SchemaIssue::NotString),
        (contract.datetime, TypeClass::Datetime, SchemaIssue::NotDatetime),
    ];
    for (group, expected, issue) in groups {
        for column in group.iter().filter(|col| present.contains(*col)) {
            let conforms = rows.iter().all(|row| {
                let class = row.value(column).class();
                class == TypeClass::Null || class == expected
            });
            if !conforms {
                issues.push(issue(column.to_string()));
            }
        }
    }
    issues
}
