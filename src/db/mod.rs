//! Database layer for f1-etl
//!
//! Handles SQLite persistence for the loaded entity tables and run provenance.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Store lifecycle, descriptor parsing, schema migrations
//! - [`tables`] - Row-set writes (replace / staged upsert) and counts
//! - [`runs`] - Run and run-table records

use crate::types::{LoadMode, RunId, RunStatus};
use sqlx::{FromRow, sqlite::SqlitePool};

mod migrations;
mod runs;
mod tables;

pub use migrations::StoreLocation;

/// Run record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub(crate) struct RunRow {
    pub run_id: String,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub status: String,
    pub source_url: String,
    pub mode: String,
}

/// One invocation of the loader
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    /// Run identifier
    pub run_id: RunId,
    /// Unix timestamp when the run started
    pub started_at: i64,
    /// Unix timestamp when the run ended (unset while running)
    pub ended_at: Option<i64>,
    /// Lifecycle state
    pub status: RunStatus,
    /// Upstream base URL the data came from
    pub source_url: String,
    /// Write mode used
    pub mode: LoadMode,
}

/// Rows loaded into one table during a run
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RunTable {
    /// Run identifier
    pub run_id: String,
    /// Target table
    pub table_name: String,
    /// Rows written
    pub rows_loaded: i64,
}

/// Database handle for f1-etl
#[derive(Debug)]
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
