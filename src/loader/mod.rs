//! Loading processed row files into the relational store
//!
//! Each table goes through coercion, contract validation and a mode-dependent
//! write. [`Loader::load_all`] wraps the tables of one run in provenance
//! records: the run is `running` before the first table, every loaded table is
//! recorded, and the run ends `success` or `failed`.

mod coerce;

pub use coerce::{coerce, coerce_rows};

use crate::db::Database;
use crate::error::{Error, LoadError, Result};
use crate::output;
use crate::schema::{self, LOAD_ORDER};
use crate::transform::processed_path;
use crate::types::{LoadMode, Row, RunId, RunStatus};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Outcome of one load run
#[derive(Clone, Debug, PartialEq)]
pub struct LoadSummary {
    /// Run identifier recorded in the store
    pub run_id: RunId,
    /// Rows written per loaded table
    pub tables: BTreeMap<String, u64>,
    /// Tables skipped because their row set was empty
    pub skipped: Vec<String>,
}

impl LoadSummary {
    /// Rows written into `table` (zero when skipped)
    pub fn rows(&self, table: &str) -> u64 {
        self.tables.get(table).copied().unwrap_or(0)
    }
}

/// Applies row sets to a [`Database`]
pub struct Loader<'a> {
    db: &'a Database,
    mode: LoadMode,
    strict: bool,
    processed_dir: PathBuf,
}

impl<'a> Loader<'a> {
    /// Create a loader reading `{table}_clean.csv` files from `processed_dir`
    pub fn new(db: &'a Database, mode: LoadMode, strict: bool, processed_dir: impl Into<PathBuf>) -> Self {
        Self {
            db,
            mode,
            strict,
            processed_dir: processed_dir.into(),
        }
    }

    /// Write mode applied to every table
    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    /// Coerce, validate and write one row set
    ///
    /// Returns `None` when the row set is empty and the table was left alone.
    pub async fn load_table(&self, table: &str, columns: &[String], mut rows: Vec<Row>) -> Result<Option<u64>> {
        let contract = schema::contract(table)
            .ok_or_else(|| Error::Load(LoadError::UnknownTable(table.to_string())))?;

        if rows.is_empty() {
            tracing::warn!(table, "Skipping table with empty row set");
            return Ok(None);
        }

        coerce_rows(contract, &mut rows);
        let issues = schema::validate(table, columns, &rows);
        if !issues.is_empty() {
            let issues: Vec<String> = issues.iter().map(ToString::to_string).collect();
            if self.strict {
                return Err(Error::SchemaViolation {
                    table: table.to_string(),
                    issues,
                });
            }
            for issue in &issues {
                tracing::warn!(table, issue = issue.as_str(), "Schema contract issue");
            }
        }

        let written = match self.mode {
            LoadMode::FullRefresh => self.db.replace_rows(table, &rows).await?,
            LoadMode::Incremental => self.db.upsert_rows(table, &rows).await?,
        };
        tracing::info!(table, rows = written, mode = %self.mode, "Loaded table");
        Ok(Some(written))
    }

    /// Load the processed file of `table`
    pub async fn load_file(&self, table: &str) -> Result<Option<u64>> {
        let path = processed_path(&self.processed_dir, table);
        let rows = output::read_rows(&path)?;
        let columns = output::read_header(&path).unwrap_or_default();
        self.load_table(table, &columns, rows).await
    }

    /// Load every table in dependency order under one run record
    ///
    /// A generated run id is used when `run_id` is `None`. Any table failure
    /// marks the run failed and is returned to the caller.
    pub async fn load_all(&self, run_id: Option<RunId>, source_url: &str) -> Result<LoadSummary> {
        let run_id = run_id.unwrap_or_else(RunId::generate);
        self.db.start_run(&run_id, source_url, self.mode).await?;
        tracing::info!(run_id = %run_id, mode = %self.mode, "Load run started");

        let mut summary = LoadSummary {
            run_id: run_id.clone(),
            tables: BTreeMap::new(),
            skipped: Vec::new(),
        };
        let result = async {
            for table in LOAD_ORDER {
                match self.load_file(table).await? {
                    Some(rows) => {
                        self.db.upsert_run_table(&run_id, table, rows).await?;
                        summary.tables.insert(table.to_string(), rows);
                    }
                    None => summary.skipped.push(table.to_string()),
                }
            }
            Ok::<(), Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                self.db.finish_run(&run_id, RunStatus::Success).await?;
                tracing::info!(
                    run_id = %run_id,
                    tables = summary.tables.len(),
                    skipped = summary.skipped.len(),
                    "Load run succeeded"
                );
                Ok(summary)
            }
            Err(e) => {
                tracing::error!(run_id = %run_id, error = %e, "Load run failed");
                if let Err(finish) = self.db.finish_run(&run_id, RunStatus::Failed).await {
                    tracing::warn!(run_id = %run_id, error = %finish, "Failed to mark run as failed");
                }
                Err(e)
            }
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
