//! Run provenance: one record per loader invocation, one per table touched.

use crate::error::DatabaseError;
use crate::types::{LoadMode, RunId, RunStatus};
use crate::{Error, Result};

use super::{Database, RunRecord, RunRow, RunTable};

impl TryFrom<RunRow> for RunRecord {
    type Error = Error;

    fn try_from(row: RunRow) -> Result<Self> {
        let status = row
            .status
            .parse::<RunStatus>()
            .map_err(|e| Error::Database(DatabaseError::QueryFailed(e)))?;
        let mode = row
            .mode
            .parse::<LoadMode>()
            .map_err(|e| Error::Database(DatabaseError::QueryFailed(e)))?;
        Ok(RunRecord {
            run_id: RunId(row.run_id),
            started_at: row.started_at,
            ended_at: row.ended_at,
            status,
            source_url: row.source_url,
            mode,
        })
    }
}

impl Database {
    /// Record a run as `running`
    ///
    /// Re-starting an unfinished run id resets its start time; a finished run
    /// is immutable and cannot be started again.
    pub async fn start_run(&self, run_id: &RunId, source_url: &str, mode: LoadMode) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO runs (run_id, started_at, ended_at, status, source_url, mode)
            VALUES (?, ?, NULL, ?, ?, ?)
            ON CONFLICT(run_id) DO UPDATE SET
                started_at = excluded.started_at,
                status = excluded.status,
                source_url = excluded.source_url,
                mode = excluded.mode
            WHERE runs.ended_at IS NULL
            "#,
        )
        .bind(run_id.as_str())
        .bind(now)
        .bind(RunStatus::Running.as_str())
        .bind(source_url)
        .bind(mode.as_str())
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::QueryFailed(format!(
                "run {} has already finished",
                run_id
            ))));
        }
        Ok(())
    }

    /// Set the final status and end time of a running run
    pub async fn finish_run(&self, run_id: &RunId, status: RunStatus) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE runs SET status = ?, ended_at = ? WHERE run_id = ? AND ended_at IS NULL")
            .bind(status.as_str())
            .bind(now)
            .bind(run_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;
        Ok(())
    }

    /// Record how many rows a run wrote into a table (idempotent per run and table)
    pub async fn upsert_run_table(&self, run_id: &RunId, table: &str, rows_loaded: u64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO run_tables (run_id, table_name, rows_loaded)
            VALUES (?, ?, ?)
            ON CONFLICT(run_id, table_name) DO UPDATE SET rows_loaded = excluded.rows_loaded
            "#,
        )
        .bind(run_id.as_str())
        .bind(table)
        .bind(rows_loaded as i64)
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;
        Ok(())
    }

    /// Fetch a run record
    pub async fn get_run(&self, run_id: &RunId) -> Result<Option<RunRecord>> {
        let row = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT run_id, started_at, ended_at, status, source_url, mode
            FROM runs
            WHERE run_id = ?
            "#,
        )
        .bind(run_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        row.map(RunRecord::try_from).transpose()
    }

    /// Most recent runs first
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT run_id, started_at, ended_at, status, source_url, mode
            FROM runs
            ORDER BY started_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        rows.into_iter().map(RunRecord::try_from).collect()
    }

    /// Tables touched by a run, by name
    pub async fn list_run_tables(&self, run_id: &RunId) -> Result<Vec<RunTable>> {
        sqlx::query_as::<_, RunTable>(
            r#"
            SELECT run_id, table_name, rows_loaded
            FROM run_tables
            WHERE run_id = ?
            ORDER BY table_name
            "#,
        )
        .bind(run_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)
    }
}
