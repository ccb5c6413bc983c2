//! Row-set writes into entity tables.
//!
//! Table and column names always come from a declared contract, never from
//! input data, so they are safe to splice into statements.

use crate::error::LoadError;
use crate::schema::{self, TableContract};
use crate::types::{Row, Value};
use crate::{Error, Result};
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::{SqliteConnection, query::Query};

use super::Database;

fn failed(table: &str) -> impl Fn(sqlx::Error) -> Error + '_ {
    move |e| {
        Error::Load(LoadError::TableFailed {
            table: table.to_string(),
            reason: e.to_string(),
        })
    }
}

fn contract_for(table: &str) -> Result<&'static TableContract> {
    schema::contract(table).ok_or_else(|| Error::Load(LoadError::UnknownTable(table.to_string())))
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Text(s) => query.bind(s.clone()),
        Value::Date(d) => query.bind(d.format("%Y-%m-%d").to_string()),
    }
}

/// Insert rows one statement at a time on an open connection
async fn insert_rows(
    conn: &mut SqliteConnection,
    target: &str,
    columns: &[&str],
    rows: &[Row],
) -> std::result::Result<u64, sqlx::Error> {
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {target} ({}) VALUES ({placeholders})",
        columns.join(", ")
    );
    let mut inserted = 0;
    for row in rows {
        let mut query = sqlx::query(&sql);
        for column in columns {
            query = bind_value(query, row.value(column));
        }
        inserted += query.execute(&mut *conn).await?.rows_affected();
    }
    Ok(inserted)
}

impl Database {
    /// Replace the entire contents of `table` with `rows`
    ///
    /// Delete and insert share one transaction; a failure leaves the previous
    /// contents in place.
    pub async fn replace_rows(&self, table: &str, rows: &[Row]) -> Result<u64> {
        let contract = contract_for(table)?;
        let mut tx = self.pool.begin().await.map_err(failed(table))?;

        let deleted = sqlx::query(&format!("DELETE FROM {}", contract.table))
            .execute(&mut *tx)
            .await
            .map_err(failed(table))?
            .rows_affected();
        let inserted = insert_rows(&mut tx, contract.table, contract.required, rows)
            .await
            .map_err(failed(table))?;

        tx.commit().await.map_err(failed(table))?;
        tracing::debug!(table, deleted, inserted, "Replaced table contents");
        Ok(inserted)
    }

    /// Merge `rows` into `table` by its declared key
    ///
    /// Rows go into a temporary staging table first, then one
    /// `INSERT .. SELECT .. ON CONFLICT DO UPDATE` overwrites every non-key
    /// column of matching rows and inserts the rest. The staging table lives and
    /// dies inside the transaction, so a failure rolls back both.
    ///
    /// Returns the number of distinct keys in the batch, which is the number of
    /// table rows written or overwritten.
    pub async fn upsert_rows(&self, table: &str, rows: &[Row]) -> Result<u64> {
        let contract = contract_for(table)?;
        let staging = format!("staging_{}", contract.table);
        let columns = contract.required.join(", ");
        let key = contract.key.join(", ");
        let updates = contract
            .required
            .iter()
            .filter(|column| !contract.key.contains(column))
            .map(|column| format!("{column} = excluded.{column}"))
            .collect::<Vec<_>>()
            .join(", ");
        let conflict = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {updates}")
        };

        let mut tx = self.pool.begin().await.map_err(failed(table))?;

        sqlx::query(&format!("DROP TABLE IF EXISTS temp.{staging}"))
            .execute(&mut *tx)
            .await
            .map_err(failed(table))?;
        sqlx::query(&format!(
            "CREATE TEMP TABLE {staging} AS SELECT {columns} FROM {} WHERE 0",
            contract.table
        ))
        .execute(&mut *tx)
        .await
        .map_err(failed(table))?;

        insert_rows(&mut tx, &staging, contract.required, rows)
            .await
            .map_err(failed(table))?;

        // Rows sharing a key collapse into one; report what the table receives
        let distinct: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM (SELECT DISTINCT {key} FROM {staging})"
        ))
        .fetch_one(&mut *tx)
        .await
        .map_err(failed(table))?;
        let distinct = distinct as u64;
        if distinct < rows.len() as u64 {
            tracing::warn!(
                table,
                staged = rows.len(),
                distinct,
                "Batch repeats table keys; later rows overwrite earlier ones"
            );
        }

        // `WHERE true` keeps SQLite from parsing ON CONFLICT as a join constraint
        let merged = sqlx::query(&format!(
            "INSERT INTO {target} ({columns}) SELECT {columns} FROM {staging} WHERE true \
             ON CONFLICT({key}) {conflict}",
            target = contract.table
        ))
        .execute(&mut *tx)
        .await
        .map_err(failed(table))?
        .rows_affected();

        sqlx::query(&format!("DROP TABLE temp.{staging}"))
            .execute(&mut *tx)
            .await
            .map_err(failed(table))?;

        tx.commit().await.map_err(failed(table))?;
        tracing::debug!(table, staged = rows.len(), merged, "Upserted table contents");
        Ok(distinct)
    }

    /// Number of rows in `table`
    pub async fn count(&self, table: &str) -> Result<i64> {
        let contract = contract_for(table)?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", contract.table))
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Sqlx)?;
        Ok(count)
    }
}
