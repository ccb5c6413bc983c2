//! Store lifecycle, descriptor parsing and schema migrations.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::SqliteConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::Database;

/// Where a store descriptor points
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreLocation {
    /// Single-file SQLite store
    File(PathBuf),
    /// Private in-memory SQLite store
    Memory,
}

impl StoreLocation {
    /// Parse `sqlite://path`, `sqlite:path` or `sqlite::memory:`
    pub fn parse(url: &str) -> Result<Self> {
        if url == "sqlite::memory:" || url == "sqlite://:memory:" {
            return Ok(StoreLocation::Memory);
        }
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .filter(|path| !path.is_empty())
            .ok_or_else(|| Error::Database(DatabaseError::UnsupportedStore(url.to_string())))?;
        Ok(StoreLocation::File(PathBuf::from(path)))
    }
}

impl Database {
    /// Create a new database connection
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                )))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse database path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to database: {}",
                e
            )))
        })?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Open a private in-memory store
    ///
    /// The pool is pinned to one connection; every connection to `:memory:`
    /// would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse in-memory descriptor: {}",
                    e
                )))
            })?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to open in-memory database: {}",
                    e
                )))
            })?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Connect to the store named by `url`
    ///
    /// With `reset`, a file-backed store is deleted before connecting (full
    /// refresh). `schema_script`, when given, is applied after the built-in
    /// migrations and must be safe to re-run.
    pub async fn connect(url: &str, reset: bool, schema_script: Option<&Path>) -> Result<Self> {
        let db = match StoreLocation::parse(url)? {
            StoreLocation::Memory => Self::in_memory().await?,
            StoreLocation::File(path) => {
                if reset {
                    Self::remove_store_files(&path).await?;
                }
                Self::new(&path).await?
            }
        };
        if let Some(script) = schema_script {
            db.apply_schema_script(script).await?;
        }
        Ok(db)
    }

    /// Delete a file-backed store together with its WAL side files
    async fn remove_store_files(path: &Path) -> Result<()> {
        let mut targets = vec![path.to_path_buf()];
        for suffix in ["-wal", "-shm"] {
            let mut side = path.as_os_str().to_owned();
            side.push(suffix);
            targets.push(PathBuf::from(side));
        }
        for target in targets {
            match tokio::fs::remove_file(&target).await {
                Ok(()) => tracing::info!(path = %target.display(), "Removed store file for full refresh"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Error::Database(DatabaseError::ConnectionFailed(format!(
                        "Failed to reset store {}: {}",
                        target.display(),
                        e
                    ))));
                }
            }
        }
        Ok(())
    }

    /// Execute an external schema-definition script
    async fn apply_schema_script(&self, script: &Path) -> Result<()> {
        let sql = tokio::fs::read_to_string(script).await?;
        sqlx::raw_sql(&sql).execute(&self.pool).await.map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to apply schema script {}: {}",
                script.display(),
                e
            )))
        })?;
        tracing::info!(script = %script.display(), "Applied schema script");
        Ok(())
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create schema_version table: {}",
                e
            )))
        })?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to query schema version: {}",
                        e
                    )))
                })?
                .flatten();

        let current_version = current_version.unwrap_or(0);

        if current_version < 1 {
            Self::migrate(&mut conn, 1, ENTITY_SCHEMA).await?;
        }
        if current_version < 2 {
            Self::migrate(&mut conn, 2, RUN_SCHEMA).await?;
        }

        Ok(())
    }

    /// Apply one versioned migration inside a transaction
    async fn migrate(conn: &mut SqliteConnection, version: i32, statements: &[&str]) -> Result<()> {
        tracing::info!(version, "Applying database migration");

        // Wrap migration in a transaction so partial failures don't leave the DB in a broken state
        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to begin transaction: {}",
                    e
                )))
            })?;

        let result = async {
            for statement in statements {
                sqlx::query(statement)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::MigrationFailed(format!(
                            "Migration v{} failed: {}",
                            version, e
                        )))
                    })?;
            }
            Self::record_migration(conn, version).await?;
            Ok::<(), Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::MigrationFailed(format!(
                            "Failed to commit migration v{}: {}",
                            version, e
                        )))
                    })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!(version, "Database migration complete");
        Ok(())
    }

    async fn record_migration(conn: &mut SqliteConnection, version: i32) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to record migration: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Close the database connection
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Migration v1: entity tables with their declared keys
const ENTITY_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE seasons (
        year INTEGER PRIMARY KEY,
        url TEXT
    )
    "#,
    r#"
    CREATE TABLE circuits (
        circuit_id INTEGER PRIMARY KEY,
        circuit_ref TEXT NOT NULL,
        circuit_name TEXT,
        location TEXT,
        country TEXT,
        lat REAL,
        lng REAL,
        altitude REAL,
        url TEXT
    )
    "#,
    r#"
    CREATE TABLE constructors (
        constructor_id INTEGER PRIMARY KEY,
        constructor_ref TEXT NOT NULL,
        constructor_name TEXT,
        nationality TEXT,
        url TEXT
    )
    "#,
    r#"
    CREATE TABLE drivers (
        driver_id INTEGER PRIMARY KEY,
        driver_ref TEXT NOT NULL,
        driver_number INTEGER,
        code TEXT,
        forename TEXT,
        surname TEXT,
        dob TEXT,
        nationality TEXT,
        url TEXT
    )
    "#,
    r#"
    CREATE TABLE races (
        race_id INTEGER PRIMARY KEY,
        year INTEGER NOT NULL,
        round INTEGER NOT NULL,
        circuit_id INTEGER,
        race_name TEXT,
        race_date TEXT,
        race_time TEXT,
        url TEXT
    )
    "#,
    "CREATE INDEX idx_races_year ON races(year)",
    r#"
    CREATE TABLE results (
        race_id INTEGER NOT NULL,
        driver_id INTEGER NOT NULL,
        driver_ref TEXT NOT NULL,
        constructor_id INTEGER,
        number INTEGER,
        grid INTEGER,
        position INTEGER,
        position_text TEXT,
        position_order INTEGER,
        points REAL,
        laps INTEGER,
        time_result TEXT,
        milliseconds INTEGER,
        fastest_lap INTEGER,
        fastest_lap_rank INTEGER,
        fastest_lap_time TEXT,
        fastest_lap_speed TEXT,
        status_id INTEGER,
        status TEXT,
        UNIQUE(race_id, driver_ref)
    )
    "#,
    r#"
    CREATE TABLE qualifying (
        race_id INTEGER NOT NULL,
        driver_id INTEGER NOT NULL,
        driver_ref TEXT NOT NULL,
        constructor_id INTEGER,
        number INTEGER,
        position INTEGER,
        q1 TEXT,
        q2 TEXT,
        q3 TEXT,
        UNIQUE(race_id, driver_ref)
    )
    "#,
    r#"
    CREATE TABLE pit_stops (
        race_id INTEGER NOT NULL,
        driver_id INTEGER NOT NULL,
        driver_ref TEXT NOT NULL,
        stop INTEGER NOT NULL,
        lap INTEGER,
        time_of_day TEXT,
        duration TEXT,
        milliseconds INTEGER,
        UNIQUE(race_id, driver_ref, stop)
    )
    "#,
    r#"
    CREATE TABLE constructor_standings (
        race_id INTEGER NOT NULL,
        constructor_id INTEGER NOT NULL,
        constructor_ref TEXT NOT NULL,
        points REAL,
        position INTEGER,
        position_text TEXT,
        wins INTEGER,
        UNIQUE(race_id, constructor_ref)
    )
    "#,
    r#"
    CREATE TABLE driver_standings (
        race_id INTEGER NOT NULL,
        driver_id INTEGER NOT NULL,
        driver_ref TEXT NOT NULL,
        points REAL,
        position INTEGER,
        position_text TEXT,
        wins INTEGER,
        UNIQUE(race_id, driver_ref)
    )
    "#,
];

/// Migration v2: run provenance
const RUN_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE runs (
        run_id TEXT PRIMARY KEY,
        started_at INTEGER NOT NULL,
        ended_at INTEGER,
        status TEXT NOT NULL,
        source_url TEXT NOT NULL,
        mode TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE run_tables (
        run_id TEXT NOT NULL REFERENCES runs(run_id) ON DELETE CASCADE,
        table_name TEXT NOT NULL,
        rows_loaded INTEGER NOT NULL,
        PRIMARY KEY (run_id, table_name)
    )
    "#,
    "CREATE INDEX idx_runs_started_at ON runs(started_at DESC)",
];
