//! Error types for f1-etl
//!
//! The taxonomy follows the pipeline stages:
//! - transient network faults are retried inside the fetch client and never surface here
//!   unless the client itself cannot be built
//! - "not found" and malformed local state are handled in-band (skip / reset) and are not errors
//! - schema violations, load failures and quality-gate escalations are surfaced to the caller

use crate::quality::QualityFailure;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for f1-etl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for f1-etl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "fetch.base_delay")
        key: Option<String>,
    },

    /// Requested year range is empty after clamping
    #[error("invalid year range {start}-{end} (supported window {earliest}-{latest})")]
    InvalidYearRange {
        /// Requested (clamped) first year
        start: i32,
        /// Requested (clamped) last year
        end: i32,
        /// Earliest supported year
        earliest: i32,
        /// Latest supported year
        latest: i32,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Network error (client construction, not per-request faults)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Malformed upstream base URL or endpoint
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Row file could not be read or written
    #[error("row file error: {0}")]
    Csv(#[from] csv::Error),

    /// A required input row file is missing
    #[error("row file not found: {}", path.display())]
    MissingRowFile {
        /// Path that was expected to exist
        path: PathBuf,
    },

    /// Row set violates its table contract (strict mode only)
    #[error("schema contract violated for {table}: {}", issues.join("; "))]
    SchemaViolation {
        /// Table whose contract failed
        table: String,
        /// Human-readable issues
        issues: Vec<String>,
    },

    /// A table load raised; the run has been marked failed
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    /// Quality gate reported failures and the active policy escalates them
    #[error("data quality checks failed: {} failure(s)", failures.len())]
    QualityGateFailed {
        /// Failures reported by the gate
        failures: Vec<QualityFailure>,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Unsupported store descriptor
    #[error("unsupported store descriptor: {0}")]
    UnsupportedStore(String),
}

/// Errors raised while applying a row set to the store
#[derive(Debug, Error)]
pub enum LoadError {
    /// Writing rows into a table failed
    #[error("failed to load {table}: {reason}")]
    TableFailed {
        /// Target table
        table: String,
        /// Underlying failure
        reason: String,
    },

    /// Table has no declared contract and cannot be loaded
    #[error("no contract declared for table {0}")]
    UnknownTable(String),
}

impl Error {
    /// Convenience constructor for configuration errors
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Returns true for failures that a later run is expected to recover from
    /// without operator action (network and local I/O hiccups).
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
            ),
            Error::Sqlx(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }
}
