//! # f1-etl
//!
//! Resumable ETL pipeline that ingests the paginated Formula 1 results API into
//! a relational store.
//!
//! ## Design Philosophy
//!
//! f1-etl is designed to be:
//! - **Resumable** - Progress is persisted after every extraction unit and row files are
//!   written atomically, so a killed run picks up where it stopped
//! - **Polite** - One request in flight, sticky pacing and adaptive backoff against throttling
//! - **Auditable** - Every load run leaves a run record and per-table row counts
//! - **Library-first** - No CLI; callers install their own `tracing` subscriber
//!
//! ## Quick Start
//!
//! ```no_run
//! use f1_etl::{Config, Pipeline, PipelineOptions, YearRange};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.store.url = "sqlite://data/f1_analytics.db".to_string();
//!
//!     let mut pipeline = Pipeline::new(config)?;
//!     let report = pipeline
//!         .run(PipelineOptions {
//!             range: Some(YearRange::new(2023, 2024)),
//!             ..Default::default()
//!         })
//!         .await?;
//!
//!     println!("verdict: {:?}, run: {:?}", report.verdict, report.run_id());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Paginated extraction into raw row files
pub mod extract;
/// Rate-limited upstream client
pub mod fetch;
/// Loading processed row files into the store
pub mod loader;
/// Atomic row-file I/O and health checks
pub mod output;
/// End-to-end orchestration
pub mod pipeline;
/// Durable extraction progress
pub mod progress;
/// Post-load quality gate
pub mod quality;
/// Table contracts and validation
pub mod schema;
/// Reference resolution between raw and processed files
pub mod transform;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::{Config, QualityPolicy};
pub use db::Database;
pub use error::{DatabaseError, Error, LoadError, Result};
pub use extract::{ExtractReport, Extractor};
pub use fetch::{Absence, FetchClient, Fetched, PageSource};
pub use loader::{LoadSummary, Loader};
pub use pipeline::{Pipeline, PipelineOptions, PipelineReport};
pub use progress::{Progress, ProgressStore};
pub use quality::{QualityFailure, QualityGate, SkippedRounds, Verdict};
pub use transform::{Resolution, TransformReport, Transformer};
pub use types::{EntityKind, LoadMode, Row, RunId, RunStatus, Value, YearRange};
