//! End-to-end pipeline tests against a mock upstream
//!
//! Every test serves a one-race 2024 season from wiremock, runs the full
//! extract → transform → load → quality sequence into a temporary store and
//! inspects what landed on disk and in the database.
//!
//! ```bash
//! cargo test --test pipeline_e2e
//! ```

mod common;

use common::{create_test_config, mount_season};
use f1_etl::{
    Database, EntityKind, Error, LoadMode, Pipeline, PipelineOptions, QualityPolicy, RunId,
    RunStatus, Verdict,
};
use std::collections::BTreeMap;
use tempfile::TempDir;
use wiremock::MockServer;

async fn open_store(config: &f1_etl::Config) -> Database {
    Database::connect(&config.store.url, false, None)
        .await
        .expect("store should open")
}

fn raw_snapshot(config: &f1_etl::Config) -> BTreeMap<EntityKind, Vec<u8>> {
    EntityKind::ALL
        .iter()
        .filter_map(|kind| {
            let path = config.paths.raw_dir.join(kind.file_name());
            std::fs::read(path).ok().map(|bytes| (*kind, bytes))
        })
        .collect()
}

#[tokio::test]
async fn test_single_race_season_loads_cleanly() {
    let server = MockServer::start().await;
    mount_season(&server, "max_verstappen").await;
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir, &server.uri(), 2024, QualityPolicy::Warn);

    let mut pipeline = Pipeline::new(config.clone()).unwrap();
    let report = pipeline
        .run(PipelineOptions {
            run_id: Some(RunId::from("e2e-1")),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(report.failures.is_empty(), "unexpected failures: {:?}", report.failures);
    assert_eq!(report.verdict, Verdict::Pass);
    let extract = report.extract.as_ref().unwrap();
    assert_eq!(extract.rows_for(EntityKind::Results), 1);
    assert_eq!(extract.rows_for(EntityKind::PitStops), 0);

    let db = open_store(&config).await;
    assert_eq!(db.count("results").await.unwrap(), 1);
    assert_eq!(db.count("races").await.unwrap(), 1);
    assert_eq!(db.count("driver_standings").await.unwrap(), 1);

    let (race_id, driver_id, constructor_id, status_id): (i64, i64, i64, i64) =
        sqlx::query_as("SELECT race_id, driver_id, constructor_id, status_id FROM results")
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!((race_id, driver_id, constructor_id, status_id), (202401, 1, 1, 1));

    let run = db.get_run(&RunId::from("e2e-1")).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.source_url, server.uri());
    assert!(
        db.list_run_tables(&run.run_id)
            .await
            .unwrap()
            .iter()
            .any(|t| t.table_name == "results" && t.rows_loaded == 1)
    );
    db.close().await;
}

#[tokio::test]
async fn test_missing_pit_stops_round_is_recorded_as_skipped() {
    let server = MockServer::start().await;
    mount_season(&server, "max_verstappen").await;
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir, &server.uri(), 2024, QualityPolicy::Warn);

    let mut pipeline = Pipeline::new(config).unwrap();
    pipeline.run(PipelineOptions::default()).await.unwrap();

    let progress = pipeline.extractor().progress_store();
    assert!(progress.skipped_rounds(EntityKind::PitStops).contains(&(2024, 1)));
    assert!(progress.skipped_rounds(EntityKind::Results).is_empty());
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let server = MockServer::start().await;
    mount_season(&server, "max_verstappen").await;
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir, &server.uri(), 2024, QualityPolicy::Warn);

    let mut pipeline = Pipeline::new(config.clone()).unwrap();
    pipeline.run(PipelineOptions::default()).await.unwrap();
    let first = raw_snapshot(&config);
    assert!(first.contains_key(&EntityKind::Results));

    // Fresh pipeline, same directories: settled units are not fetched again
    let mut pipeline = Pipeline::new(config.clone()).unwrap();
    let report = pipeline
        .run(PipelineOptions {
            mode: Some(LoadMode::Incremental),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(report.verdict, Verdict::Pass);
    assert_eq!(raw_snapshot(&config), first);

    let db = open_store(&config).await;
    assert_eq!(db.count("results").await.unwrap(), 1);
    assert_eq!(db.count("qualifying").await.unwrap(), 1);
    assert_eq!(db.list_runs(10).await.unwrap().len(), 2);
    db.close().await;
}

#[tokio::test]
async fn test_skip_extract_reuses_raw_files() {
    let server = MockServer::start().await;
    mount_season(&server, "max_verstappen").await;
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir, &server.uri(), 2024, QualityPolicy::Warn);

    let mut pipeline = Pipeline::new(config.clone()).unwrap();
    pipeline.run(PipelineOptions::default()).await.unwrap();
    let requests = server.received_requests().await.unwrap().len();

    let mut pipeline = Pipeline::new(config.clone()).unwrap();
    let report = pipeline
        .run(PipelineOptions {
            skip_extract: true,
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(report.extract.is_none());
    assert_eq!(report.load.as_ref().unwrap().rows("results"), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), requests);
}

#[tokio::test]
async fn test_dangling_driver_fails_gate_under_fail_policy() {
    let server = MockServer::start().await;
    mount_season(&server, "ghost_driver").await;
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir, &server.uri(), 2024, QualityPolicy::Fail);

    let mut pipeline = Pipeline::new(config.clone()).unwrap();
    let err = pipeline.run(PipelineOptions::default()).await.unwrap_err();
    match err {
        Error::QualityGateFailed { failures } => {
            let checks: Vec<&str> = failures.iter().map(|f| f.check.as_str()).collect();
            assert_eq!(checks, vec!["results_driver_fk"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // The data is loaded; only the verdict escalates
    let db = open_store(&config).await;
    assert_eq!(db.count("results").await.unwrap(), 1);
    db.close().await;
}

#[tokio::test]
async fn test_dangling_driver_only_warns_under_warn_policy() {
    let server = MockServer::start().await;
    mount_season(&server, "ghost_driver").await;
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir, &server.uri(), 2024, QualityPolicy::Warn);

    let mut pipeline = Pipeline::new(config).unwrap();
    let report = pipeline.run(PipelineOptions::default()).await.unwrap();

    assert_eq!(report.verdict, Verdict::Warn);
    assert_eq!(report.failures.len(), 1);
    let transform = report.transform.as_ref().unwrap();
    assert_eq!(transform.unmapped("results", "driver_id"), 1);
}
