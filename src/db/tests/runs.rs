use crate::db::*;
use crate::types::{LoadMode, RunId, RunStatus};

#[tokio::test]
async fn test_run_lifecycle() {
    let db = Database::in_memory().await.unwrap();
    let run_id = RunId::generate();

    db.start_run(&run_id, "https://api.jolpi.ca/ergast/f1", LoadMode::Incremental)
        .await
        .unwrap();
    let run = db.get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Running);
    assert_eq!(run.mode, LoadMode::Incremental);
    assert!(run.ended_at.is_none());

    db.finish_run(&run_id, RunStatus::Success).await.unwrap();
    let run = db.get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Success);
    assert!(run.ended_at.is_some());
    assert!(run.ended_at.unwrap() >= run.started_at);
}

#[tokio::test]
async fn test_finished_run_is_immutable() {
    let db = Database::in_memory().await.unwrap();
    let run_id = RunId::from("run-1");

    db.start_run(&run_id, "http://upstream", LoadMode::FullRefresh)
        .await
        .unwrap();
    db.finish_run(&run_id, RunStatus::Failed).await.unwrap();

    // Neither a second finish nor a restart changes the record
    db.finish_run(&run_id, RunStatus::Success).await.unwrap();
    assert!(
        db.start_run(&run_id, "http://upstream", LoadMode::FullRefresh)
            .await
            .is_err()
    );
    let run = db.get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_unfinished_run_can_be_restarted() {
    let db = Database::in_memory().await.unwrap();
    let run_id = RunId::from("interrupted");

    db.start_run(&run_id, "http://a", LoadMode::FullRefresh)
        .await
        .unwrap();
    db.start_run(&run_id, "http://b", LoadMode::Incremental)
        .await
        .unwrap();

    let run = db.get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.source_url, "http://b");
    assert_eq!(run.mode, LoadMode::Incremental);
    assert_eq!(db.list_runs(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_run_table_records_are_upserted() {
    let db = Database::in_memory().await.unwrap();
    let run_id = RunId::from("run-tables");
    db.start_run(&run_id, "http://upstream", LoadMode::FullRefresh)
        .await
        .unwrap();

    db.upsert_run_table(&run_id, "results", 10).await.unwrap();
    db.upsert_run_table(&run_id, "races", 2).await.unwrap();
    db.upsert_run_table(&run_id, "results", 12).await.unwrap();

    let tables = db.list_run_tables(&run_id).await.unwrap();
    assert_eq!(
        tables,
        vec![
            RunTable {
                run_id: "run-tables".into(),
                table_name: "races".into(),
                rows_loaded: 2,
            },
            RunTable {
                run_id: "run-tables".into(),
                table_name: "results".into(),
                rows_loaded: 12,
            },
        ]
    );
}

#[tokio::test]
async fn test_get_unknown_run_returns_none() {
    let db = Database::in_memory().await.unwrap();
    assert!(db.get_run(&RunId::from("nope")).await.unwrap().is_none());
    assert!(db.list_run_tables(&RunId::from("nope")).await.unwrap().is_empty());
}
