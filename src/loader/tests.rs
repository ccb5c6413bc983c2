use super::*;
use crate::schema::contract;
use crate::types::Value;
use tempfile::TempDir;

fn header(table: &str) -> Vec<String> {
    contract(table)
        .unwrap()
        .required
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn result_row(race_id: &str, driver_id: &str, points: &str) -> Row {
    Row::new()
        .with("race_id", race_id)
        .with("driver_id", driver_id)
        .with("driver_ref", format!("driver_{driver_id}"))
        .with("constructor_id", "1")
        .with("points", points)
        .with("laps", "57")
        .with("grid", "1")
        .with("position_order", "1")
        .with("status_id", "1")
        .with("status", "Finished")
}

fn write_processed(dir: &std::path::Path, table: &str, rows: &[Row]) {
    let columns = contract(table).unwrap().required;
    output::write_rows(&processed_path(dir, table), columns, rows).unwrap();
}

fn write_all_empty(dir: &std::path::Path) {
    for table in LOAD_ORDER {
        write_processed(dir, table, &[]);
    }
}

#[tokio::test]
async fn incremental_load_overwrites_by_key() {
    let db = Database::in_memory().await.unwrap();
    let dir = TempDir::new().unwrap();
    let loader = Loader::new(&db, LoadMode::Incremental, true, dir.path());

    loader
        .load_table("results", &header("results"), vec![result_row("202401", "1", "10")])
        .await
        .unwrap();
    loader
        .load_table("results", &header("results"), vec![result_row("202401", "1", "25")])
        .await
        .unwrap();

    let points: Vec<f64> = sqlx::query_scalar("SELECT points FROM results WHERE driver_id = 1")
        .fetch_all(db.pool())
        .await
        .unwrap();
    assert_eq!(points, vec![25.0]);
}

#[tokio::test]
async fn full_refresh_replaces_table_contents() {
    let db = Database::in_memory().await.unwrap();
    let dir = TempDir::new().unwrap();
    let loader = Loader::new(&db, LoadMode::FullRefresh, true, dir.path());

    loader
        .load_table(
            "results",
            &header("results"),
            vec![result_row("202401", "1", "25"), result_row("202401", "2", "18")],
        )
        .await
        .unwrap();
    loader
        .load_table("results", &header("results"), vec![result_row("202402", "3", "15")])
        .await
        .unwrap();

    let keys: Vec<(i64, i64)> = sqlx::query_as("SELECT race_id, driver_id FROM results")
        .fetch_all(db.pool())
        .await
        .unwrap();
    assert_eq!(keys, vec![(202402, 3)]);
}

#[tokio::test]
async fn coercion_runs_before_validation() {
    let db = Database::in_memory().await.unwrap();
    let dir = TempDir::new().unwrap();
    let loader = Loader::new(&db, LoadMode::FullRefresh, true, dir.path());

    let driver = Row::new()
        .with("driver_id", "1")
        .with("driver_ref", "alonso")
        .with("driver_number", "14")
        .with("dob", "1981-07-29")
        .with("code", Value::Null);
    let written = loader
        .load_table("drivers", &header("drivers"), vec![driver])
        .await
        .unwrap();
    assert_eq!(written, Some(1));

    let (number, dob, code): (i64, String, String) =
        sqlx::query_as("SELECT driver_number, dob, code FROM drivers")
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(number, 14);
    assert_eq!(dob, "1981-07-29");
    assert_eq!(code, "");
}

#[tokio::test]
async fn strict_mode_rejects_contract_violations() {
    let db = Database::in_memory().await.unwrap();
    let dir = TempDir::new().unwrap();
    let loader = Loader::new(&db, LoadMode::FullRefresh, true, dir.path());

    let err = loader
        .load_table("results", &header("results"), vec![result_row("202401", "1", "lots")])
        .await
        .unwrap_err();
    match err {
        Error::SchemaViolation { table, issues } => {
            assert_eq!(table, "results");
            assert_eq!(issues, vec!["points is not numeric".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(db.count("results").await.unwrap(), 0);
}

#[tokio::test]
async fn lenient_mode_logs_and_loads() {
    let db = Database::in_memory().await.unwrap();
    let dir = TempDir::new().unwrap();
    let loader = Loader::new(&db, LoadMode::FullRefresh, false, dir.path());

    let columns = vec!["race_id".to_string(), "driver_id".to_string(), "points".to_string()];
    let written = loader
        .load_table("results", &columns, vec![result_row("202401", "1", "lots")])
        .await
        .unwrap();
    assert_eq!(written, Some(1));
}

#[tokio::test]
async fn empty_row_sets_are_skipped() {
    let db = Database::in_memory().await.unwrap();
    let dir = TempDir::new().unwrap();
    let loader = Loader::new(&db, LoadMode::Incremental, true, dir.path());

    let written = loader
        .load_table("pit_stops", &header("pit_stops"), Vec::new())
        .await
        .unwrap();
    assert_eq!(written, None);
}

#[tokio::test]
async fn load_all_records_run_and_tables() {
    let db = Database::in_memory().await.unwrap();
    let dir = TempDir::new().unwrap();
    write_all_empty(dir.path());
    write_processed(
        dir.path(),
        "seasons",
        &[Row::new().with("year", 2024).with("url", "http://s/2024")],
    );
    write_processed(
        dir.path(),
        "results",
        &[result_row("202401", "1", "25"), result_row("202401", "2", "18")],
    );

    let loader = Loader::new(&db, LoadMode::FullRefresh, true, dir.path());
    let run_id = RunId::from("run-42");
    let summary = loader
        .load_all(Some(run_id.clone()), "http://upstream")
        .await
        .unwrap();

    assert_eq!(summary.run_id, run_id);
    assert_eq!(summary.rows("results"), 2);
    assert_eq!(summary.rows("seasons"), 1);
    assert_eq!(summary.skipped.len(), LOAD_ORDER.len() - 2);

    let run = db.get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.source_url, "http://upstream");
    let tables: Vec<(String, i64)> = db
        .list_run_tables(&run_id)
        .await
        .unwrap()
        .into_iter()
        .map(|t| (t.table_name, t.rows_loaded))
        .collect();
    assert_eq!(
        tables,
        vec![("results".to_string(), 2), ("seasons".to_string(), 1)]
    );
}

#[tokio::test]
async fn load_all_generates_run_id_when_absent() {
    let db = Database::in_memory().await.unwrap();
    let dir = TempDir::new().unwrap();
    write_all_empty(dir.path());

    let loader = Loader::new(&db, LoadMode::Incremental, true, dir.path());
    let summary = loader.load_all(None, "http://upstream").await.unwrap();

    assert!(!summary.run_id.as_str().is_empty());
    let run = db.get_run(&summary.run_id).await.unwrap().unwrap();
    assert_eq!(run.mode, LoadMode::Incremental);
}

#[tokio::test]
async fn failing_table_marks_run_failed() {
    let db = Database::in_memory().await.unwrap();
    let dir = TempDir::new().unwrap();
    write_all_empty(dir.path());
    std::fs::remove_file(processed_path(dir.path(), "qualifying")).unwrap();
    write_processed(dir.path(), "results", &[result_row("202401", "1", "25")]);

    let loader = Loader::new(&db, LoadMode::FullRefresh, true, dir.path());
    let run_id = RunId::from("doomed");
    let err = loader
        .load_all(Some(run_id.clone()), "http://upstream")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingRowFile { .. }));

    let run = db.get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.ended_at.is_some());

    // Tables loaded before the failure keep their provenance
    let tables = db.list_run_tables(&run_id).await.unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].table_name, "results");
}
