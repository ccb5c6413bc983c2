//! Row files: atomic writes, reads and health checks
//!
//! A destination is always either its complete previous version or its
//! complete new version. Rows are written to `{path}.tmp`, synced, and renamed
//! over the destination.

use crate::error::{Error, Result};
use crate::progress::tmp_sibling;
use crate::types::{Row, Value};
use std::fs::File;
use std::path::Path;

/// State of a row file as seen before resuming extraction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputHealth {
    /// File does not exist
    Missing,
    /// File is smaller than the minimum byte threshold
    Undersized {
        /// Observed size
        bytes: u64,
    },
    /// File has a header but no data rows
    HeaderOnly,
    /// File holds fewer rows than its completed units account for
    Truncated {
        /// Data rows present
        rows: u64,
        /// Minimum rows expected
        expected: u64,
    },
    /// File is usable
    Healthy {
        /// Data rows present
        rows: u64,
    },
}

impl OutputHealth {
    /// True only for [`OutputHealth::Healthy`]
    pub fn is_healthy(&self) -> bool {
        matches!(self, OutputHealth::Healthy { .. })
    }
}

/// Atomically write `rows` under a fixed `columns` header
///
/// Columns absent from a row are written as empty fields.
pub fn write_rows(path: &Path, columns: &[&str], rows: &[Row]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_sibling(path);
    let file = File::create(&tmp)?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(columns)?;
    for row in rows {
        writer.write_record(columns.iter().map(|column| row.value(column).to_field()))?;
    }
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp, path)?;

    tracing::debug!(path = %path.display(), rows = rows.len(), "Wrote row file");
    Ok(())
}

/// Read every row of a file; empty fields become `Null`, others `Text`
pub fn read_rows(path: &Path) -> Result<Vec<Row>> {
    if !path.exists() {
        return Err(Error::MissingRowFile {
            path: path.to_path_buf(),
        });
    }
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = Row::new();
        for (column, field) in headers.iter().zip(record.iter()) {
            row.set(column, Value::text_or_null(field));
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Header of a row file, if it can be read
pub fn read_header(path: &Path) -> Option<Vec<String>> {
    let mut reader = csv::Reader::from_path(path).ok()?;
    let headers = reader.headers().ok()?;
    Some(headers.iter().map(str::to_string).collect())
}

/// Number of data rows (header excluded); unreadable files count as zero
pub fn count_rows(path: &Path) -> u64 {
    let Ok(mut reader) = csv::Reader::from_path(path) else {
        return 0;
    };
    let mut count = 0;
    for record in reader.records() {
        if record.is_err() {
            break;
        }
        count += 1;
    }
    count
}

/// Classify a row file before trusting progress that claims it is complete
///
/// `expected_min_rows` is the number of rows the completed units must have
/// produced; zero disables the row-count check.
pub fn health_check(path: &Path, min_bytes: u64, expected_min_rows: u64) -> OutputHealth {
    let bytes = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(_) => return OutputHealth::Missing,
    };
    if bytes < min_bytes {
        return OutputHealth::Undersized { bytes };
    }
    let rows = count_rows(path);
    if rows == 0 {
        return OutputHealth::HeaderOnly;
    }
    if rows < expected_min_rows {
        return OutputHealth::Truncated {
            rows,
            expected: expected_min_rows,
        };
    }
    OutputHealth::Healthy { rows }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const COLUMNS: &[&str] = &["race_id", "driver_ref", "points"];

    fn sample_rows() -> Vec<Row> {
        vec![
            Row::new()
                .with("race_id", 202401_i64)
                .with("driver_ref", "max_verstappen")
                .with("points", 25.0),
            Row::new().with("race_id", 202401_i64).with("driver_ref", "perez"),
        ]
    }

    #[test]
    fn write_then_read_yields_text_fields_and_nulls() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        write_rows(&path, COLUMNS, &sample_rows()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "race_id,driver_ref,points\n202401,max_verstappen,25\n202401,perez,\n"
        );

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text("driver_ref"), Some("max_verstappen"));
        assert_eq!(rows[0].int("race_id"), Some(202401));
        assert!(rows[1].value("points").is_null());
    }

    #[test]
    fn write_leaves_no_temporary_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        write_rows(&path, COLUMNS, &sample_rows()).unwrap();
        assert!(!tmp_sibling(&path).exists());
    }

    #[test]
    fn interrupted_write_keeps_previous_version_readable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        write_rows(&path, COLUMNS, &sample_rows()).unwrap();
        let before = std::fs::read(&path).unwrap();

        // A crash between creating the temporary file and the rename leaves a partial sibling
        std::fs::write(tmp_sibling(&path), "race_id,dri").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert_eq!(health_check(&path, 10, 2), OutputHealth::Healthy { rows: 2 });

        // The next write replaces both the stale temporary and the destination
        write_rows(&path, COLUMNS, &sample_rows()[..1]).unwrap();
        assert_eq!(count_rows(&path), 1);
        assert!(!tmp_sibling(&path).exists());
    }

    #[test]
    fn read_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = read_rows(&dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, Error::MissingRowFile { .. }));
    }

    #[test]
    fn health_check_classifies_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("qualifying.csv");
        assert_eq!(health_check(&path, 10, 0), OutputHealth::Missing);

        std::fs::write(&path, "a,b\n").unwrap();
        assert_eq!(health_check(&path, 10, 0), OutputHealth::Undersized { bytes: 4 });

        write_rows(&path, COLUMNS, &[]).unwrap();
        assert_eq!(health_check(&path, 10, 0), OutputHealth::HeaderOnly);

        write_rows(&path, COLUMNS, &sample_rows()).unwrap();
        assert_eq!(
            health_check(&path, 10, 5),
            OutputHealth::Truncated { rows: 2, expected: 5 }
        );
        assert!(health_check(&path, 10, 2).is_healthy());
    }

    #[test]
    fn count_rows_ignores_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pit_stops.csv");
        assert_eq!(count_rows(&path), 0);
        write_rows(&path, COLUMNS, &sample_rows()).unwrap();
        assert_eq!(count_rows(&path), 2);
        assert_eq!(
            read_header(&path).unwrap(),
            vec!["race_id", "driver_ref", "points"]
        );
    }
}
