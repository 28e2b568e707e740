//! Run history storage.
//!
//! Every pipeline run can be recorded in a `SQLite` database: when it ran,
//! which season window it used, whether it succeeded, and a BLAKE3 checksum
//! of each file it wrote. Two runs over the same raw data should produce
//! identical checksums.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dataset::checksum;
use crate::error::{Error, Result};

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Started, not finished.
    Running,
    /// Finished without error.
    Succeeded,
    /// Aborted by an error.
    Failed,
}

impl RunStatus {
    /// Label stored in the database.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    fn from_db(value: &str) -> Self {
        match value {
            "running" => Self::Running,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            other => {
                warn!("Unknown run status: {other}, treating as failed");
                Self::Failed
            }
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    /// Run id.
    pub id: i64,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run ended, if it has.
    pub finished_at: Option<DateTime<Utc>>,
    /// First season of the window.
    pub start_year: i32,
    /// Last season of the window.
    pub end_year: i32,
    /// Stages requested, comma separated.
    pub stages: String,
    /// Current state.
    pub status: RunStatus,
    /// Error message of a failed run.
    pub error: Option<String>,
}

/// A file written by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRecord {
    /// Owning run.
    pub run_id: i64,
    /// Table name.
    pub table: String,
    /// File path.
    pub path: PathBuf,
    /// Data rows in the file.
    pub rows: u64,
    /// BLAKE3 hex digest of the file.
    pub checksum: String,
}

/// History database.
#[derive(Debug)]
pub struct Storage {
    path: PathBuf,
    conn: Connection,
}

impl Storage {
    /// Open or create the history database at `path`.
    ///
    /// Parent directories are created as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or its schema
    /// cannot be initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening history database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;
        migrations::initialize_schema(&conn)?;

        info!("History database ready at {}", path.display());
        Ok(Self { path, conn })
    }

    /// In-memory database for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the start of a run and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn begin_run(&self, start_year: i32, end_year: i32, stages: &str) -> Result<i64> {
        self.conn.execute(
            r"
            INSERT INTO runs (started_at, start_year, end_year, stages, status)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                Utc::now().to_rfc3339(),
                start_year,
                end_year,
                stages,
                RunStatus::Running.as_str(),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(run_id = id, "run started");
        Ok(id)
    }

    /// Record a file written by `run_id`, checksumming it now.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the insert fails.
    pub fn record_output(
        &self,
        run_id: i64,
        table: &str,
        path: &Path,
        rows: usize,
    ) -> Result<OutputRecord> {
        let digest = checksum(path)?;
        let rows = u64::try_from(rows).unwrap_or(u64::MAX);
        self.conn.execute(
            r"
            INSERT INTO run_outputs (run_id, table_name, path, row_count, checksum)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                run_id,
                table,
                path.to_string_lossy().into_owned(),
                i64::try_from(rows).unwrap_or(i64::MAX),
                digest,
            ],
        )?;
        Ok(OutputRecord {
            run_id,
            table: table.to_string(),
            path: path.to_path_buf(),
            rows,
            checksum: digest,
        })
    }

    /// Mark a run finished, failed when `error` is given.
    ///
    /// # Errors
    ///
    /// Returns an error if no such run exists or the update fails.
    pub fn finish_run(&self, run_id: i64, error: Option<&str>) -> Result<()> {
        let status = if error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };
        let affected = self.conn.execute(
            "UPDATE runs SET finished_at = ?1, status = ?2, error = ?3 WHERE id = ?4",
            params![Utc::now().to_rfc3339(), status.as_str(), error, run_id],
        )?;
        if affected == 0 {
            return Err(Error::internal(format!("no run with id {run_id}")));
        }
        info!(run_id, %status, "run finished");
        Ok(())
    }

    /// A run by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_run(&self, run_id: i64) -> Result<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                r"
                SELECT id, started_at, finished_at, start_year, end_year, stages, status, error
                FROM runs WHERE id = ?1
                ",
                [run_id],
                Self::row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    /// The most recent runs, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, started_at, finished_at, start_year, end_year, stages, status, error
            FROM runs ORDER BY id DESC LIMIT ?1
            ",
        )?;
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let runs = stmt
            .query_map([limit_i64], Self::row_to_run)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    /// Files recorded for a run, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn outputs_for(&self, run_id: i64) -> Result<Vec<OutputRecord>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT run_id, table_name, path, row_count, checksum
            FROM run_outputs WHERE run_id = ?1 ORDER BY id
            ",
        )?;
        let outputs = stmt
            .query_map([run_id], |row| {
                let path: String = row.get(2)?;
                let rows: i64 = row.get(3)?;
                Ok(OutputRecord {
                    run_id: row.get(0)?,
                    table: row.get(1)?,
                    path: PathBuf::from(path),
                    rows: u64::try_from(rows).unwrap_or(0),
                    checksum: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(outputs)
    }

    /// Summary counts.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let count = |sql: &str| -> Result<i64> {
            Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
        };
        let total_runs = count("SELECT COUNT(*) FROM runs")?;
        let succeeded_runs = count("SELECT COUNT(*) FROM runs WHERE status = 'succeeded'")?;
        let failed_runs = count("SELECT COUNT(*) FROM runs WHERE status = 'failed'")?;
        let total_outputs = count("SELECT COUNT(*) FROM run_outputs")?;

        let last: Option<String> = self
            .conn
            .query_row(
                "SELECT started_at FROM runs ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let last_run = last.as_deref().and_then(parse_timestamp);

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_runs,
            succeeded_runs,
            failed_runs,
            total_outputs,
            last_run,
            db_size_bytes,
        })
    }

    fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<RunRecord> {
        let started_at: String = row.get(1)?;
        let finished_at: Option<String> = row.get(2)?;
        let status: String = row.get(6)?;

        Ok(RunRecord {
            id: row.get(0)?,
            started_at: parse_timestamp(&started_at).unwrap_or_else(Utc::now),
            finished_at: finished_at.as_deref().and_then(parse_timestamp),
            start_year: row.get(3)?,
            end_year: row.get(4)?,
            stages: row.get(5)?,
            status: RunStatus::from_db(&status),
            error: row.get(7)?,
        })
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Summary of the history database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Runs recorded.
    pub total_runs: i64,
    /// Runs that succeeded.
    pub succeeded_runs: i64,
    /// Runs that failed.
    pub failed_runs: i64,
    /// Output files recorded across all runs.
    pub total_outputs: i64,
    /// Start time of the latest run.
    pub last_run: Option<DateTime<Utc>>,
    /// Database file size in bytes.
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    #[test]
    fn test_begin_and_get_run() {
        let storage = create_test_storage();
        let id = storage.begin_run(2020, 2025, "clean,enrich").unwrap();

        let run = storage.get_run(id).unwrap().unwrap();
        assert_eq!(run.start_year, 2020);
        assert_eq!(run.end_year, 2025);
        assert_eq!(run.stages, "clean,enrich");
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());
    }

    #[test]
    fn test_get_missing_run() {
        let storage = create_test_storage();
        assert!(storage.get_run(42).unwrap().is_none());
    }

    #[test]
    fn test_finish_run_success_and_failure() {
        let storage = create_test_storage();
        let ok = storage.begin_run(2020, 2025, "clean").unwrap();
        let bad = storage.begin_run(2020, 2025, "clean").unwrap();

        storage.finish_run(ok, None).unwrap();
        storage.finish_run(bad, Some("races.csv not found")).unwrap();

        let ok = storage.get_run(ok).unwrap().unwrap();
        assert_eq!(ok.status, RunStatus::Succeeded);
        assert!(ok.finished_at.is_some());
        assert!(ok.error.is_none());

        let bad = storage.get_run(bad).unwrap().unwrap();
        assert_eq!(bad.status, RunStatus::Failed);
        assert_eq!(bad.error.as_deref(), Some("races.csv not found"));
    }

    #[test]
    fn test_finish_unknown_run() {
        let storage = create_test_storage();
        assert!(storage.finish_run(7, None).is_err());
    }

    #[test]
    fn test_record_output_checksums_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("drivers_performance.csv");
        std::fs::write(&file, "driverId,surname\n1,Hamilton\n").unwrap();

        let storage = create_test_storage();
        let run = storage.begin_run(2020, 2025, "features").unwrap();
        let recorded = storage
            .record_output(run, "drivers_performance", &file, 1)
            .unwrap();
        assert_eq!(recorded.checksum, checksum(&file).unwrap());
        assert_eq!(recorded.checksum.len(), 64);

        let outputs = storage.outputs_for(run).unwrap();
        assert_eq!(outputs, vec![recorded]);
    }

    #[test]
    fn test_record_output_missing_file() {
        let storage = create_test_storage();
        let run = storage.begin_run(2020, 2025, "features").unwrap();
        assert!(storage
            .record_output(run, "x", Path::new("/nonexistent/x.csv"), 0)
            .is_err());
    }

    #[test]
    fn test_record_output_unknown_run_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.csv");
        std::fs::write(&file, "a\n").unwrap();

        let storage = create_test_storage();
        assert!(storage.record_output(99, "x", &file, 0).is_err());
    }

    #[test]
    fn test_recent_runs_newest_first() {
        let storage = create_test_storage();
        for year in 2020..2025 {
            storage.begin_run(year, 2025, "clean").unwrap();
        }

        let recent = storage.recent_runs(3).unwrap();
        assert_eq!(recent.len(), 3);
        let years: Vec<i32> = recent.iter().map(|r| r.start_year).collect();
        assert_eq!(years, vec![2024, 2023, 2022]);
    }

    #[test]
    fn test_stats() {
        let storage = create_test_storage();
        let empty = storage.stats().unwrap();
        assert_eq!(empty.total_runs, 0);
        assert!(empty.last_run.is_none());
        assert_eq!(empty.db_size_bytes, 0);

        let a = storage.begin_run(2020, 2025, "clean").unwrap();
        let b = storage.begin_run(2020, 2025, "clean").unwrap();
        storage.begin_run(2020, 2025, "clean").unwrap();
        storage.finish_run(a, None).unwrap();
        storage.finish_run(b, Some("boom")).unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.total_runs, 3);
        assert_eq!(stats.succeeded_runs, 1);
        assert_eq!(stats.failed_runs, 1);
        assert_eq!(stats.total_outputs, 0);
        assert!(stats.last_run.is_some());
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");
        {
            let storage = Storage::open(&path).unwrap();
            storage.begin_run(2021, 2021, "clean").unwrap();
        }
        let reopened = Storage::open(&path).unwrap();
        assert_eq!(reopened.path(), path);
        assert_eq!(reopened.recent_runs(10).unwrap().len(), 1);
        assert!(reopened.stats().unwrap().db_size_bytes > 0);
    }

    #[test]
    fn test_run_status_labels() {
        assert_eq!(RunStatus::Succeeded.to_string(), "succeeded");
        assert_eq!(RunStatus::from_db("failed"), RunStatus::Failed);
        assert_eq!(RunStatus::from_db("weird"), RunStatus::Failed);
    }
}
