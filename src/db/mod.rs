pub mod migrations;
pub mod models;
pub mod schema;

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::error::{Error, Result};
use models::{DbStats, SubjectSummary};

/// Current UTC time in the format stored in every `*_at` column.
pub(crate) fn timestamp_now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// SQLite-backed persistence for summary versions and job rows.
///
/// The connection sits behind a mutex so worker threads and pollers can share
/// one `Database` through an `Arc`.
pub struct Database {
    conn: Mutex<Connection>,
    pub path: PathBuf,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Performance pragmas
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;

        schema::create_schema(&conn)?;
        migrations::run_migrations(&conn)?;

        info!("Opened database: {}", path.display());

        Ok(Database {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    /// Fresh private database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::create_schema(&conn)?;
        migrations::run_migrations(&conn)?;
        Ok(Database {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    /// Default database path: ~/.vsum/vsum.db
    pub fn default_db_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;
        Ok(home.join(".vsum").join("vsum.db"))
    }

    /// Lock the connection. A panic on another thread while holding the lock
    /// does not leave SQLite in a torn state, so poisoning is ignored.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read a value from the meta table.
    pub fn meta_value(&self, key: &str) -> Result<Option<String>> {
        use rusqlite::OptionalExtension;
        let value = self
            .conn()
            .query_row("SELECT value FROM vsum_meta WHERE key = ?1", [key], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Distinct subjects with their version counts, most recently generated first.
    pub fn subjects(&self) -> Result<Vec<SubjectSummary>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT subject, COUNT(*), MAX(version), MAX(generated_at)
             FROM summary_versions
             GROUP BY subject
             ORDER BY MAX(generated_at) DESC, subject",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SubjectSummary {
                subject: row.get(0)?,
                versions: row.get(1)?,
                latest_version: row.get(2)?,
                last_generated_at: row.get(3)?,
            })
        })?;

        let mut subjects = Vec::new();
        for row in rows {
            subjects.push(row?);
        }
        Ok(subjects)
    }

    /// Get database statistics.
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.conn();
        let subjects: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT subject) FROM summary_versions",
            [],
            |r| r.get(0),
        )?;
        let versions: i64 =
            conn.query_row("SELECT COUNT(*) FROM summary_versions", [], |r| r.get(0))?;
        let jobs: i64 = conn.query_row("SELECT COUNT(*) FROM jobs", [], |r| r.get(0))?;
        let active_jobs: i64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status IN ('queued', 'processing')",
            [],
            |r| r.get(0),
        )?;
        let failed_jobs: i64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = 'failed'",
            [],
            |r| r.get(0),
        )?;
        let avg_processing_seconds: Option<f64> = conn.query_row(
            "SELECT AVG(processing_time_seconds) FROM summary_versions",
            [],
            |r| r.get(0),
        )?;
        drop(conn);

        let db_size_bytes = std::fs::metadata(&self.path)
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(DbStats {
            subjects,
            versions,
            jobs,
            active_jobs,
            failed_jobs,
            avg_processing_seconds: avg_processing_seconds.unwrap_or(0.0),
            db_size_bytes,
        })
    }
}
