//! Version Store Accessor: append-only, per-subject numbered summary snapshots.

use rusqlite::{OptionalExtension, Row};
use tracing::info;

use crate::db::models::{NewVersion, Version, VersionMeta};
use crate::db::{timestamp_now, Database};
use crate::error::{Error, Result};

/// Contract the job controller and the CLI need from summary persistence.
pub trait VersionStore: Send + Sync {
    /// Append a snapshot and return its number (`previous max + 1`, starting at 1).
    fn append_version(&self, new: &NewVersion) -> Result<i64>;

    /// Fetch one version by number.
    fn get_version(&self, subject: &str, version: i64) -> Result<Version>;

    /// Version metadata for a subject, newest first.
    fn list_versions(&self, subject: &str) -> Result<Vec<VersionMeta>>;

    /// The current result for a subject: the version produced by the most
    /// recently created job, so a superseded job finishing late never wins.
    fn latest_completed(&self, subject: &str) -> Result<Version>;
}

const VERSION_COLUMNS: &str = "subject, version, model_used, generated_at, processing_time_seconds,
     summary_text, transcript_text, task_id";

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<Version> {
    Ok(Version {
        subject: row.get(0)?,
        version: row.get(1)?,
        model_used: row.get(2)?,
        generated_at: row.get(3)?,
        processing_time_seconds: row.get(4)?,
        summary_text: row.get(5)?,
        transcript_text: row.get(6)?,
        task_id: row.get(7)?,
    })
}

impl VersionStore for Database {
    fn append_version(&self, new: &NewVersion) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let next: i64 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM summary_versions WHERE subject = ?1",
            [&new.subject],
            |r| r.get(0),
        )?;

        let (task_id, job_seq) = match &new.job {
            Some((id, seq)) => (Some(id.as_str()), Some(*seq)),
            None => (None, None),
        };
        let now = timestamp_now();

        tx.execute(
            "INSERT INTO summary_versions
                (subject, version, model_used, generated_at, processing_time_seconds,
                 summary_text, transcript_text, task_id, job_seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                new.subject,
                next,
                new.model_used,
                now,
                new.processing_time_seconds,
                new.summary_text,
                new.transcript_text,
                task_id,
                job_seq,
            ],
        )?;
        tx.commit()?;

        info!("Stored {} v{} ({})", new.subject, next, new.model_used);
        Ok(next)
    }

    fn get_version(&self, subject: &str, version: i64) -> Result<Version> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {VERSION_COLUMNS} FROM summary_versions WHERE subject = ?1 AND version = ?2"
        );
        conn.query_row(&sql, rusqlite::params![subject, version], version_from_row)
            .optional()?
            .ok_or_else(|| Error::version_not_found(subject, Some(version)))
    }

    fn list_versions(&self, subject: &str) -> Result<Vec<VersionMeta>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT version, model_used, generated_at, processing_time_seconds, task_id
             FROM summary_versions WHERE subject = ?1 ORDER BY version DESC",
        )?;

        let rows = stmt.query_map([subject], |row| {
            Ok(VersionMeta {
                version: row.get(0)?,
                model_used: row.get(1)?,
                generated_at: row.get(2)?,
                processing_time_seconds: row.get(3)?,
                task_id: row.get(4)?,
            })
        })?;

        let mut versions = Vec::new();
        for row in rows {
            versions.push(row?);
        }
        Ok(versions)
    }

    fn latest_completed(&self, subject: &str) -> Result<Version> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {VERSION_COLUMNS} FROM summary_versions WHERE subject = ?1
             ORDER BY COALESCE(job_seq, 0) DESC, version DESC LIMIT 1"
        );
        conn.query_row(&sql, [subject], version_from_row)
            .optional()?
            .ok_or_else(|| Error::version_not_found(subject, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_version(subject: &str, summary: &str, job: Option<(&str, i64)>) -> NewVersion {
        NewVersion {
            subject: subject.to_string(),
            model_used: "llama3.2:3b".to_string(),
            processing_time_seconds: 12.5,
            summary_text: summary.to_string(),
            transcript_text: None,
            job: job.map(|(id, seq)| (id.to_string(), seq)),
        }
    }

    #[test]
    fn versions_are_numbered_per_subject_from_one() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.append_version(&new_version("a.mp4", "one", None)).unwrap(), 1);
        assert_eq!(db.append_version(&new_version("a.mp4", "two", None)).unwrap(), 2);
        assert_eq!(db.append_version(&new_version("b.mp4", "other", None)).unwrap(), 1);
        assert_eq!(db.append_version(&new_version("a.mp4", "three", None)).unwrap(), 3);

        let listed: Vec<i64> = db
            .list_versions("a.mp4")
            .unwrap()
            .iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(listed, vec![3, 2, 1]);
    }

    #[test]
    fn get_version_round_trips_text_and_reports_missing() {
        let db = Database::open_in_memory().unwrap();
        let mut nv = new_version("course/intro.mp4", "KEY POINTS\n- Fast", None);
        nv.transcript_text = Some("hello [JUMP_POINTS][]".to_string());
        db.append_version(&nv).unwrap();

        let v = db.get_version("course/intro.mp4", 1).unwrap();
        assert_eq!(v.summary_text, "KEY POINTS\n- Fast");
        assert_eq!(v.transcript_text.as_deref(), Some("hello [JUMP_POINTS][]"));
        assert_eq!(v.model_used, "llama3.2:3b");

        let err = db.get_version("course/intro.mp4", 2).unwrap_err();
        assert!(err.is_not_found());
        assert!(db.latest_completed("nothing.mp4").unwrap_err().is_not_found());
    }

    #[test]
    fn latest_completed_follows_job_creation_order() {
        let db = Database::open_in_memory().unwrap();
        // Newer job (seq 2) finishes first, superseded job (seq 1) finishes later.
        db.append_version(&new_version("v.mp4", "from newer job", Some(("new", 2))))
            .unwrap();
        let late = db
            .append_version(&new_version("v.mp4", "from superseded job", Some(("old", 1))))
            .unwrap();
        assert_eq!(late, 2);

        let latest = db.latest_completed("v.mp4").unwrap();
        assert_eq!(latest.version, 1);
        assert_eq!(latest.summary_text, "from newer job");
        // The late result is still reachable by number.
        assert_eq!(db.get_version("v.mp4", 2).unwrap().task_id.as_deref(), Some("old"));
    }

    #[test]
    fn concurrent_appends_never_repeat_numbers() {
        let db = std::sync::Arc::new(Database::open_in_memory().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                std::thread::spawn(move || {
                    db.append_version(&new_version("c.mp4", &format!("run {i}"), None))
                        .unwrap()
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut numbers: Vec<i64> = db
            .list_versions("c.mp4")
            .unwrap()
            .iter()
            .map(|v| v.version)
            .collect();
        numbers.reverse();
        assert_eq!(numbers, (1..=8).collect::<Vec<_>>());
    }
}
