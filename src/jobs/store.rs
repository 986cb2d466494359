//! Durable job rows.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{OptionalExtension, Row};
use uuid::Uuid;

use super::{Job, JobStatus};
use crate::db::{timestamp_now, Database};
use crate::error::{Error, Result};

impl ToSql for JobStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for JobStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        JobStatus::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown job status '{s}'").into()))
    }
}

/// Persistence the job controller needs.
///
/// Terminal rows are never rewritten: status changes and progress reports
/// against a completed or failed job are no-ops.
pub trait JobStore: Send + Sync {
    /// Create a queued job with a fresh task id.
    fn insert_job(&self, subject: &str, model_hint: Option<&str>) -> Result<Job>;

    fn get_job(&self, task_id: &str) -> Result<Job>;

    /// Most recently created job for a subject, in any status.
    fn latest_job_for(&self, subject: &str) -> Result<Option<Job>>;

    /// Job history for a subject, newest first.
    fn jobs_for(&self, subject: &str) -> Result<Vec<Job>>;

    /// Move a non-terminal job to `status`. Returns false if the job was
    /// already terminal.
    fn transition(&self, task_id: &str, status: JobStatus, error: Option<&str>) -> Result<bool>;

    /// Raise progress of a processing job. Lower values are ignored and the
    /// value is clamped to 100.
    fn record_progress(&self, task_id: &str, percent: u8) -> Result<()>;

    /// Refresh `updated_at` on the given non-terminal jobs, marking their
    /// worker as alive. Returns how many rows were touched.
    fn touch_jobs(&self, task_ids: &[String]) -> Result<usize>;
}

const JOB_COLUMNS: &str =
    "seq, task_id, subject, status, progress_percent, error, model_hint, created_at, updated_at";

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        seq: row.get(0)?,
        task_id: row.get(1)?,
        subject: row.get(2)?,
        status: row.get(3)?,
        progress_percent: row.get(4)?,
        error: row.get(5)?,
        model_hint: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl JobStore for Database {
    fn insert_job(&self, subject: &str, model_hint: Option<&str>) -> Result<Job> {
        let task_id = Uuid::new_v4().to_string();
        let now = timestamp_now();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO jobs (task_id, subject, status, model_hint, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![task_id, subject, JobStatus::Queued, model_hint, now],
        )?;
        let seq = conn.last_insert_rowid();

        Ok(Job {
            seq,
            task_id,
            subject: subject.to_string(),
            status: JobStatus::Queued,
            progress_percent: None,
            error: None,
            model_hint: model_hint.map(str::to_string),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    fn get_job(&self, task_id: &str) -> Result<Job> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE task_id = ?1");
        self.conn()
            .query_row(&sql, [task_id], job_from_row)
            .optional()?
            .ok_or_else(|| Error::job_not_found(task_id))
    }

    fn latest_job_for(&self, subject: &str) -> Result<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE subject = ?1 ORDER BY seq DESC LIMIT 1");
        let job = self.conn().query_row(&sql, [subject], job_from_row).optional()?;
        Ok(job)
    }

    fn jobs_for(&self, subject: &str) -> Result<Vec<Job>> {
        let conn = self.conn();
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE subject = ?1 ORDER BY seq DESC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([subject], job_from_row)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?);
        }
        Ok(jobs)
    }

    fn transition(&self, task_id: &str, status: JobStatus, error: Option<&str>) -> Result<bool> {
        let completed = status == JobStatus::Completed;
        let changed = self.conn().execute(
            "UPDATE jobs
             SET status = ?2,
                 error = ?3,
                 progress_percent = CASE WHEN ?4 THEN 100 ELSE progress_percent END,
                 updated_at = ?5
             WHERE task_id = ?1 AND status IN ('queued', 'processing')",
            rusqlite::params![task_id, status, error, completed, timestamp_now()],
        )?;
        Ok(changed > 0)
    }

    fn record_progress(&self, task_id: &str, percent: u8) -> Result<()> {
        let percent = percent.min(100);
        self.conn().execute(
            "UPDATE jobs
             SET progress_percent = MAX(COALESCE(progress_percent, 0), ?2),
                 updated_at = ?3
             WHERE task_id = ?1 AND status = 'processing'",
            rusqlite::params![task_id, percent, timestamp_now()],
        )?;
        Ok(())
    }

    fn touch_jobs(&self, task_ids: &[String]) -> Result<usize> {
        if task_ids.is_empty() {
            return Ok(0);
        }
        let now = timestamp_now();
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "UPDATE jobs SET updated_at = ?2
             WHERE task_id = ?1 AND status IN ('queued', 'processing')",
        )?;
        let mut touched = 0;
        for task_id in task_ids {
            touched += stmt.execute(rusqlite::params![task_id, now])?;
        }
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_assigns_unique_ids_and_increasing_seq() {
        let db = Database::open_in_memory().unwrap();
        let a = db.insert_job("a.mp4", None).unwrap();
        let b = db.insert_job("a.mp4", Some("llama3.2:3b")).unwrap();
        assert_ne!(a.task_id, b.task_id);
        assert!(b.seq > a.seq);
        assert_eq!(a.status, JobStatus::Queued);

        let latest = db.latest_job_for("a.mp4").unwrap().unwrap();
        assert_eq!(latest.task_id, b.task_id);
        assert_eq!(latest.model_hint.as_deref(), Some("llama3.2:3b"));
        assert!(db.latest_job_for("other.mp4").unwrap().is_none());

        let history: Vec<String> = db
            .jobs_for("a.mp4")
            .unwrap()
            .into_iter()
            .map(|j| j.task_id)
            .collect();
        assert_eq!(history, vec![b.task_id, a.task_id]);
    }

    #[test]
    fn progress_is_monotonic_and_clamped() {
        let db = Database::open_in_memory().unwrap();
        let job = db.insert_job("p.mp4", None).unwrap();

        // Ignored until the job is processing.
        db.record_progress(&job.task_id, 30).unwrap();
        assert_eq!(db.get_job(&job.task_id).unwrap().progress_percent, None);

        assert!(db.transition(&job.task_id, JobStatus::Processing, None).unwrap());
        db.record_progress(&job.task_id, 40).unwrap();
        db.record_progress(&job.task_id, 20).unwrap();
        assert_eq!(db.get_job(&job.task_id).unwrap().progress_percent, Some(40));

        db.record_progress(&job.task_id, 250).unwrap();
        assert_eq!(db.get_job(&job.task_id).unwrap().progress_percent, Some(100));
    }

    #[test]
    fn terminal_jobs_are_immutable() {
        let db = Database::open_in_memory().unwrap();
        let job = db.insert_job("t.mp4", None).unwrap();
        db.transition(&job.task_id, JobStatus::Processing, None).unwrap();
        assert!(db
            .transition(&job.task_id, JobStatus::Failed, Some("boom"))
            .unwrap());
        assert!(!db.transition(&job.task_id, JobStatus::Completed, None).unwrap());
        db.record_progress(&job.task_id, 90).unwrap();

        let stored = db.get_job(&job.task_id).unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("boom"));
        assert_eq!(stored.progress_percent, None);
    }

    #[test]
    fn touch_skips_terminal_jobs() {
        let db = Database::open_in_memory().unwrap();
        let live = db.insert_job("a.mp4", None).unwrap();
        let done = db.insert_job("b.mp4", None).unwrap();
        db.transition(&done.task_id, JobStatus::Failed, Some("x")).unwrap();
        db.conn()
            .execute("UPDATE jobs SET updated_at = '2020-01-01T00:00:00Z'", [])
            .unwrap();

        let touched = db
            .touch_jobs(&[live.task_id.clone(), done.task_id.clone(), "gone".into()])
            .unwrap();
        assert_eq!(touched, 1);
        assert_ne!(db.get_job(&live.task_id).unwrap().updated_at, "2020-01-01T00:00:00Z");
        assert_eq!(db.get_job(&done.task_id).unwrap().updated_at, "2020-01-01T00:00:00Z");
        assert_eq!(db.touch_jobs(&[]).unwrap(), 0);
    }

    #[test]
    fn unknown_task_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_job("nope").unwrap_err().is_not_found());
    }
}
