//! Job Controller: one active generation per subject, run on a worker thread,
//! observed by polling.

mod pool;
pub mod poll;
pub mod store;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::db::models::NewVersion;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::generate::Generator;
use crate::versions::VersionStore;
use poll::{CancelFlag, PollOutcome, StatusSource};
use pool::WorkerPool;
pub use store::JobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A generation job as stored in the `jobs` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Creation order across all jobs.
    pub seq: i64,
    pub task_id: String,
    pub subject: String,
    pub status: JobStatus,
    pub progress_percent: Option<u8>,
    pub error: Option<String>,
    pub model_hint: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Tuning for the controller's workers and liveness tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    /// Jobs processed at once; the rest wait as `queued`.
    pub max_workers: usize,
    /// How often this process refreshes `updated_at` on the jobs it owns.
    pub heartbeat_interval: Duration,
    /// A queued or processing job not refreshed for this long has no live
    /// worker and is failed on the next lookup.
    pub stale_after: Duration,
}

pub const DEFAULT_MAX_WORKERS: usize = 2;
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30);

/// Error recorded on a job whose worker disappeared.
pub const WORKER_EXITED: &str = "worker exited before the job finished";

impl Default for JobOptions {
    fn default() -> Self {
        JobOptions {
            max_workers: DEFAULT_MAX_WORKERS,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

/// Starts generation jobs and answers status queries.
///
/// Cloning is cheap; clones share the worker pool and the database.
#[derive(Clone)]
pub struct JobController {
    inner: Arc<Inner>,
}

struct Inner {
    db: Arc<Database>,
    generator: Arc<dyn Generator>,
    options: JobOptions,
    /// Serializes the check-then-create in `start`.
    start_lock: Mutex<()>,
    /// Task ids queued or running in this process. Heartbeats go to these.
    live: Mutex<HashSet<String>>,
    pool: WorkerPool<Job>,
}

impl Inner {
    fn live(&self) -> MutexGuard<'_, HashSet<String>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl JobController {
    pub fn new(db: Arc<Database>, generator: Arc<dyn Generator>) -> Self {
        Self::with_options(db, generator, JobOptions::default())
    }

    pub fn with_options(db: Arc<Database>, generator: Arc<dyn Generator>, options: JobOptions) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            Inner {
                db,
                generator,
                options,
                start_lock: Mutex::new(()),
                live: Mutex::new(HashSet::new()),
                pool: WorkerPool::new("vsum-worker", options.max_workers, move |job: Job| {
                    match weak.upgrade() {
                        Some(inner) => {
                            JobController { inner }.run_job(job);
                            true
                        }
                        None => false,
                    }
                }),
            }
        });

        let weak = Arc::downgrade(&inner);
        let spawned = std::thread::Builder::new()
            .name("vsum-heartbeat".to_string())
            .spawn(move || heartbeat(weak, options.heartbeat_interval));
        if let Err(e) = spawned {
            warn!("Could not start heartbeat; jobs may be reaped while running: {e}");
        }

        JobController { inner }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.inner.db
    }

    /// Start generation for `subject`, or return the job already running for it.
    ///
    /// With `force`, a new job is always created. The previous job keeps
    /// running but is superseded: it is no longer reported as active and its
    /// result never becomes the subject's latest version.
    pub fn start(&self, subject: &str, force: bool, model_hint: Option<&str>) -> Result<String> {
        let _guard = self
            .inner
            .start_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(task_id) = self.find_active(subject)? {
            if !force {
                debug!("Reusing active job {task_id} for {subject}");
                return Ok(task_id);
            }
            info!("Job {task_id} for {subject} is being superseded");
        }

        let job = self.inner.db.insert_job(subject, model_hint)?;
        info!("Queued job {} for {subject}", job.task_id);
        self.inner.live().insert(job.task_id.clone());

        if let Err(e) = self.inner.pool.submit(job.clone()) {
            error!("Could not spawn worker for {}: {e}", job.task_id);
            self.inner.live().remove(&job.task_id);
            self.inner
                .db
                .transition(&job.task_id, JobStatus::Failed, Some(&e.to_string()))?;
            return Err(e.into());
        }

        Ok(job.task_id)
    }

    /// Last known state of a job. Never blocks on generation.
    ///
    /// A queued or processing job whose worker stopped sending heartbeats is
    /// failed here, so callers never wait on it forever.
    pub fn status(&self, task_id: &str) -> Result<Job> {
        let job = self.inner.db.get_job(task_id)?;
        self.reap_if_abandoned(job)
    }

    /// The active job for `subject`, read from the durable job table so another
    /// process (or a restarted one) can resume polling it.
    pub fn find_active(&self, subject: &str) -> Result<Option<String>> {
        let Some(job) = self.inner.db.latest_job_for(subject)? else {
            return Ok(None);
        };
        let job = self.reap_if_abandoned(job)?;
        Ok((!job.status.is_terminal()).then_some(job.task_id))
    }

    /// Version number of the subject's current summary, when nothing is
    /// running for it.
    pub fn completed_version(&self, subject: &str) -> Result<Option<i64>> {
        if self.find_active(subject)?.is_some() {
            return Ok(None);
        }
        match self.inner.db.latest_completed(subject) {
            Ok(version) => Ok(Some(version.version)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn jobs_for(&self, subject: &str) -> Result<Vec<Job>> {
        self.inner.db.jobs_for(subject)
    }

    /// Block the calling thread until `task_id` finishes, is superseded, or
    /// `cancel` is raised.
    pub fn await_completion(
        &self,
        task_id: &str,
        interval: Duration,
        cancel: &CancelFlag,
        on_update: impl FnMut(&Job),
    ) -> Result<PollOutcome> {
        let subject = self.status(task_id)?.subject;
        poll::await_completion(self, &subject, task_id, interval, cancel, on_update)
    }

    /// Fail every job this process still owns. Call before exiting with jobs
    /// unfinished; their workers die with the process.
    pub fn abandon_unfinished(&self, reason: &str) -> Result<usize> {
        let owned: Vec<String> = self.inner.live().drain().collect();
        let mut abandoned = 0;
        for task_id in owned {
            if self.inner.db.transition(&task_id, JobStatus::Failed, Some(reason))? {
                info!("Abandoned job {task_id}");
                abandoned += 1;
            }
        }
        Ok(abandoned)
    }

    fn owns(&self, task_id: &str) -> bool {
        self.inner.live().contains(task_id)
    }

    fn reap_if_abandoned(&self, job: Job) -> Result<Job> {
        if job.status.is_terminal()
            || self.owns(&job.task_id)
            || !is_stale(&job.updated_at, self.inner.options.stale_after)
        {
            return Ok(job);
        }
        warn!(
            "Job {} for {} has not reported since {}; marking it failed",
            job.task_id, job.subject, job.updated_at
        );
        self.inner
            .db
            .transition(&job.task_id, JobStatus::Failed, Some(WORKER_EXITED))?;
        self.inner.db.get_job(&job.task_id)
    }

    fn run_job(&self, job: Job) {
        let db = &self.inner.db;
        let task_id = job.task_id.as_str();

        match db.transition(task_id, JobStatus::Processing, None) {
            Ok(true) => {}
            Ok(false) => {
                debug!("Job {task_id} finished before a worker picked it up");
                self.inner.live().remove(task_id);
                return;
            }
            Err(e) => error!("Could not mark {task_id} processing: {e}"),
        }
        info!("Generating summary for {}", job.subject);

        let report = |percent: u8| {
            if let Err(e) = db.record_progress(task_id, percent) {
                warn!("Progress update for {task_id} failed: {e}");
            }
        };

        let result = self
            .inner
            .generator
            .generate(&job.subject, job.model_hint.as_deref(), &report)
            .and_then(|generation| {
                if db.get_job(task_id)?.status.is_terminal() {
                    return Err(Error::GenerationFailed(
                        "job was abandoned while generating".into(),
                    ));
                }
                db.append_version(&NewVersion {
                    subject: job.subject.clone(),
                    model_used: generation.model_used,
                    processing_time_seconds: generation.processing_time_seconds,
                    summary_text: generation.summary_text,
                    transcript_text: generation.transcript_text,
                    job: Some((job.task_id.clone(), job.seq)),
                })
            });

        let finished = match result {
            Ok(version) => {
                info!("Job {task_id} completed: {} v{version}", job.subject);
                db.transition(task_id, JobStatus::Completed, None)
            }
            Err(e) => {
                let message = failure_message(e);
                warn!("Job {task_id} failed: {message}");
                db.transition(task_id, JobStatus::Failed, Some(&message))
            }
        };
        if let Err(e) = finished {
            error!("Could not record outcome of {task_id}: {e}");
        }

        self.inner.live().remove(task_id);
    }
}

/// Refresh the jobs this process owns until the controller is dropped.
fn heartbeat(inner: Weak<Inner>, interval: Duration) {
    loop {
        std::thread::sleep(interval);
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let owned: Vec<String> = inner.live().iter().cloned().collect();
        if let Err(e) = inner.db.touch_jobs(&owned) {
            warn!("Heartbeat for {} job(s) failed: {e}", owned.len());
        }
    }
}

/// Whether a `*_at` timestamp is at least `bound` in the past. Unparseable
/// values are treated as fresh.
fn is_stale(timestamp: &str, bound: Duration) -> bool {
    let Ok(at) = chrono::DateTime::parse_from_rfc3339(timestamp) else {
        return false;
    };
    chrono::Utc::now()
        .signed_duration_since(at.with_timezone(&chrono::Utc))
        .to_std()
        .is_ok_and(|age| age >= bound)
}

impl StatusSource for JobController {
    fn status(&self, task_id: &str) -> Result<Job> {
        JobController::status(self, task_id)
    }

    fn latest_task(&self, subject: &str) -> Result<Option<String>> {
        Ok(self.inner.db.latest_job_for(subject)?.map(|job| job.task_id))
    }
}

/// Generator failures are stored as the generator reported them.
fn failure_message(err: Error) -> String {
    match err {
        Error::GenerationFailed(message) => message,
        other => other.to_string(),
    }
}
