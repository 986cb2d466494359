//! Cooperative status polling.
//!
//! Runs on the caller's thread: check cancel, check supersession, fetch,
//! sleep. Transport hiccups while fetching are logged and retried on the
//! next tick; an unknown task id ends the loop with `NotFound`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::{Job, JobStatus};
use crate::error::Result;

/// Shared stop signal for a poll loop.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where the poller reads job state from.
pub trait StatusSource {
    fn status(&self, task_id: &str) -> Result<Job>;

    /// Task id of the most recently created job for `subject`.
    fn latest_task(&self, subject: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed,
    Failed(String),
    /// A newer job for the same subject exists; its result is the one to show.
    Superseded { by: String },
    Cancelled,
}

/// Poll `task_id` until it is terminal, superseded, or `cancel` is raised.
///
/// `on_update` sees every successfully fetched non-terminal snapshot.
pub fn await_completion(
    source: &dyn StatusSource,
    subject: &str,
    task_id: &str,
    interval: Duration,
    cancel: &CancelFlag,
    mut on_update: impl FnMut(&Job),
) -> Result<PollOutcome> {
    loop {
        if cancel.is_cancelled() {
            debug!("Polling cancelled for {task_id}");
            return Ok(PollOutcome::Cancelled);
        }

        match source.latest_task(subject) {
            Ok(Some(latest)) if latest != task_id => {
                debug!("Job {task_id} superseded by {latest}");
                return Ok(PollOutcome::Superseded { by: latest });
            }
            Ok(_) => {}
            Err(e) => warn!("Could not check supersession for {subject}: {e}"),
        }

        match source.status(task_id) {
            Ok(job) => match job.status {
                JobStatus::Completed => return Ok(PollOutcome::Completed),
                JobStatus::Failed => {
                    return Ok(PollOutcome::Failed(job.error.unwrap_or_default()));
                }
                JobStatus::Queued | JobStatus::Processing => on_update(&job),
            },
            Err(e) if e.is_not_found() => return Err(e),
            Err(e) => warn!("Status check for {task_id} failed, retrying: {e}"),
        }

        thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct Scripted {
        statuses: RefCell<VecDeque<Result<Job>>>,
        latest: RefCell<VecDeque<Option<String>>>,
        fetches: RefCell<usize>,
    }

    impl Scripted {
        fn new(statuses: Vec<Result<Job>>) -> Self {
            Scripted {
                statuses: RefCell::new(statuses.into()),
                latest: RefCell::new(VecDeque::new()),
                fetches: RefCell::new(0),
            }
        }
    }

    impl StatusSource for Scripted {
        fn status(&self, _task_id: &str) -> Result<Job> {
            *self.fetches.borrow_mut() += 1;
            self.statuses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Other("script exhausted".into())))
        }

        fn latest_task(&self, _subject: &str) -> Result<Option<String>> {
            Ok(self
                .latest
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Some("t1".to_string())))
        }
    }

    fn job(status: JobStatus, progress: Option<u8>, error: Option<&str>) -> Result<Job> {
        Ok(Job {
            seq: 1,
            task_id: "t1".into(),
            subject: "s.mp4".into(),
            status,
            progress_percent: progress,
            error: error.map(str::to_string),
            model_hint: None,
            created_at: String::new(),
            updated_at: String::new(),
        })
    }

    fn run(source: &Scripted, cancel: &CancelFlag) -> (Result<PollOutcome>, Vec<Option<u8>>) {
        let mut seen = Vec::new();
        let outcome = await_completion(source, "s.mp4", "t1", Duration::ZERO, cancel, |j| {
            seen.push(j.progress_percent)
        });
        (outcome, seen)
    }

    #[test]
    fn transient_errors_are_retried_until_terminal() {
        let source = Scripted::new(vec![
            Err(Error::Other("connection reset".into())),
            job(JobStatus::Processing, Some(20), None),
            job(JobStatus::Processing, Some(65), None),
            job(JobStatus::Completed, Some(100), None),
        ]);
        let (outcome, seen) = run(&source, &CancelFlag::new());
        assert_eq!(outcome.unwrap(), PollOutcome::Completed);
        assert_eq!(seen, vec![Some(20), Some(65)]);
        assert_eq!(*source.fetches.borrow(), 4);
    }

    #[test]
    fn failure_message_is_surfaced() {
        let source = Scripted::new(vec![job(JobStatus::Failed, None, Some("model not found"))]);
        let (outcome, _) = run(&source, &CancelFlag::new());
        assert_eq!(outcome.unwrap(), PollOutcome::Failed("model not found".into()));
    }

    #[test]
    fn unknown_task_ends_polling() {
        let source = Scripted::new(vec![Err(Error::job_not_found("t1"))]);
        let (outcome, _) = run(&source, &CancelFlag::new());
        assert!(outcome.unwrap_err().is_not_found());
    }

    #[test]
    fn cancel_stops_before_fetching() {
        let source = Scripted::new(vec![job(JobStatus::Completed, None, None)]);
        let cancel = CancelFlag::new();
        cancel.cancel();
        let (outcome, _) = run(&source, &cancel);
        assert_eq!(outcome.unwrap(), PollOutcome::Cancelled);
        assert_eq!(*source.fetches.borrow(), 0);
    }

    #[test]
    fn supersession_stops_polling() {
        let source = Scripted::new(vec![
            job(JobStatus::Processing, Some(5), None),
            job(JobStatus::Completed, None, None),
        ]);
        source
            .latest
            .borrow_mut()
            .extend([Some("t1".to_string()), Some("t2".to_string())]);
        let (outcome, seen) = run(&source, &CancelFlag::new());
        assert_eq!(outcome.unwrap(), PollOutcome::Superseded { by: "t2".into() });
        assert_eq!(seen, vec![Some(5)]);
        assert_eq!(*source.fetches.borrow(), 1);
    }
}
