//! Jobs and job handles.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use time::Time;
use tokio::sync::Notify;

use crate::framework::handler::BoxFuture;

// =============================================================================
// Recurrence
// =============================================================================

/// When a job fires again after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    /// Fires once.
    Once,
    /// Fires every `interval`, measured from the previous due time.
    Interval(Duration),
    /// Fires every day at a wall-clock time.
    Daily(Time),
    /// Fires every month on `day` at a wall-clock time. Months shorter than
    /// `day` fire on their last day.
    Monthly { day: u8, at: Time },
}

impl Recurrence {
    pub fn is_repeating(&self) -> bool {
        !matches!(self, Self::Once)
    }
}

// =============================================================================
// Callback
// =============================================================================

/// Converts a job callback's return value into a result.
pub trait IntoJobResult {
    fn into_job_result(self) -> anyhow::Result<()>;
}

impl IntoJobResult for () {
    fn into_job_result(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<E> IntoJobResult for Result<(), E>
where
    E: Into<anyhow::Error>,
{
    fn into_job_result(self) -> anyhow::Result<()> {
        self.map_err(Into::into)
    }
}

/// A job callback. Receives the handle of its own job, so it can cancel
/// itself.
pub trait JobCallback: Send + Sync + 'static {
    fn call(&self, job: JobHandle) -> BoxFuture<'static, anyhow::Result<()>>;
}

impl<F, Fut, R> JobCallback for F
where
    F: Fn(JobHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoJobResult,
{
    fn call(&self, job: JobHandle) -> BoxFuture<'static, anyhow::Result<()>> {
        let fut = (self)(job);
        Box::pin(async move { fut.await.into_job_result() })
    }
}

// =============================================================================
// Job State
// =============================================================================

/// Identifier of a job, unique within its scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub(crate) u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

pub(crate) struct JobState {
    pub(crate) id: JobId,
    pub(crate) name: String,
    pub(crate) recurrence: Recurrence,
    pub(crate) callback: Box<dyn JobCallback>,
    cancelled: AtomicBool,
    remove_after_run: AtomicBool,
    runs: AtomicU64,
    wake: Weak<Notify>,
}

impl JobState {
    pub(crate) fn new(
        id: JobId,
        name: String,
        recurrence: Recurrence,
        callback: Box<dyn JobCallback>,
        wake: Weak<Notify>,
    ) -> Self {
        Self {
            id,
            name,
            recurrence,
            callback,
            cancelled: AtomicBool::new(false),
            remove_after_run: AtomicBool::new(false),
            runs: AtomicU64::new(0),
            wake,
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel)
            && let Some(wake) = self.wake.upgrade()
        {
            wake.notify_one();
        }
    }

    /// Called after every run. Returns `true` if the job should be scheduled
    /// again.
    pub(crate) fn finish_run(&self) -> bool {
        self.runs.fetch_add(1, Ordering::AcqRel);
        if self.remove_after_run.load(Ordering::Acquire) {
            self.cancelled.store(true, Ordering::Release);
        }
        self.recurrence.is_repeating() && !self.is_cancelled()
    }
}

// =============================================================================
// Job Handle
// =============================================================================

/// Handle to a submitted job.
///
/// Cloning is cheap; every clone refers to the same job.
#[derive(Clone)]
pub struct JobHandle {
    pub(crate) state: Arc<JobState>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.state.id
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn recurrence(&self) -> Recurrence {
        self.state.recurrence
    }

    pub fn is_repeating(&self) -> bool {
        self.state.recurrence.is_repeating()
    }

    /// Interval of a fixed-interval job.
    pub fn interval(&self) -> Option<Duration> {
        match self.state.recurrence {
            Recurrence::Interval(interval) => Some(interval),
            _ => None,
        }
    }

    /// Whether the job has been cancelled. One-shot jobs are not marked
    /// cancelled by running.
    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    /// Number of completed runs.
    pub fn run_count(&self) -> u64 {
        self.state.runs.load(Ordering::Acquire)
    }

    /// Prevents all future firings. A run already in progress completes.
    /// Idempotent.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    /// Alias of [`cancel`](Self::cancel).
    pub fn remove(&self) {
        self.cancel();
    }

    /// Cancels the job once its current or next run completes.
    pub fn schedule_removal(&self) {
        self.state.remove_after_run.store(true, Ordering::Release);
    }
}

impl PartialEq for JobHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Eq for JobHandle {}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.state.id)
            .field("name", &self.state.name)
            .field("recurrence", &self.state.recurrence)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(recurrence: Recurrence) -> JobHandle {
        let callback: Box<dyn JobCallback> = Box::new(|_job: JobHandle| async {});
        JobHandle {
            state: Arc::new(JobState::new(
                JobId(1),
                "test".into(),
                recurrence,
                callback,
                Weak::new(),
            )),
        }
    }

    #[test]
    fn test_introspection() {
        let once = handle(Recurrence::Once);
        assert!(!once.is_repeating());
        assert_eq!(once.interval(), None);

        let every = handle(Recurrence::Interval(Duration::from_secs(5)));
        assert!(every.is_repeating());
        assert_eq!(every.interval(), Some(Duration::from_secs(5)));
        assert_eq!(every.id().to_string(), "job-1");
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let job = handle(Recurrence::Interval(Duration::from_secs(1)));
        job.cancel();
        job.remove();
        assert!(job.is_cancelled());
        assert!(!job.state.finish_run());
    }

    #[test]
    fn test_schedule_removal_takes_effect_after_run() {
        let job = handle(Recurrence::Interval(Duration::from_secs(1)));
        job.schedule_removal();
        assert!(!job.is_cancelled());
        assert!(!job.state.finish_run());
        assert!(job.is_cancelled());
        assert_eq!(job.run_count(), 1);
    }
}
