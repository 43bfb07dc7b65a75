//! The scheduler loop.
//!
//! [`JobScheduler`] owns the job queue and a single timer loop ([`run`]).
//! The loop sleeps until the earliest due job, a new submission, a
//! cancellation, or shutdown, whichever comes first. Due jobs run on their own
//! tasks so a slow callback never delays other jobs. A repeating job is put
//! back in the queue only after its callback returns, so runs of the same job
//! never overlap.
//!
//! [`run`]: JobScheduler::run

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use time::{OffsetDateTime, Time, UtcOffset};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::foundation::error::{SubmitError, SubmitResult};
use crate::foundation::observe::{BoxedSink, Severity, default_sink};
use crate::framework::dispatcher::panic_message;
use crate::scheduler::calendar::{local_offset_or_utc, next_daily, next_monthly, now_in, to_instant};
use crate::scheduler::job::{JobCallback, JobHandle, JobId, JobState, Recurrence};
use crate::scheduler::queue::{Entry, JobQueue};

struct Shared {
    queue: Mutex<JobQueue>,
    wake: Arc<Notify>,
    next_id: AtomicU64,
    offset: UtcOffset,
    sink: BoxedSink,
    shutdown: CancellationToken,
    running: AtomicBool,
}

// =============================================================================
// Builder
// =============================================================================

/// Configures a [`JobScheduler`].
#[derive(Default)]
pub struct SchedulerBuilder {
    offset: Option<UtcOffset>,
    sink: Option<BoxedSink>,
}

impl SchedulerBuilder {
    /// UTC offset for daily and monthly jobs. Defaults to the host's local
    /// offset at build time, or UTC.
    pub fn utc_offset(mut self, offset: UtcOffset) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Sink receiving job failures. Defaults to the tracing sink.
    pub fn sink(mut self, sink: BoxedSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> JobScheduler {
        JobScheduler {
            shared: Arc::new(Shared {
                queue: Mutex::new(JobQueue::default()),
                wake: Arc::new(Notify::new()),
                next_id: AtomicU64::new(1),
                offset: self.offset.unwrap_or_else(local_offset_or_utc),
                sink: self.sink.unwrap_or_else(default_sink),
                shutdown: CancellationToken::new(),
                running: AtomicBool::new(false),
            }),
        }
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Runs callbacks at future times.
///
/// Cloning is cheap; clones share the same queue and loop.
#[derive(Clone)]
pub struct JobScheduler {
    shared: Arc<Shared>,
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl JobScheduler {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::default()
    }

    /// UTC offset used for daily and monthly jobs.
    pub fn utc_offset(&self) -> UtcOffset {
        self.shared.offset
    }

    /// Number of jobs waiting in the queue, not counting cancelled ones.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().live_len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    // -------------------------------------------------------------------------
    // Submission
    // -------------------------------------------------------------------------

    /// Submits a job with an explicit first due time and recurrence.
    ///
    /// Everything else is a shorthand for this.
    pub fn submit<C>(
        &self,
        name: impl Into<String>,
        first_due: Instant,
        recurrence: Recurrence,
        callback: C,
    ) -> SubmitResult<JobHandle>
    where
        C: JobCallback,
    {
        self.submit_inner(name.into(), first_due, None, recurrence, Box::new(callback))
    }

    fn submit_inner(
        &self,
        name: String,
        first_due: Instant,
        wall: Option<OffsetDateTime>,
        recurrence: Recurrence,
        callback: Box<dyn JobCallback>,
    ) -> SubmitResult<JobHandle> {
        match recurrence {
            Recurrence::Interval(interval) if interval.is_zero() => {
                return Err(SubmitError::ZeroInterval);
            }
            Recurrence::Monthly { day, .. } if !(1..=31).contains(&day) => {
                return Err(SubmitError::InvalidDayOfMonth(day));
            }
            Recurrence::Interval(interval) if first_due.checked_add(interval).is_none() => {
                return Err(SubmitError::DueOutOfRange);
            }
            _ => {}
        }
        if self.is_shut_down() {
            return Err(SubmitError::ShutDown);
        }

        let id = JobId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let state = Arc::new(JobState::new(
            id,
            name,
            recurrence,
            callback,
            Arc::downgrade(&self.shared.wake),
        ));
        self.shared
            .queue
            .lock()
            .push(first_due, wall, Arc::clone(&state));
        self.shared.wake.notify_one();

        debug!(job = %id, name = %state.name, ?recurrence, "Job submitted");
        Ok(JobHandle { state })
    }

    /// Runs `callback` once at `when`.
    pub fn submit_once<C: JobCallback>(&self, when: Instant, callback: C) -> SubmitResult<JobHandle> {
        self.submit("once", when, Recurrence::Once, callback)
    }

    /// Runs `callback` once after `delay`.
    pub fn submit_after<C: JobCallback>(
        &self,
        delay: Duration,
        callback: C,
    ) -> SubmitResult<JobHandle> {
        let when = Instant::now()
            .checked_add(delay)
            .ok_or(SubmitError::DueOutOfRange)?;
        self.submit_once(when, callback)
    }

    /// Runs `callback` once at a wall-clock time. Past times run immediately.
    pub fn submit_at<C: JobCallback>(
        &self,
        when: OffsetDateTime,
        callback: C,
    ) -> SubmitResult<JobHandle> {
        let due = to_instant(when, OffsetDateTime::now_utc(), Instant::now())
            .ok_or(SubmitError::DueOutOfRange)?;
        self.submit("at", due, Recurrence::Once, callback)
    }

    /// Runs `callback` every `interval`, first after `first` (or one interval
    /// from now).
    pub fn submit_repeating<C: JobCallback>(
        &self,
        interval: Duration,
        first: Option<Duration>,
        callback: C,
    ) -> SubmitResult<JobHandle> {
        let first_due = Instant::now()
            .checked_add(first.unwrap_or(interval))
            .ok_or(SubmitError::DueOutOfRange)?;
        self.submit(
            "repeating",
            first_due,
            Recurrence::Interval(interval),
            callback,
        )
    }

    /// Runs `callback` every day at `at` in the scheduler's offset.
    pub fn submit_daily<C: JobCallback>(&self, at: Time, callback: C) -> SubmitResult<JobHandle> {
        let now_wall = now_in(self.shared.offset);
        let wall = next_daily(now_wall, at);
        let due = to_instant(wall, now_wall, Instant::now()).ok_or(SubmitError::DueOutOfRange)?;
        self.submit_inner(
            "daily".into(),
            due,
            Some(wall),
            Recurrence::Daily(at),
            Box::new(callback),
        )
    }

    /// Runs `callback` every month on `day` at `at` in the scheduler's offset.
    ///
    /// Months shorter than `day` run on their last day.
    pub fn submit_monthly<C: JobCallback>(
        &self,
        day: u8,
        at: Time,
        callback: C,
    ) -> SubmitResult<JobHandle> {
        if !(1..=31).contains(&day) {
            return Err(SubmitError::InvalidDayOfMonth(day));
        }
        let now_wall = now_in(self.shared.offset);
        let wall = next_monthly(now_wall, day, at);
        let due = to_instant(wall, now_wall, Instant::now()).ok_or(SubmitError::DueOutOfRange)?;
        self.submit_inner(
            "monthly".into(),
            due,
            Some(wall),
            Recurrence::Monthly { day, at },
            Box::new(callback),
        )
    }

    /// Cancels a job. See [`JobHandle::cancel`].
    pub fn cancel(&self, job: &JobHandle) {
        job.cancel();
    }

    /// Cancels a job after its current or next run. See
    /// [`JobHandle::schedule_removal`].
    pub fn schedule_removal(&self, job: &JobHandle) {
        job.schedule_removal();
    }

    // -------------------------------------------------------------------------
    // Loop
    // -------------------------------------------------------------------------

    /// Runs the scheduler loop until [`shutdown`](Self::shutdown).
    ///
    /// Only one loop runs per scheduler; a second call returns immediately.
    pub async fn run(&self) {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            warn!("Job scheduler is already running");
            return;
        }
        info!(offset = %self.shared.offset, "Job scheduler started");

        let shutdown = self.shared.shutdown.clone();
        loop {
            let next_due = self.shared.queue.lock().next_due();
            let now = Instant::now();

            match next_due {
                Some(due) if due <= now => {
                    let entry = self.shared.queue.lock().pop_due(now);
                    if let Some(entry) = entry {
                        self.fire(entry);
                    }
                }
                Some(due) => {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = self.shared.wake.notified() => trace!("Scheduler woken"),
                        _ = sleep_until(due) => {}
                    }
                }
                None => {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = self.shared.wake.notified() => trace!("Scheduler woken"),
                    }
                }
            }
        }

        self.shared.queue.lock().clear();
        self.shared.running.store(false, Ordering::Release);
        info!("Job scheduler stopped");
    }

    /// Spawns [`run`](Self::run) on a new task.
    pub fn spawn(&self) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.run().await })
    }

    /// Stops the loop and discards pending jobs. Runs already in progress
    /// complete. Later submissions fail with [`SubmitError::ShutDown`].
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    fn fire(&self, entry: Entry) {
        let Entry { due, wall, job, .. } = entry;
        trace!(job = %job.id, "Job due");

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let handle = JobHandle {
                state: Arc::clone(&job),
            };
            let result = AssertUnwindSafe(async { job.callback.call(handle).await })
                .catch_unwind()
                .await;

            let failure = match result {
                Ok(Ok(())) => None,
                Ok(Err(error)) => Some(format!("{error:#}")),
                Err(panic) => Some(format!("job panicked: {}", panic_message(&*panic))),
            };
            if let Some(error) = failure {
                shared.sink.report(
                    Severity::Error,
                    "job failed",
                    &[("job", job.id.to_string()), ("name", job.name.clone()), ("error", error)],
                );
            }

            if !job.finish_run() {
                trace!(job = %job.id, "Job done");
                return;
            }
            if shared.shutdown.is_cancelled() {
                return;
            }

            let now = Instant::now();
            let (next_due, next_wall) = match job.recurrence {
                Recurrence::Once => return,
                Recurrence::Interval(interval) => {
                    (due.checked_add(interval).map(|next| next.max(now)), None)
                }
                Recurrence::Daily(at) => {
                    let now_wall = now_in(shared.offset);
                    let wall = next_daily(wall.unwrap_or(now_wall).max(now_wall), at);
                    (to_instant(wall, now_wall, now), Some(wall))
                }
                Recurrence::Monthly { day, at } => {
                    let now_wall = now_in(shared.offset);
                    let wall = next_monthly(wall.unwrap_or(now_wall).max(now_wall), day, at);
                    (to_instant(wall, now_wall, now), Some(wall))
                }
            };
            let Some(next_due) = next_due else {
                job.cancel();
                shared.sink.report(
                    Severity::Error,
                    "job cancelled",
                    &[
                        ("job", job.id.to_string()),
                        ("name", job.name.clone()),
                        ("error", SubmitError::DueOutOfRange.to_string()),
                    ],
                );
                return;
            };
            shared.queue.lock().push(next_due, next_wall, Arc::clone(&job));
            shared.wake.notify_one();
        });
    }
}

impl std::fmt::Debug for JobScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobScheduler")
            .field("offset", &self.shared.offset)
            .field("pending", &self.pending())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
