//! Job scheduler.
//!
//! Jobs are callbacks bound to a time: once at a deadline, at a fixed
//! interval, or on a daily or monthly wall-clock schedule.
//!
//! ```rust,ignore
//! let scheduler = JobScheduler::new();
//! scheduler.spawn();
//!
//! let job = scheduler.submit_repeating(Duration::from_secs(60), None, |_job: JobHandle| async {
//!     tracing::info!("tick");
//! })?;
//! job.cancel();
//! ```

pub mod calendar;
pub mod job;
mod queue;
pub mod runner;

pub use job::{IntoJobResult, JobCallback, JobHandle, JobId, Recurrence};
pub use runner::{JobScheduler, SchedulerBuilder};
