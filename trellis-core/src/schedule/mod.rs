//! Job Scheduling
//!
//! Two queues cooperate to batch effect re-runs:
//!
//! - The **microtask queue** models the platform's microtask checkpoint. It is
//!   the only place where deferred work runs; callers drain it explicitly with
//!   [`Runtime::run_microtasks`](crate::reactive::Runtime::run_microtasks).
//! - The **job queue** is a de-duplicating, insertion-ordered set of jobs.
//!   Queueing the first job of a tick schedules one microtask that flushes the
//!   whole set, including jobs queued while the flush is running.

mod job;
mod microtask;

pub use job::{Job, JobId};
pub(crate) use job::JobQueue;
pub(crate) use microtask::MicrotaskQueue;
