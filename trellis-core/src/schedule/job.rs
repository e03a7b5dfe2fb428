//! Job queue.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::reactive::{EffectId, EffectRef};

/// Identity of a job; the de-duplication key of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobId {
    /// Re-run of an effect.
    Effect(EffectId),
    /// Any other unit of work.
    Task(u64),
}

impl JobId {
    /// Allocate a fresh task id.
    pub fn task() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        JobId::Task(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A unit of deferred work.
#[derive(Clone)]
pub struct Job {
    id: JobId,
    run: Arc<dyn Fn() + Send + Sync>,
}

impl Job {
    /// A job with a freshly allocated id.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_id(JobId::task(), run)
    }

    /// A job with an explicit id. Queueing two jobs with the same id before a
    /// flush runs only the first.
    pub fn with_id<F>(id: JobId, run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            id,
            run: Arc::new(run),
        }
    }

    /// A job re-running `effect`, keyed by the effect's id.
    pub fn from_effect(effect: EffectRef) -> Self {
        Self::with_id(JobId::Effect(effect.id()), move || effect.run())
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn run(&self) {
        (self.run)()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Job").field(&self.id).finish()
    }
}

/// Pending jobs plus the flushing flag.
#[derive(Default)]
pub(crate) struct JobQueue {
    queue: Mutex<IndexMap<JobId, Job>>,
    /// Set from the first push of a tick until its flush completes.
    flushing: AtomicBool,
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add `job` unless one with the same id is pending.
    ///
    /// Returns `true` when the caller must schedule a flush.
    pub(crate) fn push(&self, job: Job) -> bool {
        self.queue.lock().entry(job.id).or_insert(job);
        !self.flushing.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run every pending job in insertion order, then reset.
    ///
    /// The set is read as the flush proceeds, so jobs queued by running jobs
    /// are picked up too. A job already run in this flush and queued again is
    /// not repeated.
    pub(crate) fn flush(&self) {
        let _reset = FlushReset(self);
        let mut index = 0;

        loop {
            let job = match self.queue.lock().get_index(index) {
                Some((_, job)) => job.clone(),
                None => break,
            };
            job.run();
            index += 1;
        }

        trace!(count = index, "flushed jobs");
    }
}

/// Clears the queue and the flag when a flush ends, even by panic.
struct FlushReset<'a>(&'a JobQueue);

impl Drop for FlushReset<'_> {
    fn drop(&mut self) {
        self.0.queue.lock().clear();
        self.0.flushing.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    fn counting_job(id: JobId, counter: &Arc<AtomicI32>) -> Job {
        let counter = counter.clone();
        Job::with_id(id, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn duplicate_jobs_collapse() {
        let queue = JobQueue::new();
        let counter = Arc::new(AtomicI32::new(0));
        let id = JobId::task();

        assert!(queue.push(counting_job(id, &counter)));
        assert!(!queue.push(counting_job(id, &counter)));
        assert!(!queue.push(counting_job(id, &counter)));
        assert_eq!(queue.len(), 1);

        queue.flush();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn jobs_run_in_insertion_order() {
        let queue = JobQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = order.clone();
            queue.push(Job::new(move || order.lock().push(n)));
        }
        queue.flush();

        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn jobs_queued_during_flush_run_in_same_flush() {
        let queue = Arc::new(JobQueue::new());
        let counter = Arc::new(AtomicI32::new(0));

        let q = queue.clone();
        let c = counter.clone();
        queue.push(Job::new(move || {
            let needs_flush = q.push(counting_job(JobId::task(), &c));
            assert!(!needs_flush);
        }));
        queue.flush();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn flag_resets_after_panicking_job() {
        let queue = JobQueue::new();
        queue.push(Job::new(|| panic!("job failed")));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| queue.flush()));
        assert!(result.is_err());
        assert_eq!(queue.len(), 0);
        assert!(queue.push(Job::new(|| {})));
    }
}
