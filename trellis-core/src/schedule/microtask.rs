//! Microtask queue.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::{trace, warn};

pub(crate) type Microtask = Box<dyn FnOnce() + Send>;

/// FIFO of deferred callbacks.
#[derive(Default)]
pub(crate) struct MicrotaskQueue {
    tasks: Mutex<VecDeque<Microtask>>,
}

impl MicrotaskQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, task: Microtask) {
        self.tasks.lock().push_back(task);
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Run queued tasks until the queue is empty or `limit` tasks ran.
    ///
    /// Tasks queued by running tasks are run in the same drain.
    pub(crate) fn drain(&self, limit: usize) -> usize {
        let mut ran = 0;

        while ran < limit {
            let Some(task) = self.tasks.lock().pop_front() else {
                break;
            };
            task();
            ran += 1;
        }

        let left = self.len();
        if left > 0 {
            warn!(ran, left, "microtask limit reached, leaving the rest queued");
        }
        trace!(ran, "drained microtasks");
        ran
    }
}
