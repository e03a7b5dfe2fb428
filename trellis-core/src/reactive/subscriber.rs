//! Subscriber types for the reactive system.
//!
//! A subscriber is any computation that depends on observed data: plain
//! effects, the lazy effect behind a computed value, or the effect driving a
//! watcher. The dependency store only ever sees the type-erased form,
//! [`EffectRef`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::effect::Scheduler;
use super::store::Dep;

/// Unique identifier for an effect.
///
/// Each effect gets a unique ID when created. The ID is the identity used by
/// dependency sets, the active-effect stack and the job queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl EffectId {
    /// Generate a new unique effect ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across runtimes.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for an observed target.
///
/// Targets (records, arrays, sets, maps) and computed values each own one.
/// The dependency store and the proxy cache are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    /// Generate a new unique target ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

/// Behaviour every effect exposes to the dependency store.
pub(crate) trait Subscriber: Send + Sync {
    /// The subscriber's unique ID.
    fn id(&self) -> EffectId;

    /// The scheduler notifications are handed to, if any.
    fn scheduler(&self) -> Option<Scheduler>;

    /// Run the body, discarding its result.
    fn run_erased(self: Arc<Self>);

    /// Remember that this subscriber now belongs to `dep`.
    fn record_dep(&self, dep: &Arc<Dep>);

    /// Leave every dependency set and stop reacting.
    fn stop(&self);
}

/// A type-erased handle to an effect.
///
/// This is what schedulers receive and what dependency sets store. Running it
/// re-executes the effect body with full dependency tracking.
#[derive(Clone)]
pub struct EffectRef {
    inner: Arc<dyn Subscriber>,
}

impl EffectRef {
    pub(crate) fn new(inner: Arc<dyn Subscriber>) -> Self {
        Self { inner }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> EffectId {
        self.inner.id()
    }

    /// Re-run the effect body, discarding its result.
    pub fn run(&self) {
        Arc::clone(&self.inner).run_erased();
    }

    /// Deliver a change notification: hand the effect to its scheduler, or
    /// run it inline when it has none.
    pub(crate) fn notify(&self) {
        match self.inner.scheduler() {
            Some(scheduler) => scheduler(self),
            None => self.run(),
        }
    }

    /// Detach the effect from everything it observes.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub(crate) fn record_dep(&self, dep: &Arc<Dep>) {
        self.inner.record_dep(dep);
    }
}

impl PartialEq for EffectRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for EffectRef {}

impl fmt::Debug for EffectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EffectRef").field(&self.id().raw()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_ids_are_unique() {
        let id1 = EffectId::new();
        let id2 = EffectId::new();
        let id3 = EffectId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn target_ids_are_unique() {
        let a = TargetId::new();
        let b = TargetId::new();
        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
    }
}
