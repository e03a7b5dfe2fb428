//! Reactive Runtime
//!
//! The runtime is the central coordinator. It owns every piece of tracking
//! state: the dependency store, the active-effect stack, the proxy cache, the
//! job queue and the microtask queue.
//!
//! # How It Works
//!
//! 1. A proxy read calls [`Runtime::track`], which subscribes the effect on
//!    top of the stack to `(target, key)`.
//!
//! 2. A proxy write calls [`Runtime::trigger`], which asks the store for the
//!    subscribers to notify and hands each one to its scheduler, or re-runs
//!    it inline.
//!
//! 3. Schedulers built by [`Runtime::queued_scheduler`] push effects into the
//!    job queue, which is flushed once per microtask drain.
//!
//! # Ownership
//!
//! `Runtime` is a cheap handle; clones share state. Proxies, effects and
//! computed values only hold a weak reference, so dropping the last handle
//! tears the tracking state down. Several runtimes can live side by side.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::config::RuntimeConfig;
use crate::schedule::{Job, JobQueue, MicrotaskQueue};

use super::context::{EffectStack, UntrackedScope};
use super::effect::Scheduler;
use super::proxy::{ProxyInner, ProxyMode};
use super::store::{DepStore, TrackKey, TriggerOp};
use super::subscriber::{EffectId, EffectRef, TargetId};
use super::value::TargetKind;

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    store: Mutex<DepStore>,
    stack: EffectStack,
    proxies: Mutex<HashMap<(TargetId, ProxyMode), Weak<ProxyInner>>>,
    jobs: JobQueue,
    microtasks: MicrotaskQueue,
}

/// Handle to a reactive runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

/// Non-owning handle held by proxies and effects.
#[derive(Clone, Default)]
pub(crate) struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
    pub(crate) fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(|inner| Runtime { inner })
    }
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                store: Mutex::new(DepStore::new()),
                stack: EffectStack::new(),
                proxies: Mutex::new(HashMap::new()),
                jobs: JobQueue::new(),
                microtasks: MicrotaskQueue::new(),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Arc::downgrade(&self.inner))
    }

    pub(crate) fn stack(&self) -> &EffectStack {
        &self.inner.stack
    }

    pub(crate) fn proxy_cache(&self) -> &Mutex<HashMap<(TargetId, ProxyMode), Weak<ProxyInner>>> {
        &self.inner.proxies
    }

    /// Whether a read right now would be recorded.
    pub fn is_tracking(&self) -> bool {
        self.inner.stack.should_track() && self.inner.stack.current_id().is_some()
    }

    /// The effect credited with reads right now.
    pub fn current_effect(&self) -> Option<EffectId> {
        self.inner.stack.current_id()
    }

    /// Subscribe the active effect to `(target, key)`.
    ///
    /// `owner` yields the weak liveness handle of the target and is only
    /// called the first time the target is tracked.
    pub(crate) fn track(
        &self,
        id: TargetId,
        kind: Option<TargetKind>,
        owner: impl FnOnce() -> Weak<dyn Any + Send + Sync>,
        key: TrackKey,
    ) {
        if !self.inner.stack.should_track() {
            return;
        }
        let Some(effect) = self.inner.stack.current() else {
            return;
        };

        let swept = {
            let mut store = self.inner.store.lock();
            trace!(target_id = id.raw(), key = %key, effect = effect.id().raw(), "track");
            let dep = store.dep_for(id, kind, owner, key);
            if dep.insert(&effect) {
                effect.record_dep(&dep);
            }
            if store.sweep_due(self.inner.config.sweep_interval) {
                store.sweep()
            } else {
                Vec::new()
            }
        };
        if !swept.is_empty() {
            trace!(count = swept.len(), "swept dead targets");
        }
    }

    /// Notify the subscribers affected by a write to `(target, key)`.
    ///
    /// `new_len` is the array length after the write, consulted when `key`
    /// is `length`.
    pub(crate) fn trigger(&self, id: TargetId, key: TrackKey, op: TriggerOp, new_len: Option<usize>) {
        let effects = {
            let store = self.inner.store.lock();
            store.collect(id, &key, op, new_len, self.inner.stack.current_id())
        };
        trace!(
            target_id = id.raw(),
            key = %key,
            op = ?op,
            count = effects.len(),
            "trigger"
        );
        notify_all(effects);
    }

    /// Notify the subscribers of several deleted keys at once, each effect
    /// at most once. Used by collection `clear`.
    pub(crate) fn trigger_deletes(&self, id: TargetId, keys: Vec<TrackKey>) {
        let effects = {
            let store = self.inner.store.lock();
            let skip = self.inner.stack.current_id();
            let mut merged: IndexMap<EffectId, EffectRef> = IndexMap::new();
            for key in &keys {
                for effect in store.collect(id, key, TriggerOp::Delete, None, skip) {
                    merged.entry(effect.id()).or_insert(effect);
                }
            }
            merged
        };
        trace!(target_id = id.raw(), keys = keys.len(), count = effects.len(), "trigger clear");
        notify_all(effects.into_values());
    }

    /// Run `f` without recording any reads.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _scope = UntrackedScope::enter(self);
        f()
    }

    /// Sweep dependency entries of dead targets now. Returns how many targets
    /// were removed.
    pub fn collect_garbage(&self) -> usize {
        let removed = self.inner.store.lock().sweep();
        removed.len()
    }

    /// Number of targets the dependency store currently tracks.
    pub fn tracked_target_count(&self) -> usize {
        self.inner.store.lock().target_count()
    }

    /// Add `job` to the job queue, scheduling a flush if none is pending.
    ///
    /// Jobs with the same [`JobId`](crate::schedule::JobId) queued before the
    /// flush collapse into one.
    pub fn queue_job(&self, job: Job) {
        if self.inner.jobs.push(job) {
            let weak = self.downgrade();
            self.next_tick(move || {
                if let Some(rt) = weak.upgrade() {
                    rt.inner.jobs.flush();
                }
            });
        }
    }

    /// Number of jobs waiting for the next flush.
    pub fn pending_jobs(&self) -> usize {
        self.inner.jobs.len()
    }

    /// Enqueue a microtask.
    pub fn next_tick<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.microtasks.push(Box::new(f));
    }

    /// Drain the microtask queue, including microtasks queued while
    /// draining. Returns how many ran.
    pub fn run_microtasks(&self) -> usize {
        self.inner.microtasks.drain(self.inner.config.microtask_limit)
    }

    /// The canonical batching scheduler: every notification queues the
    /// effect as a job keyed by its id.
    pub fn queued_scheduler(&self) -> Scheduler {
        let weak = self.downgrade();
        Arc::new(move |effect: &EffectRef| {
            if let Some(rt) = weak.upgrade() {
                rt.queue_job(Job::from_effect(effect.clone()));
            }
        })
    }
}

fn notify_all(effects: impl IntoIterator<Item = EffectRef>) {
    for effect in effects {
        effect.notify();
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("depth", &self.inner.stack.depth())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{EffectOptions, Target, Value};
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn runtimes_are_independent() {
        let a = Runtime::new();
        let b = Runtime::new();
        let target = Target::record([("n", 0)]);

        let pa = a.reactive(target.clone());
        let pb = b.reactive(target);
        let runs = Arc::new(AtomicI32::new(0));

        let runs_clone = runs.clone();
        let reader = pa.clone();
        let _effect = a.effect(move || {
            let _ = reader.get("n");
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        // Writes through another runtime are invisible to this one.
        pb.set("n", 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        pa.set("n", 2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn untracked_reads_are_not_recorded() {
        let rt = Runtime::new();
        let state = rt.reactive(Target::record([("n", 0)]));

        let s = state.clone();
        let inner_rt = rt.clone();
        let effect = rt.effect(move || {
            inner_rt.untracked(|| {
                let _ = s.get("n");
            });
        });

        assert_eq!(effect.dependency_count(), 0);
        state.set("n", 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn queued_scheduler_batches_into_one_flush() {
        let rt = Runtime::new();
        let state = rt.reactive(Target::record([("n", 0)]));

        let s = state.clone();
        let effect = rt.effect_with(
            move || {
                let _ = s.get("n");
            },
            EffectOptions::default().with_shared_scheduler(rt.queued_scheduler()),
        );

        state.set("n", 1);
        state.set("n", 2);
        state.set("n", 3);
        assert_eq!(rt.pending_jobs(), 1);
        assert_eq!(effect.run_count(), 1);

        assert_eq!(rt.run_microtasks(), 1);
        assert_eq!(effect.run_count(), 2);
        assert_eq!(rt.pending_jobs(), 0);
    }

    #[test]
    fn dead_targets_are_collected() {
        let rt = Runtime::new();
        let effect = {
            let state = rt.reactive(Target::record([("n", 0)]));
            let e = rt.effect_with(
                move || {
                    let _ = state.get("n");
                },
                EffectOptions::lazy(),
            );
            e.run();
            e
        };
        assert_eq!(rt.tracked_target_count(), 1);

        // The effect body keeps the target alive until it is stopped and
        // dropped.
        effect.stop();
        drop(effect);
        assert_eq!(rt.collect_garbage(), 1);
        assert_eq!(rt.tracked_target_count(), 0);
    }

    #[test]
    fn proxies_outlive_their_runtime_as_plain_views() {
        let rt = Runtime::new();
        let state = rt.reactive(Target::record([("n", 0)]));
        drop(rt);

        state.set("n", 4);
        assert_eq!(state.get("n"), Value::from(4));
    }
}
