//! Watchers
//!
//! A watcher observes a source and calls back with the old and new value
//! whenever it changes.
//!
//! The source is a lazy effect. Its scheduler runs the watcher's job: evaluate
//! the source again, fire the invalidation hook the previous callback
//! registered, call the callback, then remember the new value as the old one.
//!
//! With [`Flush::Post`] the job is deferred to a microtask, so a burst of
//! synchronous writes is observed after the fact. With [`Flush::Sync`] it runs
//! inside the write that triggered it.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::trace;

use super::effect::{Effect, EffectOptions, WeakEffect};
use super::proxy::Reactive;
use super::runtime::{Runtime, WeakRuntime};
use super::subscriber::{EffectId, EffectRef, TargetId};
use super::value::{TargetKind, Value};

/// When a watcher's callback runs relative to the write that triggered it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Flush {
    /// Deferred to the next microtask drain.
    #[default]
    Post,
    /// Inline, inside the triggering write.
    Sync,
}

/// Options for [`Runtime::watch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    pub immediate: bool,
    pub deep: bool,
    pub flush: Flush,
}

impl WatchOptions {
    /// Call back once at registration, with no old value.
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub fn flush(mut self, flush: Flush) -> Self {
        self.flush = flush;
        self
    }

    /// Shorthand for `flush(Flush::Sync)`.
    pub fn sync(self) -> Self {
        self.flush(Flush::Sync)
    }
}

type Cleanup = Box<dyn FnOnce() + Send>;

/// Hook for marking the result of a callback stale.
///
/// A callback that starts asynchronous work registers a cleanup here; the
/// cleanup runs right before the next callback, so the earlier work can tell
/// its result is no longer wanted. Nothing is cancelled automatically.
#[derive(Clone, Default)]
pub struct Invalidation {
    slot: Arc<Mutex<Option<Cleanup>>>,
}

impl Invalidation {
    /// Register `cleanup`, replacing any previously registered one.
    pub fn on_invalidate<F>(&self, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.slot.lock() = Some(Box::new(cleanup));
    }

    fn fire(&self) {
        let cleanup = self.slot.lock().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }
}

impl fmt::Debug for Invalidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invalidation")
            .field("pending", &self.slot.lock().is_some())
            .finish()
    }
}

type Callback<T> = Box<dyn FnMut(Option<&T>, &T, &Invalidation) + Send>;

struct WatchState<T> {
    old: Option<T>,
    /// Taken while the callback runs.
    callback: Option<Callback<T>>,
    /// Latest value seen by a run that found the callback taken.
    pending: Option<T>,
}

struct WatchJob<T> {
    effect: OnceLock<WeakEffect<T>>,
    state: Mutex<WatchState<T>>,
    invalidation: Invalidation,
}

impl<T: Send + 'static> WatchJob<T> {
    /// Re-evaluate the source and hand the change to the callback.
    ///
    /// A run started by the callback itself only records the new value; the
    /// outer run calls back again with it once the callback returns.
    fn run(&self) {
        let Some(effect) = self.effect.get().and_then(WeakEffect::upgrade) else {
            return;
        };
        let mut new = effect.run();

        let (mut callback, mut old) = {
            let mut state = self.state.lock();
            match state.callback.take() {
                Some(callback) => (callback, state.old.take()),
                None => {
                    trace!(effect = effect.id().raw(), "watcher re-entered, deferring callback");
                    state.pending = Some(new);
                    return;
                }
            }
        };

        loop {
            self.invalidation.fire();
            callback(old.as_ref(), &new, &self.invalidation);

            let mut state = self.state.lock();
            match state.pending.take() {
                Some(next) => old = Some(std::mem::replace(&mut new, next)),
                None => {
                    state.callback = Some(callback);
                    state.old = Some(new);
                    return;
                }
            }
        }
    }

    fn seed(&self) {
        if let Some(effect) = self.effect.get().and_then(WeakEffect::upgrade) {
            let value = effect.run();
            self.state.lock().old = Some(value);
        }
    }
}

/// Handle to a registered watcher.
///
/// Dropping it does not stop the watcher; call [`stop`](Self::stop).
#[derive(Debug, Clone)]
pub struct Watcher {
    effect: EffectRef,
}

impl Watcher {
    /// Stop observing the source. Pending deferred callbacks still run.
    pub fn stop(&self) {
        self.effect.stop();
    }

    pub fn id(&self) -> EffectId {
        self.effect.id()
    }
}

/// Read every nested field of `value` so the active effect depends on all of
/// them. Targets already visited are skipped, which breaks cycles.
pub(crate) fn traverse(value: &Value, seen: &mut HashSet<TargetId>) {
    let Value::Proxy(proxy) = value else {
        return;
    };
    if !seen.insert(proxy.raw().id()) {
        return;
    }

    match proxy.kind() {
        TargetKind::Map => {
            for (key, value) in proxy.entries() {
                traverse(&key, seen);
                traverse(&value, seen);
            }
        }
        _ => {
            for value in proxy.values() {
                traverse(&value, seen);
            }
        }
    }
}

fn schedule<T: Send + 'static>(job: Arc<WatchJob<T>>, runtime: WeakRuntime, flush: Flush) -> EffectOptions {
    EffectOptions::lazy().with_scheduler(move |_| match flush {
        Flush::Sync => job.run(),
        Flush::Post => {
            if let Some(rt) = runtime.upgrade() {
                let job = Arc::clone(&job);
                rt.next_tick(move || job.run());
            }
        }
    })
}

impl Runtime {
    /// Watch the value produced by `getter`.
    ///
    /// The getter tracks exactly what it reads. `callback` receives the
    /// previous value (`None` on an immediate first call), the new value and
    /// the invalidation hook.
    pub fn watch<T, G, C>(&self, getter: G, callback: C, options: WatchOptions) -> Watcher
    where
        T: Send + 'static,
        G: Fn() -> T + Send + Sync + 'static,
        C: FnMut(Option<&T>, &T, &Invalidation) + Send + 'static,
    {
        let job = Arc::new(WatchJob {
            effect: OnceLock::new(),
            state: Mutex::new(WatchState {
                old: None,
                callback: Some(Box::new(callback)),
                pending: None,
            }),
            invalidation: Invalidation::default(),
        });

        let options_for_effect = schedule(Arc::clone(&job), self.downgrade(), options.flush);
        let effect = Effect::new(self, getter, options_for_effect);
        let _ = job.effect.set(effect.downgrade());

        trace!(
            effect = effect.id().raw(),
            immediate = options.immediate,
            deep = options.deep,
            flush = ?options.flush,
            "watcher registered"
        );

        if options.immediate {
            job.run();
        } else {
            job.seed();
        }

        Watcher {
            effect: effect.as_effect_ref(),
        }
    }

    /// Watch every nested field of `source`.
    ///
    /// The callback receives the source itself as both values, since the
    /// object is mutated in place.
    pub fn watch_reactive<C>(&self, source: &Reactive, callback: C, options: WatchOptions) -> Watcher
    where
        C: FnMut(Option<&Value>, &Value, &Invalidation) + Send + 'static,
    {
        let source = source.clone();
        let getter = move || {
            let value = Value::Proxy(source.clone());
            traverse(&value, &mut HashSet::new());
            value
        };
        self.watch(getter, callback, options.deep())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Target;
    use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

    fn number(value: &Value) -> i32 {
        value.as_f64().unwrap_or_default() as i32
    }

    #[test]
    fn first_evaluation_only_seeds_the_old_value() {
        let rt = Runtime::new();
        let state = rt.reactive(Target::record([("n", 1)]));
        let calls = Arc::new(Mutex::new(Vec::new()));

        let s = state.clone();
        let calls_clone = calls.clone();
        let _watcher = rt.watch(
            move || number(&s.get("n")),
            move |old, new, _| calls_clone.lock().push((old.copied(), *new)),
            WatchOptions::default().sync(),
        );
        assert!(calls.lock().is_empty());

        state.set("n", 2);
        state.set("n", 3);
        assert_eq!(*calls.lock(), vec![(Some(1), 2), (Some(2), 3)]);
    }

    #[test]
    fn immediate_calls_back_before_any_change() {
        let rt = Runtime::new();
        let state = rt.reactive(Target::record([("n", 7)]));
        let calls = Arc::new(Mutex::new(Vec::new()));

        let s = state.clone();
        let calls_clone = calls.clone();
        let _watcher = rt.watch(
            move || number(&s.get("n")),
            move |old, new, _| calls_clone.lock().push((old.copied(), *new)),
            WatchOptions::default().immediate(),
        );

        assert_eq!(*calls.lock(), vec![(None, 7)]);
    }

    #[test]
    fn post_flush_defers_to_the_microtask_drain() {
        let rt = Runtime::new();
        let state = rt.reactive(Target::record([("n", 0)]));
        let calls = Arc::new(AtomicI32::new(0));

        let s = state.clone();
        let calls_clone = calls.clone();
        let _watcher = rt.watch(
            move || number(&s.get("n")),
            move |_, _, _| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::default(),
        );

        state.set("n", 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        rt.run_microtasks();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalidation_runs_before_the_next_callback() {
        let rt = Runtime::new();
        let state = rt.reactive(Target::record([("n", 0)]));
        let expired = Arc::new(Mutex::new(Vec::new()));

        let s = state.clone();
        let expired_clone = expired.clone();
        let _watcher = rt.watch(
            move || number(&s.get("n")),
            move |_, new, invalidation| {
                let expired = expired_clone.clone();
                let value = *new;
                invalidation.on_invalidate(move || expired.lock().push(value));
            },
            WatchOptions::default().sync(),
        );

        state.set("n", 1);
        assert!(expired.lock().is_empty());
        state.set("n", 2);
        assert_eq!(*expired.lock(), vec![1]);
    }

    #[test]
    fn reactive_sources_are_watched_deeply() {
        let rt = Runtime::new();
        let inner = Target::record([("leaf", 1)]);
        let state = rt.reactive(Target::record([("inner", Value::Object(inner))]));
        let calls = Arc::new(AtomicI32::new(0));

        let calls_clone = calls.clone();
        let _watcher = rt.watch_reactive(
            &state,
            move |_, _, _| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::default().sync(),
        );

        let nested = state.get("inner");
        nested.as_proxy().expect("nested proxy").set("leaf", 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cyclic_sources_terminate() {
        let rt = Runtime::new();
        let state = rt.reactive(Target::empty(TargetKind::Record));
        state.set("me", state.clone());

        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();
        let _watcher = rt.watch_reactive(
            &state,
            move |_, _, _| called_clone.store(true, Ordering::SeqCst),
            WatchOptions::default().sync(),
        );

        state.set("x", 1);
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn writes_from_the_callback_are_reported_after_it_returns() {
        let rt = Runtime::new();
        let state = rt.reactive(Target::record([("n", 0)]));
        let calls = Arc::new(Mutex::new(Vec::new()));
        let depth = Arc::new(AtomicI32::new(0));

        let s = state.clone();
        let writer = state.clone();
        let calls_clone = calls.clone();
        let depth_clone = depth.clone();
        let _watcher = rt.watch(
            move || number(&s.get("n")),
            move |old, new, _| {
                assert_eq!(depth_clone.fetch_add(1, Ordering::SeqCst), 0, "callback nested");
                calls_clone.lock().push((old.copied(), *new));
                if *new == 1 {
                    writer.set("n", 10);
                }
                depth_clone.fetch_sub(1, Ordering::SeqCst);
            },
            WatchOptions::default().sync(),
        );

        state.set("n", 1);
        assert_eq!(*calls.lock(), vec![(Some(0), 1), (Some(1), 10)]);
        assert_eq!(state.get("n"), Value::from(10));

        state.set("n", 11);
        assert_eq!(
            *calls.lock(),
            vec![(Some(0), 1), (Some(1), 10), (Some(10), 11)]
        );
    }

    #[test]
    fn stopped_watchers_stay_quiet() {
        let rt = Runtime::new();
        let state = rt.reactive(Target::record([("n", 0)]));
        let calls = Arc::new(AtomicI32::new(0));

        let s = state.clone();
        let calls_clone = calls.clone();
        let watcher = rt.watch(
            move || number(&s.get("n")),
            move |_, _, _| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::default().sync(),
        );

        watcher.stop();
        state.set("n", 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
