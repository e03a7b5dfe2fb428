//! Effect Implementation
//!
//! An Effect is a computation that re-runs whenever the observed data it read
//! during its last run changes.
//!
//! # How Effects Work
//!
//! 1. Before each run the effect leaves every dependency set it joined last
//!    time. A branch that stopped reading a field must stop reacting to it.
//!
//! 2. The effect is pushed onto the runtime's active-effect stack and its body
//!    runs. Every proxy read during the body subscribes the effect.
//!
//! 3. The stack is popped (also on panic) and the body's result returned.
//!
//! When a dependency changes, the effect is handed to its scheduler if it has
//! one, or re-run inline otherwise.
//!
//! # Lazy Effects
//!
//! A lazy effect does not run on creation. Computed values and watchers are
//! built from lazy effects with schedulers.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use super::context::ReactiveContext;
use super::runtime::{Runtime, WeakRuntime};
use super::store::Dep;
use super::subscriber::{EffectId, EffectRef, Subscriber};

/// Callback receiving an effect whose dependencies changed.
///
/// A scheduler decides when (and whether) the effect re-runs. See
/// [`Runtime::queued_scheduler`] for the batching one.
pub type Scheduler = Arc<dyn Fn(&EffectRef) + Send + Sync>;

/// Options for [`Runtime::effect_with`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    pub(crate) lazy: bool,
    pub(crate) scheduler: Option<Scheduler>,
}

impl EffectOptions {
    /// Options for an effect that does not run on creation.
    pub fn lazy() -> Self {
        Self {
            lazy: true,
            scheduler: None,
        }
    }

    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Hand change notifications to `scheduler` instead of re-running inline.
    pub fn with_scheduler<F>(mut self, scheduler: F) -> Self
    where
        F: Fn(&EffectRef) + Send + Sync + 'static,
    {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Like [`with_scheduler`](Self::with_scheduler), for a scheduler that is
    /// already shared, such as [`Runtime::queued_scheduler`].
    pub fn with_shared_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .finish()
    }
}

/// State shared by every effect regardless of its result type.
struct EffectCore {
    id: EffectId,
    runtime: WeakRuntime,
    /// Dependency sets this effect currently belongs to.
    deps: Mutex<SmallVec<[Weak<Dep>; 4]>>,
    scheduler: Option<Scheduler>,
    active: AtomicBool,
    run_count: AtomicUsize,
}

impl EffectCore {
    /// Leave every dependency set joined during the last run.
    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.lock());
        for dep in deps.iter().filter_map(Weak::upgrade) {
            dep.remove(self.id);
        }
    }

    fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.cleanup();
            trace!(effect = self.id.raw(), "effect stopped");
        }
    }
}

struct EffectInner<T> {
    core: EffectCore,
    body: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T: 'static> EffectInner<T> {
    fn run(self: &Arc<Self>) -> T {
        self.core.run_count.fetch_add(1, Ordering::Relaxed);

        let runtime = match self.core.runtime.upgrade() {
            Some(rt) if self.core.active.load(Ordering::SeqCst) => rt,
            _ => return (self.body)(),
        };

        self.core.cleanup();
        trace!(effect = self.core.id.raw(), "running effect");

        let me = EffectRef::new(Arc::clone(self) as Arc<dyn Subscriber>);
        let _ctx = ReactiveContext::enter(&runtime, me);
        (self.body)()
    }
}

impl<T: 'static> Subscriber for EffectInner<T> {
    fn id(&self) -> EffectId {
        self.core.id
    }

    fn scheduler(&self) -> Option<Scheduler> {
        self.core.scheduler.clone()
    }

    fn run_erased(self: Arc<Self>) {
        let _ = self.run();
    }

    fn record_dep(&self, dep: &Arc<Dep>) {
        self.core.deps.lock().push(Arc::downgrade(dep));
    }

    fn stop(&self) {
        self.core.stop();
    }
}

/// A registered effect.
///
/// Cloning yields another handle to the same effect. Dropping every handle
/// does not stop it: the effect stays subscribed for as long as the data it
/// observes is alive. Call [`stop`](Self::stop) to detach it.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let state = rt.reactive(Target::record([("count", 0)]));
///
/// let s = state.clone();
/// let effect = rt.effect(move || println!("count is {}", s.get("count")));
///
/// state.set("count", 5); // prints "count is 5"
/// ```
pub struct Effect<T = ()> {
    inner: Arc<EffectInner<T>>,
}

impl<T> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Effect<T> {
    pub(crate) fn new<F>(runtime: &Runtime, body: F, options: EffectOptions) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let effect = Self {
            inner: Arc::new(EffectInner {
                core: EffectCore {
                    id: EffectId::new(),
                    runtime: runtime.downgrade(),
                    deps: Mutex::new(SmallVec::new()),
                    scheduler: options.scheduler,
                    active: AtomicBool::new(true),
                    run_count: AtomicUsize::new(0),
                },
                body: Box::new(body),
            }),
        };

        if !options.lazy {
            effect.run();
        }

        effect
    }

    /// Run the body with dependency tracking and return its result.
    ///
    /// A stopped effect still runs its body, but records nothing.
    pub fn run(&self) -> T {
        self.inner.run()
    }

    /// The type-erased handle schedulers receive.
    pub fn as_effect_ref(&self) -> EffectRef {
        EffectRef::new(Arc::clone(&self.inner) as Arc<dyn Subscriber>)
    }
}

impl<T> Effect<T> {
    /// Get the effect's unique ID.
    pub fn id(&self) -> EffectId {
        self.inner.core.id
    }

    /// Detach from every dependency set. The effect never re-runs by itself
    /// again.
    pub fn stop(&self) {
        self.inner.core.stop();
    }

    pub fn is_active(&self) -> bool {
        self.inner.core.active.load(Ordering::SeqCst)
    }

    /// Number of times the body has run.
    pub fn run_count(&self) -> usize {
        self.inner.core.run_count.load(Ordering::Relaxed)
    }

    pub(crate) fn downgrade(&self) -> WeakEffect<T> {
        WeakEffect {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Number of dependency sets the effect currently belongs to.
    pub fn dependency_count(&self) -> usize {
        self.inner
            .core
            .deps
            .lock()
            .iter()
            .filter(|dep| dep.strong_count() > 0)
            .count()
    }
}

/// Non-owning handle to an effect.
pub(crate) struct WeakEffect<T> {
    inner: Weak<EffectInner<T>>,
}

impl<T> WeakEffect<T> {
    pub(crate) fn upgrade(&self) -> Option<Effect<T>> {
        self.inner.upgrade().map(|inner| Effect { inner })
    }
}

impl<T> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.core.id.raw())
            .field("active", &self.inner.core.active.load(Ordering::SeqCst))
            .finish()
    }
}

impl Runtime {
    /// Register an effect and run it immediately.
    pub fn effect<T, F>(&self, body: F) -> Effect<T>
    where
        T: 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Effect::new(self, body, EffectOptions::default())
    }

    /// Register an effect with explicit options.
    pub fn effect_with<T, F>(&self, body: F, options: EffectOptions) -> Effect<T>
    where
        T: 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Effect::new(self, body, options)
    }
}
