//! Computed Values
//!
//! A computed value wraps a getter in a lazy effect and caches its result.
//!
//! # Laziness
//!
//! The getter runs on the first [`Computed::get`] and afterwards only when a
//! dependency changed since the last evaluation. A change does not recompute
//! anything: the effect's scheduler only marks the cache dirty and notifies
//! whoever read the computed. The next read pays for the recomputation.
//!
//! # Computed as a Target
//!
//! A computed is also observed data with a single synthetic `value` key, so
//! effects (and other computeds) that read it re-run when it is invalidated.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::effect::{Effect, EffectOptions};
use super::runtime::{Runtime, WeakRuntime};
use super::store::{TrackKey, TriggerOp};
use super::subscriber::TargetId;
use super::value::Key;

struct ComputedInner<T> {
    id: TargetId,
    runtime: WeakRuntime,
    effect: Effect<T>,
    value: Mutex<Option<T>>,
    dirty: AtomicBool,
}

impl<T> ComputedInner<T> {
    fn value_key() -> TrackKey {
        TrackKey::Key(Key::from("value"))
    }

    /// Called by the effect's scheduler when a dependency changed.
    fn invalidate(&self) {
        if self.dirty.swap(true, Ordering::SeqCst) {
            return;
        }
        trace!(target_id = self.id.raw(), "computed invalidated");
        if let Some(rt) = self.runtime.upgrade() {
            rt.trigger(self.id, Self::value_key(), TriggerOp::Set, None);
        }
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.effect.stop();
    }
}

/// A lazily evaluated, cached derived value.
///
/// Cloning yields another handle to the same cache. Dropping the last handle
/// stops the underlying effect.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let state = rt.reactive(Target::record([("count", 2)]));
///
/// let s = state.clone();
/// let doubled = rt.computed(move || s.get("count").as_f64().unwrap_or_default() * 2.0);
///
/// assert_eq!(doubled.get(), 4.0);
/// ```
pub struct Computed<T> {
    inner: Arc<ComputedInner<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn new<F>(runtime: &Runtime, getter: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let weak = weak.clone();
            let options = EffectOptions::lazy().with_scheduler(move |_| {
                if let Some(inner) = weak.upgrade() {
                    inner.invalidate();
                }
            });

            ComputedInner {
                id: TargetId::new(),
                runtime: runtime.downgrade(),
                effect: Effect::new(runtime, getter, options),
                value: Mutex::new(None),
                dirty: AtomicBool::new(true),
            }
        });

        Self { inner }
    }

    /// Read the value, recomputing it first if a dependency changed.
    ///
    /// Subscribes the active effect to this computed.
    pub fn get(&self) -> T {
        let cached = if self.inner.dirty.load(Ordering::SeqCst) {
            None
        } else {
            self.inner.value.lock().clone()
        };

        let value = match cached {
            Some(value) => value,
            None => {
                // Cleared before running so an invalidation during the run
                // is not lost.
                self.inner.dirty.store(false, Ordering::SeqCst);
                let value = self.inner.effect.run();
                *self.inner.value.lock() = Some(value.clone());
                value
            }
        };

        if let Some(rt) = self.inner.runtime.upgrade() {
            let weak = Arc::downgrade(&self.inner);
            rt.track(
                self.inner.id,
                None,
                move || weak as Weak<dyn Any + Send + Sync>,
                ComputedInner::<T>::value_key(),
            );
        }

        value
    }

    /// Whether the next read recomputes.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    /// Number of times the getter has run.
    pub fn eval_count(&self) -> usize {
        self.inner.effect.run_count()
    }

    pub fn id(&self) -> TargetId {
        self.inner.id
    }
}

impl<T> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id.raw())
            .field("dirty", &self.inner.dirty.load(Ordering::SeqCst))
            .finish()
    }
}

impl Runtime {
    /// Create a computed value from `getter`. Nothing runs until the first
    /// read.
    pub fn computed<T, F>(&self, getter: F) -> Computed<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Computed::new(self, getter)
    }
}
