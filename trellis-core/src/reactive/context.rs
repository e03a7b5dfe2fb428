//! Reactive Context
//!
//! The reactive context tracks which effect is currently running. This
//! enables automatic dependency tracking: when a proxy is read, the effect on
//! top of the stack is credited with the read.
//!
//! # Implementation
//!
//! Each runtime owns one stack. Entering an effect pushes it; the returned
//! guard pops it when dropped, including during unwinding, so a panicking
//! effect body never leaves a stale subscriber on the stack.
//!
//! Nested effects (an effect body that creates or runs another effect) push
//! on top of their parent and restore it when they finish.
//!
//! An effect always tracks its own reads, even when it is run from inside an
//! untracked scope (an array mutator triggering it inline, for instance).
//! Entering a context lifts any pause; leaving it restores the pause.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::runtime::Runtime;
use super::subscriber::{EffectId, EffectRef};

/// The per-runtime active-effect stack.
#[derive(Default)]
pub(crate) struct EffectStack {
    stack: Mutex<Vec<EffectRef>>,
    /// Number of live [`UntrackedScope`] guards.
    paused: AtomicUsize,
}

impl EffectStack {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The effect credited with reads right now, if any.
    pub(crate) fn current(&self) -> Option<EffectRef> {
        self.stack.lock().last().cloned()
    }

    pub(crate) fn current_id(&self) -> Option<EffectId> {
        self.stack.lock().last().map(EffectRef::id)
    }

    pub(crate) fn depth(&self) -> usize {
        self.stack.lock().len()
    }

    /// Whether reads should currently be recorded.
    pub(crate) fn should_track(&self) -> bool {
        self.paused.load(Ordering::SeqCst) == 0
    }

    fn push(&self, effect: EffectRef) {
        self.stack.lock().push(effect);
    }

    fn pop(&self) -> Option<EffectRef> {
        self.stack.lock().pop()
    }

    fn lift_pause(&self) -> usize {
        self.paused.swap(0, Ordering::SeqCst)
    }

    fn restore_pause(&self, paused: usize) {
        self.paused.store(paused, Ordering::SeqCst);
    }
}

/// Guard that pops the active effect when dropped.
pub(crate) struct ReactiveContext {
    runtime: Runtime,
    effect_id: EffectId,
    saved_pause: usize,
}

impl ReactiveContext {
    /// Make `effect` the active effect of `runtime` until the guard drops.
    pub(crate) fn enter(runtime: &Runtime, effect: EffectRef) -> Self {
        let effect_id = effect.id();
        let saved_pause = runtime.stack().lift_pause();
        runtime.stack().push(effect);

        Self {
            runtime: runtime.clone(),
            effect_id,
            saved_pause,
        }
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = self.runtime.stack().pop();
        self.runtime.stack().restore_pause(self.saved_pause);

        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.id(),
                self.effect_id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.effect_id,
                entry.id()
            );
        }
    }
}

/// Guard that suspends dependency tracking until dropped.
///
/// Created by [`Runtime::untracked`] and by the array mutators, which read
/// `length` internally without wanting to subscribe to it.
pub struct UntrackedScope {
    runtime: Runtime,
}

impl UntrackedScope {
    pub(crate) fn enter(runtime: &Runtime) -> Self {
        runtime.stack().paused.fetch_add(1, Ordering::SeqCst);
        Self {
            runtime: runtime.clone(),
        }
    }
}

impl Drop for UntrackedScope {
    fn drop(&mut self) {
        self.runtime.stack().paused.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::EffectOptions;

    #[test]
    fn context_tracks_effect() {
        let rt = Runtime::new();
        let effect = rt.effect_with(|| {}, EffectOptions::lazy());

        assert!(!rt.is_tracking());
        assert!(rt.current_effect().is_none());

        {
            let _ctx = ReactiveContext::enter(&rt, effect.as_effect_ref());

            assert!(rt.is_tracking());
            assert_eq!(rt.current_effect(), Some(effect.id()));
        }

        // Context should be cleaned up after drop
        assert!(!rt.is_tracking());
        assert!(rt.current_effect().is_none());
    }

    #[test]
    fn nested_contexts() {
        let rt = Runtime::new();
        let outer = rt.effect_with(|| {}, EffectOptions::lazy());
        let inner = rt.effect_with(|| {}, EffectOptions::lazy());

        {
            let _ctx1 = ReactiveContext::enter(&rt, outer.as_effect_ref());
            assert_eq!(rt.current_effect(), Some(outer.id()));

            {
                let _ctx2 = ReactiveContext::enter(&rt, inner.as_effect_ref());
                assert_eq!(rt.current_effect(), Some(inner.id()));
                assert_eq!(rt.stack().depth(), 2);
            }

            // After inner context drops, outer should be current
            assert_eq!(rt.current_effect(), Some(outer.id()));
        }

        assert!(rt.current_effect().is_none());
    }

    #[test]
    fn untracked_scopes_nest() {
        let rt = Runtime::new();
        assert!(rt.stack().should_track());

        let outer = UntrackedScope::enter(&rt);
        let inner = UntrackedScope::enter(&rt);
        assert!(!rt.stack().should_track());

        drop(inner);
        assert!(!rt.stack().should_track());

        drop(outer);
        assert!(rt.stack().should_track());
    }

    #[test]
    fn effects_track_inside_untracked_scopes() {
        let rt = Runtime::new();
        let effect = rt.effect_with(|| {}, EffectOptions::lazy());

        let _scope = UntrackedScope::enter(&rt);
        {
            let _ctx = ReactiveContext::enter(&rt, effect.as_effect_ref());
            assert!(rt.is_tracking());
        }
        assert!(!rt.stack().should_track());
    }

    #[test]
    fn stack_is_popped_when_effect_panics() {
        let rt = Runtime::new();
        let effect = rt.effect_with(|| panic!("boom"), EffectOptions::lazy());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| effect.run()));

        assert!(result.is_err());
        assert_eq!(rt.stack().depth(), 0);
    }
}
