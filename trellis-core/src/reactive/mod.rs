//! Reactive Primitives
//!
//! This module implements the dependency-tracking engine: proxies over
//! observed data, effects, computed values and watchers.
//!
//! # Concepts
//!
//! ## Proxies
//!
//! A [`Reactive`] is an observed view of a [`Target`] (a record, array, set or
//! map). Reading through it inside an effect subscribes the effect to the key
//! that was read; writing through it notifies the subscribers of that key, and
//! of the shape of the target when keys are added or removed.
//!
//! ## Effects
//!
//! An [`Effect`] is a computation that re-runs whenever data it read during
//! its last run changes. Dependencies are re-collected on every run.
//!
//! ## Computed values
//!
//! A [`Computed`] caches the result of a getter and recomputes it lazily, on
//! the first read after a dependency changed.
//!
//! ## Watchers
//!
//! A [`Watcher`] calls back with the old and new value of a source, either
//! inline or deferred to the next microtask drain.
//!
//! # Implementation Notes
//!
//! All tracking state lives in a [`Runtime`]. The active effect is the top of
//! the runtime's effect stack; a read checks it and, if present, records the
//! dependency in the runtime's dependency store. Dependency entries are keyed
//! by target identity and die with the target.

mod computed;
mod context;
mod effect;
mod proxy;
mod refs;
mod runtime;
mod store;
mod subscriber;
mod value;
mod watch;

pub use computed::Computed;
pub use context::UntrackedScope;
pub use effect::{Effect, EffectOptions, Scheduler};
pub use proxy::{ProxyMode, Reactive};
pub use refs::{is_ref, proxy_refs, to_ref, to_refs, PropertyRef, ProxyRefs, Ref, RefLike};
pub use runtime::Runtime;
pub use subscriber::{EffectId, EffectRef, TargetId};
pub use value::{Callback, Key, NativeFn, Target, TargetData, TargetKind, Value};
pub use watch::{Flush, Invalidation, WatchOptions, Watcher};
