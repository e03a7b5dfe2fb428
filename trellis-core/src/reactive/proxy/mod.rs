//! Reactive Proxies
//!
//! A [`Reactive`] is an observed view over a [`Target`]. Reads through it
//! subscribe the active effect; writes through it notify subscribers. The
//! target itself stays a plain value and never learns it is observed.
//!
//! # Behaviour Tables
//!
//! Every proxy dispatches its `read / write / has / delete / enumerate`
//! capabilities to one of four fixed tables, chosen once from the target's
//! kind when the proxy is built:
//!
//! | kind   | keys                          | enumerate tracks  |
//! |--------|-------------------------------|-------------------|
//! | record | string properties             | iterate key       |
//! | array  | indices and `length`          | `length`          |
//! | set    | member values                 | iterate key       |
//! | map    | entry keys                    | map-key-iterate   |
//!
//! # Modes
//!
//! [`ProxyMode`] picks one of four flavours. Deep proxies wrap nested objects
//! on read (read-only propagates inward) and unwrap nested refs; shallow ones
//! return nested values raw. Read-only proxies never track and refuse writes
//! with a warning while reporting success.
//!
//! Each runtime caches at most one proxy per `(target, mode)`, so wrapping the
//! same object twice yields the identical proxy.

mod array;
mod collection;
mod record;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use tracing::warn;

use super::context::UntrackedScope;
use super::runtime::{Runtime, WeakRuntime};
use super::store::{TrackKey, TriggerOp};
use super::value::{Key, Target, TargetKind, Value};

/// Flavour of a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProxyMode {
    pub shallow: bool,
    pub readonly: bool,
}

impl ProxyMode {
    pub const REACTIVE: Self = Self {
        shallow: false,
        readonly: false,
    };
    pub const SHALLOW_REACTIVE: Self = Self {
        shallow: true,
        readonly: false,
    };
    pub const READONLY: Self = Self {
        shallow: false,
        readonly: true,
    };
    pub const SHALLOW_READONLY: Self = Self {
        shallow: true,
        readonly: true,
    };
}

/// The capability interface each target kind implements.
pub(crate) trait ProxyHandler: Send + Sync {
    fn read(&self, proxy: &ProxyInner, key: Key) -> Value;
    fn write(&self, proxy: &ProxyInner, key: Key, value: Value);
    fn has(&self, proxy: &ProxyInner, key: Key) -> bool;
    fn delete(&self, proxy: &ProxyInner, key: Key) -> bool;
    fn enumerate(&self, proxy: &ProxyInner) -> Vec<Key>;
}

fn handler_for(kind: TargetKind) -> &'static dyn ProxyHandler {
    match kind {
        TargetKind::Record => &record::RecordHandler,
        TargetKind::Array => &array::ArrayHandler,
        TargetKind::Set => &collection::SetHandler,
        TargetKind::Map => &collection::MapHandler,
    }
}

pub(crate) struct ProxyInner {
    runtime: WeakRuntime,
    target: Target,
    mode: ProxyMode,
    handler: &'static dyn ProxyHandler,
}

impl ProxyInner {
    /// Subscribe the active effect to `key`. Read-only proxies never track.
    fn track(&self, key: impl Into<TrackKey>) {
        if self.mode.readonly {
            return;
        }
        if let Some(rt) = self.runtime.upgrade() {
            let target = &self.target;
            rt.track(target.id(), Some(target.kind()), || target.liveness(), key.into());
        }
    }

    fn trigger(&self, key: impl Into<TrackKey>, op: TriggerOp) {
        if let Some(rt) = self.runtime.upgrade() {
            rt.trigger(self.target.id(), key.into(), op, None);
        }
    }

    /// Trigger a `length` write; `new_len` selects the truncated indices.
    fn trigger_length(&self, new_len: usize) {
        if let Some(rt) = self.runtime.upgrade() {
            rt.trigger(self.target.id(), TrackKey::Key(Key::Length), TriggerOp::Set, Some(new_len));
        }
    }

    fn trigger_deletes(&self, keys: Vec<TrackKey>) {
        if let Some(rt) = self.runtime.upgrade() {
            rt.trigger_deletes(self.target.id(), keys);
        }
    }

    /// Apply the nested-read policy to a raw value read from the target.
    fn wrap(&self, value: Value) -> Value {
        let target = match value {
            Value::Object(target) if !self.mode.shallow => target,
            other => return other,
        };

        let Some(rt) = self.runtime.upgrade() else {
            return Value::Object(target);
        };
        let nested = rt.proxy(
            target,
            ProxyMode {
                shallow: false,
                readonly: self.mode.readonly,
            },
        );
        if nested.raw().is_ref() {
            return nested.get("value");
        }
        Value::Proxy(nested)
    }

    /// Refuse a write on a read-only proxy. Returns `true` if refused.
    fn reject_write(&self, op: &str, key: &Key) -> bool {
        if !self.mode.readonly {
            return false;
        }
        let warn_enabled = self
            .runtime
            .upgrade()
            .map_or(true, |rt| rt.config().warn_on_readonly_write);
        if warn_enabled {
            warn!(key = %key, op, "write to read-only proxy ignored");
        }
        true
    }

    fn expect_kind(&self, kind: TargetKind, op: &str) {
        assert!(
            self.target.kind() == kind,
            "`{op}` requires a {kind:?} proxy, found {:?}",
            self.target.kind()
        );
    }

    fn untracked_scope(&self) -> Option<UntrackedScope> {
        self.runtime.upgrade().map(|rt| UntrackedScope::enter(&rt))
    }
}

/// An observed view over a [`Target`].
///
/// Cloning is cheap and yields the same proxy. Two proxies are equal when
/// they are the same proxy.
#[derive(Clone)]
pub struct Reactive {
    inner: Arc<ProxyInner>,
}

impl Reactive {
    /// Read a property, entry or element.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        self.inner.handler.read(&self.inner, key.into())
    }

    /// Write a property, entry or element.
    ///
    /// Read-only proxies log a warning and change nothing.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) {
        self.inner.handler.write(&self.inner, key.into(), value.into());
    }

    /// Whether `key` is present. Tracks the key.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        self.inner.handler.has(&self.inner, key.into())
    }

    /// Remove `key`. Returns whether something was removed; read-only proxies
    /// report `true` without removing anything.
    pub fn delete(&self, key: impl Into<Key>) -> bool {
        self.inner.handler.delete(&self.inner, key.into())
    }

    /// The current keys, tracking the shape of the target.
    pub fn keys(&self) -> Vec<Key> {
        self.inner.handler.enumerate(&self.inner)
    }

    /// Number of fields, elements, members or entries. Tracks the shape.
    pub fn len(&self) -> usize {
        match self.kind() {
            TargetKind::Array => self.array_len(),
            TargetKind::Record => {
                self.inner.track(TrackKey::Iterate);
                self.inner.target.read(|data| data.fields().len())
            }
            TargetKind::Set | TargetKind::Map => self.size(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The wrapped values of the target, tracking the whole collection.
    pub fn values(&self) -> Vec<Value> {
        match self.kind() {
            TargetKind::Record => {
                self.inner.track(TrackKey::Iterate);
                let keys: Vec<Key> = self
                    .inner
                    .target
                    .read(|data| data.fields().keys().map(|k| Key::Prop(k.clone())).collect());
                keys.into_iter().map(|key| self.get(key)).collect()
            }
            TargetKind::Array => self.array_values(),
            TargetKind::Set | TargetKind::Map => self.collection_values(),
        }
    }

    /// The underlying target.
    pub fn raw(&self) -> &Target {
        &self.inner.target
    }

    pub fn mode(&self) -> ProxyMode {
        self.inner.mode
    }

    pub fn kind(&self) -> TargetKind {
        self.inner.target.kind()
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.mode.readonly
    }

    pub fn is_shallow(&self) -> bool {
        self.inner.mode.shallow
    }

    /// The runtime this proxy reports to, if it is still alive.
    pub fn runtime(&self) -> Option<Runtime> {
        self.inner.runtime.upgrade()
    }

    /// Untracked JSON snapshot of the target.
    pub fn to_json(&self) -> serde_json::Value {
        Value::Proxy(self.clone()).to_json()
    }

    fn ptr(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl PartialEq for Reactive {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Reactive {}

impl Hash for Reactive {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr().hash(state);
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("target", &self.inner.target)
            .field("mode", &self.inner.mode)
            .finish()
    }
}

impl Runtime {
    /// Deep, writable proxy over `target`.
    pub fn reactive(&self, target: Target) -> Reactive {
        self.proxy(target, ProxyMode::REACTIVE)
    }

    /// Writable proxy whose nested reads return raw values.
    pub fn shallow_reactive(&self, target: Target) -> Reactive {
        self.proxy(target, ProxyMode::SHALLOW_REACTIVE)
    }

    /// Deep read-only proxy over `target`.
    pub fn readonly(&self, target: Target) -> Reactive {
        self.proxy(target, ProxyMode::READONLY)
    }

    pub fn shallow_readonly(&self, target: Target) -> Reactive {
        self.proxy(target, ProxyMode::SHALLOW_READONLY)
    }

    /// The cached proxy for `(target, mode)`, created on first use.
    pub fn proxy(&self, target: Target, mode: ProxyMode) -> Reactive {
        let key = (target.id(), mode);
        let mut cache = self.proxy_cache().lock();

        if let Some(inner) = cache.get(&key).and_then(Weak::upgrade) {
            return Reactive { inner };
        }

        let inner = Arc::new(ProxyInner {
            runtime: self.downgrade(),
            handler: handler_for(target.kind()),
            target,
            mode,
        });
        cache.insert(key, Arc::downgrade(&inner));
        if cache.len() % self.config().sweep_interval.max(1) == 0 {
            cache.retain(|_, proxy| proxy.strong_count() > 0);
        }

        Reactive { inner }
    }
}
