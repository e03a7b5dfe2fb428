//! Refs
//!
//! A [`Ref`] is a reactive single-field record `{ value }` whose target
//! carries the ref capability tag. The tag is not a field, so it never shows
//! up in enumeration, and it lets deep proxies recognise a nested ref and
//! unwrap it on read.
//!
//! [`PropertyRef`] is a ref-like view of one property of a reactive value;
//! [`to_refs`] builds one for every key. [`ProxyRefs`] reads through refs
//! stored in a record and writes into them instead of replacing them.

use indexmap::IndexMap;

use super::proxy::Reactive;
use super::runtime::Runtime;
use super::value::{Key, Target, Value};

/// Read/write access to a single reactive value.
pub trait RefLike {
    fn get(&self) -> Value;
    fn set(&self, value: Value);
}

/// A reactive single-value cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ref {
    proxy: Reactive,
}

impl Ref {
    /// Read the value, subscribing the active effect.
    pub fn get(&self) -> Value {
        self.proxy.get("value")
    }

    /// Replace the value, notifying subscribers if it changed.
    pub fn set(&self, value: impl Into<Value>) {
        self.proxy.set("value", value);
    }

    /// The reactive wrapper record.
    pub fn proxy(&self) -> &Reactive {
        &self.proxy
    }

    /// Recover a ref from a value holding its wrapper.
    pub fn from_value(runtime: &Runtime, value: &Value) -> Option<Ref> {
        let target = value.target().filter(|t| t.is_ref())?;
        Some(Ref {
            proxy: runtime.reactive(target.clone()),
        })
    }
}

impl RefLike for Ref {
    fn get(&self) -> Value {
        Ref::get(self)
    }

    fn set(&self, value: Value) {
        Ref::set(self, value)
    }
}

/// Whether `value` is (the wrapper of) a ref.
pub fn is_ref(value: &Value) -> bool {
    value.target().is_some_and(Target::is_ref)
}

/// A ref-like view of `source[key]`.
///
/// Reads and writes go through the proxy, so they track and trigger as usual.
#[derive(Debug, Clone)]
pub struct PropertyRef {
    source: Reactive,
    key: Key,
}

impl PropertyRef {
    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn source(&self) -> &Reactive {
        &self.source
    }
}

impl RefLike for PropertyRef {
    fn get(&self) -> Value {
        self.source.get(self.key.clone())
    }

    fn set(&self, value: Value) {
        self.source.set(self.key.clone(), value);
    }
}

/// A ref-like view of one property.
pub fn to_ref(source: &Reactive, key: impl Into<Key>) -> PropertyRef {
    PropertyRef {
        source: source.clone(),
        key: key.into(),
    }
}

/// A ref-like view of every current key of `source`, in key order.
pub fn to_refs(source: &Reactive) -> IndexMap<Key, PropertyRef> {
    source
        .keys()
        .into_iter()
        .map(|key| (key.clone(), to_ref(source, key)))
        .collect()
}

/// A record view that unwraps refs on read and writes into them on write.
#[derive(Debug, Clone)]
pub struct ProxyRefs {
    source: Reactive,
}

/// Wrap `source` so refs stored in it behave like plain fields.
pub fn proxy_refs(source: &Reactive) -> ProxyRefs {
    ProxyRefs {
        source: source.clone(),
    }
}

impl ProxyRefs {
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let value = self.source.get(key);
        match self.source.runtime().and_then(|rt| Ref::from_value(&rt, &value)) {
            Some(cell) => cell.get(),
            None => value,
        }
    }

    /// Write `value`. A ref currently stored under `key` receives the value
    /// unless `value` is itself a ref, which replaces it.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();

        let name = key.to_string();
        let stored = self
            .source
            .raw()
            .read(|data| data.fields().get(name.as_str()).and_then(Value::target).cloned());

        match stored {
            Some(cell) if cell.is_ref() && !is_ref(&value) => match self.source.runtime() {
                Some(rt) => rt.proxy(cell, self.source.mode()).set("value", value),
                None => cell.update_raw(|data| {
                    data.fields_mut().insert("value".into(), value.into_raw());
                }),
            },
            _ => self.source.set(key, value),
        }
    }
}

impl Runtime {
    /// Create a ref holding `value`.
    pub fn ref_value(&self, value: impl Into<Value>) -> Ref {
        Ref {
            proxy: self.reactive(Target::new_ref(value.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn ref_reruns_readers() {
        let rt = Runtime::new();
        let count = rt.ref_value(1);
        let seen = Arc::new(AtomicI32::new(0));

        let c = count.clone();
        let seen_clone = seen.clone();
        let _effect = rt.effect(move || {
            let n = c.get().as_f64().unwrap_or_default();
            seen_clone.store(n as i32, Ordering::SeqCst);
        });

        count.set(5);
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn ref_tag_is_not_enumerable() {
        let rt = Runtime::new();
        let r = rt.ref_value("x");

        assert_eq!(r.proxy().keys(), vec![Key::from("value")]);
        assert!(is_ref(&Value::from(r.clone())));
        assert!(!is_ref(&Value::Object(Target::record([("value", 1)]))));
    }

    #[test]
    fn nested_refs_unwrap_in_deep_reads() {
        let rt = Runtime::new();
        let r = rt.ref_value(3);
        let state = rt.reactive(Target::record([("r", Value::from(r.clone()))]));

        assert_eq!(state.get("r"), Value::from(3));

        let shallow = rt.shallow_reactive(state.raw().clone());
        assert!(is_ref(&shallow.get("r")));
    }

    #[test]
    fn to_refs_stay_connected() {
        let rt = Runtime::new();
        let state = rt.reactive(Target::record([("a", 1), ("b", 2)]));
        let refs = to_refs(&state);

        assert_eq!(refs.len(), 2);
        let a = &refs[&Key::from("a")];
        a.set(Value::from(10));
        assert_eq!(state.get("a"), Value::from(10));

        state.set("b", 20);
        assert_eq!(refs[&Key::from("b")].get(), Value::from(20));
    }

    #[test]
    fn proxy_refs_write_into_stored_refs() {
        let rt = Runtime::new();
        let r = rt.ref_value(1);
        let state = rt.reactive(Target::record([("r", Value::from(r.clone())), ("n", Value::from(0))]));
        let view = proxy_refs(&state);

        view.set("r", 2);
        assert_eq!(r.get(), Value::from(2));
        assert_eq!(view.get("r"), Value::from(2));

        view.set("n", 4);
        assert_eq!(view.get("n"), Value::from(4));
    }
}
