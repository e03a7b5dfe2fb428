//! Behaviour table and methods for arrays.
//!
//! Reading an index tracks that index; enumerating or reading `length`
//! tracks `length`. The mutators (`push`, `pop`, `shift`, `unshift`,
//! `splice`) run with tracking paused: they look at the length internally
//! and must not subscribe the calling effect to it, or two effects pushing
//! into the same array would re-trigger each other forever.
//!
//! The search methods compare against the wrapped elements first and fall
//! back to the raw elements, so both a proxy and the raw object it wraps are
//! found.

use super::{ProxyHandler, ProxyInner, Reactive};
use crate::reactive::store::TriggerOp;
use crate::reactive::value::{Key, TargetKind, Value};

pub(super) struct ArrayHandler;

/// An array key: an element or the length.
enum Slot {
    Index(usize),
    Length,
}

/// Largest valid array index; a length may be one more.
const MAX_INDEX: usize = 4_294_967_294;

fn index(i: usize) -> Slot {
    assert!(i <= MAX_INDEX, "array index {i} exceeds the maximum of {MAX_INDEX}");
    Slot::Index(i)
}

fn slot(key: Key) -> Slot {
    let parse = |s: &str| -> Slot {
        if s == "length" {
            return Slot::Length;
        }
        match s.parse::<usize>() {
            Ok(i) => index(i),
            Err(_) => panic!("array keys are indices or `length`, found {s:?}"),
        }
    };

    match key {
        Key::Index(i) => index(i),
        Key::Length => Slot::Length,
        Key::Prop(name) => parse(&name),
        Key::Entry(Value::String(name)) => parse(&name),
        Key::Entry(Value::Number(n)) if n >= 0.0 && n.fract() == 0.0 => index(n as usize),
        Key::Entry(other) => panic!("array keys are indices or `length`, found {other:?}"),
    }
}

fn length_value(value: &Value) -> usize {
    match value {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= (MAX_INDEX + 1) as f64 => {
            *n as usize
        }
        other => panic!("array length must be an integer in 0..={}, found {other:?}", MAX_INDEX + 1),
    }
}

impl ProxyHandler for ArrayHandler {
    fn read(&self, proxy: &ProxyInner, key: Key) -> Value {
        match slot(key) {
            Slot::Length => {
                proxy.track(Key::Length);
                Value::from(proxy.target.read(|data| data.items().len()))
            }
            Slot::Index(i) => {
                proxy.track(Key::Index(i));
                let raw = proxy
                    .target
                    .read(|data| data.items().get(i).cloned().unwrap_or_default());
                proxy.wrap(raw)
            }
        }
    }

    fn write(&self, proxy: &ProxyInner, key: Key, value: Value) {
        match slot(key) {
            Slot::Length => {
                if proxy.reject_write("set", &Key::Length) {
                    return;
                }
                let new_len = length_value(&value);
                let old_len = proxy.target.update_raw(|data| {
                    let items = data.items_mut();
                    let old_len = items.len();
                    items.resize(new_len, Value::Undefined);
                    old_len
                });
                if new_len != old_len {
                    proxy.trigger_length(new_len);
                }
            }
            Slot::Index(i) => {
                if proxy.reject_write("set", &Key::Index(i)) {
                    return;
                }
                let value = value.into_raw();
                let (op, old) = proxy.target.update_raw(|data| {
                    let items = data.items_mut();
                    if i >= items.len() {
                        items.resize(i + 1, Value::Undefined);
                        items[i] = value.clone();
                        (TriggerOp::Add, Value::Undefined)
                    } else {
                        let old = std::mem::replace(&mut items[i], value.clone());
                        (TriggerOp::Set, old)
                    }
                });
                if op == TriggerOp::Add || Value::has_changed(&old, &value) {
                    proxy.trigger(Key::Index(i), op);
                }
            }
        }
    }

    fn has(&self, proxy: &ProxyInner, key: Key) -> bool {
        match slot(key) {
            Slot::Length => true,
            Slot::Index(i) => {
                proxy.track(Key::Index(i));
                proxy.target.read(|data| i < data.items().len())
            }
        }
    }

    /// Deleting an element leaves a hole (`undefined`); the length is kept.
    fn delete(&self, proxy: &ProxyInner, key: Key) -> bool {
        let Slot::Index(i) = slot(key) else {
            return false;
        };
        if proxy.reject_write("delete", &Key::Index(i)) {
            return true;
        }

        let removed = proxy.target.update_raw(|data| {
            data.items_mut()
                .get_mut(i)
                .map(std::mem::take)
                .is_some()
        });
        if removed {
            proxy.trigger(Key::Index(i), TriggerOp::Delete);
        }
        removed
    }

    fn enumerate(&self, proxy: &ProxyInner) -> Vec<Key> {
        proxy.track(Key::Length);
        let len = proxy.target.read(|data| data.items().len());
        (0..len).map(Key::Index).collect()
    }
}

impl Reactive {
    pub(super) fn array_len(&self) -> usize {
        self.inner.track(Key::Length);
        self.inner.target.read(|data| data.items().len())
    }

    /// Every element, wrapped. Tracks `length` and each index.
    pub(super) fn array_values(&self) -> Vec<Value> {
        let len = self.array_len();
        (0..len).map(|i| self.get(i)).collect()
    }

    /// Resize the array; shrinking notifies readers of the dropped indices.
    pub fn set_len(&self, len: usize) {
        self.inner.expect_kind(TargetKind::Array, "set_len");
        self.set(Key::Length, len);
    }

    /// Append `value`, returning the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        self.inner.expect_kind(TargetKind::Array, "push");
        let _paused = self.inner.untracked_scope();
        let len = self.raw_len();
        self.splice(len, 0, vec![value.into()]);
        self.raw_len()
    }

    /// Remove and return the last element, or `undefined` when empty.
    pub fn pop(&self) -> Value {
        self.inner.expect_kind(TargetKind::Array, "pop");
        let _paused = self.inner.untracked_scope();
        match self.raw_len() {
            0 => Value::Undefined,
            len => self.splice(len - 1, 1, Vec::new()).pop().unwrap_or_default(),
        }
    }

    /// Remove and return the first element, or `undefined` when empty.
    pub fn shift(&self) -> Value {
        self.inner.expect_kind(TargetKind::Array, "shift");
        let _paused = self.inner.untracked_scope();
        self.splice(0, 1, Vec::new()).pop().unwrap_or_default()
    }

    /// Prepend `value`, returning the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> usize {
        self.inner.expect_kind(TargetKind::Array, "unshift");
        let _paused = self.inner.untracked_scope();
        self.splice(0, 0, vec![value.into()]);
        self.raw_len()
    }

    /// Remove `delete_count` elements at `start`, insert `items` in their
    /// place, and return the removed elements.
    ///
    /// Every index whose value changed is notified, additions past the old
    /// end as adds, followed by `length` if it changed.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        self.inner.expect_kind(TargetKind::Array, "splice");
        if self.inner.reject_write("splice", &Key::Index(start)) {
            return Vec::new();
        }
        let _paused = self.inner.untracked_scope();

        let items: Vec<Value> = items.into_iter().map(Value::into_raw).collect();
        let (before, after, removed) = self.inner.target.update_raw(|data| {
            let elements = data.items_mut();
            let before = elements.clone();
            let start = start.min(elements.len());
            let end = start.saturating_add(delete_count).min(elements.len());
            let removed: Vec<Value> = elements.splice(start..end, items).collect();
            (before, elements.clone(), removed)
        });

        for (i, value) in after.iter().enumerate() {
            match before.get(i) {
                None => self.inner.trigger(Key::Index(i), TriggerOp::Add),
                Some(old) if Value::has_changed(old, value) => {
                    self.inner.trigger(Key::Index(i), TriggerOp::Set)
                }
                Some(_) => {}
            }
        }
        if after.len() != before.len() {
            self.inner.trigger_length(after.len());
        }

        removed.into_iter().map(|v| self.inner.wrap(v)).collect()
    }

    /// Whether the array contains `needle` (SameValueZero).
    pub fn includes(&self, needle: &Value) -> bool {
        self.inner.expect_kind(TargetKind::Array, "includes");
        self.array_values().iter().any(|v| v.same_value_zero(needle))
            || self.raw_position(|v| v.same_value_zero(needle)).is_some()
    }

    /// First index of `needle` under strict equality; `NaN` is never found.
    pub fn index_of(&self, needle: &Value) -> Option<usize> {
        self.inner.expect_kind(TargetKind::Array, "index_of");
        self.array_values()
            .iter()
            .position(|v| v.strict_eq(needle))
            .or_else(|| self.raw_position(|v| v.strict_eq(needle)))
    }

    /// Last index of `needle` under strict equality.
    pub fn last_index_of(&self, needle: &Value) -> Option<usize> {
        self.inner.expect_kind(TargetKind::Array, "last_index_of");
        self.array_values()
            .iter()
            .rposition(|v| v.strict_eq(needle))
            .or_else(|| {
                self.inner
                    .target
                    .read(|data| data.items().iter().rposition(|v| v.strict_eq(needle)))
            })
    }

    /// Index of the first element matching `predicate`.
    pub fn find_index(&self, mut predicate: impl FnMut(&Value) -> bool) -> Option<usize> {
        self.inner.expect_kind(TargetKind::Array, "find_index");
        self.array_values()
            .iter()
            .position(&mut predicate)
            .or_else(|| self.raw_position(predicate))
    }

    /// The first element matching `predicate`. A match found only among the
    /// raw elements is returned raw.
    pub fn find(&self, mut predicate: impl FnMut(&Value) -> bool) -> Option<Value> {
        self.inner.expect_kind(TargetKind::Array, "find");
        self.array_values()
            .into_iter()
            .find(|v| predicate(v))
            .or_else(|| {
                self.inner
                    .target
                    .read(|data| data.items().iter().find(|v| predicate(v)).cloned())
            })
    }

    fn raw_len(&self) -> usize {
        self.inner.target.read(|data| data.items().len())
    }

    fn raw_position(&self, predicate: impl FnMut(&Value) -> bool) -> Option<usize> {
        self.inner
            .target
            .read(|data| data.items().iter().position(predicate))
    }
}
