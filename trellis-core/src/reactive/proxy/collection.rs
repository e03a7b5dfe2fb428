//! Behaviour tables and methods for sets and maps.
//!
//! Membership reads (`has`, map `get`) track the specific entry. Size and
//! whole-collection iteration track the iterate key; map key enumeration
//! tracks the map-key-iterate key, so it ignores value-only writes.
//!
//! Writing an existing map key always notifies, even with an equal value:
//! iteration observers see every entry write. The one exception is NaN over
//! NaN, which is never a change.

use super::{ProxyHandler, ProxyInner, Reactive};
use crate::reactive::store::{TrackKey, TriggerOp};
use crate::reactive::value::{Key, TargetKind, Value};

pub(super) struct SetHandler;

pub(super) struct MapHandler;

impl ProxyHandler for SetHandler {
    fn read(&self, _proxy: &ProxyInner, key: Key) -> Value {
        panic!("sets have no keyed reads, use `has` (key {key})")
    }

    fn write(&self, _proxy: &ProxyInner, key: Key, _value: Value) {
        panic!("sets have no keyed writes, use `add` (key {key})")
    }

    fn has(&self, proxy: &ProxyInner, key: Key) -> bool {
        let member = key.into_entry();
        proxy.track(Key::Entry(member.clone()));
        proxy.target.read(|data| data.members().contains(&member))
    }

    fn delete(&self, proxy: &ProxyInner, key: Key) -> bool {
        let member = key.into_entry();
        if proxy.reject_write("delete", &Key::Entry(member.clone())) {
            return true;
        }

        let removed = proxy
            .target
            .update_raw(|data| data.members_mut().shift_remove(&member));
        if removed {
            proxy.trigger(Key::Entry(member), TriggerOp::Delete);
        }
        removed
    }

    fn enumerate(&self, proxy: &ProxyInner) -> Vec<Key> {
        proxy.track(TrackKey::Iterate);
        let members: Vec<Value> = proxy.target.read(|data| data.members().iter().cloned().collect());
        members
            .into_iter()
            .map(|m| Key::Entry(proxy.wrap(m)))
            .collect()
    }
}

impl ProxyHandler for MapHandler {
    fn read(&self, proxy: &ProxyInner, key: Key) -> Value {
        let entry = key.into_entry();
        proxy.track(Key::Entry(entry.clone()));
        let raw = proxy
            .target
            .read(|data| data.entries().get(&entry).cloned().unwrap_or_default());
        proxy.wrap(raw)
    }

    fn write(&self, proxy: &ProxyInner, key: Key, value: Value) {
        let entry = key.into_entry();
        if proxy.reject_write("set", &Key::Entry(entry.clone())) {
            return;
        }

        let value = value.into_raw();
        let both_nan = value.is_nan();
        let old = proxy
            .target
            .update_raw(|data| data.entries_mut().insert(entry.clone(), value));
        match old {
            None => proxy.trigger(Key::Entry(entry), TriggerOp::Add),
            Some(old) if both_nan && old.is_nan() => {}
            Some(_) => proxy.trigger(Key::Entry(entry), TriggerOp::Set),
        }
    }

    fn has(&self, proxy: &ProxyInner, key: Key) -> bool {
        let entry = key.into_entry();
        proxy.track(Key::Entry(entry.clone()));
        proxy.target.read(|data| data.entries().contains_key(&entry))
    }

    fn delete(&self, proxy: &ProxyInner, key: Key) -> bool {
        let entry = key.into_entry();
        if proxy.reject_write("delete", &Key::Entry(entry.clone())) {
            return true;
        }

        let removed = proxy
            .target
            .update_raw(|data| data.entries_mut().shift_remove(&entry).is_some());
        if removed {
            proxy.trigger(Key::Entry(entry), TriggerOp::Delete);
        }
        removed
    }

    fn enumerate(&self, proxy: &ProxyInner) -> Vec<Key> {
        proxy.track(TrackKey::MapKeyIterate);
        let keys: Vec<Value> = proxy.target.read(|data| data.entries().keys().cloned().collect());
        keys.into_iter().map(|k| Key::Entry(proxy.wrap(k))).collect()
    }
}

impl Reactive {
    /// Number of members or entries. Tracks the iterate key.
    pub(super) fn size(&self) -> usize {
        self.inner.track(TrackKey::Iterate);
        self.inner.target.read(|data| match self.kind() {
            TargetKind::Set => data.members().len(),
            _ => data.entries().len(),
        })
    }

    pub(super) fn collection_values(&self) -> Vec<Value> {
        self.inner.track(TrackKey::Iterate);
        let raw: Vec<Value> = self.inner.target.read(|data| match self.kind() {
            TargetKind::Set => data.members().iter().cloned().collect(),
            _ => data.entries().values().cloned().collect(),
        });
        raw.into_iter().map(|v| self.inner.wrap(v)).collect()
    }

    /// Add `value` to a set. Adding a present member changes nothing.
    pub fn add(&self, value: impl Into<Value>) {
        self.inner.expect_kind(TargetKind::Set, "add");
        let member = value.into().into_raw();
        if self.inner.reject_write("add", &Key::Entry(member.clone())) {
            return;
        }

        let inserted = self
            .inner
            .target
            .update_raw(|data| data.members_mut().insert(member.clone()));
        if inserted {
            self.inner.trigger(Key::Entry(member), TriggerOp::Add);
        }
    }

    /// Remove every member or entry of a set or map.
    pub fn clear(&self) {
        let kind = self.kind();
        assert!(
            matches!(kind, TargetKind::Set | TargetKind::Map),
            "`clear` requires a Set or Map proxy, found {kind:?}"
        );
        if self.inner.reject_write("clear", &Key::Prop("*".into())) {
            return;
        }

        let removed: Vec<Value> = self.inner.target.update_raw(|data| match kind {
            TargetKind::Set => data.members_mut().drain(..).collect(),
            _ => data.entries_mut().drain(..).map(|(k, _)| k).collect(),
        });
        if removed.is_empty() {
            return;
        }

        let mut keys: Vec<TrackKey> = removed
            .into_iter()
            .map(|k| TrackKey::Key(Key::Entry(k)))
            .collect();
        keys.push(TrackKey::Iterate);
        if kind == TargetKind::Map {
            keys.push(TrackKey::MapKeyIterate);
        }
        self.inner.trigger_deletes(keys);
    }

    /// The `(key, value)` pairs of a map, wrapped. Tracks the iterate key.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.inner.expect_kind(TargetKind::Map, "entries");
        self.inner.track(TrackKey::Iterate);
        let raw: Vec<(Value, Value)> = self.inner.target.read(|data| {
            data.entries()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        });
        raw.into_iter()
            .map(|(k, v)| (self.inner.wrap(k), self.inner.wrap(v)))
            .collect()
    }

    /// Call `f(value, key)` for every entry of a map or member of a set
    /// (where key and value are the member). Tracks the iterate key.
    pub fn for_each(&self, mut f: impl FnMut(&Value, &Value)) {
        match self.kind() {
            TargetKind::Map => {
                for (k, v) in self.entries() {
                    f(&v, &k);
                }
            }
            TargetKind::Set => {
                for v in self.collection_values() {
                    f(&v, &v);
                }
            }
            TargetKind::Array => {
                for (i, v) in self.array_values().iter().enumerate() {
                    f(v, &Value::from(i));
                }
            }
            TargetKind::Record => {
                self.inner.track(TrackKey::Iterate);
                let keys: Vec<_> = self.inner.target.read(|data| data.fields().keys().cloned().collect());
                for k in keys {
                    let v = self.get(Key::Prop(k.clone()));
                    f(&v, &Value::String(k));
                }
            }
        }
    }
}
