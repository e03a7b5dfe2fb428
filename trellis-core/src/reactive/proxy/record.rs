//! Behaviour table for records.

use std::sync::Arc;

use super::{ProxyHandler, ProxyInner};
use crate::reactive::store::{TrackKey, TriggerOp};
use crate::reactive::value::{Key, Value};

pub(super) struct RecordHandler;

/// Records are keyed by property name; other key forms name a property too.
fn prop(key: Key) -> Arc<str> {
    match key {
        Key::Prop(name) => name,
        Key::Index(i) => Arc::from(i.to_string()),
        Key::Length => Arc::from("length"),
        Key::Entry(Value::String(name)) => name,
        Key::Entry(Value::Number(n)) => Arc::from(Value::Number(n).to_string()),
        Key::Entry(other) => panic!("record keys must be strings, found {other:?}"),
    }
}

impl ProxyHandler for RecordHandler {
    fn read(&self, proxy: &ProxyInner, key: Key) -> Value {
        let name = prop(key);
        proxy.track(Key::Prop(name.clone()));
        let raw = proxy
            .target
            .read(|data| data.fields().get(&name).cloned().unwrap_or_default());
        proxy.wrap(raw)
    }

    fn write(&self, proxy: &ProxyInner, key: Key, value: Value) {
        let name = prop(key);
        if proxy.reject_write("set", &Key::Prop(name.clone())) {
            return;
        }

        let value = value.into_raw();
        let old = proxy
            .target
            .update_raw(|data| data.fields_mut().insert(name.clone(), value.clone()));

        match old {
            None => proxy.trigger(Key::Prop(name), TriggerOp::Add),
            Some(old) if Value::has_changed(&old, &value) => {
                proxy.trigger(Key::Prop(name), TriggerOp::Set)
            }
            Some(_) => {}
        }
    }

    fn has(&self, proxy: &ProxyInner, key: Key) -> bool {
        let name = prop(key);
        proxy.track(Key::Prop(name.clone()));
        proxy.target.read(|data| data.fields().contains_key(&name))
    }

    fn delete(&self, proxy: &ProxyInner, key: Key) -> bool {
        let name = prop(key);
        if proxy.reject_write("delete", &Key::Prop(name.clone())) {
            return true;
        }

        let removed = proxy
            .target
            .update_raw(|data| data.fields_mut().shift_remove(&name).is_some());
        if removed {
            proxy.trigger(Key::Prop(name), TriggerOp::Delete);
        }
        removed
    }

    fn enumerate(&self, proxy: &ProxyInner) -> Vec<Key> {
        proxy.track(TrackKey::Iterate);
        proxy
            .target
            .read(|data| data.fields().keys().map(|k| Key::Prop(k.clone())).collect())
    }
}
