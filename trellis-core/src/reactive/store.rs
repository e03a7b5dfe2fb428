//! Dependency Store
//!
//! Two-level mapping from observed target to property key to the set of
//! effects subscribed to that key. Entries are keyed by [`TargetId`] and hold
//! only a weak handle on the target itself, so a target that becomes
//! unreachable is reclaimed by the next sweep.
//!
//! # Fan-out
//!
//! [`DepStore::collect`] turns one write into the ordered, de-duplicated list
//! of effects to notify:
//!
//! 1. subscribers of the written key, minus the active effect;
//! 2. iterate-key subscribers for adds and deletes, and for map sets;
//! 3. map-key-iterate subscribers for map adds and deletes;
//! 4. `length` subscribers for array adds;
//! 5. subscribers of every index at or past the new length when an array's
//!    `length` is written.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::subscriber::{EffectId, EffectRef, TargetId};
use super::value::{Key, TargetKind};

/// A dependency key: a real property, or one of the synthetic shape keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum TrackKey {
    Key(Key),
    /// The set of keys (or entries) changed.
    Iterate,
    /// The set of map keys changed. Value-only map writes leave it alone.
    MapKeyIterate,
}

impl From<Key> for TrackKey {
    fn from(key: Key) -> Self {
        TrackKey::Key(key)
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKey::Key(key) => key.fmt(f),
            TrackKey::Iterate => f.write_str("<iterate>"),
            TrackKey::MapKeyIterate => f.write_str("<map-key-iterate>"),
        }
    }
}

/// Classification of a write, driving the fan-out rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TriggerOp {
    Add,
    Set,
    Delete,
}

/// The effects subscribed to one `(target, key)` pair, in subscription order.
#[derive(Default)]
pub(crate) struct Dep {
    subscribers: Mutex<IndexMap<EffectId, EffectRef>>,
}

impl Dep {
    /// Subscribe `effect`. Returns `false` if it already was.
    pub(crate) fn insert(&self, effect: &EffectRef) -> bool {
        let mut subscribers = self.subscribers.lock();
        if subscribers.contains_key(&effect.id()) {
            return false;
        }
        subscribers.insert(effect.id(), effect.clone());
        true
    }

    pub(crate) fn remove(&self, id: EffectId) {
        self.subscribers.lock().shift_remove(&id);
    }

    fn is_empty(&self) -> bool {
        self.subscribers.lock().is_empty()
    }

    fn collect_into(&self, out: &mut IndexMap<EffectId, EffectRef>, skip: Option<EffectId>) {
        for (id, effect) in self.subscribers.lock().iter() {
            if Some(*id) != skip && !out.contains_key(id) {
                out.insert(*id, effect.clone());
            }
        }
    }
}

/// Dependencies of a single target.
pub(crate) struct TargetDeps {
    owner: Weak<dyn Any + Send + Sync>,
    /// `None` for computed values, which only have the `value` key.
    kind: Option<TargetKind>,
    keys: IndexMap<TrackKey, Arc<Dep>>,
}

impl TargetDeps {
    fn is_alive(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

/// The dependency store of one runtime.
#[derive(Default)]
pub(crate) struct DepStore {
    targets: HashMap<TargetId, TargetDeps>,
    inserted_since_sweep: usize,
}

impl DepStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The dep for `(target, key)`, created on first use.
    ///
    /// `owner` is only called when the target has no entry yet.
    pub(crate) fn dep_for(
        &mut self,
        id: TargetId,
        kind: Option<TargetKind>,
        owner: impl FnOnce() -> Weak<dyn Any + Send + Sync>,
        key: TrackKey,
    ) -> Arc<Dep> {
        let entry = self.targets.entry(id).or_insert_with(|| TargetDeps {
            owner: owner(),
            kind,
            keys: IndexMap::new(),
        });
        let dep = entry.keys.entry(key).or_insert_with(|| {
            self.inserted_since_sweep += 1;
            Arc::new(Dep::default())
        });
        Arc::clone(dep)
    }

    /// Effects to notify for a write, per the fan-out rules.
    ///
    /// `new_len` is the array length after the write; it is only consulted
    /// when `key` is `length`.
    pub(crate) fn collect(
        &self,
        id: TargetId,
        key: &TrackKey,
        op: TriggerOp,
        new_len: Option<usize>,
        skip: Option<EffectId>,
    ) -> Vec<EffectRef> {
        let Some(entry) = self.targets.get(&id) else {
            return Vec::new();
        };
        let mut out = IndexMap::new();
        let mut add = |key: &TrackKey| {
            if let Some(dep) = entry.keys.get(key) {
                dep.collect_into(&mut out, skip);
            }
        };

        add(key);

        let is_map = entry.kind == Some(TargetKind::Map);
        let shape_change = matches!(op, TriggerOp::Add | TriggerOp::Delete);

        if shape_change || (op == TriggerOp::Set && is_map) {
            add(&TrackKey::Iterate);
        }
        if shape_change && is_map {
            add(&TrackKey::MapKeyIterate);
        }

        if entry.kind == Some(TargetKind::Array) {
            if op == TriggerOp::Add {
                add(&TrackKey::Key(Key::Length));
            }
            if let (TrackKey::Key(Key::Length), Some(len)) = (key, new_len) {
                let truncated: Vec<&TrackKey> = entry
                    .keys
                    .keys()
                    .filter(|k| matches!(k, TrackKey::Key(Key::Index(i)) if *i >= len))
                    .collect();
                for k in truncated {
                    add(k);
                }
            }
        }

        out.into_values().collect()
    }

    /// Whether another sweep is due.
    pub(crate) fn sweep_due(&self, interval: usize) -> bool {
        self.inserted_since_sweep >= interval
    }

    /// Remove entries for dead targets and keys nobody subscribes to.
    ///
    /// The removed entries are returned so the caller can drop them after
    /// releasing the store lock.
    pub(crate) fn sweep(&mut self) -> Vec<TargetDeps> {
        self.inserted_since_sweep = 0;

        let dead: Vec<TargetId> = self
            .targets
            .iter()
            .filter(|(_, deps)| !deps.is_alive())
            .map(|(id, _)| *id)
            .collect();
        let removed: Vec<TargetDeps> = dead
            .iter()
            .filter_map(|id| self.targets.remove(id))
            .collect();

        for deps in self.targets.values_mut() {
            deps.keys.retain(|_, dep| !dep.is_empty());
        }
        self.targets.retain(|_, deps| !deps.keys.is_empty());

        removed
    }

    /// Number of targets with at least one tracked key.
    pub(crate) fn target_count(&self) -> usize {
        self.targets.len()
    }
}
