//! Observed values.
//!
//! [`Value`] is the dynamic value the proxy layer observes. Structured data
//! lives in a [`Target`]: a shared cell with a stable identity whose kind
//! (record, array, set or map) is fixed when it is created. Targets are raw:
//! reading or writing them directly is invisible to the tracking engine. Wrap
//! one with [`Runtime::reactive`](crate::reactive::Runtime::reactive) to
//! observe it.
//!
//! Equality follows SameValueZero: `NaN` equals `NaN`, `+0` equals `-0`, and
//! objects, proxies and functions compare by identity. A raw target and a
//! proxy over it are different values.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;

use super::proxy::Reactive;
use super::refs::Ref;
use super::subscriber::TargetId;

/// Signature of a native function stored in a [`Value`].
pub type NativeFn = dyn Fn(&[Value]) -> Value + Send + Sync;

/// A function value, compared by identity.
#[derive(Clone)]
pub struct Callback(Arc<NativeFn>);

impl Callback {
    /// Wrap a closure as a function value.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invoke the function.
    pub fn call(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for Callback {}

impl Hash for Callback {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:#x})", self.addr())
    }
}

/// A dynamically typed value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Undefined,
    /// Explicit empty value.
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    /// A raw, unobserved structured value.
    Object(Target),
    /// An observed view over a structured value.
    Proxy(Reactive),
    Function(Callback),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// `true` for `Undefined` and `Null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// `true` for raw targets and proxies.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Proxy(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub(crate) fn is_nan(&self) -> bool {
        matches!(self, Value::Number(n) if n.is_nan())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&Reactive> {
        match self {
            Value::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub fn as_callback(&self) -> Option<&Callback> {
        match self {
            Value::Function(cb) => Some(cb),
            _ => None,
        }
    }

    /// The target behind a raw object or a proxy.
    pub fn target(&self) -> Option<&Target> {
        match self {
            Value::Object(target) => Some(target),
            Value::Proxy(proxy) => Some(proxy.raw()),
            _ => None,
        }
    }

    /// Replace a proxy by its raw target; every other value is unchanged.
    pub fn into_raw(self) -> Value {
        match self {
            Value::Proxy(proxy) => Value::Object(proxy.raw().clone()),
            other => other,
        }
    }

    /// Strict equality: like [`same_value_zero`](Self::same_value_zero) but
    /// `NaN` is never equal to anything.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            _ => self.same_value_zero(other),
        }
    }

    /// SameValueZero equality.
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Proxy(a), Value::Proxy(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }

    /// Whether replacing `old` with `new` is an observable change.
    ///
    /// Two `NaN`s are not a change.
    pub(crate) fn has_changed(old: &Value, new: &Value) -> bool {
        !old.same_value_zero(new)
    }

    /// Build raw targets from a JSON document.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s.as_str()),
            serde_json::Value::Array(items) => {
                Value::Object(Target::array(items.iter().map(Value::from_json)))
            }
            serde_json::Value::Object(fields) => Value::Object(Target::record(
                fields.iter().map(|(k, v)| (k.as_str(), Value::from_json(v))),
            )),
        }
    }

    /// Snapshot this value as JSON without tracking anything.
    ///
    /// Reference cycles, functions and `undefined` become `null`; sets become
    /// arrays and maps become arrays of `[key, value]` pairs.
    pub fn to_json(&self) -> serde_json::Value {
        let mut path = HashSet::new();
        self.to_json_inner(&mut path)
    }

    fn to_json_inner(&self, path: &mut HashSet<TargetId>) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Undefined | Value::Null | Value::Function(_) => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => Json::String(s.to_string()),
            Value::Object(_) | Value::Proxy(_) => {
                let Some(target) = self.target() else {
                    return Json::Null;
                };
                if !path.insert(target.id()) {
                    return Json::Null;
                }
                let data = target.snapshot();
                let json = match data {
                    TargetData::Record(fields) => Json::Object(
                        fields
                            .iter()
                            .map(|(k, v)| (k.to_string(), v.to_json_inner(path)))
                            .collect(),
                    ),
                    TargetData::Array(items) => {
                        Json::Array(items.iter().map(|v| v.to_json_inner(path)).collect())
                    }
                    TargetData::Set(items) => {
                        Json::Array(items.iter().map(|v| v.to_json_inner(path)).collect())
                    }
                    TargetData::Map(entries) => Json::Array(
                        entries
                            .iter()
                            .map(|(k, v)| {
                                Json::Array(vec![k.to_json_inner(path), v.to_json_inner(path)])
                            })
                            .collect(),
                    ),
                };
                path.remove(&target.id());
                json
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value_zero(other)
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Undefined | Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => {
                // Keep hashing consistent with SameValueZero.
                let bits = if n.is_nan() {
                    f64::NAN.to_bits()
                } else if *n == 0.0 {
                    0
                } else {
                    n.to_bits()
                };
                bits.hash(state);
            }
            Value::String(s) => s.hash(state),
            Value::Object(target) => target.id().hash(state),
            Value::Proxy(proxy) => proxy.hash(state),
            Value::Function(cb) => cb.hash(state),
        }
    }
}

/// Integral numbers within `i64` range serialize as JSON integers; NaN and
/// the infinities become `null`.
fn number_to_json(n: f64) -> serde_json::Value {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63

    if n.fract() == 0.0 && (-LIMIT..LIMIT).contains(&n) {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if n.is_nan() => f.write_str("NaN"),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Object(target) => write!(f, "[object {:?}]", target.kind()),
            Value::Proxy(proxy) => write!(f, "[object {:?}]", proxy.kind()),
            Value::Function(_) => f.write_str("[function]"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::String(s)
    }
}

impl From<Target> for Value {
    fn from(target: Target) -> Self {
        Value::Object(target)
    }
}

impl From<Reactive> for Value {
    fn from(proxy: Reactive) -> Self {
        Value::Proxy(proxy)
    }
}

impl From<&Reactive> for Value {
    fn from(proxy: &Reactive) -> Self {
        Value::Proxy(proxy.clone())
    }
}

impl From<Ref> for Value {
    /// Stores the ref itself (its raw wrapper), so nested reads unwrap it.
    fn from(r: Ref) -> Self {
        Value::Object(r.proxy().raw().clone())
    }
}

impl From<Callback> for Value {
    fn from(cb: Callback) -> Self {
        Value::Function(cb)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Object(Target::array(items))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A property key.
///
/// Each proxy kind normalizes the keys it accepts: records use string
/// properties, arrays use indices and `length`, sets and maps use entry
/// values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Prop(Arc<str>),
    Index(usize),
    Length,
    Entry(Value),
}

impl Key {
    /// The key as a collection entry value.
    pub(crate) fn into_entry(self) -> Value {
        match self {
            Key::Entry(value) => value.into_raw(),
            Key::Prop(p) => Value::String(p),
            Key::Index(i) => Value::from(i),
            Key::Length => Value::from("length"),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Prop(p) => f.write_str(p),
            Key::Index(i) => write!(f, "{i}"),
            Key::Length => f.write_str("length"),
            Key::Entry(v) => write!(f, "<{v}>"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Prop(Arc::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Prop(Arc::from(s))
    }
}

impl From<Arc<str>> for Key {
    fn from(s: Arc<str>) -> Self {
        Key::Prop(s)
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

/// Integer literals become entry keys; arrays read them as indices.
impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Entry(Value::from(n))
    }
}

impl From<Value> for Key {
    fn from(v: Value) -> Self {
        Key::Entry(v)
    }
}

/// The shape of a target, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Record,
    Array,
    Set,
    Map,
}

/// The contents of a target.
#[derive(Debug, Clone)]
pub enum TargetData {
    Record(IndexMap<Arc<str>, Value>),
    Array(Vec<Value>),
    Set(IndexSet<Value>),
    Map(IndexMap<Value, Value>),
}

impl TargetData {
    pub fn kind(&self) -> TargetKind {
        match self {
            TargetData::Record(_) => TargetKind::Record,
            TargetData::Array(_) => TargetKind::Array,
            TargetData::Set(_) => TargetKind::Set,
            TargetData::Map(_) => TargetKind::Map,
        }
    }

    pub(crate) fn fields(&self) -> &IndexMap<Arc<str>, Value> {
        match self {
            TargetData::Record(fields) => fields,
            other => unreachable!("expected a record target, found {:?}", other.kind()),
        }
    }

    pub(crate) fn fields_mut(&mut self) -> &mut IndexMap<Arc<str>, Value> {
        match self {
            TargetData::Record(fields) => fields,
            other => unreachable!("expected a record target, found {:?}", other.kind()),
        }
    }

    pub(crate) fn items(&self) -> &Vec<Value> {
        match self {
            TargetData::Array(items) => items,
            other => unreachable!("expected an array target, found {:?}", other.kind()),
        }
    }

    pub(crate) fn items_mut(&mut self) -> &mut Vec<Value> {
        match self {
            TargetData::Array(items) => items,
            other => unreachable!("expected an array target, found {:?}", other.kind()),
        }
    }

    pub(crate) fn members(&self) -> &IndexSet<Value> {
        match self {
            TargetData::Set(members) => members,
            other => unreachable!("expected a set target, found {:?}", other.kind()),
        }
    }

    pub(crate) fn members_mut(&mut self) -> &mut IndexSet<Value> {
        match self {
            TargetData::Set(members) => members,
            other => unreachable!("expected a set target, found {:?}", other.kind()),
        }
    }

    pub(crate) fn entries(&self) -> &IndexMap<Value, Value> {
        match self {
            TargetData::Map(entries) => entries,
            other => unreachable!("expected a map target, found {:?}", other.kind()),
        }
    }

    pub(crate) fn entries_mut(&mut self) -> &mut IndexMap<Value, Value> {
        match self {
            TargetData::Map(entries) => entries,
            other => unreachable!("expected a map target, found {:?}", other.kind()),
        }
    }
}

pub(crate) struct TargetCell {
    id: TargetId,
    kind: TargetKind,
    /// Capability tag marking a ref wrapper. Not a field, so never enumerated.
    is_ref: bool,
    data: RwLock<TargetData>,
}

/// A shared structured value with a stable identity.
#[derive(Clone)]
pub struct Target {
    cell: Arc<TargetCell>,
}

impl Target {
    /// Create a target holding `data`. Stored proxies are unwrapped.
    pub fn new(data: TargetData) -> Self {
        Self::with_tag(data, false)
    }

    pub(crate) fn new_ref(value: Value) -> Self {
        let mut fields = IndexMap::new();
        fields.insert(Arc::from("value"), value.into_raw());
        Self::with_tag(TargetData::Record(fields), true)
    }

    fn with_tag(data: TargetData, is_ref: bool) -> Self {
        let data = match data {
            TargetData::Record(fields) => {
                TargetData::Record(fields.into_iter().map(|(k, v)| (k, v.into_raw())).collect())
            }
            TargetData::Array(items) => {
                TargetData::Array(items.into_iter().map(Value::into_raw).collect())
            }
            TargetData::Set(members) => {
                TargetData::Set(members.into_iter().map(Value::into_raw).collect())
            }
            TargetData::Map(entries) => TargetData::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into_raw(), v.into_raw()))
                    .collect(),
            ),
        };
        Self {
            cell: Arc::new(TargetCell {
                id: TargetId::new(),
                kind: data.kind(),
                is_ref,
                data: RwLock::new(data),
            }),
        }
    }

    /// An empty target of the given kind.
    pub fn empty(kind: TargetKind) -> Self {
        Self::new(match kind {
            TargetKind::Record => TargetData::Record(IndexMap::new()),
            TargetKind::Array => TargetData::Array(Vec::new()),
            TargetKind::Set => TargetData::Set(IndexSet::new()),
            TargetKind::Map => TargetData::Map(IndexMap::new()),
        })
    }

    /// A record with the given fields, in order.
    pub fn record<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Arc<str>>,
        V: Into<Value>,
    {
        Self::new(TargetData::Record(
            fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        ))
    }

    /// An array with the given items.
    pub fn array<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(TargetData::Array(items.into_iter().map(Into::into).collect()))
    }

    /// A set with the given members.
    pub fn set<I, V>(members: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(TargetData::Set(members.into_iter().map(Into::into).collect()))
    }

    /// A map with the given entries, in order.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        Self::new(TargetData::Map(
            entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        ))
    }

    pub fn id(&self) -> TargetId {
        self.cell.id
    }

    pub fn kind(&self) -> TargetKind {
        self.cell.kind
    }

    /// Whether this target is a ref wrapper.
    pub fn is_ref(&self) -> bool {
        self.cell.is_ref
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Target) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    /// Inspect the raw contents without tracking.
    pub fn read<R>(&self, f: impl FnOnce(&TargetData) -> R) -> R {
        f(&self.cell.data.read())
    }

    /// Mutate the raw contents without notifying anyone.
    ///
    /// Writes made here are invisible to effects; go through a proxy to
    /// trigger them. Proxies written here are not unwrapped.
    pub fn update_raw<R>(&self, f: impl FnOnce(&mut TargetData) -> R) -> R {
        f(&mut self.cell.data.write())
    }

    /// A copy of the raw contents.
    pub fn snapshot(&self) -> TargetData {
        self.cell.data.read().clone()
    }

    /// Weak handle the dependency store uses to notice this target died.
    pub(crate) fn liveness(&self) -> Weak<dyn Any + Send + Sync> {
        let strong: Arc<dyn Any + Send + Sync> = self.cell.clone();
        Arc::downgrade(&strong)
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Target {}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.cell.id.raw())
            .field("kind", &self.cell.kind)
            .field("is_ref", &self.cell.is_ref)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_equals_nan_under_same_value_zero() {
        let nan = Value::Number(f64::NAN);
        assert_eq!(nan, Value::Number(f64::NAN));
        assert!(!nan.strict_eq(&Value::Number(f64::NAN)));
        assert!(!Value::has_changed(&nan, &Value::Number(f64::NAN)));
        assert_eq!(Value::Number(0.0), Value::Number(-0.0));
    }

    #[test]
    fn objects_compare_by_identity() {
        let a = Target::record([("x", 1)]);
        let b = Target::record([("x", 1)]);

        assert_eq!(Value::from(a.clone()), Value::from(a.clone()));
        assert_ne!(Value::from(a), Value::from(b));
    }

    #[test]
    fn callbacks_compare_by_identity() {
        let f = Callback::new(|_| Value::Undefined);
        let g = Callback::new(|_| Value::Undefined);
        assert_eq!(f, f.clone());
        assert_ne!(f, g);
    }

    #[test]
    fn map_keys_hash_consistently() {
        let target = Target::map([(Value::Number(f64::NAN), 1), (Value::Number(0.0), 2)]);
        target.read(|data| {
            let entries = data.entries();
            assert_eq!(entries.get(&Value::Number(f64::NAN)), Some(&Value::from(1)));
            assert_eq!(entries.get(&Value::Number(-0.0)), Some(&Value::from(2)));
        });
    }

    #[test]
    fn json_round_trip_of_nested_document() {
        let json = serde_json::json!({
            "name": "trellis",
            "tags": ["a", "b"],
            "nested": { "depth": 2, "ok": true }
        });

        let value = Value::from_json(&json);
        assert_eq!(value.target().map(Target::kind), Some(TargetKind::Record));
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn json_numbers_keep_their_integer_form() {
        assert_eq!(Value::from(2).to_json(), serde_json::json!(2));
        assert_eq!(Value::from(-7).to_json(), serde_json::json!(-7));
        assert_eq!(Value::from(2.5).to_json(), serde_json::json!(2.5));
        assert_eq!(Value::from(1e300).to_json(), serde_json::json!(1e300));
        assert_eq!(Value::Number(f64::NAN).to_json(), serde_json::Value::Null);
        assert_eq!(Value::Number(f64::INFINITY).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn json_snapshot_breaks_cycles() {
        let target = Target::record([("name", "loop")]);
        let cyclic = Value::from(target.clone());
        target.update_raw(|data| {
            data.fields_mut().insert(Arc::from("me"), cyclic.clone());
        });

        assert_eq!(
            cyclic.to_json(),
            serde_json::json!({ "name": "loop", "me": null })
        );
    }

    #[test]
    fn display_formats_integral_numbers_without_fraction() {
        assert_eq!(Value::from(3).to_string(), "3");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(Value::Undefined.to_string(), "undefined");
    }
}
