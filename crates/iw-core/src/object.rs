//! Canonical object model.
//!
//! A `CanonicalObject` is the single in-memory representation of one
//! real-world entity, merged across every source that reported it. Attribute
//! values are `Value`s; relations start life as unresolved `RefSpec`
//! descriptors and become `ObjectHandle`s once the relation-resolution phase
//! has run.

use crate::kinds::ObjectKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Attribute map of a canonical object or incoming record.
pub type AttrMap = BTreeMap<String, Value>;

/// Handle to a canonical object: its kind plus its position in the kind's
/// container. Objects are never destroyed within a run, so handles stay valid
/// for the lifetime of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectHandle {
    /// Kind of the referenced object.
    pub kind: ObjectKind,
    /// Index into the kind's insertion-ordered container.
    pub index: usize,
}

impl ObjectHandle {
    /// Creates a handle for the given kind and container index.
    pub fn new(kind: ObjectKind, index: usize) -> Self {
        Self { kind, index }
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.index)
    }
}

/// An unresolved reference descriptor: the kind of the target plus the
/// attributes that identify it. Produced by adapters and relation rules,
/// consumed by the relation resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefSpec {
    /// Kind of the referenced object.
    pub kind: ObjectKind,
    /// Identifying attributes of the referenced object.
    pub attrs: AttrMap,
}

impl RefSpec {
    /// Creates a descriptor identifying an object by its primary key alone.
    pub fn by_name(kind: ObjectKind, name: impl Into<String>) -> Self {
        let mut attrs = AttrMap::new();
        attrs.insert(kind.primary_key().to_string(), Value::Str(name.into()));
        Self { kind, attrs }
    }

    /// Creates a descriptor from an explicit attribute map.
    pub fn with_attrs(kind: ObjectKind, attrs: AttrMap) -> Self {
        Self { kind, attrs }
    }

    /// The value of the target kind's primary key inside this descriptor,
    /// rendered as a display string.
    pub fn primary_value(&self) -> Option<String> {
        self.attrs
            .get(self.kind.primary_key())
            .map(Value::display_name)
    }
}

impl fmt::Display for RefSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.primary_value() {
            Some(name) => write!(f, "{}?{}", self.kind, name),
            None => write!(f, "{}?<anonymous>", self.kind),
        }
    }
}

/// An attribute value of a canonical object.
///
/// The set is closed: scalars, lists, resolved references, and unresolved
/// reference descriptors. Nothing else is ever stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Text scalar.
    Str(String),
    /// Integer scalar.
    Int(i64),
    /// Boolean scalar.
    Bool(bool),
    /// List of values, resolved element-wise by the relation resolver.
    List(Vec<Value>),
    /// Resolved reference to another canonical object.
    Ref(ObjectHandle),
    /// Unresolved reference descriptor, pending relation resolution.
    Unresolved(RefSpec),
}

impl Value {
    /// Converts a JSON scalar or array into a `Value`.
    ///
    /// Returns `None` for nulls, objects, and non-integer numbers; callers
    /// treat those as "field absent" (adapters build reference descriptors
    /// from objects before this conversion runs).
    pub fn from_json(value: &serde_json::Value) -> Option<Value> {
        match value {
            serde_json::Value::String(s) => Some(Value::Str(s.clone())),
            serde_json::Value::Number(n) => n.as_i64().map(Value::Int),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Array(items) => Some(Value::List(
                items.iter().filter_map(Value::from_json).collect(),
            )),
            serde_json::Value::Null | serde_json::Value::Object(_) => None,
        }
    }

    /// Renders the value for display keys and exports.
    ///
    /// Handles render as their index (the store substitutes the target's own
    /// display name where it has access to it); descriptors render as their
    /// primary value.
    pub fn display_name(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Int(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::List(items) => items
                .iter()
                .map(Value::display_name)
                .collect::<Vec<_>>()
                .join(","),
            Value::Ref(handle) => handle.to_string(),
            Value::Unresolved(spec) => spec.primary_value().unwrap_or_default(),
        }
    }

    /// Returns the string payload, if this is a text scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the handle, if this is a resolved reference.
    pub fn as_handle(&self) -> Option<ObjectHandle> {
        match self {
            Value::Ref(handle) => Some(*handle),
            _ => None,
        }
    }

    /// True for `Bool(true)` and nothing else.
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// One canonical object in the inventory.
#[derive(Debug, Clone)]
pub struct CanonicalObject {
    /// Kind of this object.
    pub kind: ObjectKind,
    /// Attribute name to value mapping.
    pub data: AttrMap,
    /// Identity assigned by the system of record; `None` until first push.
    pub registry_id: Option<u64>,
    /// True until the object has been successfully pushed once.
    pub is_new: bool,
    /// Name of the source that reported this object in the current run.
    /// `None` means no source reported it this run.
    pub source: Option<String>,
    /// Indices into the tag container for every tag currently attached.
    pub tags: BTreeSet<usize>,
}

impl CanonicalObject {
    /// Creates a fresh, not-yet-synced object from incoming attributes.
    pub fn new(kind: ObjectKind, data: AttrMap, source: Option<String>) -> Self {
        Self {
            kind,
            data,
            registry_id: None,
            is_new: true,
            source,
            tags: BTreeSet::new(),
        }
    }

    /// The value of this kind's primary key, rendered for display.
    pub fn primary_value(&self) -> Option<String> {
        self.data.get(self.kind.primary_key()).map(Value::display_name)
    }

    /// The display key used by identity resolution: the primary-key value,
    /// suffixed with the secondary-key value when the kind declares one.
    pub fn display_key(&self) -> Option<String> {
        let primary = self.primary_value()?;
        match self.kind.secondary_key().and_then(|k| self.data.get(k)) {
            Some(secondary) => Some(format!("{} ({})", primary, secondary.display_name())),
            None => Some(primary),
        }
    }

    /// Re-applies incoming attributes over the stored ones (last writer wins
    /// per attribute) and records the reporting source.
    pub fn merge(&mut self, attrs: AttrMap, source: Option<&str>) {
        for (name, value) in attrs {
            self.data.insert(name, value);
        }
        if let Some(name) = source {
            self.source = Some(name.to_string());
        }
    }

    /// Returns an attribute value.
    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.data.get(attr)
    }

    /// Sets an attribute value.
    pub fn set(&mut self, attr: impl Into<String>, value: Value) {
        self.data.insert(attr.into(), value);
    }
}

impl fmt::Display for CanonicalObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}'",
            self.kind,
            self.display_key().unwrap_or_else(|| "<anonymous>".to_string())
        )
    }
}
