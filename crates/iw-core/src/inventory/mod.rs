//! Inventory store.
//!
//! Holds every canonical object of the run, one insertion-ordered container
//! per declared kind, and performs find-or-create identity resolution over
//! them. Matching is deliberately order-dependent: the first object
//! satisfying the criteria wins, and paths 2–3 do no ranking (only the MAC
//! matcher does).

pub mod export;
pub mod lifecycle;
pub mod resolve;

use crate::kinds::ObjectKind;
use crate::object::{AttrMap, CanonicalObject, ObjectHandle, Value};
use crate::record::Record;
use thiserror::Error;
use tracing::debug;

/// Errors raised while ingesting a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The record carries nothing identity resolution could match on.
    #[error("malformed {kind} record: no identity, no key value, no attributes")]
    Malformed {
        /// Kind the record claimed to describe.
        kind: ObjectKind,
    },
}

/// Whether `find_or_update` matched an existing object or created one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A new canonical object was appended.
    Created,
    /// An existing canonical object was merged into.
    Updated,
}

/// The canonical object graph for one run.
///
/// Constructed at run start and passed by reference to every phase; no state
/// survives between runs.
#[derive(Debug, Default)]
pub struct InventoryStore {
    containers: Vec<Vec<CanonicalObject>>,
}

impl InventoryStore {
    /// Creates an empty store with one container per declared kind.
    pub fn new() -> Self {
        Self {
            containers: (0..ObjectKind::COUNT).map(|_| Vec::new()).collect(),
        }
    }

    /// All objects of a kind, in insertion order.
    pub fn objects(&self, kind: ObjectKind) -> &[CanonicalObject] {
        &self.containers[kind.index()]
    }

    /// Number of objects of a kind.
    pub fn len(&self, kind: ObjectKind) -> usize {
        self.containers[kind.index()].len()
    }

    /// True when no kind holds any object.
    pub fn is_empty(&self) -> bool {
        self.containers.iter().all(Vec::is_empty)
    }

    /// The object behind a handle.
    pub fn get(&self, handle: ObjectHandle) -> Option<&CanonicalObject> {
        self.containers[handle.kind.index()].get(handle.index)
    }

    /// Mutable access to the object behind a handle.
    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut CanonicalObject> {
        self.containers[handle.kind.index()].get_mut(handle.index)
    }

    /// Looks an object up by its registry identity.
    pub fn get_by_registry_id(&self, kind: ObjectKind, id: u64) -> Option<ObjectHandle> {
        self.objects(kind)
            .iter()
            .position(|obj| obj.registry_id == Some(id))
            .map(|index| ObjectHandle::new(kind, index))
    }

    /// Renders a value for display-key comparison, following resolved
    /// references to the target's own primary value.
    pub fn render(&self, value: &Value) -> String {
        match value {
            Value::Ref(handle) => self
                .get(*handle)
                .and_then(|target| target.data.get(target.kind.primary_key()))
                .map(|v| self.render(v))
                .unwrap_or_default(),
            other => other.display_name(),
        }
    }

    /// The display key an attribute map would have as an object of `kind`.
    pub fn display_key_for(&self, kind: ObjectKind, attrs: &AttrMap) -> Option<String> {
        let primary = self.render(attrs.get(kind.primary_key())?);
        match kind.secondary_key().and_then(|k| attrs.get(k)) {
            Some(secondary) => Some(format!("{} ({})", primary, self.render(secondary))),
            None => Some(primary),
        }
    }

    /// Finds the canonical object for a record, creating one when no path
    /// matches.
    ///
    /// Resolution order:
    /// 1. registry identity, when the record carries a non-zero one
    ///    (authoritative and terminal; all other fields are ignored, and an
    ///    unmatched identity creates a new object carrying that id rather
    ///    than falling through to a name match);
    /// 2. display key, when the record carries the kind's primary key;
    /// 3. exact equality of every attribute present in the record;
    /// 4. creation.
    ///
    /// Matches are merged with overwrite semantics and take over the current
    /// source.
    pub fn find_or_update(
        &mut self,
        record: Record,
        source: Option<&str>,
    ) -> Result<(ObjectHandle, Outcome), RecordError> {
        if record.is_malformed() {
            return Err(RecordError::Malformed { kind: record.kind });
        }
        let kind = record.kind;

        // Path 1: registry identity. A miss still means the object exists in
        // the system of record, so it is created with that id directly.
        if let Some(id) = record.identity() {
            if let Some(handle) = self.get_by_registry_id(kind, id) {
                self.merge_into(handle, record.attrs, source);
                return Ok((handle, Outcome::Updated));
            }
            let mut obj = CanonicalObject::new(kind, record.attrs, source.map(str::to_string));
            obj.registry_id = Some(id);
            obj.is_new = false;
            let handle = self.push(obj);
            return Ok((handle, Outcome::Created));
        }

        if let Some(handle) = self.match_by_key_or_attrs(kind, &record.attrs) {
            self.merge_into(handle, record.attrs, source);
            return Ok((handle, Outcome::Updated));
        }

        // Path 4: creation.
        let obj = CanonicalObject::new(kind, record.attrs, source.map(str::to_string));
        let handle = self.push(obj);
        Ok((handle, Outcome::Created))
    }

    /// Runs resolution paths 2–3 without the creation fallback. Used by the
    /// relation resolver, which must never materialize targets as a side
    /// effect of looking at a descriptor.
    pub fn lookup(&self, kind: ObjectKind, attrs: &AttrMap) -> Option<ObjectHandle> {
        self.match_by_key_or_attrs(kind, attrs)
    }

    /// Inserts an object already known to the registry, before ingestion
    /// starts, so identity resolution can match against it. Seeded objects
    /// are not new and have no reporting source.
    pub fn seed_from_registry(
        &mut self,
        kind: ObjectKind,
        attrs: AttrMap,
        registry_id: u64,
    ) -> ObjectHandle {
        let mut obj = CanonicalObject::new(kind, attrs, None);
        obj.registry_id = Some(registry_id);
        obj.is_new = false;
        self.push(obj)
    }

    /// Records a successful push: the object now has a registry identity and
    /// is no longer new.
    pub fn mark_synced(&mut self, handle: ObjectHandle, registry_id: u64) {
        if let Some(obj) = self.get_mut(handle) {
            obj.registry_id = Some(registry_id);
            obj.is_new = false;
        }
    }

    /// Follows a chain of named relation attributes from `start`, one
    /// resolved hop per path element.
    ///
    /// Returns `None` as soon as a hop is absent or still unresolved.
    pub fn follow(&self, start: ObjectHandle, path: &[&str]) -> Option<ObjectHandle> {
        let mut current = start;
        for hop in path {
            current = self.get(current)?.get(hop)?.as_handle()?;
        }
        Some(current)
    }

    /// Returns the tag container index for a tag of the given name, creating
    /// the tag object when it does not exist yet.
    pub fn ensure_tag(&mut self, name: &str) -> usize {
        let existing = self
            .objects(ObjectKind::Tag)
            .iter()
            .position(|tag| tag.get("name").and_then(Value::as_str) == Some(name));
        match existing {
            Some(index) => index,
            None => {
                let mut attrs = AttrMap::new();
                attrs.insert("name".to_string(), Value::from(name));
                self.push(CanonicalObject::new(ObjectKind::Tag, attrs, None))
                    .index
            }
        }
    }

    fn push(&mut self, obj: CanonicalObject) -> ObjectHandle {
        let kind = obj.kind;
        debug!(kind = %kind, key = ?obj.display_key(), "creating canonical object");
        let container = &mut self.containers[kind.index()];
        container.push(obj);
        ObjectHandle::new(kind, container.len() - 1)
    }

    fn merge_into(&mut self, handle: ObjectHandle, attrs: AttrMap, source: Option<&str>) {
        if let Some(obj) = self.get_mut(handle) {
            debug!(object = %obj, "merging record into existing object");
            obj.merge(attrs, source);
        }
    }

    fn match_by_key_or_attrs(&self, kind: ObjectKind, attrs: &AttrMap) -> Option<ObjectHandle> {
        // Path 2: display key, composed from the primary key plus the
        // secondary key when the incoming attributes carry one. A record
        // without the secondary attribute matches on the primary value
        // alone (first object wins, as everywhere in paths 2-3).
        if let Some(primary) = attrs.get(kind.primary_key()) {
            let secondary = kind.secondary_key().filter(|k| attrs.contains_key(*k));
            let wanted = self.compose_key(self.render(primary), secondary.and_then(|k| attrs.get(k)));
            return self
                .objects(kind)
                .iter()
                .position(|obj| {
                    obj.data.get(kind.primary_key()).is_some_and(|p| {
                        let key =
                            self.compose_key(self.render(p), secondary.and_then(|k| obj.get(k)));
                        key == wanted
                    })
                })
                .map(|index| ObjectHandle::new(kind, index));
        }

        // Path 3: every attribute present in the record must equal the
        // stored value.
        self.objects(kind)
            .iter()
            .position(|obj| {
                attrs.iter().all(|(name, value)| {
                    obj.get(name)
                        .is_some_and(|stored| self.values_match(stored, value))
                })
            })
            .map(|index| ObjectHandle::new(kind, index))
    }

    fn compose_key(&self, primary: String, secondary: Option<&Value>) -> String {
        match secondary {
            Some(value) => format!("{} ({})", primary, self.render(value)),
            None => primary,
        }
    }

    /// Value equality for matching. A resolved reference and a descriptor
    /// pointing at the same object must compare equal, so reference-typed
    /// values fall back to rendered comparison.
    fn values_match(&self, a: &Value, b: &Value) -> bool {
        if a == b {
            return true;
        }
        let reference_typed =
            |v: &Value| matches!(v, Value::Ref(_) | Value::Unresolved(_));
        if reference_typed(a) || reference_typed(b) {
            self.render(a) == self.render(b)
        } else {
            false
        }
    }
}
