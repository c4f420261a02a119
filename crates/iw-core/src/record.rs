//! Incoming record envelope.
//!
//! A `Record` is what a source adapter hands the engine for one reported
//! entity: the target kind, a plain attribute map, and optional identity
//! hints (registry id, MAC list, primary address) that identity resolution
//! uses before falling back to key-based matching.

use crate::kinds::ObjectKind;
use crate::object::{AttrMap, RefSpec, Value};

/// One record produced by a source adapter.
#[derive(Debug, Clone)]
pub struct Record {
    /// Kind of object this record describes.
    pub kind: ObjectKind,
    /// Attribute values to store.
    pub attrs: AttrMap,
    /// Registry identity, when the adapter knows it. Authoritative for
    /// matching; zero is treated as absent.
    pub registry_id: Option<u64>,
    /// MAC addresses belonging to the described entity, used by the
    /// MAC-based matcher for device and VM records.
    pub macs: Vec<String>,
    /// Primary address hint used by the matcher fallback chain.
    pub primary_ip: Option<String>,
}

impl Record {
    /// Creates an empty record for the given kind.
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            attrs: AttrMap::new(),
            registry_id: None,
            macs: Vec::new(),
            primary_ip: None,
        }
    }

    /// Adds an attribute (builder style).
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Sets the registry identity hint (builder style).
    pub fn with_registry_id(mut self, id: u64) -> Self {
        self.registry_id = Some(id);
        self
    }

    /// Sets the MAC hint list (builder style).
    pub fn with_macs(mut self, macs: Vec<String>) -> Self {
        self.macs = macs;
        self
    }

    /// Sets the primary-address hint (builder style).
    pub fn with_primary_ip(mut self, addr: impl Into<String>) -> Self {
        self.primary_ip = Some(addr.into());
        self
    }

    /// The registry identity, with zero normalized to absent.
    pub fn identity(&self) -> Option<u64> {
        self.registry_id.filter(|id| *id != 0)
    }

    /// True when the record carries nothing identity resolution could match
    /// on: no identity, no primary-key value, and no attributes at all.
    pub fn is_malformed(&self) -> bool {
        self.identity().is_none() && self.attrs.is_empty()
    }

    /// Promotes scalar values stored under relation attributes to unresolved
    /// reference descriptors, per the kind's static relation table.
    ///
    /// A string under `site` on a device record becomes a `RefSpec` for the
    /// site of that name; values that are already descriptors or handles are
    /// left alone. Runs once at ingestion.
    pub fn promote_relations(&mut self) {
        for (attr, target) in self.kind.descriptor().relations {
            if let Some(Value::Str(name)) = self.attrs.get(*attr) {
                if name.is_empty() {
                    self.attrs.remove(*attr);
                } else {
                    let spec = RefSpec::by_name(*target, name.clone());
                    self.attrs
                        .insert((*attr).to_string(), Value::Unresolved(spec));
                }
            }
        }
    }
}
