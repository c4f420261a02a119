//! Static JSON file adapter.
//!
//! Reads an inventory document from disk: a JSON array of kind-tagged record
//! objects with optional identity hints. Useful for fixtures, air-gapped
//! exports, and demos.
//!
//! ```json
//! [
//!   {"kind": "site", "attrs": {"name": "fra1"}},
//!   {"kind": "device", "attrs": {"name": "host-01", "site": "fra1"},
//!    "macs": ["00:50:56:00:00:01"], "primary_ip": "10.0.1.5"},
//!   {"kind": "ip_address", "attrs": {"address": "10.0.1.5/24",
//!    "interface": {"name": "eth0", "device": "host-01"}}}
//! ]
//! ```
//!
//! Relation attributes may be plain strings (target primary key) or objects
//! (explicit identifying attributes); both become reference descriptors.

use crate::traits::{Source, SourceError};
use async_trait::async_trait;
use iw_core::{AttrMap, ObjectKind, Record, RefSpec, SourceContext, Value};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One record entry in the document.
#[derive(Debug, Deserialize)]
struct RecordDoc {
    kind: String,
    #[serde(default)]
    attrs: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    registry_id: Option<u64>,
    #[serde(default)]
    macs: Vec<String>,
    #[serde(default)]
    primary_ip: Option<String>,
}

/// Source adapter backed by a static JSON document.
pub struct StaticFileSource {
    context: SourceContext,
    path: PathBuf,
}

impl StaticFileSource {
    /// Creates an adapter reading from `path`, reported under `name`.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            context: SourceContext::new(name),
            path: path.into(),
        }
    }

    /// Enables PTR lookups for addresses this source reports.
    pub fn with_hostname_resolution(mut self, dns_servers: Option<Vec<String>>) -> Self {
        self.context.resolve_hostnames = true;
        self.context.dns_servers = dns_servers;
        self
    }

    async fn load(&self) -> Result<Vec<RecordDoc>, SourceError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        serde_json::from_str(&raw).map_err(|source| SourceError::Parse {
            path: self.path.display().to_string(),
            source,
        })
    }
}

#[async_trait]
impl Source for StaticFileSource {
    fn context(&self) -> SourceContext {
        self.context.clone()
    }

    async fn validate(&self) -> Result<(), SourceError> {
        if self.context.name.is_empty() {
            return Err(SourceError::Configuration(
                "source name must not be empty".to_string(),
            ));
        }
        if !Path::new(&self.path).is_file() {
            return Err(SourceError::Configuration(format!(
                "inventory document {} does not exist",
                self.path.display()
            )));
        }
        // A document that does not parse fails the run up front.
        self.load().await.map(|_| ())
    }

    async fn collect(&self) -> Result<Vec<Record>, SourceError> {
        let docs = self.load().await?;
        let mut records = Vec::with_capacity(docs.len());
        for doc in docs {
            let Some(kind) = ObjectKind::from_name(&doc.kind) else {
                return Err(SourceError::Configuration(format!(
                    "unknown object kind '{}' in {}",
                    doc.kind,
                    self.path.display()
                )));
            };
            let mut record = Record::new(kind);
            record.attrs = convert_attrs(kind, doc.attrs);
            record.registry_id = doc.registry_id;
            record.macs = doc.macs;
            record.primary_ip = doc.primary_ip;
            records.push(record);
        }
        Ok(records)
    }
}

/// Converts document attributes to engine values. Relation attributes given
/// as objects become descriptors with those identifying attributes; other
/// objects and nulls are dropped with a warning.
fn convert_attrs(kind: ObjectKind, attrs: serde_json::Map<String, serde_json::Value>) -> AttrMap {
    let mut out = AttrMap::new();
    for (name, value) in attrs {
        if let serde_json::Value::Object(fields) = &value {
            match kind.relation_target(&name) {
                Some(target) => {
                    let mut ref_attrs = AttrMap::new();
                    for (field, field_value) in fields {
                        if let Some(v) = Value::from_json(field_value) {
                            ref_attrs.insert(field.clone(), v);
                        }
                    }
                    out.insert(name, Value::Unresolved(RefSpec::with_attrs(target, ref_attrs)));
                }
                None => {
                    warn!(kind = %kind, attr = %name, "object value on non-relation attribute, dropping");
                }
            }
            continue;
        }
        match Value::from_json(&value) {
            Some(v) => {
                out.insert(name, v);
            }
            None => {
                warn!(kind = %kind, attr = %name, "unrepresentable value, dropping");
            }
        }
    }
    out
}
