//! Inventory Warden core.
//!
//! The reconciliation engine: canonical object model, inventory store with
//! find-or-create identity resolution, relation resolver, IP/prefix matcher,
//! MAC-based entity matcher, primary-IP elector, and the orphan/tag
//! lifecycle, driven phase by phase by the [`run::Reconciler`].
//!
//! This crate performs no network I/O of its own. DNS lookups go through the
//! injected [`enrichment::PtrResolver`] capability, and the registry
//! collaborator consumes the graph through [`inventory::export::export`];
//! transport for both lives outside this crate.

pub mod election;
pub mod enrichment;
pub mod inventory;
pub mod kinds;
pub mod matching;
pub mod object;
pub mod record;
pub mod run;
pub mod settings;
pub mod source;
pub mod validation;

pub use election::{ElectionSummary, PrimaryIpPolicy};
pub use inventory::{InventoryStore, Outcome, RecordError};
pub use kinds::{KindDescriptor, ObjectKind};
pub use object::{AttrMap, CanonicalObject, ObjectHandle, RefSpec, Value};
pub use record::Record;
pub use run::{Reconciler, RunReport};
pub use settings::{EngineSettings, RawEngineSettings, SettingsError};
pub use source::SourceContext;
pub use validation::{MacAddr, MacParseError};
