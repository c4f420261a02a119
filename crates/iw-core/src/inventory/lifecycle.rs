//! Orphan and tag lifecycle.
//!
//! After every source of a run has been ingested, each canonical object is
//! moved through a three-state lifecycle: managed-present (reported this
//! run), managed-orphaned (managed before, reported by nobody now), and
//! unmanaged (foreign objects the engine never touches). There is no
//! managed-to-unmanaged transition; once an object carries the managed
//! marker it stays eligible for orphan marking until someone untags it
//! externally.

use super::InventoryStore;
use crate::kinds::ObjectKind;
use crate::source::SourceContext;
use tracing::{debug, info};

/// Tag marking every object managed by this engine.
pub const MANAGED_TAG: &str = "inventory-warden";

/// Tag marking a managed object no source reported this run.
pub const ORPHANED_TAG: &str = "inventory-warden: orphaned";

/// Counters for one lifecycle pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleSummary {
    /// Objects reported this run and tagged managed-present.
    pub present: usize,
    /// Managed objects newly or still carrying the orphaned marker.
    pub orphaned: usize,
    /// Objects carrying neither marker, left untouched.
    pub unmanaged: usize,
}

/// Applies the run's lifecycle tags across the whole store.
///
/// Marker tags are canonical tag objects themselves, so they travel to the
/// registry with the rest of the graph.
pub fn apply_lifecycle(store: &mut InventoryStore, sources: &[SourceContext]) -> LifecycleSummary {
    let managed = store.ensure_tag(MANAGED_TAG);
    let orphaned = store.ensure_tag(ORPHANED_TAG);
    let source_tags: Vec<(String, usize)> = sources
        .iter()
        .map(|ctx| (ctx.name.clone(), store.ensure_tag(&ctx.tag_name())))
        .collect();

    let mut summary = LifecycleSummary::default();
    for kind in ObjectKind::ALL {
        for index in 0..store.len(kind) {
            let handle = crate::object::ObjectHandle::new(kind, index);
            let Some(obj) = store.get_mut(handle) else {
                continue;
            };
            match &obj.source {
                Some(source_name) => {
                    let source_tag = source_tags
                        .iter()
                        .find(|(name, _)| name == source_name)
                        .map(|(_, tag)| *tag);
                    obj.tags.insert(managed);
                    if let Some(tag) = source_tag {
                        obj.tags.insert(tag);
                    }
                    if obj.tags.remove(&orphaned) {
                        debug!(object = %obj, "object reported again, clearing orphaned marker");
                    }
                    summary.present += 1;
                }
                None if obj.tags.contains(&managed) => {
                    // Idempotent: re-adding the marker is a no-op.
                    obj.tags.insert(orphaned);
                    debug!(object = %obj, "managed object not reported this run, marking orphaned");
                    summary.orphaned += 1;
                }
                None => {
                    summary.unmanaged += 1;
                }
            }
        }
    }

    info!(
        present = summary.present,
        orphaned = summary.orphaned,
        unmanaged = summary.unmanaged,
        "lifecycle pass complete"
    );
    summary
}
