//! MAC-based entity matching.
//!
//! When a device or VM record arrives without a usable identity, the engine
//! looks for an existing entity whose interfaces already carry the record's
//! MAC addresses. A single credited entity matches outright; with several
//! candidates the top one must beat the runner-up by a factor of two, so two
//! genuinely distinct machines sharing one broadcast interface never get
//! merged while a machine whose interfaces overwhelmingly match still does.
//!
//! The companion primary-IP matcher is the fallback the ingestion path uses
//! when the ratio test reports ambiguity.

use crate::inventory::InventoryStore;
use crate::kinds::ObjectKind;
use crate::object::{ObjectHandle, Value};
use crate::validation::MacAddr;
use std::collections::HashSet;
use tracing::debug;

/// Minimum lead of the top candidate over the runner-up.
pub const MATCH_RATIO_THRESHOLD: f64 = 2.0;

/// Result of a MAC-based match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacMatch {
    /// Exactly one plausible entity.
    Unique(ObjectHandle),
    /// Several entities matched too closely to call.
    Ambiguous,
    /// No interface carried any of the given MACs.
    NoMatch,
}

/// Finds the existing entity of `kind` that most plausibly owns the given
/// MAC addresses.
///
/// `kind` must be `Device` or `VirtualMachine`; anything else yields
/// `NoMatch`. MACs are compared in normalized form only.
pub fn find_by_macs(store: &InventoryStore, kind: ObjectKind, macs: &[MacAddr]) -> MacMatch {
    let (iface_kind, parent_attr) = match kind {
        ObjectKind::Device => (ObjectKind::Interface, "device"),
        ObjectKind::VirtualMachine => (ObjectKind::VmInterface, "virtual_machine"),
        _ => return MacMatch::NoMatch,
    };
    let wanted: HashSet<MacAddr> = macs.iter().copied().collect();
    if wanted.is_empty() {
        return MacMatch::NoMatch;
    }

    // One credit per matching interface, accumulated on the interface's
    // parent entity.
    let mut credits: Vec<(String, Option<ObjectHandle>, usize)> = Vec::new();
    for iface in store.objects(iface_kind) {
        let Some(mac) = iface
            .get("mac_address")
            .and_then(Value::as_str)
            .and_then(|raw| MacAddr::parse(raw).ok())
        else {
            continue;
        };
        if !wanted.contains(&mac) {
            continue;
        }
        let Some(parent) = iface.get(parent_attr) else {
            continue;
        };
        let handle = match parent {
            Value::Ref(handle) => Some(*handle),
            Value::Unresolved(spec) => store.lookup(spec.kind, &spec.attrs),
            _ => None,
        };
        let key = store.render(parent);
        if key.is_empty() {
            continue;
        }
        match credits.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, _, count)) => *count += 1,
            None => credits.push((key, handle, 1)),
        }
    }

    match credits.len() {
        0 => MacMatch::NoMatch,
        1 => credits[0]
            .1
            .map(MacMatch::Unique)
            .unwrap_or(MacMatch::NoMatch),
        _ => {
            credits.sort_by(|a, b| b.2.cmp(&a.2));
            let (top_key, top_handle, top) = &credits[0];
            let second = credits[1].2;
            let ratio = *top as f64 / second as f64;
            if ratio >= MATCH_RATIO_THRESHOLD {
                debug!(candidate = %top_key, ratio, "MAC match cleared the ratio threshold");
                top_handle.map(MacMatch::Unique).unwrap_or(MacMatch::NoMatch)
            } else {
                debug!(ratio, "MAC match ambiguous, below ratio threshold");
                MacMatch::Ambiguous
            }
        }
    }
}

/// Finds the entity of `kind` whose primary address of either family
/// resolves to the given address string.
///
/// Compares host parts only, so `10.0.1.5` matches `10.0.1.5/24`.
pub fn find_by_primary_ip(
    store: &InventoryStore,
    kind: ObjectKind,
    address: &str,
) -> Option<ObjectHandle> {
    let wanted = host_part(address);
    for (index, entity) in store.objects(kind).iter().enumerate() {
        for field in ["primary_ip4", "primary_ip6"] {
            let found = match entity.get(field) {
                Some(Value::Ref(handle)) => store
                    .get(*handle)
                    .and_then(|addr| addr.get("address"))
                    .and_then(Value::as_str)
                    .map(host_part),
                Some(Value::Str(raw)) => Some(host_part(raw)),
                _ => None,
            };
            if found.as_deref() == Some(wanted.as_str()) {
                return Some(ObjectHandle::new(kind, index));
            }
        }
    }
    None
}

fn host_part(address: &str) -> String {
    address
        .split_once('/')
        .map(|(host, _)| host)
        .unwrap_or(address)
        .to_string()
}
