//! Primary-address election.
//!
//! Address objects whose adapter marked them `is_primary` are candidates for
//! their owning entity's `primary_ip4`/`primary_ip6` field. Election runs per
//! address family under one configured policy; under `always` the pass also
//! guarantees that no two entities end up holding the same address object as
//! primary.

use crate::inventory::InventoryStore;
use crate::kinds::ObjectKind;
use crate::object::{ObjectHandle, Value};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;
use tracing::{debug, info};

/// Attribute adapters set on candidate addresses.
pub const IS_PRIMARY_ATTR: &str = "is_primary";

/// Error for an unrecognized policy string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown primary-IP policy '{0}', expected always, when-undefined, or never")]
pub struct PolicyParseError(pub String);

/// When primary-address fields may be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrimaryIpPolicy {
    /// Assign candidates unconditionally, clearing any other entity that
    /// holds the same address as primary.
    Always,
    /// Assign only when the owning entity has no primary of that family yet.
    #[default]
    WhenUndefined,
    /// Never mutate primary-address fields.
    Never,
}

impl std::str::FromStr for PrimaryIpPolicy {
    type Err = PolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "always" => Ok(PrimaryIpPolicy::Always),
            "when-undefined" => Ok(PrimaryIpPolicy::WhenUndefined),
            "never" => Ok(PrimaryIpPolicy::Never),
            other => Err(PolicyParseError(other.to_string())),
        }
    }
}

impl std::fmt::Display for PrimaryIpPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PrimaryIpPolicy::Always => "always",
            PrimaryIpPolicy::WhenUndefined => "when-undefined",
            PrimaryIpPolicy::Never => "never",
        };
        write!(f, "{s}")
    }
}

/// Counters for one election pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElectionSummary {
    /// Primary fields assigned.
    pub assigned: usize,
    /// Primary fields cleared off other entities under `always`.
    pub cleared: usize,
}

struct Candidate {
    address: ObjectHandle,
    owner: ObjectHandle,
    field: &'static str,
}

/// Runs primary-address election over the whole store.
pub fn elect_primaries(store: &mut InventoryStore, policy: PrimaryIpPolicy) -> ElectionSummary {
    let mut summary = ElectionSummary::default();
    if policy == PrimaryIpPolicy::Never {
        return summary;
    }

    let candidates = collect_candidates(store);
    for candidate in candidates {
        match policy {
            PrimaryIpPolicy::Never => unreachable!("handled above"),
            PrimaryIpPolicy::WhenUndefined => {
                let Some(owner) = store.get_mut(candidate.owner) else {
                    continue;
                };
                if owner.get(candidate.field).is_none() {
                    owner.set(candidate.field, Value::Ref(candidate.address));
                    summary.assigned += 1;
                }
            }
            PrimaryIpPolicy::Always => {
                // A new address cannot be referenced by anyone yet; the
                // clearing scan only matters for already-synced addresses.
                let is_new = store
                    .get(candidate.address)
                    .map(|addr| addr.is_new)
                    .unwrap_or(true);
                if !is_new {
                    summary.cleared += clear_other_holders(store, &candidate);
                }
                if let Some(owner) = store.get_mut(candidate.owner) {
                    owner.set(candidate.field, Value::Ref(candidate.address));
                    summary.assigned += 1;
                }
            }
        }
    }

    info!(
        policy = %policy,
        assigned = summary.assigned,
        cleared = summary.cleared,
        "primary-IP election pass complete"
    );
    summary
}

fn collect_candidates(store: &InventoryStore) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for (index, obj) in store.objects(ObjectKind::IpAddress).iter().enumerate() {
        if obj.source.is_none() || !obj.get(IS_PRIMARY_ATTR).is_some_and(Value::is_true) {
            continue;
        }
        let handle = ObjectHandle::new(ObjectKind::IpAddress, index);
        let Some(raw) = obj.get("address").and_then(Value::as_str) else {
            continue;
        };
        let Some((addr, _)) = crate::enrichment::prefix::split_address(raw) else {
            continue;
        };
        let owner = if let Some(iface) = obj.get("interface").and_then(Value::as_handle) {
            store.follow(iface, &["device"])
        } else if let Some(iface) = obj.get("vm_interface").and_then(Value::as_handle) {
            store.follow(iface, &["virtual_machine"])
        } else {
            None
        };
        let Some(owner) = owner else {
            debug!(address = raw, "primary candidate without resolved owner, skipping");
            continue;
        };
        let field = match addr {
            IpAddr::V4(_) => "primary_ip4",
            IpAddr::V6(_) => "primary_ip6",
        };
        candidates.push(Candidate {
            address: handle,
            owner,
            field,
        });
    }
    candidates
}

fn clear_other_holders(store: &mut InventoryStore, candidate: &Candidate) -> usize {
    let mut cleared = 0;
    for kind in [ObjectKind::Device, ObjectKind::VirtualMachine] {
        for index in 0..store.len(kind) {
            let handle = ObjectHandle::new(kind, index);
            if handle == candidate.owner {
                continue;
            }
            let Some(entity) = store.get_mut(handle) else {
                continue;
            };
            if entity.get(candidate.field) == Some(&Value::Ref(candidate.address)) {
                debug!(entity = %entity, field = candidate.field, "clearing stale primary pointer");
                entity.data.remove(candidate.field);
                cleared += 1;
            }
        }
    }
    cleared
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    /// Device with one interface and one candidate address assigned to it.
    fn entity_with_candidate(
        store: &mut InventoryStore,
        name: &str,
        address: &str,
    ) -> (ObjectHandle, ObjectHandle) {
        let (device, _) = store
            .find_or_update(Record::new(ObjectKind::Device).with_attr("name", name), Some("s"))
            .unwrap();
        let (iface, _) = store
            .find_or_update(
                Record::new(ObjectKind::Interface)
                    .with_attr("name", "eth0")
                    .with_attr("device", Value::Ref(device)),
                Some("s"),
            )
            .unwrap();
        let (addr, _) = store
            .find_or_update(
                Record::new(ObjectKind::IpAddress)
                    .with_attr("address", address)
                    .with_attr("interface", Value::Ref(iface))
                    .with_attr(IS_PRIMARY_ATTR, true),
                Some("s"),
            )
            .unwrap();
        (device, addr)
    }

    #[test]
    fn test_never_mutates_nothing() {
        let mut store = InventoryStore::new();
        let (device, _) = entity_with_candidate(&mut store, "host-01", "10.0.1.5/24");
        let summary = elect_primaries(&mut store, PrimaryIpPolicy::Never);
        assert_eq!(summary, ElectionSummary::default());
        assert_eq!(store.get(device).unwrap().get("primary_ip4"), None);
    }

    #[test]
    fn test_when_undefined_assigns_unset_field() {
        let mut store = InventoryStore::new();
        let (device, addr) = entity_with_candidate(&mut store, "host-01", "10.0.1.5/24");
        let summary = elect_primaries(&mut store, PrimaryIpPolicy::WhenUndefined);
        assert_eq!(summary.assigned, 1);
        assert_eq!(
            store.get(device).unwrap().get("primary_ip4"),
            Some(&Value::Ref(addr))
        );
    }

    #[test]
    fn test_when_undefined_leaves_existing_primary() {
        let mut store = InventoryStore::new();
        let (device, _) = entity_with_candidate(&mut store, "host-01", "10.0.1.5/24");
        store
            .get_mut(device)
            .unwrap()
            .set("primary_ip4", Value::from("pre-existing"));

        elect_primaries(&mut store, PrimaryIpPolicy::WhenUndefined);
        assert_eq!(
            store.get(device).unwrap().get("primary_ip4"),
            Some(&Value::from("pre-existing"))
        );
    }

    #[test]
    fn test_always_enforces_unique_holder() {
        let mut store = InventoryStore::new();
        let (e2, addr) = entity_with_candidate(&mut store, "host-02", "10.0.1.5/24");
        // The address is already synced, and another entity still points
        // at it from a previous run.
        store.mark_synced(addr, 100);
        let (e1, _) = store
            .find_or_update(
                Record::new(ObjectKind::Device).with_attr("name", "host-01"),
                Some("s"),
            )
            .unwrap();
        store
            .get_mut(e1)
            .unwrap()
            .set("primary_ip4", Value::Ref(addr));

        let summary = elect_primaries(&mut store, PrimaryIpPolicy::Always);
        assert_eq!(summary.cleared, 1);
        assert_eq!(store.get(e1).unwrap().get("primary_ip4"), None);
        assert_eq!(
            store.get(e2).unwrap().get("primary_ip4"),
            Some(&Value::Ref(addr))
        );
    }

    #[test]
    fn test_always_skips_clearing_scan_for_new_addresses() {
        let mut store = InventoryStore::new();
        let (device, addr) = entity_with_candidate(&mut store, "host-01", "10.0.1.5/24");
        let summary = elect_primaries(&mut store, PrimaryIpPolicy::Always);
        assert_eq!(summary.cleared, 0);
        assert_eq!(summary.assigned, 1);
        assert_eq!(
            store.get(device).unwrap().get("primary_ip4"),
            Some(&Value::Ref(addr))
        );
    }

    #[test]
    fn test_families_are_independent() {
        let mut store = InventoryStore::new();
        let (device, v4) = entity_with_candidate(&mut store, "host-01", "10.0.1.5/24");
        let (iface, _) = store
            .find_or_update(
                Record::new(ObjectKind::Interface)
                    .with_attr("name", "eth0")
                    .with_attr("device", Value::Ref(device)),
                Some("s"),
            )
            .unwrap();
        let (v6, _) = store
            .find_or_update(
                Record::new(ObjectKind::IpAddress)
                    .with_attr("address", "2001:db8::5/64")
                    .with_attr("interface", Value::Ref(iface))
                    .with_attr(IS_PRIMARY_ATTR, true),
                Some("s"),
            )
            .unwrap();

        elect_primaries(&mut store, PrimaryIpPolicy::WhenUndefined);
        let obj = store.get(device).unwrap();
        assert_eq!(obj.get("primary_ip4"), Some(&Value::Ref(v4)));
        assert_eq!(obj.get("primary_ip6"), Some(&Value::Ref(v6)));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("always".parse(), Ok(PrimaryIpPolicy::Always));
        assert_eq!("when-undefined".parse(), Ok(PrimaryIpPolicy::WhenUndefined));
        assert_eq!("Never".parse(), Ok(PrimaryIpPolicy::Never));
        assert!("sometimes".parse::<PrimaryIpPolicy>().is_err());
    }
}
