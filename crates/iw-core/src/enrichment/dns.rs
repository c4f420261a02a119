//! Hostname enrichment through PTR lookups.
//!
//! The engine never talks to DNS itself: it groups addresses by reporting
//! source and hands each group to an injected `PtrResolver` capability in one
//! bulk call. Failures degrade silently; the affected addresses simply keep
//! no hostname.

use crate::inventory::InventoryStore;
use crate::kinds::ObjectKind;
use crate::object::{ObjectHandle, Value};
use crate::source::SourceContext;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors a PTR resolver can report.
#[derive(Error, Debug, Clone)]
pub enum LookupError {
    /// A configured DNS server address did not parse.
    #[error("invalid DNS server address: {0}")]
    InvalidServer(String),

    /// The lookup itself failed.
    #[error("PTR lookup failed: {0}")]
    Resolution(String),
}

/// Bulk PTR lookup capability.
///
/// One call per source group; the result maps each address that resolved to
/// its hostname, with unresolved addresses simply absent.
#[async_trait]
pub trait PtrResolver: Send + Sync {
    /// Resolves PTR names for the given addresses, optionally against
    /// specific servers instead of the system resolver.
    async fn resolve(
        &self,
        addresses: &[IpAddr],
        servers: Option<&[String]>,
    ) -> Result<HashMap<IpAddr, String>, LookupError>;
}

/// Counters for one DNS enrichment pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DnsSummary {
    /// Addresses that received a hostname.
    pub resolved: usize,
    /// Source groups whose bulk lookup failed outright.
    pub failed_groups: usize,
}

/// Resolves and writes back hostnames for every source configured to do so.
pub async fn apply_dns_names(
    store: &mut InventoryStore,
    sources: &[SourceContext],
    resolver: &dyn PtrResolver,
) -> DnsSummary {
    let mut summary = DnsSummary::default();
    for ctx in sources.iter().filter(|ctx| ctx.resolve_hostnames) {
        let group = addresses_of_source(store, &ctx.name);
        if group.is_empty() {
            continue;
        }
        let addrs: Vec<IpAddr> = group.iter().map(|(_, addr)| *addr).collect();
        let names = match resolver.resolve(&addrs, ctx.dns_servers.as_deref()).await {
            Ok(names) => names,
            Err(err) => {
                warn!(source = %ctx.name, error = %err, "PTR lookup failed, skipping group");
                summary.failed_groups += 1;
                continue;
            }
        };
        for (handle, addr) in group {
            if let Some(name) = names.get(&addr) {
                if let Some(obj) = store.get_mut(handle) {
                    debug!(address = %addr, hostname = %name, "writing back PTR name");
                    obj.set("dns_name", Value::from(name.clone()));
                    summary.resolved += 1;
                }
            }
        }
    }
    info!(
        resolved = summary.resolved,
        failed_groups = summary.failed_groups,
        "DNS enrichment pass complete"
    );
    summary
}

/// Addresses eligible for lookup: reported by this source and sitting on an
/// assigned interface. Free-floating addresses get no hostname.
fn addresses_of_source(store: &InventoryStore, source: &str) -> Vec<(ObjectHandle, IpAddr)> {
    store
        .objects(ObjectKind::IpAddress)
        .iter()
        .enumerate()
        .filter(|(_, obj)| obj.source.as_deref() == Some(source))
        .filter_map(|(index, obj)| {
            let handle = ObjectHandle::new(ObjectKind::IpAddress, index);
            if !super::prefix::has_assigned_interface(store, handle) {
                return None;
            }
            let raw = obj.get("address").and_then(Value::as_str)?;
            let (addr, _) = super::prefix::split_address(raw)?;
            Some((handle, addr))
        })
        .collect()
}

/// Canned-answer resolver for tests.
#[derive(Debug, Default)]
pub struct MockPtrResolver {
    answers: HashMap<IpAddr, String>,
    fail: bool,
}

impl MockPtrResolver {
    /// Creates a resolver with no answers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a canned PTR answer.
    pub fn with_answer(mut self, addr: IpAddr, hostname: impl Into<String>) -> Self {
        self.answers.insert(addr, hostname.into());
        self
    }

    /// Makes every lookup fail.
    pub fn failing() -> Self {
        Self {
            answers: HashMap::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl PtrResolver for MockPtrResolver {
    async fn resolve(
        &self,
        addresses: &[IpAddr],
        _servers: Option<&[String]>,
    ) -> Result<HashMap<IpAddr, String>, LookupError> {
        if self.fail {
            return Err(LookupError::Resolution("mock resolver failure".to_string()));
        }
        Ok(addresses
            .iter()
            .filter_map(|addr| self.answers.get(addr).map(|name| (*addr, name.clone())))
            .collect())
    }
}

/// Real PTR resolver backed by trust-dns.
#[cfg(feature = "ptr-lookup")]
pub mod ptr {
    use super::*;
    use std::net::SocketAddr;
    use trust_dns_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
    use trust_dns_resolver::TokioAsyncResolver;

    /// PTR resolver using the tokio trust-dns resolver.
    #[derive(Debug, Default)]
    pub struct TrustDnsPtrResolver;

    #[async_trait]
    impl PtrResolver for TrustDnsPtrResolver {
        async fn resolve(
            &self,
            addresses: &[IpAddr],
            servers: Option<&[String]>,
        ) -> Result<HashMap<IpAddr, String>, LookupError> {
            let resolver = match servers {
                Some(servers) if !servers.is_empty() => {
                    let mut config = ResolverConfig::new();
                    for server in servers {
                        let ip: IpAddr = server
                            .parse()
                            .map_err(|_| LookupError::InvalidServer(server.clone()))?;
                        config.add_name_server(NameServerConfig::new(
                            SocketAddr::new(ip, 53),
                            Protocol::Udp,
                        ));
                    }
                    TokioAsyncResolver::tokio(config, ResolverOpts::default())
                }
                _ => TokioAsyncResolver::tokio_from_system_conf()
                    .map_err(|err| LookupError::Resolution(err.to_string()))?,
            };

            let mut names = HashMap::new();
            for addr in addresses {
                // Per-address failures mean "no PTR record"; only a broken
                // resolver setup is an error.
                if let Ok(response) = resolver.reverse_lookup(*addr).await {
                    if let Some(name) = response.iter().next() {
                        let hostname = name.to_string();
                        names.insert(*addr, hostname.trim_end_matches('.').to_string());
                    }
                }
            }
            Ok(names)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn iface(store: &mut InventoryStore) -> ObjectHandle {
        let (handle, _) = store
            .find_or_update(
                Record::new(ObjectKind::Interface).with_attr("name", "eth0"),
                None,
            )
            .unwrap();
        handle
    }

    fn addr_record(address: &str, iface: ObjectHandle) -> Record {
        Record::new(ObjectKind::IpAddress)
            .with_attr("address", address)
            .with_attr("interface", Value::Ref(iface))
    }

    fn resolving_source(name: &str) -> SourceContext {
        SourceContext {
            name: name.to_string(),
            resolve_hostnames: true,
            dns_servers: None,
        }
    }

    #[tokio::test]
    async fn test_names_land_on_the_right_addresses() {
        let mut store = InventoryStore::new();
        let eth0 = iface(&mut store);
        let (a, _) = store
            .find_or_update(addr_record("10.0.1.5/24", eth0), Some("vcenter-a"))
            .unwrap();
        let (b, _) = store
            .find_or_update(addr_record("10.0.1.6/24", eth0), Some("vcenter-a"))
            .unwrap();

        let resolver = MockPtrResolver::new()
            .with_answer("10.0.1.5".parse().unwrap(), "host-01.example.net");
        let summary =
            apply_dns_names(&mut store, &[resolving_source("vcenter-a")], &resolver).await;

        assert_eq!(summary.resolved, 1);
        assert_eq!(
            store.get(a).unwrap().get("dns_name"),
            Some(&Value::from("host-01.example.net"))
        );
        assert_eq!(store.get(b).unwrap().get("dns_name"), None);
    }

    #[tokio::test]
    async fn test_grouping_is_per_source() {
        let mut store = InventoryStore::new();
        let eth0 = iface(&mut store);
        let (ours, _) = store
            .find_or_update(addr_record("10.0.1.5/24", eth0), Some("vcenter-a"))
            .unwrap();
        let (other, _) = store
            .find_or_update(addr_record("10.0.2.5/24", eth0), Some("vcenter-b"))
            .unwrap();

        let resolver = MockPtrResolver::new()
            .with_answer("10.0.1.5".parse().unwrap(), "a.example.net")
            .with_answer("10.0.2.5".parse().unwrap(), "b.example.net");
        // Only vcenter-a is configured to resolve.
        apply_dns_names(&mut store, &[resolving_source("vcenter-a")], &resolver).await;

        assert!(store.get(ours).unwrap().get("dns_name").is_some());
        assert!(store.get(other).unwrap().get("dns_name").is_none());
    }

    #[tokio::test]
    async fn test_resolver_failure_degrades_silently() {
        let mut store = InventoryStore::new();
        let eth0 = iface(&mut store);
        let (addr, _) = store
            .find_or_update(addr_record("10.0.1.5/24", eth0), Some("vcenter-a"))
            .unwrap();

        let resolver = MockPtrResolver::failing();
        let summary =
            apply_dns_names(&mut store, &[resolving_source("vcenter-a")], &resolver).await;

        assert_eq!(summary.failed_groups, 1);
        assert_eq!(summary.resolved, 0);
        assert!(store.get(addr).unwrap().get("dns_name").is_none());
    }

    #[tokio::test]
    async fn test_sources_without_flag_are_skipped() {
        let mut store = InventoryStore::new();
        let eth0 = iface(&mut store);
        store
            .find_or_update(addr_record("10.0.1.5/24", eth0), Some("vcenter-a"))
            .unwrap();
        let resolver = MockPtrResolver::new()
            .with_answer("10.0.1.5".parse().unwrap(), "host-01.example.net");
        let summary =
            apply_dns_names(&mut store, &[SourceContext::new("vcenter-a")], &resolver).await;
        assert_eq!(summary.resolved, 0);
    }

    #[tokio::test]
    async fn test_unassigned_addresses_get_no_hostname() {
        let mut store = InventoryStore::new();
        let (floating, _) = store
            .find_or_update(
                Record::new(ObjectKind::IpAddress).with_attr("address", "10.0.1.5/24"),
                Some("vcenter-a"),
            )
            .unwrap();

        let resolver = MockPtrResolver::new()
            .with_answer("10.0.1.5".parse().unwrap(), "host-01.example.net");
        let summary =
            apply_dns_names(&mut store, &[resolving_source("vcenter-a")], &resolver).await;

        assert_eq!(summary.resolved, 0);
        assert!(store.get(floating).unwrap().get("dns_name").is_none());
    }
}
