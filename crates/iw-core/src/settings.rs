//! Engine settings.
//!
//! The raw, serde-facing form comes out of the application config as plain
//! strings; `EngineSettings::compile` validates it into typed form (parsed
//! CIDRs, compiled regexes, a parsed policy) before a run starts. Validation
//! failures here are the only fatal errors in the engine.

use crate::election::{PolicyParseError, PrimaryIpPolicy};
use crate::inventory::InventoryStore;
use crate::kinds::ObjectKind;
use crate::object::{ObjectHandle, RefSpec, Value};
use ipnetwork::IpNetwork;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;
use tracing::debug;

/// Errors raised while validating settings. All of them abort the run
/// before ingestion starts.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// A permitted-subnet entry is not a valid CIDR.
    #[error("invalid permitted subnet '{0}': {1}")]
    InvalidSubnet(String, ipnetwork::IpNetworkError),

    /// The primary-IP policy string is not recognized.
    #[error(transparent)]
    InvalidPolicy(#[from] PolicyParseError),

    /// A relation-rule pattern is not a valid regular expression.
    #[error("invalid relation-rule pattern '{0}': {1}")]
    InvalidPattern(String, regex::Error),
}

/// One raw `pattern -> name` rule entry, as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRule {
    /// Regular expression matched against object names.
    pub pattern: String,
    /// Name of the object to assign on match.
    pub name: String,
}

/// Raw engine settings, straight out of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEngineSettings {
    /// CIDR strings restricting which discovered addresses and prefixes may
    /// be ingested. Empty permits everything.
    #[serde(default)]
    pub permitted_subnets: Vec<String>,

    /// One of `always`, `when-undefined`, `never`.
    #[serde(default = "default_policy")]
    pub primary_ip_policy: String,

    /// Name-pattern rules assigning sites.
    #[serde(default)]
    pub site_rules: Vec<RawRule>,

    /// Name-pattern rules assigning tenants.
    #[serde(default)]
    pub tenant_rules: Vec<RawRule>,

    /// Name-pattern rules assigning roles.
    #[serde(default)]
    pub role_rules: Vec<RawRule>,

    /// Name-pattern rules appending tags.
    #[serde(default)]
    pub tag_rules: Vec<RawRule>,
}

fn default_policy() -> String {
    "when-undefined".to_string()
}

impl Default for RawEngineSettings {
    fn default() -> Self {
        Self {
            permitted_subnets: Vec::new(),
            primary_ip_policy: default_policy(),
            site_rules: Vec::new(),
            tenant_rules: Vec::new(),
            role_rules: Vec::new(),
            tag_rules: Vec::new(),
        }
    }
}

/// One compiled `pattern -> name` rule.
#[derive(Debug, Clone)]
pub struct RelationRule {
    /// Compiled name pattern.
    pub pattern: Regex,
    /// Target object name.
    pub name: String,
}

/// Compiled rule sets, applied to device, VM, and cluster names after
/// ingestion and before relation resolution. First matching pattern wins
/// per set; a rule never overwrites a source-supplied value, and tag rules
/// only ever append.
#[derive(Debug, Clone, Default)]
pub struct RelationRules {
    /// Rules assigning sites.
    pub site: Vec<RelationRule>,
    /// Rules assigning tenants.
    pub tenant: Vec<RelationRule>,
    /// Rules assigning roles.
    pub role: Vec<RelationRule>,
    /// Rules appending tags.
    pub tag: Vec<RelationRule>,
}

/// Validated, typed engine settings.
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    /// Subnets discovered addresses must fall into; empty permits all.
    pub permitted_subnets: Vec<IpNetwork>,
    /// Primary-address election policy.
    pub primary_ip_policy: PrimaryIpPolicy,
    /// Compiled relation rules.
    pub relation_rules: RelationRules,
}

impl EngineSettings {
    /// Validates raw settings into typed form.
    pub fn compile(raw: &RawEngineSettings) -> Result<Self, SettingsError> {
        let permitted_subnets = raw
            .permitted_subnets
            .iter()
            .map(|s| {
                s.parse()
                    .map_err(|err| SettingsError::InvalidSubnet(s.clone(), err))
            })
            .collect::<Result<Vec<IpNetwork>, _>>()?;
        let primary_ip_policy = raw.primary_ip_policy.parse()?;
        let relation_rules = RelationRules {
            site: compile_rules(&raw.site_rules)?,
            tenant: compile_rules(&raw.tenant_rules)?,
            role: compile_rules(&raw.role_rules)?,
            tag: compile_rules(&raw.tag_rules)?,
        };
        Ok(Self {
            permitted_subnets,
            primary_ip_policy,
            relation_rules,
        })
    }

    /// Whether the permitted-subnets filter allows this address.
    pub fn permits(&self, addr: IpAddr) -> bool {
        self.permitted_subnets.is_empty()
            || self.permitted_subnets.iter().any(|net| net.contains(addr))
    }
}

fn compile_rules(raw: &[RawRule]) -> Result<Vec<RelationRule>, SettingsError> {
    raw.iter()
        .map(|rule| {
            Regex::new(&rule.pattern)
                .map(|pattern| RelationRule {
                    pattern,
                    name: rule.name.clone(),
                })
                .map_err(|err| SettingsError::InvalidPattern(rule.pattern.clone(), err))
        })
        .collect()
}

/// Kinds whose names the relation rules are matched against.
const RULE_KINDS: [ObjectKind; 3] = [
    ObjectKind::Device,
    ObjectKind::VirtualMachine,
    ObjectKind::Cluster,
];

/// Applies the rule sets across the store. Returns the number of
/// assignments made.
pub fn apply_relation_rules(store: &mut InventoryStore, rules: &RelationRules) -> usize {
    let mut applied = 0;
    for kind in RULE_KINDS {
        for index in 0..store.len(kind) {
            let handle = ObjectHandle::new(kind, index);
            let Some(name) = store.get(handle).and_then(|obj| obj.primary_value()) else {
                continue;
            };

            for (set, attr, target) in [
                (&rules.site, "site", ObjectKind::Site),
                (&rules.tenant, "tenant", ObjectKind::Tenant),
                (&rules.role, "role", ObjectKind::DeviceRole),
            ] {
                let Some(rule) = set.iter().find(|rule| rule.pattern.is_match(&name)) else {
                    continue;
                };
                let Some(obj) = store.get_mut(handle) else {
                    continue;
                };
                if obj.get(attr).is_none() {
                    debug!(object = %obj, attr, target = %rule.name, "relation rule matched");
                    obj.set(attr, Value::Unresolved(RefSpec::by_name(target, &rule.name)));
                    applied += 1;
                }
            }

            if let Some(rule) = rules.tag.iter().find(|rule| rule.pattern.is_match(&name)) {
                let tag = store.ensure_tag(&rule.name);
                if let Some(obj) = store.get_mut(handle) {
                    if obj.tags.insert(tag) {
                        applied += 1;
                    }
                }
            }
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn raw_with(site_rules: Vec<RawRule>) -> RawEngineSettings {
        RawEngineSettings {
            site_rules,
            ..Default::default()
        }
    }

    #[test]
    fn test_compile_validates_everything() {
        let raw = RawEngineSettings {
            permitted_subnets: vec!["10.0.0.0/8".to_string(), "2001:db8::/32".to_string()],
            primary_ip_policy: "always".to_string(),
            site_rules: vec![RawRule {
                pattern: "^fra-".to_string(),
                name: "fra1".to_string(),
            }],
            ..Default::default()
        };
        let settings = EngineSettings::compile(&raw).unwrap();
        assert_eq!(settings.permitted_subnets.len(), 2);
        assert_eq!(settings.primary_ip_policy, PrimaryIpPolicy::Always);
        assert_eq!(settings.relation_rules.site.len(), 1);
    }

    #[test]
    fn test_compile_rejects_bad_subnet() {
        let raw = RawEngineSettings {
            permitted_subnets: vec!["10.0.0.0/33".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            EngineSettings::compile(&raw),
            Err(SettingsError::InvalidSubnet(..))
        ));
    }

    #[test]
    fn test_compile_rejects_bad_policy() {
        let raw = RawEngineSettings {
            primary_ip_policy: "sometimes".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            EngineSettings::compile(&raw),
            Err(SettingsError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_compile_rejects_bad_pattern() {
        let raw = raw_with(vec![RawRule {
            pattern: "([unclosed".to_string(),
            name: "fra1".to_string(),
        }]);
        assert!(matches!(
            EngineSettings::compile(&raw),
            Err(SettingsError::InvalidPattern(..))
        ));
    }

    #[test]
    fn test_empty_filter_permits_everything() {
        let settings = EngineSettings::default();
        assert!(settings.permits("192.0.2.1".parse().unwrap()));

        let settings = EngineSettings::compile(&RawEngineSettings {
            permitted_subnets: vec!["10.0.0.0/8".to_string()],
            ..Default::default()
        })
        .unwrap();
        assert!(settings.permits("10.1.2.3".parse().unwrap()));
        assert!(!settings.permits("192.0.2.1".parse().unwrap()));
    }

    #[test]
    fn test_rules_assign_without_overwriting() {
        let raw = raw_with(vec![RawRule {
            pattern: "^fra-".to_string(),
            name: "fra1".to_string(),
        }]);
        let settings = EngineSettings::compile(&raw).unwrap();

        let mut store = InventoryStore::new();
        let (matched, _) = store
            .find_or_update(
                Record::new(ObjectKind::Device).with_attr("name", "fra-host-01"),
                Some("s"),
            )
            .unwrap();
        let (already_set, _) = store
            .find_or_update(
                Record::new(ObjectKind::Device)
                    .with_attr("name", "fra-host-02")
                    .with_attr("site", "somewhere-else"),
                Some("s"),
            )
            .unwrap();
        let (unmatched, _) = store
            .find_or_update(
                Record::new(ObjectKind::Device).with_attr("name", "ams-host-01"),
                Some("s"),
            )
            .unwrap();

        let applied = apply_relation_rules(&mut store, &settings.relation_rules);
        assert_eq!(applied, 1);
        assert_eq!(
            store.get(matched).unwrap().get("site"),
            Some(&Value::Unresolved(RefSpec::by_name(
                ObjectKind::Site,
                "fra1"
            )))
        );
        assert_eq!(
            store.get(already_set).unwrap().get("site"),
            Some(&Value::from("somewhere-else")),
            "rules never overwrite source-supplied values"
        );
        assert_eq!(store.get(unmatched).unwrap().get("site"), None);
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let raw = raw_with(vec![
            RawRule {
                pattern: "host".to_string(),
                name: "first".to_string(),
            },
            RawRule {
                pattern: "^fra-".to_string(),
                name: "second".to_string(),
            },
        ]);
        let settings = EngineSettings::compile(&raw).unwrap();

        let mut store = InventoryStore::new();
        let (device, _) = store
            .find_or_update(
                Record::new(ObjectKind::Device).with_attr("name", "fra-host-01"),
                Some("s"),
            )
            .unwrap();
        apply_relation_rules(&mut store, &settings.relation_rules);
        assert_eq!(
            store.get(device).unwrap().get("site"),
            Some(&Value::Unresolved(RefSpec::by_name(
                ObjectKind::Site,
                "first"
            )))
        );
    }

    #[test]
    fn test_tag_rules_append() {
        let raw = RawEngineSettings {
            tag_rules: vec![RawRule {
                pattern: "^fra-".to_string(),
                name: "region: emea".to_string(),
            }],
            ..Default::default()
        };
        let settings = EngineSettings::compile(&raw).unwrap();

        let mut store = InventoryStore::new();
        let (device, _) = store
            .find_or_update(
                Record::new(ObjectKind::Device).with_attr("name", "fra-host-01"),
                Some("s"),
            )
            .unwrap();
        apply_relation_rules(&mut store, &settings.relation_rules);
        let tag = store.ensure_tag("region: emea");
        assert!(store.get(device).unwrap().tags.contains(&tag));

        // Re-application is a no-op.
        let applied = apply_relation_rules(&mut store, &settings.relation_rules);
        assert_eq!(applied, 0);
    }
}
