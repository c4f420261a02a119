//! Per-source identity token.
//!
//! A `SourceContext` identifies one configured inventory source for the
//! duration of a run: its name, the tag derived from it, and the DNS options
//! the enrichment phase honors for addresses this source reported.

use serde::{Deserialize, Serialize};

/// Identity and options of one inventory source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceContext {
    /// Unique source name, as configured.
    pub name: String,
    /// Whether addresses reported by this source get PTR lookups.
    #[serde(default)]
    pub resolve_hostnames: bool,
    /// DNS servers to direct those lookups at; `None` uses the system
    /// resolver.
    #[serde(default)]
    pub dns_servers: Option<Vec<String>>,
}

impl SourceContext {
    /// Creates a context with hostname resolution disabled.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resolve_hostnames: false,
            dns_servers: None,
        }
    }

    /// Name of the tag marking objects this source reported.
    pub fn tag_name(&self) -> String {
        format!("Source: {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_name_derivation() {
        let ctx = SourceContext::new("vcenter-fra");
        assert_eq!(ctx.tag_name(), "Source: vcenter-fra");
    }
}
