//! Address enrichment: longest-prefix matching and PTR lookups.

pub mod dns;
pub mod prefix;

pub use dns::{DnsSummary, LookupError, MockPtrResolver, PtrResolver};
pub use prefix::{enrich_addresses, PrefixSummary};
