//! Run driver.
//!
//! A `Reconciler` owns the store and settings for exactly one run and
//! executes the phases in their fixed order: ingestion for every source,
//! relation rules, relation resolution, prefix enrichment, DNS enrichment,
//! primary-IP election, lifecycle tagging. No phase re-enters an earlier
//! one, and nothing survives the run except the report and the exported
//! graph.

use crate::election::elect_primaries;
use crate::enrichment::dns::{apply_dns_names, PtrResolver};
use crate::enrichment::prefix::{enrich_addresses, split_address};
use crate::inventory::lifecycle::apply_lifecycle;
use crate::inventory::resolve::resolve_relations;
use crate::inventory::{InventoryStore, Outcome};
use crate::kinds::ObjectKind;
use crate::matching::{find_by_macs, find_by_primary_ip, MacMatch};
use crate::object::Value;
use crate::record::Record;
use crate::settings::{apply_relation_rules, EngineSettings};
use crate::source::SourceContext;
use crate::validation::MacAddr;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-source ingestion counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    /// Records ingested into the store.
    pub records: usize,
    /// Records skipped (malformed, unparseable identity field, or outside
    /// the permitted subnets).
    pub skipped: usize,
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// When ingestion started.
    pub started_at: DateTime<Utc>,
    /// When the last phase finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Ingestion counters per source.
    pub sources: BTreeMap<String, SourceStats>,
    /// Canonical objects created this run.
    pub objects_created: usize,
    /// Canonical objects merged into this run.
    pub objects_updated: usize,
    /// Managed objects carrying the orphaned marker after the run.
    pub orphans_marked: usize,
    /// Addresses that found a containing prefix.
    pub prefixes_matched: usize,
    /// Addresses that received a PTR name.
    pub hostnames_resolved: usize,
    /// Primary-address fields assigned.
    pub primaries_assigned: usize,
    /// Per-record and per-field errors absorbed along the way.
    pub absorbed_errors: usize,
}

impl RunReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            sources: BTreeMap::new(),
            objects_created: 0,
            objects_updated: 0,
            orphans_marked: 0,
            prefixes_matched: 0,
            hostnames_resolved: 0,
            primaries_assigned: 0,
            absorbed_errors: 0,
        }
    }

    /// True when no per-record or per-field error was absorbed.
    pub fn is_clean(&self) -> bool {
        self.absorbed_errors == 0
    }
}

/// Drives one reconciliation run.
pub struct Reconciler {
    store: InventoryStore,
    settings: EngineSettings,
    sources: Vec<SourceContext>,
    report: RunReport,
}

impl Reconciler {
    /// Creates a reconciler with an empty store.
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            store: InventoryStore::new(),
            settings,
            sources: Vec::new(),
            report: RunReport::new(),
        }
    }

    /// The store, for seeding and inspection.
    pub fn store(&self) -> &InventoryStore {
        &self.store
    }

    /// Mutable store access, for registry seeding before ingestion.
    pub fn store_mut(&mut self) -> &mut InventoryStore {
        &mut self.store
    }

    /// Ingests every record one source collected.
    ///
    /// Per-record problems are absorbed: a malformed record or one outside
    /// the permitted subnets is skipped and ingestion continues.
    pub fn ingest_source(&mut self, ctx: &SourceContext, records: Vec<Record>) {
        info!(source = %ctx.name, records = records.len(), "ingesting source");
        if !self.sources.iter().any(|s| s.name == ctx.name) {
            self.sources.push(ctx.clone());
        }
        let mut stats = SourceStats::default();
        for record in records {
            if self.ingest_record(ctx, record) {
                stats.records += 1;
            } else {
                stats.skipped += 1;
            }
        }
        let entry = self.report.sources.entry(ctx.name.clone()).or_default();
        entry.records += stats.records;
        entry.skipped += stats.skipped;
    }

    fn ingest_record(&mut self, ctx: &SourceContext, mut record: Record) -> bool {
        record.promote_relations();
        if !self.check_subnet_gate(&mut record) {
            return false;
        }

        // Records without an authoritative identity but with MAC hints go
        // through the matcher chain first.
        if record.identity().is_none()
            && !record.macs.is_empty()
            && matches!(record.kind, ObjectKind::Device | ObjectKind::VirtualMachine)
        {
            if let Some(handle) = self.match_by_hints(&record) {
                debug!(kind = %record.kind, "record matched existing entity via identity hints");
                if let Some(obj) = self.store.get_mut(handle) {
                    obj.merge(record.attrs, Some(&ctx.name));
                }
                self.report.objects_updated += 1;
                return true;
            }
        }

        match self.store.find_or_update(record, Some(&ctx.name)) {
            Ok((_, Outcome::Created)) => {
                self.report.objects_created += 1;
                true
            }
            Ok((_, Outcome::Updated)) => {
                self.report.objects_updated += 1;
                true
            }
            Err(err) => {
                warn!(source = %ctx.name, error = %err, "skipping record");
                self.report.absorbed_errors += 1;
                false
            }
        }
    }

    /// Validates the identity field of address and prefix records and
    /// enforces the permitted-subnets filter. Returns false when the record
    /// must be skipped.
    fn check_subnet_gate(&mut self, record: &mut Record) -> bool {
        let field = match record.kind {
            ObjectKind::IpAddress => "address",
            ObjectKind::Prefix => "prefix",
            _ => return true,
        };
        let Some(raw) = record.attrs.get(field).and_then(Value::as_str) else {
            return true;
        };

        let host = match record.kind {
            ObjectKind::IpAddress => split_address(raw).map(|(addr, _)| addr),
            _ => raw.parse::<ipnetwork::IpNetwork>().ok().map(|net| net.network()),
        };
        let Some(host) = host else {
            warn!(kind = %record.kind, value = raw, "unparseable {field}, skipping record");
            self.report.absorbed_errors += 1;
            return false;
        };
        if !self.settings.permits(host) {
            debug!(kind = %record.kind, value = raw, "outside permitted subnets, dropping record");
            return false;
        }
        true
    }

    /// MAC matcher, then primary-IP fallback on ambiguity. `None` falls
    /// through to ordinary find-or-update.
    fn match_by_hints(&mut self, record: &Record) -> Option<crate::object::ObjectHandle> {
        let macs: Vec<MacAddr> = record
            .macs
            .iter()
            .filter_map(|raw| match MacAddr::parse(raw) {
                Ok(mac) => Some(mac),
                Err(err) => {
                    warn!(error = %err, "dropping invalid MAC hint");
                    self.report.absorbed_errors += 1;
                    None
                }
            })
            .collect();

        match find_by_macs(&self.store, record.kind, &macs) {
            MacMatch::Unique(handle) => Some(handle),
            MacMatch::NoMatch => None,
            MacMatch::Ambiguous => {
                debug!(kind = %record.kind, "MAC match ambiguous, falling back to primary IP");
                record
                    .primary_ip
                    .as_deref()
                    .and_then(|addr| find_by_primary_ip(&self.store, record.kind, addr))
            }
        }
    }

    /// Runs every post-ingestion phase in order and closes the run.
    pub async fn reconcile(mut self, resolver: &dyn PtrResolver) -> (InventoryStore, RunReport) {
        info!(run_id = %self.report.run_id, "starting reconciliation phases");

        apply_relation_rules(&mut self.store, &self.settings.relation_rules);
        resolve_relations(&mut self.store);

        let prefixes = enrich_addresses(&mut self.store);
        self.report.prefixes_matched = prefixes.matched;
        self.report.absorbed_errors += prefixes.parse_errors;

        let dns = apply_dns_names(&mut self.store, &self.sources, resolver).await;
        self.report.hostnames_resolved = dns.resolved;
        self.report.absorbed_errors += dns.failed_groups;

        let election = elect_primaries(&mut self.store, self.settings.primary_ip_policy);
        self.report.primaries_assigned = election.assigned;

        let lifecycle = apply_lifecycle(&mut self.store, &self.sources);
        self.report.orphans_marked = lifecycle.orphaned;

        self.report.finished_at = Some(Utc::now());
        info!(
            run_id = %self.report.run_id,
            created = self.report.objects_created,
            updated = self.report.objects_updated,
            orphans = self.report.orphans_marked,
            clean = self.report.is_clean(),
            "run complete"
        );
        (self.store, self.report)
    }
}
