//! Full-run reconciliation scenarios.
//!
//! These tests drive the `Reconciler` the way the CLI does: seed what the
//! registry already holds, ingest collected records, run every phase, and
//! inspect the resulting graph.

use iw_core::enrichment::MockPtrResolver;
use iw_core::inventory::lifecycle::{MANAGED_TAG, ORPHANED_TAG};
use iw_core::settings::{RawEngineSettings, RawRule};
use iw_core::{
    EngineSettings, InventoryStore, ObjectKind, Reconciler, Record, SourceContext, Value,
};

fn tag_index(store: &InventoryStore, name: &str) -> Option<usize> {
    store
        .objects(ObjectKind::Tag)
        .iter()
        .position(|tag| tag.get("name").and_then(Value::as_str) == Some(name))
}

fn has_tag(store: &InventoryStore, kind: ObjectKind, name: &str, tag: &str) -> bool {
    let Some(tag) = tag_index(store, tag) else {
        return false;
    };
    store
        .objects(kind)
        .iter()
        .find(|obj| obj.get("name").and_then(Value::as_str) == Some(name))
        .map(|obj| obj.tags.contains(&tag))
        .unwrap_or(false)
}

#[tokio::test]
async fn orphan_cycle_across_two_runs() {
    // Run 1: two devices reported.
    let mut run1 = Reconciler::new(EngineSettings::default());
    let ctx = SourceContext::new("vcenter-a");
    run1.ingest_source(
        &ctx,
        vec![
            Record::new(ObjectKind::Device).with_attr("name", "host-01"),
            Record::new(ObjectKind::Device).with_attr("name", "host-02"),
        ],
    );
    let (mut store1, report1) = run1.reconcile(&MockPtrResolver::new()).await;
    assert_eq!(report1.objects_created, 2);
    assert!(has_tag(&store1, ObjectKind::Device, "host-01", MANAGED_TAG));
    assert!(has_tag(&store1, ObjectKind::Device, "host-02", MANAGED_TAG));
    assert_eq!(report1.orphans_marked, 0);

    // The registry collaborator pushes everything and hands out ids.
    for (i, index) in (0..store1.len(ObjectKind::Device)).enumerate() {
        store1.mark_synced(
            iw_core::ObjectHandle::new(ObjectKind::Device, index),
            100 + i as u64,
        );
    }

    // Run 2: a fresh engine, seeded from the registry, and only host-01
    // still reported.
    let mut run2 = Reconciler::new(EngineSettings::default());
    let managed = run2.store_mut().ensure_tag(MANAGED_TAG);
    for obj in store1.objects(ObjectKind::Device).to_vec() {
        let seeded = run2.store_mut().seed_from_registry(
            ObjectKind::Device,
            obj.data.clone(),
            obj.registry_id.unwrap(),
        );
        // The registry also restores tag membership.
        run2.store_mut().get_mut(seeded).unwrap().tags.insert(managed);
    }
    run2.ingest_source(
        &ctx,
        vec![Record::new(ObjectKind::Device).with_attr("name", "host-01")],
    );
    let (store2, report2) = run2.reconcile(&MockPtrResolver::new()).await;

    assert_eq!(report2.orphans_marked, 1);
    assert!(has_tag(&store2, ObjectKind::Device, "host-02", ORPHANED_TAG));
    assert!(
        has_tag(&store2, ObjectKind::Device, "host-02", MANAGED_TAG),
        "orphaned objects keep their managed marker"
    );
    assert!(!has_tag(&store2, ObjectKind::Device, "host-01", ORPHANED_TAG));

    // Run 3: host-02 comes back and loses the orphaned marker.
    let mut run3 = Reconciler::new(EngineSettings::default());
    let managed = run3.store_mut().ensure_tag(MANAGED_TAG);
    let orphaned = run3.store_mut().ensure_tag(ORPHANED_TAG);
    for obj in store2.objects(ObjectKind::Device).to_vec() {
        let seeded = run3.store_mut().seed_from_registry(
            ObjectKind::Device,
            obj.data.clone(),
            obj.registry_id.unwrap_or(999),
        );
        let tags = &mut run3.store_mut().get_mut(seeded).unwrap().tags;
        tags.insert(managed);
        if obj.get("name").and_then(Value::as_str) == Some("host-02") {
            tags.insert(orphaned);
        }
    }
    run3.ingest_source(
        &ctx,
        vec![
            Record::new(ObjectKind::Device).with_attr("name", "host-01"),
            Record::new(ObjectKind::Device).with_attr("name", "host-02"),
        ],
    );
    let (store3, _) = run3.reconcile(&MockPtrResolver::new()).await;
    assert!(!has_tag(&store3, ObjectKind::Device, "host-02", ORPHANED_TAG));
}

#[tokio::test]
async fn virtualization_stack_end_to_end() {
    let settings = EngineSettings::compile(&RawEngineSettings {
        primary_ip_policy: "always".to_string(),
        tenant_rules: vec![RawRule {
            pattern: "^crm-".to_string(),
            name: "crm-team".to_string(),
        }],
        ..Default::default()
    })
    .unwrap();

    let mut reconciler = Reconciler::new(settings);
    let ctx = SourceContext {
        name: "vcenter-fra".to_string(),
        resolve_hostnames: true,
        dns_servers: None,
    };
    reconciler.ingest_source(
        &ctx,
        vec![
            Record::new(ObjectKind::Site).with_attr("name", "fra1"),
            Record::new(ObjectKind::Cluster)
                .with_attr("name", "prod-cluster")
                .with_attr("site", "fra1"),
            Record::new(ObjectKind::Prefix)
                .with_attr("prefix", "10.20.0.0/16")
                .with_attr("site", "fra1"),
            Record::new(ObjectKind::Prefix)
                .with_attr("prefix", "10.20.30.0/24")
                .with_attr("site", "fra1")
                .with_attr("vrf", "prod"),
            Record::new(ObjectKind::Vrf).with_attr("name", "prod"),
            Record::new(ObjectKind::VirtualMachine)
                .with_attr("name", "crm-web-01")
                .with_attr("cluster", "prod-cluster"),
            Record::new(ObjectKind::VmInterface)
                .with_attr("name", "net0")
                .with_attr("virtual_machine", "crm-web-01")
                .with_attr("mac_address", "00:50:56:aa:bb:cc"),
            Record::new(ObjectKind::IpAddress)
                .with_attr("address", "10.20.30.40/24")
                .with_attr("vm_interface", "net0")
                .with_attr("is_primary", true),
        ],
    );

    let resolver = MockPtrResolver::new()
        .with_answer("10.20.30.40".parse().unwrap(), "crm-web-01.example.net");
    let (store, report) = reconciler.reconcile(&resolver).await;

    assert!(report.is_clean());
    assert_eq!(report.prefixes_matched, 1);
    assert_eq!(report.hostnames_resolved, 1);
    assert_eq!(report.primaries_assigned, 1);

    let vm = &store.objects(ObjectKind::VirtualMachine)[0];
    // Relation rule assigned the tenant, resolution materialized it.
    assert!(
        matches!(vm.get("tenant"), Some(Value::Unresolved(_)) | Some(Value::Ref(_))),
        "tenant rule applied"
    );
    // Primary address elected through the VM interface.
    let primary = vm.get("primary_ip4").and_then(Value::as_handle).unwrap();
    let address = store.get(primary).unwrap();
    assert_eq!(address.get("address"), Some(&Value::from("10.20.30.40/24")));
    // Longest prefix won and its VRF was inherited.
    let vrf = address.get("vrf").and_then(Value::as_handle).unwrap();
    assert_eq!(
        store.get(vrf).unwrap().get("name"),
        Some(&Value::from("prod"))
    );
    // PTR name written back.
    assert_eq!(
        address.get("dns_name"),
        Some(&Value::from("crm-web-01.example.net"))
    );

    // Export renders the graph with tags and sync state.
    let graph = iw_core::inventory::export::export(&store);
    assert!(graph["virtual_machine"][0]["tags"]
        .as_array()
        .unwrap()
        .iter()
        .any(|tag| tag == "inventory-warden"));
}

#[tokio::test]
async fn second_source_merges_instead_of_duplicating() {
    let mut reconciler = Reconciler::new(EngineSettings::default());
    let a = SourceContext::new("vcenter-a");
    let b = SourceContext::new("vcenter-b");
    reconciler.ingest_source(
        &a,
        vec![Record::new(ObjectKind::Device)
            .with_attr("name", "host-01")
            .with_attr("platform", "esxi-7")],
    );
    reconciler.ingest_source(
        &b,
        vec![Record::new(ObjectKind::Device)
            .with_attr("name", "host-01")
            .with_attr("serial", "SN-9")],
    );

    let (store, report) = reconciler.reconcile(&MockPtrResolver::new()).await;
    assert_eq!(store.len(ObjectKind::Device), 1);
    assert_eq!(report.objects_created, 1);
    assert_eq!(report.objects_updated, 1);

    let device = &store.objects(ObjectKind::Device)[0];
    assert_eq!(device.get("platform"), Some(&Value::from("esxi-7")));
    assert_eq!(device.get("serial"), Some(&Value::from("SN-9")));
    assert_eq!(device.source.as_deref(), Some("vcenter-b"));
    assert!(has_tag(&store, ObjectKind::Device, "host-01", "Source: vcenter-b"));
}
