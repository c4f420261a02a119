//! Relation resolution.
//!
//! One pass over every object of every kind, in kind declaration order,
//! replacing unresolved reference descriptors with direct handles wherever
//! the store already holds the target. Declaration order places leaf kinds
//! first, so a descriptor whose target was itself resolved earlier in the
//! pass resolves transitively; anything else stays a descriptor and is
//! treated by consumers as "relation missing", never as an error.

use super::InventoryStore;
use crate::kinds::ObjectKind;
use crate::object::{ObjectHandle, RefSpec, Value};
use tracing::{debug, info};

/// Counters for one resolution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionSummary {
    /// Descriptors replaced with handles.
    pub resolved: usize,
    /// Descriptors left in place because no target exists in the store.
    pub unresolved: usize,
}

/// Where a pending descriptor sits inside an object's data.
enum Slot {
    Attr(String),
    ListElem(String, usize),
}

/// Resolves reference descriptors across the whole store, once.
pub fn resolve_relations(store: &mut InventoryStore) -> ResolutionSummary {
    let mut summary = ResolutionSummary::default();
    for kind in ObjectKind::ALL {
        for index in 0..store.len(kind) {
            let handle = ObjectHandle::new(kind, index);
            resolve_object(store, handle, &mut summary);
        }
    }
    info!(
        resolved = summary.resolved,
        unresolved = summary.unresolved,
        "relation resolution pass complete"
    );
    summary
}

fn resolve_object(store: &mut InventoryStore, handle: ObjectHandle, summary: &mut ResolutionSummary) {
    // Collect pending descriptors first; lookups borrow the store immutably.
    let mut pending: Vec<(Slot, RefSpec)> = Vec::new();
    if let Some(obj) = store.get(handle) {
        for (name, value) in &obj.data {
            match value {
                Value::Unresolved(spec) => {
                    pending.push((Slot::Attr(name.clone()), spec.clone()));
                }
                Value::List(items) => {
                    for (i, item) in items.iter().enumerate() {
                        if let Value::Unresolved(spec) = item {
                            pending.push((Slot::ListElem(name.clone(), i), spec.clone()));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    for (slot, spec) in pending {
        match store.lookup(spec.kind, &spec.attrs) {
            Some(target) => {
                apply(store, handle, &slot, target);
                summary.resolved += 1;
            }
            None => {
                debug!(object = %handle, descriptor = %spec, "relation target not in store, leaving descriptor");
                summary.unresolved += 1;
            }
        }
    }
}

fn apply(store: &mut InventoryStore, handle: ObjectHandle, slot: &Slot, target: ObjectHandle) {
    let Some(obj) = store.get_mut(handle) else {
        return;
    };
    match slot {
        Slot::Attr(name) => {
            obj.data.insert(name.clone(), Value::Ref(target));
        }
        Slot::ListElem(name, i) => {
            if let Some(Value::List(items)) = obj.data.get_mut(name) {
                if let Some(item) = items.get_mut(*i) {
                    *item = Value::Ref(target);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn ref_to(kind: ObjectKind, name: &str) -> Value {
        Value::Unresolved(RefSpec::by_name(kind, name))
    }

    #[test]
    fn test_descriptor_resolves_to_handle() {
        let mut store = InventoryStore::new();
        let (site, _) = store
            .find_or_update(Record::new(ObjectKind::Site).with_attr("name", "fra1"), None)
            .unwrap();
        let (device, _) = store
            .find_or_update(
                Record::new(ObjectKind::Device)
                    .with_attr("name", "host-01")
                    .with_attr("site", ref_to(ObjectKind::Site, "fra1")),
                None,
            )
            .unwrap();

        let summary = resolve_relations(&mut store);
        assert_eq!(summary.resolved, 1);
        assert_eq!(summary.unresolved, 0);
        assert_eq!(
            store.get(device).unwrap().get("site"),
            Some(&Value::Ref(site))
        );
    }

    #[test]
    fn test_missing_target_is_soft() {
        let mut store = InventoryStore::new();
        let (device, _) = store
            .find_or_update(
                Record::new(ObjectKind::Device)
                    .with_attr("name", "host-01")
                    .with_attr("site", ref_to(ObjectKind::Site, "nowhere")),
                None,
            )
            .unwrap();

        let summary = resolve_relations(&mut store);
        assert_eq!(summary.resolved, 0);
        assert_eq!(summary.unresolved, 1);
        assert!(matches!(
            store.get(device).unwrap().get("site"),
            Some(Value::Unresolved(_))
        ));
    }

    #[test]
    fn test_transitive_chain_resolves_in_declaration_order() {
        // interface -> device -> site: device resolves its site before the
        // interface's own resolution runs, because Device precedes Interface
        // in declaration order.
        let mut store = InventoryStore::new();
        store
            .find_or_update(Record::new(ObjectKind::Site).with_attr("name", "fra1"), None)
            .unwrap();
        let (device, _) = store
            .find_or_update(
                Record::new(ObjectKind::Device)
                    .with_attr("name", "host-01")
                    .with_attr("site", ref_to(ObjectKind::Site, "fra1")),
                None,
            )
            .unwrap();
        let (iface, _) = store
            .find_or_update(
                Record::new(ObjectKind::Interface)
                    .with_attr("name", "eth0")
                    .with_attr("device", ref_to(ObjectKind::Device, "host-01")),
                None,
            )
            .unwrap();

        resolve_relations(&mut store);
        assert_eq!(
            store.get(iface).unwrap().get("device"),
            Some(&Value::Ref(device))
        );
        let site = store.follow(iface, &["device", "site"]);
        assert!(site.is_some());
    }

    #[test]
    fn test_list_elements_resolve_element_wise() {
        let mut store = InventoryStore::new();
        store
            .find_or_update(Record::new(ObjectKind::Vlan).with_attr("name", "vlan-10"), None)
            .unwrap();
        let (iface, _) = store
            .find_or_update(
                Record::new(ObjectKind::Interface)
                    .with_attr("name", "eth0")
                    .with_attr(
                        "tagged_vlans",
                        Value::List(vec![
                            ref_to(ObjectKind::Vlan, "vlan-10"),
                            ref_to(ObjectKind::Vlan, "vlan-99"),
                        ]),
                    ),
                None,
            )
            .unwrap();

        let summary = resolve_relations(&mut store);
        assert_eq!(summary.resolved, 1);
        assert_eq!(summary.unresolved, 1);
        let Some(Value::List(items)) = store.get(iface).unwrap().get("tagged_vlans") else {
            panic!("tagged_vlans must stay a list");
        };
        assert!(matches!(items[0], Value::Ref(_)));
        assert!(matches!(items[1], Value::Unresolved(_)));
    }
}
