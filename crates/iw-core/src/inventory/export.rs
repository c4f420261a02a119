//! Graph export for the registry collaborator.
//!
//! Renders the store as `kind name -> list of attribute maps`, with
//! references rendered as registry ids where the target has one and display
//! names otherwise. Keys are sorted, so exports diff cleanly run over run.

use super::InventoryStore;
use crate::kinds::ObjectKind;
use crate::object::{CanonicalObject, Value};
use serde_json::{json, Map};

/// Renders the whole store as a JSON object.
pub fn export(store: &InventoryStore) -> serde_json::Value {
    let mut graph = Map::new();
    for kind in ObjectKind::ALL {
        let objects: Vec<serde_json::Value> = store
            .objects(kind)
            .iter()
            .map(|obj| export_object(store, obj))
            .collect();
        if !objects.is_empty() {
            graph.insert(kind.name().to_string(), serde_json::Value::Array(objects));
        }
    }
    serde_json::Value::Object(graph)
}

fn export_object(store: &InventoryStore, obj: &CanonicalObject) -> serde_json::Value {
    let mut out = Map::new();
    for (name, value) in &obj.data {
        out.insert(name.clone(), export_value(store, value));
    }
    out.insert("registry_id".to_string(), json!(obj.registry_id));
    out.insert("is_new".to_string(), json!(obj.is_new));

    let tag_names: Vec<String> = obj
        .tags
        .iter()
        .filter_map(|index| {
            store
                .objects(ObjectKind::Tag)
                .get(*index)
                .and_then(|tag| tag.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .collect();
    out.insert("tags".to_string(), json!(tag_names));

    serde_json::Value::Object(out)
}

fn export_value(store: &InventoryStore, value: &Value) -> serde_json::Value {
    match value {
        Value::Str(s) => json!(s),
        Value::Int(n) => json!(n),
        Value::Bool(b) => json!(b),
        Value::List(items) => serde_json::Value::Array(
            items.iter().map(|item| export_value(store, item)).collect(),
        ),
        Value::Ref(handle) => match store.get(*handle).and_then(|target| target.registry_id) {
            Some(id) => json!(id),
            None => json!(store.render(value)),
        },
        Value::Unresolved(_) => json!(store.render(value)),
    }
}
