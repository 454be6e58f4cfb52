//! Legacy RBAC document shapes
//!
//! `Role`, `RoleBinding` and `ServiceAccount` documents may carry their
//! fields at the top level (`rules`, `roleRef`, `subjects`) next to or
//! instead of `spec`. They are folded into `spec` before strict decoding.
//! A field already present under `spec` wins.

use serde_yaml_ng::{Mapping, Value};

/// Top-level fields a kind may carry outside `spec`
fn hoisted_fields(kind: &str) -> &'static [&'static str] {
    match kind {
        "Role" => &["rules"],
        "RoleBinding" => &["roleRef", "subjects"],
        "ServiceAccount" => &["roleRef"],
        _ => &[],
    }
}

/// Move top-level RBAC fields of `document` into its `spec`
pub fn normalize(document: &mut Value) {
    let Some(root) = document.as_mapping_mut() else {
        return;
    };
    let kind = root
        .get("kind")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let fields = hoisted_fields(&kind);
    if fields.is_empty() {
        return;
    }

    let mut moved = Vec::new();
    for field in fields {
        if let Some(value) = root.remove(*field) {
            moved.push((*field, value));
        }
    }
    if moved.is_empty() {
        return;
    }

    let spec = root
        .entry(Value::from("spec"))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if spec.is_null() {
        *spec = Value::Mapping(Mapping::new());
    }
    let Some(spec) = spec.as_mapping_mut() else {
        // Leave the bad spec for the decoder to reject
        return;
    };
    for (field, value) in moved {
        if !spec.contains_key(field) {
            spec.insert(Value::from(field), value);
        }
    }
}
