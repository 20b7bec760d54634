//! `spec.podOverrides` merge
//!
//! Overrides are a partial PodSpec merged field by field into the generated
//! spec, following strategic-merge conventions for the lists that have a
//! merge key:
//!
//! - objects merge recursively; keys absent from the override are kept
//! - a `null` value in the override removes the field
//! - keyed lists (`containers`, `initContainers`, `ephemeralContainers`,
//!   `volumes`, `env`, `imagePullSecrets` by `name`; `volumeMounts` by
//!   `mountPath`; `ports` by `containerPort`) merge element-wise: an override
//!   element with a matching key merges into the existing element, unmatched
//!   elements are appended in override order
//! - every other list, and every scalar, replaces the base value
//!
//! So `{"containers": [{"name": "marimo", "imagePullPolicy": "Always"}]}`
//! adjusts the marimo container without restating the generated list.

use k8s_openapi::api::core::v1::PodSpec;
use serde_json::{Map, Value};
use tracing::warn;

fn list_merge_key(field: &str) -> Option<&'static str> {
    match field {
        "containers" | "initContainers" | "ephemeralContainers" | "volumes" | "env"
        | "imagePullSecrets" => Some("name"),
        "volumeMounts" => Some("mountPath"),
        "ports" => Some("containerPort"),
        _ => None,
    }
}

/// Merge `patch` into `base` in place
pub fn merge_value(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => merge_object(base, patch),
        (base, patch) => *base = patch.clone(),
    }
}

fn merge_object(base: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (field, value) in patch {
        if value.is_null() {
            base.remove(field);
            continue;
        }

        let Some(existing) = base.get_mut(field) else {
            base.insert(field.clone(), value.clone());
            continue;
        };

        match (existing, list_merge_key(field), value) {
            (Value::Array(existing), Some(key), Value::Array(items)) => {
                merge_keyed_list(existing, items, key);
            }
            (existing, _, _) => merge_value(existing, value),
        }
    }
}

fn merge_keyed_list(base: &mut Vec<Value>, patch: &[Value], key: &str) {
    for item in patch {
        let matched = item
            .get(key)
            .and_then(|k| base.iter_mut().find(|existing| existing.get(key) == Some(k)));
        match matched {
            Some(existing) => merge_value(existing, item),
            None => base.push(item.clone()),
        }
    }
}

/// Apply pod overrides to a generated PodSpec.
///
/// Overrides that do not produce a valid PodSpec are ignored with a warning
/// and the generated spec is returned unchanged.
pub fn apply_pod_overrides(base: PodSpec, overrides: &Value) -> PodSpec {
    let mut merged = match serde_json::to_value(&base) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "failed to serialize pod spec, ignoring podOverrides");
            return base;
        }
    };
    merge_value(&mut merged, overrides);

    match serde_json::from_value(merged) {
        Ok(spec) => spec,
        Err(e) => {
            warn!(error = %e, "podOverrides produced an invalid pod spec, ignoring");
            base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, ResourceRequirements, Toleration};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn base_spec() -> PodSpec {
        PodSpec {
            containers: vec![
                Container {
                    name: "marimo".to_string(),
                    image: Some("marimo:latest".to_string()),
                    args: Some(vec!["edit".to_string()]),
                    ..Default::default()
                },
                Container {
                    name: "cw-0".to_string(),
                    image: Some("s3fs:latest".to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn container_override_merges_by_name() {
        let overrides = json!({
            "containers": [{
                "name": "marimo",
                "resources": {"limits": {"nvidia.com/gpu": "1"}}
            }]
        });
        let spec = apply_pod_overrides(base_spec(), &overrides);

        assert_eq!(spec.containers.len(), 2);
        let marimo = &spec.containers[0];
        assert_eq!(marimo.image.as_deref(), Some("marimo:latest"));
        assert_eq!(marimo.args, Some(vec!["edit".to_string()]));
        assert_eq!(
            marimo.resources,
            Some(ResourceRequirements {
                limits: Some(BTreeMap::from([(
                    "nvidia.com/gpu".to_string(),
                    Quantity("1".to_string())
                )])),
                ..Default::default()
            })
        );
        assert_eq!(spec.containers[1].name, "cw-0");
    }

    #[test]
    fn unknown_container_is_appended() {
        let overrides = json!({"containers": [{"name": "extra", "image": "busybox"}]});
        let spec = apply_pod_overrides(base_spec(), &overrides);
        let names: Vec<&str> = spec.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["marimo", "cw-0", "extra"]);
    }

    #[test]
    fn scheduling_fields_are_added() {
        let overrides = json!({
            "nodeSelector": {"gpu": "true"},
            "tolerations": [{"key": "gpu", "operator": "Exists", "effect": "NoSchedule"}]
        });
        let spec = apply_pod_overrides(base_spec(), &overrides);
        assert_eq!(
            spec.node_selector,
            Some(BTreeMap::from([("gpu".to_string(), "true".to_string())]))
        );
        assert_eq!(
            spec.tolerations,
            Some(vec![Toleration {
                key: Some("gpu".to_string()),
                operator: Some("Exists".to_string()),
                effect: Some("NoSchedule".to_string()),
                ..Default::default()
            }])
        );
    }

    #[test]
    fn unkeyed_lists_replace() {
        let mut base = json!({"args": ["a", "b"]});
        merge_value(&mut base, &json!({"args": ["c"]}));
        assert_eq!(base, json!({"args": ["c"]}));
    }

    #[test]
    fn null_removes_field() {
        let mut base = json!({"nodeSelector": {"a": "b"}, "hostname": "x"});
        merge_value(&mut base, &json!({"hostname": null}));
        assert_eq!(base, json!({"nodeSelector": {"a": "b"}}));
    }

    #[test]
    fn nested_keyed_lists_merge() {
        let mut base = json!({
            "containers": [{
                "name": "marimo",
                "env": [{"name": "A", "value": "1"}, {"name": "B", "value": "2"}]
            }]
        });
        let patch = json!({
            "containers": [{"name": "marimo", "env": [{"name": "B", "value": "3"}]}]
        });
        merge_value(&mut base, &patch);
        assert_eq!(
            base["containers"][0]["env"],
            json!([{"name": "A", "value": "1"}, {"name": "B", "value": "3"}])
        );
    }

    #[test]
    fn invalid_override_keeps_base() {
        let overrides = json!({"containers": "not-a-list"});
        let spec = apply_pod_overrides(base_spec(), &overrides);
        assert_eq!(spec, base_spec());
    }
}
