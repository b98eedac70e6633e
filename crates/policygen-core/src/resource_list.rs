// resource_list.rs — KRM function adapter.
//
// A kustomize plugin invocation receives a `ResourceList` whose
// `functionConfig` is the PolicyGenerator document. The generated objects
// are appended to the incoming `items` and the list is written back out.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::{GeneratorError, Result};
use crate::generator::PolicyGenerator;
use crate::loader::KustomizeRenderer;

pub const RESOURCE_LIST_API_VERSION: &str = "config.kubernetes.io/v1";
pub const RESOURCE_LIST_KIND: &str = "ResourceList";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceListInput {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    items: Vec<Value>,
    #[serde(default)]
    function_config: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceListOutput {
    api_version: &'static str,
    kind: &'static str,
    items: Vec<Value>,
}

/// Run the generator configured by `input`'s `functionConfig` and return
/// the resulting `ResourceList` as YAML.
pub fn generate_resource_list(input: &str, base_dir: &Path) -> Result<String> {
    let list: ResourceListInput =
        serde_yaml::from_str(input).map_err(|e| GeneratorError::ConfigParse {
            message: format!("the input is not a valid ResourceList: {}", e),
        })?;
    if list.kind != RESOURCE_LIST_KIND {
        return Err(GeneratorError::ConfigParse {
            message: format!(
                "expected a {} but the input kind is {:?}",
                RESOURCE_LIST_KIND, list.kind
            ),
        });
    }
    let Some(function_config) = list.function_config else {
        return Err(GeneratorError::ConfigParse {
            message: "the ResourceList has no functionConfig".to_string(),
        });
    };

    let generator =
        PolicyGenerator::from_value(function_config, input, base_dir, Box::new(KustomizeRenderer))?;

    let mut items = list.items;
    for object in generator.generate_objects()? {
        let value = serde_yaml::to_value(&object).map_err(|source| GeneratorError::Serialize {
            what: format!("{} {}", object.kind(), object.name()),
            source,
        })?;
        items.push(value);
    }
    tracing::debug!(items = items.len(), "assembled resource list");

    let output = ResourceListOutput {
        api_version: RESOURCE_LIST_API_VERSION,
        kind: RESOURCE_LIST_KIND,
        items,
    };
    serde_yaml::to_string(&output).map_err(|source| GeneratorError::Serialize {
        what: "the ResourceList".to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectExt;
    use serde_yaml::Mapping;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn generated_objects_follow_existing_items() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("cm.yaml"),
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm1\n",
        )
        .unwrap();
        let input = r#"
apiVersion: config.kubernetes.io/v1
kind: ResourceList
items:
  - apiVersion: v1
    kind: Namespace
    metadata:
      name: existing
functionConfig:
  apiVersion: policy.open-cluster-management.io/v1
  kind: PolicyGenerator
  metadata:
    name: gen
  policyDefaults:
    namespace: ns
  policies:
    - name: p1
      manifests:
        - path: cm.yaml
"#;
        let output = generate_resource_list(input, dir.path()).unwrap();
        let list: Mapping = serde_yaml::from_str(&output).unwrap();
        assert_eq!(list.kind(), "ResourceList");
        let kinds: Vec<&str> = list
            .get("items")
            .and_then(Value::as_sequence)
            .unwrap()
            .iter()
            .map(|item| item.get("kind").and_then(Value::as_str).unwrap())
            .collect();
        assert_eq!(
            kinds,
            vec!["Namespace", "Policy", "Placement", "PlacementBinding"]
        );
    }

    #[test]
    fn missing_function_config_is_rejected() {
        let dir = tempdir().unwrap();
        let err = generate_resource_list(
            "apiVersion: config.kubernetes.io/v1\nkind: ResourceList\nitems: []\n",
            dir.path(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("functionConfig"));
    }

    #[test]
    fn other_kinds_are_rejected() {
        let dir = tempdir().unwrap();
        let err = generate_resource_list("kind: ConfigMap\n", dir.path()).unwrap_err();
        assert!(err.to_string().contains("ResourceList"));
    }
}
