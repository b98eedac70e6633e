// generator.rs — The top-level PolicyGenerator.
//
// Construction parses, defaults, and validates the configuration; nothing
// is generated until `generate` is called. Each `generate` call builds its
// own `GenerationContext`, so one generator can be run any number of times
// and always yields the same stream for the same files on disk.
//
// Output order: Policies, PolicySets, placements, PlacementBindings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::Value;

use crate::binding::BindingAggregator;
use crate::config::{GeneratorConfig, PolicyConfig, PolicyDependency};
use crate::context::GenerationContext;
use crate::defaults::{apply_defaults, COMPLIANT, POLICY_KIND};
use crate::error::{GeneratorError, Result};
use crate::expanders::ExpanderRegistry;
use crate::loader::{KustomizeRenderer, ManifestLoader, OverlayRenderer};
use crate::placement::{PlacementFamily, PlacementOwner, PlacementResolver};
use crate::resources::{
    ObjectMeta, Policy, PolicySet, PolicySetSpec, PolicySpec, PolicyTemplate, Resource, TypedRef,
    CATEGORIES_ANNOTATION, CONTROLS_ANNOTATION, POLICY_API_VERSION, POLICY_SET_API_VERSION,
    STANDARDS_ANNOTATION,
};
use crate::schema::check_unknown_fields;
use crate::templates::{build_policy_templates, load_manifest_groups};
use crate::validate::validate;

const GENERATOR_KIND: &str = "PolicyGenerator";

/// A parsed, defaulted, and validated PolicyGenerator configuration.
pub struct PolicyGenerator {
    config: GeneratorConfig,
    base_dir: PathBuf,
    renderer: Box<dyn OverlayRenderer>,
    expanders: ExpanderRegistry,
}

impl std::fmt::Debug for PolicyGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyGenerator")
            .field("name", &self.config.metadata.name)
            .field("base_dir", &self.base_dir)
            .field("renderer", &self.renderer.name())
            .field("expanders", &self.expanders.names())
            .finish()
    }
}

impl PolicyGenerator {
    /// Parse `source` with manifest paths relative to `base_dir`, rendering
    /// kustomize directories with the `kustomize` binary.
    pub fn from_yaml(source: &str, base_dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_renderer(source, base_dir, Box::new(KustomizeRenderer))
    }

    /// Like `from_yaml`, with a custom overlay renderer.
    pub fn with_renderer(
        source: &str,
        base_dir: impl AsRef<Path>,
        renderer: Box<dyn OverlayRenderer>,
    ) -> Result<Self> {
        let document: Value =
            serde_yaml::from_str(source).map_err(|e| GeneratorError::ConfigParse {
                message: e.to_string(),
            })?;
        Self::from_value(document, source, base_dir.as_ref(), renderer)
    }

    /// Build from an already decoded document. `source` is the original
    /// text, used only to point unknown-field errors at a line.
    pub(crate) fn from_value(
        document: Value,
        source: &str,
        base_dir: &Path,
        renderer: Box<dyn OverlayRenderer>,
    ) -> Result<Self> {
        check_unknown_fields(&document, source)?;
        let mut config: GeneratorConfig =
            serde_yaml::from_value(document).map_err(|e| GeneratorError::ConfigParse {
                message: e.to_string(),
            })?;
        if !config.kind.is_empty() && config.kind != GENERATOR_KIND {
            tracing::warn!(kind = %config.kind, "configuration kind is not {}", GENERATOR_KIND);
        }

        apply_defaults(&mut config);
        {
            let loader = ManifestLoader::new(base_dir, renderer.as_ref())?;
            validate(&config, &loader)?;
        }

        Ok(Self {
            config,
            base_dir: base_dir.to_path_buf(),
            renderer,
            expanders: ExpanderRegistry::default(),
        })
    }

    /// Replace the expander set.
    pub fn with_expanders(mut self, expanders: ExpanderRegistry) -> Self {
        self.expanders = expanders;
        self
    }

    /// The configuration after defaulting.
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Generate the output stream: every object as a YAML document preceded
    /// by `---`.
    pub fn generate(&self) -> Result<String> {
        let objects = self.generate_objects()?;
        let mut output = String::new();
        for object in &objects {
            let yaml = serde_yaml::to_string(object).map_err(|source| GeneratorError::Serialize {
                what: format!("{} {}", object.kind(), object.name()),
                source,
            })?;
            output.push_str("---\n");
            output.push_str(&yaml);
        }
        Ok(output)
    }

    /// Generate the output objects in stream order.
    pub fn generate_objects(&self) -> Result<Vec<Resource>> {
        let config = &self.config;
        let namespace = config.policy_defaults.namespace.as_str();
        let loader = ManifestLoader::new(&self.base_dir, self.renderer.as_ref())?;
        let resolver =
            PlacementResolver::new(&loader, namespace, PlacementFamily::for_config(config));
        let mut ctx = GenerationContext::new();

        let policy_shared_name = config
            .policy_defaults
            .options
            .placement
            .as_ref()
            .and_then(|p| p.name.as_deref());
        let order_policies = config.policy_defaults.order_policies.unwrap_or(false);

        let mut policies = Vec::with_capacity(config.policies.len());
        let mut previous: Option<&str> = None;
        for policy in &config.policies {
            let groups = load_manifest_groups(policy, &loader)?;
            let templates = build_policy_templates(policy, &groups, &self.expanders)?;
            let mut built = assemble_policy(policy, namespace, templates);
            if order_policies {
                built.spec.dependencies = previous
                    .map(|name| vec![policy_dependency(name, namespace)])
                    .unwrap_or_default();
            }
            previous = Some(policy.name.as_str());

            if policy.options.generate_policy_placement() {
                let placement = resolver.resolve(
                    &mut ctx,
                    policy.options.placement.as_ref(),
                    PlacementOwner {
                        name: &policy.name,
                        shared_name: policy_shared_name,
                    },
                )?;
                ctx.bind(placement, TypedRef::policy(policy.name.clone()));
            }
            policies.push(Resource::Policy(built));
        }

        let set_shared_name = config
            .policy_set_defaults
            .placement
            .as_ref()
            .and_then(|p| p.name.as_deref());
        let mut policy_sets = Vec::with_capacity(config.policy_sets.len());
        for set in &config.policy_sets {
            policy_sets.push(Resource::PolicySet(PolicySet {
                api_version: POLICY_SET_API_VERSION,
                kind: "PolicySet",
                metadata: ObjectMeta::namespaced(set.name.clone(), namespace),
                spec: PolicySetSpec {
                    description: set.description.clone(),
                    policies: set.policies.clone(),
                },
            }));

            if set.generate_policy_set_placement() {
                let placement = resolver.resolve(
                    &mut ctx,
                    set.placement.as_ref(),
                    PlacementOwner {
                        name: &set.name,
                        shared_name: set_shared_name,
                    },
                )?;
                ctx.bind(placement, TypedRef::policy_set(set.name.clone()));
            }
        }

        let (placements, associations) = ctx.into_parts();
        let bindings = BindingAggregator::new(
            namespace,
            config.placement_binding_defaults.name.as_deref(),
        )
        .aggregate(&associations)?;

        tracing::info!(
            generator = %config.metadata.name,
            policies = policies.len(),
            policy_sets = policy_sets.len(),
            placements = placements.len(),
            bindings = bindings.len(),
            "generated policies"
        );

        let mut objects = policies;
        objects.extend(policy_sets);
        objects.extend(placements);
        objects.extend(bindings.into_iter().map(Resource::PlacementBinding));
        Ok(objects)
    }
}

fn assemble_policy(policy: &PolicyConfig, namespace: &str, templates: Vec<PolicyTemplate>) -> Policy {
    let options = &policy.options;
    let joined = |values: &Option<Vec<String>>| values.as_deref().unwrap_or_default().join(",");

    let mut annotations = BTreeMap::new();
    annotations.insert(CATEGORIES_ANNOTATION.to_string(), joined(&options.categories));
    annotations.insert(CONTROLS_ANNOTATION.to_string(), joined(&options.controls));
    annotations.insert(STANDARDS_ANNOTATION.to_string(), joined(&options.standards));
    if let Some(extra) = &options.policy_annotations {
        annotations.extend(extra.clone());
    }

    Policy {
        api_version: POLICY_API_VERSION,
        kind: POLICY_KIND,
        metadata: ObjectMeta {
            annotations,
            labels: options.policy_labels.clone().unwrap_or_default(),
            name: policy.name.clone(),
            namespace: Some(namespace.to_string()),
        },
        spec: PolicySpec {
            copy_policy_metadata: options.copy_policy_metadata,
            dependencies: options.dependencies.clone().unwrap_or_default(),
            disabled: options.disabled(),
            policy_templates: templates,
        },
    }
}

fn policy_dependency(name: &str, namespace: &str) -> PolicyDependency {
    PolicyDependency {
        api_version: Some(POLICY_API_VERSION.to_string()),
        compliance: Some(COMPLIANT.to_string()),
        kind: Some(POLICY_KIND.to_string()),
        name: name.to_string(),
        namespace: Some(namespace.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const CM: &str = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm1\ndata:\n  key: value\n";

    #[test]
    fn minimal_config_generates_three_documents() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("cm.yaml"), CM).unwrap();
        let generator = PolicyGenerator::from_yaml(
            r#"
apiVersion: policy.open-cluster-management.io/v1
kind: PolicyGenerator
metadata:
  name: config-data-policies
policyDefaults:
  namespace: my-policies
policies:
  - name: policy-app-config
    manifests:
      - path: cm.yaml
"#,
            dir.path(),
        )
        .unwrap();

        let objects = generator.generate_objects().unwrap();
        let summary: Vec<(&str, &str)> = objects.iter().map(|o| (o.kind(), o.name())).collect();
        assert_eq!(
            summary,
            vec![
                ("Policy", "policy-app-config"),
                ("Placement", "placement-policy-app-config"),
                ("PlacementBinding", "binding-policy-app-config"),
            ]
        );

        let Resource::Policy(policy) = &objects[0] else {
            panic!("expected a Policy first");
        };
        assert_eq!(
            policy.metadata.annotations.get(STANDARDS_ANNOTATION).map(String::as_str),
            Some("NIST SP 800-53")
        );
        assert!(!policy.spec.disabled);
    }

    #[test]
    fn order_policies_chains_policy_dependencies() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("cm.yaml"), CM).unwrap();
        let generator = PolicyGenerator::from_yaml(
            r#"
metadata: {name: gen}
policyDefaults:
  namespace: ns
  orderPolicies: true
placementBindingDefaults:
  name: all
policies:
  - name: first
    manifests: [{path: cm.yaml}]
  - name: second
    manifests: [{path: cm.yaml}]
"#,
            dir.path(),
        )
        .unwrap();

        let objects = generator.generate_objects().unwrap();
        let Resource::Policy(first) = &objects[0] else {
            panic!("expected a Policy");
        };
        let Resource::Policy(second) = &objects[1] else {
            panic!("expected a Policy");
        };
        assert!(first.spec.dependencies.is_empty());
        assert_eq!(second.spec.dependencies, vec![policy_dependency("first", "ns")]);
    }

    #[test]
    fn unknown_field_is_reported_before_validation() {
        let dir = tempdir().unwrap();
        let err = PolicyGenerator::from_yaml(
            "metadata: {name: gen}\npolicyDefaults:\n  namespce: ns\npolicies: []\n",
            dir.path(),
        )
        .unwrap_err();
        assert!(matches!(err, GeneratorError::UnknownField { .. }));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let err = PolicyGenerator::from_yaml("policies: [", dir.path()).unwrap_err();
        assert!(matches!(err, GeneratorError::ConfigParse { .. }));
    }

    #[test]
    fn disabled_placement_generation_emits_no_binding() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("cm.yaml"), CM).unwrap();
        let generator = PolicyGenerator::from_yaml(
            r#"
metadata: {name: gen}
policyDefaults:
  namespace: ns
  generatePolicyPlacement: false
policies:
  - name: p1
    policySets: [set1]
    manifests: [{path: cm.yaml}]
"#,
            dir.path(),
        )
        .unwrap();
        let objects = generator.generate_objects().unwrap();
        let summary: Vec<(&str, &str)> = objects.iter().map(|o| (o.kind(), o.name())).collect();
        assert_eq!(
            summary,
            vec![
                ("Policy", "p1"),
                ("PolicySet", "set1"),
                ("Placement", "placement-set1"),
                ("PlacementBinding", "binding-set1"),
            ]
        );
    }
}
