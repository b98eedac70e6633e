// config.rs — The PolicyGenerator configuration tree.
//
// Field names follow the camelCase input format. Every field that can be
// inherited from a wider scope is an `Option`, so "omitted" and "explicitly
// false/empty" stay distinguishable until the defaulting pass resolves them.
// After `defaults::apply_defaults` runs, the tree is treated as read-only.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

pub const DEFAULT_CATEGORIES: &[&str] = &["CM Configuration Management"];
pub const DEFAULT_CONTROLS: &[&str] = &["CM-2 Baseline Configuration"];
pub const DEFAULT_STANDARDS: &[&str] = &["NIST SP 800-53"];
pub const DEFAULT_COMPLIANCE_TYPE: &str = "musthave";
pub const DEFAULT_REMEDIATION_ACTION: &str = "inform";
pub const DEFAULT_SEVERITY: &str = "low";

/// The root of a PolicyGenerator document.
///
/// ```yaml
/// apiVersion: policy.open-cluster-management.io/v1
/// kind: PolicyGenerator
/// metadata:
///   name: config-data-policies
/// policyDefaults:
///   namespace: my-policies
/// policies:
///   - name: policy-app-config
///     manifests:
///       - path: input/configmap.yaml
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratorConfig {
    pub api_version: String,
    pub kind: String,
    pub metadata: GeneratorMetadata,
    pub placement_binding_defaults: PlacementBindingDefaults,
    pub policy_defaults: PolicyDefaults,
    pub policy_set_defaults: PolicySetDefaults,
    pub policies: Vec<PolicyConfig>,
    pub policy_sets: Vec<PolicySetConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GeneratorMetadata {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlacementBindingDefaults {
    /// Shared binding name; numbered for every group after the first.
    pub name: Option<String>,
}

/// Tree-wide defaults applied to every policy that does not override them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyDefaults {
    /// Namespace of every generated object. Required.
    pub namespace: String,
    /// Make each policy depend on the one before it.
    pub order_policies: Option<bool>,
    #[serde(flatten)]
    pub options: PolicyOptions,
}

/// Options that exist both in `policyDefaults` and on each policy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyOptions {
    pub categories: Option<Vec<String>>,
    pub controls: Option<Vec<String>>,
    pub standards: Option<Vec<String>>,
    pub consolidate_manifests: Option<bool>,
    pub copy_policy_metadata: Option<bool>,
    pub disabled: Option<bool>,
    pub inform_gatekeeper_policies: Option<bool>,
    pub inform_kyverno_policies: Option<bool>,
    pub order_manifests: Option<bool>,
    pub dependencies: Option<Vec<PolicyDependency>>,
    pub placement: Option<PlacementConfig>,
    pub policy_annotations: Option<BTreeMap<String, String>>,
    pub policy_labels: Option<BTreeMap<String, String>>,
    pub configuration_policy_annotations: Option<BTreeMap<String, String>>,
    pub policy_sets: Option<Vec<String>>,
    pub generate_policy_placement: Option<bool>,
    #[serde(flatten)]
    pub template: TemplateOptions,
}

impl PolicyOptions {
    pub fn consolidate_manifests(&self) -> bool {
        self.consolidate_manifests.unwrap_or(true)
    }

    pub fn disabled(&self) -> bool {
        self.disabled.unwrap_or(false)
    }

    pub fn inform_gatekeeper_policies(&self) -> bool {
        self.inform_gatekeeper_policies.unwrap_or(true)
    }

    pub fn inform_kyverno_policies(&self) -> bool {
        self.inform_kyverno_policies.unwrap_or(true)
    }

    pub fn order_manifests(&self) -> bool {
        self.order_manifests.unwrap_or(false)
    }

    pub fn generate_policy_placement(&self) -> bool {
        self.generate_policy_placement.unwrap_or(true)
    }
}

/// Options that shape a single ConfigurationPolicy template.
///
/// These are settable at the tree, policy, and manifest level; the narrowest
/// scope that sets a value wins.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateOptions {
    pub compliance_type: Option<String>,
    pub metadata_compliance_type: Option<String>,
    pub evaluation_interval: Option<EvaluationInterval>,
    pub namespace_selector: Option<NamespaceSelector>,
    pub prune_object_behavior: Option<String>,
    pub remediation_action: Option<String>,
    pub severity: Option<String>,
    pub extra_dependencies: Option<Vec<PolicyDependency>>,
    pub ignore_pending: Option<bool>,
}

impl TemplateOptions {
    /// Fill every unset field from `wider`.
    pub fn inherit(&mut self, wider: &TemplateOptions) {
        inherit(&mut self.compliance_type, &wider.compliance_type);
        inherit(
            &mut self.metadata_compliance_type,
            &wider.metadata_compliance_type,
        );
        inherit(&mut self.evaluation_interval, &wider.evaluation_interval);
        inherit(&mut self.namespace_selector, &wider.namespace_selector);
        inherit(&mut self.prune_object_behavior, &wider.prune_object_behavior);
        inherit(&mut self.remediation_action, &wider.remediation_action);
        inherit(&mut self.severity, &wider.severity);
        inherit(&mut self.extra_dependencies, &wider.extra_dependencies);
        inherit(&mut self.ignore_pending, &wider.ignore_pending);
    }

    /// Names of the fields that configure the whole ConfigurationPolicy
    /// rather than a single object template.
    pub fn policy_scoped_fields_set(&self) -> Vec<&'static str> {
        let mut set = Vec::new();
        if self.evaluation_interval.is_some() {
            set.push("evaluationInterval");
        }
        if self.namespace_selector.is_some() {
            set.push("namespaceSelector");
        }
        if self.prune_object_behavior.is_some() {
            set.push("pruneObjectBehavior");
        }
        if self.remediation_action.is_some() {
            set.push("remediationAction");
        }
        if self.severity.is_some() {
            set.push("severity");
        }
        if self.extra_dependencies.is_some() {
            set.push("extraDependencies");
        }
        if self.ignore_pending.is_some() {
            set.push("ignorePending");
        }
        set
    }

    pub fn compliance_type(&self) -> &str {
        self.compliance_type
            .as_deref()
            .unwrap_or(DEFAULT_COMPLIANCE_TYPE)
    }

    pub fn remediation_action(&self) -> &str {
        self.remediation_action
            .as_deref()
            .unwrap_or(DEFAULT_REMEDIATION_ACTION)
    }

    pub fn severity(&self) -> &str {
        self.severity.as_deref().unwrap_or(DEFAULT_SEVERITY)
    }
}

pub(crate) fn inherit<T: Clone>(narrow: &mut Option<T>, wide: &Option<T>) {
    if narrow.is_none() {
        narrow.clone_from(wide);
    }
}

/// One entry of `policies`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyConfig {
    pub name: String,
    pub manifests: Vec<ManifestConfig>,
    #[serde(flatten)]
    pub options: PolicyOptions,
}

/// One entry of a policy's `manifests`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManifestConfig {
    /// File, directory, or kustomize directory relative to the base directory.
    pub path: String,
    /// Partial objects merged onto the loaded manifests.
    pub patches: Vec<Mapping>,
    #[serde(flatten)]
    pub options: TemplateOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicySetDefaults {
    pub placement: Option<PlacementConfig>,
    pub generate_policy_set_placement: Option<bool>,
}

/// One entry of `policySets`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicySetConfig {
    pub name: String,
    pub description: Option<String>,
    pub policies: Vec<String>,
    pub placement: Option<PlacementConfig>,
    pub generate_policy_set_placement: Option<bool>,
}

impl PolicySetConfig {
    pub fn generate_policy_set_placement(&self) -> bool {
        self.generate_policy_set_placement.unwrap_or(true)
    }
}

/// Where a policy or policy set is placed.
///
/// At most one placement mechanism may be set. `name` only accompanies the
/// inline selectors (or nothing, for the default select-all placement).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlacementConfig {
    pub name: Option<String>,
    /// Label key/value pairs; generates a PlacementRule.
    pub cluster_selectors: Option<BTreeMap<String, String>>,
    /// A label selector; generates a Placement.
    pub label_selector: Option<LabelSelector>,
    /// Path to an existing Placement manifest.
    pub placement_path: Option<String>,
    /// Path to an existing PlacementRule manifest.
    pub placement_rule_path: Option<String>,
    /// Name of a Placement that already exists on the hub.
    pub placement_name: Option<String>,
    /// Name of a PlacementRule that already exists on the hub.
    pub placement_rule_name: Option<String>,
}

impl PlacementConfig {
    /// Config keys of the placement mechanisms that are set.
    pub fn mechanisms(&self) -> Vec<&'static str> {
        let mut set = Vec::new();
        if self.cluster_selectors.is_some() {
            set.push("clusterSelectors");
        }
        if self.label_selector.is_some() {
            set.push("labelSelector");
        }
        if self.placement_path.is_some() {
            set.push("placementPath");
        }
        if self.placement_rule_path.is_some() {
            set.push("placementRulePath");
        }
        if self.placement_name.is_some() {
            set.push("placementName");
        }
        if self.placement_rule_name.is_some() {
            set.push("placementRuleName");
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.mechanisms().is_empty()
    }

    /// Whether this placement belongs to the legacy PlacementRule family.
    pub fn uses_placement_rule(&self) -> bool {
        self.cluster_selectors.is_some()
            || self.placement_rule_path.is_some()
            || self.placement_rule_name.is_some()
    }

    /// Whether this placement explicitly belongs to the Placement family.
    pub fn uses_placement(&self) -> bool {
        self.label_selector.is_some()
            || self.placement_path.is_some()
            || self.placement_name.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabelSelector {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_expressions: Option<Vec<LabelSelectorRequirement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Selects the namespaces a ConfigurationPolicy evaluates namespaced objects in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NamespaceSelector {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_expressions: Option<Vec<LabelSelectorRequirement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_labels: Option<BTreeMap<String, String>>,
}

/// How often a ConfigurationPolicy is re-evaluated in each compliance state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationInterval {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compliant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noncompliant: Option<String>,
}

/// A dependency on another object's compliance.
///
/// Omitted fields are filled by the defaulting pass: a Policy in the
/// generator's namespace that must be `Compliant`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyDependency {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compliance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omitted_and_false_booleans_are_distinct() {
        let yaml = r#"
name: p1
consolidateManifests: false
manifests:
  - path: input
"#;
        let policy: PolicyConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(policy.options.consolidate_manifests, Some(false));
        assert_eq!(policy.options.inform_kyverno_policies, None);
        assert!(policy.options.inform_kyverno_policies());
        assert!(!policy.options.consolidate_manifests());
    }

    #[test]
    fn template_options_parse_through_nested_flatten() {
        let yaml = r#"
name: p1
severity: high
remediationAction: enforce
evaluationInterval:
  compliant: 10m
manifests:
  - path: input/cm.yaml
    complianceType: mustonlyhave
    patches:
      - data:
          key: patched
"#;
        let policy: PolicyConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(policy.options.template.severity.as_deref(), Some("high"));
        assert_eq!(
            policy.options.template.evaluation_interval,
            Some(EvaluationInterval {
                compliant: Some("10m".to_string()),
                noncompliant: None,
            })
        );
        let manifest = &policy.manifests[0];
        assert_eq!(manifest.options.compliance_type(), "mustonlyhave");
        assert_eq!(manifest.patches.len(), 1);
    }

    #[test]
    fn inherit_only_fills_unset_fields() {
        let mut narrow = TemplateOptions {
            severity: Some("high".to_string()),
            ..Default::default()
        };
        let wide = TemplateOptions {
            severity: Some("low".to_string()),
            remediation_action: Some("enforce".to_string()),
            ..Default::default()
        };
        narrow.inherit(&wide);
        assert_eq!(narrow.severity(), "high");
        assert_eq!(narrow.remediation_action(), "enforce");
    }

    #[test]
    fn placement_mechanisms_are_listed_in_config_order() {
        let placement = PlacementConfig {
            cluster_selectors: Some(BTreeMap::new()),
            placement_path: Some("placement.yaml".to_string()),
            ..Default::default()
        };
        assert_eq!(
            placement.mechanisms(),
            vec!["clusterSelectors", "placementPath"]
        );
        assert!(placement.uses_placement_rule());
        assert!(placement.uses_placement());
        assert!(PlacementConfig::default().is_empty());
    }
}
