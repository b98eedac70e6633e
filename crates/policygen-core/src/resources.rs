// resources.rs — Typed shapes of every generated object.
//
// Field order in these structs is the key order in the emitted YAML, so it
// is kept alphabetical within each object to match what other tooling in
// the ecosystem emits. Embedded user manifests stay untyped (`Mapping`).

use std::collections::BTreeMap;

use serde::Serialize;
use serde_yaml::Mapping;

use crate::config::{EvaluationInterval, LabelSelector, NamespaceSelector, PolicyDependency};
use crate::object::ObjectExt;

pub const POLICY_GROUP: &str = "policy.open-cluster-management.io";
pub const POLICY_API_VERSION: &str = "policy.open-cluster-management.io/v1";
pub const POLICY_SET_API_VERSION: &str = "policy.open-cluster-management.io/v1beta1";
pub const PLACEMENT_GROUP: &str = "cluster.open-cluster-management.io";
pub const PLACEMENT_API_VERSION: &str = "cluster.open-cluster-management.io/v1beta1";
pub const PLACEMENT_RULE_GROUP: &str = "apps.open-cluster-management.io";
pub const PLACEMENT_RULE_API_VERSION: &str = "apps.open-cluster-management.io/v1";

pub const CATEGORIES_ANNOTATION: &str = "policy.open-cluster-management.io/categories";
pub const CONTROLS_ANNOTATION: &str = "policy.open-cluster-management.io/controls";
pub const STANDARDS_ANNOTATION: &str = "policy.open-cluster-management.io/standards";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObjectMeta {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ObjectMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn namespaced(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }
}

// ── Policy ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    pub spec: PolicySpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy_policy_metadata: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<PolicyDependency>,
    pub disabled: bool,
    #[serde(rename = "policy-templates")]
    pub policy_templates: Vec<PolicyTemplate>,
}

/// One entry of a Policy's `policy-templates`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTemplate {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_dependencies: Vec<PolicyDependency>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ignore_pending: bool,
    pub object_definition: ObjectDefinition,
}

impl PolicyTemplate {
    pub fn new(object_definition: ObjectDefinition) -> Self {
        Self {
            extra_dependencies: Vec::new(),
            ignore_pending: false,
            object_definition,
        }
    }
}

/// The policy object a template wraps: either generated or taken verbatim
/// from a manifest that already is a policy-engine object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ObjectDefinition {
    Configuration(ConfigurationPolicy),
    Raw(Mapping),
}

impl ObjectDefinition {
    pub fn api_version(&self) -> &str {
        match self {
            ObjectDefinition::Configuration(policy) => policy.api_version,
            ObjectDefinition::Raw(object) => object.api_version(),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            ObjectDefinition::Configuration(policy) => policy.kind,
            ObjectDefinition::Raw(object) => object.kind(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ObjectDefinition::Configuration(policy) => &policy.metadata.name,
            ObjectDefinition::Raw(object) => object.name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationPolicy {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    pub spec: ConfigurationPolicySpec,
}

impl ConfigurationPolicy {
    pub fn new(name: impl Into<String>, spec: ConfigurationPolicySpec) -> Self {
        Self {
            api_version: POLICY_API_VERSION,
            kind: "ConfigurationPolicy",
            metadata: ObjectMeta::named(name),
            spec,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationPolicySpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation_interval: Option<EvaluationInterval>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<NamespaceSelector>,
    #[serde(rename = "object-templates")]
    pub object_templates: Vec<ObjectTemplate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prune_object_behavior: Option<String>,
    pub remediation_action: String,
    pub severity: String,
}

/// One desired-state check inside a ConfigurationPolicy.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectTemplate {
    pub compliance_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_compliance_type: Option<String>,
    pub object_definition: Mapping,
}

// ── PolicySet ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySet {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    pub spec: PolicySetSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PolicySetSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub policies: Vec<String>,
}

// ── Placements ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    pub spec: PlacementSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlacementSpec {
    pub predicates: Vec<PlacementPredicate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementPredicate {
    pub required_cluster_selector: RequiredClusterSelector,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredClusterSelector {
    pub label_selector: LabelSelector,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementRule {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    pub spec: PlacementRuleSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementRuleSpec {
    pub cluster_conditions: Vec<ClusterCondition>,
    pub cluster_selector: LabelSelector,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterCondition {
    pub status: String,
    #[serde(rename = "type")]
    pub condition_type: String,
}

impl ClusterCondition {
    pub fn available() -> Self {
        Self {
            status: "True".to_string(),
            condition_type: "ManagedClusterConditionAvailable".to_string(),
        }
    }
}

// ── PlacementBinding ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementBinding {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    pub placement_ref: TypedRef,
    pub subjects: Vec<TypedRef>,
}

/// A reference to an object by API group, kind, and name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedRef {
    pub api_group: &'static str,
    pub kind: &'static str,
    pub name: String,
}

impl TypedRef {
    pub fn policy(name: impl Into<String>) -> Self {
        Self {
            api_group: POLICY_GROUP,
            kind: "Policy",
            name: name.into(),
        }
    }

    pub fn policy_set(name: impl Into<String>) -> Self {
        Self {
            api_group: POLICY_GROUP,
            kind: "PolicySet",
            name: name.into(),
        }
    }

    pub fn placement(name: impl Into<String>) -> Self {
        Self {
            api_group: PLACEMENT_GROUP,
            kind: "Placement",
            name: name.into(),
        }
    }

    pub fn placement_rule(name: impl Into<String>) -> Self {
        Self {
            api_group: PLACEMENT_RULE_GROUP,
            kind: "PlacementRule",
            name: name.into(),
        }
    }
}

// ── Output stream ───────────────────────────────────────────────

/// Any document in the generated output stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resource {
    Policy(Policy),
    PolicySet(PolicySet),
    Placement(Placement),
    PlacementRule(PlacementRule),
    /// A placement read from disk, emitted as written.
    Loaded(Mapping),
    PlacementBinding(PlacementBinding),
}

impl Resource {
    pub fn kind(&self) -> &str {
        match self {
            Resource::Policy(r) => r.kind,
            Resource::PolicySet(r) => r.kind,
            Resource::Placement(r) => r.kind,
            Resource::PlacementRule(r) => r.kind,
            Resource::Loaded(r) => r.kind(),
            Resource::PlacementBinding(r) => r.kind,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Resource::Policy(r) => &r.metadata.name,
            Resource::PolicySet(r) => &r.metadata.name,
            Resource::Placement(r) => &r.metadata.name,
            Resource::PlacementRule(r) => &r.metadata.name,
            Resource::Loaded(r) => r.name(),
            Resource::PlacementBinding(r) => &r.metadata.name,
        }
    }
}
