// kyverno.rs — Inform templates for Kyverno policies.
//
// A Kyverno ClusterPolicy or Policy records its verdicts in policy reports.
// The generated template is non-compliant whenever any report carries a
// failing result for the policy.

use serde_yaml::Value;

use super::Expander;
use crate::config::{NamespaceSelector, PolicyConfig};
use crate::object::{mapping, Manifest, ObjectExt};
use crate::resources::{
    ConfigurationPolicy, ConfigurationPolicySpec, ObjectDefinition, ObjectTemplate, PolicyTemplate,
};

const KYVERNO_GROUP: &str = "kyverno.io";
const KYVERNO_KINDS: &[&str] = &["ClusterPolicy", "Policy"];
const REPORT_API_VERSION: &str = "wgpolicyk8s.io/v1alpha2";
const REPORT_KINDS: &[&str] = &["ClusterPolicyReport", "PolicyReport"];

#[derive(Debug, Default, Clone, Copy)]
pub struct KyvernoExpander;

impl Expander for KyvernoExpander {
    fn name(&self) -> &str {
        "kyverno"
    }

    fn can_handle(&self, manifest: &Manifest) -> bool {
        manifest.api_group() == KYVERNO_GROUP
            && KYVERNO_KINDS.contains(&manifest.kind())
            && !manifest.name().is_empty()
    }

    fn enabled(&self, policy: &PolicyConfig) -> bool {
        policy.options.inform_kyverno_policies()
    }

    fn expand(&self, manifest: &Manifest, severity: &str) -> Vec<PolicyTemplate> {
        let policy_name = manifest.name();
        let object_templates = REPORT_KINDS
            .iter()
            .map(|kind| ObjectTemplate {
                compliance_type: "mustnothave".to_string(),
                metadata_compliance_type: None,
                object_definition: mapping([
                    ("apiVersion", Value::from(REPORT_API_VERSION)),
                    ("kind", Value::from(*kind)),
                    (
                        "results",
                        Value::Sequence(vec![Value::Mapping(mapping([
                            ("policy", Value::from(policy_name)),
                            ("result", Value::from("fail")),
                        ]))]),
                    ),
                ]),
            })
            .collect();

        let spec = ConfigurationPolicySpec {
            namespace_selector: Some(NamespaceSelector {
                exclude: vec!["kube-*".to_string()],
                include: vec!["*".to_string()],
                ..Default::default()
            }),
            object_templates,
            remediation_action: "inform".to_string(),
            severity: severity.to_string(),
            ..Default::default()
        };

        vec![PolicyTemplate::new(ObjectDefinition::Configuration(
            ConfigurationPolicy::new(format!("inform-kyverno-{}", policy_name), spec),
        ))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(yaml: &str) -> Manifest {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn handles_cluster_and_namespaced_policies() {
        let expander = KyvernoExpander;
        assert!(expander.can_handle(&manifest(
            "apiVersion: kyverno.io/v1\nkind: ClusterPolicy\nmetadata:\n  name: a\n"
        )));
        assert!(expander.can_handle(&manifest(
            "apiVersion: kyverno.io/v1\nkind: Policy\nmetadata:\n  name: a\n"
        )));
        assert!(!expander.can_handle(&manifest(
            "apiVersion: kyverno.io/v1\nkind: PolicyException\nmetadata:\n  name: a\n"
        )));
        assert!(!expander.can_handle(&manifest(
            "apiVersion: kyverno.io/v1\nkind: ClusterPolicy\nmetadata: {}\n"
        )));
    }

    #[test]
    fn expands_to_two_report_checks() {
        let templates = KyvernoExpander.expand(
            &manifest("apiVersion: kyverno.io/v1\nkind: ClusterPolicy\nmetadata:\n  name: require-labels\n"),
            "medium",
        );
        assert_eq!(templates.len(), 1);
        let ObjectDefinition::Configuration(policy) = &templates[0].object_definition else {
            panic!("expected a ConfigurationPolicy");
        };
        assert_eq!(policy.metadata.name, "inform-kyverno-require-labels");
        assert_eq!(policy.spec.severity, "medium");
        assert_eq!(policy.spec.remediation_action, "inform");

        let kinds: Vec<&str> = policy
            .spec
            .object_templates
            .iter()
            .map(|t| t.object_definition.kind())
            .collect();
        assert_eq!(kinds, vec!["ClusterPolicyReport", "PolicyReport"]);
        assert!(policy
            .spec
            .object_templates
            .iter()
            .all(|t| t.compliance_type == "mustnothave"));
    }
}
