// gatekeeper.rs — Inform templates for Gatekeeper constraints.
//
// Two templates per constraint: the audit check requires the constraint to
// report zero violations, the admission check requires that no denial event
// for the constraint exists in the Gatekeeper namespace.

use serde_yaml::Value;

use super::Expander;
use crate::config::PolicyConfig;
use crate::object::{mapping, Manifest, ObjectExt};
use crate::resources::{
    ConfigurationPolicy, ConfigurationPolicySpec, ObjectDefinition, ObjectTemplate, PolicyTemplate,
};

pub const CONSTRAINTS_GROUP: &str = "constraints.gatekeeper.sh";
pub const TEMPLATES_GROUP: &str = "templates.gatekeeper.sh";
const EVENT_NAMESPACE: &str = "openshift-gatekeeper-system";

/// Whether `manifest` is a Gatekeeper constraint or ConstraintTemplate.
///
/// With Gatekeeper informing turned off these are embedded in a Policy
/// as-is instead of being wrapped in a ConfigurationPolicy.
pub fn is_gatekeeper_object(manifest: &Manifest) -> bool {
    match manifest.api_group() {
        CONSTRAINTS_GROUP => true,
        TEMPLATES_GROUP => manifest.kind() == "ConstraintTemplate",
        _ => false,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GatekeeperExpander;

impl Expander for GatekeeperExpander {
    fn name(&self) -> &str {
        "gatekeeper"
    }

    fn can_handle(&self, manifest: &Manifest) -> bool {
        manifest.api_group() == CONSTRAINTS_GROUP
            && !manifest.kind().is_empty()
            && !manifest.name().is_empty()
    }

    fn enabled(&self, policy: &PolicyConfig) -> bool {
        policy.options.inform_gatekeeper_policies()
    }

    fn expand(&self, manifest: &Manifest, severity: &str) -> Vec<PolicyTemplate> {
        let name = manifest.name();
        let kind = manifest.kind();

        let audit = mapping([
            ("apiVersion", Value::from(manifest.api_version())),
            ("kind", Value::from(kind)),
            ("metadata", Value::Mapping(mapping([("name", Value::from(name))]))),
            (
                "status",
                Value::Mapping(mapping([("totalViolations", Value::from(0))])),
            ),
        ]);

        let admission = mapping([
            ("apiVersion", Value::from("v1")),
            ("kind", Value::from("Event")),
            (
                "metadata",
                Value::Mapping(mapping([
                    ("namespace", Value::from(EVENT_NAMESPACE)),
                    (
                        "annotations",
                        Value::Mapping(mapping([
                            ("constraint_action", Value::from("deny")),
                            ("constraint_kind", Value::from(kind)),
                            ("constraint_name", Value::from(name)),
                            ("event_type", Value::from("violation")),
                        ])),
                    ),
                ])),
            ),
        ]);

        vec![
            inform_template(format!("inform-gatekeeper-audit-{}", name), "musthave", audit, severity),
            inform_template(
                format!("inform-gatekeeper-admission-{}", name),
                "mustnothave",
                admission,
                severity,
            ),
        ]
    }
}

fn inform_template(
    name: String,
    compliance_type: &str,
    object: Manifest,
    severity: &str,
) -> PolicyTemplate {
    let spec = ConfigurationPolicySpec {
        object_templates: vec![ObjectTemplate {
            compliance_type: compliance_type.to_string(),
            metadata_compliance_type: None,
            object_definition: object,
        }],
        remediation_action: "inform".to_string(),
        severity: severity.to_string(),
        ..Default::default()
    };
    PolicyTemplate::new(ObjectDefinition::Configuration(ConfigurationPolicy::new(
        name, spec,
    )))
}
