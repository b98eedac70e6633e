// templates.rs — Turning loaded manifests into a Policy's policy-templates.
//
// Each manifest reference of a policy becomes a `ManifestGroup`: the loaded
// and patched documents plus the template options resolved for that
// reference (manifest level over policy level). The builder then sorts every
// document into one of two buckets:
//
//   - policy-engine objects (ConfigurationPolicy, CertificatePolicy, and, with
//     Gatekeeper informing off, Gatekeeper constraints) are embedded as their
//     own policy-template
//   - everything else becomes an object-template inside a generated
//     ConfigurationPolicy, one per policy when consolidating or one per
//     manifest reference otherwise
//
// Expander output is appended after all of the above.

use serde_yaml::{Mapping, Value};

use crate::config::{PolicyConfig, PolicyDependency, PolicyOptions, TemplateOptions};
use crate::defaults::COMPLIANT;
use crate::error::{GeneratorError, Result};
use crate::expanders::gatekeeper::is_gatekeeper_object;
use crate::expanders::ExpanderRegistry;
use crate::loader::ManifestLoader;
use crate::object::{strip_build_annotations, Manifest, ObjectExt};
use crate::patch::ManifestPatcher;
use crate::resources::{
    ConfigurationPolicy, ConfigurationPolicySpec, ObjectDefinition, ObjectTemplate, PolicyTemplate,
    POLICY_GROUP,
};

/// Kinds in the policy API group that may never appear inside a Policy.
const FORBIDDEN_POLICY_KINDS: &[&str] = &["Policy", "PolicySet", "PlacementBinding"];

/// The documents behind one manifest reference of a policy.
#[derive(Debug, Clone)]
pub struct ManifestGroup {
    /// The configured path, for messages.
    pub path: String,
    /// Template options with manifest-level values over policy-level ones.
    pub options: TemplateOptions,
    pub manifests: Vec<Manifest>,
}

/// Load and patch every manifest reference of `policy`, in order.
pub fn load_manifest_groups(
    policy: &PolicyConfig,
    loader: &ManifestLoader<'_>,
) -> Result<Vec<ManifestGroup>> {
    let mut groups = Vec::with_capacity(policy.manifests.len());
    for manifest in &policy.manifests {
        let mut loaded = loader.load(&manifest.path)?;
        if !manifest.patches.is_empty() {
            loaded = ManifestPatcher::new(&manifest.path, loaded, manifest.patches.clone())
                .validate()?
                .apply_patches()?;
        }
        tracing::debug!(
            policy = %policy.name,
            path = %manifest.path,
            documents = loaded.len(),
            "loaded manifest group"
        );

        let mut options = manifest.options.clone();
        options.inherit(&policy.options.template);
        groups.push(ManifestGroup {
            path: manifest.path.clone(),
            options,
            manifests: loaded,
        });
    }
    Ok(groups)
}

/// Build the ordered policy-templates of `policy` from its manifest groups.
pub fn build_policy_templates(
    policy: &PolicyConfig,
    groups: &[ManifestGroup],
    expanders: &ExpanderRegistry,
) -> Result<Vec<PolicyTemplate>> {
    let options = &policy.options;
    let consolidate = options.consolidate_manifests();

    let mut templates = Vec::new();
    let mut consolidated = Vec::new();
    let mut configuration_policies = 0;

    for group in groups {
        let mut object_templates = Vec::new();
        for manifest in &group.manifests {
            if embeds_directly(manifest, options, &group.path)? {
                templates.push(embedded_template(manifest, &group.options));
            } else {
                object_templates.push(object_template(manifest, &group.options));
            }
        }

        if consolidate {
            consolidated.extend(object_templates);
        } else if !object_templates.is_empty() {
            configuration_policies += 1;
            templates.push(configuration_template(
                numbered(&policy.name, configuration_policies),
                object_templates,
                &group.options,
                options,
            ));
        }
    }

    if !consolidated.is_empty() {
        templates.push(configuration_template(
            policy.name.clone(),
            consolidated,
            &options.template,
            options,
        ));
    }

    for group in groups {
        for manifest in &group.manifests {
            templates.extend(expanders.expand(manifest, policy, group.options.severity()));
        }
    }

    if templates.is_empty() {
        return Err(GeneratorError::Generation(format!(
            "policy {} must generate at least one policy template, but its manifests produced none",
            policy.name
        )));
    }

    if options.order_manifests() {
        chain_templates(&mut templates);
    }

    Ok(templates)
}

/// Whether `manifest` is a policy-engine object to embed as-is.
///
/// Fails for the kinds that wrap policies rather than being one.
fn embeds_directly(manifest: &Manifest, options: &PolicyOptions, path: &str) -> Result<bool> {
    if manifest.api_group() == POLICY_GROUP {
        if FORBIDDEN_POLICY_KINDS.contains(&manifest.kind()) {
            return Err(GeneratorError::Validation(format!(
                "providing a root {} kind is not supported; found {} in the manifest path {}",
                manifest.kind(),
                manifest.name(),
                path
            )));
        }
        if manifest.kind().ends_with("Policy") {
            return Ok(true);
        }
    }
    Ok(!options.inform_gatekeeper_policies() && is_gatekeeper_object(manifest))
}

/// A policy-engine object as its own template. Policy API objects receive
/// the remediation action and severity when they do not set their own.
fn embedded_template(manifest: &Manifest, options: &TemplateOptions) -> PolicyTemplate {
    let mut object = manifest.clone();
    strip_build_annotations(&mut object);

    if object.api_group() == POLICY_GROUP {
        if let Some(Value::Mapping(spec)) = object.get_mut("spec") {
            fill_if_absent(
                spec,
                "remediationAction",
                &options.remediation_action().to_lowercase(),
            );
            fill_if_absent(spec, "severity", options.severity());
        }
    }

    let mut template = PolicyTemplate::new(ObjectDefinition::Raw(object));
    apply_template_options(&mut template, options);
    template
}

fn fill_if_absent(map: &mut Mapping, key: &str, value: &str) {
    if !map.contains_key(key) {
        map.insert(Value::from(key), Value::from(value));
    }
}

fn object_template(manifest: &Manifest, options: &TemplateOptions) -> ObjectTemplate {
    let mut object = manifest.clone();
    strip_build_annotations(&mut object);
    ObjectTemplate {
        compliance_type: options.compliance_type().to_string(),
        metadata_compliance_type: options.metadata_compliance_type.clone(),
        object_definition: object,
    }
}

fn configuration_template(
    name: String,
    object_templates: Vec<ObjectTemplate>,
    options: &TemplateOptions,
    policy_options: &PolicyOptions,
) -> PolicyTemplate {
    let spec = ConfigurationPolicySpec {
        evaluation_interval: options
            .evaluation_interval
            .clone()
            .filter(|i| i.compliant.is_some() || i.noncompliant.is_some()),
        namespace_selector: options.namespace_selector.clone(),
        object_templates,
        prune_object_behavior: options.prune_object_behavior.clone(),
        remediation_action: options.remediation_action().to_lowercase(),
        severity: options.severity().to_string(),
    };

    let mut policy = ConfigurationPolicy::new(name, spec);
    if let Some(annotations) = &policy_options.configuration_policy_annotations {
        policy.metadata.annotations = annotations.clone();
    }

    let mut template = PolicyTemplate::new(ObjectDefinition::Configuration(policy));
    apply_template_options(&mut template, options);
    template
}

fn apply_template_options(template: &mut PolicyTemplate, options: &TemplateOptions) {
    template.extra_dependencies = options.extra_dependencies.clone().unwrap_or_default();
    template.ignore_pending = options.ignore_pending.unwrap_or(false);
}

/// Make every template depend on the one before it.
fn chain_templates(templates: &mut [PolicyTemplate]) {
    for index in 1..templates.len() {
        let previous = &templates[index - 1].object_definition;
        let dependency = PolicyDependency {
            api_version: Some(previous.api_version().to_string()),
            compliance: Some(COMPLIANT.to_string()),
            kind: Some(previous.kind().to_string()),
            name: previous.name().to_string(),
            namespace: None,
        };
        templates[index].extra_dependencies = vec![dependency];
    }
}

/// `base` for the first item, then `base2`, `base3`, ...
pub(crate) fn numbered(base: &str, position: usize) -> String {
    if position <= 1 {
        base.to_string()
    } else {
        format!("{}{}", base, position)
    }
}
