// defaults.rs — The defaulting pass over a freshly parsed configuration tree.
//
// Runs exactly once, before validation. Afterwards every policy carries its
// fully resolved policy-level options; manifest-level options are left as
// written so validation can still tell which ones were set explicitly (the
// template builder resolves them against the policy at generation time).

use crate::config::{
    inherit, GeneratorConfig, PolicyConfig, PolicyDependency, PolicyOptions, PolicySetConfig,
    TemplateOptions, DEFAULT_CATEGORIES, DEFAULT_COMPLIANCE_TYPE, DEFAULT_CONTROLS,
    DEFAULT_REMEDIATION_ACTION, DEFAULT_SEVERITY, DEFAULT_STANDARDS,
};
use crate::resources::POLICY_API_VERSION;

pub const POLICY_KIND: &str = "Policy";
pub const COMPLIANT: &str = "Compliant";

/// Resolve every inheritable setting in `config` in place.
pub fn apply_defaults(config: &mut GeneratorConfig) {
    normalize_empty_strings(config);

    let namespace = config.policy_defaults.namespace.clone();
    let defaults = &mut config.policy_defaults.options;
    fill_builtin_defaults(defaults);
    let defaults = defaults.clone();

    for policy in &mut config.policies {
        inherit_policy_options(&mut policy.options, &defaults);
        default_dependencies(policy, &namespace);
    }

    let set_defaults = config.policy_set_defaults.clone();
    for set in &mut config.policy_sets {
        if set.placement.as_ref().map_or(true, |p| p.is_empty()) {
            set.placement.clone_from(&set_defaults.placement);
        }
        inherit(
            &mut set.generate_policy_set_placement,
            &set_defaults.generate_policy_set_placement,
        );
    }

    reconcile_policy_sets(config);

    tracing::debug!(
        policies = config.policies.len(),
        policy_sets = config.policy_sets.len(),
        "applied configuration defaults"
    );
}

fn fill_builtin_defaults(defaults: &mut PolicyOptions) {
    let strings = |values: &[&str]| Some(values.iter().map(|v| v.to_string()).collect());
    if defaults.categories.is_none() {
        defaults.categories = strings(DEFAULT_CATEGORIES);
    }
    if defaults.controls.is_none() {
        defaults.controls = strings(DEFAULT_CONTROLS);
    }
    if defaults.standards.is_none() {
        defaults.standards = strings(DEFAULT_STANDARDS);
    }
    defaults.consolidate_manifests.get_or_insert(true);
    defaults.disabled.get_or_insert(false);
    defaults.inform_gatekeeper_policies.get_or_insert(true);
    defaults.inform_kyverno_policies.get_or_insert(true);
    defaults.generate_policy_placement.get_or_insert(true);

    let template = &mut defaults.template;
    template
        .compliance_type
        .get_or_insert_with(|| DEFAULT_COMPLIANCE_TYPE.to_string());
    template
        .remediation_action
        .get_or_insert_with(|| DEFAULT_REMEDIATION_ACTION.to_string());
    template
        .severity
        .get_or_insert_with(|| DEFAULT_SEVERITY.to_string());
}

fn inherit_policy_options(policy: &mut PolicyOptions, defaults: &PolicyOptions) {
    inherit(&mut policy.categories, &defaults.categories);
    inherit(&mut policy.controls, &defaults.controls);
    inherit(&mut policy.standards, &defaults.standards);
    inherit(
        &mut policy.consolidate_manifests,
        &defaults.consolidate_manifests,
    );
    inherit(&mut policy.copy_policy_metadata, &defaults.copy_policy_metadata);
    inherit(&mut policy.disabled, &defaults.disabled);
    inherit(
        &mut policy.inform_gatekeeper_policies,
        &defaults.inform_gatekeeper_policies,
    );
    inherit(
        &mut policy.inform_kyverno_policies,
        &defaults.inform_kyverno_policies,
    );
    inherit(&mut policy.order_manifests, &defaults.order_manifests);
    inherit(&mut policy.dependencies, &defaults.dependencies);
    inherit(&mut policy.policy_annotations, &defaults.policy_annotations);
    inherit(&mut policy.policy_labels, &defaults.policy_labels);
    inherit(
        &mut policy.configuration_policy_annotations,
        &defaults.configuration_policy_annotations,
    );
    inherit(&mut policy.policy_sets, &defaults.policy_sets);
    inherit(
        &mut policy.generate_policy_placement,
        &defaults.generate_policy_placement,
    );

    // A policy that names any placement field owns its placement outright.
    if policy.placement.as_ref().map_or(true, |p| p.is_empty()) {
        policy.placement.clone_from(&defaults.placement);
    }

    policy.template.inherit(&defaults.template);
}

/// Fill the omitted parts of every dependency: a `Compliant` Policy in the
/// generator's namespace.
fn default_dependencies(policy: &mut PolicyConfig, namespace: &str) {
    let options = &mut policy.options;
    let manifest_level = policy
        .manifests
        .iter_mut()
        .flat_map(|m| m.options.extra_dependencies.iter_mut().flatten());
    options
        .dependencies
        .iter_mut()
        .flatten()
        .chain(options.template.extra_dependencies.iter_mut().flatten())
        .chain(manifest_level)
        .for_each(|dependency| complete_dependency(dependency, namespace));
}

fn complete_dependency(dependency: &mut PolicyDependency, namespace: &str) {
    let api_version = dependency
        .api_version
        .get_or_insert_with(|| POLICY_API_VERSION.to_string());
    let is_policy_api = *api_version == POLICY_API_VERSION;
    let kind = dependency
        .kind
        .get_or_insert_with(|| POLICY_KIND.to_string());
    if dependency.namespace.is_none() && is_policy_api && *kind == POLICY_KIND {
        dependency.namespace = Some(namespace.to_string());
    }
    dependency
        .compliance
        .get_or_insert_with(|| COMPLIANT.to_string());
}

/// Make policy-set membership consistent in both directions.
fn reconcile_policy_sets(config: &mut GeneratorConfig) {
    for policy in &config.policies {
        for set_name in policy.options.policy_sets.iter().flatten() {
            let index = match config.policy_sets.iter().position(|s| &s.name == set_name) {
                Some(index) => index,
                None => {
                    let mut set = PolicySetConfig {
                        name: set_name.clone(),
                        ..Default::default()
                    };
                    set.placement.clone_from(&config.policy_set_defaults.placement);
                    set.generate_policy_set_placement =
                        config.policy_set_defaults.generate_policy_set_placement;
                    config.policy_sets.push(set);
                    config.policy_sets.len() - 1
                }
            };
            push_unique(&mut config.policy_sets[index].policies, &policy.name);
        }
    }

    for set in &config.policy_sets {
        for member in &set.policies {
            if let Some(policy) = config.policies.iter_mut().find(|p| &p.name == member) {
                push_unique(
                    policy.options.policy_sets.get_or_insert_with(Vec::new),
                    &set.name,
                );
            }
        }
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|existing| existing == value) {
        list.push(value.to_string());
    }
}

/// Treat an explicitly empty string as "not set" so it inherits.
fn normalize_empty_strings(config: &mut GeneratorConfig) {
    fn clear(value: &mut Option<String>) {
        if value.as_deref().is_some_and(str::is_empty) {
            *value = None;
        }
    }
    fn clear_template(options: &mut TemplateOptions) {
        clear(&mut options.compliance_type);
        clear(&mut options.metadata_compliance_type);
        clear(&mut options.prune_object_behavior);
        clear(&mut options.remediation_action);
        clear(&mut options.severity);
        if let Some(interval) = options.evaluation_interval.as_mut() {
            clear(&mut interval.compliant);
            clear(&mut interval.noncompliant);
        }
    }

    clear(&mut config.placement_binding_defaults.name);
    clear_template(&mut config.policy_defaults.options.template);
    for policy in &mut config.policies {
        clear_template(&mut policy.options.template);
        for manifest in &mut policy.manifests {
            clear_template(&mut manifest.options);
        }
    }
    let placements = config
        .policy_defaults
        .options
        .placement
        .iter_mut()
        .chain(config.policy_set_defaults.placement.iter_mut())
        .chain(
            config
                .policies
                .iter_mut()
                .flat_map(|p| p.options.placement.iter_mut()),
        )
        .chain(
            config
                .policy_sets
                .iter_mut()
                .flat_map(|s| s.placement.iter_mut()),
        );
    for placement in placements {
        clear(&mut placement.name);
        clear(&mut placement.placement_path);
        clear(&mut placement.placement_rule_path);
        clear(&mut placement.placement_name);
        clear(&mut placement.placement_rule_name);
    }
}
