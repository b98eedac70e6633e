// validate.rs — Semantic validation of a defaulted configuration tree.
//
// Runs after the defaulting pass and before anything is generated, so a run
// either fails here with a message naming the offending entry or produces
// complete output. Checks stop at the first problem found.

use std::collections::BTreeSet;

use regex::Regex;

use crate::config::{
    GeneratorConfig, LabelSelector, ManifestConfig, PlacementConfig, PolicyConfig, TemplateOptions,
};
use crate::error::{GeneratorError, Result};
use crate::loader::ManifestLoader;

/// Longest `<namespace>.<name>` a generated Policy may have.
pub const MAX_QUALIFIED_NAME_LENGTH: usize = 63;

const COMPLIANCE_TYPES: &[&str] = &["musthave", "mustnothave", "mustonlyhave"];
const REMEDIATION_ACTIONS: &[&str] = &["inform", "enforce"];
const SEVERITIES: &[&str] = &["low", "medium", "high", "critical"];
const PRUNE_BEHAVIORS: &[&str] = &["None", "DeleteIfCreated", "DeleteAll"];
const SELECTOR_OPERATORS: &[&str] = &["In", "NotIn", "Exists", "DoesNotExist"];

const DNS_SUBDOMAIN: &str =
    r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$";
const DURATION: &str = r"^(\d+(\.\d+)?(ns|us|µs|ms|s|m|h))+$";

/// Validate `config` against the filesystem rooted at the loader's base directory.
pub fn validate(config: &GeneratorConfig, loader: &ManifestLoader<'_>) -> Result<()> {
    Validator::new(config, loader)?.run()
}

fn invalid(message: impl Into<String>) -> GeneratorError {
    GeneratorError::Validation(message.into())
}

struct Validator<'a> {
    config: &'a GeneratorConfig,
    loader: &'a ManifestLoader<'a>,
    dns_subdomain: Regex,
    duration: Regex,
}

impl<'a> Validator<'a> {
    fn new(config: &'a GeneratorConfig, loader: &'a ManifestLoader<'a>) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                GeneratorError::Generation(format!("invalid built-in pattern {}: {}", pattern, e))
            })
        };
        Ok(Self {
            config,
            loader,
            dns_subdomain: compile(DNS_SUBDOMAIN)?,
            duration: compile(DURATION)?,
        })
    }

    fn run(&self) -> Result<()> {
        let config = self.config;
        if config.metadata.name.is_empty() {
            return Err(invalid("the PolicyGenerator must have a metadata.name"));
        }
        if config.policy_defaults.namespace.is_empty() {
            return Err(invalid(
                "policyDefaults.namespace is empty but it must be set",
            ));
        }
        if config.policies.is_empty() {
            return Err(invalid("policies is empty but it must be set"));
        }

        self.template_options(&config.policy_defaults.options.template, "policyDefaults")?;
        self.placement(
            config.policy_defaults.options.placement.as_ref(),
            "policyDefaults",
        )?;
        self.placement(
            config.policy_set_defaults.placement.as_ref(),
            "policySetDefaults",
        )?;

        let mut names = BTreeSet::new();
        for policy in &config.policies {
            self.policy(policy)?;
            if !names.insert(policy.name.as_str()) {
                return Err(invalid(format!(
                    "each policy must have a unique name set, but found a duplicate name: {}",
                    policy.name
                )));
            }
        }

        self.policy_sets(&names)?;
        self.derived_names()?;
        self.placement_family()
    }

    /// Placement and binding names that are known before generation must fit
    /// the ceiling too. Names minted while generating (`placement-<owner>`,
    /// numbered shared names) are checked when they are minted.
    fn derived_names(&self) -> Result<()> {
        let config = self.config;
        let namespace = config.policy_defaults.namespace.as_str();
        let binding_default = config.placement_binding_defaults.name.as_deref();
        if let Some(name) = binding_default {
            check_qualified_name(namespace, name, "placement binding")?;
        }

        let policies = config
            .policies
            .iter()
            .filter(|p| p.options.generate_policy_placement())
            .map(|p| (p.name.as_str(), p.options.placement.as_ref()));
        let sets = config
            .policy_sets
            .iter()
            .filter(|s| s.generate_policy_set_placement())
            .map(|s| (s.name.as_str(), s.placement.as_ref()));
        for (owner, placement) in policies.chain(sets) {
            if let Some(name) = placement.and_then(|p| p.name.as_deref()) {
                check_qualified_name(namespace, name, "placement")?;
            }
            if binding_default.is_none() {
                check_qualified_name(namespace, &format!("binding-{}", owner), "placement binding")?;
            }
        }
        Ok(())
    }

    fn policy(&self, policy: &PolicyConfig) -> Result<()> {
        if policy.name.is_empty() {
            return Err(invalid("each policy must have a name set, but did not find a name"));
        }
        self.object_name(&policy.name, "policy")?;

        let context = format!("policy {}", policy.name);
        let options = &policy.options;
        self.template_options(&options.template, &context)?;
        self.placement(options.placement.as_ref(), &context)?;
        self.dependencies(policy)?;

        if policy.manifests.is_empty() {
            return Err(invalid(format!(
                "each policy must have at least one manifest, but found none in policy {}",
                policy.name
            )));
        }
        for manifest in &policy.manifests {
            self.manifest(policy, manifest)?;
        }
        Ok(())
    }

    fn manifest(&self, policy: &PolicyConfig, manifest: &ManifestConfig) -> Result<()> {
        if manifest.path.is_empty() {
            return Err(invalid(format!(
                "each policy manifest entry must have path set, but did not find a path in policy {}",
                policy.name
            )));
        }
        self.readable(&manifest.path)?;

        let context = format!("the manifest {} in policy {}", manifest.path, policy.name);
        let mut resolved = manifest.options.clone();
        resolved.inherit(&policy.options.template);
        self.template_options(&resolved, &context)?;

        if policy.options.consolidate_manifests() {
            let policy_scoped = manifest.options.policy_scoped_fields_set();
            if !policy_scoped.is_empty() {
                return Err(invalid(format!(
                    "{} sets {}, which may only be set per manifest when consolidateManifests is false",
                    context,
                    policy_scoped.join(", ")
                )));
            }
        }

        if policy.options.order_manifests() && manifest.options.extra_dependencies.is_some() {
            return Err(invalid(format!(
                "{} may not specify extraDependencies when orderManifests is true",
                context
            )));
        }
        Ok(())
    }

    /// Ordering modes exclude explicit dependency lists.
    fn dependencies(&self, policy: &PolicyConfig) -> Result<()> {
        let options = &policy.options;
        let order_policies = self.config.policy_defaults.order_policies.unwrap_or(false);

        if order_policies && options.dependencies.as_ref().is_some_and(|d| !d.is_empty()) {
            return Err(invalid(format!(
                "policy {} may not specify dependencies when policyDefaults.orderPolicies is true",
                policy.name
            )));
        }

        if options.order_manifests() {
            if options.consolidate_manifests() {
                return Err(invalid(format!(
                    "policy {} may not set orderManifests when consolidateManifests is true",
                    policy.name
                )));
            }
            if options.template.extra_dependencies.is_some() {
                return Err(invalid(format!(
                    "policy {} may not specify extraDependencies when orderManifests is true",
                    policy.name
                )));
            }
        }

        let all = options
            .dependencies
            .iter()
            .flatten()
            .chain(options.template.extra_dependencies.iter().flatten())
            .chain(
                policy
                    .manifests
                    .iter()
                    .flat_map(|m| m.options.extra_dependencies.iter().flatten()),
            );
        for dependency in all {
            if dependency.name.is_empty() {
                return Err(invalid(format!(
                    "every dependency of policy {} must have a name",
                    policy.name
                )));
            }
        }
        Ok(())
    }

    fn template_options(&self, options: &TemplateOptions, context: &str) -> Result<()> {
        if let Some(value) = &options.compliance_type {
            one_of(value, COMPLIANCE_TYPES, "complianceType", context, false)?;
        }
        if let Some(value) = &options.metadata_compliance_type {
            one_of(value, COMPLIANCE_TYPES, "metadataComplianceType", context, false)?;
        }
        if let Some(value) = &options.remediation_action {
            one_of(value, REMEDIATION_ACTIONS, "remediationAction", context, true)?;
        }
        if let Some(value) = &options.severity {
            one_of(value, SEVERITIES, "severity", context, false)?;
        }
        if let Some(value) = &options.prune_object_behavior {
            one_of(value, PRUNE_BEHAVIORS, "pruneObjectBehavior", context, false)?;
            if value != "None" && !options.remediation_action().eq_ignore_ascii_case("enforce") {
                return Err(invalid(format!(
                    "{}: pruneObjectBehavior {} requires remediationAction to be enforce",
                    context, value
                )));
            }
        }
        if let Some(interval) = &options.evaluation_interval {
            for value in interval.compliant.iter().chain(interval.noncompliant.iter()) {
                if value != "never" && !self.duration.is_match(value) {
                    return Err(invalid(format!(
                        "{}: the evaluationInterval value {} is invalid; it must be never or a duration such as 10s or 1h30m",
                        context, value
                    )));
                }
            }
        }
        Ok(())
    }

    fn placement(&self, placement: Option<&PlacementConfig>, context: &str) -> Result<()> {
        let Some(placement) = placement else {
            return Ok(());
        };

        let mechanisms = placement.mechanisms();
        if mechanisms.len() > 1 {
            return Err(invalid(format!(
                "{} placement may not specify {} together",
                context,
                mechanisms.join(" and ")
            )));
        }
        if placement.name.is_some() {
            if let Some(mechanism) = mechanisms
                .iter()
                .find(|m| !matches!(**m, "clusterSelectors" | "labelSelector"))
            {
                return Err(invalid(format!(
                    "{} placement may not specify name and {} together; name only applies to clusterSelectors or labelSelector",
                    context, mechanism
                )));
            }
        }

        if let Some(selector) = &placement.label_selector {
            label_selector(selector, context)?;
        }
        for path in placement
            .placement_path
            .iter()
            .chain(placement.placement_rule_path.iter())
        {
            self.readable(path)?;
        }
        Ok(())
    }

    /// Placement and PlacementRule objects are never mixed in one run.
    fn placement_family(&self) -> Result<()> {
        let placements: Vec<&PlacementConfig> =
            crate::placement::all_placements(self.config).collect();
        let uses_rules = placements.iter().any(|p| p.uses_placement_rule());
        let uses_placements = placements.iter().any(|p| p.uses_placement());
        if uses_rules && uses_placements {
            return Err(invalid(
                "PlacementRule settings (clusterSelectors, placementRulePath, placementRuleName) \
                 may not be mixed with Placement settings (labelSelector, placementPath, placementName)",
            ));
        }
        Ok(())
    }

    fn policy_sets(&self, policy_names: &BTreeSet<&str>) -> Result<()> {
        let mut names = BTreeSet::new();
        for set in &self.config.policy_sets {
            if set.name.is_empty() {
                return Err(invalid("each policySet must have a name set, but did not find a name"));
            }
            self.object_name(&set.name, "policySet")?;
            if !names.insert(set.name.as_str()) {
                return Err(invalid(format!(
                    "each policySet must have a unique name set, but found a duplicate name: {}",
                    set.name
                )));
            }
            for member in &set.policies {
                if !policy_names.contains(member.as_str()) {
                    return Err(invalid(format!(
                        "policySet {} must specify policies defined in the configuration, but {} is not one of them",
                        set.name, member
                    )));
                }
            }
            self.placement(set.placement.as_ref(), &format!("policySet {}", set.name))?;
        }
        Ok(())
    }

    fn object_name(&self, name: &str, what: &str) -> Result<()> {
        if !self.dns_subdomain.is_match(name) {
            return Err(invalid(format!(
                "{} name {} is invalid; it must be a lowercase DNS-1123 subdomain",
                what, name
            )));
        }
        check_qualified_name(&self.config.policy_defaults.namespace, name, what)
    }

    fn readable(&self, path: &str) -> Result<()> {
        self.loader
            .resolve(path)
            .map(|_| ())
            .map_err(|e| invalid(format!("could not read the path {}: {}", path, e)))
    }
}

/// Reject an object whose `<namespace>.<name>` exceeds the ceiling.
pub(crate) fn check_qualified_name(namespace: &str, name: &str, what: &str) -> Result<()> {
    if namespace.len() + 1 + name.len() > MAX_QUALIFIED_NAME_LENGTH {
        return Err(invalid(format!(
            "the {} namespace and name cannot be more than {} characters: {}.{}",
            what, MAX_QUALIFIED_NAME_LENGTH, namespace, name
        )));
    }
    Ok(())
}

fn one_of(
    value: &str,
    allowed: &[&str],
    field: &str,
    context: &str,
    ignore_case: bool,
) -> Result<()> {
    let matches = allowed.iter().any(|candidate| {
        if ignore_case {
            candidate.eq_ignore_ascii_case(value)
        } else {
            *candidate == value
        }
    });
    if matches {
        Ok(())
    } else {
        Err(invalid(format!(
            "{}: {} must be one of {}, but got {}",
            context,
            field,
            allowed.join(", "),
            value
        )))
    }
}

fn label_selector(selector: &LabelSelector, context: &str) -> Result<()> {
    for requirement in selector.match_expressions.iter().flatten() {
        if !SELECTOR_OPERATORS.contains(&requirement.operator.as_str()) {
            return Err(invalid(format!(
                "{}: labelSelector operator {} for key {} must be one of {}",
                context,
                requirement.operator,
                requirement.key,
                SELECTOR_OPERATORS.join(", ")
            )));
        }
        let needs_values = matches!(requirement.operator.as_str(), "In" | "NotIn");
        if needs_values == requirement.values.is_empty() {
            return Err(invalid(format!(
                "{}: labelSelector operator {} for key {} {}",
                context,
                requirement.operator,
                requirement.key,
                if needs_values {
                    "requires at least one value"
                } else {
                    "may not have values"
                }
            )));
        }
    }
    Ok(())
}
