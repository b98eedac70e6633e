// placement.rs — Resolving placement specifications to placement objects.
//
// Generated placements are deduplicated by a canonical key derived from
// their selector, so policies that select the same clusters share one
// placement. Names are 1:1 with selectors: asking for an existing name with
// a different selector is an error rather than a silent overwrite.
//
// Naming, in order of precedence:
//   1. an explicit `placement.name` is used as-is
//   2. an already generated placement with the same selector is reused
//   3. a shared default name (from policyDefaults/policySetDefaults) is
//      used, numbered `<name>2`, `<name>3`, ... for each further selector
//   4. otherwise `placement-<owner>`

use std::collections::BTreeMap;

use crate::config::{GeneratorConfig, LabelSelector, LabelSelectorRequirement, PlacementConfig};
use crate::context::GenerationContext;
use crate::error::{GeneratorError, Result};
use crate::loader::ManifestLoader;
use crate::object::{strip_build_annotations, ObjectExt};
use crate::resources::{
    ClusterCondition, ObjectMeta, Placement, PlacementPredicate, PlacementRule, PlacementRuleSpec,
    PlacementSpec, RequiredClusterSelector, Resource, TypedRef, PLACEMENT_API_VERSION,
    PLACEMENT_RULE_API_VERSION,
};
use crate::templates::numbered;
use crate::validate::check_qualified_name;

/// The two placement API families. A run uses only one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementFamily {
    Placement,
    PlacementRule,
}

impl PlacementFamily {
    /// The legacy PlacementRule family when any placement in the tree asks
    /// for it, the Placement family otherwise.
    pub fn for_config(config: &GeneratorConfig) -> Self {
        let uses_rules = all_placements(config).any(PlacementConfig::uses_placement_rule);
        if uses_rules {
            PlacementFamily::PlacementRule
        } else {
            PlacementFamily::Placement
        }
    }

    pub fn kind(self) -> &'static str {
        match self {
            PlacementFamily::Placement => "Placement",
            PlacementFamily::PlacementRule => "PlacementRule",
        }
    }

    fn other(self) -> Self {
        match self {
            PlacementFamily::Placement => PlacementFamily::PlacementRule,
            PlacementFamily::PlacementRule => PlacementFamily::Placement,
        }
    }

    fn reference(self, name: impl Into<String>) -> TypedRef {
        match self {
            PlacementFamily::Placement => TypedRef::placement(name),
            PlacementFamily::PlacementRule => TypedRef::placement_rule(name),
        }
    }
}

/// Every placement specification in the tree, defaults included.
pub(crate) fn all_placements(config: &GeneratorConfig) -> impl Iterator<Item = &PlacementConfig> {
    config
        .policy_defaults
        .options
        .placement
        .iter()
        .chain(config.policy_set_defaults.placement.iter())
        .chain(
            config
                .policies
                .iter()
                .filter_map(|p| p.options.placement.as_ref()),
        )
        .chain(config.policy_sets.iter().filter_map(|s| s.placement.as_ref()))
}

/// Who a placement is being resolved for.
#[derive(Debug, Clone, Copy)]
pub struct PlacementOwner<'a> {
    /// Policy or policy set name, used for the `placement-<owner>` name.
    pub name: &'a str,
    /// The default placement name this owner inherited, if any.
    pub shared_name: Option<&'a str>,
}

pub struct PlacementResolver<'a> {
    loader: &'a ManifestLoader<'a>,
    namespace: &'a str,
    family: PlacementFamily,
}

impl<'a> PlacementResolver<'a> {
    pub fn new(loader: &'a ManifestLoader<'a>, namespace: &'a str, family: PlacementFamily) -> Self {
        Self {
            loader,
            namespace,
            family,
        }
    }

    /// Resolve `spec` to the placement its owner binds to, emitting the
    /// placement into `ctx` the first time it is needed.
    pub fn resolve(
        &self,
        ctx: &mut GenerationContext,
        spec: Option<&PlacementConfig>,
        owner: PlacementOwner<'_>,
    ) -> Result<TypedRef> {
        let default_spec = PlacementConfig::default();
        let spec = spec.unwrap_or(&default_spec);

        if let Some(name) = &spec.placement_name {
            return Ok(reference_existing(ctx, name, PlacementFamily::Placement));
        }
        if let Some(name) = &spec.placement_rule_name {
            return Ok(reference_existing(ctx, name, PlacementFamily::PlacementRule));
        }
        if let Some(path) = &spec.placement_path {
            return self.load(ctx, path, PlacementFamily::Placement);
        }
        if let Some(path) = &spec.placement_rule_path {
            return self.load(ctx, path, PlacementFamily::PlacementRule);
        }
        self.generate(ctx, spec, owner)
    }

    fn load(
        &self,
        ctx: &mut GenerationContext,
        path: &str,
        family: PlacementFamily,
    ) -> Result<TypedRef> {
        let mut found = None;
        for document in self.loader.load(path)? {
            if document.kind() == family.kind() {
                found = Some(document);
                break;
            }
            if document.kind() == family.other().kind() {
                return Err(GeneratorError::Validation(format!(
                    "the placement manifest {} must be a {}, but it contains a {}",
                    path,
                    family.kind(),
                    family.other().kind()
                )));
            }
        }
        let Some(mut placement) = found else {
            return Err(GeneratorError::Validation(format!(
                "the placement manifest {} does not contain a {}",
                path,
                family.kind()
            )));
        };

        let name = placement.name().to_string();
        if name.is_empty() {
            return Err(GeneratorError::Validation(format!(
                "the {} in {} must have a metadata.name",
                family.kind(),
                path
            )));
        }
        if placement.namespace() != self.namespace {
            return Err(GeneratorError::Validation(format!(
                "the {} {} in {} must be in the {} namespace",
                family.kind(),
                name,
                path,
                self.namespace
            )));
        }

        check_qualified_name(self.namespace, &name, family.kind())?;

        let reference = family.reference(name.clone());
        if ctx.loaded.contains(&name) {
            return Ok(reference);
        }
        if ctx.selectors_by_name.contains_key(&name) {
            return Err(duplicate_name(&name));
        }

        strip_build_annotations(&mut placement);
        ctx.loaded.insert(name.clone());
        ctx.selectors_by_name
            .insert(name.clone(), format!("path:{}", path));
        ctx.emit_placement(Resource::Loaded(placement));
        Ok(reference)
    }

    fn generate(
        &self,
        ctx: &mut GenerationContext,
        spec: &PlacementConfig,
        owner: PlacementOwner<'_>,
    ) -> Result<TypedRef> {
        let (family, selector) = match (&spec.cluster_selectors, &spec.label_selector) {
            (Some(selectors), _) => (
                PlacementFamily::PlacementRule,
                cluster_selector(selectors),
            ),
            (None, Some(selector)) => (PlacementFamily::Placement, selector.clone()),
            (None, None) => (self.family, match_all()),
        };
        let key = selector_key(family, &selector)?;

        let explicit = spec.name.as_deref().filter(|n| Some(*n) != owner.shared_name);
        let shared = spec.name.as_deref().filter(|n| Some(*n) == owner.shared_name);

        let name = if let Some(name) = explicit {
            match ctx.selectors_by_name.get(name) {
                Some(existing) if *existing == key => return Ok(family.reference(name)),
                Some(_) => return Err(duplicate_name(name)),
                None => name.to_string(),
            }
        } else if let Some(existing) = ctx.names_by_selector.get(&key) {
            tracing::debug!(owner = owner.name, placement = %existing, "reusing placement");
            return Ok(family.reference(existing.clone()));
        } else if let Some(shared) = shared {
            (1..)
                .map(|n| numbered(shared, n))
                .find(|candidate| !ctx.selectors_by_name.contains_key(candidate))
                .unwrap_or_else(|| shared.to_string())
        } else {
            let name = format!("placement-{}", owner.name);
            if ctx.selectors_by_name.contains_key(&name) {
                return Err(duplicate_name(&name));
            }
            name
        };
        check_qualified_name(self.namespace, &name, "placement")?;

        let metadata = ObjectMeta::namespaced(name.clone(), self.namespace);
        let placement = match family {
            PlacementFamily::Placement => Resource::Placement(Placement {
                api_version: PLACEMENT_API_VERSION,
                kind: "Placement",
                metadata,
                spec: PlacementSpec {
                    predicates: vec![PlacementPredicate {
                        required_cluster_selector: RequiredClusterSelector {
                            label_selector: selector,
                        },
                    }],
                },
            }),
            PlacementFamily::PlacementRule => Resource::PlacementRule(PlacementRule {
                api_version: PLACEMENT_RULE_API_VERSION,
                kind: "PlacementRule",
                metadata,
                spec: PlacementRuleSpec {
                    cluster_conditions: vec![ClusterCondition::available()],
                    cluster_selector: selector,
                },
            }),
        };

        ctx.names_by_selector
            .entry(key.clone())
            .or_insert_with(|| name.clone());
        ctx.selectors_by_name.insert(name.clone(), key);
        ctx.emit_placement(placement);
        Ok(family.reference(name))
    }
}

/// Bind to a placement that already exists on the hub. The name is reserved
/// so no generated or loaded placement can take it.
fn reference_existing(ctx: &mut GenerationContext, name: &str, family: PlacementFamily) -> TypedRef {
    ctx.selectors_by_name
        .entry(name.to_string())
        .or_insert_with(|| format!("hub:{}", name));
    family.reference(name)
}

/// `In` for a key with a value, `Exist` for a bare key, in key order.
fn cluster_selector(selectors: &BTreeMap<String, String>) -> LabelSelector {
    let expressions = selectors
        .iter()
        .map(|(key, value)| {
            if value.is_empty() {
                LabelSelectorRequirement {
                    key: key.clone(),
                    operator: "Exist".to_string(),
                    values: Vec::new(),
                }
            } else {
                LabelSelectorRequirement {
                    key: key.clone(),
                    operator: "In".to_string(),
                    values: vec![value.clone()],
                }
            }
        })
        .collect();
    LabelSelector {
        match_labels: None,
        match_expressions: Some(expressions),
    }
}

/// Selects every cluster.
fn match_all() -> LabelSelector {
    LabelSelector {
        match_labels: None,
        match_expressions: Some(Vec::new()),
    }
}

fn selector_key(family: PlacementFamily, selector: &LabelSelector) -> Result<String> {
    let body = serde_yaml::to_string(selector).map_err(|source| GeneratorError::Serialize {
        what: "a placement selector".to_string(),
        source,
    })?;
    Ok(format!("{}:{}", family.kind(), body))
}

fn duplicate_name(name: &str) -> GeneratorError {
    GeneratorError::Generation(format!(
        "a duplicate placement name was detected: {}; each placement name must map to a single cluster selector",
        name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::KustomizeRenderer;
    use std::fs;
    use tempfile::tempdir;

    fn selectors(pairs: &[(&str, &str)]) -> PlacementConfig {
        PlacementConfig {
            cluster_selectors: Some(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    fn owner(name: &str) -> PlacementOwner<'_> {
        PlacementOwner {
            name,
            shared_name: None,
        }
    }

    #[test]
    fn default_placement_is_named_after_owner() {
        let dir = tempdir().unwrap();
        let renderer = KustomizeRenderer;
        let loader = ManifestLoader::new(dir.path(), &renderer).unwrap();
        let resolver = PlacementResolver::new(&loader, "ns", PlacementFamily::Placement);
        let mut ctx = GenerationContext::new();

        let reference = resolver.resolve(&mut ctx, None, owner("p1")).unwrap();
        assert_eq!(reference, TypedRef::placement("placement-p1"));

        let yaml = serde_yaml::to_string(&ctx.placements()[0]).unwrap();
        assert!(yaml.contains("matchExpressions: []"));
        assert!(yaml.contains("namespace: ns"));
    }

    #[test]
    fn identical_selectors_share_a_placement() {
        let dir = tempdir().unwrap();
        let renderer = KustomizeRenderer;
        let loader = ManifestLoader::new(dir.path(), &renderer).unwrap();
        let resolver = PlacementResolver::new(&loader, "ns", PlacementFamily::PlacementRule);
        let mut ctx = GenerationContext::new();
        let spec = selectors(&[("env", "prod"), ("cloud", "")]);

        let first = resolver.resolve(&mut ctx, Some(&spec), owner("p1")).unwrap();
        let second = resolver.resolve(&mut ctx, Some(&spec), owner("p2")).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, TypedRef::placement_rule("placement-p1"));
        assert_eq!(ctx.placements().len(), 1);

        let Resource::PlacementRule(rule) = &ctx.placements()[0] else {
            panic!("expected a PlacementRule");
        };
        let expressions = rule.spec.cluster_selector.match_expressions.as_ref().unwrap();
        assert_eq!(expressions[0].key, "cloud");
        assert_eq!(expressions[0].operator, "Exist");
        assert_eq!(expressions[1].operator, "In");
        assert_eq!(expressions[1].values, vec!["prod".to_string()]);
    }

    #[test]
    fn shared_name_is_numbered_per_selector() {
        let dir = tempdir().unwrap();
        let renderer = KustomizeRenderer;
        let loader = ManifestLoader::new(dir.path(), &renderer).unwrap();
        let resolver = PlacementResolver::new(&loader, "ns", PlacementFamily::PlacementRule);
        let mut ctx = GenerationContext::new();
        let shared = |pairs: &[(&str, &str)]| PlacementConfig {
            name: Some("shared".to_string()),
            ..selectors(pairs)
        };
        let owner = |name| PlacementOwner {
            name,
            shared_name: Some("shared"),
        };

        let dev = resolver
            .resolve(&mut ctx, Some(&shared(&[("env", "dev")])), owner("p1"))
            .unwrap();
        let prod = resolver
            .resolve(&mut ctx, Some(&shared(&[("env", "prod")])), owner("p2"))
            .unwrap();
        let dev_again = resolver
            .resolve(&mut ctx, Some(&shared(&[("env", "dev")])), owner("p3"))
            .unwrap();
        assert_eq!(dev.name, "shared");
        assert_eq!(prod.name, "shared2");
        assert_eq!(dev_again.name, "shared");
        assert_eq!(ctx.placements().len(), 2);
    }

    #[test]
    fn explicit_name_with_different_selector_is_a_duplicate() {
        let dir = tempdir().unwrap();
        let renderer = KustomizeRenderer;
        let loader = ManifestLoader::new(dir.path(), &renderer).unwrap();
        let resolver = PlacementResolver::new(&loader, "ns", PlacementFamily::PlacementRule);
        let mut ctx = GenerationContext::new();
        let named = |value: &str| PlacementConfig {
            name: Some("mine".to_string()),
            ..selectors(&[("env", value)])
        };

        resolver
            .resolve(&mut ctx, Some(&named("dev")), owner("p1"))
            .unwrap();
        let err = resolver
            .resolve(&mut ctx, Some(&named("prod")), owner("p2"))
            .unwrap_err();
        assert!(err.to_string().contains("duplicate placement name"));
    }

    #[test]
    fn placement_path_is_loaded_once() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("placement.yaml"),
            "apiVersion: cluster.open-cluster-management.io/v1beta1\nkind: Placement\nmetadata:\n  name: existing\n  namespace: ns\nspec: {}\n",
        )
        .unwrap();
        let renderer = KustomizeRenderer;
        let loader = ManifestLoader::new(dir.path(), &renderer).unwrap();
        let resolver = PlacementResolver::new(&loader, "ns", PlacementFamily::Placement);
        let mut ctx = GenerationContext::new();
        let spec = PlacementConfig {
            placement_path: Some("placement.yaml".to_string()),
            ..Default::default()
        };

        let first = resolver.resolve(&mut ctx, Some(&spec), owner("p1")).unwrap();
        let second = resolver.resolve(&mut ctx, Some(&spec), owner("p2")).unwrap();
        assert_eq!(first, TypedRef::placement("existing"));
        assert_eq!(second, first);
        assert_eq!(ctx.placements().len(), 1);
    }

    #[test]
    fn placement_path_in_wrong_namespace_is_rejected() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("placement.yaml"),
            "apiVersion: cluster.open-cluster-management.io/v1beta1\nkind: Placement\nmetadata:\n  name: existing\n  namespace: elsewhere\n",
        )
        .unwrap();
        let renderer = KustomizeRenderer;
        let loader = ManifestLoader::new(dir.path(), &renderer).unwrap();
        let resolver = PlacementResolver::new(&loader, "ns", PlacementFamily::Placement);
        let spec = PlacementConfig {
            placement_path: Some("placement.yaml".to_string()),
            ..Default::default()
        };
        let err = resolver
            .resolve(&mut GenerationContext::new(), Some(&spec), owner("p1"))
            .unwrap_err();
        assert!(err.to_string().contains("must be in the ns namespace"));
    }

    #[test]
    fn placement_name_reference_emits_nothing() {
        let dir = tempdir().unwrap();
        let renderer = KustomizeRenderer;
        let loader = ManifestLoader::new(dir.path(), &renderer).unwrap();
        let resolver = PlacementResolver::new(&loader, "ns", PlacementFamily::Placement);
        let mut ctx = GenerationContext::new();
        let spec = PlacementConfig {
            placement_name: Some("hub-placement".to_string()),
            ..Default::default()
        };
        let reference = resolver.resolve(&mut ctx, Some(&spec), owner("p1")).unwrap();
        assert_eq!(reference, TypedRef::placement("hub-placement"));
        assert!(ctx.placements().is_empty());
    }

    fn load_error(file: &str, spec: PlacementConfig) -> String {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("placement.yaml"), file).unwrap();
        let renderer = KustomizeRenderer;
        let loader = ManifestLoader::new(dir.path(), &renderer).unwrap();
        let resolver = PlacementResolver::new(&loader, "ns", PlacementFamily::Placement);
        resolver
            .resolve(&mut GenerationContext::new(), Some(&spec), owner("p1"))
            .unwrap_err()
            .to_string()
    }

    fn by_path() -> PlacementConfig {
        PlacementConfig {
            placement_path: Some("placement.yaml".to_string()),
            ..Default::default()
        }
    }

    fn by_rule_path() -> PlacementConfig {
        PlacementConfig {
            placement_rule_path: Some("placement.yaml".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn placement_path_holding_a_rule_is_rejected() {
        let msg = load_error(
            "apiVersion: apps.open-cluster-management.io/v1\nkind: PlacementRule\nmetadata:\n  name: rule\n  namespace: ns\n",
            by_path(),
        );
        assert!(msg.contains("must be a Placement, but it contains a PlacementRule"), "{}", msg);
    }

    #[test]
    fn placement_rule_path_holding_a_placement_is_rejected() {
        let msg = load_error(
            "apiVersion: cluster.open-cluster-management.io/v1beta1\nkind: Placement\nmetadata:\n  name: placement\n  namespace: ns\n",
            by_rule_path(),
        );
        assert!(msg.contains("must be a PlacementRule, but it contains a Placement"), "{}", msg);
    }

    #[test]
    fn placement_file_without_a_placement_is_rejected() {
        let msg = load_error(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm\n  namespace: ns\n",
            by_path(),
        );
        assert!(msg.contains("does not contain a Placement"), "{}", msg);
    }

    #[test]
    fn hub_reference_reserves_its_name() {
        let dir = tempdir().unwrap();
        let renderer = KustomizeRenderer;
        let loader = ManifestLoader::new(dir.path(), &renderer).unwrap();
        let resolver = PlacementResolver::new(&loader, "ns", PlacementFamily::PlacementRule);
        let mut ctx = GenerationContext::new();
        let hub = PlacementConfig {
            placement_rule_name: Some("hub-rule".to_string()),
            ..Default::default()
        };
        let generated = PlacementConfig {
            name: Some("hub-rule".to_string()),
            ..selectors(&[("env", "dev")])
        };

        resolver.resolve(&mut ctx, Some(&hub), owner("p1")).unwrap();
        resolver.resolve(&mut ctx, Some(&hub), owner("p2")).unwrap();
        let err = resolver
            .resolve(&mut ctx, Some(&generated), owner("p3"))
            .unwrap_err();
        assert!(err.to_string().contains("duplicate placement name was detected: hub-rule"));
        assert!(ctx.placements().is_empty());
    }

    #[test]
    fn generated_name_over_ceiling_is_rejected() {
        let dir = tempdir().unwrap();
        let renderer = KustomizeRenderer;
        let loader = ManifestLoader::new(dir.path(), &renderer).unwrap();
        let resolver = PlacementResolver::new(&loader, "ns", PlacementFamily::Placement);
        let long = "p".repeat(55);
        let err = resolver
            .resolve(&mut GenerationContext::new(), None, owner(&long))
            .unwrap_err();
        assert!(matches!(err, GeneratorError::Validation(_)));
        assert!(err.to_string().contains("cannot be more than 63 characters"));
    }
}
