// binding.rs — Grouping subjects by placement into PlacementBindings.
//
// One binding per placement, iterated in placement-name order so repeated
// runs emit identical output. Naming:
//   - with `placementBindingDefaults.name` set, the first binding takes the
//     name and later ones are numbered (`<name>2`, `<name>3`, ...)
//   - without it, every placement must have a single subject and the binding
//     is named `binding-<subject>`

use std::collections::{BTreeMap, BTreeSet};

use crate::context::Association;
use crate::error::{GeneratorError, Result};
use crate::resources::{ObjectMeta, PlacementBinding, TypedRef, POLICY_API_VERSION};
use crate::templates::numbered;
use crate::validate::check_qualified_name;

pub struct BindingAggregator<'a> {
    namespace: &'a str,
    default_name: Option<&'a str>,
}

impl<'a> BindingAggregator<'a> {
    pub fn new(namespace: &'a str, default_name: Option<&'a str>) -> Self {
        Self {
            namespace,
            default_name,
        }
    }

    pub fn aggregate(&self, associations: &[Association]) -> Result<Vec<PlacementBinding>> {
        let mut groups: BTreeMap<&str, (&TypedRef, Vec<TypedRef>)> = BTreeMap::new();
        for association in associations {
            let (_, subjects) = groups
                .entry(association.placement.name.as_str())
                .or_insert_with(|| (&association.placement, Vec::new()));
            if !subjects.contains(&association.subject) {
                subjects.push(association.subject.clone());
            }
        }

        let mut names = BTreeSet::new();
        let mut bindings = Vec::with_capacity(groups.len());
        for (position, (placement_name, (placement, subjects))) in groups.into_iter().enumerate() {
            let name = match (self.default_name, subjects.as_slice()) {
                (Some(default_name), _) => numbered(default_name, position + 1),
                (None, [subject]) => format!("binding-{}", subject.name),
                (None, _) => {
                    return Err(GeneratorError::Validation(format!(
                        "placementBindingDefaults.name must be set because the placement {} is bound to more than one subject ({})",
                        placement_name,
                        subject_names(&subjects)
                    )))
                }
            };
            check_qualified_name(self.namespace, &name, "placement binding")?;
            if !names.insert(name.clone()) {
                return Err(GeneratorError::Generation(format!(
                    "a duplicate placement binding name was detected: {}",
                    name
                )));
            }

            tracing::debug!(binding = %name, placement = placement_name, subjects = subjects.len(), "grouped binding");
            bindings.push(PlacementBinding {
                api_version: POLICY_API_VERSION,
                kind: "PlacementBinding",
                metadata: ObjectMeta::namespaced(name, self.namespace),
                placement_ref: placement.clone(),
                subjects,
            });
        }
        Ok(bindings)
    }
}

fn subject_names(subjects: &[TypedRef]) -> String {
    subjects
        .iter()
        .map(|s| format!("{} {}", s.kind, s.name))
        .collect::<Vec<_>>()
        .join(", ")
}
