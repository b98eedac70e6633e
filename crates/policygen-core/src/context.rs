// context.rs — Working state of a single generation run.
//
// Created fresh by every `PolicyGenerator::generate` call and dropped when
// it returns, so nothing learned while generating one document can leak into
// the next run.

use std::collections::{BTreeMap, BTreeSet};

use crate::resources::{Resource, TypedRef};

/// A subject (Policy or PolicySet) bound to a placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub placement: TypedRef,
    pub subject: TypedRef,
}

#[derive(Debug, Default)]
pub struct GenerationContext {
    /// Canonical selector key to the name of the placement generated for it.
    pub(crate) names_by_selector: BTreeMap<String, String>,
    /// Every placement name emitted so far, with the selector key it holds.
    /// Placements loaded from disk are keyed by their path, hub references
    /// by their name.
    pub(crate) selectors_by_name: BTreeMap<String, String>,
    /// Names of placements already loaded from disk.
    pub(crate) loaded: BTreeSet<String>,
    placements: Vec<Resource>,
    associations: Vec<Association>,
}

impl GenerationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn emit_placement(&mut self, placement: Resource) {
        tracing::debug!(kind = placement.kind(), name = placement.name(), "emitting placement");
        self.placements.push(placement);
    }

    pub fn bind(&mut self, placement: TypedRef, subject: TypedRef) {
        self.associations.push(Association { placement, subject });
    }

    /// Placements in the order they were first needed.
    pub fn placements(&self) -> &[Resource] {
        &self.placements
    }

    pub fn associations(&self) -> &[Association] {
        &self.associations
    }

    pub(crate) fn into_parts(self) -> (Vec<Resource>, Vec<Association>) {
        (self.placements, self.associations)
    }
}
