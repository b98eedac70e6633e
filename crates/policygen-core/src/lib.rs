//! # policygen-core
//!
//! Generates governance Policies, placements, and PlacementBindings from a
//! declarative PolicyGenerator document and the Kubernetes manifests it
//! references.
//!
//! A run is a single deterministic transformation: the configuration is
//! parsed, defaulted, and validated once by [`PolicyGenerator::from_yaml`],
//! then [`PolicyGenerator::generate`] loads and patches the manifests, builds
//! each Policy's templates, resolves placements, and groups bindings.
//!
//! ## Key components
//!
//! - [`ManifestLoader`]: files, flat YAML directories, and kustomize overlays
//! - [`ManifestPatcher`]: identity-matched strategic-merge patches
//! - [`ExpanderRegistry`]: inform templates for Kyverno and Gatekeeper objects
//! - [`templates`]: consolidation, ordering, and per-template overrides
//! - [`PlacementResolver`]: selector-deduplicated Placement/PlacementRule objects
//! - [`BindingAggregator`]: one PlacementBinding per placement
//!
//! ## Key invariants
//!
//! - **Validate first**: every configuration error is reported before any
//!   manifest is turned into output.
//! - **Deterministic**: identical input and manifests give byte-identical output.
//! - **No shared state**: placement and binding bookkeeping live in a
//!   [`GenerationContext`] created per `generate` call.
//! - **Base directory bound**: manifest and placement paths may not resolve
//!   outside the base directory.

pub mod binding;
pub mod config;
pub mod context;
pub mod defaults;
pub mod error;
pub mod expanders;
pub mod generator;
pub mod loader;
pub mod merge;
pub mod object;
pub mod patch;
pub mod placement;
pub mod resource_list;
pub mod resources;
pub mod schema;
pub mod templates;
pub mod validate;

pub use binding::BindingAggregator;
pub use config::{GeneratorConfig, ManifestConfig, PlacementConfig, PolicyConfig, PolicySetConfig};
pub use context::{Association, GenerationContext};
pub use error::{GeneratorError, Result};
pub use expanders::{Expander, ExpanderRegistry};
pub use generator::PolicyGenerator;
pub use loader::{KustomizeRenderer, ManifestLoader, OverlayRenderer};
pub use object::{Manifest, ObjectExt};
pub use patch::{ManifestPatcher, ValidatedPatcher};
pub use placement::{PlacementFamily, PlacementOwner, PlacementResolver};
pub use resource_list::generate_resource_list;
pub use resources::Resource;
