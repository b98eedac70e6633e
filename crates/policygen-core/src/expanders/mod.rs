//! expanders — Audit templates synthesized from third-party policy objects.
//!
//! An expander recognizes a manifest that belongs to another policy engine
//! and produces extra read-only ConfigurationPolicy templates that report on
//! that engine's own findings:
//! - **Kyverno**: flags failing results in cluster and namespaced policy reports
//! - **Gatekeeper**: checks the constraint's audit violation count and
//!   watches for admission denial events
//!
//! The set is closed; `ExpanderRegistry::default()` holds both.

use crate::config::PolicyConfig;
use crate::object::Manifest;
use crate::resources::PolicyTemplate;

pub mod gatekeeper;
pub mod kyverno;

/// Recognizes one policy engine's objects and derives inform templates for them.
pub trait Expander: Send + Sync {
    /// Expander name (for logging/debugging).
    fn name(&self) -> &str;

    /// Whether `manifest` is an object this expander understands.
    fn can_handle(&self, manifest: &Manifest) -> bool;

    /// Whether the policy has this expander's inform flag turned on.
    fn enabled(&self, policy: &PolicyConfig) -> bool;

    /// Synthesize the audit templates for `manifest`.
    ///
    /// Must be pure: identical input always yields identical templates.
    fn expand(&self, manifest: &Manifest, severity: &str) -> Vec<PolicyTemplate>;
}

/// The registered expanders, consulted in registration order.
pub struct ExpanderRegistry {
    expanders: Vec<Box<dyn Expander>>,
}

impl ExpanderRegistry {
    /// Create a registry with no expanders.
    pub fn new() -> Self {
        Self {
            expanders: Vec::new(),
        }
    }

    pub fn register(&mut self, expander: Box<dyn Expander>) {
        self.expanders.push(expander);
    }

    pub fn names(&self) -> Vec<&str> {
        self.expanders.iter().map(|e| e.name()).collect()
    }

    /// Templates from every enabled expander that handles `manifest`.
    pub fn expand(
        &self,
        manifest: &Manifest,
        policy: &PolicyConfig,
        severity: &str,
    ) -> Vec<PolicyTemplate> {
        let mut templates = Vec::new();
        for expander in &self.expanders {
            if expander.enabled(policy) && expander.can_handle(manifest) {
                let expanded = expander.expand(manifest, severity);
                tracing::debug!(
                    expander = expander.name(),
                    policy = %policy.name,
                    templates = expanded.len(),
                    "expanded manifest"
                );
                templates.extend(expanded);
            }
        }
        templates
    }
}

impl Default for ExpanderRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(kyverno::KyvernoExpander));
        registry.register(Box::new(gatekeeper::GatekeeperExpander));
        registry
    }
}
