// patch.rs — Applying user patches to loaded manifests.
//
// Patching is a two-step state machine expressed in the types:
//
//   ManifestPatcher --validate()--> ValidatedPatcher --apply_patches()--> Vec<Manifest>
//
// Validation guarantees every manifest has an identity and every patch can
// be matched to exactly one manifest by that identity. With a single
// manifest, patches may omit their identity; validation copies it in from
// the manifest without overwriting anything the patch already sets.

use serde_yaml::Mapping;

use crate::error::{GeneratorError, Result};
use crate::merge::strategic_merge;
use crate::object::{set_str, Manifest, ObjectExt};

const IDENTITY_FIELDS: &[&[&str]] = &[&["apiVersion"], &["kind"], &["metadata", "name"]];

/// Manifests and patches from one manifest path, not yet validated.
#[derive(Debug, Clone)]
pub struct ManifestPatcher {
    origin: String,
    manifests: Vec<Manifest>,
    patches: Vec<Mapping>,
}

/// A patcher whose patches are known to carry a full identity.
#[derive(Debug, Clone)]
pub struct ValidatedPatcher {
    origin: String,
    manifests: Vec<Manifest>,
    patches: Vec<Mapping>,
}

impl ManifestPatcher {
    /// `origin` is the configured manifest path, used in error messages.
    pub fn new(origin: impl Into<String>, manifests: Vec<Manifest>, patches: Vec<Mapping>) -> Self {
        Self {
            origin: origin.into(),
            manifests,
            patches,
        }
    }

    pub fn validate(self) -> Result<ValidatedPatcher> {
        let Self {
            origin,
            manifests,
            mut patches,
        } = self;

        if manifests.is_empty() {
            return Err(patch_error(&origin, "there must be one or more manifests"));
        }

        for (index, manifest) in manifests.iter().enumerate() {
            if let Some(field) = missing_identity(manifest) {
                return Err(patch_error(
                    &origin,
                    format!("manifest {} is missing {}", index, field),
                ));
            }
        }

        if let [manifest] = manifests.as_slice() {
            for patch in &mut patches {
                fill_identity(patch, manifest);
            }
        } else {
            for (index, patch) in patches.iter().enumerate() {
                if let Some(field) = missing_identity(patch) {
                    return Err(patch_error(
                        &origin,
                        format!(
                            "patch {} is missing {}, which is required when patching multiple manifests",
                            index, field
                        ),
                    ));
                }
            }
        }

        Ok(ValidatedPatcher {
            origin,
            manifests,
            patches,
        })
    }
}

impl ValidatedPatcher {
    /// The identity-complete patches.
    pub fn patches(&self) -> &[Mapping] {
        &self.patches
    }

    /// Merge every patch onto the one manifest it identifies.
    pub fn apply_patches(self) -> Result<Vec<Manifest>> {
        let Self {
            origin,
            mut manifests,
            patches,
        } = self;

        for (index, patch) in patches.iter().enumerate() {
            let matches: Vec<usize> = manifests
                .iter()
                .enumerate()
                .filter(|(_, manifest)| same_identity(manifest, patch))
                .map(|(i, _)| i)
                .collect();

            let target = match matches.as_slice() {
                [only] => *only,
                [] => {
                    return Err(patch_error(
                        &origin,
                        format!("patch {} ({}) does not match any manifest", index, describe(patch)),
                    ))
                }
                _ => {
                    return Err(patch_error(
                        &origin,
                        format!(
                            "patch {} ({}) matches {} manifests; it must identify exactly one",
                            index,
                            describe(patch),
                            matches.len()
                        ),
                    ))
                }
            };

            strategic_merge(&mut manifests[target], patch)
                .map_err(|reason| patch_error(&origin, format!("patch {}: {}", index, reason)))?;
            tracing::debug!(origin = %origin, patch = index, "applied patch to {}", describe(&manifests[target]));
        }

        Ok(manifests)
    }
}

fn missing_identity(object: &Mapping) -> Option<String> {
    IDENTITY_FIELDS
        .iter()
        .find(|path| object.str_at(path).map_or(true, str::is_empty))
        .map(|path| path.join("."))
}

fn fill_identity(patch: &mut Mapping, manifest: &Manifest) {
    let identity = [
        (&["apiVersion"][..], manifest.api_version()),
        (&["kind"][..], manifest.kind()),
        (&["metadata", "name"][..], manifest.name()),
        (&["metadata", "namespace"][..], manifest.namespace()),
    ];
    for (path, value) in identity {
        if !value.is_empty() && patch.str_at(path).map_or(true, str::is_empty) {
            set_str(patch, path, value);
        }
    }
}

fn same_identity(manifest: &Mapping, patch: &Mapping) -> bool {
    manifest.api_version() == patch.api_version()
        && manifest.kind() == patch.kind()
        && manifest.name() == patch.name()
        && manifest.namespace() == patch.namespace()
}

fn describe(object: &Mapping) -> String {
    if object.namespace().is_empty() {
        format!("{} {}/{}", object.api_version(), object.kind(), object.name())
    } else {
        format!(
            "{} {}/{}/{}",
            object.api_version(),
            object.kind(),
            object.namespace(),
            object.name()
        )
    }
}

fn patch_error(origin: &str, reason: impl Into<String>) -> GeneratorError {
    GeneratorError::Patch {
        path: origin.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> Mapping {
        serde_yaml::from_str(text).unwrap()
    }

    fn config_map(name: &str) -> Manifest {
        yaml(&format!(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {}\n  namespace: default\ndata:\n  game: chess\n",
            name
        ))
    }

    #[test]
    fn single_manifest_patch_gets_identity_and_merges() {
        let patcher = ManifestPatcher::new(
            "input/cm.yaml",
            vec![config_map("cm1")],
            vec![yaml("data:\n  game: go\n  players: '2'\n")],
        );
        let validated = patcher.validate().unwrap();

        let patch = &validated.patches()[0];
        assert_eq!(patch.api_version(), "v1");
        assert_eq!(patch.kind(), "ConfigMap");
        assert_eq!(patch.name(), "cm1");
        assert_eq!(patch.namespace(), "default");

        let patched = validated.apply_patches().unwrap();
        assert_eq!(patched.len(), 1);
        assert_eq!(patched[0].name(), "cm1");
        assert_eq!(patched[0].str_at(&["data", "game"]), Some("go"));
        assert_eq!(patched[0].str_at(&["data", "players"]), Some("2"));
    }

    #[test]
    fn identity_filling_never_overwrites() {
        let patcher = ManifestPatcher::new(
            "input/cm.yaml",
            vec![config_map("cm1")],
            vec![yaml("metadata:\n  namespace: other\n")],
        );
        let validated = patcher.validate().unwrap();
        assert_eq!(validated.patches()[0].namespace(), "other");
        // The patch now names a manifest that does not exist.
        let err = validated.apply_patches().unwrap_err();
        assert!(err.to_string().contains("does not match any manifest"));
    }

    #[test]
    fn multiple_manifests_require_patch_identity() {
        let patcher = ManifestPatcher::new(
            "input",
            vec![config_map("cm1"), config_map("cm2")],
            vec![yaml("apiVersion: v1\nkind: ConfigMap\ndata:\n  game: go\n")],
        );
        let err = patcher.validate().unwrap_err();
        assert!(err.to_string().contains("metadata.name"));
    }

    #[test]
    fn multiple_manifests_patch_matches_by_identity() {
        let patcher = ManifestPatcher::new(
            "input",
            vec![config_map("cm1"), config_map("cm2")],
            vec![yaml(
                "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm2\n  namespace: default\ndata:\n  game: go\n",
            )],
        );
        let patched = patcher.validate().unwrap().apply_patches().unwrap();
        assert_eq!(patched[0].str_at(&["data", "game"]), Some("chess"));
        assert_eq!(patched[1].str_at(&["data", "game"]), Some("go"));
    }

    #[test]
    fn empty_manifest_list_fails_validation() {
        let err = ManifestPatcher::new("input", Vec::new(), Vec::new())
            .validate()
            .unwrap_err();
        assert!(matches!(err, GeneratorError::Patch { .. }));
    }

    #[test]
    fn manifest_without_kind_fails_validation() {
        let err = ManifestPatcher::new(
            "input",
            vec![yaml("apiVersion: v1\nmetadata:\n  name: x\n")],
            Vec::new(),
        )
        .validate()
        .unwrap_err();
        assert!(err.to_string().contains("missing kind"));
    }
}
