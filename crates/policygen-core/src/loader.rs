// loader.rs — Manifest loading.
//
// A manifest path is one of:
//   1. a file holding one or more YAML documents,
//   2. a directory of flat `.yaml`/`.yml` files (non-recursive, name order),
//   3. a kustomize directory, rendered by an `OverlayRenderer`.
//
// Every path is resolved against the base directory and must stay inside
// it; a path that escapes the base directory is rejected.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use serde_yaml::Value;

use crate::error::{GeneratorError, Result};
use crate::object::{Manifest, ObjectExt};

/// File names that mark a directory as a kustomize overlay.
const KUSTOMIZATION_FILES: &[&str] = &["kustomization.yaml", "kustomization.yml", "Kustomization"];

/// Renders a build-overlay directory into a multi-document YAML stream.
pub trait OverlayRenderer: Send + Sync {
    fn render(&self, dir: &Path) -> Result<String>;

    /// Renderer display name (for logs).
    fn name(&self) -> &str;
}

/// Renders overlays with the `kustomize` binary found on `PATH`.
#[derive(Debug, Default, Clone)]
pub struct KustomizeRenderer;

impl OverlayRenderer for KustomizeRenderer {
    fn render(&self, dir: &Path) -> Result<String> {
        let binary = which::which("kustomize").map_err(|e| GeneratorError::ManifestRead {
            path: dir.to_path_buf(),
            reason: format!("the kustomize binary is required to build this directory: {}", e),
        })?;

        tracing::debug!(dir = %dir.display(), binary = %binary.display(), "running kustomize build");
        let output = Command::new(&binary)
            .arg("build")
            .arg(dir)
            .output()
            .map_err(|source| GeneratorError::Io {
                path: binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(GeneratorError::ManifestRead {
                path: dir.to_path_buf(),
                reason: format!(
                    "kustomize build failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        String::from_utf8(output.stdout).map_err(|e| GeneratorError::ManifestRead {
            path: dir.to_path_buf(),
            reason: format!("kustomize produced invalid UTF-8: {}", e),
        })
    }

    fn name(&self) -> &str {
        "kustomize"
    }
}

/// Loads manifests relative to a base directory.
pub struct ManifestLoader<'a> {
    base_dir: PathBuf,
    renderer: &'a dyn OverlayRenderer,
}

impl<'a> ManifestLoader<'a> {
    /// Create a loader rooted at `base_dir`.
    pub fn new(base_dir: &Path, renderer: &'a dyn OverlayRenderer) -> Result<Self> {
        let base_dir = base_dir
            .canonicalize()
            .map_err(|source| GeneratorError::Io {
                path: base_dir.to_path_buf(),
                source,
            })?;
        Ok(Self { base_dir, renderer })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve a configured path to an existing location inside the base directory.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let joined = self.base_dir.join(path);
        let resolved = joined
            .canonicalize()
            .map_err(|e| GeneratorError::ManifestRead {
                path: joined.clone(),
                reason: e.to_string(),
            })?;
        self.ensure_inside(Path::new(path), &resolved)?;
        Ok(resolved)
    }

    fn ensure_inside(&self, path: &Path, resolved: &Path) -> Result<()> {
        if !resolved.starts_with(&self.base_dir) {
            return Err(GeneratorError::ManifestRead {
                path: path.to_path_buf(),
                reason: format!(
                    "the path resolves outside of the base directory {}",
                    self.base_dir.display()
                ),
            });
        }
        Ok(())
    }

    /// YAML files directly inside `dir`, sorted by name. A symlinked entry
    /// must still land inside the base directory.
    fn yaml_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let pattern = format!(
            "{}/*",
            glob::Pattern::escape(&dir.to_string_lossy())
        );
        let entries = glob::glob(&pattern).map_err(|e| GeneratorError::ManifestRead {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| GeneratorError::ManifestRead {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;
            if !path.is_file()
                || !path
                    .extension()
                    .is_some_and(|ext| ext == "yaml" || ext == "yml")
            {
                continue;
            }
            let resolved = path.canonicalize().map_err(|e| GeneratorError::ManifestRead {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            self.ensure_inside(&path, &resolved)?;
            files.push(path);
        }
        files.sort();
        Ok(files)
    }

    /// Load every object document a manifest path refers to, in order.
    pub fn load(&self, path: &str) -> Result<Vec<Manifest>> {
        let resolved = self.resolve(path)?;

        if resolved.is_dir() {
            if has_kustomization(&resolved) {
                tracing::debug!(
                    path = %resolved.display(),
                    renderer = self.renderer.name(),
                    "rendering build overlay"
                );
                let rendered = self.renderer.render(&resolved)?;
                return parse_documents(&rendered, &resolved);
            }

            let mut manifests = Vec::new();
            for file in self.yaml_files(&resolved)? {
                manifests.extend(read_file(&file)?);
            }
            return Ok(manifests);
        }

        read_file(&resolved)
    }
}

fn has_kustomization(dir: &Path) -> bool {
    KUSTOMIZATION_FILES
        .iter()
        .any(|name| dir.join(name).is_file())
}

fn read_file(path: &Path) -> Result<Vec<Manifest>> {
    let contents = fs::read_to_string(path).map_err(|e| GeneratorError::ManifestRead {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_documents(&contents, path)
}

/// Parse a (possibly multi-document) YAML stream into object documents.
///
/// Empty documents are skipped and `kind: List` documents contribute their
/// `items`. Any other non-map document is an error.
pub fn parse_documents(contents: &str, origin: &Path) -> Result<Vec<Manifest>> {
    let mut manifests = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(contents).enumerate() {
        let value = Value::deserialize(document).map_err(|e| GeneratorError::ManifestRead {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;

        match value {
            Value::Null => {
                tracing::warn!(path = %origin.display(), index, "skipping empty YAML document");
            }
            Value::Mapping(manifest) if is_list(&manifest) => {
                for item in list_items(&manifest) {
                    match item {
                        Value::Mapping(item) => manifests.push(item.clone()),
                        _ => {
                            return Err(GeneratorError::InvalidManifestFormat {
                                path: origin.to_path_buf(),
                                index,
                            })
                        }
                    }
                }
            }
            Value::Mapping(manifest) => manifests.push(manifest),
            _ => {
                return Err(GeneratorError::InvalidManifestFormat {
                    path: origin.to_path_buf(),
                    index,
                })
            }
        }
    }
    Ok(manifests)
}

fn is_list(manifest: &Manifest) -> bool {
    manifest.kind() == "List" && manifest.get("items").is_some_and(Value::is_sequence)
}

fn list_items(manifest: &Manifest) -> &[Value] {
    manifest
        .get("items")
        .and_then(Value::as_sequence)
        .map(Vec::as_slice)
        .unwrap_or_default()
}
