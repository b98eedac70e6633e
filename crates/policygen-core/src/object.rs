// object.rs — Accessors for untyped Kubernetes-style object documents.
//
// Manifests are kept as `serde_yaml::Mapping` so that unknown fields survive
// patching and embedding untouched. This module provides the handful of
// typed lookups the generator needs (identity fields, API group) plus a
// small builder for assembling maps in a fixed key order.

use serde_yaml::{Mapping, Value};

/// A raw object document as loaded from disk.
pub type Manifest = Mapping;

/// Annotation prefixes that kustomize adds while rendering an overlay.
const BUILD_ANNOTATION_PREFIXES: &[&str] =
    &["config.kubernetes.io/", "internal.config.kubernetes.io/"];

/// Typed lookups on an object document.
pub trait ObjectExt {
    /// Look up a nested string value, e.g. `["metadata", "name"]`.
    fn str_at(&self, path: &[&str]) -> Option<&str>;

    fn api_version(&self) -> &str {
        self.str_at(&["apiVersion"]).unwrap_or_default()
    }

    fn kind(&self) -> &str {
        self.str_at(&["kind"]).unwrap_or_default()
    }

    fn name(&self) -> &str {
        self.str_at(&["metadata", "name"]).unwrap_or_default()
    }

    fn namespace(&self) -> &str {
        self.str_at(&["metadata", "namespace"]).unwrap_or_default()
    }

    /// The API group of `apiVersion` (empty for the core group).
    fn api_group(&self) -> &str {
        match self.api_version().split_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }
}

impl ObjectExt for Mapping {
    fn str_at(&self, path: &[&str]) -> Option<&str> {
        let (last, parents) = path.split_last()?;
        let mut current = self;
        for key in parents {
            current = current.get(*key)?.as_mapping()?;
        }
        current.get(*last)?.as_str()
    }
}

/// Set a string value at a nested path, creating intermediate maps.
///
/// An existing non-map value on the way is replaced by a map.
pub fn set_str(object: &mut Mapping, path: &[&str], value: &str) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = object;
    for key in parents {
        let entry = current
            .entry(Value::from(*key))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        if !entry.is_mapping() {
            *entry = Value::Mapping(Mapping::new());
        }
        current = match entry {
            Value::Mapping(map) => map,
            _ => return,
        };
    }
    current.insert(Value::from(*last), Value::from(value));
}

/// Remove the annotations kustomize leaves behind after a build, dropping
/// the annotations map entirely if nothing else remains in it.
pub fn strip_build_annotations(object: &mut Mapping) {
    let Some(Value::Mapping(metadata)) = object.get_mut("metadata") else {
        return;
    };
    let Some(Value::Mapping(annotations)) = metadata.get_mut("annotations") else {
        return;
    };
    annotations.retain(|key, _| {
        key.as_str().map_or(true, |key| {
            !BUILD_ANNOTATION_PREFIXES
                .iter()
                .any(|prefix| key.starts_with(prefix))
        })
    });
    if annotations.is_empty() {
        metadata.remove("annotations");
    }
}

/// Build a map from key/value pairs, preserving the given order.
pub fn mapping<I, K>(entries: I) -> Mapping
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    entries
        .into_iter()
        .map(|(key, value)| (Value::String(key.into()), value))
        .collect()
}
