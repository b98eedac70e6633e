// error.rs — Error types for policy generation.
//
// Every public entry point returns one of these instead of exiting the
// process. The variants follow the order in which a run can fail: parsing
// the config, validating it, reading manifests, patching them, and finally
// assembling the output stream.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while parsing, validating, or generating.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// The configuration document is not well-formed YAML or does not match
    /// the expected field types.
    #[error("the PolicyGenerator configuration could not be parsed: {message}")]
    ConfigParse { message: String },

    /// The configuration contains a field that the schema does not know.
    #[error(
        "{}field {field} not found in {node}{}",
        line_prefix(.line),
        suggestion_hint(.suggestion)
    )]
    UnknownField {
        field: String,
        node: String,
        line: Option<usize>,
        suggestion: Option<String>,
    },

    /// The configuration is well-formed but semantically invalid.
    #[error("{0}")]
    Validation(String),

    /// A manifest or placement file could not be read or decoded.
    #[error("failed to read the manifest path {path}: {reason}")]
    ManifestRead { path: PathBuf, reason: String },

    /// A manifest document decoded to something other than a map.
    #[error("the input manifests in {path} must be maps, but document {index} is not")]
    InvalidManifestFormat { path: PathBuf, index: usize },

    /// A patch could not be validated, matched, or merged.
    #[error("failed to process the patches for {path}: {reason}")]
    Patch { path: String, reason: String },

    /// An invariant was violated while assembling the output.
    #[error("{0}")]
    Generation(String),

    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A generated object could not be serialized to YAML.
    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: String,
        source: serde_yaml::Error,
    },
}

pub type Result<T> = std::result::Result<T, GeneratorError>;

fn line_prefix(line: &Option<usize>) -> String {
    match line {
        Some(line) => format!("line {}: ", line),
        None => String::new(),
    }
}

fn suggestion_hint(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(" (did you mean \"{}\"?)", name),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_field_message_includes_line_and_hint() {
        let err = GeneratorError::UnknownField {
            field: "namespce".to_string(),
            node: "policyDefaults".to_string(),
            line: Some(7),
            suggestion: Some("namespace".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "line 7: field namespce not found in policyDefaults (did you mean \"namespace\"?)"
        );
    }

    #[test]
    fn unknown_field_message_without_location() {
        let err = GeneratorError::UnknownField {
            field: "zzz".to_string(),
            node: "placement".to_string(),
            line: None,
            suggestion: None,
        };
        assert_eq!(err.to_string(), "field zzz not found in placement");
    }
}
