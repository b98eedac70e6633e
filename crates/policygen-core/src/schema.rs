// schema.rs — Known field names per configuration node.
//
// serde's `deny_unknown_fields` cannot be combined with the flattened option
// groups in `config.rs`, so unknown keys are found by walking the raw YAML
// against this table instead. An unknown key is reported with its line and,
// when a known name is close enough, a suggestion.

use serde_yaml::Value;

use crate::error::{GeneratorError, Result};

/// Jaro-Winkler similarity a known name must reach to be suggested.
const SUGGESTION_THRESHOLD: f64 = 0.8;

type Fields = &'static [(&'static str, Node)];

/// Shape of one node in the configuration tree.
#[derive(Debug, Clone, Copy)]
enum Node {
    /// Free-form content (strings, label maps, patches, ...).
    Any,
    /// A sequence whose items all have the inner shape.
    List(&'static Node),
    /// A map with a fixed set of keys, grouped so shared option sets
    /// can be listed once.
    Struct(&'static str, &'static [Fields]),
}

const DEPENDENCY: Node = Node::Struct(
    "dependency",
    &[&[
        ("apiVersion", Node::Any),
        ("compliance", Node::Any),
        ("kind", Node::Any),
        ("name", Node::Any),
        ("namespace", Node::Any),
    ]],
);

const LABEL_SELECTOR: Node = Node::Struct(
    "labelSelector",
    &[&[("matchLabels", Node::Any), ("matchExpressions", Node::Any)]],
);

const PLACEMENT: Node = Node::Struct(
    "placement",
    &[&[
        ("name", Node::Any),
        ("clusterSelectors", Node::Any),
        ("labelSelector", LABEL_SELECTOR),
        ("placementPath", Node::Any),
        ("placementRulePath", Node::Any),
        ("placementName", Node::Any),
        ("placementRuleName", Node::Any),
    ]],
);

const EVALUATION_INTERVAL: Node = Node::Struct(
    "evaluationInterval",
    &[&[("compliant", Node::Any), ("noncompliant", Node::Any)]],
);

const NAMESPACE_SELECTOR: Node = Node::Struct(
    "namespaceSelector",
    &[&[
        ("exclude", Node::Any),
        ("include", Node::Any),
        ("matchExpressions", Node::Any),
        ("matchLabels", Node::Any),
    ]],
);

const TEMPLATE_FIELDS: Fields = &[
    ("complianceType", Node::Any),
    ("metadataComplianceType", Node::Any),
    ("evaluationInterval", EVALUATION_INTERVAL),
    ("namespaceSelector", NAMESPACE_SELECTOR),
    ("pruneObjectBehavior", Node::Any),
    ("remediationAction", Node::Any),
    ("severity", Node::Any),
    ("extraDependencies", Node::List(&DEPENDENCY)),
    ("ignorePending", Node::Any),
];

const POLICY_OPTION_FIELDS: Fields = &[
    ("categories", Node::Any),
    ("controls", Node::Any),
    ("standards", Node::Any),
    ("consolidateManifests", Node::Any),
    ("copyPolicyMetadata", Node::Any),
    ("disabled", Node::Any),
    ("informGatekeeperPolicies", Node::Any),
    ("informKyvernoPolicies", Node::Any),
    ("orderManifests", Node::Any),
    ("dependencies", Node::List(&DEPENDENCY)),
    ("placement", PLACEMENT),
    ("policyAnnotations", Node::Any),
    ("policyLabels", Node::Any),
    ("configurationPolicyAnnotations", Node::Any),
    ("policySets", Node::Any),
    ("generatePolicyPlacement", Node::Any),
];

const MANIFEST: Node = Node::Struct(
    "manifests",
    &[&[("path", Node::Any), ("patches", Node::Any)], TEMPLATE_FIELDS],
);

const POLICY: Node = Node::Struct(
    "policies",
    &[
        &[("name", Node::Any), ("manifests", Node::List(&MANIFEST))],
        POLICY_OPTION_FIELDS,
        TEMPLATE_FIELDS,
    ],
);

const POLICY_DEFAULTS: Node = Node::Struct(
    "policyDefaults",
    &[
        &[("namespace", Node::Any), ("orderPolicies", Node::Any)],
        POLICY_OPTION_FIELDS,
        TEMPLATE_FIELDS,
    ],
);

const POLICY_SET: Node = Node::Struct(
    "policySets",
    &[&[
        ("name", Node::Any),
        ("description", Node::Any),
        ("policies", Node::Any),
        ("placement", PLACEMENT),
        ("generatePolicySetPlacement", Node::Any),
    ]],
);

const POLICY_SET_DEFAULTS: Node = Node::Struct(
    "policySetDefaults",
    &[&[
        ("placement", PLACEMENT),
        ("generatePolicySetPlacement", Node::Any),
    ]],
);

const GENERATOR: Node = Node::Struct(
    "PolicyGenerator",
    &[&[
        ("apiVersion", Node::Any),
        ("kind", Node::Any),
        (
            "metadata",
            Node::Struct("metadata", &[&[("name", Node::Any)]]),
        ),
        (
            "placementBindingDefaults",
            Node::Struct("placementBindingDefaults", &[&[("name", Node::Any)]]),
        ),
        ("policyDefaults", POLICY_DEFAULTS),
        ("policySetDefaults", POLICY_SET_DEFAULTS),
        ("policies", Node::List(&POLICY)),
        ("policySets", Node::List(&POLICY_SET)),
    ]],
);

/// Reject any key in `document` that the PolicyGenerator schema does not know.
///
/// `source` is the text the document was parsed from; it is only used to
/// locate the offending key for the error message.
pub fn check_unknown_fields(document: &Value, source: &str) -> Result<()> {
    let lines = SourceLines::new(source);
    walk(&GENERATOR, document, &lines, Position::default()).map(|_| ())
}

/// Where the walk is in the source: the line of the last key seen and the
/// indentation of the keys of the current mapping, once known.
#[derive(Debug, Clone, Copy, Default)]
struct Position {
    line: usize,
    column: Option<usize>,
}

fn walk(node: &Node, value: &Value, lines: &SourceLines<'_>, at: Position) -> Result<Position> {
    match (node, value) {
        (Node::List(item), Value::Sequence(items)) => {
            // Sibling items share their indentation.
            let mut cursor = Position {
                line: at.line,
                column: None,
            };
            for entry in items {
                cursor = walk(item, entry, lines, cursor)?;
            }
            Ok(Position {
                line: cursor.line,
                column: at.column,
            })
        }
        (Node::Struct(node_name, groups), Value::Mapping(map)) => {
            let mut cursor = at;
            for (key, child) in map {
                let Some(key) = key.as_str() else {
                    continue;
                };
                let found = lines.find(key, cursor.line, cursor.column);
                if let Some((line, column)) = found {
                    cursor = Position {
                        line,
                        column: Some(column),
                    };
                }
                match lookup(groups, key) {
                    Some(child_node) => {
                        let inner = Position {
                            line: cursor.line,
                            column: None,
                        };
                        cursor.line = walk(child_node, child, lines, inner)?.line;
                    }
                    None => {
                        let line = found
                            .map(|(line, _)| line)
                            .or_else(|| lines.find(key, cursor.line, None).map(|(line, _)| line))
                            .or_else(|| lines.find(key, 0, None).map(|(line, _)| line));
                        return Err(unknown_field(node_name, groups, key, line));
                    }
                }
            }
            Ok(cursor)
        }
        // Type mismatches are left for the typed parse to report.
        _ => Ok(at),
    }
}

fn lookup(groups: &'static [Fields], key: &str) -> Option<&'static Node> {
    groups
        .iter()
        .flat_map(|fields| fields.iter())
        .find(|(name, _)| *name == key)
        .map(|(_, node)| node)
}

fn unknown_field(
    node_name: &str,
    groups: &'static [Fields],
    key: &str,
    line: Option<usize>,
) -> GeneratorError {
    GeneratorError::UnknownField {
        field: key.to_string(),
        node: node_name.to_string(),
        line: line.map(|index| index + 1),
        suggestion: suggest(groups, key),
    }
}

/// The known field name most similar to `key`, if it clears the threshold.
fn suggest(groups: &'static [Fields], key: &str) -> Option<String> {
    groups
        .iter()
        .flat_map(|fields| fields.iter())
        .map(|(name, _)| (*name, strsim::jaro_winkler(name, key)))
        .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, _)| name.to_string())
}

/// The configuration source split into lines, for locating block-style keys.
struct SourceLines<'a> {
    lines: Vec<&'a str>,
}

impl<'a> SourceLines<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines().collect(),
        }
    }

    /// The first line at or after `from` that declares `key` as a map key,
    /// with the key's indentation. When `column` is set the key must sit at
    /// exactly that indentation, so keys of nested content are skipped.
    fn find(&self, key: &str, from: usize, column: Option<usize>) -> Option<(usize, usize)> {
        let candidates = [
            format!("{}:", key),
            format!("\"{}\":", key),
            format!("'{}':", key),
        ];
        self.lines
            .iter()
            .enumerate()
            .skip(from)
            .find_map(|(index, line)| {
                let trimmed = line.trim_start_matches([' ', '-']);
                let indent = line.len() - trimmed.len();
                let declares = candidates
                    .iter()
                    .any(|candidate| trimmed.starts_with(candidate.as_str()));
                (declares && column.is_none_or(|c| c == indent)).then_some((index, indent))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(source: &str) -> Result<()> {
        let document: Value = serde_yaml::from_str(source).unwrap();
        check_unknown_fields(&document, source)
    }

    #[test]
    fn known_fields_pass() {
        let source = r#"
apiVersion: policy.open-cluster-management.io/v1
kind: PolicyGenerator
metadata:
  name: generator
placementBindingDefaults:
  name: binding
policyDefaults:
  namespace: policies
  orderPolicies: false
  severity: medium
  placement:
    labelSelector:
      matchLabels:
        env: prod
policies:
  - name: p1
    extraDependencies:
      - name: p0
    manifests:
      - path: input
        patches:
          - anything: goes
policySets:
  - name: set1
    policies: [p1]
"#;
        check(source).unwrap();
    }

    #[test]
    fn typo_in_policy_defaults_is_suggested() {
        let source = "metadata:\n  name: g\npolicyDefaults:\n  namespce: policies\n";
        match check(source).unwrap_err() {
            GeneratorError::UnknownField {
                field,
                node,
                line,
                suggestion,
            } => {
                assert_eq!(field, "namespce");
                assert_eq!(node, "policyDefaults");
                assert_eq!(line, Some(4));
                assert_eq!(suggestion.as_deref(), Some("namespace"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn typo_inside_list_item_reports_nearest_node() {
        let source = r#"
policies:
  - name: p1
    manifests:
      - pth: input
"#;
        match check(source).unwrap_err() {
            GeneratorError::UnknownField {
                node, line, suggestion, ..
            } => {
                assert_eq!(node, "manifests");
                assert_eq!(line, Some(5));
                assert_eq!(suggestion.as_deref(), Some("path"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unrelated_name_gets_no_suggestion() {
        let source = "placementBindingDefaults:\n  xyzzy: true\n";
        match check(source).unwrap_err() {
            GeneratorError::UnknownField { suggestion, .. } => assert!(suggestion.is_none()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_key_is_located_at_its_own_line() {
        let source = r#"
policies:
  - name: p1
    manifests:
      - path: input
        patches:
          - kind: ConfigMap
          - data: {k: v}
    data: oops
"#;
        match check(source).unwrap_err() {
            GeneratorError::UnknownField {
                field, node, line, ..
            } => {
                assert_eq!(field, "data");
                assert_eq!(node, "policies");
                assert_eq!(line, Some(9));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn later_list_item_reports_its_own_line() {
        let source = r#"
policies:
  - name: p1
    manifests:
      - path: a
  - name: p2
    manifests:
      - path: b
        severty: high
"#;
        match check(source).unwrap_err() {
            GeneratorError::UnknownField {
                field, node, line, suggestion,
            } => {
                assert_eq!(field, "severty");
                assert_eq!(node, "manifests");
                assert_eq!(line, Some(9));
                assert_eq!(suggestion.as_deref(), Some("severity"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
