// merge.rs — Strategic merge of a partial object onto a full one.
//
// Rules:
// - maps merge key by key, recursively; a `null` value deletes the key
// - a map carrying `$patch: replace` replaces the target map wholesale,
//   `$patch: delete` removes it
// - lists whose elements are all maps with a `name` merge element-wise by
//   `name` (unmatched patch elements are appended); other lists replace

use serde_yaml::{Mapping, Value};

const DIRECTIVE_KEY: &str = "$patch";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    Merge,
    Replace,
    Delete,
}

/// Merge `patch` onto `target` in place.
///
/// Returns a message describing the first malformed directive, if any.
pub fn strategic_merge(target: &mut Mapping, patch: &Mapping) -> Result<(), String> {
    for (key, patch_value) in patch {
        if key.as_str() == Some(DIRECTIVE_KEY) {
            continue;
        }
        if patch_value.is_null() {
            target.remove(key);
            continue;
        }
        match directive(patch_value)? {
            Directive::Delete => {
                target.remove(key);
            }
            Directive::Replace => {
                target.insert(key.clone(), strip_directives(patch_value));
            }
            Directive::Merge => match target.get_mut(key) {
                Some(existing) => merge_value(existing, patch_value)?,
                None => {
                    target.insert(key.clone(), strip_directives(patch_value));
                }
            },
        }
    }
    Ok(())
}

fn merge_value(target: &mut Value, patch: &Value) -> Result<(), String> {
    match (target, patch) {
        (Value::Mapping(target), Value::Mapping(patch)) => strategic_merge(target, patch),
        (Value::Sequence(target), Value::Sequence(patch))
            if keyed_by_name(target.as_slice()) && keyed_by_name(patch) =>
        {
            merge_named_list(target, patch)
        }
        (target, patch) => {
            *target = strip_directives(patch);
            Ok(())
        }
    }
}

fn merge_named_list(target: &mut Vec<Value>, patch: &[Value]) -> Result<(), String> {
    for element in patch {
        let name = element_name(element);
        let position = target.iter().position(|t| element_name(t) == name);
        match (directive(element)?, position) {
            (Directive::Delete, Some(index)) => {
                target.remove(index);
            }
            (Directive::Delete, None) => {}
            (Directive::Replace, Some(index)) => target[index] = strip_directives(element),
            (Directive::Merge, Some(index)) => merge_value(&mut target[index], element)?,
            (_, None) => target.push(strip_directives(element)),
        }
    }
    Ok(())
}

fn keyed_by_name(list: &[Value]) -> bool {
    !list.is_empty() && list.iter().all(|v| element_name(v).is_some())
}

fn element_name(value: &Value) -> Option<&str> {
    value.as_mapping()?.get("name")?.as_str()
}

fn directive(value: &Value) -> Result<Directive, String> {
    let Some(raw) = value.as_mapping().and_then(|m| m.get(DIRECTIVE_KEY)) else {
        return Ok(Directive::Merge);
    };
    match raw.as_str() {
        Some("merge") => Ok(Directive::Merge),
        Some("replace") => Ok(Directive::Replace),
        Some("delete") => Ok(Directive::Delete),
        _ => Err(format!(
            "unsupported {} directive {:?}; expected merge, replace, or delete",
            DIRECTIVE_KEY, raw
        )),
    }
}

/// Copy of `value` with every `$patch` key removed.
fn strip_directives(value: &Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.iter()
                .filter(|(k, _)| k.as_str() != Some(DIRECTIVE_KEY))
                .map(|(k, v)| (k.clone(), strip_directives(v)))
                .collect(),
        ),
        Value::Sequence(items) => Value::Sequence(items.iter().map(strip_directives).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> Mapping {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn maps_merge_recursively() {
        let mut target = yaml("data:\n  a: '1'\n  b: '2'\nmetadata:\n  name: cm\n");
        strategic_merge(&mut target, &yaml("data:\n  b: '3'\n  c: '4'\n")).unwrap();
        assert_eq!(
            target,
            yaml("data:\n  a: '1'\n  b: '3'\n  c: '4'\nmetadata:\n  name: cm\n")
        );
    }

    #[test]
    fn null_deletes_key() {
        let mut target = yaml("data:\n  a: '1'\n  b: '2'\n");
        strategic_merge(&mut target, &yaml("data:\n  a: null\n")).unwrap();
        assert_eq!(target, yaml("data:\n  b: '2'\n"));
    }

    #[test]
    fn named_lists_merge_by_name() {
        let mut target = yaml(
            r#"
containers:
  - name: app
    image: app:1
  - name: sidecar
    image: sidecar:1
"#,
        );
        let patch = yaml(
            r#"
containers:
  - name: app
    image: app:2
  - name: sidecar
    $patch: delete
  - name: logger
    image: logger:1
"#,
        );
        strategic_merge(&mut target, &patch).unwrap();
        assert_eq!(
            target,
            yaml(
                r#"
containers:
  - name: app
    image: app:2
  - name: logger
    image: logger:1
"#
            )
        );
    }

    #[test]
    fn plain_lists_replace() {
        let mut target = yaml("args: [a, b]\n");
        strategic_merge(&mut target, &yaml("args: [c]\n")).unwrap();
        assert_eq!(target, yaml("args: [c]\n"));
    }

    #[test]
    fn replace_directive_swaps_whole_map() {
        let mut target = yaml("data:\n  a: '1'\n  b: '2'\n");
        strategic_merge(&mut target, &yaml("data:\n  $patch: replace\n  z: '9'\n")).unwrap();
        assert_eq!(target, yaml("data:\n  z: '9'\n"));
    }

    #[test]
    fn unknown_directive_is_an_error() {
        let mut target = yaml("data:\n  a: '1'\n");
        let err = strategic_merge(&mut target, &yaml("data:\n  $patch: explode\n")).unwrap_err();
        assert!(err.contains("unsupported $patch directive"));
    }
}
