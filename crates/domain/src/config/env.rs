//! Environment-variable overrides for the YAML config.
//!
//! Variables of the form `RANTS_<SECTION>__<KEY>[__<INDEX>__<SUBKEY>]` are
//! applied on top of the parsed file before the typed deserialize. Segments
//! are split on `__` and lowercased; a numeric segment indexes into a
//! sequence (created/extended as needed); values are parsed as YAML scalars
//! so `9090`, `true`, and `0.5` keep their types.
//!
//! Examples: `RANTS_SERVER__PORT=9090`,
//! `RANTS_AUTH__API_KEYS__0__TENANT_ID=acme`.

use serde_yaml::Value;

pub const ENV_PREFIX: &str = "RANTS_";

/// Apply all matching overrides from `vars` onto a YAML value tree.
pub fn apply_env_overrides(root: &mut Value, vars: impl Iterator<Item = (String, String)>) {
    for (name, raw) in vars {
        let Some(rest) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }
        let segments: Vec<String> = rest.split("__").map(|s| s.to_ascii_lowercase()).collect();
        if segments.iter().any(|s| s.is_empty()) {
            tracing::warn!(var = %name, "ignoring malformed override variable");
            continue;
        }
        let value = parse_scalar(&raw);
        set_path(root, &segments, value);
    }
}

/// Parse a scalar override value, falling back to a plain string.
fn parse_scalar(raw: &str) -> Value {
    serde_yaml::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn set_path(node: &mut Value, segments: &[String], value: Value) {
    let (head, rest) = match segments.split_first() {
        Some(split) => split,
        None => return,
    };

    if let Ok(index) = head.parse::<usize>() {
        if !node.is_sequence() {
            *node = Value::Sequence(Vec::new());
        }
        if let Value::Sequence(seq) = node {
            while seq.len() <= index {
                seq.push(Value::Null);
            }
            if rest.is_empty() {
                seq[index] = value;
            } else {
                set_path(&mut seq[index], rest, value);
            }
        }
        return;
    }

    if !node.is_mapping() {
        *node = Value::Mapping(Default::default());
    }
    if let Value::Mapping(map) = node {
        let key = Value::String(head.clone());
        if rest.is_empty() {
            map.insert(key, value);
            return;
        }
        if !map.contains_key(&key) {
            map.insert(key.clone(), Value::Null);
        }
        if let Some(child) = map.get_mut(&key) {
            set_path(child, rest, value);
        }
    }
}
