// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::BTreeMap;

use crate::error::EncodeError;
use crate::value::Encodable;

/// A flattened leaf's value: a UTF-8 string or a raw byte blob. Scalars,
/// atoms, and the type-sidecar dictionaries are always `Text`; only an
/// explicit `Encodable::Bytes` leaf produces `Bytes`.
#[derive(Clone, Debug, PartialEq)]
pub enum LeafValue {
    Text(String),
    Bytes(Vec<u8>),
}

impl LeafValue {
    pub fn byte_len(&self) -> usize {
        match self {
            LeafValue::Text(s) => s.len(),
            LeafValue::Bytes(b) => b.len(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            LeafValue::Text(s) => s.as_bytes(),
            LeafValue::Bytes(b) => b,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, LeafValue::Bytes(_))
    }
}

const TYPE_INTEGER: &str = "integer";
const TYPE_FLOAT: &str = "float";
const TYPE_ATOM: &str = "atom";
const TYPE_EMPTY_LIST: &str = "empty-list";
const TYPE_EMPTY_BINARY: &str = "empty-binary";

/// Flatten `root` into dotted-slash leaf paths, lowercased, plus one
/// `ao-types` sidecar leaf per nesting layer that carried a typed
/// non-string child (spec §4.1 "Flattening rule").
///
/// Map keys are processed in sorted order and sidecar dictionaries are
/// built from sorted entries, so the result - and therefore the eventual
/// content digest - depends only on the canonical flattening, never on the
/// caller's insertion order (spec §8).
pub fn flatten(root: &Encodable) -> Result<Vec<(String, LeafValue)>, EncodeError> {
    let mut leaves = Vec::new();
    let mut layer_types: BTreeMap<String, BTreeMap<String, &'static str>> = BTreeMap::new();
    flatten_container("", root, &mut leaves, &mut layer_types)?;

    for (layer_path, entries) in layer_types {
        let dict = entries
            .iter()
            .map(|(k, t)| format!("{k}={t}"))
            .collect::<Vec<_>>()
            .join(",");
        let key = if layer_path.is_empty() {
            "ao-types".to_string()
        } else {
            format!("{layer_path}/ao-types")
        };
        leaves.push((key, LeafValue::Text(dict)));
    }

    leaves.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(leaves)
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}/{key}")
    }
}

fn flatten_container(
    path: &str,
    node: &Encodable,
    leaves: &mut Vec<(String, LeafValue)>,
    layer_types: &mut BTreeMap<String, BTreeMap<String, &'static str>>,
) -> Result<(), EncodeError> {
    match node {
        Encodable::Map(entries) => {
            let mut sorted: Vec<(String, &Encodable)> = entries
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            for (key, value) in sorted {
                flatten_child(path, &key, value, leaves, layer_types)?;
            }
            Ok(())
        }
        Encodable::Seq(items) => {
            for (i, value) in items.iter().enumerate() {
                flatten_child(path, &i.to_string(), value, leaves, layer_types)?;
            }
            Ok(())
        }
        _ => Err(EncodeError::RootMustBeContainer),
    }
}

fn flatten_child(
    path: &str,
    key: &str,
    value: &Encodable,
    leaves: &mut Vec<(String, LeafValue)>,
    layer_types: &mut BTreeMap<String, BTreeMap<String, &'static str>>,
) -> Result<(), EncodeError> {
    let child_path = join_path(path, key);
    let mut mark_type = |t: &'static str| {
        layer_types
            .entry(path.to_string())
            .or_default()
            .insert(key.to_string(), t);
    };

    match value {
        Encodable::Map(entries) => {
            if entries.is_empty() {
                leaves.push((child_path, LeafValue::Text(String::new())));
                mark_type(TYPE_EMPTY_LIST);
                Ok(())
            } else {
                flatten_container(&child_path, value, leaves, layer_types)
            }
        }
        Encodable::Seq(items) => {
            if items.is_empty() {
                leaves.push((child_path, LeafValue::Text(String::new())));
                mark_type(TYPE_EMPTY_LIST);
                Ok(())
            } else {
                flatten_container(&child_path, value, leaves, layer_types)
            }
        }
        Encodable::Str(s) => {
            if s.is_empty() {
                leaves.push((child_path, LeafValue::Text(String::new())));
                mark_type(TYPE_EMPTY_BINARY);
            } else {
                leaves.push((child_path, LeafValue::Text(s.clone())));
            }
            Ok(())
        }
        Encodable::Bytes(b) => {
            if b.is_empty() {
                leaves.push((child_path, LeafValue::Text(String::new())));
                mark_type(TYPE_EMPTY_BINARY);
            } else {
                leaves.push((child_path, LeafValue::Bytes(b.clone())));
            }
            Ok(())
        }
        Encodable::Integer(n) => {
            leaves.push((child_path, LeafValue::Text(n.to_string())));
            mark_type(TYPE_INTEGER);
            Ok(())
        }
        Encodable::Float(f) => {
            if !f.is_finite() {
                return Err(EncodeError::Unrepresentable {
                    path: child_path,
                    reason: "non-finite float".to_string(),
                });
            }
            leaves.push((child_path, LeafValue::Text(format_float(*f))));
            mark_type(TYPE_FLOAT);
            Ok(())
        }
        Encodable::Atom(a) => {
            leaves.push((child_path, LeafValue::Text(a.clone())));
            mark_type(TYPE_ATOM);
            Ok(())
        }
    }
}

/// A deterministic decimal rendering for floats: shortest round-trippable
/// form, same approach `serde_json` uses for `Number::from_f64` output.
fn format_float(f: f64) -> String {
    if f == f.trunc() && f.abs() < 1e15 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}
