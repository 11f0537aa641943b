// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::{BTreeMap, HashMap};

use crate::encode::{Codec, EncodedMessage};
use crate::error::DecodeError;
use crate::flatten::LeafValue;
use crate::value::Encodable;

impl Codec {
    /// Reconstruct the value that `encode` was given, inverting the
    /// flattening rule of spec §4.1. Used to check the codec's round-trip
    /// property (spec §8): `decode(encode(x))` is structurally equal to `x`
    /// for every representable `x`.
    ///
    /// Known limitation: a non-empty `Bytes` leaf that happens to be valid
    /// UTF-8 decodes back as a `Str`, since the wire form has no type tag
    /// distinguishing "binary" from "string" once both are non-empty.
    pub fn decode(&self, msg: &EncodedMessage) -> Result<Encodable, DecodeError> {
        let mut leaves: Vec<(String, LeafValue)> = Vec::new();
        for (k, v) in &msg.headers {
            if k == "body-keys" {
                continue;
            }
            leaves.push((k.clone(), LeafValue::Text(v.clone())));
        }
        if let Some(body) = &msg.body {
            let boundary = extract_boundary(
                msg.content_type
                    .as_deref()
                    .ok_or(DecodeError::MissingBoundary)?,
            )?;
            leaves.extend(split_multipart(body, &boundary)?);
        }

        let (layer_types, value_leaves) = extract_type_sidecars(leaves)?;
        let segmented: Vec<(Vec<String>, LeafValue)> = value_leaves
            .into_iter()
            .map(|(k, v)| (k.split('/').map(str::to_string).collect(), v))
            .collect();

        build(&[], &segmented, &layer_types)
    }
}

fn extract_type_sidecars(
    leaves: Vec<(String, LeafValue)>,
) -> Result<(HashMap<String, HashMap<String, String>>, Vec<(String, LeafValue)>), DecodeError> {
    let mut layer_types = HashMap::new();
    let mut value_leaves = Vec::new();
    for (key, value) in leaves {
        let layer = if key == "ao-types" {
            Some(String::new())
        } else {
            key.strip_suffix("/ao-types").map(str::to_string)
        };
        match layer {
            Some(layer) => {
                let LeafValue::Text(text) = value else {
                    return Err(DecodeError::MalformedTypeSidecar {
                        layer,
                        reason: "sidecar value was binary".to_string(),
                    });
                };
                let mut dict = HashMap::new();
                if !text.is_empty() {
                    for entry in text.split(',') {
                        let (k, t) = entry.split_once('=').ok_or_else(|| {
                            DecodeError::MalformedTypeSidecar {
                                layer: layer.clone(),
                                reason: format!("malformed entry `{entry}`"),
                            }
                        })?;
                        dict.insert(k.to_string(), t.to_string());
                    }
                }
                layer_types.insert(layer, dict);
            }
            None => value_leaves.push((key, value)),
        }
    }
    Ok((layer_types, value_leaves))
}

fn build(
    prefix: &[String],
    leaves: &[(Vec<String>, LeafValue)],
    layer_types: &HashMap<String, HashMap<String, String>>,
) -> Result<Encodable, DecodeError> {
    let layer_key = prefix.join("/");
    let types_at_layer = layer_types.get(&layer_key);

    let mut groups: BTreeMap<String, Vec<(Vec<String>, LeafValue)>> = BTreeMap::new();
    for (segs, value) in leaves {
        let first = segs[prefix.len()].clone();
        groups
            .entry(first)
            .or_default()
            .push((segs.clone(), value.clone()));
    }

    let as_seq_index: Option<Vec<(usize, String)>> = {
        let mut indexed: Vec<(usize, String)> = Vec::with_capacity(groups.len());
        let mut ok = !groups.is_empty();
        for key in groups.keys() {
            match key.parse::<usize>() {
                Ok(n) => indexed.push((n, key.clone())),
                Err(_) => {
                    ok = false;
                    break;
                }
            }
        }
        if ok {
            indexed.sort_by_key(|(n, _)| *n);
            if indexed.iter().enumerate().all(|(i, (n, _))| i == *n) {
                Some(indexed)
            } else {
                None
            }
        } else {
            None
        }
    };

    if let Some(indexed) = as_seq_index {
        let mut items = Vec::with_capacity(indexed.len());
        for (_, key) in indexed {
            let group = &groups[&key];
            items.push(resolve_child(prefix, &key, group, types_at_layer, layer_types)?);
        }
        Ok(Encodable::Seq(items))
    } else {
        let mut entries = Vec::with_capacity(groups.len());
        for (key, group) in &groups {
            let child = resolve_child(prefix, key, group, types_at_layer, layer_types)?;
            entries.push((key.clone(), child));
        }
        Ok(Encodable::Map(entries))
    }
}

fn resolve_child(
    prefix: &[String],
    key: &str,
    group: &[(Vec<String>, LeafValue)],
    types_at_layer: Option<&HashMap<String, String>>,
    layer_types: &HashMap<String, HashMap<String, String>>,
) -> Result<Encodable, DecodeError> {
    let mut child_prefix = prefix.to_vec();
    child_prefix.push(key.to_string());

    if group.len() == 1 && group[0].0.len() == child_prefix.len() {
        let ty = types_at_layer.and_then(|m| m.get(key));
        leaf_to_encodable(&child_prefix.join("/"), &group[0].1, ty)
    } else {
        build(&child_prefix, group, layer_types)
    }
}

fn leaf_to_encodable(
    path: &str,
    value: &LeafValue,
    ty: Option<&String>,
) -> Result<Encodable, DecodeError> {
    let text = || match value {
        LeafValue::Text(s) => Ok(s.as_str()),
        LeafValue::Bytes(_) => Err(DecodeError::TypeMismatch {
            path: path.to_string(),
            ty: ty.cloned().unwrap_or_default(),
        }),
    };
    match ty.map(String::as_str) {
        Some("integer") => text()?
            .parse::<i64>()
            .map(Encodable::Integer)
            .map_err(|_| DecodeError::TypeMismatch {
                path: path.to_string(),
                ty: "integer".to_string(),
            }),
        Some("float") => text()?
            .parse::<f64>()
            .map(Encodable::Float)
            .map_err(|_| DecodeError::TypeMismatch {
                path: path.to_string(),
                ty: "float".to_string(),
            }),
        Some("atom") => Ok(Encodable::Atom(text()?.to_string())),
        Some("empty-list") => Ok(Encodable::Seq(Vec::new())),
        Some("empty-binary") => Ok(Encodable::Str(String::new())),
        _ => Ok(match value {
            LeafValue::Text(s) => Encodable::Str(s.clone()),
            LeafValue::Bytes(b) => Encodable::Bytes(b.clone()),
        }),
    }
}

fn extract_boundary(content_type: &str) -> Result<String, DecodeError> {
    let marker = "boundary=\"";
    let start = content_type
        .find(marker)
        .ok_or(DecodeError::MissingBoundary)?
        + marker.len();
    let end = content_type[start..]
        .find('"')
        .ok_or(DecodeError::MissingBoundary)?
        + start;
    Ok(content_type[start..end].to_string())
}

fn split_multipart(body: &[u8], boundary: &str) -> Result<Vec<(String, LeafValue)>, DecodeError> {
    let delim = format!("--{boundary}").into_bytes();
    let mut positions = Vec::new();
    let mut i = 0;
    while let Some(pos) = find_subslice(&body[i..], &delim) {
        positions.push(i + pos);
        i += pos + delim.len();
    }
    if positions.len() < 2 {
        return Err(DecodeError::MalformedMultipart(
            "fewer than two boundary markers".to_string(),
        ));
    }

    let mut parts = Vec::with_capacity(positions.len() - 1);
    for w in positions.windows(2) {
        let start = w[0] + delim.len();
        let end = w[1];
        let mut chunk = &body[start..end];
        chunk = chunk.strip_prefix(b"\r\n").unwrap_or(chunk);
        chunk = chunk.strip_suffix(b"\r\n").unwrap_or(chunk);
        parts.push(parse_part(chunk)?);
    }
    Ok(parts)
}

fn parse_part(chunk: &[u8]) -> Result<(String, LeafValue), DecodeError> {
    let sep = find_subslice(chunk, b"\r\n\r\n").ok_or_else(|| {
        DecodeError::MalformedMultipart("missing header/value separator in part".to_string())
    })?;
    let header = std::str::from_utf8(&chunk[..sep])
        .map_err(|_| DecodeError::MalformedMultipart("non-utf8 part header".to_string()))?;
    let raw_value = &chunk[sep + 4..];

    let name = extract_name(header)?;
    let value = match std::str::from_utf8(raw_value) {
        Ok(s) => LeafValue::Text(s.to_string()),
        Err(_) => LeafValue::Bytes(raw_value.to_vec()),
    };
    Ok((name, value))
}

fn extract_name(header: &str) -> Result<String, DecodeError> {
    let marker = "name=\"";
    let start = header
        .find(marker)
        .ok_or_else(|| DecodeError::MalformedMultipart("missing name attribute".to_string()))?
        + marker.len();
    let end = header[start..]
        .find('"')
        .ok_or_else(|| DecodeError::MalformedMultipart("unterminated name attribute".to_string()))?
        + start;
    Ok(header[start..end].to_string())
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&i| &haystack[i..i + needle.len()] == needle)
}
