// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use base64::engine::general_purpose::{STANDARD as B64_STANDARD, URL_SAFE_NO_PAD as B64_URL};
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::EncodeError;
use crate::flatten::{flatten, LeafValue};
use crate::value::Encodable;

const HEADER_VALUE_MAX_BYTES: usize = 4096;

/// The result of encoding a value: the headers that carry small, top-level
/// leaves, and (if any leaf didn't fit in a header) the multipart body plus
/// the `Content-Type`/`Content-Digest` headers describing it.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedMessage {
    /// Header name (already lowercased) to value, sorted for determinism.
    pub headers: Vec<(String, String)>,
    pub content_type: Option<String>,
    pub content_digest: Option<String>,
    pub body: Option<Vec<u8>>,
}

/// Encodes structured values into the signed multipart wire form (spec
/// §4.1). Stateless aside from the `body_keys_header` toggle, so a single
/// instance can be shared across threads.
#[derive(Clone, Copy, Debug, Default)]
pub struct Codec {
    body_keys_header: bool,
}

impl Codec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a `body-keys` header carrying the sorted list of body part
    /// names, for servers that want to reconstruct the digest without
    /// parsing the multipart body. Off by default: spec.md §9 notes this
    /// header is commented out in the source it was distilled from and
    /// not required unless a server asks for it.
    pub fn with_body_keys_header(mut self) -> Self {
        self.body_keys_header = true;
        self
    }

    pub fn encode(&self, value: &Encodable) -> Result<EncodedMessage, EncodeError> {
        let leaves = flatten(value)?;

        let (header_leaves, body_leaves): (Vec<_>, Vec<_>) =
            leaves.into_iter().partition(|(key, value)| !goes_to_body(key, value));

        let mut headers: Vec<(String, String)> = header_leaves
            .into_iter()
            .map(|(k, v)| {
                let LeafValue::Text(text) = v else {
                    unreachable!("goes_to_body() always routes binary leaves to the body")
                };
                (k, text)
            })
            .collect();

        let (content_type, content_digest, body) = if body_leaves.is_empty() {
            (None, None, None)
        } else {
            if self.body_keys_header {
                let mut keys: Vec<&str> = body_leaves.iter().map(|(k, _)| k.as_str()).collect();
                keys.sort_unstable();
                headers.push(("body-keys".to_string(), keys.join(",")));
            }
            let (boundary, body) = build_multipart(&body_leaves);
            let digest = format!("sha-256=:{}:", B64_STANDARD.encode(Sha256::digest(&body)));
            (
                Some(format!("multipart/form-data; boundary=\"{boundary}\"")),
                Some(digest),
                Some(body),
            )
        };

        headers.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(EncodedMessage {
            headers,
            content_type,
            content_digest,
            body,
        })
    }
}

/// A leaf goes into the multipart body, rather than a header, if its path
/// is nested (contains `/`), its value is too large for a header, or it's
/// raw binary (headers can't carry arbitrary bytes).
fn goes_to_body(key: &str, value: &LeafValue) -> bool {
    key.contains('/') || value.byte_len() > HEADER_VALUE_MAX_BYTES || value.is_binary()
}

fn build_multipart(body_leaves: &[(String, LeafValue)]) -> (String, Vec<u8>) {
    let parts: Vec<Vec<u8>> = body_leaves
        .iter()
        .map(|(key, value)| {
            let mut part = format!("content-disposition: form-data;name=\"{key}\"\r\n\r\n").into_bytes();
            part.extend_from_slice(value.as_bytes());
            part
        })
        .collect();

    let joined = parts.join(&b"\r\n"[..]);
    let boundary = B64_URL.encode(Sha256::digest(&joined));

    let mut body = Vec::new();
    for part in &parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(part);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--").as_bytes());

    (boundary, body)
}
