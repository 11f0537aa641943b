// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

/// A structured value the codec knows how to flatten: nested mappings,
/// ordered sequences, scalars, and byte blobs.
///
/// This is the codec's own representation rather than `serde_json::Value`
/// because the wire format distinguishes a handful of scalar kinds
/// (`integer`, `float`, `atom`) that JSON's single `Number` variant does
/// not, and because raw byte blobs (as opposed to UTF-8 strings) need their
/// own variant so they can be written into a multipart part without a UTF-8
/// round-trip.
#[derive(Clone, Debug, PartialEq)]
pub enum Encodable {
    Map(Vec<(String, Encodable)>),
    Seq(Vec<Encodable>),
    Str(String),
    Bytes(Vec<u8>),
    Integer(i64),
    Float(f64),
    /// A bare symbol such as `true`, `false`, or `null` — anything that is
    /// not a string but also not a number.
    Atom(String),
}

impl Encodable {
    pub fn map(entries: impl IntoIterator<Item = (impl Into<String>, Encodable)>) -> Self {
        Encodable::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn str(s: impl Into<String>) -> Self {
        Encodable::Str(s.into())
    }
}

impl From<i64> for Encodable {
    fn from(v: i64) -> Self {
        Encodable::Integer(v)
    }
}

impl From<&str> for Encodable {
    fn from(v: &str) -> Self {
        Encodable::Str(v.to_owned())
    }
}

impl From<String> for Encodable {
    fn from(v: String) -> Self {
        Encodable::Str(v)
    }
}

impl From<bool> for Encodable {
    fn from(v: bool) -> Self {
        Encodable::Atom(if v { "true" } else { "false" }.to_owned())
    }
}
