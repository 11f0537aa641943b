// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

/// Failure to flatten or serialize a value into the wire form. Bubbles to
/// the caller unchanged; no partial HTTP request is ever emitted for an
/// encode that fails partway (spec §7).
#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error("root value must be a map or sequence, got a bare scalar")]
    RootMustBeContainer,
    #[error("unrepresentable leaf at `{path}`: {reason}")]
    Unrepresentable { path: String, reason: String },
}

/// Failure to reconstruct a value from its wire form.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("missing or malformed content-type boundary")]
    MissingBoundary,
    #[error("malformed multipart body: {0}")]
    MalformedMultipart(String),
    #[error("malformed ao-types sidecar at `{layer}`: {reason}")]
    MalformedTypeSidecar { layer: String, reason: String },
    #[error("leaf `{path}` declared type `{ty}` but its value could not be parsed as one")]
    TypeMismatch { path: String, ty: String },
}
