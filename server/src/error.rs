// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Server-local error types, following the same one-enum-per-boundary shape
//! as `cu::error` rather than collapsing everything into `anyhow`.

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed signed data item: {0}")]
    Decode(#[from] cu_codec::DecodeError),

    #[error("data item missing required `{0}` header")]
    MissingField(&'static str),

    #[error("evaluation failed: {0}")]
    Persistence(#[from] cu::error::PersistenceError),
}
