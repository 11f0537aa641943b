// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Typed errors at each component boundary (spec §7), mirroring the
//! `fvm::kernel::error::ExecutionError` style: one enum per boundary,
//! `anyhow` wrapping whatever the underlying library threw.

use cu_shared::{ModuleId, ProcessId};

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("module {module_id} failed to validate or compile: {source}")]
    InvalidModule {
        module_id: ModuleId,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ModuleFetchError {
    #[error("gateway returned HTTP {status} fetching module {module_id}")]
    Http { module_id: ModuleId, status: u16 },

    #[error("gateway request for module {module_id} failed: {source}")]
    Transport {
        module_id: ModuleId,
        #[source]
        source: anyhow::Error,
    },
}

/// Any failure raised while a compiled module runs: a trap, exhausted gas,
/// an exceeded memory limit, or a user-thrown error from inside the guest.
#[derive(Debug, thiserror::Error)]
pub enum WasmInvocationError {
    #[error("wasm trap: {0}")]
    Trap(String),

    #[error("gas limit exceeded")]
    OutOfGas,

    #[error("memory limit exceeded")]
    MemoryLimitExceeded,

    #[error("instantiation failed: {0}")]
    Instantiation(#[source] anyhow::Error),

    #[error("malformed invocation result: {0}")]
    MalformedResult(String),
}

/// The module loader's cascade (§4.3) fails with either half of the load,
/// never both.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] ModuleFetchError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Failures from `checkpoint::hash` (spec §4.6). `MemoryEncoding` already
/// makes an unsupported tag unrepresentable, so the only way hashing fails
/// is the gzip stream itself erroring out mid-read.
#[derive(Debug, thiserror::Error)]
pub enum MemoryHashError {
    #[error("io error hashing memory: {0}")]
    Io(#[from] std::io::Error),
}

/// The only error kind that aborts `Evaluator::evaluate` (spec §7): by the
/// time either variant is raised, `ctx.result` has already absorbed the
/// fold, so retrying the same input against the same collaborators is safe.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to save evaluation for process {process_id}: {source}")]
    SaveEvaluation {
        process_id: ProcessId,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to save latest memory checkpoint for process {process_id}: {source}")]
    SaveLatestMemory {
        process_id: ProcessId,
        #[source]
        source: anyhow::Error,
    },

    #[error("deep-hash dedup lookup failed: {0}")]
    HashLookup(#[source] anyhow::Error),
}
