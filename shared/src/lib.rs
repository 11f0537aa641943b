// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Data model shared by every crate in the compute-unit evaluation pipeline.
//!
//! Nothing in this crate touches Wasm, HTTP, or disk; it exists so that
//! `cu`, `cu_codec`, and `cu_server` agree on one vocabulary for the types
//! described in the specification's data model: module/stream identity,
//! process memory, messages, and the folded evaluation result.

mod cursor;
mod gas;
mod ids;
mod memory;
mod message;
mod output;
mod spawn;
mod stats;

pub use cursor::Cursor;
pub use gas::Gas;
pub use ids::{LowerBound, ModuleId, ProcessId, StreamId};
pub use memory::{Memory, MemoryEncoding, MemoryPages};
pub use message::{Message, Tag};
pub use output::{EvaluationOutput, OutputValue};
pub use spawn::Spawn;
pub use stats::MessageStats;

/// Static configuration an evaluation context is built from: which module to
/// run, and the compute/memory ceilings it runs under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessConfig {
    pub module_id: ModuleId,
    pub compute_limit: Gas,
    pub memory_limit: MemoryPages,
}
