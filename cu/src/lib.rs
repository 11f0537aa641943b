// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The compute-unit evaluation pipeline's hard engineering core: artifact
//! store, module loader, instance cache, execution worker, memory
//! checkpointer, and evaluator (spec §4.2-§4.7).

pub mod artifact;
pub mod cache;
pub mod checkpoint;
pub mod error;
pub mod evaluator;
pub mod instance_cache;
pub mod loader;
pub mod runtime;
pub mod wasmtime_runtime;
pub mod worker;

pub use artifact::ArtifactStore;
pub use cache::BoundedCache;
pub use evaluator::{CancelToken, EvaluationContext, EvaluationRecord, EvaluationStore, Evaluator, MemoryCheckpoint, MessageSource};
pub use instance_cache::{InstanceCache, LiveInstance};
pub use loader::{ModuleGateway, ModuleLoader};
pub use runtime::{RawInvocationResult, WasmRuntime};
pub use wasmtime_runtime::WasmtimeRuntime;
pub use worker::{InvokeRequest, WorkerHandle};
