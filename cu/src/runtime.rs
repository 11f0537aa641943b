// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Abstracts the execution worker (§4.5) over a concrete Wasm engine.
//!
//! The cache/worker/evaluator plumbing below is written once against this
//! trait; `wasmtime_runtime::WasmtimeRuntime` is the production
//! implementation and `testing/integration`'s scripted kernel is the other,
//! so the pipeline's dedup/fold/persistence behaviour can be exercised
//! without a real Wasm toolchain.

use cu_shared::{Gas, Memory, MemoryPages, Message};

use crate::error::{CompileError, WasmInvocationError};

/// The worker's raw, pre-normalisation view of one invocation (spec §4.5
/// step 3, before step 4's defaulting/coercion is applied).
#[derive(Debug, Default)]
pub struct RawInvocationResult {
    pub memory: Memory,
    pub error: Option<String>,
    pub messages: Vec<Message>,
    pub spawns: Vec<cu_shared::Spawn>,
    pub output: serde_json::Value,
    pub gas_used: Option<Gas>,
}

pub trait WasmRuntime: Send + Sync + 'static {
    type Module: Send + Sync + 'static;
    type Instance: Send + 'static;

    fn compile(&self, wasm_bytes: &[u8]) -> Result<Self::Module, CompileError>;

    fn instantiate(
        &self,
        module: &Self::Module,
        gas_limit: Gas,
        mem_limit: MemoryPages,
    ) -> Result<Self::Instance, WasmInvocationError>;

    fn invoke(
        &self,
        instance: &mut Self::Instance,
        memory: Memory,
        message: &Message,
        ao_global: &serde_json::Value,
    ) -> Result<RawInvocationResult, WasmInvocationError>;
}
