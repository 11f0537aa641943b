// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Production [`WasmRuntime`] backed by `wasmtime`.
//!
//! Grounded on `fvm::machine::engine`'s `default_wasmtime_config` (a
//! deterministic, Cranelift-NaN-canonicalizing config) and
//! `fvm::machine::limiter`'s `MemoryLimiter` trait, adapted to wasmtime's
//! own `ResourceLimiter` hook instead of `fvm`'s call-stack-wide tracker
//! since this engine limits one instance's linear memory, not a whole
//! call-stack's native memory. Gas is metered with wasmtime's built-in fuel
//! counter rather than `fvm-wasm-instrument`'s injected gas-accounting
//! calls: this engine has no per-opcode price list to encode, just a flat
//! compute ceiling, so fuel is the idiomatic fit (see DESIGN.md).
//!
//! Host/guest contract: a module exports `memory`, an allocator
//! `cu_alloc(len: i32) -> i32`, and `cu_invoke(msg_ptr, msg_len, global_ptr,
//! global_len, out_len_ptr) -> i32` that reads the message and `AoGlobal`
//! as UTF-8 JSON from guest memory and returns a pointer to a UTF-8 JSON
//! `EvaluationOutput`-shaped result, writing its length through
//! `out_len_ptr`. Linear memory itself *is* the checkpointed `Memory` - no
//! separate load/save calls are needed since wasmtime exposes the whole
//! region directly.

use cu_shared::{Gas, Memory, MemoryEncoding, MemoryPages, Message};
use wasmtime::{Engine, Linker, Module, ResourceLimiter, Store};

use crate::error::{CompileError, WasmInvocationError};
use crate::runtime::{RawInvocationResult, WasmRuntime};

pub fn default_wasmtime_config() -> wasmtime::Config {
    let mut config = wasmtime::Config::default();
    config.wasm_threads(false);
    config.wasm_simd(true);
    config.wasm_multi_memory(false);
    config.wasm_memory64(false);
    config.wasm_bulk_memory(true);
    config.wasm_reference_types(false);
    // Deterministic replay (spec §3 invariant 3) requires canonical NaNs:
    // two equivalent runs must not diverge over a NaN payload bit pattern.
    config.cranelift_nan_canonicalization(true);
    config.consume_fuel(true);
    config
}

struct InstanceLimits {
    max_pages: u32,
}

impl ResourceLimiter for InstanceLimits {
    fn memory_growing(
        &mut self,
        _current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        let desired_pages = desired.div_ceil(MemoryPages::PAGE_SIZE_BYTES as usize) as u32;
        Ok(desired_pages <= self.max_pages)
    }

    fn table_growing(
        &mut self,
        _current: usize,
        _desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }
}

struct StoreState {
    limits: InstanceLimits,
    gas_limit: u64,
}

pub struct WasmtimeRuntime {
    engine: Engine,
}

impl WasmtimeRuntime {
    pub fn new() -> anyhow::Result<Self> {
        let engine = Engine::new(&default_wasmtime_config())?;
        Ok(Self { engine })
    }
}

pub struct WasmtimeInstance {
    store: Store<StoreState>,
    instance: wasmtime::Instance,
}

impl WasmRuntime for WasmtimeRuntime {
    type Module = Module;
    type Instance = WasmtimeInstance;

    fn compile(&self, wasm_bytes: &[u8]) -> Result<Self::Module, CompileError> {
        Module::from_binary(&self.engine, wasm_bytes).map_err(|source| CompileError::InvalidModule {
            module_id: cu_shared::ModuleId::new("<unresolved>"),
            source,
        })
    }

    fn instantiate(
        &self,
        module: &Self::Module,
        gas_limit: Gas,
        mem_limit: MemoryPages,
    ) -> Result<Self::Instance, WasmInvocationError> {
        let mut store = Store::new(
            &self.engine,
            StoreState {
                limits: InstanceLimits {
                    max_pages: mem_limit.as_u32(),
                },
                gas_limit: gas_limit.as_u64(),
            },
        );
        store.limiter(|state| &mut state.limits);
        store
            .set_fuel(gas_limit.as_u64())
            .map_err(WasmInvocationError::Instantiation)?;

        let linker: Linker<StoreState> = Linker::new(&self.engine);
        let instance = linker
            .instantiate(&mut store, module)
            .map_err(WasmInvocationError::Instantiation)?;

        Ok(WasmtimeInstance { store, instance })
    }

    fn invoke(
        &self,
        instance: &mut Self::Instance,
        memory: Memory,
        message: &Message,
        ao_global: &serde_json::Value,
    ) -> Result<RawInvocationResult, WasmInvocationError> {
        let WasmtimeInstance { store, instance } = instance;

        let guest_memory = instance
            .get_memory(&mut *store, "memory")
            .ok_or_else(|| WasmInvocationError::Trap("module does not export `memory`".into()))?;

        // Seed linear memory with the prior checkpoint before invoking;
        // `Memory`'s encoding must already be `None` by the time it reaches
        // the worker (the checkpointer handles gzip at rest).
        if memory.encoding() != MemoryEncoding::None {
            return Err(WasmInvocationError::Trap(
                "instance invoke requires decoded memory".into(),
            ));
        }
        if guest_memory.data_size(&mut *store) < memory.len() {
            let extra_pages = ((memory.len() - guest_memory.data_size(&mut *store)) as u64)
                .div_ceil(MemoryPages::PAGE_SIZE_BYTES);
            guest_memory
                .grow(&mut *store, extra_pages)
                .map_err(|e| WasmInvocationError::Trap(e.to_string()))?;
        }
        guest_memory.write(&mut *store, 0, memory.bytes()).map_err(|e| WasmInvocationError::Trap(e.to_string()))?;

        let message_json = serde_json::to_vec(message)
            .map_err(|e| WasmInvocationError::MalformedResult(e.to_string()))?;
        let global_json = serde_json::to_vec(ao_global)
            .map_err(|e| WasmInvocationError::MalformedResult(e.to_string()))?;

        let alloc = instance
            .get_typed_func::<i32, i32>(&mut *store, "cu_alloc")
            .map_err(|e| WasmInvocationError::Trap(e.to_string()))?;
        let msg_ptr = alloc
            .call(&mut *store, message_json.len() as i32)
            .map_err(trap_reason)?;
        guest_memory
            .write(&mut *store, msg_ptr as usize, &message_json)
            .map_err(|e| WasmInvocationError::Trap(e.to_string()))?;
        let global_ptr = alloc.call(&mut *store, global_json.len() as i32).map_err(trap_reason)?;
        guest_memory
            .write(&mut *store, global_ptr as usize, &global_json)
            .map_err(|e| WasmInvocationError::Trap(e.to_string()))?;
        let out_len_ptr = alloc.call(&mut *store, 4).map_err(trap_reason)?;

        let invoke = instance
            .get_typed_func::<(i32, i32, i32, i32, i32), i32>(&mut *store, "cu_invoke")
            .map_err(|e| WasmInvocationError::Trap(e.to_string()))?;
        let result_ptr = invoke
            .call(
                &mut *store,
                (
                    msg_ptr,
                    message_json.len() as i32,
                    global_ptr,
                    global_json.len() as i32,
                    out_len_ptr,
                ),
            )
            .map_err(trap_reason)?;

        let mut len_bytes = [0u8; 4];
        guest_memory
            .read(&mut *store, out_len_ptr as usize, &mut len_bytes)
            .map_err(|e| WasmInvocationError::Trap(e.to_string()))?;
        let result_len = u32::from_le_bytes(len_bytes) as usize;

        let mut result_bytes = vec![0u8; result_len];
        guest_memory
            .read(&mut *store, result_ptr as usize, &mut result_bytes)
            .map_err(|e| WasmInvocationError::Trap(e.to_string()))?;

        let raw: GuestResult = serde_json::from_slice(&result_bytes)
            .map_err(|e| WasmInvocationError::MalformedResult(e.to_string()))?;

        let new_len = guest_memory.data_size(&mut *store);
        let mut snapshot = vec![0u8; new_len];
        guest_memory
            .read(&mut *store, 0, &mut snapshot)
            .map_err(|e| WasmInvocationError::Trap(e.to_string()))?;

        let gas_limit = store.data().gas_limit;
        let gas_used = store
            .get_fuel()
            .ok()
            .map(|remaining| Gas::new(gas_limit.saturating_sub(remaining)));

        Ok(RawInvocationResult {
            memory: Memory::new(snapshot, MemoryEncoding::None),
            error: raw.error,
            messages: raw.messages,
            spawns: raw.spawns,
            output: raw.output,
            gas_used,
        })
    }
}

/// A module traps mid-call as a fuel-exhaustion or guest panic; either way
/// it's reported as the evaluation-time error the worker folds into
/// `EvaluationOutput`, never propagated past it (spec §4.5 step 3).
fn trap_reason(err: anyhow::Error) -> WasmInvocationError {
    if err.to_string().contains("fuel") {
        WasmInvocationError::OutOfGas
    } else {
        WasmInvocationError::Trap(err.to_string())
    }
}

#[derive(serde::Deserialize)]
struct GuestResult {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    spawns: Vec<cu_shared::Spawn>,
    #[serde(default = "serde_json::Value::default")]
    output: serde_json::Value,
}
