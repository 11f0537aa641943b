// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Execution worker (spec §4.5): wraps a compiled module into a cached,
//! gas-and-memory-limited instance and exposes a synchronous-looking
//! `invoke`. Runs on a dedicated OS thread (design note "Replacing the
//! in-worker isolation via worker threads"), communicating over typed
//! channels so a runaway guest can never stall the evaluator's thread.

use std::sync::Arc;

use cu_shared::{EvaluationOutput, Gas, MemoryPages};
use cu_shared::{Memory, Message, ModuleId, OutputValue, ProcessId, StreamId};

use crate::instance_cache::{InstanceCache, LiveInstance};
use crate::loader::ModuleLoader;
use crate::runtime::{RawInvocationResult, WasmRuntime};

pub struct InvokeRequest {
    pub stream_id: StreamId,
    pub process_id: ProcessId,
    pub module_id: ModuleId,
    pub gas_limit: Gas,
    pub mem_limit: MemoryPages,
    pub memory: Memory,
    pub message: Message,
    pub ao_global: serde_json::Value,
}

/// The in-process half of the worker: owns the instance cache and loader
/// reference. Lives entirely inside the dedicated worker thread; nothing
/// outside [`WorkerHandle`] ever touches it directly.
struct ExecutionWorker<R: WasmRuntime> {
    runtime: Arc<R>,
    loader: Arc<ModuleLoader<R>>,
    instance_cache: InstanceCache<R>,
}

impl<R: WasmRuntime> ExecutionWorker<R> {
    fn invoke_one(&mut self, req: InvokeRequest) -> EvaluationOutput {
        let InvokeRequest {
            stream_id,
            process_id: _,
            module_id,
            gas_limit,
            mem_limit,
            memory,
            message,
            ao_global,
        } = req;

        let pre_memory = memory.clone();

        let mut live = match self.take_or_instantiate(&stream_id, &module_id, gas_limit, mem_limit) {
            Ok(live) => live,
            Err(reason) => {
                log::warn!("stream {stream_id}: {reason}");
                return error_output(pre_memory, reason);
            }
        };

        let output = match self.runtime.invoke(&mut live.instance, memory, &message, &ao_global) {
            Ok(raw) => normalize(raw, pre_memory),
            Err(err) => {
                log::warn!("stream {stream_id}: invocation failed: {err}");
                error_output(pre_memory, err.to_string())
            }
        };

        if output.error.is_none() {
            self.instance_cache.put(stream_id, live);
        } else {
            // §9 open question, resolved: evict the cached instance after
            // an error, hardening against a possibly corrupted linear
            // memory post-trap (diverges from the legacy non-evicting
            // behaviour). `live` simply drops here.
            log::debug!("stream {stream_id}: evicting cached instance after error");
        }

        output
    }

    fn take_or_instantiate(
        &mut self,
        stream_id: &StreamId,
        module_id: &ModuleId,
        gas_limit: Gas,
        mem_limit: MemoryPages,
    ) -> Result<LiveInstance<R>, String> {
        if let Some(live) = self.instance_cache.take(stream_id) {
            if &live.module_id == module_id {
                return Ok(live);
            }
            // Module changed under the same stream id: drop the stale
            // instance and fall through to a fresh instantiation.
        }

        let module = self
            .loader
            .load(module_id)
            .map_err(|err| err.to_string())?;
        let instance = self
            .runtime
            .instantiate(&module, gas_limit, mem_limit)
            .map_err(|err| err.to_string())?;
        Ok(LiveInstance {
            module_id: module_id.clone(),
            instance,
        })
    }
}

fn normalize(raw: RawInvocationResult, pre_memory: Memory) -> EvaluationOutput {
    let memory = if raw.error.is_some() { pre_memory } else { raw.memory };
    EvaluationOutput {
        memory,
        error: raw.error,
        messages: raw.messages,
        spawns: raw.spawns,
        output: OutputValue::normalize(raw.output),
        gas_used: raw.gas_used,
    }
}

fn error_output(pre_memory: Memory, reason: String) -> EvaluationOutput {
    EvaluationOutput {
        memory: pre_memory,
        error: Some(reason),
        ..Default::default()
    }
}

type ReplyTx = crossbeam_channel::Sender<EvaluationOutput>;

/// A handle to a running execution worker thread. Cheap to clone-by-`Arc`
/// at call sites; `invoke` blocks the calling thread until the worker
/// replies, giving callers the "synchronous-looking call" spec §4.5 asks
/// for while the actual Wasm runs in isolation.
pub struct WorkerHandle {
    sender: Option<crossbeam_channel::Sender<(InvokeRequest, ReplyTx)>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn spawn<R: WasmRuntime>(
        runtime: Arc<R>,
        loader: Arc<ModuleLoader<R>>,
        instance_cache_capacity: usize,
    ) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded::<(InvokeRequest, ReplyTx)>();
        let thread = std::thread::Builder::new()
            .name("cu-execution-worker".to_string())
            .spawn(move || {
                let mut worker = ExecutionWorker {
                    runtime,
                    loader,
                    instance_cache: InstanceCache::new(instance_cache_capacity),
                };
                for (req, reply) in receiver {
                    let output = worker.invoke_one(req);
                    // The caller may have given up waiting (e.g. on
                    // cancellation); a dropped receiver is not this
                    // thread's problem.
                    let _ = reply.send(output);
                }
            })
            .expect("failed to spawn execution worker thread");

        WorkerHandle {
            sender: Some(sender),
            thread: Some(thread),
        }
    }

    /// Blocks until the worker thread has produced a result. Spec §4.5: a
    /// runaway guest stalls only the worker thread, never this caller's.
    pub fn invoke(&self, req: InvokeRequest) -> EvaluationOutput {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.sender
            .as_ref()
            .expect("sender only ever taken during drop")
            .send((req, reply_tx))
            .expect("execution worker thread terminated unexpectedly");
        reply_rx
            .recv()
            .expect("execution worker thread dropped its reply channel")
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        // Drop the sender *before* joining: the worker thread's `for (req,
        // reply) in receiver` loop only ends once every sender clone is
        // gone, so joining first would deadlock against ourselves.
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
