// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Wires every collaborator trait into one runnable pipeline and drives the
//! `POST /message` ingest path (spec §6), including the post-response
//! crank.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use cu::evaluator::{CancelToken, EvaluationContext, Evaluator, MessageSource};
use cu::loader::ModuleLoader;
use cu::wasmtime_runtime::WasmtimeRuntime;
use cu::worker::WorkerHandle;
use cu::ArtifactStore;
use cu_shared::{Cursor, LowerBound, Memory, Message, ModuleId, ProcessConfig, ProcessId, StreamId, Tag};

use crate::config::Config;
use crate::crank::{spawn_process_id, CrankItem, CrankQueue};
use crate::error::IngestError;
use crate::gateway::HttpGateway;
use crate::registry::PendingRegistry;
use crate::store::InProcessStore;

struct OneShotMessageSource(Option<Message>);

impl MessageSource for OneShotMessageSource {
    fn next_message(&mut self) -> Result<Option<Message>, anyhow::Error> {
        Ok(self.0.take())
    }
}

/// Everything kept for one process between requests: where its evaluator
/// left off, and the dedicated worker thread evaluating it (spec §5
/// "process-local instance cache" - one `WorkerHandle` per active process,
/// created lazily on first message and reused after).
struct ProcessHandle {
    evaluator: Evaluator,
    context: EvaluationContext,
    cursor: Cursor,
}

/// The process entry point's full collaborator graph: one shared
/// `ArtifactStore`/`ModuleLoader` (spec §5 "Shared module/binary caches"),
/// one dedicated execution worker per active process, and the in-process
/// store/gateway default implementations (spec §1: "a default in-process
/// implementation sufficient for a runnable binary").
pub struct App {
    pub config: Config,
    runtime: Arc<WasmtimeRuntime>,
    loader: Arc<ModuleLoader<WasmtimeRuntime>>,
    store: Arc<InProcessStore>,
    registry: Arc<PendingRegistry>,
    processes: Mutex<HashMap<ProcessId, ProcessHandle>>,
    ordinates: Mutex<HashMap<ProcessId, u64>>,
    cancel: CancelToken,
}

impl App {
    pub fn new(config: Config, tokio_handle: tokio::runtime::Handle) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.wasm_binary_file_directory)?;
        std::fs::create_dir_all(&config.dump_path)?;

        let runtime = Arc::new(WasmtimeRuntime::new()?);
        let artifact_store = Arc::new(ArtifactStore::new(
            config.wasm_binary_file_directory.clone(),
            config.wasm_module_cache_max_size,
        ));
        let gateway = Arc::new(HttpGateway::new(config.gateway_url.clone(), tokio_handle));
        let loader = Arc::new(ModuleLoader::new(runtime.clone(), artifact_store, gateway));

        Ok(Self {
            config,
            runtime,
            loader,
            store: Arc::new(InProcessStore::new()),
            registry: Arc::new(PendingRegistry::new()),
            processes: Mutex::new(HashMap::new()),
            ordinates: Mutex::new(HashMap::new()),
            cancel: CancelToken::new(),
        })
    }

    /// Cooperative shutdown: subsequent `evaluate` calls checkpoint at the
    /// next message boundary and return instead of continuing (spec §5).
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    fn next_ordinate(&self, process_id: &ProcessId) -> u64 {
        let mut ordinates = self.ordinates.lock().unwrap_or_else(|e| e.into_inner());
        let ordinate = ordinates.entry(process_id.clone()).or_insert(0);
        let current = *ordinate;
        *ordinate += 1;
        current
    }

    /// Mints the evaluator-scoped `Message` fields the scheduler would
    /// normally assign, forwards the message to the process's evaluator,
    /// and runs the crank over whatever that evaluation produced (spec
    /// §6). Run via `spawn_blocking` *after* the `202` response has
    /// already been sent - this is the "crank continues asynchronously"
    /// half of the ingest path, never the request/response path itself.
    pub fn dispatch_and_crank(
        &self,
        process_id: ProcessId,
        owner: String,
        tags: Vec<Tag>,
        id: String,
    ) -> Result<(), IngestError> {
        let message = Message {
            id,
            timestamp: now_ms(),
            owner,
            tags,
            block_height: 0,
            ordinate: self.next_ordinate(&process_id),
            cron: None,
            deep_hash: None,
            no_save: false,
            ao_global: serde_json::Value::Null,
        };

        let mut queue = CrankQueue::new(self.config.max_crank_depth);
        let output = self.evaluate_one(&process_id, message)?;
        queue.push_output(&process_id, &output);

        while let Some((item, depth)) = queue.pop() {
            match item {
                CrankItem::Message { process_id, message } => match self.evaluate_one(&process_id, message) {
                    Ok(output) => queue.extend(&process_id, &output, depth),
                    Err(err) => log::warn!("crank: dispatch to process {process_id} failed: {err}"),
                },
                CrankItem::Spawn { spawn } => {
                    let spawned_id = spawn_process_id(&spawn);
                    let message = Message {
                        id: spawned_id.as_str().to_string(),
                        timestamp: now_ms(),
                        owner: spawn.owner.clone(),
                        tags: spawn.tags.clone(),
                        block_height: 0,
                        ordinate: self.next_ordinate(&spawned_id),
                        cron: None,
                        deep_hash: None,
                        no_save: false,
                        ao_global: spawn.data.clone(),
                    };
                    match self.evaluate_one(&spawned_id, message) {
                        Ok(output) => queue.extend(&spawned_id, &output, depth),
                        Err(err) => log::warn!("crank: spawn dispatch to process {spawned_id} failed: {err}"),
                    }
                }
            }
        }

        if queue.dropped() > 0 {
            log::warn!("process {process_id}: crank dropped {} item(s) at max depth", queue.dropped());
        }

        Ok(())
    }

    fn evaluate_one(&self, process_id: &ProcessId, message: Message) -> Result<cu_shared::EvaluationOutput, IngestError> {
        let gate = self.registry.gate_for(process_id);
        let _permit = gate.blocking_lock();

        let mut processes = self.processes.lock().unwrap_or_else(|e| e.into_inner());
        let handle = processes.entry(process_id.clone()).or_insert_with(|| {
            let worker = Arc::new(WorkerHandle::spawn(
                self.runtime.clone(),
                self.loader.clone(),
                self.config.wasm_instance_cache_max_size,
            ));
            ProcessHandle {
                evaluator: Evaluator::new(worker),
                context: EvaluationContext::new(
                    process_id.clone(),
                    ProcessConfig {
                        module_id: ModuleId::new(process_id.as_str()),
                        compute_limit: self.config.compute_limit(),
                        memory_limit: self.config.memory_limit(),
                    },
                    Memory::empty(),
                ),
                cursor: Cursor {
                    timestamp: 0,
                    block_height: 0,
                    ordinate: 0,
                    cron: None,
                },
            }
        });

        let stream_id = StreamId::new(process_id.clone(), LowerBound::Ordinate(handle.cursor.ordinate));
        let mut source = OneShotMessageSource(Some(message));

        let cursor = handle
            .evaluator
            .evaluate(
                &mut handle.context,
                &stream_id,
                handle.cursor.clone(),
                &mut source,
                self.store.as_ref(),
                &self.cancel,
            )
            .map_err(|err| {
                log::error!("process {process_id}: {err}");
                IngestError::from(err)
            })?;
        handle.cursor = cursor;

        Ok(handle.context.result.clone())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
