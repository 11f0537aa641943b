// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The evaluator (spec §4.7): drives one process's message stream through
//! the execution worker, folding each invocation's output into a running
//! `EvaluationOutput` and persisting as it goes.
//!
//! Grounded on `fvm::executor::DefaultExecutor::execute_message` as the
//! "drive one message through state, fold the result" shape (design note
//! "Replacing promise-chain control flow"): this is a plain `loop` over a
//! fallible external iterator, not a recursive async chain.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cu_shared::{Cursor, EvaluationOutput, Memory, Message, MessageStats, ProcessConfig, ProcessId, StreamId};

use crate::error::PersistenceError;
use crate::worker::{InvokeRequest, WorkerHandle};

/// One persisted evaluation record (spec §6 `saveEvaluation`).
#[derive(Clone, Debug)]
pub struct EvaluationRecord {
    pub process_id: ProcessId,
    pub message: Message,
    pub output: EvaluationOutput,
    pub ordinate: u64,
    pub timestamp: u64,
    pub block_height: u64,
    pub cron: Option<String>,
}

/// The final memory snapshot persisted once per run (spec §6
/// `saveLatestProcessMemory`).
#[derive(Clone, Debug)]
pub struct MemoryCheckpoint {
    pub process_id: ProcessId,
    pub memory: Memory,
    pub cursor: Cursor,
}

/// Bundles the handful of node-provided persistence operations the
/// evaluator needs, the way `fvm::externs::Externs` bundles the operations
/// a kernel needs from the embedding node.
pub trait EvaluationStore: Send + Sync {
    fn save_evaluation(&self, record: EvaluationRecord) -> Result<(), PersistenceError>;

    /// `Ok(true)` if `deep_hash` was already evaluated for this process at
    /// or before `lower_bound` (spec §6 `findMessageHashBefore`).
    fn find_message_hash_before(
        &self,
        deep_hash: &str,
        process_id: &ProcessId,
        lower_bound: &cu_shared::LowerBound,
    ) -> Result<bool, PersistenceError>;

    fn save_latest_process_memory(&self, checkpoint: MemoryCheckpoint) -> Result<(), PersistenceError>;
}

/// The lazy, ordered message sequence `EvaluationContext.messages` names in
/// spec §3. A trait, not a plain iterator, since fetching the next message
/// is itself a named suspension point (spec §5) that may hit the network
/// or a database - exactly the kind of boundary `fvm`'s own collaborator
/// traits (`Externs`, `Blockstore`) are drawn at.
pub trait MessageSource {
    fn next_message(&mut self) -> Result<Option<Message>, anyhow::Error>;
}

/// Cooperative cancellation flag, checked only between messages, never
/// inside an invocation (spec §5). Plays the role `tokio::sync::
/// CancellationToken` plays in an async embedding, without pulling `cu`
/// into the `tokio` runtime its worker threads have no need of.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Mutated by `Evaluator::evaluate` as it folds (spec §3 `EvaluationContext`).
pub struct EvaluationContext {
    pub id: ProcessId,
    pub config: ProcessConfig,
    pub stats: MessageStats,
    pub result: EvaluationOutput,
}

impl EvaluationContext {
    pub fn new(id: ProcessId, config: ProcessConfig, initial_memory: Memory) -> Self {
        Self {
            id,
            config,
            stats: MessageStats::default(),
            result: EvaluationOutput {
                memory: initial_memory,
                ..Default::default()
            },
        }
    }
}

pub struct Evaluator {
    worker: Arc<WorkerHandle>,
}

impl Evaluator {
    pub fn new(worker: Arc<WorkerHandle>) -> Self {
        Self { worker }
    }

    /// Drives `ctx` through `messages`, persisting via `store`. Returns the
    /// cursor to resume from - `initial_cursor` unchanged if the stream was
    /// empty, matching the resumption law (spec §8): resuming from an
    /// empty continuation is a no-op.
    pub fn evaluate(
        &self,
        ctx: &mut EvaluationContext,
        stream_id: &StreamId,
        initial_cursor: Cursor,
        messages: &mut dyn MessageSource,
        store: &dyn EvaluationStore,
        cancel: &CancelToken,
    ) -> Result<Cursor, PersistenceError> {
        let mut seen_crons: HashSet<(String, u64, u64)> = HashSet::new();
        let mut last = initial_cursor;

        loop {
            if cancel.is_cancelled() {
                log::info!("process {}: evaluator cancelled, checkpointing at {:?}", ctx.id, last);
                break;
            }

            let message = match messages
                .next_message()
                .map_err(PersistenceError::HashLookup)?
            {
                Some(message) => message,
                None => break,
            };

            if message.ordinate < last.ordinate
                || (message.ordinate == last.ordinate && message.timestamp < last.timestamp)
            {
                log::warn!(
                    "process {}: message ordinate {} out of order after cursor ordinate {}, evaluating anyway (caller error, not re-ordered)",
                    ctx.id, message.ordinate, last.ordinate
                );
            }

            ctx.stats.scheduled += 1;
            if message.cron.is_some() {
                ctx.stats.cron += 1;
            }

            if let Some(deep_hash) = &message.deep_hash {
                let already_evaluated =
                    store.find_message_hash_before(deep_hash, &ctx.id, &stream_id.lower_bound)?;
                if already_evaluated {
                    log::debug!("process {}: skipping duplicate deepHash {}", ctx.id, deep_hash);
                    continue;
                }
            } else if let Some(cron) = &message.cron {
                let key = (cron.clone(), message.timestamp, message.ordinate);
                if !seen_crons.insert(key) {
                    log::debug!(
                        "process {}: skipping duplicate cron {} at (ts={}, ord={})",
                        ctx.id, cron, message.timestamp, message.ordinate
                    );
                    continue;
                }
            }

            let mut sanitized = message.clone();
            sanitized.tags = message.sanitized_tags();

            let req = InvokeRequest {
                stream_id: stream_id.clone(),
                process_id: ctx.id.clone(),
                module_id: ctx.config.module_id.clone(),
                gas_limit: ctx.config.compute_limit,
                mem_limit: ctx.config.memory_limit,
                memory: ctx.result.memory.clone(),
                message: sanitized,
                ao_global: message.ao_global.clone(),
            };

            let output = self.worker.invoke(req);
            if output.error.is_some() {
                ctx.stats.error += 1;
                log::info!("process {}: message {} errored: {:?}", ctx.id, message.id, output.error);
            }

            ctx.result = std::mem::take(&mut ctx.result).fold(output);

            if !message.no_save && ctx.result.error.is_none() {
                store.save_evaluation(EvaluationRecord {
                    process_id: ctx.id.clone(),
                    message: message.clone(),
                    output: ctx.result.clone(),
                    ordinate: message.ordinate,
                    timestamp: message.timestamp,
                    block_height: message.block_height,
                    cron: message.cron.clone(),
                })?;
            }

            last = Cursor {
                timestamp: message.timestamp,
                block_height: message.block_height,
                ordinate: message.ordinate,
                cron: message.cron.clone(),
            };
        }

        store.save_latest_process_memory(MemoryCheckpoint {
            process_id: ctx.id.clone(),
            memory: ctx.result.memory.clone(),
            cursor: last.clone(),
        })?;

        Ok(last)
    }
}
