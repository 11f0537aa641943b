// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Default in-process `EvaluationStore` (spec §6). SQL persistence is
//! explicitly out of scope (spec.md Non-goals / SPEC_FULL §1: "SQL
//! persistence... internals are external"); this gives the binary a
//! runnable default backing store rather than leaving `main` with nothing
//! to wire the evaluator against.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use cu::error::PersistenceError;
use cu::evaluator::{EvaluationRecord, EvaluationStore, MemoryCheckpoint};
use cu_shared::{LowerBound, ProcessId};

#[derive(Default)]
struct Inner {
    evaluations: Vec<EvaluationRecord>,
    deep_hashes: HashSet<(ProcessId, String)>,
    latest_memory: HashMap<ProcessId, MemoryCheckpoint>,
}

/// Process-local evaluation store. Swapping in a durable backend means
/// implementing `EvaluationStore` against it; nothing else in `cu-server`
/// needs to change.
pub struct InProcessStore {
    inner: Mutex<Inner>,
}

impl InProcessStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for InProcessStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluationStore for InProcessStore {
    fn save_evaluation(&self, record: EvaluationRecord) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(deep_hash) = &record.message.deep_hash {
            inner.deep_hashes.insert((record.process_id.clone(), deep_hash.clone()));
        }
        log::debug!(
            "persisted evaluation for process {} at ordinate {}",
            record.process_id,
            record.ordinate
        );
        inner.evaluations.push(record);
        Ok(())
    }

    fn find_message_hash_before(
        &self,
        deep_hash: &str,
        process_id: &ProcessId,
        _lower_bound: &LowerBound,
    ) -> Result<bool, PersistenceError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.deep_hashes.contains(&(process_id.clone(), deep_hash.to_string())))
    }

    fn save_latest_process_memory(&self, checkpoint: MemoryCheckpoint) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        log::debug!(
            "checkpointed process {} at ordinate {}",
            checkpoint.process_id,
            checkpoint.cursor.ordinate
        );
        inner.latest_memory.insert(checkpoint.process_id.clone(), checkpoint);
        Ok(())
    }
}
