// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Per-process gate serializing concurrent `evaluate` calls onto the same
//! in-flight run (spec §5 "Per-process sequential evaluation, cross-process
//! parallel evaluation"), grounded on `fvm`'s engine-level concurrency
//! semaphore. A plain `std::sync::Mutex<HashMap<..>>` of per-process
//! `tokio::sync::Mutex` handles does the job here; a concurrent map crate
//! isn't part of this workspace's dependency stack, so this reuses what's
//! already pulled in rather than adding one (see DESIGN.md).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cu_shared::ProcessId;

#[derive(Default)]
pub struct PendingRegistry {
    gates: Mutex<HashMap<ProcessId, Arc<tokio::sync::Mutex<()>>>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the gate for `process_id`, creating one on first use.
    /// Holding its lock for the duration of an `evaluate` call is what
    /// keeps two concurrent requests for the same process from racing the
    /// same `InstanceCache` entry.
    pub fn gate_for(&self, process_id: &ProcessId) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());
        gates
            .entry(process_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
