// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use serde::{Deserialize, Serialize};

use crate::gas::Gas;
use crate::memory::Memory;
use crate::message::Message;
use crate::spawn::Spawn;

/// The `Output` field of an [`EvaluationOutput`]: either plain text or a
/// structured JSON value, per spec §4.5 step 4 ("if a string or object, it
/// passes through unchanged").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputValue {
    Text(String),
    Json(serde_json::Value),
}

impl OutputValue {
    /// Normalise a worker-returned value: numbers become their decimal
    /// string form, strings/objects pass through unchanged (spec §4.5 step
    /// 4).
    pub fn normalize(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => OutputValue::Text(s),
            serde_json::Value::Number(n) => OutputValue::Text(n.to_string()),
            serde_json::Value::Null => OutputValue::Text(String::new()),
            other => OutputValue::Json(other),
        }
    }
}

impl Default for OutputValue {
    fn default() -> Self {
        OutputValue::Text(String::new())
    }
}

/// The result of folding zero or more message invocations together.
///
/// Missing fields from a raw worker result default to `messages = []`,
/// `spawns = []`, `output = ""` (spec §4.5 step 4); an `error` suppresses
/// the memory update for that step (spec §4.5 step 5).
#[derive(Clone, Debug, Default)]
pub struct EvaluationOutput {
    pub memory: Memory,
    pub error: Option<String>,
    pub messages: Vec<Message>,
    pub spawns: Vec<Spawn>,
    pub output: OutputValue,
    pub gas_used: Option<Gas>,
}

impl EvaluationOutput {
    /// Fold `next` into `self`, implementing spec §4.5 step 5 / §4.7 step 5:
    /// an errored step never mutates `memory`; every other field is taken
    /// from `next` since each invocation returns the process's *new* full
    /// state, not a delta.
    pub fn fold(self, next: EvaluationOutput) -> EvaluationOutput {
        let memory = if next.error.is_some() {
            self.memory
        } else {
            next.memory
        };
        EvaluationOutput {
            memory,
            error: next.error,
            messages: next.messages,
            spawns: next.spawns,
            output: next.output,
            gas_used: next.gas_used,
        }
    }
}
