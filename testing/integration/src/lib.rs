// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Fakes standing in for every collaborator the evaluation pipeline
//! depends on, plus a scripted test "Wasm" kernel - grounded on `fvm`'s own
//! `testing/integration` crate pattern of swappable test actors driven
//! through the same `Executor` trait real actors use.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use cu::error::{CompileError, ModuleFetchError, WasmInvocationError};
use cu::evaluator::{EvaluationRecord, EvaluationStore, MemoryCheckpoint, MessageSource};
use cu::loader::ModuleGateway;
use cu::runtime::{RawInvocationResult, WasmRuntime};
use cu_shared::{Gas, LowerBound, Memory, MemoryEncoding, MemoryPages, Message, ModuleId, ProcessId, Tag};

/// The two test kernels named in spec §8: `happy` accumulates which
/// `function` tags it has seen into its process memory; `sad` errors on an
/// `error` tag and otherwise counts invocations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Program {
    Happy,
    Sad,
}

/// A scripted [`WasmRuntime`]: "compiling" is just recognising one of the
/// two marker byte strings below, and "instantiating" is a no-op - all the
/// state lives in `Memory`, exactly like a real guest.
pub struct ScriptedRuntime {
    /// Every invocation's sanitized tags, in call order - lets tests assert
    /// on tag sanitisation (spec §8 scenario 6) without the kernel itself
    /// needing to know about privileged tags.
    pub received_tags: Arc<Mutex<Vec<Vec<Tag>>>>,
}

pub const HAPPY_WASM: &[u8] = b"happy";
pub const SAD_WASM: &[u8] = b"sad";

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self {
            received_tags: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Default for ScriptedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl WasmRuntime for ScriptedRuntime {
    type Module = Program;
    type Instance = Program;

    fn compile(&self, wasm_bytes: &[u8]) -> Result<Self::Module, CompileError> {
        match wasm_bytes {
            HAPPY_WASM => Ok(Program::Happy),
            SAD_WASM => Ok(Program::Sad),
            other => Err(CompileError::InvalidModule {
                module_id: ModuleId::new("<scripted>"),
                source: anyhow::anyhow!("unrecognised test program ({} bytes)", other.len()),
            }),
        }
    }

    fn instantiate(
        &self,
        module: &Self::Module,
        _gas_limit: Gas,
        _mem_limit: MemoryPages,
    ) -> Result<Self::Instance, WasmInvocationError> {
        Ok(*module)
    }

    fn invoke(
        &self,
        instance: &mut Self::Instance,
        memory: Memory,
        message: &Message,
        _ao_global: &serde_json::Value,
    ) -> Result<RawInvocationResult, WasmInvocationError> {
        self.received_tags.lock().unwrap().push(message.tags.clone());

        match instance {
            Program::Happy => Ok(run_happy(memory, message)),
            Program::Sad => Ok(run_sad(memory, message)),
        }
    }
}

fn decode_state(memory: &Memory) -> serde_json::Map<String, serde_json::Value> {
    if memory.is_empty() {
        return serde_json::Map::new();
    }
    match serde_json::from_slice::<serde_json::Value>(memory.bytes()) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}

fn run_happy(memory: Memory, message: &Message) -> RawInvocationResult {
    let mut state = decode_state(&memory);
    let function = message.tag("function").unwrap_or_default();

    if function == "hello" {
        state.insert("heardHello".to_string(), serde_json::Value::Bool(true));
    }
    if function == "world" {
        state.insert("heardWorld".to_string(), serde_json::Value::Bool(true));
    }

    let heard_hello = state.get("heardHello").cloned().unwrap_or(serde_json::Value::Bool(false));
    let heard_world = state.get("heardWorld").cloned().unwrap_or(serde_json::Value::Bool(false));

    let output = serde_json::json!({
        "heardHello": heard_hello,
        "heardWorld": heard_world,
        "happy": true,
        "lastMessage": { "function": function },
    });

    let new_memory = Memory::new(
        serde_json::to_vec(&serde_json::Value::Object(state)).unwrap(),
        MemoryEncoding::None,
    );

    RawInvocationResult {
        memory: new_memory,
        error: None,
        messages: Vec::new(),
        spawns: Vec::new(),
        output,
        gas_used: Some(Gas::new(1)),
    }
}

fn run_sad(memory: Memory, message: &Message) -> RawInvocationResult {
    if message.tag("function") == Some("error") {
        return RawInvocationResult {
            memory,
            error: Some("scripted failure".to_string()),
            messages: Vec::new(),
            spawns: Vec::new(),
            output: serde_json::Value::Null,
            gas_used: Some(Gas::new(1)),
        };
    }

    let count: u64 = if memory.is_empty() {
        0
    } else {
        std::str::from_utf8(memory.bytes())
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    };
    let count = count + 1;

    RawInvocationResult {
        memory: Memory::new(count.to_string().into_bytes(), MemoryEncoding::None),
        error: None,
        messages: Vec::new(),
        spawns: Vec::new(),
        output: serde_json::Value::String(count.to_string()),
        gas_used: Some(Gas::new(1)),
    }
}

/// Always returns the fixed byte string it was built with - the loader's
/// whole cache/disk cascade is exercised against this exactly as it would
/// be against a real gateway.
pub struct FixedGateway {
    pub bytes: Vec<u8>,
}

impl ModuleGateway for FixedGateway {
    fn fetch_module(&self, _id: &ModuleId) -> Result<Vec<u8>, ModuleFetchError> {
        Ok(self.bytes.clone())
    }
}

/// A [`MessageSource`] over a pre-built, in-memory list - the "lazy ordered
/// sequence" spec §3 describes, minus any actual I/O.
pub struct VecMessageSource {
    messages: VecDeque<Message>,
}

impl VecMessageSource {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages: messages.into(),
        }
    }
}

impl MessageSource for VecMessageSource {
    fn next_message(&mut self) -> Result<Option<Message>, anyhow::Error> {
        Ok(self.messages.pop_front())
    }
}

/// In-memory collaborator fake bundling every persistence operation the
/// evaluator depends on (spec §6), plus introspection the scenario tests
/// assert against.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<InMemoryStoreInner>,
}

#[derive(Default)]
struct InMemoryStoreInner {
    evaluations: Vec<EvaluationRecord>,
    hash_lookups: u64,
    deep_hashes_before: HashMap<String, ProcessId>,
    latest_memory: Option<MemoryCheckpoint>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed `deep_hash` as "already evaluated" for `process_id`, the
    /// way `findMessageHashBefore` would report a real prior record.
    pub fn seed_deep_hash(&self, deep_hash: impl Into<String>, process_id: ProcessId) {
        self.inner
            .lock()
            .unwrap()
            .deep_hashes_before
            .insert(deep_hash.into(), process_id);
    }

    pub fn evaluation_count(&self) -> usize {
        self.inner.lock().unwrap().evaluations.len()
    }

    pub fn hash_lookup_count(&self) -> u64 {
        self.inner.lock().unwrap().hash_lookups
    }

    pub fn evaluations(&self) -> Vec<EvaluationRecord> {
        self.inner.lock().unwrap().evaluations.clone()
    }

    pub fn latest_memory(&self) -> Option<MemoryCheckpoint> {
        self.inner.lock().unwrap().latest_memory.clone()
    }
}

impl EvaluationStore for InMemoryStore {
    fn save_evaluation(&self, record: EvaluationRecord) -> Result<(), cu::error::PersistenceError> {
        self.inner.lock().unwrap().evaluations.push(record);
        Ok(())
    }

    fn find_message_hash_before(
        &self,
        deep_hash: &str,
        process_id: &ProcessId,
        _lower_bound: &LowerBound,
    ) -> Result<bool, cu::error::PersistenceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.hash_lookups += 1;
        Ok(inner
            .deep_hashes_before
            .get(deep_hash)
            .is_some_and(|seeded_for| seeded_for == process_id))
    }

    fn save_latest_process_memory(&self, checkpoint: MemoryCheckpoint) -> Result<(), cu::error::PersistenceError> {
        self.inner.lock().unwrap().latest_memory = Some(checkpoint);
        Ok(())
    }
}
