// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Crank bookkeeping (spec §6 / Glossary "Crank"): the post-response
//! recursive walk over the `Spawns`/`Messages` an evaluation produces.
//!
//! The distilled spec names the crank in the router's responsibilities and
//! the glossary but never gives it a termination condition, so the rewrite
//! bounds it with a bread-first budget rather than unbounded recursion on
//! a misbehaving process (DESIGN.md Open Question decision). Expressed as
//! an explicit work queue, not recursive `async fn` calls, since `async fn`
//! can't recurse without boxing each frame.

use std::collections::VecDeque;

use cu_shared::{EvaluationOutput, Message, ProcessId, Spawn};

/// One unit of crank work: a message or spawn still owed a dispatch,
/// tagged with how much budget is left for anything *it* produces.
pub enum CrankItem {
    Message { process_id: ProcessId, message: Message },
    Spawn { spawn: Spawn },
}

pub struct CrankQueue {
    items: VecDeque<(CrankItem, usize)>,
    max_depth: usize,
    dropped: usize,
}

impl CrankQueue {
    pub fn new(max_depth: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_depth,
            dropped: 0,
        }
    }

    /// Seed the queue with everything one evaluation step produced.
    pub fn push_output(&mut self, process_id: &ProcessId, output: &EvaluationOutput) {
        self.push_many(
            process_id,
            output.messages.clone(),
            output.spawns.clone(),
            self.max_depth,
        );
    }

    fn push_many(&mut self, process_id: &ProcessId, messages: Vec<Message>, spawns: Vec<Spawn>, depth: usize) {
        if depth == 0 {
            if !messages.is_empty() || !spawns.is_empty() {
                self.dropped += messages.len() + spawns.len();
                log::warn!(
                    "process {process_id}: crank depth exhausted, dropping {} message(s)/spawn(s)",
                    messages.len() + spawns.len()
                );
            }
            return;
        }
        for message in messages {
            self.items.push_back((
                CrankItem::Message {
                    process_id: process_id.clone(),
                    message,
                },
                depth - 1,
            ));
        }
        for spawn in spawns {
            self.items.push_back((CrankItem::Spawn { spawn }, depth - 1));
        }
    }

    pub fn pop(&mut self) -> Option<(CrankItem, usize)> {
        self.items.pop_front()
    }

    /// Requeue what a dispatched item itself produced, one level shallower.
    pub fn extend(&mut self, process_id: &ProcessId, output: &EvaluationOutput, depth: usize) {
        self.push_many(process_id, output.messages.clone(), output.spawns.clone(), depth);
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// Deterministically derives a `ProcessId` for a freshly spawned process
/// from its content, since a `Spawn` carries no identity of its own (spec
/// §3 only requires the evaluator fold it through unchanged) and minting
/// one is a server-level concern. Recorded as a SUPPLEMENT decision in
/// DESIGN.md.
pub fn spawn_process_id(spawn: &Spawn) -> ProcessId {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(spawn.owner.as_bytes());
    for tag in &spawn.tags {
        hasher.update(tag.name.as_bytes());
        hasher.update(tag.value.as_bytes());
    }
    hasher.update(spawn.data.to_string().as_bytes());
    ProcessId::new(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cu_shared::Tag;

    fn process_id() -> ProcessId {
        ProcessId::new("proc-1")
    }

    fn output_with(messages: usize, spawns: usize) -> EvaluationOutput {
        EvaluationOutput {
            messages: (0..messages)
                .map(|i| Message {
                    id: format!("m{i}"),
                    timestamp: 0,
                    owner: "owner".into(),
                    tags: vec![],
                    block_height: 0,
                    ordinate: i as u64,
                    cron: None,
                    deep_hash: None,
                    no_save: false,
                    ao_global: serde_json::Value::Null,
                })
                .collect(),
            spawns: (0..spawns)
                .map(|_| Spawn {
                    owner: "owner".into(),
                    tags: vec![],
                    data: serde_json::Value::Null,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn queues_every_message_and_spawn() {
        let mut queue = CrankQueue::new(4);
        queue.push_output(&process_id(), &output_with(2, 1));

        let mut messages = 0;
        let mut spawns = 0;
        while let Some((item, _depth)) = queue.pop() {
            match item {
                CrankItem::Message { .. } => messages += 1,
                CrankItem::Spawn { .. } => spawns += 1,
            }
        }
        assert_eq!(messages, 2);
        assert_eq!(spawns, 1);
        assert_eq!(queue.dropped(), 0);
    }

    #[test]
    fn depth_zero_drops_everything_and_counts_it() {
        let mut queue = CrankQueue::new(0);
        queue.push_output(&process_id(), &output_with(3, 2));

        assert!(queue.pop().is_none());
        assert_eq!(queue.dropped(), 5);
    }

    #[test]
    fn extend_respects_the_shrinking_depth_not_the_original_max() {
        let mut queue = CrankQueue::new(10);
        // seed at depth 1: one more hop is allowed, then nothing further.
        queue.push_many(&process_id(), vec![], vec![], 1);
        queue.extend(&process_id(), &output_with(1, 0), 1);

        let (item, depth) = queue.pop().expect("one message queued");
        assert!(matches!(item, CrankItem::Message { .. }));
        assert_eq!(depth, 0);

        // whatever that message's own output produces is dropped, since its
        // remaining depth is 0, regardless of the queue's original max_depth.
        queue.extend(&process_id(), &output_with(1, 1), depth);
        assert!(queue.pop().is_none());
        assert_eq!(queue.dropped(), 2);
    }

    #[test]
    fn spawn_process_id_is_deterministic_and_content_sensitive() {
        let a = Spawn {
            owner: "owner-a".into(),
            tags: vec![Tag::new("Type", "Process")],
            data: serde_json::json!({"k": "v"}),
        };
        let b = Spawn { owner: "owner-b".into(), ..a.clone() };

        assert_eq!(spawn_process_id(&a), spawn_process_id(&a));
        assert_ne!(spawn_process_id(&a), spawn_process_id(&b));
    }
}
