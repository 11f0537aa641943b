// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use serde::{Deserialize, Serialize};

/// One `{name, value}` tag carried by a [`Message`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Tag names populated by the scheduler itself and stripped before a
/// message ever reaches a Wasm instance (evaluator step "Tag sanitisation").
pub const PRIVILEGED_TAG_NAMES: &[&str] = &["From", "Owner"];

/// One scheduled input to a process.
///
/// Carries both the wire fields (`id`, `timestamp`, `owner`, `tags`,
/// `block_height`) and the evaluator-scoped fields the specification adds on
/// top (`ordinate`, `cron`, `deep_hash`, `no_save`, `ao_global`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub timestamp: u64,
    pub owner: String,
    pub tags: Vec<Tag>,
    pub block_height: u64,

    /// Monotonic within a scheduler epoch; the evaluator orders the stream
    /// by this field and treats a violation as a caller error.
    pub ordinate: u64,

    /// Names a recurring schedule when this message was emitted by one.
    pub cron: Option<String>,

    /// Content hash over the signed data item, used for cross-run dedup.
    pub deep_hash: Option<String>,

    /// Bootstrapping messages that must never be persisted, regardless of
    /// whether their invocation produced an error.
    #[serde(default)]
    pub no_save: bool,

    /// Opaque payload delivered to the Wasm instance alongside the message
    /// (environment/context values the host, not the scheduler, supplies).
    #[serde(default = "serde_json::Value::default")]
    pub ao_global: serde_json::Value,
}

impl Message {
    /// Tags with `From`/`Owner` (and any other scheduler-privileged tag)
    /// removed, ready to hand to the Wasm instance (spec §4.7 step 3).
    pub fn sanitized_tags(&self) -> Vec<Tag> {
        self.tags
            .iter()
            .filter(|t| !PRIVILEGED_TAG_NAMES.contains(&t.name.as_str()))
            .cloned()
            .collect()
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.value.as_str())
    }
}
