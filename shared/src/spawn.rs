// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use serde::{Deserialize, Serialize};

use crate::message::Tag;

/// A process spawn emitted by a message's evaluation.
///
/// The evaluator only folds `Spawn`s through from one `EvaluationOutput` to
/// the next (spec §4.7 step 5); it never interprets them, so the shape here
/// carries just enough to hand to the router/crank without loss.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spawn {
    pub owner: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default = "serde_json::Value::default")]
    pub data: serde_json::Value,
}
