// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

/// Running counters the evaluator bumps as it consumes the message stream
/// (spec §4.7 steps 1 and 6).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageStats {
    pub scheduled: u64,
    pub cron: u64,
    pub error: u64,
}
