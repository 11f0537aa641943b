// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

/// The resumable position after the last successfully evaluated message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cursor {
    pub timestamp: u64,
    pub block_height: u64,
    pub ordinate: u64,
    pub cron: Option<String>,
}
