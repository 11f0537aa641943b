// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fmt;

/// A content-addressed identifier for exactly one immutable Wasm binary.
///
/// `ModuleId` is the sole key into every layer of the artifact store and the
/// instance cache's compiled-module side: two `ModuleId`s that compare equal
/// are assumed (per the content-addressing invariant) to resolve to
/// byte-identical Wasm.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ModuleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ModuleId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identity of a process under evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(String);

impl ProcessId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ProcessId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProcessId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// The lower bound a stream of messages is replayed from: either a message
/// timestamp or a scheduler ordinate, whichever the caller resumed from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LowerBound {
    Timestamp(u64),
    Ordinate(u64),
}

/// Identifies one ongoing evaluation of a specific process, scoped to a
/// single evaluator run. Used as the Instance Cache's key: at most one live
/// `Instance` exists per `StreamId` (data model invariant 2).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StreamId {
    pub process_id: ProcessId,
    pub lower_bound: LowerBound,
}

impl StreamId {
    pub fn new(process_id: ProcessId, lower_bound: LowerBound) -> Self {
        Self {
            process_id,
            lower_bound,
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lower_bound {
            LowerBound::Timestamp(ts) => write!(f, "{}@t{}", self.process_id, ts),
            LowerBound::Ordinate(o) => write!(f, "{}@o{}", self.process_id, o),
        }
    }
}
