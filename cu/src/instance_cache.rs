// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Process-local instance cache (spec §4.4): a bounded LRU from `StreamId`
//! to a live instantiated handler, disjoint per execution worker.

use cu_shared::{ModuleId, StreamId};

use crate::cache::BoundedCache;
use crate::runtime::WasmRuntime;

pub struct LiveInstance<R: WasmRuntime> {
    pub module_id: ModuleId,
    pub instance: R::Instance,
}

/// Owned by exactly one `ExecutionWorker`, never shared or wrapped in
/// `Arc` - per spec §5, "the instance cache is *not* shared across
/// workers".
pub struct InstanceCache<R: WasmRuntime> {
    cache: BoundedCache<StreamId, LiveInstance<R>>,
}

impl<R: WasmRuntime> InstanceCache<R> {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: BoundedCache::new(capacity),
        }
    }

    /// Pull the instance for `stream_id` out of the cache for exclusive use
    /// during an invocation. The caller puts it back with [`Self::put`] on
    /// success; dropping it instead (on error) is the "destructor on
    /// eviction" this module's open question calls for.
    pub fn take(&mut self, stream_id: &StreamId) -> Option<LiveInstance<R>> {
        self.cache.pop(stream_id)
    }

    pub fn put(&mut self, stream_id: StreamId, live: LiveInstance<R>) {
        self.cache.put(stream_id, live);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
