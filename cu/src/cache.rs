// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! A bounded map with least-recently-used eviction, shared by the
//! compiled-module cache (§4.2) and the instance cache (§4.4).
//!
//! Design note "Replacing the LRU abstraction": the only required property
//! is that insertion past capacity evicts the least-recently-used entry and
//! synchronously releases its resources. In Rust that release is just
//! `Drop`, so `BoundedCache` doesn't need an explicit destructor callback
//! the way a GC'd host would - dropping the evicted value *is* the
//! destructor.

use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;

pub struct BoundedCache<K: Hash + Eq, V> {
    inner: LruCache<K, V>,
}

impl<K: Hash + Eq, V> BoundedCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        self.inner.put(key, value)
    }

    /// Remove and return `key`'s value without waiting for LRU pressure to
    /// evict it - used by the instance cache to pull an instance out for
    /// exclusive use during an invocation (spec §5: at most one live
    /// instance per `StreamId`, and the cache never hands out a second
    /// reference to it).
    pub fn pop(&mut self, key: &K) -> Option<V> {
        self.inner.pop(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let mut cache: BoundedCache<u32, &'static str> = BoundedCache::new(2);
        cache.put(1, "a");
        cache.put(2, "b");
        assert_eq!(cache.get(&1), Some(&"a")); // bump 1 to most-recent
        cache.put(3, "c"); // evicts 2, the now-least-recent
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some(&"a"));
        assert_eq!(cache.get(&3), Some(&"c"));
    }

    #[test]
    fn pop_removes_without_waiting_for_eviction() {
        let mut cache: BoundedCache<&'static str, u32> = BoundedCache::new(4);
        cache.put("x", 1);
        assert_eq!(cache.pop(&"x"), Some(1));
        assert_eq!(cache.get(&"x"), None);
        assert_eq!(cache.len(), 0);
    }
}
