//! In-process LRU tier with a namespace index.
//!
//! A bounded, recency-ordered map of cache entries. Reads and writes both
//! count as use; overflowing the capacity evicts exactly the
//! least-recently-used entry. A secondary namespace-to-keys index is
//! maintained in lockstep with the entry map so that namespace-wide eviction
//! walks only that namespace's keys instead of every entry. Both structures
//! stay private; every mutation goes through a whole-operation method, which
//! is what keeps them from diverging.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;

use lru::LruCache;

use super::entry::CacheEntry;

/// Maximum number of entries held in memory.
pub const MEMORY_CAPACITY: usize = 100;

/// Bounded in-memory cache tier with strict LRU eviction.
pub struct MemoryTier {
    entries: LruCache<String, CacheEntry>,
    by_namespace: HashMap<String, HashSet<String>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::with_capacity(MEMORY_CAPACITY)
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            by_namespace: HashMap::new(),
        }
    }

    /// Entry for `key` if present and fresh.
    ///
    /// A hit becomes the most-recently-used entry. An expired entry found
    /// here is dropped from both the map and the index and reported as a
    /// miss.
    pub fn get(&mut self, key: &str) -> Option<&CacheEntry> {
        let expired = self.entries.peek(key)?.is_expired();
        if expired {
            if let Some(entry) = self.entries.pop(key) {
                self.index_remove(key, &entry.namespace);
            }
            return None;
        }
        self.entries.get(key)
    }

    /// Insert `entry` under `key` as the most-recently-used entry.
    ///
    /// An existing entry under the same key is replaced, so `cached_at` and
    /// `ttl` always reflect the latest write. At capacity, exactly one
    /// least-recently-used entry is evicted and de-indexed to make room.
    pub fn put(&mut self, key: String, entry: CacheEntry) {
        let namespace = entry.namespace.clone();
        match self.entries.push(key.clone(), entry) {
            Some((old_key, old_entry)) if old_key == key => {
                // Same key rewritten in place. The namespace can only differ
                // here if two triples collided on one key.
                if old_entry.namespace != namespace {
                    self.index_remove(&old_key, &old_entry.namespace);
                }
            }
            Some((evicted_key, evicted_entry)) => {
                self.index_remove(&evicted_key, &evicted_entry.namespace);
                tracing::debug!(key = %evicted_key, namespace = %evicted_entry.namespace, "memory tier eviction");
            }
            None => {}
        }
        self.index_insert(key, namespace);
    }

    /// Remove `key` if present. Returns whether an entry was removed.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.entries.pop(key) {
            Some(entry) => {
                self.index_remove(key, &entry.namespace);
                true
            }
            None => false,
        }
    }

    /// Drop every entry belonging to `namespace`, in O(keys in that
    /// namespace). Returns the number removed.
    pub fn evict_namespace(&mut self, namespace: &str) -> usize {
        let Some(keys) = self.by_namespace.remove(namespace) else {
            return 0;
        };
        let mut removed = 0;
        for key in &keys {
            if self.entries.pop(key).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Drop everything. Returns the number of entries removed.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.by_namespace.clear();
        count
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Entry for `key` without touching recency or expiry.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.peek(key)
    }

    /// Number of namespaces with at least one resident entry.
    pub fn namespace_count(&self) -> usize {
        self.by_namespace.len()
    }

    /// Keys currently resident for `namespace`.
    pub fn namespace_keys(&self, namespace: &str) -> Vec<String> {
        self.by_namespace
            .get(namespace)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn index_insert(&mut self, key: String, namespace: String) {
        self.by_namespace.entry(namespace).or_default().insert(key);
    }

    fn index_remove(&mut self, key: &str, namespace: &str) {
        if let Some(keys) = self.by_namespace.get_mut(namespace) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_namespace.remove(namespace);
            }
        }
    }
}

impl Default for MemoryTier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn entry(namespace: &str) -> CacheEntry {
        CacheEntry {
            content: "# Docs".to_string(),
            cached_at: Utc::now(),
            ttl: 3_600,
            version: "latest".to_string(),
            namespace: namespace.to_string(),
            source_kind: "docs".to_string(),
        }
    }

    fn expired_entry(namespace: &str) -> CacheEntry {
        CacheEntry { cached_at: Utc::now() - Duration::seconds(10), ttl: 1, ..entry(namespace) }
    }

    /// The index must mirror the entry map exactly, in both directions.
    fn assert_index_consistent(tier: &MemoryTier) {
        for (namespace, keys) in &tier.by_namespace {
            assert!(!keys.is_empty(), "index holds an empty namespace set");
            for key in keys {
                let entry = tier.entries.peek(key).expect("indexed key missing from entry map");
                assert_eq!(&entry.namespace, namespace);
            }
        }
        let indexed: usize = tier.by_namespace.values().map(HashSet::len).sum();
        assert_eq!(indexed, tier.entries.len());
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let mut tier = MemoryTier::with_capacity(3);
        for i in 0..10 {
            tier.put(format!("key{i}"), entry("react"));
            assert!(tier.len() <= 3);
        }
        assert_eq!(tier.len(), 3);
        assert_index_consistent(&tier);
    }

    #[test]
    fn test_insert_only_evicts_first_inserted() {
        let mut tier = MemoryTier::with_capacity(3);
        for i in 0..4 {
            tier.put(format!("key{i}"), entry("react"));
        }
        assert!(tier.peek("key0").is_none());
        assert!(tier.peek("key1").is_some());
        assert!(tier.peek("key2").is_some());
        assert!(tier.peek("key3").is_some());
        assert_index_consistent(&tier);
    }

    #[test]
    fn test_read_promotes() {
        let mut tier = MemoryTier::with_capacity(2);
        tier.put("a".to_string(), entry("react"));
        tier.put("b".to_string(), entry("react"));

        assert!(tier.get("a").is_some());
        tier.put("c".to_string(), entry("react"));

        assert!(tier.peek("a").is_some());
        assert!(tier.peek("b").is_none());
        assert!(tier.peek("c").is_some());
        assert_index_consistent(&tier);
    }

    #[test]
    fn test_rewrite_promotes() {
        let mut tier = MemoryTier::with_capacity(2);
        tier.put("a".to_string(), entry("react"));
        tier.put("b".to_string(), entry("react"));

        tier.put("a".to_string(), entry("react"));
        tier.put("c".to_string(), entry("react"));

        assert!(tier.peek("a").is_some());
        assert!(tier.peek("b").is_none());
        assert_index_consistent(&tier);
    }

    #[test]
    fn test_rewrite_replaces_value() {
        let mut tier = MemoryTier::with_capacity(2);
        tier.put("a".to_string(), entry("react"));
        let rewritten = CacheEntry { content: "# Updated".to_string(), ..entry("react") };
        tier.put("a".to_string(), rewritten);

        assert_eq!(tier.len(), 1);
        assert_eq!(tier.get("a").unwrap().content, "# Updated");
        assert_index_consistent(&tier);
    }

    #[test]
    fn test_expired_entry_is_a_miss_and_removed() {
        let mut tier = MemoryTier::with_capacity(5);
        tier.put("a".to_string(), expired_entry("react"));

        assert!(tier.get("a").is_none());
        assert_eq!(tier.len(), 0);
        assert_eq!(tier.namespace_count(), 0);
        assert_index_consistent(&tier);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut tier = MemoryTier::with_capacity(2);
        assert!(!tier.remove("missing"));
    }

    #[test]
    fn test_remove_revokes_index_membership() {
        let mut tier = MemoryTier::with_capacity(5);
        tier.put("a".to_string(), entry("react"));
        assert!(tier.remove("a"));
        assert_eq!(tier.namespace_count(), 0);
        assert_index_consistent(&tier);
    }

    #[test]
    fn test_evict_namespace() {
        let mut tier = MemoryTier::with_capacity(10);
        for i in 0..3 {
            tier.put(format!("react{i}"), entry("react"));
        }
        for i in 0..2 {
            tier.put(format!("vue{i}"), entry("vue"));
        }

        assert_eq!(tier.evict_namespace("react"), 3);
        assert_eq!(tier.len(), 2);
        assert!(tier.namespace_keys("react").is_empty());
        assert_eq!(tier.namespace_keys("vue").len(), 2);
        assert_index_consistent(&tier);
    }

    #[test]
    fn test_evict_unknown_namespace_returns_zero() {
        let mut tier = MemoryTier::with_capacity(2);
        assert_eq!(tier.evict_namespace("svelte"), 0);
    }

    #[test]
    fn test_clear_returns_prior_count() {
        let mut tier = MemoryTier::with_capacity(5);
        tier.put("a".to_string(), entry("react"));
        tier.put("b".to_string(), entry("vue"));

        assert_eq!(tier.clear(), 2);
        assert!(tier.is_empty());
        assert_eq!(tier.namespace_count(), 0);
    }

    #[test]
    fn test_index_tracks_mixed_operations() {
        let mut tier = MemoryTier::with_capacity(3);
        tier.put("a".to_string(), entry("react"));
        tier.put("b".to_string(), entry("vue"));
        tier.put("a".to_string(), entry("react"));
        tier.put("c".to_string(), entry("svelte"));
        tier.put("d".to_string(), entry("react"));
        tier.get("c");
        tier.remove("b");
        assert_index_consistent(&tier);

        tier.put("e".to_string(), expired_entry("vue"));
        tier.get("e");
        assert_index_consistent(&tier);
    }

    #[test]
    fn test_peek_does_not_promote() {
        let mut tier = MemoryTier::with_capacity(2);
        tier.put("a".to_string(), entry("react"));
        tier.put("b".to_string(), entry("react"));

        tier.peek("a");
        tier.put("c".to_string(), entry("react"));

        // "a" stayed least-recently-used and was the one evicted
        assert!(tier.peek("a").is_none());
        assert!(tier.peek("b").is_some());
        assert_index_consistent(&tier);
    }
}
