//! Two-tier documentation cache.
//!
//! Orchestrates the in-process LRU tier and the durable SQLite tier: reads
//! check memory first, then disk, promoting disk hits into memory; writes
//! land in memory always and on disk best-effort. Storage failures never
//! reach the collaborator: reads degrade to a miss, writes and deletes to a
//! no-op, each with a logged diagnostic. Callers therefore see only "value"
//! or "absent" and cannot distinguish never-cached, expired, and failed.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;

use super::entry::CacheEntry;
use super::key::derive_cache_key;
use super::memory::MemoryTier;
use super::store::CacheDb;
use super::ttl;
use crate::Error;
use crate::config::CacheConfig;

/// Filename of the persistent tier inside the cache directory.
const DB_FILE: &str = "documentation.sqlite";

/// Read-only snapshot of cache health.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub memory_capacity: usize,
    pub memory_utilization_pct: f64,
    pub indexed_namespaces: usize,
    pub disk_entries: u64,
    pub disk_volume_bytes: u64,
    pub cache_dir: PathBuf,
    pub ttl_policy: BTreeMap<&'static str, i64>,
}

/// Per-namespace cache occupancy across both tiers.
#[derive(Debug, Clone, Serialize)]
pub struct NamespaceCacheInfo {
    pub namespace: String,
    pub memory_entries: usize,
    pub disk_entries: u64,
    pub total_size_bytes: u64,
}

/// Two-tier cache for normalized documentation content.
///
/// Methods that mutate take `&mut self`; the cache performs no internal
/// locking, so concurrent callers must serialize access themselves (for
/// example behind a `tokio::sync::Mutex`). The persistent tier is the only
/// suspension point.
pub struct DocumentationCache {
    memory: MemoryTier,
    store: CacheDb,
    cache_dir: PathBuf,
}

impl DocumentationCache {
    /// Open the cache rooted at the configured directory, creating the
    /// directory and the persistent tier as needed.
    pub async fn open(config: &CacheConfig) -> Result<Self, Error> {
        std::fs::create_dir_all(&config.cache_dir)?;
        let store = CacheDb::open(config.cache_dir.join(DB_FILE)).await?;
        tracing::info!(cache_dir = %config.cache_dir.display(), "documentation cache initialized");
        Ok(Self { memory: MemoryTier::new(), store, cache_dir: config.cache_dir.clone() })
    }

    /// Fully in-memory variant, for tests: the persistent tier lives in an
    /// in-memory SQLite database.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let store = CacheDb::open_in_memory().await?;
        Ok(Self { memory: MemoryTier::new(), store, cache_dir: PathBuf::new() })
    }

    /// Cached content for `(namespace, path, source_kind)`, or `None`.
    ///
    /// A disk hit is promoted into the memory tier. Disk rows the store
    /// still considers fresh but whose own TTL has lapsed are dropped and
    /// reported as a miss; the entry-level TTL is authoritative.
    pub async fn get(&mut self, namespace: &str, path: &str, source_kind: &str) -> Option<String> {
        let key = derive_cache_key(namespace, path, source_kind);

        if let Some(entry) = self.memory.get(&key) {
            tracing::debug!(namespace, path, "cache hit (memory)");
            return Some(entry.content.clone());
        }

        match self.store.get(&key).await {
            Ok(Some(entry)) if !entry.is_expired() => {
                tracing::debug!(namespace, path, "cache hit (disk)");
                let content = entry.content.clone();
                self.memory.put(key, entry);
                return Some(content);
            }
            Ok(Some(_)) => {
                // The store-level expiry and the entry TTL were set
                // independently at write time; the entry TTL wins.
                if let Err(e) = self.store.delete(&key).await {
                    tracing::warn!(error = %e, namespace, path, key = %key, "failed to drop stale entry");
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, namespace, path, key = %key, "cache read failed");
            }
        }

        tracing::debug!(namespace, path, "cache miss");
        None
    }

    /// Cache `content` under `(namespace, path, source_kind)`.
    ///
    /// The TTL is classified from `version` and `branch`. The write always
    /// lands in the memory tier; the persistent tier is best-effort and a
    /// failed disk write is only logged.
    pub async fn set(
        &mut self, namespace: &str, content: String, path: &str, source_kind: &str, version: &str, branch: &str,
    ) {
        let key = derive_cache_key(namespace, path, source_kind);
        let ttl = ttl::classify(version, branch).seconds();

        let entry = CacheEntry {
            content,
            cached_at: Utc::now(),
            ttl,
            version: version.to_string(),
            namespace: namespace.to_string(),
            source_kind: source_kind.to_string(),
        };
        let size = entry.size_bytes();

        self.memory.put(key.clone(), entry.clone());

        match self.store.put(&key, &entry, ttl).await {
            Ok(()) => tracing::debug!(namespace, path, ttl, size, "content cached"),
            Err(e) => tracing::warn!(error = %e, namespace, path, key = %key, "cache write failed"),
        }
    }

    /// Drop the entry under `(namespace, path, source_kind)` from both
    /// tiers. Silently does nothing for keys that were never cached.
    pub async fn invalidate(&mut self, namespace: &str, path: &str, source_kind: &str) {
        let key = derive_cache_key(namespace, path, source_kind);
        self.memory.remove(&key);
        match self.store.delete(&key).await {
            Ok(true) => tracing::debug!(namespace, path, "cache invalidated"),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, namespace, path, key = %key, "cache invalidation failed"),
        }
    }

    /// Drop every entry belonging to `namespace` from both tiers.
    ///
    /// The memory tier is cleared through the namespace index; the
    /// persistent tier is a full scan over its keys, acceptable for an
    /// infrequent maintenance operation. Returns the number of distinct
    /// keys removed.
    pub async fn clear_namespace(&mut self, namespace: &str) -> usize {
        let memory_keys: HashSet<String> = self.memory.namespace_keys(namespace).into_iter().collect();
        let mut cleared = self.memory.evict_namespace(namespace);

        match self.store.keys().await {
            Ok(keys) => {
                for key in keys {
                    let entry = match self.store.get(&key).await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => continue,
                        Err(e) => {
                            tracing::debug!(error = %e, key = %key, "skipping undecodable entry");
                            continue;
                        }
                    };
                    if entry.namespace != namespace {
                        continue;
                    }
                    match self.store.delete(&key).await {
                        Ok(removed) => {
                            if removed && !memory_keys.contains(&key) {
                                cleared += 1;
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, key = %key, "cache delete failed"),
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, namespace, "cache scan failed"),
        }

        tracing::info!(namespace, count = cleared, "namespace cache cleared");
        cleared
    }

    /// Empty both tiers. Returns the total number of entries removed, with
    /// memory and disk copies counted separately.
    pub async fn clear_all(&mut self) -> usize {
        let memory_count = self.memory.clear();
        let disk_count = match self.store.clear().await {
            Ok(removed) => removed as usize,
            Err(e) => {
                tracing::warn!(error = %e, "disk cache clear failed");
                0
            }
        };

        let total = memory_count + disk_count;
        tracing::info!(count = total, "all cache cleared");
        total
    }

    /// Drop persistent-tier rows whose store-level expiry has passed.
    ///
    /// Expiry is otherwise checked only on access; a periodic maintenance
    /// job may call this to bound on-disk growth. Returns the number
    /// removed.
    pub async fn purge_expired(&mut self) -> usize {
        match self.store.purge_expired().await {
            Ok(removed) => removed as usize,
            Err(e) => {
                tracing::warn!(error = %e, "expired purge failed");
                0
            }
        }
    }

    /// Read-only snapshot of both tiers. Disk figures degrade to zero when
    /// the persistent tier is unavailable.
    pub async fn stats(&self) -> CacheStats {
        let (disk_entries, disk_volume_bytes) = match (self.store.len().await, self.store.volume_bytes().await) {
            (Ok(entries), Ok(volume)) => (entries, volume),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "disk stats unavailable");
                (0, 0)
            }
        };

        let capacity = self.memory.capacity();
        CacheStats {
            memory_entries: self.memory.len(),
            memory_capacity: capacity,
            memory_utilization_pct: (self.memory.len() as f64 / capacity as f64 * 1_000.0).round() / 10.0,
            indexed_namespaces: self.memory.namespace_count(),
            disk_entries,
            disk_volume_bytes,
            cache_dir: self.cache_dir.clone(),
            ttl_policy: ttl::table(),
        }
    }

    /// Occupancy of `namespace` across both tiers. Entries resident in both
    /// contribute their size once per tier.
    pub async fn namespace_info(&self, namespace: &str) -> NamespaceCacheInfo {
        let mut memory_entries = 0usize;
        let mut total_size = 0u64;
        for key in self.memory.namespace_keys(namespace) {
            if let Some(entry) = self.memory.peek(&key) {
                memory_entries += 1;
                total_size += entry.size_bytes() as u64;
            }
        }

        let mut disk_entries = 0u64;
        match self.store.keys().await {
            Ok(keys) => {
                for key in keys {
                    match self.store.get(&key).await {
                        Ok(Some(entry)) if entry.namespace == namespace => {
                            disk_entries += 1;
                            total_size += entry.size_bytes() as u64;
                        }
                        Ok(_) => {}
                        Err(e) => tracing::debug!(error = %e, key = %key, "skipping undecodable entry"),
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, namespace, "error counting disk entries"),
        }

        NamespaceCacheInfo {
            namespace: namespace.to_string(),
            memory_entries,
            disk_entries,
            total_size_bytes: total_size,
        }
    }

    /// Distinct `"namespace:source_kind"` pairs cached for `namespace`,
    /// observed across both tiers.
    pub async fn list_keys(&self, namespace: &str) -> BTreeSet<String> {
        let mut pairs = BTreeSet::new();

        for key in self.memory.namespace_keys(namespace) {
            if let Some(entry) = self.memory.peek(&key) {
                pairs.insert(format!("{namespace}:{}", entry.source_kind));
            }
        }

        match self.store.keys().await {
            Ok(keys) => {
                for key in keys {
                    if let Ok(Some(entry)) = self.store.get(&key).await {
                        if entry.namespace == namespace {
                            pairs.insert(format!("{namespace}:{}", entry.source_kind));
                        }
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, namespace, "error listing cache keys"),
        }

        pairs
    }
}
