//! Cache entry record shared by both tiers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A single piece of cached documentation plus the metadata needed for
/// expiry checks and namespace-scoped invalidation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Normalized markdown payload.
    pub content: String,

    /// When the entry was written. Rewrites of a key reset this, so it is
    /// non-decreasing per key within a process.
    pub cached_at: DateTime<Utc>,

    /// Lifetime in seconds. Always positive.
    pub ttl: i64,

    /// Release maturity label the TTL was derived from.
    pub version: String,

    /// Logical owner of the content, e.g. a framework name.
    pub namespace: String,

    /// What kind of content was cached (docs, examples, ...).
    pub source_kind: String,
}

impl CacheEntry {
    /// Whether the entry has outlived its own TTL.
    ///
    /// This check is authoritative: the persistent tier carries a separate
    /// store-level expiry set at write time, and a row the store still
    /// considers fresh is discarded if this disagrees.
    pub fn is_expired(&self) -> bool {
        Utc::now() - self.cached_at > Duration::seconds(self.ttl)
    }

    /// Payload size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.content.len()
    }
}
