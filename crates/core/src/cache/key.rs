//! Cache key derivation.

use sha2::{Digest, Sha256};

/// Derive the cache key for a `(namespace, path, source_kind)` triple.
///
/// Deterministic and pure: identical triples always hash to the same key.
/// The fields are separated by a newline, which cannot appear in any of
/// them, so distinct triples cannot produce the same pre-image. Triples
/// that collide under SHA-256 itself would silently share an entry; no
/// collision detection is performed.
pub fn derive_cache_key(namespace: &str, path: &str, source_kind: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b"\n");
    hasher.update(path.as_bytes());
    hasher.update(b"\n");
    hasher.update(source_kind.as_bytes());
    hex::encode(hasher.finalize())
}
