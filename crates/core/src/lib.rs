//! Core caching subsystem for docstack.
//!
//! This crate provides:
//! - Two-tier (in-process LRU + SQLite) documentation cache
//! - Content-aware TTL policy
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheEntry, DocumentationCache};
pub use config::CacheConfig;
pub use error::Error;
