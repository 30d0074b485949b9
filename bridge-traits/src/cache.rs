//! Content Cache Abstraction
//!
//! Persistent key -> entry store holding downloaded content plus free-form
//! metadata. The orchestration core only relies on atomic `get`/`set` per key;
//! eviction, encryption and storage layout are the host's concern.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// Free-form, string-keyed metadata attached to a cache entry.
pub type EntryMetadata = serde_json::Map<String, serde_json::Value>;

/// One cached value.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub content: Bytes,
    pub cached_at: DateTime<Utc>,
    pub metadata: EntryMetadata,
}

impl CacheEntry {
    pub fn new(content: impl Into<Bytes>, cached_at: DateTime<Utc>) -> Self {
        Self {
            content: content.into(),
            cached_at,
            metadata: EntryMetadata::new(),
        }
    }

    /// Entry that carries metadata only (status markers).
    pub fn metadata_only(cached_at: DateTime<Utc>) -> Self {
        Self::new(Bytes::new(), cached_at)
    }

    pub fn with_metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Cache adapter trait
///
/// Implementations must make each `get`/`set` atomic for a single key. No
/// cross-key transactions are assumed.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::cache::{CacheAdapter, CacheEntry};
///
/// async fn store(cache: &dyn CacheAdapter, key: &str, bytes: Vec<u8>) -> Result<()> {
///     cache.set(key, CacheEntry::new(bytes, chrono::Utc::now())).await
/// }
/// ```
#[async_trait]
pub trait CacheAdapter: Send + Sync {
    /// Read an entry, `None` if the key was never written.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Write (replace) an entry.
    async fn set(&self, key: &str, entry: CacheEntry) -> Result<()>;

    /// Whether an entry exists for `key`.
    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
