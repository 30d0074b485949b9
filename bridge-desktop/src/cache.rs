//! Content Cache using SQLite

use async_trait::async_trait;
use bridge_traits::{
    cache::{CacheAdapter, CacheEntry, EntryMetadata},
    error::{BridgeError, Result},
};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::path::PathBuf;
use tracing::{debug, warn};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS cache_entries (
        key TEXT PRIMARY KEY,
        content BLOB NOT NULL,
        cached_at INTEGER NOT NULL,
        metadata TEXT NOT NULL
    )
"#;

/// SQLite-backed cache adapter
///
/// One row per key. Metadata is stored as a JSON object, content as a blob.
/// `set` is a single upsert statement, so writes to one key are atomic.
pub struct SqliteCacheAdapter {
    pool: SqlitePool,
}

impl SqliteCacheAdapter {
    /// Open (or create) the cache database at `db_path`.
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to connect to DB: {}", e)))?;

        Self::create_table(&pool).await?;
        debug!(path = ?db_path, "Initialized cache store");

        Ok(Self { pool })
    }

    /// Create an in-memory cache (for testing)
    ///
    /// Every pooled connection to `sqlite::memory:` opens a separate
    /// database, so the pool is pinned to a single connection.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to connect to DB: {}", e)))?;

        Self::create_table(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_table(pool: &SqlitePool) -> Result<()> {
        sqlx::query(CREATE_TABLE)
            .execute(pool)
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to create table: {}", e)))?;
        Ok(())
    }

    /// Number of stored entries.
    pub async fn len(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) FROM cache_entries")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to count entries: {}", e)))?;
        let count: i64 = row.get(0);
        Ok(count as usize)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Remove one entry; absent keys are ignored.
    pub async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM cache_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to delete entry: {}", e)))?;

        debug!(key = key, "Removed cache entry");
        Ok(())
    }
}

#[async_trait]
impl CacheAdapter for SqliteCacheAdapter {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row = sqlx::query("SELECT content, cached_at, metadata FROM cache_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to read entry: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let content: Vec<u8> = row.get(0);
        let cached_at_ms: i64 = row.get(1);
        let metadata_json: String = row.get(2);

        let metadata: EntryMetadata = serde_json::from_str(&metadata_json)?;
        let cached_at = DateTime::<Utc>::from_timestamp_millis(cached_at_ms).unwrap_or_else(|| {
            warn!(key = key, cached_at_ms, "Stored timestamp out of range");
            DateTime::<Utc>::default()
        });

        Ok(Some(
            CacheEntry::new(content, cached_at).with_metadata(metadata),
        ))
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<()> {
        let metadata_json = serde_json::to_string(&entry.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, content, cached_at, metadata)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                content = excluded.content,
                cached_at = excluded.cached_at,
                metadata = excluded.metadata
            "#,
        )
        .bind(key)
        .bind(entry.content.as_ref())
        .bind(entry.cached_at.timestamp_millis())
        .bind(metadata_json)
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::OperationFailed(format!("Failed to write entry: {}", e)))?;

        debug!(key = key, bytes = entry.content.len(), "Stored cache entry");
        Ok(())
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM cache_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to check key: {}", e)))?;

        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let cache = SqliteCacheAdapter::in_memory().await.unwrap();
        assert!(cache.get("resource:org1/en/ult").await.unwrap().is_none());
        assert!(!cache.contains("resource:org1/en/ult").await.unwrap());
        assert!(cache.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_set_and_get_preserves_content_and_metadata() {
        let cache = SqliteCacheAdapter::in_memory().await.unwrap();

        let mut metadata = EntryMetadata::new();
        metadata.insert("downloadComplete".to_string(), json!(true));
        metadata.insert("totalSize".to_string(), json!(2048));

        let entry = CacheEntry::new(b"\\c 1".to_vec(), instant()).with_metadata(metadata.clone());
        cache.set("org1/en/ult/GEN", entry).await.unwrap();

        let stored = cache.get("org1/en/ult/GEN").await.unwrap().unwrap();
        assert_eq!(stored.content.as_ref(), b"\\c 1");
        assert_eq!(stored.cached_at, instant());
        assert_eq!(stored.metadata, metadata);
        assert_eq!(cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_set_replaces_existing_entry() {
        let cache = SqliteCacheAdapter::in_memory().await.unwrap();

        cache
            .set("k", CacheEntry::new(b"old".to_vec(), instant()))
            .await
            .unwrap();
        cache
            .set("k", CacheEntry::metadata_only(instant()))
            .await
            .unwrap();

        let stored = cache.get("k").await.unwrap().unwrap();
        assert!(stored.content.is_empty());
        assert_eq!(cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let cache = SqliteCacheAdapter::in_memory().await.unwrap();
        cache
            .set("k", CacheEntry::metadata_only(instant()))
            .await
            .unwrap();

        cache.remove("k").await.unwrap();
        cache.remove("never-written").await.unwrap();
        assert!(!cache.contains("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = std::env::temp_dir().join(format!(
            "offline-cache-test-{}",
            std::process::id()
        ));
        let path = dir.join("cache.db");

        {
            let cache = SqliteCacheAdapter::new(path.clone()).await.unwrap();
            cache
                .set("k", CacheEntry::new(b"persisted".to_vec(), instant()))
                .await
                .unwrap();
        }

        let reopened = SqliteCacheAdapter::new(path).await.unwrap();
        let stored = reopened.get("k").await.unwrap().unwrap();
        assert_eq!(stored.content.as_ref(), b"persisted");

        let _ = std::fs::remove_dir_all(dir);
    }
}
