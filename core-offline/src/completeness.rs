//! # Completeness Checker
//!
//! Decides whether a resource is usable offline and records durable
//! completion and error markers in the cache.
//!
//! ## Sources of Truth
//!
//! A resource's status is derived in this order:
//!
//! 1. No catalog entry: `missing`.
//! 2. Marker with `downloadComplete == true`: `complete`.
//! 3. Marker with `downloadError`: `error`.
//! 4. Marker with `cachedCount < expectedCount`: `partial`.
//! 5. Ingredient probing, for types that expose an
//!    [`IngredientProbe`](bridge_traits::IngredientProbe): all present is
//!    `complete` (and a marker is back-filled), some is `partial`, none is
//!    `missing`.
//! 6. Otherwise `missing`.
//!
//! Step 5 recognises content cached before markers existed, so it is never
//! downloaded again.
//!
//! ## Marker Layout
//!
//! Markers live under `"resource:{owner}/{language}/{id}"` as a
//! metadata-only cache entry. Fields are listed in [`marker_fields`]; other
//! fields already present on the entry are preserved on every write.

use bridge_traits::{
    CacheAdapter, CacheEntry, Clock, DownloadMethod, EntryMetadata, MetadataStore,
    ResourceDescriptor, ResourceKey, ResourceTypeRegistry,
};
use chrono::{DateTime, Utc};
use core_runtime::events::{CompletenessEvent, CoreEvent, EventBus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::error::Result;

/// Reserved metadata fields of a completion marker.
pub mod marker_fields {
    pub const COMPLETE: &str = "downloadComplete";
    /// RFC 3339 timestamp
    pub const DOWNLOADED_AT: &str = "downloadedAt";
    pub const METHOD: &str = "downloadMethod";
    pub const TOTAL_SIZE: &str = "totalSize";
    pub const CACHED_COUNT: &str = "cachedCount";
    pub const EXPECTED_COUNT: &str = "expectedCount";
    pub const ERROR: &str = "downloadError";
}

use marker_fields as fields;

/// Cache key holding the marker of `key`.
pub fn marker_key(key: &ResourceKey) -> String {
    format!("resource:{}", key)
}

/// Offline availability of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletenessStatus {
    Complete,
    Partial,
    Missing,
    Error,
}

impl CompletenessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletenessStatus::Complete => "complete",
            CompletenessStatus::Partial => "partial",
            CompletenessStatus::Missing => "missing",
            CompletenessStatus::Error => "error",
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, CompletenessStatus::Complete)
    }
}

impl fmt::Display for CompletenessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one resource plus whatever the marker recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCompleteness {
    pub key: ResourceKey,
    pub status: CompletenessStatus,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub total_size: Option<u64>,
    pub method: Option<DownloadMethod>,
    pub error: Option<String>,
    pub cached_count: Option<usize>,
    pub expected_count: Option<usize>,
}

impl ResourceCompleteness {
    fn bare(key: &ResourceKey, status: CompletenessStatus) -> Self {
        Self {
            key: key.clone(),
            status,
            downloaded_at: None,
            total_size: None,
            method: None,
            error: None,
            cached_count: None,
            expected_count: None,
        }
    }

    fn from_marker(key: &ResourceKey, status: CompletenessStatus, marker: &EntryMetadata) -> Self {
        Self {
            key: key.clone(),
            status,
            downloaded_at: marker
                .get(fields::DOWNLOADED_AT)
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            total_size: marker.get(fields::TOTAL_SIZE).and_then(Value::as_u64),
            method: marker
                .get(fields::METHOD)
                .and_then(Value::as_str)
                .and_then(DownloadMethod::parse),
            error: marker_error(marker),
            cached_count: count_field(marker, fields::CACHED_COUNT),
            expected_count: count_field(marker, fields::EXPECTED_COUNT),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }
}

fn count_field(marker: &EntryMetadata, field: &str) -> Option<usize> {
    marker
        .get(field)
        .and_then(Value::as_u64)
        .map(|n| n as usize)
}

fn marker_error(marker: &EntryMetadata) -> Option<String> {
    marker
        .get(fields::ERROR)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Extra facts recorded alongside a completion marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionDetails {
    pub method: Option<DownloadMethod>,
    pub total_size: Option<u64>,
    pub cached_count: Option<usize>,
    pub expected_count: Option<usize>,
}

impl CompletionDetails {
    pub fn with_method(method: DownloadMethod) -> Self {
        Self {
            method: Some(method),
            ..Default::default()
        }
    }
}

/// Aggregate of a batch check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletenessReport {
    pub total: usize,
    pub complete: usize,
    /// `partial` plus `missing`
    pub incomplete: usize,
    pub errors: usize,
    /// `round(complete / total * 100)`, 100 for an empty catalog
    pub percentage: u8,
    pub resources: Vec<ResourceCompleteness>,
}

impl CompletenessReport {
    fn from_entries(resources: Vec<ResourceCompleteness>) -> Self {
        let total = resources.len();
        let mut complete = 0;
        let mut incomplete = 0;
        let mut errors = 0;
        for entry in &resources {
            match entry.status {
                CompletenessStatus::Complete => complete += 1,
                CompletenessStatus::Partial | CompletenessStatus::Missing => incomplete += 1,
                CompletenessStatus::Error => errors += 1,
            }
        }

        Self {
            total,
            complete,
            incomplete,
            errors,
            percentage: percentage(complete, total),
            resources,
        }
    }
}

/// `round(part / total * 100)`; an empty whole counts as done.
pub(crate) fn percentage(part: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((part as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

/// Reads and writes completion state for resources.
///
/// Holds no state of its own; every check re-reads the cache.
pub struct CompletenessChecker {
    metadata: Arc<dyn MetadataStore>,
    cache: Arc<dyn CacheAdapter>,
    registry: Arc<dyn ResourceTypeRegistry>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
}

impl CompletenessChecker {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        cache: Arc<dyn CacheAdapter>,
        registry: Arc<dyn ResourceTypeRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            metadata,
            cache,
            registry,
            clock,
            event_bus: None,
        }
    }

    /// Publish batch reports on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Current status of one resource.
    #[instrument(skip(self), fields(resource = %key))]
    pub async fn check_resource(&self, key: &ResourceKey) -> Result<ResourceCompleteness> {
        let Some(descriptor) = self.metadata.get_resource_metadata(key).await? else {
            debug!("No catalog entry");
            return Ok(ResourceCompleteness::bare(key, CompletenessStatus::Missing));
        };

        if let Some(entry) = self.cache.get(&marker_key(key)).await? {
            let marker = &entry.metadata;

            if marker.get(fields::COMPLETE).and_then(Value::as_bool) == Some(true) {
                return Ok(ResourceCompleteness::from_marker(
                    key,
                    CompletenessStatus::Complete,
                    marker,
                ));
            }

            if marker_error(marker).is_some() {
                return Ok(ResourceCompleteness::from_marker(
                    key,
                    CompletenessStatus::Error,
                    marker,
                ));
            }

            let cached = count_field(marker, fields::CACHED_COUNT);
            let expected = count_field(marker, fields::EXPECTED_COUNT);
            if let (Some(cached), Some(expected)) = (cached, expected) {
                if cached < expected {
                    return Ok(ResourceCompleteness::from_marker(
                        key,
                        CompletenessStatus::Partial,
                        marker,
                    ));
                }
            }
        }

        if let Some(status) = self.probe_ingredients(&descriptor).await? {
            return Ok(status);
        }

        Ok(ResourceCompleteness::bare(key, CompletenessStatus::Missing))
    }

    /// Infer status from per-ingredient cache presence. `None` when the type
    /// has no probe or the descriptor lists no ingredients.
    async fn probe_ingredients(
        &self,
        descriptor: &ResourceDescriptor,
    ) -> Result<Option<ResourceCompleteness>> {
        if descriptor.ingredients.is_empty() {
            return Ok(None);
        }
        let Some(probe) = self.registry.ingredient_probe(&descriptor.resource_type) else {
            return Ok(None);
        };

        let key = &descriptor.key;
        let expected = descriptor.ingredients.len();
        let mut cached = 0;
        for ingredient in &descriptor.ingredients {
            let cache_key = probe.ingredient_cache_key(key, ingredient);
            if self.cache.contains(&cache_key).await? {
                cached += 1;
            }
        }

        let status = if cached == expected {
            CompletenessStatus::Complete
        } else if cached > 0 {
            CompletenessStatus::Partial
        } else {
            CompletenessStatus::Missing
        };

        let mut result = ResourceCompleteness::bare(key, status);
        result.cached_count = Some(cached);
        result.expected_count = Some(expected);

        if status.is_complete() {
            debug!(ingredients = expected, "All ingredients cached, back-filling marker");
            let details = CompletionDetails {
                method: Some(DownloadMethod::Inferred),
                total_size: None,
                cached_count: Some(cached),
                expected_count: Some(expected),
            };
            match self.mark_complete(key, details).await {
                Ok(()) => {
                    result.method = Some(DownloadMethod::Inferred);
                    result.downloaded_at = Some(self.clock.now());
                }
                Err(e) => warn!(error = %e, "Failed to back-fill completion marker"),
            }
        }

        Ok(Some(result))
    }

    /// Record a successful download. Writing it twice is harmless.
    #[instrument(skip(self, details), fields(resource = %key))]
    pub async fn mark_complete(&self, key: &ResourceKey, details: CompletionDetails) -> Result<()> {
        let now = self.clock.now();
        self.merge_marker(key, |marker| {
            marker.insert(fields::COMPLETE.to_string(), Value::Bool(true));
            marker.remove(fields::ERROR);
            marker.insert(
                fields::DOWNLOADED_AT.to_string(),
                Value::String(now.to_rfc3339()),
            );
            if let Some(method) = details.method {
                marker.insert(fields::METHOD.to_string(), method.as_str().into());
            }
            if let Some(size) = details.total_size {
                marker.insert(fields::TOTAL_SIZE.to_string(), size.into());
            }
            if let Some(count) = details.cached_count {
                marker.insert(fields::CACHED_COUNT.to_string(), (count as u64).into());
            }
            if let Some(count) = details.expected_count {
                marker.insert(fields::EXPECTED_COUNT.to_string(), (count as u64).into());
            }
        })
        .await
    }

    /// Record a failed download; demotes a previously complete resource.
    #[instrument(skip(self), fields(resource = %key))]
    pub async fn mark_error(&self, key: &ResourceKey, message: &str) -> Result<()> {
        self.merge_marker(key, |marker| {
            marker.insert(fields::COMPLETE.to_string(), Value::Bool(false));
            marker.insert(fields::ERROR.to_string(), message.into());
        })
        .await
    }

    async fn merge_marker(
        &self,
        key: &ResourceKey,
        update: impl FnOnce(&mut EntryMetadata),
    ) -> Result<()> {
        let cache_key = marker_key(key);
        let now = self.clock.now();
        let mut entry = self
            .cache
            .get(&cache_key)
            .await?
            .unwrap_or_else(|| CacheEntry::metadata_only(now));

        update(&mut entry.metadata);
        entry.cached_at = now;

        self.cache.set(&cache_key, entry).await?;
        Ok(())
    }

    /// Check every resource in the catalog.
    pub async fn check_all(&self) -> Result<CompletenessReport> {
        let keys = self.metadata.get_all_resource_keys().await?;
        let report = self.check_keys(keys).await;
        self.publish("all", &report);
        Ok(report)
    }

    /// Check catalog resources whose key has language segment `code`.
    pub async fn check_language(&self, code: &str) -> Result<CompletenessReport> {
        let keys = self
            .metadata
            .get_all_resource_keys()
            .await?
            .into_iter()
            .filter(|key| key.language == code)
            .collect();
        let report = self.check_keys(keys).await;
        self.publish(code, &report);
        Ok(report)
    }

    async fn check_keys(&self, keys: Vec<ResourceKey>) -> CompletenessReport {
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let entry = match self.check_resource(&key).await {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(resource = %key, error = %e, "Completeness check failed");
                    let mut failed = ResourceCompleteness::bare(&key, CompletenessStatus::Error);
                    failed.error = Some(e.to_string());
                    failed
                }
            };
            entries.push(entry);
        }
        CompletenessReport::from_entries(entries)
    }

    fn publish(&self, scope: &str, report: &CompletenessReport) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Completeness(CompletenessEvent::Checked {
                scope: scope.to_string(),
                total: report.total,
                complete: report.complete,
                incomplete: report.incomplete,
                errors: report.errors,
                percentage: report.percentage,
            }))
            .ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::{JsonCatalogStore, KeyPathProbe, SqliteCacheAdapter, StaticTypeRegistry};
    use bridge_traits::{FixedClock, ResourceTypeInfo};
    use chrono::TimeZone;

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()))
    }

    struct Fixture {
        checker: CompletenessChecker,
        cache: Arc<SqliteCacheAdapter>,
    }

    async fn fixture(descriptors: Vec<ResourceDescriptor>) -> Fixture {
        let cache = Arc::new(SqliteCacheAdapter::in_memory().await.unwrap());
        let registry = StaticTypeRegistry::builder()
            .register_with_probe(ResourceTypeInfo::new("scripture"), KeyPathProbe::new())
            .register(ResourceTypeInfo::new("notes"))
            .build();
        let checker = CompletenessChecker::new(
            Arc::new(JsonCatalogStore::from_descriptors(descriptors)),
            cache.clone(),
            Arc::new(registry),
            clock(),
        );
        Fixture { checker, cache }
    }

    fn scripture(id: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(ResourceKey::new("org1", "en", id), "scripture")
            .with_ingredients(["GEN", "EXO", "LEV"])
    }

    async fn cache_ingredient(cache: &SqliteCacheAdapter, id: &str, ingredient: &str) {
        cache
            .set(
                &format!("org1/en/{}/{}", id, ingredient),
                CacheEntry::new(b"content".to_vec(), Utc::now()),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_resource_is_missing() {
        let f = fixture(Vec::new()).await;
        let status = f
            .checker
            .check_resource(&ResourceKey::new("org1", "en", "ult"))
            .await
            .unwrap();
        assert_eq!(status.status, CompletenessStatus::Missing);
    }

    #[tokio::test]
    async fn test_mark_complete_is_idempotent() {
        let f = fixture(vec![scripture("ult")]).await;
        let key = ResourceKey::new("org1", "en", "ult");
        let details = CompletionDetails {
            method: Some(DownloadMethod::BulkArchive),
            total_size: Some(4096),
            ..Default::default()
        };

        f.checker.mark_complete(&key, details.clone()).await.unwrap();
        let first = f.checker.check_resource(&key).await.unwrap();
        f.checker.mark_complete(&key, details).await.unwrap();
        let second = f.checker.check_resource(&key).await.unwrap();

        assert_eq!(first.status, CompletenessStatus::Complete);
        assert_eq!(second, first);
        assert_eq!(first.total_size, Some(4096));
        assert_eq!(first.method, Some(DownloadMethod::BulkArchive));
        assert_eq!(first.downloaded_at, Some(clock().now()));
    }

    #[tokio::test]
    async fn test_mark_error_after_complete_demotes() {
        let f = fixture(vec![scripture("ult")]).await;
        let key = ResourceKey::new("org1", "en", "ult");

        f.checker
            .mark_complete(&key, CompletionDetails::default())
            .await
            .unwrap();
        f.checker.mark_error(&key, "checksum mismatch").await.unwrap();

        let status = f.checker.check_resource(&key).await.unwrap();
        assert_eq!(status.status, CompletenessStatus::Error);
        assert_eq!(status.error.as_deref(), Some("checksum mismatch"));
    }

    #[tokio::test]
    async fn test_complete_after_error_wins() {
        let f = fixture(vec![scripture("ult")]).await;
        let key = ResourceKey::new("org1", "en", "ult");

        f.checker.mark_error(&key, "timeout").await.unwrap();
        f.checker
            .mark_complete(&key, CompletionDetails::default())
            .await
            .unwrap();

        let status = f.checker.check_resource(&key).await.unwrap();
        assert_eq!(status.status, CompletenessStatus::Complete);
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn test_error_marker_beats_partial_ingredients() {
        let f = fixture(vec![scripture("ult")]).await;
        let key = ResourceKey::new("org1", "en", "ult");
        cache_ingredient(&f.cache, "ult", "GEN").await;
        f.checker.mark_error(&key, "boom").await.unwrap();

        let status = f.checker.check_resource(&key).await.unwrap();
        assert_eq!(status.status, CompletenessStatus::Error);
    }

    #[tokio::test]
    async fn test_recorded_counts_report_partial() {
        let f = fixture(vec![scripture("ult")]).await;
        let key = ResourceKey::new("org1", "en", "ult");

        let mut marker = EntryMetadata::new();
        marker.insert(fields::CACHED_COUNT.to_string(), 1.into());
        marker.insert(fields::EXPECTED_COUNT.to_string(), 3.into());
        f.cache
            .set(
                &marker_key(&key),
                CacheEntry::metadata_only(Utc::now()).with_metadata(marker),
            )
            .await
            .unwrap();

        let status = f.checker.check_resource(&key).await.unwrap();
        assert_eq!(status.status, CompletenessStatus::Partial);
        assert_eq!(status.cached_count, Some(1));
        assert_eq!(status.expected_count, Some(3));
    }

    #[tokio::test]
    async fn test_probe_infers_status_from_ingredients() {
        let f = fixture(vec![scripture("ult"), scripture("ust")]).await;
        let ult = ResourceKey::new("org1", "en", "ult");
        let ust = ResourceKey::new("org1", "en", "ust");

        assert_eq!(
            f.checker.check_resource(&ult).await.unwrap().status,
            CompletenessStatus::Missing
        );

        cache_ingredient(&f.cache, "ult", "GEN").await;
        let partial = f.checker.check_resource(&ult).await.unwrap();
        assert_eq!(partial.status, CompletenessStatus::Partial);
        assert_eq!(partial.cached_count, Some(1));

        for ingredient in ["GEN", "EXO", "LEV"] {
            cache_ingredient(&f.cache, "ust", ingredient).await;
        }
        let inferred = f.checker.check_resource(&ust).await.unwrap();
        assert_eq!(inferred.status, CompletenessStatus::Complete);
        assert_eq!(inferred.method, Some(DownloadMethod::Inferred));
    }

    #[tokio::test]
    async fn test_inferred_complete_is_back_filled() {
        let f = fixture(vec![scripture("ult")]).await;
        let key = ResourceKey::new("org1", "en", "ult");
        for ingredient in ["GEN", "EXO", "LEV"] {
            cache_ingredient(&f.cache, "ult", ingredient).await;
        }

        f.checker.check_resource(&key).await.unwrap();

        let marker = f.cache.get(&marker_key(&key)).await.unwrap().unwrap();
        assert_eq!(marker.metadata.get(fields::COMPLETE), Some(&Value::Bool(true)));
        assert_eq!(
            marker.metadata.get(fields::METHOD).and_then(Value::as_str),
            Some("inferred")
        );
    }

    #[tokio::test]
    async fn test_types_without_probe_fall_through_to_missing() {
        let notes = ResourceDescriptor::new(ResourceKey::new("org1", "en", "tn"), "notes")
            .with_ingredients(["GEN"]);
        let f = fixture(vec![notes]).await;
        f.cache
            .set("org1/en/tn/GEN", CacheEntry::new(b"x".to_vec(), Utc::now()))
            .await
            .unwrap();

        let status = f
            .checker
            .check_resource(&ResourceKey::new("org1", "en", "tn"))
            .await
            .unwrap();
        assert_eq!(status.status, CompletenessStatus::Missing);
    }

    #[tokio::test]
    async fn test_marker_preserves_unrelated_fields() {
        let f = fixture(vec![scripture("ult")]).await;
        let key = ResourceKey::new("org1", "en", "ult");

        let mut marker = EntryMetadata::new();
        marker.insert("etag".to_string(), "abc".into());
        f.cache
            .set(
                &marker_key(&key),
                CacheEntry::metadata_only(Utc::now()).with_metadata(marker),
            )
            .await
            .unwrap();

        f.checker.mark_error(&key, "boom").await.unwrap();

        let stored = f.cache.get(&marker_key(&key)).await.unwrap().unwrap();
        assert_eq!(stored.metadata.get("etag").and_then(Value::as_str), Some("abc"));
    }

    #[tokio::test]
    async fn test_check_all_and_language_reports() {
        let mut fr = scripture("lsg");
        fr.key = ResourceKey::new("org1", "fr", "lsg");
        let f = fixture(vec![scripture("ult"), scripture("ust"), fr]).await;

        f.checker
            .mark_complete(&ResourceKey::new("org1", "en", "ult"), CompletionDetails::default())
            .await
            .unwrap();
        f.checker
            .mark_error(&ResourceKey::new("org1", "fr", "lsg"), "boom")
            .await
            .unwrap();

        let all = f.checker.check_all().await.unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.complete, 1);
        assert_eq!(all.incomplete, 1);
        assert_eq!(all.errors, 1);
        assert_eq!(all.percentage, 33);

        let english = f.checker.check_language("en").await.unwrap();
        assert_eq!(english.total, 2);
        assert_eq!(english.percentage, 50);

        let empty = f.checker.check_language("de").await.unwrap();
        assert_eq!(empty.total, 0);
        assert_eq!(empty.percentage, 100);
    }

    #[tokio::test]
    async fn test_check_all_publishes_report() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let f = fixture(vec![scripture("ult")]).await;
        let checker = f.checker.with_event_bus(bus);

        checker.check_all().await.unwrap();

        match rx.recv().await.unwrap() {
            CoreEvent::Completeness(CompletenessEvent::Checked { scope, total, .. }) => {
                assert_eq!(scope, "all");
                assert_eq!(total, 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(0, 0), 100);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(3, 3), 100);
    }
}
