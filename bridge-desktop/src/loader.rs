//! HTTP Resource Loader using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    cache::{CacheAdapter, CacheEntry, EntryMetadata},
    error::{BridgeError, Result},
    loader::{
        DownloadMethod, DownloadOptions, LoaderProgress, ProgressCallback, ResourceLoader,
        TransferSummary,
    },
    metadata::MetadataStore,
    registry::IngredientProbe,
    resource::{ResourceDescriptor, ResourceKey},
};
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use core_runtime::logging::redact_url;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::registry::KeyPathProbe;

/// Fetches resource content over HTTP and writes it into the cache.
///
/// - **Bulk archive**: the descriptor's `archiveUrl` is fetched in one
///   request and stored under `"archive:{owner}/{language}/{id}"`.
/// - **Individual**: each ingredient is fetched from
///   `"{base_url}/{owner}/{language}/{id}/{ingredient}"` and stored under the
///   probe's key for that ingredient.
///
/// The loader handles every type unless restricted with
/// [`HttpResourceLoader::for_types`].
pub struct HttpResourceLoader {
    client: Client,
    catalog: Arc<dyn MetadataStore>,
    cache: Arc<dyn CacheAdapter>,
    base_url: String,
    probe: Arc<dyn IngredientProbe>,
    handled_types: Vec<String>,
}

impl HttpResourceLoader {
    /// Create a loader with a 5 minute request timeout.
    pub fn new(
        base_url: impl Into<String>,
        catalog: Arc<dyn MetadataStore>,
        cache: Arc<dyn CacheAdapter>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("offline-content-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, base_url, catalog, cache))
    }

    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        catalog: Arc<dyn MetadataStore>,
        cache: Arc<dyn CacheAdapter>,
    ) -> Self {
        Self {
            client,
            catalog,
            cache,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            probe: Arc::new(KeyPathProbe::new()),
            handled_types: Vec::new(),
        }
    }

    /// Store ingredients under the keys `probe` produces. Use the same probe
    /// the type registry hands to the completeness checker.
    pub fn with_probe(mut self, probe: Arc<dyn IngredientProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Only claim descriptors of these types.
    pub fn for_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.handled_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Cache key of a resource's bulk archive.
    pub fn archive_cache_key(key: &ResourceKey) -> String {
        format!("archive:{}", key)
    }

    fn ingredient_url(&self, key: &ResourceKey, identifier: &str) -> String {
        format!("{}/{}/{}", self.base_url, key, identifier)
    }

    /// GET `url` into memory, reporting byte progress through `on_chunk`.
    ///
    /// Error text carries the URL without its query string; it ends up in
    /// task messages, error markers and logs.
    async fn fetch(&self, url: &str, mut on_chunk: impl FnMut(u64, Option<u64>)) -> Result<Bytes> {
        let shown = redact_url(url);
        let mut response = self.client.get(url).send().await.map_err(|e| {
            BridgeError::OperationFailed(format!("Request to {} failed: {}", shown, e.without_url()))
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BridgeError::NotFound(shown.to_string()));
        }
        if !status.is_success() {
            return Err(BridgeError::OperationFailed(format!(
                "HTTP {} for {}",
                status.as_u16(),
                shown
            )));
        }

        let expected = response.content_length();
        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| {
                BridgeError::OperationFailed(format!("Body read failed: {}", e.without_url()))
            })?
        {
            body.extend_from_slice(&chunk);
            on_chunk(body.len() as u64, expected);
        }

        Ok(body.freeze())
    }

    async fn download_archive(
        &self,
        descriptor: &ResourceDescriptor,
        on_progress: &ProgressCallback,
    ) -> Result<TransferSummary> {
        let url = descriptor.transfer.archive_url.as_deref().ok_or_else(|| {
            BridgeError::OperationFailed(format!("{} has no archive URL", descriptor.key))
        })?;

        on_progress(LoaderProgress::new(0, "Downloading archive"));
        let body = self
            .fetch(url, |received, expected| {
                if let Some(total) = expected.filter(|total| *total > 0) {
                    let percent = (received.saturating_mul(100) / total).min(99) as u8;
                    on_progress(LoaderProgress::new(percent, "Downloading archive"));
                }
            })
            .await?;

        let size = body.len() as u64;
        let mut metadata = EntryMetadata::new();
        metadata.insert("sourceUrl".to_string(), redact_url(url).into());
        self.cache
            .set(
                &Self::archive_cache_key(&descriptor.key),
                CacheEntry::new(body, Utc::now()).with_metadata(metadata),
            )
            .await?;

        on_progress(LoaderProgress::new(100, "Archive stored"));
        Ok(TransferSummary {
            total_size: Some(size),
            ingredient_count: Some(descriptor.ingredients.len()),
        })
    }

    async fn download_ingredients(
        &self,
        descriptor: &ResourceDescriptor,
        skip_existing: bool,
        on_progress: &ProgressCallback,
    ) -> Result<TransferSummary> {
        let total = descriptor.ingredients.len();
        let mut total_size = 0u64;

        for (index, ingredient) in descriptor.ingredients.iter().enumerate() {
            let cache_key = self
                .probe
                .ingredient_cache_key(&descriptor.key, ingredient);

            if skip_existing && self.cache.contains(&cache_key).await? {
                debug!(key = %cache_key, "Ingredient already cached");
            } else {
                let url = self.ingredient_url(&descriptor.key, &ingredient.identifier);
                let body = self.fetch(&url, |_, _| {}).await?;
                total_size += body.len() as u64;
                self.cache
                    .set(&cache_key, CacheEntry::new(body, Utc::now()))
                    .await?;
            }

            let percent = ((index + 1) * 100 / total.max(1)) as u8;
            on_progress(LoaderProgress::new(
                percent,
                format!("{} ({}/{})", ingredient.identifier, index + 1, total),
            ));
        }

        Ok(TransferSummary {
            total_size: Some(total_size),
            ingredient_count: Some(total),
        })
    }
}

#[async_trait]
impl ResourceLoader for HttpResourceLoader {
    fn name(&self) -> &str {
        "http"
    }

    fn can_handle(&self, descriptor: &ResourceDescriptor) -> bool {
        self.handled_types.is_empty()
            || self
                .handled_types
                .iter()
                .any(|t| *t == descriptor.resource_type)
    }

    #[instrument(skip(self, on_progress), fields(resource = %key, method = %options.method))]
    async fn download_resource(
        &self,
        key: &ResourceKey,
        options: DownloadOptions,
        on_progress: ProgressCallback,
    ) -> Result<TransferSummary> {
        let descriptor = self
            .catalog
            .get_resource_metadata(key)
            .await?
            .ok_or_else(|| BridgeError::NotFound(format!("Resource {}", key)))?;

        match options.method {
            DownloadMethod::BulkArchive => self.download_archive(&descriptor, &on_progress).await,
            DownloadMethod::Individual | DownloadMethod::Inferred => {
                self.download_ingredients(&descriptor, options.skip_existing, &on_progress)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JsonCatalogStore, SqliteCacheAdapter};
    use parking_lot::Mutex;

    async fn loader_with(descriptors: Vec<ResourceDescriptor>) -> (HttpResourceLoader, Arc<SqliteCacheAdapter>) {
        let cache = Arc::new(SqliteCacheAdapter::in_memory().await.unwrap());
        let catalog = Arc::new(JsonCatalogStore::from_descriptors(descriptors));
        let loader = HttpResourceLoader::new("http://127.0.0.1:9/content/", catalog, cache.clone()).unwrap();
        (loader, cache)
    }

    #[tokio::test]
    async fn test_can_handle_respects_type_filter() {
        let (loader, _) = loader_with(Vec::new()).await;
        let scripture = ResourceDescriptor::new(ResourceKey::new("o", "en", "ult"), "scripture");
        let notes = ResourceDescriptor::new(ResourceKey::new("o", "en", "tn"), "notes");

        assert!(loader.can_handle(&notes));

        let loader = loader.for_types(["scripture"]);
        assert!(loader.can_handle(&scripture));
        assert!(!loader.can_handle(&notes));
    }

    #[tokio::test]
    async fn test_urls_and_keys() {
        let (loader, _) = loader_with(Vec::new()).await;
        let key = ResourceKey::new("org1", "en", "ult");

        assert_eq!(
            loader.ingredient_url(&key, "GEN"),
            "http://127.0.0.1:9/content/org1/en/ult/GEN"
        );
        assert_eq!(HttpResourceLoader::archive_cache_key(&key), "archive:org1/en/ult");
    }

    #[tokio::test]
    async fn test_unknown_resource_is_not_found() {
        let (loader, _) = loader_with(Vec::new()).await;
        let options = DownloadOptions {
            method: DownloadMethod::Individual,
            skip_existing: true,
        };

        let result = loader
            .download_resource(&ResourceKey::new("o", "en", "x"), options, Arc::new(|_: LoaderProgress| {}))
            .await;
        assert!(matches!(result, Err(BridgeError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_bulk_without_archive_url_fails() {
        let key = ResourceKey::new("o", "en", "ult");
        let (loader, _) = loader_with(vec![ResourceDescriptor::new(key.clone(), "scripture")]).await;
        let options = DownloadOptions {
            method: DownloadMethod::BulkArchive,
            skip_existing: false,
        };

        let result = loader.download_resource(&key, options, Arc::new(|_: LoaderProgress| {})).await;
        assert!(matches!(result, Err(BridgeError::OperationFailed(_))));
    }

    #[tokio::test]
    async fn test_request_errors_hide_query_string() {
        let (loader, _) = loader_with(Vec::new()).await;

        let result = loader
            .fetch("http://127.0.0.1:9/content/ult.zip?sig=secret-token", |_, _| {})
            .await;
        match result {
            Err(BridgeError::OperationFailed(message)) => {
                assert!(message.contains("http://127.0.0.1:9/content/ult.zip"));
                assert!(!message.contains("secret-token"), "{}", message);
            }
            other => panic!("expected OperationFailed, got {:?}", other.map(|b| b.len())),
        }
    }

    #[tokio::test]
    async fn test_individual_skips_cached_ingredients_without_network() {
        let key = ResourceKey::new("o", "en", "ult");
        let descriptor =
            ResourceDescriptor::new(key.clone(), "scripture").with_ingredients(["GEN", "EXO"]);
        let (loader, cache) = loader_with(vec![descriptor]).await;

        for id in ["GEN", "EXO"] {
            cache
                .set(&format!("o/en/ult/{}", id), CacheEntry::new(b"x".to_vec(), Utc::now()))
                .await
                .unwrap();
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let on_progress: ProgressCallback = Arc::new(move |p: LoaderProgress| sink.lock().push(p.percentage));

        let options = DownloadOptions {
            method: DownloadMethod::Individual,
            skip_existing: true,
        };
        let summary = loader.download_resource(&key, options, on_progress).await.unwrap();

        assert_eq!(summary.ingredient_count, Some(2));
        assert_eq!(summary.total_size, Some(0));
        assert_eq!(*seen.lock(), vec![50, 100]);
    }
}
