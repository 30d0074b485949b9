//! Shared fixtures for the core-offline integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::{JsonCatalogStore, KeyPathProbe, SqliteCacheAdapter, StaticTypeRegistry};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    DownloadOptions, FixedClock, LoaderProgress, ProgressCallback, ResourceDescriptor,
    ResourceKey, ResourceLoader, ResourceTypeInfo, TransferSummary,
};
use chrono::{TimeZone, Utc};
use core_offline::{DownloadManager, OfflineConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub fn key(owner: &str, language: &str, id: &str) -> ResourceKey {
    ResourceKey::new(owner, language, id)
}

pub struct Fixture {
    pub catalog: Arc<JsonCatalogStore>,
    pub cache: Arc<SqliteCacheAdapter>,
    pub registry: Arc<StaticTypeRegistry>,
}

impl Fixture {
    pub async fn new(descriptors: Vec<ResourceDescriptor>, types: Vec<ResourceTypeInfo>) -> Self {
        let mut builder = StaticTypeRegistry::builder();
        for info in types {
            builder = builder.register_with_probe(info, KeyPathProbe::new());
        }

        Self {
            catalog: Arc::new(JsonCatalogStore::from_descriptors(descriptors)),
            cache: Arc::new(SqliteCacheAdapter::in_memory().await.unwrap()),
            registry: Arc::new(builder.build()),
        }
    }

    pub fn config(&self, loader: Arc<dyn ResourceLoader>) -> core_runtime::config::OfflineConfigBuilder {
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        OfflineConfig::builder()
            .metadata_store(self.catalog.clone())
            .cache(self.cache.clone())
            .type_registry(self.registry.clone())
            .clock(Arc::new(clock))
            .loader(loader)
    }

    pub fn manager(&self, loader: Arc<dyn ResourceLoader>) -> DownloadManager {
        DownloadManager::new(self.config(loader).build().unwrap()).unwrap()
    }
}

/// Loader that records calls and fails, blocks or stalls on request.
#[derive(Default)]
pub struct FakeLoader {
    failures: HashMap<ResourceKey, String>,
    delay: Option<Duration>,
    gate: Option<Arc<Notify>>,
    ingredient_count: Option<usize>,
    calls: Mutex<Vec<ResourceKey>>,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, key: ResourceKey, message: &str) -> Self {
        self.failures.insert(key, message.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every download waits for a `notify_one` on `gate` before finishing.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Report `count` ingredients in every transfer summary.
    pub fn reporting_ingredients(mut self, count: usize) -> Self {
        self.ingredient_count = Some(count);
        self
    }

    pub fn calls(&self) -> Vec<ResourceKey> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ResourceLoader for FakeLoader {
    fn name(&self) -> &str {
        "fake"
    }

    fn can_handle(&self, _descriptor: &ResourceDescriptor) -> bool {
        true
    }

    async fn download_resource(
        &self,
        key: &ResourceKey,
        _options: DownloadOptions,
        on_progress: ProgressCallback,
    ) -> BridgeResult<TransferSummary> {
        self.calls.lock().push(key.clone());
        on_progress(LoaderProgress::new(50, "Halfway"));

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.failures.get(key) {
            return Err(BridgeError::OperationFailed(message.clone()));
        }

        on_progress(LoaderProgress::new(100, "Done"));
        Ok(TransferSummary {
            total_size: Some(1024),
            ingredient_count: self.ingredient_count,
        })
    }
}

/// Poll until `condition` holds, panicking after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
