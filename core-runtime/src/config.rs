//! # Offline Configuration
//!
//! Builder for the bridges and settings the offline-content core needs.
//!
//! ## Required Bridges
//!
//! - `MetadataStore` - catalog of resource descriptors
//! - `CacheAdapter` - durable content and status markers
//! - `ResourceTypeRegistry` - priorities and dependency rules
//! - at least one `ResourceLoader`
//!
//! ## Optional
//!
//! - `Clock` (defaults to [`SystemClock`])
//! - `EventBus` for broadcasting download events (defaults to a bus holding
//!   `event_buffer_size` events per subscriber)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::OfflineConfig;
//! use std::sync::Arc;
//!
//! let config = OfflineConfig::builder()
//!     .metadata_store(Arc::new(catalog))
//!     .cache(Arc::new(cache))
//!     .type_registry(Arc::new(registry))
//!     .loader(Arc::new(text_loader))
//!     .download_timeout(Some(Duration::from_secs(120)))
//!     .build()?;
//! ```
//!
//! A missing bridge fails with [`Error::CapabilityMissing`] naming the bridge,
//! so misconfigured hosts stop at startup instead of at the first download.

use crate::error::{Error, Result};
use crate::events::{EventBus, DEFAULT_EVENT_BUFFER_SIZE};
use bridge_traits::{
    CacheAdapter, Clock, MetadataStore, ResourceLoader, ResourceTypeRegistry, SystemClock,
};
use std::sync::Arc;
use std::time::Duration;

/// Priority applied to types that declare none. Mid-range so declared
/// priorities can sort on either side of it.
pub const DEFAULT_DOWNLOAD_PRIORITY: u32 = 50;

/// Default per-resource loader timeout.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Everything needed to build the resolver, completeness checker and
/// download manager.
#[derive(Clone)]
pub struct OfflineConfig {
    pub metadata_store: Arc<dyn MetadataStore>,
    pub cache: Arc<dyn CacheAdapter>,
    pub type_registry: Arc<dyn ResourceTypeRegistry>,
    /// Checked in order; the first loader that can handle a descriptor wins.
    pub loaders: Vec<Arc<dyn ResourceLoader>>,
    pub clock: Arc<dyn Clock>,
    pub event_bus: EventBus,
    pub settings: DownloadSettings,
}

/// Tunables for a download run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    pub default_priority: u32,
    /// `None` lets a loader run indefinitely.
    pub download_timeout: Option<Duration>,
    /// Drop resources that are already complete before ordering.
    pub skip_complete: bool,
    /// Capacity of the bus `build` creates when none is supplied.
    pub event_buffer_size: usize,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            default_priority: DEFAULT_DOWNLOAD_PRIORITY,
            download_timeout: Some(DEFAULT_DOWNLOAD_TIMEOUT),
            skip_complete: true,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl DownloadSettings {
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }
        if self.download_timeout == Some(Duration::ZERO) {
            return Err(Error::Config(
                "Download timeout must be greater than 0; use None to disable it".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for OfflineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineConfig")
            .field("metadata_store", &"MetadataStore { ... }")
            .field("cache", &"CacheAdapter { ... }")
            .field("type_registry", &"ResourceTypeRegistry { ... }")
            .field(
                "loaders",
                &self.loaders.iter().map(|l| l.name().to_string()).collect::<Vec<_>>(),
            )
            .field("event_bus", &self.event_bus)
            .field("settings", &self.settings)
            .finish()
    }
}

impl OfflineConfig {
    pub fn builder() -> OfflineConfigBuilder {
        OfflineConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.loaders.is_empty() {
            return Err(missing("ResourceLoader", "Register at least one loader with .loader()."));
        }
        self.settings.validate()
    }
}

fn missing(capability: &str, message: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: message.to_string(),
    }
}

/// Builder for [`OfflineConfig`].
#[derive(Default)]
pub struct OfflineConfigBuilder {
    metadata_store: Option<Arc<dyn MetadataStore>>,
    cache: Option<Arc<dyn CacheAdapter>>,
    type_registry: Option<Arc<dyn ResourceTypeRegistry>>,
    loaders: Vec<Arc<dyn ResourceLoader>>,
    clock: Option<Arc<dyn Clock>>,
    event_bus: Option<EventBus>,
    settings: DownloadSettings,
}

impl OfflineConfigBuilder {
    pub fn metadata_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.metadata_store = Some(store);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn CacheAdapter>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn type_registry(mut self, registry: Arc<dyn ResourceTypeRegistry>) -> Self {
        self.type_registry = Some(registry);
        self
    }

    /// Append a loader. Order matters: earlier loaders are asked first.
    pub fn loader(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn default_priority(mut self, priority: u32) -> Self {
        self.settings.default_priority = priority;
        self
    }

    pub fn download_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.settings.download_timeout = timeout;
        self
    }

    pub fn skip_complete(mut self, skip: bool) -> Self {
        self.settings.skip_complete = skip;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.settings.event_buffer_size = size;
        self
    }

    /// Validate and assemble the configuration.
    pub fn build(self) -> Result<OfflineConfig> {
        let metadata_store = self.metadata_store.ok_or_else(|| {
            missing(
                "MetadataStore",
                "A catalog is required to look up resource descriptors. Use .metadata_store().",
            )
        })?;

        let cache = self.cache.ok_or_else(|| {
            missing(
                "CacheAdapter",
                "A cache is required to persist content and completion markers. Use .cache().",
            )
        })?;

        let type_registry = self.type_registry.ok_or_else(|| {
            missing(
                "ResourceTypeRegistry",
                "A type registry is required for priorities and dependency rules. \
                 Use .type_registry().",
            )
        })?;

        // Checked before the bus is created; a zero-capacity channel panics.
        self.settings.validate()?;

        let config = OfflineConfig {
            metadata_store,
            cache,
            type_registry,
            loaders: self.loaders,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_bus: self
                .event_bus
                .unwrap_or_else(|| EventBus::new(self.settings.event_buffer_size)),
            settings: self.settings,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{
        CacheEntry, DownloadOptions, ProgressCallback, ResourceDescriptor, ResourceKey,
        ResourceTypeInfo, TransferSummary,
    };

    struct EmptyCatalog;

    #[async_trait]
    impl MetadataStore for EmptyCatalog {
        async fn get_resource_metadata(
            &self,
            _key: &ResourceKey,
        ) -> BridgeResult<Option<ResourceDescriptor>> {
            Ok(None)
        }

        async fn get_all_resources(&self) -> BridgeResult<Vec<ResourceDescriptor>> {
            Ok(Vec::new())
        }
    }

    struct NullCache;

    #[async_trait]
    impl CacheAdapter for NullCache {
        async fn get(&self, _key: &str) -> BridgeResult<Option<CacheEntry>> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _entry: CacheEntry) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct NoTypes;

    impl ResourceTypeRegistry for NoTypes {
        fn get(&self, _type_id: &str) -> Option<ResourceTypeInfo> {
            None
        }
    }

    struct NoopLoader;

    #[async_trait]
    impl ResourceLoader for NoopLoader {
        fn name(&self) -> &str {
            "noop"
        }

        fn can_handle(&self, _descriptor: &ResourceDescriptor) -> bool {
            true
        }

        async fn download_resource(
            &self,
            _key: &ResourceKey,
            _options: DownloadOptions,
            _on_progress: ProgressCallback,
        ) -> BridgeResult<TransferSummary> {
            Ok(TransferSummary::default())
        }
    }

    fn complete_builder() -> OfflineConfigBuilder {
        OfflineConfig::builder()
            .metadata_store(Arc::new(EmptyCatalog))
            .cache(Arc::new(NullCache))
            .type_registry(Arc::new(NoTypes))
            .loader(Arc::new(NoopLoader))
    }

    fn missing_capability(result: Result<OfflineConfig>) -> String {
        match result {
            Err(Error::CapabilityMissing { capability, .. }) => capability,
            other => panic!("expected CapabilityMissing, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_build_with_all_bridges() {
        let config = complete_builder().build().unwrap();
        assert_eq!(config.loaders.len(), 1);
        assert_eq!(config.settings, DownloadSettings::default());
        assert_eq!(config.event_bus.subscriber_count(), 0);
    }

    #[test]
    fn test_default_bus_uses_event_buffer_size() {
        use crate::events::{CoreEvent, DownloadEvent};
        use tokio::sync::broadcast::error::TryRecvError;

        let config = complete_builder().event_buffer_size(2).build().unwrap();
        let mut rx = config.event_bus.subscribe();
        for reason in ["a", "b", "c"] {
            config
                .event_bus
                .emit(CoreEvent::Download(DownloadEvent::RunRejected {
                    reason: reason.to_string(),
                }))
                .unwrap();
        }

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Lagged(1))));
    }

    #[test]
    fn test_supplied_bus_is_kept() {
        let bus = EventBus::new(8);
        let _rx = bus.subscribe();
        let config = complete_builder().event_bus(bus).build().unwrap();
        assert_eq!(config.event_bus.subscriber_count(), 1);
    }

    #[test]
    fn test_builder_requires_metadata_store() {
        let result = OfflineConfig::builder()
            .cache(Arc::new(NullCache))
            .type_registry(Arc::new(NoTypes))
            .loader(Arc::new(NoopLoader))
            .build();
        assert_eq!(missing_capability(result), "MetadataStore");
    }

    #[test]
    fn test_builder_requires_cache() {
        let result = OfflineConfig::builder()
            .metadata_store(Arc::new(EmptyCatalog))
            .type_registry(Arc::new(NoTypes))
            .loader(Arc::new(NoopLoader))
            .build();
        assert_eq!(missing_capability(result), "CacheAdapter");
    }

    #[test]
    fn test_builder_requires_registry() {
        let result = OfflineConfig::builder()
            .metadata_store(Arc::new(EmptyCatalog))
            .cache(Arc::new(NullCache))
            .loader(Arc::new(NoopLoader))
            .build();
        assert_eq!(missing_capability(result), "ResourceTypeRegistry");
    }

    #[test]
    fn test_builder_requires_a_loader() {
        let result = OfflineConfig::builder()
            .metadata_store(Arc::new(EmptyCatalog))
            .cache(Arc::new(NullCache))
            .type_registry(Arc::new(NoTypes))
            .build();
        assert_eq!(missing_capability(result), "ResourceLoader");
    }

    #[test]
    fn test_custom_settings() {
        let config = complete_builder()
            .default_priority(10)
            .download_timeout(None)
            .skip_complete(false)
            .event_buffer_size(16)
            .build()
            .unwrap();

        assert_eq!(config.settings.default_priority, 10);
        assert_eq!(config.settings.download_timeout, None);
        assert!(!config.settings.skip_complete);
        assert_eq!(config.settings.event_buffer_size, 16);
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let result = complete_builder()
            .download_timeout(Some(Duration::ZERO))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_event_buffer() {
        let result = complete_builder().event_buffer_size(0).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_debug_lists_loader_names() {
        let config = complete_builder().build().unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("noop"));
        assert!(debug.contains("MetadataStore { ... }"));
    }
}
