//! Offline download demo
//!
//! Wires the desktop adapters to a loader that fabricates content, runs one
//! download pass and prints the resulting completeness report.
//!
//! ```text
//! cargo run -p core-offline --example offline_demo
//! ```

use anyhow::Result;
use async_trait::async_trait;
use bridge_desktop::{JsonCatalogStore, KeyPathProbe, SqliteCacheAdapter, StaticTypeRegistry};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    CacheAdapter, CacheEntry, DependencyRule, DownloadOptions, IngredientProbe, LoaderProgress,
    MetadataStore, ProgressCallback, ResourceDescriptor, ResourceKey, ResourceLoader,
    ResourceTypeInfo, TransferSummary,
};
use chrono::Utc;
use core_offline::{DownloadManager, OfflineConfig};
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use std::sync::Arc;
use std::time::Duration;

const CATALOG: &str = r#"[
  {
    "key": {"owner": "org1", "language": "en", "resourceId": "tn"},
    "resourceType": "notes",
    "ingredients": [{"identifier": "GEN"}, {"identifier": "EXO"}]
  },
  {
    "key": {"owner": "org1", "language": "en", "resourceId": "ult"},
    "resourceType": "scripture",
    "ingredients": [{"identifier": "GEN"}, {"identifier": "EXO"}, {"identifier": "LEV"}]
  },
  {
    "key": {"owner": "org1", "language": "el-x-koine", "resourceId": "ugl"},
    "resourceType": "lexicon",
    "ingredients": [{"identifier": "G0001"}]
  }
]"#;

/// Writes placeholder bytes for every ingredient.
struct PlaceholderLoader {
    catalog: Arc<dyn MetadataStore>,
    cache: Arc<dyn CacheAdapter>,
    probe: KeyPathProbe,
}

#[async_trait]
impl ResourceLoader for PlaceholderLoader {
    fn name(&self) -> &str {
        "placeholder"
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
        let Some(descriptor) = self.catalog.get_resource_metadata(key).await? else {
            return Ok(TransferSummary::default());
        };

        let total = descriptor.ingredients.len();
        let mut size = 0u64;
        for (index, ingredient) in descriptor.ingredients.iter().enumerate() {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let body = format!("{} {}", key, ingredient.identifier).into_bytes();
            size += body.len() as u64;
            self.cache
                .set(
                    &self.probe.ingredient_cache_key(key, ingredient),
                    CacheEntry::new(body, Utc::now()),
                )
                .await?;
            on_progress(LoaderProgress::new(
                ((index + 1) * 100 / total.max(1)) as u8,
                ingredient.identifier.clone(),
            ));
        }

        Ok(TransferSummary {
            total_size: Some(size),
            ingredient_count: Some(total),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(LoggingConfig::default().with_format(LogFormat::Compact))?;

    let catalog = Arc::new(JsonCatalogStore::from_json(CATALOG)?);
    let cache = Arc::new(SqliteCacheAdapter::in_memory().await?);
    let registry = Arc::new(
        StaticTypeRegistry::builder()
            .register_with_probe(ResourceTypeInfo::new("lexicon").with_priority(10), KeyPathProbe::new())
            .register_with_probe(
                ResourceTypeInfo::new("scripture")
                    .with_priority(20)
                    .with_dependency(DependencyRule::on("lexicon").same_owner()),
                KeyPathProbe::new(),
            )
            .register_with_probe(
                ResourceTypeInfo::new("notes")
                    .with_priority(30)
                    .with_dependency(DependencyRule::on("scripture").same_owner().same_language()),
                KeyPathProbe::new(),
            )
            .build(),
    );

    let loader = Arc::new(PlaceholderLoader {
        catalog: catalog.clone(),
        cache: cache.clone(),
        probe: KeyPathProbe::new(),
    });

    let bus = EventBus::new(256);
    let mut events = bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                CoreEvent::Download(DownloadEvent::ResourceCompleted { resource, message, .. }) => {
                    println!("  done   {} ({})", resource, message)
                }
                CoreEvent::Download(DownloadEvent::ResourceFailed { resource, error, .. }) => {
                    println!("  failed {}: {}", resource, error)
                }
                CoreEvent::Download(DownloadEvent::RunCompleted { duration_ms, .. }) => {
                    println!("run finished in {}ms", duration_ms);
                    break;
                }
                _ => {}
            }
        }
    });

    let config = OfflineConfig::builder()
        .metadata_store(catalog)
        .cache(cache)
        .type_registry(registry)
        .loader(loader)
        .event_bus(bus)
        .build()?;
    let manager = DownloadManager::new(config)?;

    let plan = manager.plan().await;
    println!("download order:");
    for (position, resource) in plan.resources.iter().enumerate() {
        println!("  {}. {} (priority {})", position + 1, resource.key, resource.priority);
    }

    let summary = manager.download_all_resources().await;
    printer.await?;
    println!(
        "completed {} / failed {} / already complete {}",
        summary.completed, summary.failed, summary.already_complete
    );

    let report = manager.checker().check_all().await?;
    println!("catalog {}% complete", report.percentage);
    for entry in &report.resources {
        println!("  {} {}", entry.status, entry.key);
    }

    Ok(())
}
