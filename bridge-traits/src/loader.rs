//! Per-Type Resource Loaders
//!
//! A loader knows the wire format of one family of resource types (texts,
//! notes, lexical entries) and writes fetched content into the host cache.
//! The orchestration core only decides *when* and *how* (bulk vs individual)
//! a loader runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::resource::{ResourceDescriptor, ResourceKey};

/// Transfer strategy for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadMethod {
    /// One archive holding every ingredient.
    BulkArchive,
    /// One request per ingredient.
    Individual,
    /// Not a transfer: content was found in the cache and recognised as
    /// complete without downloading.
    Inferred,
}

impl DownloadMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BulkArchive => "bulk_archive",
            Self::Individual => "individual",
            Self::Inferred => "inferred",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bulk_archive" => Some(Self::BulkArchive),
            "individual" => Some(Self::Individual),
            "inferred" => Some(Self::Inferred),
            _ => None,
        }
    }

    /// Pick the strategy a descriptor supports best.
    pub fn for_descriptor(descriptor: &ResourceDescriptor) -> Self {
        if descriptor.transfer.archive_url.is_some() {
            Self::BulkArchive
        } else {
            Self::Individual
        }
    }
}

impl fmt::Display for DownloadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options passed to a loader for one download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOptions {
    pub method: DownloadMethod,
    /// Skip ingredients that are already cached.
    pub skip_existing: bool,
}

/// Progress report emitted by a loader at its own discretion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderProgress {
    /// 0-100
    pub percentage: u8,
    pub message: String,
}

impl LoaderProgress {
    pub fn new(percentage: u8, message: impl Into<String>) -> Self {
        Self {
            percentage: percentage.min(100),
            message: message.into(),
        }
    }
}

/// Callback receiving loader progress.
pub type ProgressCallback = Arc<dyn Fn(LoaderProgress) + Send + Sync>;

/// What a loader reports after a successful transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSummary {
    /// Total bytes written to the cache, when known.
    pub total_size: Option<u64>,
    /// Ingredients cached, when known.
    pub ingredient_count: Option<usize>,
}

/// Resource loader trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::loader::{DownloadOptions, LoaderProgress, ResourceLoader};
///
/// async fn fetch(loader: &dyn ResourceLoader, key: &ResourceKey, options: DownloadOptions) {
///     let report = std::sync::Arc::new(|p: LoaderProgress| println!("{}%", p.percentage));
///     loader.download_resource(key, options, report).await.ok();
/// }
/// ```
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Whether this loader knows how to fetch `descriptor`.
    fn can_handle(&self, descriptor: &ResourceDescriptor) -> bool;

    /// Fetch the resource into the cache.
    async fn download_resource(
        &self,
        key: &ResourceKey,
        options: DownloadOptions,
        on_progress: ProgressCallback,
    ) -> Result<TransferSummary>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_selection() {
        let key = ResourceKey::new("org1", "en", "ult");
        let plain = ResourceDescriptor::new(key.clone(), "primary");
        let zipped = ResourceDescriptor::new(key, "primary").with_archive_url("https://x/ult.zip");

        assert_eq!(DownloadMethod::for_descriptor(&plain), DownloadMethod::Individual);
        assert_eq!(DownloadMethod::for_descriptor(&zipped), DownloadMethod::BulkArchive);
    }

    #[test]
    fn test_method_string_form() {
        for method in [
            DownloadMethod::BulkArchive,
            DownloadMethod::Individual,
            DownloadMethod::Inferred,
        ] {
            assert_eq!(DownloadMethod::parse(method.as_str()), Some(method));
        }
        assert_eq!(DownloadMethod::parse("zip"), None);
    }

    #[test]
    fn test_progress_is_clamped() {
        assert_eq!(LoaderProgress::new(250, "too far").percentage, 100);
    }
}
