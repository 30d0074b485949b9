//! Resource Catalog Abstraction

use async_trait::async_trait;

use crate::error::Result;
use crate::resource::{ResourceDescriptor, ResourceKey};

/// Read access to the persisted resource catalog.
///
/// A missing resource is `Ok(None)`, never an error; errors are reserved for
/// storage failures.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Look up one descriptor.
    async fn get_resource_metadata(&self, key: &ResourceKey)
        -> Result<Option<ResourceDescriptor>>;

    /// Every descriptor in the catalog.
    async fn get_all_resources(&self) -> Result<Vec<ResourceDescriptor>>;

    /// Every key in the catalog.
    async fn get_all_resource_keys(&self) -> Result<Vec<ResourceKey>> {
        Ok(self
            .get_all_resources()
            .await?
            .into_iter()
            .map(|descriptor| descriptor.key)
            .collect())
    }
}
