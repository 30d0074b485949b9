//! Resource Catalog backed by a JSON document

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    metadata::MetadataStore,
    resource::{ResourceDescriptor, ResourceKey},
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Read-only catalog held in memory.
///
/// The file format is a JSON array of descriptors:
///
/// ```json
/// [
///   {
///     "key": {"owner": "org1", "language": "en", "resourceId": "ult"},
///     "resourceType": "scripture",
///     "ingredients": [{"identifier": "GEN"}],
///     "transfer": {"archiveUrl": "https://cdn.example.org/ult.zip"}
///   }
/// ]
/// ```
///
/// Catalog order is preserved by `get_all_resources`. A later descriptor with
/// the same key replaces an earlier one.
pub struct JsonCatalogStore {
    inner: RwLock<Catalog>,
}

#[derive(Default)]
struct Catalog {
    order: Vec<ResourceKey>,
    by_key: HashMap<ResourceKey, ResourceDescriptor>,
}

impl Catalog {
    fn insert(&mut self, descriptor: ResourceDescriptor) {
        let key = descriptor.key.clone();
        if self.by_key.insert(key.clone(), descriptor).is_some() {
            warn!(resource = %key, "Duplicate catalog entry replaced");
        } else {
            self.order.push(key);
        }
    }
}

impl JsonCatalogStore {
    /// Build a catalog from descriptors already in memory.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ResourceDescriptor>) -> Self {
        let mut catalog = Catalog::default();
        for descriptor in descriptors {
            catalog.insert(descriptor);
        }
        Self {
            inner: RwLock::new(catalog),
        }
    }

    /// Parse a catalog from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let descriptors: Vec<ResourceDescriptor> = serde_json::from_str(json)?;
        Ok(Self::from_descriptors(descriptors))
    }

    /// Load a catalog file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BridgeError::NotFound(format!("Catalog file {}", path.display()))
            } else {
                BridgeError::Io(e)
            }
        })?;

        let store = Self::from_json(&json)?;
        debug!(path = ?path, resources = store.len(), "Loaded resource catalog");
        Ok(store)
    }

    /// Add or replace one descriptor.
    pub fn upsert(&self, descriptor: ResourceDescriptor) {
        self.inner.write().insert(descriptor);
    }

    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MetadataStore for JsonCatalogStore {
    async fn get_resource_metadata(
        &self,
        key: &ResourceKey,
    ) -> Result<Option<ResourceDescriptor>> {
        Ok(self.inner.read().by_key.get(key).cloned())
    }

    async fn get_all_resources(&self) -> Result<Vec<ResourceDescriptor>> {
        let catalog = self.inner.read();
        Ok(catalog
            .order
            .iter()
            .filter_map(|key| catalog.by_key.get(key).cloned())
            .collect())
    }

    async fn get_all_resource_keys(&self) -> Result<Vec<ResourceKey>> {
        Ok(self.inner.read().order.clone())
    }
}
