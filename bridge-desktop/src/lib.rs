//! # Desktop Bridge Implementations
//!
//! Default implementations of the offline-content bridge traits for desktop
//! hosts (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `CacheAdapter` using a SQLite table ([`SqliteCacheAdapter`])
//! - `MetadataStore` over a JSON catalog file ([`JsonCatalogStore`])
//! - `ResourceTypeRegistry` populated at startup ([`StaticTypeRegistry`])
//! - `IngredientProbe` for path-shaped ingredient keys ([`KeyPathProbe`])
//! - `ResourceLoader` over HTTP using `reqwest` ([`HttpResourceLoader`])
//!
//! The in-memory constructors (`SqliteCacheAdapter::in_memory`,
//! `JsonCatalogStore::from_descriptors`) double as test fixtures.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{JsonCatalogStore, SqliteCacheAdapter, StaticTypeRegistry};
//! use std::sync::Arc;
//!
//! let cache = Arc::new(SqliteCacheAdapter::new("offline/cache.db".into()).await?);
//! let catalog = Arc::new(JsonCatalogStore::from_file("offline/catalog.json").await?);
//! let registry = Arc::new(StaticTypeRegistry::builder().build());
//! ```

mod cache;
mod catalog;
mod loader;
mod registry;

pub use cache::SqliteCacheAdapter;
pub use catalog::JsonCatalogStore;
pub use loader::HttpResourceLoader;
pub use registry::{KeyPathProbe, StaticTypeRegistry, StaticTypeRegistryBuilder};
