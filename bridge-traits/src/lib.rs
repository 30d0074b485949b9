//! # Host Bridge Traits
//!
//! Contracts between the offline-content core and the collaborators each host
//! platform provides.
//!
//! ## Overview
//!
//! The orchestration core (`core-offline`) never talks to storage, the network
//! or the catalog service directly. Everything it needs is expressed here as a
//! trait, plus the small data model that crosses those boundaries.
//!
//! ## Traits
//!
//! ### Catalog & Storage
//! - [`MetadataStore`](metadata::MetadataStore) - Resource descriptors by key
//! - [`CacheAdapter`](cache::CacheAdapter) - Cached content and per-entry metadata
//!
//! ### Resource Types
//! - [`ResourceTypeRegistry`](registry::ResourceTypeRegistry) - Priorities and dependency rules per type
//! - [`IngredientProbe`](registry::IngredientProbe) - Opt-in capability for per-ingredient cache probing
//! - [`ResourceLoader`](loader::ResourceLoader) - Per-type byte fetching
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). "Not found" is
//! modelled as `Ok(None)` wherever the contract allows absence.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across async tasks behind `Arc`.

pub mod cache;
pub mod error;
pub mod loader;
pub mod metadata;
pub mod registry;
pub mod resource;
pub mod time;

pub use error::BridgeError;

pub use cache::{CacheAdapter, CacheEntry, EntryMetadata};
pub use loader::{
    DownloadMethod, DownloadOptions, LoaderProgress, ProgressCallback, ResourceLoader,
    TransferSummary,
};
pub use metadata::MetadataStore;
pub use registry::{IngredientProbe, ResourceTypeInfo, ResourceTypeRegistry};
pub use resource::{
    base_language, DependencyRule, DependencyTarget, FieldPolicy, Ingredient, ResourceDescriptor,
    ResourceKey, TransferHints,
};
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
