//! # Offline Content Core
//!
//! Decides what to download, in which order, and remembers what is already
//! on disk.
//!
//! ## Overview
//!
//! - [`resolver`] - expands a candidate set with its dependencies and orders
//!   it so nothing downloads before what it depends on
//! - [`completeness`] - durable completion/error markers plus ingredient
//!   probing for content cached before markers existed
//! - [`download`] - the sequential run pipeline with progress tracking and
//!   cooperative cancellation
//! - [`worker`] - command/event port for hosting the pipeline on a
//!   background task
//!
//! Everything talks to the host through the contracts in `bridge-traits`.
//!
//! ## Usage
//!
//! ```ignore
//! use core_offline::{DownloadManager, OfflineConfig};
//!
//! let config = OfflineConfig::builder()
//!     .metadata_store(catalog)
//!     .cache(cache)
//!     .type_registry(registry)
//!     .loader(loader)
//!     .build()?;
//!
//! let manager = DownloadManager::new(config)?;
//! manager.on_progress(|p| println!("{}%", p.overall_progress));
//! let summary = manager.download_all_resources().await;
//! ```

pub mod completeness;
pub mod download;
pub mod error;
pub mod resolver;
pub mod worker;

pub use completeness::{
    marker_key, CompletenessChecker, CompletenessReport, CompletenessStatus, CompletionDetails,
    ResourceCompleteness,
};
pub use download::{
    DownloadManager, DownloadProgress, DownloadTask, ListenerId, LoaderRegistry, RunId,
    RunSummary, TaskStatus,
};
pub use error::{OfflineError, Result};
pub use resolver::{DependencyResolver, OrderedResources, ResolvedResource};
pub use worker::{spawn_worker, DownloadWorker, EventSink, WorkerCommand, WorkerControl, WorkerHandle};

pub use core_runtime::config::{DownloadSettings, OfflineConfig};
