//! # Download Orchestration
//!
//! - [`task`] - per-resource task state machine and run ids
//! - [`loaders`] - loader lookup
//! - [`progress`] - snapshots and run summaries
//! - [`manager`] - the run pipeline

pub mod loaders;
pub mod manager;
pub mod progress;
pub mod task;

pub use loaders::LoaderRegistry;
pub use manager::{DownloadManager, EventListener, ListenerId, ProgressListener};
pub use progress::{DownloadProgress, RunSummary};
pub use task::{
    DownloadTask, RunId, TaskStatus, MSG_ALREADY_COMPLETE, MSG_CANCELLED, MSG_DOWNLOAD_COMPLETE,
    MSG_QUEUED,
};
