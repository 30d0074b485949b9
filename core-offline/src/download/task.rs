//! # Download Tasks
//!
//! Per-run, in-memory record of one queued resource.
//!
//! ## State Machine
//!
//! ```text
//! Pending → Downloading → Completed
//!    │           │
//!    └───────────┴──────→ Failed
//! ```
//!
//! `Pending → Completed` is also valid when a resource turns out to be
//! complete already. Terminal tasks ignore every further update, which is
//! what keeps a cancelled task from being overwritten by the transfer that
//! was still in flight.

use bridge_traits::{DownloadMethod, LoaderProgress, ResourceKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of one download run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RunId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const MSG_QUEUED: &str = "Queued";
pub const MSG_ALREADY_COMPLETE: &str = "Already complete";
pub const MSG_DOWNLOAD_COMPLETE: &str = "Download complete";
pub const MSG_CANCELLED: &str = "Cancelled";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTask {
    pub key: ResourceKey,
    pub status: TaskStatus,
    /// 0-100
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    /// Strategy chosen once the transfer started.
    pub method: Option<DownloadMethod>,
}

impl DownloadTask {
    pub fn new(key: ResourceKey) -> Self {
        Self {
            key,
            status: TaskStatus::Pending,
            progress: 0,
            message: MSG_QUEUED.to_string(),
            error: None,
            method: None,
        }
    }

    /// `Pending → Downloading`. Returns whether the transition applied.
    pub fn start(&mut self, method: DownloadMethod) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        self.status = TaskStatus::Downloading;
        self.method = Some(method);
        self.progress = 0;
        self.message = format!("Downloading ({})", method);
        true
    }

    /// Apply a loader progress report while downloading.
    pub fn update_progress(&mut self, progress: &LoaderProgress) -> bool {
        if self.status != TaskStatus::Downloading {
            return false;
        }
        self.progress = progress.percentage.min(100);
        self.message = progress.message.clone();
        true
    }

    pub fn complete(&mut self, message: &str) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.progress = 100;
        self.message = message.to_string();
        self.error = None;
        true
    }

    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let error = error.into();
        self.status = TaskStatus::Failed;
        self.message = error.clone();
        self.error = Some(error);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> DownloadTask {
        DownloadTask::new(ResourceKey::new("org1", "en", "ult"))
    }

    #[test]
    fn test_happy_path() {
        let mut task = task();
        assert!(task.start(DownloadMethod::BulkArchive));
        assert!(task.update_progress(&LoaderProgress::new(40, "GEN")));
        assert_eq!(task.progress, 40);
        assert_eq!(task.message, "GEN");

        assert!(task.complete(MSG_DOWNLOAD_COMPLETE));
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 100);
    }

    #[test]
    fn test_pending_can_complete_directly() {
        let mut task = task();
        assert!(task.complete(MSG_ALREADY_COMPLETE));
        assert_eq!(task.message, "Already complete");
        assert_eq!(task.method, None);
    }

    #[test]
    fn test_terminal_tasks_ignore_updates() {
        let mut task = task();
        task.start(DownloadMethod::Individual);
        assert!(task.fail(MSG_CANCELLED));

        assert!(!task.update_progress(&LoaderProgress::new(90, "late")));
        assert!(!task.complete(MSG_DOWNLOAD_COMPLETE));
        assert!(!task.fail("other"));

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("Cancelled"));
    }

    #[test]
    fn test_progress_requires_downloading() {
        let mut task = task();
        assert!(!task.update_progress(&LoaderProgress::new(10, "early")));
        assert_eq!(task.progress, 0);
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(TaskStatus::Downloading.to_string(), "downloading");
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
    }
}
