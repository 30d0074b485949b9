//! Snapshots and summaries handed to callers.

use bridge_traits::ResourceKey;
use core_runtime::events::DownloadEvent;
use serde::{Deserialize, Serialize};

use super::task::{DownloadTask, RunId, TaskStatus};

/// Aggregate view of the current (or last) run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub run_id: Option<RunId>,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    /// The task currently downloading; processing is sequential so there is
    /// at most one.
    pub current: Option<ResourceKey>,
    pub current_progress: u8,
    pub current_message: Option<String>,
    /// `round((completed + failed) / total * 100)`, 0 without tasks
    pub overall_progress: u8,
    pub is_active: bool,
    pub tasks: Vec<DownloadTask>,
}

impl DownloadProgress {
    pub fn from_tasks(run_id: Option<RunId>, tasks: &[DownloadTask], is_active: bool) -> Self {
        let total = tasks.len();
        let mut completed = 0;
        let mut failed = 0;
        let mut pending = 0;
        let mut current = None;

        for task in tasks {
            match task.status {
                TaskStatus::Completed => completed += 1,
                TaskStatus::Failed => failed += 1,
                TaskStatus::Pending => pending += 1,
                TaskStatus::Downloading => {
                    if current.is_none() {
                        current = Some(task);
                    }
                }
            }
        }

        let overall_progress = if total == 0 {
            0
        } else {
            (((completed + failed) as f64 / total as f64) * 100.0).round() as u8
        };

        Self {
            run_id,
            total,
            completed,
            failed,
            pending,
            current: current.map(|t| t.key.clone()),
            current_progress: current.map_or(0, |t| t.progress),
            current_message: current.map(|t| t.message.clone()),
            overall_progress,
            is_active,
            tasks: tasks.to_vec(),
        }
    }

    /// Task for `key`, if it was queued.
    pub fn task(&self, key: &ResourceKey) -> Option<&DownloadTask> {
        self.tasks.iter().find(|t| &t.key == key)
    }

    /// The snapshot as a wire event, without the task list.
    pub fn to_event(&self) -> DownloadEvent {
        DownloadEvent::Progress {
            run_id: self.run_id.map(|id| id.to_string()),
            total: self.total,
            completed: self.completed,
            failed: self.failed,
            pending: self.pending,
            current_resource: self.current.as_ref().map(ToString::to_string),
            current_percent: self.current_progress,
            current_message: self.current_message.clone(),
            overall_percent: self.overall_progress,
        }
    }
}

/// Outcome of one `download_all_resources` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// `None` when the run was rejected.
    pub run_id: Option<RunId>,
    /// Resources queued after ordering.
    pub total: usize,
    /// Downloaded in this run.
    pub completed: usize,
    /// Failed or cancelled; matches the final snapshot.
    pub failed: usize,
    /// Found complete by the pre-download re-check.
    pub already_complete: usize,
    pub cycles_broken: usize,
    pub cancelled: bool,
    /// Another run was active; nothing was done.
    pub rejected: bool,
}

impl RunSummary {
    pub(crate) fn rejected() -> Self {
        Self {
            rejected: true,
            ..Default::default()
        }
    }

    /// Nothing was downloaded and nothing failed.
    pub fn is_noop(&self) -> bool {
        self.completed == 0 && self.failed == 0
    }
}
