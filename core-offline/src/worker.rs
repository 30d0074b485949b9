//! # Background Worker Port
//!
//! Hosts a [`DownloadManager`] behind a command/event boundary so the
//! long-running download loop never shares memory with the caller.
//!
//! ## Message Schema
//!
//! Commands in ([`WorkerCommand`]), events out
//! ([`DownloadEvent`](core_runtime::events::DownloadEvent)). Both are
//! serde-tagged so they can cross a process or thread boundary as JSON:
//!
//! ```json
//! {"command": "download_resource", "key": "org1/en/ult"}
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut worker = spawn_worker(manager);
//! worker.send(WorkerCommand::Start).await?;
//! while let Some(event) = worker.next_event().await {
//!     if matches!(event, DownloadEvent::RunCompleted { .. }) {
//!         break;
//!     }
//! }
//! worker.shutdown().await?;
//! ```
//!
//! [`DownloadWorker::handle`] is transport-free and can be driven directly
//! in tests.

use bridge_traits::ResourceKey;
use core_runtime::events::DownloadEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::download::{DownloadManager, ListenerId};
use crate::error::{OfflineError, Result};

/// Pending commands a worker buffers before `send` waits.
pub const COMMAND_BUFFER_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WorkerCommand {
    /// Run `download_all_resources`.
    Start,
    /// Re-run check/download/mark for one key (`"owner/language/id"`).
    DownloadResource { key: String },
    /// Cancel the active run and any queued `Start`/`DownloadResource`.
    Stop,
    /// Emit a progress snapshot.
    Status,
    /// Cancel and stop the worker loop.
    Shutdown,
}

impl WorkerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerCommand::Start => "start",
            WorkerCommand::DownloadResource { .. } => "download_resource",
            WorkerCommand::Stop => "stop",
            WorkerCommand::Status => "status",
            WorkerCommand::Shutdown => "shutdown",
        }
    }
}

/// Outbound side of the worker boundary.
pub trait EventSink: Send + Sync {
    fn send(&self, event: DownloadEvent);
}

impl EventSink for mpsc::UnboundedSender<DownloadEvent> {
    fn send(&self, event: DownloadEvent) {
        if mpsc::UnboundedSender::send(self, event).is_err() {
            debug!("Worker event receiver dropped");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerControl {
    Continue,
    Shutdown,
}

/// Applies commands to a manager and forwards its events to a sink.
#[derive(Clone)]
pub struct DownloadWorker {
    manager: DownloadManager,
    sink: Arc<dyn EventSink>,
    listener: ListenerId,
}

impl DownloadWorker {
    pub fn new(manager: DownloadManager, sink: Arc<dyn EventSink>) -> Self {
        let forward = Arc::clone(&sink);
        let listener = manager.on_event(move |event| forward.send(event.clone()));
        Self {
            manager,
            sink,
            listener,
        }
    }

    pub fn manager(&self) -> &DownloadManager {
        &self.manager
    }

    /// Process one command to completion.
    pub async fn handle(&self, command: WorkerCommand) -> WorkerControl {
        match command {
            WorkerCommand::Start => {
                self.manager.download_all_resources().await;
            }
            WorkerCommand::DownloadResource { key } => match ResourceKey::parse(&key) {
                Ok(parsed) => {
                    self.manager.download_resource(&parsed).await;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Rejected download command");
                    let error = OfflineError::InvalidKey(key.clone());
                    self.sink.send(DownloadEvent::ResourceFailed {
                        run_id: None,
                        resource: key,
                        error: error.to_string(),
                    });
                }
            },
            WorkerCommand::Stop => {
                self.manager.cancel_downloads();
            }
            WorkerCommand::Status => {
                self.sink.send(self.manager.get_progress().to_event());
            }
            WorkerCommand::Shutdown => {
                self.manager.cancel_downloads();
                return WorkerControl::Shutdown;
            }
        }
        WorkerControl::Continue
    }

    /// Stop forwarding manager events to the sink.
    pub fn detach(&self) {
        self.manager.remove_listener(self.listener);
    }
}

/// Caller side of a spawned worker.
pub struct WorkerHandle {
    commands: mpsc::Sender<WorkerCommand>,
    events: mpsc::UnboundedReceiver<DownloadEvent>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub async fn send(&self, command: WorkerCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| OfflineError::WorkerStopped)
    }

    /// Next event, or `None` once the worker has stopped and drained.
    pub async fn next_event(&mut self) -> Option<DownloadEvent> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<DownloadEvent> {
        self.events.try_recv().ok()
    }

    /// Send `Shutdown`, wait for the loop to exit and return the events that
    /// were still queued.
    pub async fn shutdown(mut self) -> Result<Vec<DownloadEvent>> {
        self.send(WorkerCommand::Shutdown).await?;
        self.join.await.map_err(|e| {
            OfflineError::Runtime(core_runtime::Error::Internal(format!(
                "Worker task failed: {}",
                e
            )))
        })?;

        let mut remaining = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            remaining.push(event);
        }
        Ok(remaining)
    }
}

/// Host `manager` on a Tokio task.
///
/// `Start` and `DownloadResource` run on their own tasks so `Stop` and
/// `Status` are answered while a run is in progress. `Stop` and `Shutdown`
/// also cancel those tasks when they have not begun their run yet.
pub fn spawn_worker(manager: DownloadManager) -> WorkerHandle {
    let (command_tx, mut command_rx) = mpsc::channel::<WorkerCommand>(COMMAND_BUFFER_SIZE);
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let worker = DownloadWorker::new(manager, Arc::new(event_tx));

    let join = tokio::spawn(async move {
        info!("Download worker started");
        let mut in_flight = JoinSet::new();
        // Replaced on every Stop so later commands start with a live token.
        let mut stopping = CancellationToken::new();

        while let Some(command) = command_rx.recv().await {
            debug!(command = command.name(), "Worker command received");
            match command {
                WorkerCommand::Start | WorkerCommand::DownloadResource { .. } => {
                    in_flight.spawn(run_until_stopped(worker.clone(), command, stopping.clone()));
                }
                other => {
                    if matches!(other, WorkerCommand::Stop | WorkerCommand::Shutdown) {
                        stopping.cancel();
                        stopping = CancellationToken::new();
                    }
                    if worker.handle(other).await == WorkerControl::Shutdown {
                        break;
                    }
                }
            }
            while in_flight.try_join_next().is_some() {}
        }

        while in_flight.join_next().await.is_some() {}
        worker.detach();
        info!("Download worker stopped");
    });

    WorkerHandle {
        commands: command_tx,
        events: event_rx,
        join,
    }
}

/// Run a queued command unless `stopping` fires first.
///
/// The first poll of the command claims the manager's run slot, so a stop
/// that lands afterwards always finds an active run to cancel.
async fn run_until_stopped(worker: DownloadWorker, command: WorkerCommand, stopping: CancellationToken) {
    if stopping.is_cancelled() {
        debug!(command = command.name(), "Queued command dropped by stop");
        return;
    }

    let name = command.name();
    let run = worker.handle(command);
    tokio::pin!(run);
    tokio::select! {
        biased;
        _ = &mut run => return,
        _ = stopping.cancelled() => {}
    }

    debug!(command = name, "Stop arrived while command was running");
    worker.manager.cancel_downloads();
    run.await;
}
