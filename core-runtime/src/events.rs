//! # Event Bus System
//!
//! Typed events for the offline-content core, broadcast with
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: [`CoreEvent`] wraps per-domain enums
//!   ([`DownloadEvent`], [`CompletenessEvent`])
//! - **EventBus**: cloneable broadcast sender
//! - **EventStream**: receiver wrapper with optional filtering
//!
//! Events are serde-tagged so the same schema can be posted across a worker
//! boundary as JSON:
//!
//! ```json
//! {"type":"Download","payload":{"event":"RunStarted","run_id":"...","total":3}}
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Download(DownloadEvent::RunRejected {
//!     reason: "A download run is already active".to_string(),
//! }))
//! .ok();
//!
//! assert!(rx.recv().await.is_ok());
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - `RecvError::Lagged(n)`: the subscriber missed `n` events; keep reading.
//! - `RecvError::Closed`: every sender was dropped; stop reading.
//!
//! Emitting with no subscribers returns an error that callers ignore with
//! `.ok()`; nobody listening is not a failure.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published through the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Download orchestration events
    Download(DownloadEvent),
    /// Catalog completeness reports
    Completeness(CompletenessEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Download(e) => e.description(),
            CoreEvent::Completeness(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Download(DownloadEvent::ResourceFailed { .. }) => EventSeverity::Error,
            CoreEvent::Download(DownloadEvent::RunRejected { .. })
            | CoreEvent::Download(DownloadEvent::RunCancelled { .. }) => EventSeverity::Warning,
            CoreEvent::Download(DownloadEvent::RunCompleted { failed, .. }) if *failed > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Download(DownloadEvent::RunStarted { .. })
            | CoreEvent::Download(DownloadEvent::RunCompleted { .. })
            | CoreEvent::Completeness(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Download Events
// ============================================================================

/// Events emitted while downloading resources for offline use.
///
/// Resource keys are carried in their canonical `owner/language/id` string
/// form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DownloadEvent {
    /// A run resolved its queue and is about to download.
    RunStarted {
        run_id: String,
        /// Resources queued for download.
        total: usize,
    },
    /// Aggregate snapshot, emitted whenever any task changes.
    Progress {
        run_id: Option<String>,
        total: usize,
        completed: usize,
        failed: usize,
        pending: usize,
        /// Resource currently downloading, if any.
        current_resource: Option<String>,
        /// Progress of the current resource (0-100).
        current_percent: u8,
        current_message: Option<String>,
        /// `round((completed + failed) / total * 100)`
        overall_percent: u8,
    },
    /// One resource finished successfully (or was already complete).
    ResourceCompleted {
        run_id: Option<String>,
        resource: String,
        message: String,
    },
    /// One resource failed; the run continues.
    ResourceFailed {
        run_id: Option<String>,
        resource: String,
        error: String,
    },
    /// A run reached the end of its queue.
    RunCompleted {
        run_id: String,
        total: usize,
        completed: usize,
        failed: usize,
        already_complete: usize,
        cycles_broken: usize,
        duration_ms: u64,
    },
    /// A start request arrived while a run was active.
    RunRejected { reason: String },
    /// The active run was cancelled.
    RunCancelled {
        run_id: String,
        /// Tasks relabelled as failed.
        cancelled_tasks: usize,
    },
}

impl DownloadEvent {
    fn description(&self) -> &str {
        match self {
            DownloadEvent::RunStarted { .. } => "Download run started",
            DownloadEvent::Progress { .. } => "Download progress",
            DownloadEvent::ResourceCompleted { .. } => "Resource downloaded",
            DownloadEvent::ResourceFailed { .. } => "Resource download failed",
            DownloadEvent::RunCompleted { .. } => "Download run completed",
            DownloadEvent::RunRejected { .. } => "Download run rejected",
            DownloadEvent::RunCancelled { .. } => "Download run cancelled",
        }
    }
}

// ============================================================================
// Completeness Events
// ============================================================================

/// Results of batch completeness checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CompletenessEvent {
    Checked {
        /// `"all"` or the language code that was checked.
        scope: String,
        total: usize,
        complete: usize,
        incomplete: usize,
        errors: usize,
        percentage: u8,
    },
}

impl CompletenessEvent {
    fn description(&self) -> &str {
        match self {
            CompletenessEvent::Checked { .. } => "Completeness check finished",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus.
///
/// Clones share the same channel. Slow subscribers get `RecvError::Lagged`
/// instead of blocking publishers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers; errors when there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// New independent receiver. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// `broadcast::Receiver` with an optional filter.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Next matching event.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Next matching event without waiting; `None` when the buffer is empty.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(run_id: &str) -> CoreEvent {
        CoreEvent::Download(DownloadEvent::RunStarted {
            run_id: run_id.to_string(),
            total: 2,
        })
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(started("run-1")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(started("run-1")).ok();

        assert_eq!(sub1.recv().await.unwrap(), started("run-1"));
        assert_eq!(sub2.recv().await.unwrap(), started("run-1"));
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Completeness(_)));

        bus.emit(started("run-1")).ok();
        let checked = CoreEvent::Completeness(CompletenessEvent::Checked {
            scope: "en".to_string(),
            total: 4,
            complete: 3,
            incomplete: 1,
            errors: 0,
            percentage: 75,
        });
        bus.emit(checked.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), checked);
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();
        for i in 0..5 {
            bus.emit(started(&format!("run-{}", i))).ok();
        }
        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Download(DownloadEvent::ResourceFailed {
            run_id: None,
            resource: "org1/en/ult".to_string(),
            error: "boom".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let partial_run = CoreEvent::Download(DownloadEvent::RunCompleted {
            run_id: "run-1".to_string(),
            total: 3,
            completed: 2,
            failed: 1,
            already_complete: 0,
            cycles_broken: 0,
            duration_ms: 12,
        });
        assert_eq!(partial_run.severity(), EventSeverity::Warning);
        assert_eq!(started("run-1").severity(), EventSeverity::Info);
    }

    #[test]
    fn test_event_serialization_schema() {
        let json = serde_json::to_value(started("run-7")).unwrap();
        assert_eq!(json["type"], "Download");
        assert_eq!(json["payload"]["event"], "RunStarted");
        assert_eq!(json["payload"]["run_id"], "run-7");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, started("run-7"));
    }
}
