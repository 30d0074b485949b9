//! # Download Manager
//!
//! Runs the sequential download pipeline: plan, queue, then transfer one
//! resource at a time while recording task state and completion markers.
//!
//! ## Run Lifecycle
//!
//! ```text
//! idle → running → idle
//! ```
//!
//! Only one run is active per manager. A second start while a run is active
//! is rejected (logged, [`RunSummary::rejected`] set) and the active run
//! continues untouched.
//!
//! ## Failure Policy
//!
//! Public entry points never return an error. A failing resource becomes a
//! `failed` task plus an error marker and the run moves on to the next
//! resource.
//!
//! ## Cancellation
//!
//! [`DownloadManager::cancel_downloads`] is cooperative: no new transfer
//! starts, queued and in-flight tasks are relabelled `failed`/"Cancelled",
//! and the in-flight transfer is left to finish on its own. Its completion
//! marker is still written but its task keeps the "Cancelled" label, and the
//! [`RunSummary`] counts it as failed like the snapshot does.

use bridge_traits::{
    DownloadMethod, DownloadOptions, LoaderProgress, MetadataStore, ProgressCallback,
    ResourceDescriptor, ResourceKey,
};
use core_runtime::config::{DownloadSettings, OfflineConfig};
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::loaders::LoaderRegistry;
use super::progress::{DownloadProgress, RunSummary};
use super::task::{
    DownloadTask, RunId, TaskStatus, MSG_ALREADY_COMPLETE, MSG_CANCELLED, MSG_DOWNLOAD_COMPLETE,
};
use crate::completeness::{CompletenessChecker, CompletionDetails};
use crate::error::{OfflineError, Result};
use crate::resolver::{DependencyResolver, OrderedResources};

/// Receives a snapshot whenever any task changes.
pub type ProgressListener = Arc<dyn Fn(&DownloadProgress) + Send + Sync>;

/// Receives every download event the manager emits.
pub type EventListener = Arc<dyn Fn(&DownloadEvent) + Send + Sync>;

/// Handle for removing a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Listeners {
    next_id: u64,
    progress: Vec<(ListenerId, ProgressListener)>,
    events: Vec<(ListenerId, EventListener)>,
}

impl Listeners {
    fn next(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }
}

struct RunState {
    active: bool,
    run_id: Option<RunId>,
    /// Tasks of the current run in processing order; kept after the run ends
    /// so the final snapshot stays readable until the next run starts.
    tasks: Vec<DownloadTask>,
    cancel: CancellationToken,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            active: false,
            run_id: None,
            tasks: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }
}

enum TaskOutcome {
    Downloaded,
    AlreadyComplete,
    Failed,
}

/// Orchestrates download runs.
///
/// Clones share state, so a clone can be moved into a spawned task or a
/// worker while the caller keeps answering `get_progress`.
#[derive(Clone)]
pub struct DownloadManager {
    metadata: Arc<dyn MetadataStore>,
    checker: Arc<CompletenessChecker>,
    resolver: Arc<DependencyResolver>,
    loaders: LoaderRegistry,
    settings: DownloadSettings,
    event_bus: EventBus,
    state: Arc<Mutex<RunState>>,
    listeners: Arc<Mutex<Listeners>>,
}

impl DownloadManager {
    /// Build the manager together with its resolver and checker.
    pub fn new(config: OfflineConfig) -> Result<Self> {
        config.validate()?;

        let checker = Arc::new(
            CompletenessChecker::new(
                Arc::clone(&config.metadata_store),
                Arc::clone(&config.cache),
                Arc::clone(&config.type_registry),
                Arc::clone(&config.clock),
            )
            .with_event_bus(config.event_bus.clone()),
        );

        let resolver = Arc::new(DependencyResolver::new(
            Arc::clone(&config.metadata_store),
            Arc::clone(&config.type_registry),
            Arc::clone(&checker),
            config.settings.default_priority,
        ));

        info!(
            loaders = config.loaders.len(),
            skip_complete = config.settings.skip_complete,
            "Download manager initialized"
        );

        Ok(Self {
            metadata: config.metadata_store,
            checker,
            resolver,
            loaders: LoaderRegistry::new(config.loaders),
            settings: config.settings,
            event_bus: config.event_bus,
            state: Arc::new(Mutex::new(RunState::default())),
            listeners: Arc::new(Mutex::new(Listeners::default())),
        })
    }

    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    pub fn checker(&self) -> &CompletenessChecker {
        &self.checker
    }

    /// Bus carrying download and completeness events.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Snapshot of the current run, or of the last one when idle.
    pub fn get_progress(&self) -> DownloadProgress {
        let state = self.state.lock();
        DownloadProgress::from_tasks(state.run_id, &state.tasks, state.active)
    }

    pub fn on_progress<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&DownloadProgress) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock();
        let id = listeners.next();
        listeners.progress.push((id, Arc::new(listener)));
        id
    }

    pub fn on_event<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&DownloadEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock();
        let id = listeners.next();
        listeners.events.push((id, Arc::new(listener)));
        id
    }

    /// Returns whether a listener was removed.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.progress.len() + listeners.events.len();
        listeners.progress.retain(|(existing, _)| *existing != id);
        listeners.events.retain(|(existing, _)| *existing != id);
        before != listeners.progress.len() + listeners.events.len()
    }

    /// Manual trigger; same as [`download_all_resources`](Self::download_all_resources).
    pub async fn check_now(&self) -> RunSummary {
        self.download_all_resources().await
    }

    /// Resolve, expand and order every catalog resource some loader can
    /// handle.
    #[instrument(skip(self))]
    pub async fn plan(&self) -> OrderedResources {
        let catalog = match self.metadata.get_all_resources().await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(error = %e, "Catalog read failed, nothing to plan");
                Vec::new()
            }
        };

        let mut candidates = Vec::with_capacity(catalog.len());
        for descriptor in catalog {
            if !self.loaders.can_download(&descriptor) {
                debug!(resource = %descriptor.key, "No loader for resource type, excluded");
                continue;
            }
            candidates.push(self.resolver.resolve(descriptor).await);
        }

        let skip_complete = self.settings.skip_complete;
        let expanded = self
            .resolver
            .expand_with_dependencies(candidates, skip_complete)
            .await;
        self.resolver
            .reorder_with_dependencies(expanded, skip_complete)
            .await
    }

    /// Download everything that is not complete yet, dependencies first.
    pub async fn download_all_resources(&self) -> RunSummary {
        let Some((run_id, cancel)) = self.try_begin() else {
            warn!("Download run already active, start request rejected");
            self.emit(DownloadEvent::RunRejected {
                reason: OfflineError::RunInProgress.to_string(),
            });
            return RunSummary::rejected();
        };

        let started = Instant::now();
        info!(run_id = %run_id, "Download run started");

        let plan = self.plan().await;
        let mut summary = RunSummary {
            run_id: Some(run_id),
            total: plan.len(),
            cycles_broken: plan.cycles_broken,
            ..Default::default()
        };

        if !plan.is_empty() && !cancel.is_cancelled() {
            self.with_run(run_id, |state| {
                state.tasks = plan
                    .resources
                    .iter()
                    .map(|r| DownloadTask::new(r.key.clone()))
                    .collect();
            });
            self.emit(DownloadEvent::RunStarted {
                run_id: run_id.to_string(),
                total: plan.len(),
            });
            self.notify_progress();

            for resource in plan.resources {
                if cancel.is_cancelled() {
                    break;
                }
                let outcome = self
                    .process_task(run_id, &resource.key, Some(resource.descriptor))
                    .await;
                // A transfer that finished after cancellation keeps its
                // "Cancelled" task, so count it the way the snapshot shows it.
                match outcome {
                    _ if self.task_failed(run_id, &resource.key) => summary.failed += 1,
                    TaskOutcome::Downloaded => summary.completed += 1,
                    TaskOutcome::AlreadyComplete => summary.already_complete += 1,
                    TaskOutcome::Failed => summary.failed += 1,
                }
            }

            if cancel.is_cancelled() {
                // Tasks the loop never reached were relabelled too.
                let processed = summary.completed + summary.already_complete + summary.failed;
                summary.failed += summary.total.saturating_sub(processed);
            }
        } else if plan.is_empty() {
            info!(run_id = %run_id, "Nothing to download");
        }

        summary.cancelled = cancel.is_cancelled();
        self.finish_run(run_id);

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            run_id = %run_id,
            total = summary.total,
            completed = summary.completed,
            failed = summary.failed,
            already_complete = summary.already_complete,
            cancelled = summary.cancelled,
            duration_ms,
            "Download run finished"
        );
        self.emit(DownloadEvent::RunCompleted {
            run_id: run_id.to_string(),
            total: summary.total,
            completed: summary.completed,
            failed: summary.failed,
            already_complete: summary.already_complete,
            cycles_broken: summary.cycles_broken,
            duration_ms,
        });

        summary
    }

    /// Check, download and mark one resource outside of a full run.
    ///
    /// Returns the terminal task. While another run is active the request is
    /// rejected and the returned task is `failed`.
    pub async fn download_resource(&self, key: &ResourceKey) -> DownloadTask {
        let Some((run_id, _cancel)) = self.try_begin() else {
            warn!(resource = %key, "Download run already active, single download rejected");
            let reason = OfflineError::RunInProgress.to_string();
            self.emit(DownloadEvent::RunRejected {
                reason: reason.clone(),
            });
            let mut task = DownloadTask::new(key.clone());
            task.fail(reason);
            return task;
        };

        self.with_run(run_id, |state| state.tasks = vec![DownloadTask::new(key.clone())]);
        self.notify_progress();

        self.process_task(run_id, key, None).await;

        let task = self
            .state
            .lock()
            .tasks
            .iter()
            .find(|t| &t.key == key)
            .cloned();
        self.finish_run(run_id);

        task.unwrap_or_else(|| {
            let mut task = DownloadTask::new(key.clone());
            task.fail(OfflineError::Cancelled.to_string());
            task
        })
    }

    /// Stop the active run. Returns the number of tasks relabelled.
    pub fn cancel_downloads(&self) -> usize {
        let (run_id, cancelled) = {
            let mut state = self.state.lock();
            if !state.active {
                return 0;
            }
            state.active = false;
            state.cancel.cancel();

            let mut cancelled = 0;
            for task in state.tasks.iter_mut() {
                if task.fail(MSG_CANCELLED) {
                    cancelled += 1;
                }
            }
            (state.run_id, cancelled)
        };

        info!(cancelled_tasks = cancelled, "Download run cancelled");
        if let Some(run_id) = run_id {
            self.emit(DownloadEvent::RunCancelled {
                run_id: run_id.to_string(),
                cancelled_tasks: cancelled,
            });
        }
        self.notify_progress();
        cancelled
    }

    fn try_begin(&self) -> Option<(RunId, CancellationToken)> {
        let mut state = self.state.lock();
        if state.active {
            return None;
        }
        let run_id = RunId::new();
        state.active = true;
        state.run_id = Some(run_id);
        state.tasks.clear();
        state.cancel = CancellationToken::new();
        Some((run_id, state.cancel.clone()))
    }

    fn finish_run(&self, run_id: RunId) {
        let finished = {
            let mut state = self.state.lock();
            if state.run_id == Some(run_id) && state.active {
                state.active = false;
                true
            } else {
                false
            }
        };
        if finished {
            self.notify_progress();
        }
    }

    /// Apply `f` to the run state if `run_id` is still the current run.
    fn with_run(&self, run_id: RunId, f: impl FnOnce(&mut RunState)) -> bool {
        let mut state = self.state.lock();
        if state.run_id != Some(run_id) {
            return false;
        }
        f(&mut state);
        true
    }

    fn task_failed(&self, run_id: RunId, key: &ResourceKey) -> bool {
        let state = self.state.lock();
        state.run_id == Some(run_id)
            && state
                .tasks
                .iter()
                .any(|t| &t.key == key && t.status == TaskStatus::Failed)
    }

    /// Apply `f` to the task for `key`; notifies listeners when it changed.
    fn update_task(
        &self,
        run_id: RunId,
        key: &ResourceKey,
        f: impl FnOnce(&mut DownloadTask) -> bool,
    ) -> bool {
        let mut changed = false;
        self.with_run(run_id, |state| {
            if let Some(task) = state.tasks.iter_mut().find(|t| &t.key == key) {
                changed = f(task);
            }
        });
        if changed {
            self.notify_progress();
        }
        changed
    }

    #[instrument(skip(self, key, descriptor), fields(run_id = %run_id, resource = %key))]
    async fn process_task(
        &self,
        run_id: RunId,
        key: &ResourceKey,
        descriptor: Option<ResourceDescriptor>,
    ) -> TaskOutcome {
        match self.checker.check_resource(key).await {
            Ok(status) if status.is_complete() => {
                debug!("Already complete, skipping download");
                self.update_task(run_id, key, |t| t.complete(MSG_ALREADY_COMPLETE));
                self.emit(DownloadEvent::ResourceCompleted {
                    run_id: Some(run_id.to_string()),
                    resource: key.to_string(),
                    message: MSG_ALREADY_COMPLETE.to_string(),
                });
                return TaskOutcome::AlreadyComplete;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Pre-download completeness check failed"),
        }

        match self.transfer(run_id, key, descriptor).await {
            Ok(()) => {
                info!("Resource downloaded");
                self.update_task(run_id, key, |t| t.complete(MSG_DOWNLOAD_COMPLETE));
                self.emit(DownloadEvent::ResourceCompleted {
                    run_id: Some(run_id.to_string()),
                    resource: key.to_string(),
                    message: MSG_DOWNLOAD_COMPLETE.to_string(),
                });
                TaskOutcome::Downloaded
            }
            Err(e) => {
                let text = e.failure_text();
                warn!(error = %text, "Resource download failed");
                if let Err(marker_error) = self.checker.mark_error(key, &text).await {
                    warn!(error = %marker_error, "Failed to record error marker");
                }
                let task_text = text.clone();
                self.update_task(run_id, key, move |t| t.fail(task_text));
                self.emit(DownloadEvent::ResourceFailed {
                    run_id: Some(run_id.to_string()),
                    resource: key.to_string(),
                    error: text,
                });
                TaskOutcome::Failed
            }
        }
    }

    async fn transfer(
        &self,
        run_id: RunId,
        key: &ResourceKey,
        descriptor: Option<ResourceDescriptor>,
    ) -> Result<()> {
        let descriptor = match descriptor {
            Some(descriptor) => descriptor,
            None => self
                .metadata
                .get_resource_metadata(key)
                .await?
                .ok_or_else(|| OfflineError::NotFound(key.to_string()))?,
        };

        let loader = self
            .loaders
            .find(&descriptor)
            .ok_or_else(|| OfflineError::LoaderUnavailable(key.to_string()))?;

        let method = DownloadMethod::for_descriptor(&descriptor);
        let expected_count = descriptor.ingredients.len();
        self.update_task(run_id, key, |t| t.start(method));
        debug!(loader = loader.name(), method = %method, "Starting transfer");

        let options = DownloadOptions {
            method,
            skip_existing: true,
        };
        let download = loader.download_resource(key, options, self.progress_callback(run_id, key));

        let transferred = match self.settings.download_timeout {
            Some(limit) => tokio::time::timeout(limit, download)
                .await
                .map_err(|_| OfflineError::Timeout(limit))??,
            None => download.await?,
        };

        self.checker
            .mark_complete(
                key,
                CompletionDetails {
                    method: Some(method),
                    total_size: transferred.total_size,
                    cached_count: transferred.ingredient_count,
                    expected_count: Some(expected_count),
                },
            )
            .await
    }

    fn progress_callback(&self, run_id: RunId, key: &ResourceKey) -> ProgressCallback {
        let manager = self.clone();
        let key = key.clone();
        Arc::new(move |progress: LoaderProgress| {
            manager.update_task(run_id, &key, |t| t.update_progress(&progress));
        })
    }

    fn notify_progress(&self) {
        let snapshot = self.get_progress();
        let listeners: Vec<ProgressListener> = self
            .listeners
            .lock()
            .progress
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&snapshot);
        }

        self.emit(snapshot.to_event());
    }

    fn emit(&self, event: DownloadEvent) {
        let listeners: Vec<EventListener> = self
            .listeners
            .lock()
            .events
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&event);
        }

        self.event_bus.emit(CoreEvent::Download(event)).ok();
    }
}
