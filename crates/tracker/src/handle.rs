//! Owned handle to a running tracker.
//!
//! Each [`TrackerHandle`] has its own store and coordinator task. Dropping
//! the handle cancels the task; [`TrackerHandle::stop`] additionally waits
//! for it to exit.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use jobwatch_client::models::LogScope;
use jobwatch_client::BackendApi;
use jobwatch_core::job::JobKey;
use jobwatch_core::status::JobKind;
use jobwatch_events::{EventBus, JobEvent};

use crate::clock::{Clock, SystemClock};
use crate::config::CoordinatorConfig;
use crate::coordinator::{Command, PollCoordinator};
use crate::error::TrackerError;
use crate::store::{JobSnapshot, JobStore};
use crate::visibility::VisibilityGate;

/// Capacity of the command channel to the coordinator task.
const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// How long [`TrackerHandle::stop`] waits for the coordinator to exit.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TrackerHandle {
    commands: mpsc::Sender<Command>,
    store: Arc<RwLock<JobStore>>,
    gate: VisibilityGate,
    bus: Arc<EventBus>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TrackerHandle {
    /// Spawn a coordinator on the current runtime using the system clock.
    pub fn start(
        backend: Arc<dyn BackendApi>,
        config: CoordinatorConfig,
        scope: Option<LogScope>,
    ) -> Self {
        Self::start_with(backend, Arc::new(EventBus::default()), Arc::new(SystemClock), config, scope)
    }

    /// Spawn a coordinator with an explicit event bus and clock.
    pub fn start_with(
        backend: Arc<dyn BackendApi>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        config: CoordinatorConfig,
        scope: Option<LogScope>,
    ) -> Self {
        let gate = VisibilityGate::default();
        let coordinator = PollCoordinator::new(
            backend,
            Arc::clone(&bus),
            gate.clone(),
            clock,
            config,
            scope,
        );
        let store = coordinator.store();

        let (commands, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(coordinator.run(rx, cancel.clone()));

        Self {
            commands,
            store,
            gate,
            bus,
            cancel,
            task: Some(task),
        }
    }

    /// Track a job. Returns once the coordinator has applied it.
    pub async fn track(
        &self,
        key: JobKey,
        kind: JobKind,
        provider_reference_id: Option<String>,
    ) -> Result<(), TrackerError> {
        self.send(|done| Command::Track {
            key,
            kind,
            provider_reference_id,
            done,
        })
        .await
    }

    pub async fn untrack(&self, key: JobKey) -> Result<(), TrackerError> {
        self.send(|done| Command::Untrack { key, done }).await
    }

    /// Re-check a job and restart its polling run.
    pub async fn retrigger(&self, key: JobKey) -> Result<(), TrackerError> {
        self.send(|done| Command::Retrigger { key, done }).await
    }

    /// Sweep the publish log now instead of waiting for the interval.
    pub async fn refresh(&self) -> Result<(), TrackerError> {
        self.send(|done| Command::Refresh { done }).await
    }

    /// Current contents of the store, in key order.
    pub async fn snapshot(&self) -> Vec<JobSnapshot> {
        self.store.read().await.snapshot()
    }

    pub async fn get(&self, key: &JobKey) -> Option<JobSnapshot> {
        self.store.read().await.get(key).map(JobSnapshot::from)
    }

    pub fn set_visible(&self, visible: bool) {
        self.gate.set_visible(visible);
    }

    pub fn is_visible(&self) -> bool {
        self.gate.is_visible()
    }

    /// A clone of the gate, for wiring visibility to an outside source.
    pub fn visibility(&self) -> VisibilityGate {
        self.gate.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.bus.subscribe()
    }

    /// Cancel both loops and wait for the coordinator task to exit.
    pub async fn stop(mut self) -> Result<(), TrackerError> {
        self.cancel.cancel();
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        match tokio::time::timeout(STOP_TIMEOUT, task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.is_panic() => Err(TrackerError::Panicked(e.to_string())),
            Ok(Err(_)) => Ok(()),
            Err(_) => {
                tracing::warn!("Coordinator did not stop within timeout");
                Ok(())
            }
        }
    }

    async fn send(
        &self,
        build: impl FnOnce(oneshot::Sender<()>) -> Command,
    ) -> Result<(), TrackerError> {
        let (done, applied) = oneshot::channel();
        self.commands
            .send(build(done))
            .await
            .map_err(|_| TrackerError::Stopped)?;
        applied.await.map_err(|_| TrackerError::Stopped)
    }
}

impl Drop for TrackerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for TrackerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerHandle")
            .field("visible", &self.gate.is_visible())
            .field("running", &self.task.as_ref().is_some_and(|t| !t.is_finished()))
            .finish_non_exhaustive()
    }
}
