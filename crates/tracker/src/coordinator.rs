//! The polling engine.
//!
//! [`PollCoordinator`] owns the job store and is its only writer. It runs
//! two loops on one task:
//!
//! - the fine loop ticks every [`CoordinatorConfig::tick`] and starts a
//!   probe for every due job,
//! - the coarse loop sweeps the publish log every
//!   [`CoordinatorConfig::sweep_interval`].
//!
//! The task never waits on the backend itself. Probes, log lookups and
//! write-backs run in [`JoinSet`]s; their results come back to the
//! coordinator task and are reconciled one at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::{AbortHandle, Id, JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use jobwatch_client::models::{LogScope, PublishLogEntry};
use jobwatch_client::{ApiError, BackendApi};
use jobwatch_core::job::{JobKey, TrackedJob};
use jobwatch_core::status::JobKind;
use jobwatch_events::EventBus;

use crate::clock::Clock;
use crate::config::CoordinatorConfig;
use crate::probe::{ProbeOutcome, StatusProbe};
use crate::reconciler::{Reconciler, Reconciliation, WriteBack};
use crate::store::JobStore;
use crate::visibility::VisibilityGate;

/// How long a stopping coordinator waits for write-backs still in flight.
const WRITE_BACK_DRAIN: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Requests sent from a [`TrackerHandle`](crate::handle::TrackerHandle) to
/// the coordinator task. `done` fires once the command was applied.
#[derive(Debug)]
pub enum Command {
    Track {
        key: JobKey,
        kind: JobKind,
        provider_reference_id: Option<String>,
        done: oneshot::Sender<()>,
    },
    Untrack {
        key: JobKey,
        done: oneshot::Sender<()>,
    },
    Retrigger {
        key: JobKey,
        done: oneshot::Sender<()>,
    },
    Refresh {
        done: oneshot::Sender<()>,
    },
}

/// A probe that has been started and not yet reconciled.
#[derive(Debug)]
struct InFlight {
    key: JobKey,
    provider_reference_id: String,
    abort: AbortHandle,
}

/// Result of a publish-log request made off the coordinator task.
#[derive(Debug)]
enum Lookup {
    Sweep {
        scope: LogScope,
        result: Result<Vec<PublishLogEntry>, ApiError>,
    },
    Latest {
        key: JobKey,
        result: Result<Option<PublishLogEntry>, ApiError>,
        done: Option<oneshot::Sender<()>>,
    },
}

type WriteBackResult = (JobKey, Result<(), ApiError>);

// ---------------------------------------------------------------------------
// PollCoordinator
// ---------------------------------------------------------------------------

pub struct PollCoordinator {
    store: Arc<RwLock<JobStore>>,
    backend: Arc<dyn BackendApi>,
    probe: StatusProbe,
    reconciler: Reconciler,
    bus: Arc<EventBus>,
    gate: VisibilityGate,
    clock: Arc<dyn Clock>,
    config: CoordinatorConfig,
    scope: Option<LogScope>,
    probes: JoinSet<ProbeOutcome>,
    in_flight: HashMap<Id, InFlight>,
    lookups: JoinSet<Lookup>,
    sweep_task: Option<Id>,
    sweep_waiters: Vec<oneshot::Sender<()>>,
    write_backs: JoinSet<WriteBackResult>,
}

impl PollCoordinator {
    pub fn new(
        backend: Arc<dyn BackendApi>,
        bus: Arc<EventBus>,
        gate: VisibilityGate,
        clock: Arc<dyn Clock>,
        config: CoordinatorConfig,
        scope: Option<LogScope>,
    ) -> Self {
        Self {
            store: Arc::new(RwLock::new(JobStore::new())),
            probe: StatusProbe::new(Arc::clone(&backend)),
            backend,
            reconciler: Reconciler::new(config.policy.clone()),
            bus,
            gate,
            clock,
            config,
            scope,
            probes: JoinSet::new(),
            in_flight: HashMap::new(),
            lookups: JoinSet::new(),
            sweep_task: None,
            sweep_waiters: Vec::new(),
            write_backs: JoinSet::new(),
        }
    }

    /// Shared read access to the store for snapshots.
    pub fn store(&self) -> Arc<RwLock<JobStore>> {
        Arc::clone(&self.store)
    }

    /// Number of probes started and not yet reconciled.
    pub fn probes_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Number of write-backs started and not yet finished.
    pub fn write_backs_in_flight(&self) -> usize {
        self.write_backs.len()
    }

    /// Run both loops until `cancel` fires or every command sender is
    /// dropped. Probes and lookups are aborted on exit; write-backs get
    /// [`WRITE_BACK_DRAIN`] to finish.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>, cancel: CancellationToken) {
        let mut fine = tokio::time::interval(self.config.tick);
        fine.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut coarse = tokio::time::interval(self.config.sweep_interval);
        coarse.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut visibility = self.gate.subscribe();

        tracing::info!(
            tick_ms = self.config.tick.as_millis() as u64,
            sweep_secs = self.config.sweep_interval.as_secs(),
            scope = ?self.scope,
            "Poll coordinator started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Poll coordinator shutting down");
                    break;
                }
                _ = fine.tick() => {
                    if self.gate.is_visible() {
                        self.tick().await;
                    }
                }
                _ = coarse.tick() => {
                    if self.gate.is_visible() {
                        self.sweep();
                    }
                }
                Some(joined) = self.probes.join_next_with_id(), if !self.probes.is_empty() => {
                    self.finish_probe(joined).await;
                }
                Some(joined) = self.lookups.join_next_with_id(), if !self.lookups.is_empty() => {
                    self.finish_lookup(joined).await;
                }
                Some(joined) = self.write_backs.join_next(), if !self.write_backs.is_empty() => {
                    log_write_back(joined);
                }
                changed = visibility.changed() => {
                    if changed.is_err() {
                        continue;
                    }
                    let visible = *visibility.borrow_and_update();
                    tracing::debug!(visible, "Visibility changed");
                    if visible {
                        self.tick().await;
                        self.sweep();
                        fine.reset();
                        coarse.reset();
                    }
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        tracing::info!("All tracker handles dropped; coordinator stopping");
                        break;
                    }
                },
            }
        }

        self.probes.abort_all();
        self.in_flight.clear();
        self.lookups.abort_all();
        self.drain_write_backs().await;
    }

    async fn handle_command(&mut self, command: Command) {
        // A dropped `done` receiver only means the caller stopped waiting.
        match command {
            Command::Track {
                key,
                kind,
                provider_reference_id,
                done,
            } => {
                self.track(key, kind, provider_reference_id).await;
                let _ = done.send(());
            }
            Command::Untrack { key, done } => {
                self.untrack(&key).await;
                let _ = done.send(());
            }
            Command::Retrigger { key, done } => self.start_retrigger(key, Some(done)).await,
            Command::Refresh { done } => self.start_sweep(Some(done)),
        }
    }

    // ---- commands ----

    /// Start tracking a job, or update its provider reference.
    ///
    /// Tracking the same reference again only re-arms an unscheduled job.
    /// A different reference starts a fresh job under the same key and
    /// aborts the probe running for the old one.
    pub async fn track(&mut self, key: JobKey, kind: JobKind, provider_reference_id: Option<String>) {
        let now = self.clock.now();
        let policy = self.reconciler.policy();
        let mut store = self.store.write().await;
        let (job, created) = store.entry(key.clone(), kind);

        let Some(reference) = provider_reference_id else {
            if created {
                tracing::info!(job = %key, "Tracking job without provider reference");
            }
            return;
        };

        if job.provider_reference_id.as_deref() == Some(reference.as_str()) {
            let unscheduled = job.next_poll_at.is_none() && !job.gave_up && !job.checking;
            if unscheduled && !job.is_terminal() {
                job.start_polling(now, policy);
            }
            return;
        }

        let replaced = job.provider_reference_id.is_some();
        if replaced {
            *job = TrackedJob::new(key.clone(), kind);
        }
        job.kind = kind;
        job.provider_reference_id = Some(reference);
        job.start_polling(now, policy);

        tracing::info!(
            job = %key,
            provider_ref = job.provider_reference_id.as_deref().unwrap_or_default(),
            next_poll_at = ?job.next_poll_at,
            "Tracking job",
        );
        drop(store);

        if replaced {
            self.abort_probe(&key);
        }
    }

    /// Stop tracking a job and abort its probe, if one is running.
    pub async fn untrack(&mut self, key: &JobKey) {
        if self.store.write().await.remove(key).is_some() {
            tracing::info!(job = %key, "Untracked job");
        }
        self.abort_probe(key);
    }

    /// Manual re-check of a job, typically one that gave up.
    ///
    /// Fetches the latest log row in the background. Once it arrives the
    /// row is reconciled, then polling restarts with a fresh budget if the
    /// job is still pending. [`settle`](Self::settle) waits for it.
    pub async fn retrigger(&mut self, key: &JobKey) {
        self.start_retrigger(key.clone(), None).await;
    }

    // ---- loops ----

    /// One fine-loop pass: start a probe for every due job.
    pub async fn tick(&mut self) {
        let now = self.clock.now();
        let mut store = self.store.write().await;
        let due = store.due_keys(now);
        if due.is_empty() {
            return;
        }

        for key in due {
            let Some(job) = store.get_mut(&key) else {
                continue;
            };
            let Some(reference) = job.provider_reference_id.clone() else {
                continue;
            };
            job.checking = true;

            let probe = self.probe.clone();
            let probed = reference.clone();
            let abort = self.probes.spawn(async move { probe.probe(&probed).await });
            tracing::debug!(job = %key, provider_ref = %reference, "Probe started");
            self.in_flight.insert(
                abort.id(),
                InFlight {
                    key,
                    provider_reference_id: reference,
                    abort,
                },
            );
        }
    }

    /// Start one coarse sweep over the publish log for the configured
    /// scope. Does nothing while a sweep is already running.
    pub fn sweep(&mut self) {
        self.start_sweep(None);
    }

    /// Wait until every probe, lookup and write-back has finished and its
    /// result has been applied.
    pub async fn settle(&mut self) {
        loop {
            tokio::select! {
                Some(joined) = self.probes.join_next_with_id(), if !self.probes.is_empty() => {
                    self.finish_probe(joined).await;
                }
                Some(joined) = self.lookups.join_next_with_id(), if !self.lookups.is_empty() => {
                    self.finish_lookup(joined).await;
                }
                Some(joined) = self.write_backs.join_next(), if !self.write_backs.is_empty() => {
                    log_write_back(joined);
                }
                else => break,
            }
        }
    }

    // ---- background work ----

    fn start_sweep(&mut self, done: Option<oneshot::Sender<()>>) {
        let Some(scope) = self.scope else {
            if let Some(done) = done {
                let _ = done.send(());
            }
            return;
        };

        self.sweep_waiters.extend(done);
        if self.sweep_task.is_some() {
            return;
        }

        let backend = Arc::clone(&self.backend);
        let task = self.lookups.spawn(async move {
            let result = backend.list_logs(scope).await;
            Lookup::Sweep { scope, result }
        });
        self.sweep_task = Some(task.id());
    }

    async fn start_retrigger(&mut self, key: JobKey, done: Option<oneshot::Sender<()>>) {
        if self.store.read().await.get(&key).is_none() {
            tracing::warn!(job = %key, "Retrigger for untracked job ignored");
            if let Some(done) = done {
                let _ = done.send(());
            }
            return;
        }

        let backend = Arc::clone(&self.backend);
        self.lookups.spawn(async move {
            let result = backend.latest_log(&key).await;
            Lookup::Latest { key, result, done }
        });
    }

    /// Abort the probe running for `key`. Its result, if it still
    /// arrives, no longer matches anything in flight and is dropped.
    fn abort_probe(&mut self, key: &JobKey) {
        self.in_flight.retain(|_, probe| {
            if &probe.key != key {
                return true;
            }
            probe.abort.abort();
            tracing::debug!(job = %key, provider_ref = %probe.provider_reference_id, "Probe aborted");
            false
        });
    }

    fn release_sweep_waiters(&mut self) {
        self.sweep_task = None;
        for done in self.sweep_waiters.drain(..) {
            let _ = done.send(());
        }
    }

    async fn drain_write_backs(&mut self) {
        let pending = self.write_backs.len();
        if pending == 0 {
            return;
        }

        let write_backs = &mut self.write_backs;
        let drain = async {
            while let Some(joined) = write_backs.join_next().await {
                log_write_back(joined);
            }
        };
        if tokio::time::timeout(WRITE_BACK_DRAIN, drain).await.is_err() {
            tracing::warn!(pending, "Abandoning write-backs still in flight at shutdown");
            self.write_backs.abort_all();
        }
    }

    // ---- reconciliation ----

    async fn finish_probe(&mut self, joined: Result<(Id, ProbeOutcome), JoinError>) {
        let (id, outcome) = match joined {
            Ok(pair) => pair,
            Err(e) if e.is_cancelled() => {
                self.in_flight.remove(&e.id());
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Probe task panicked");
                let error = e.to_string();
                (e.id(), ProbeOutcome::Inconclusive { error })
            }
        };
        let Some(InFlight {
            key,
            provider_reference_id,
            ..
        }) = self.in_flight.remove(&id)
        else {
            return;
        };

        let now = self.clock.now();
        let result = {
            let mut store = self.store.write().await;
            let Some(job) = store.get_mut(&key) else {
                return;
            };
            if job.provider_reference_id.as_deref() != Some(provider_reference_id.as_str()) {
                tracing::debug!(job = %key, "Discarding probe for a replaced reference");
                return;
            }
            let result = self.reconciler.apply_probe(job, &outcome, now);
            tracing::debug!(
                job = %key,
                status = %job.status,
                attempts = job.attempts,
                next_poll_at = ?job.next_poll_at,
                "Probe reconciled",
            );
            result
        };

        self.execute(&key, result);
    }

    async fn finish_lookup(&mut self, joined: Result<(Id, Lookup), JoinError>) {
        let lookup = match joined {
            Ok((_, lookup)) => lookup,
            Err(e) => {
                if !e.is_cancelled() {
                    tracing::error!(error = %e, "Publish log lookup panicked");
                }
                if self.sweep_task == Some(e.id()) {
                    self.release_sweep_waiters();
                }
                return;
            }
        };

        match lookup {
            Lookup::Sweep { scope, result } => {
                match result {
                    Ok(entries) => {
                        tracing::debug!(?scope, rows = entries.len(), "Publish log sweep");
                        for entry in entries {
                            self.apply_snapshot(entry, JobKind::PublishSubmission).await;
                        }
                    }
                    Err(e) => tracing::warn!(?scope, error = %e, "Publish log sweep failed"),
                }
                self.release_sweep_waiters();
            }
            Lookup::Latest { key, result, done } => {
                let kind = self.store.read().await.get(&key).map(|job| job.kind);
                match kind {
                    Some(kind) => {
                        match result {
                            Ok(Some(entry)) => self.apply_snapshot(entry, kind).await,
                            Ok(None) => {}
                            Err(e) => tracing::warn!(
                                job = %key,
                                error = %e,
                                "Latest log fetch failed; retriggering anyway",
                            ),
                        }
                        self.restart_polling(&key).await;
                    }
                    None => tracing::debug!(job = %key, "Job untracked before retrigger finished"),
                }
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
        }
    }

    async fn restart_polling(&mut self, key: &JobKey) {
        let now = self.clock.now();
        let policy = self.reconciler.policy();
        let mut store = self.store.write().await;
        if let Some(job) = store.get_mut(key) {
            if !job.is_terminal() && !job.checking {
                job.start_polling(now, policy);
                tracing::info!(job = %key, next_poll_at = ?job.next_poll_at, "Polling restarted");
            }
        }
    }

    async fn apply_snapshot(&mut self, entry: PublishLogEntry, kind: JobKind) {
        let now = self.clock.now();
        let key = entry.key();
        let result = {
            let mut store = self.store.write().await;
            let (job, first_seen) = store.entry(key.clone(), kind);
            if first_seen {
                tracing::info!(job = %key, log_id = entry.id, "Discovered publish log row");
            }
            self.reconciler.apply_snapshot(job, &entry, first_seen, now)
        };

        self.execute(&key, result);
    }

    /// Publish the notification and start the write-back, if any.
    fn execute(&mut self, key: &JobKey, result: Reconciliation) {
        if result.gave_up {
            tracing::info!(job = %key, "Polling budget exhausted; job left idle");
        }

        if let Some(event) = result.event {
            tracing::info!(
                job = %key,
                event_type = event.event_type,
                status = %event.status,
                "Job reached terminal state",
            );
            self.bus.publish(event);
        }

        let Some(write_back) = result.write_back else {
            return;
        };
        let backend = Arc::clone(&self.backend);
        let key = key.clone();
        self.write_backs.spawn(async move {
            let result = match &write_back {
                WriteBack::ContentGeneration { id, patch } => {
                    backend.update_content_generation(*id, patch).await
                }
                WriteBack::PublishLog { id, patch } => backend.update_publish_log(*id, patch).await,
            };
            (key, result)
        });
    }
}

fn log_write_back(joined: Result<WriteBackResult, JoinError>) {
    match joined {
        Ok((key, Ok(()))) => tracing::debug!(job = %key, "Write-back stored"),
        Ok((key, Err(e))) => {
            tracing::warn!(job = %key, error = %e, "Write-back failed; local state kept");
        }
        Err(e) if e.is_cancelled() => {}
        Err(e) => tracing::error!(error = %e, "Write-back task panicked"),
    }
}

impl std::fmt::Debug for PollCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollCoordinator")
            .field("config", &self.config)
            .field("scope", &self.scope)
            .field("in_flight", &self.in_flight.len())
            .field("write_backs", &self.write_backs.len())
            .finish_non_exhaustive()
    }
}
