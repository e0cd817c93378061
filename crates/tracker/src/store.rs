//! In-memory store of tracked jobs, keyed by [`JobKey`].
//!
//! At most one job exists per key. The store itself makes no scheduling
//! decisions; it only answers which jobs are due and hands out mutable
//! references to the reconciler.

use std::collections::BTreeMap;

use serde::Serialize;

use jobwatch_core::job::{JobKey, JobPhase, TrackedJob};
use jobwatch_core::status::{JobKind, JobStatus};
use jobwatch_core::types::Timestamp;

/// Read-only view of one job for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    #[serde(flatten)]
    pub job: TrackedJob,
    pub phase: JobPhase,
    pub effective_status: JobStatus,
}

impl From<&TrackedJob> for JobSnapshot {
    fn from(job: &TrackedJob) -> Self {
        Self {
            job: job.clone(),
            phase: job.phase(),
            effective_status: job.effective_status(),
        }
    }
}

#[derive(Debug, Default)]
pub struct JobStore {
    jobs: BTreeMap<JobKey, TrackedJob>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &JobKey) -> Option<&TrackedJob> {
        self.jobs.get(key)
    }

    pub fn get_mut(&mut self, key: &JobKey) -> Option<&mut TrackedJob> {
        self.jobs.get_mut(key)
    }

    /// Insert or replace the job stored under its key.
    pub fn insert(&mut self, job: TrackedJob) -> Option<TrackedJob> {
        self.jobs.insert(job.key.clone(), job)
    }

    pub fn remove(&mut self, key: &JobKey) -> Option<TrackedJob> {
        self.jobs.remove(key)
    }

    /// Fetch the job for `key`, creating a `New` one if absent.
    ///
    /// The flag is `true` when the job was created by this call.
    pub fn entry(&mut self, key: JobKey, kind: JobKind) -> (&mut TrackedJob, bool) {
        let first_seen = !self.jobs.contains_key(&key);
        let job = self
            .jobs
            .entry(key.clone())
            .or_insert_with(|| TrackedJob::new(key, kind));
        (job, first_seen)
    }

    /// Keys of every job the fine loop should probe at `now`, in key order.
    pub fn due_keys(&self, now: Timestamp) -> Vec<JobKey> {
        self.jobs
            .values()
            .filter(|job| job.is_due(now))
            .map(|job| job.key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Copy of every job with its derived phase.
    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        self.jobs.values().map(JobSnapshot::from).collect()
    }
}
