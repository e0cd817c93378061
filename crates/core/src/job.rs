//! The client-side working record of one observed asynchronous operation.

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffPolicy;
use crate::status::{JobKind, JobStatus};
use crate::types::{DbId, Timestamp};

/// Platform component of the key used for video render jobs.
pub const RENDER_PLATFORM: &str = "blotato";

/// Post-type component of the key used for video render jobs.
pub const RENDER_POST_TYPE: &str = "video";

// ---------------------------------------------------------------------------
// JobKey
// ---------------------------------------------------------------------------

/// Identity of a tracked job: one per (entity, platform, post type).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub entity_id: DbId,
    pub platform: String,
    pub post_type: String,
}

impl JobKey {
    pub fn new(entity_id: DbId, platform: impl Into<String>, post_type: impl Into<String>) -> Self {
        Self {
            entity_id,
            platform: platform.into(),
            post_type: post_type.into(),
        }
    }

    /// Key of the video render job for a content generation.
    pub fn render(entity_id: DbId) -> Self {
        Self::new(entity_id, RENDER_PLATFORM, RENDER_POST_TYPE)
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.entity_id, self.platform, self.post_type)
    }
}

// ---------------------------------------------------------------------------
// JobPhase
// ---------------------------------------------------------------------------

/// Lifecycle position derived from a [`TrackedJob`]'s fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// No provider reference yet.
    New,
    /// Has a reference and is being polled.
    Queued,
    /// Polling budget ran out; waits for a manual re-trigger.
    Idle,
    Posted,
    Failed,
}

// ---------------------------------------------------------------------------
// TrackedJob
// ---------------------------------------------------------------------------

/// Working copy of one in-flight job.
///
/// Mutated only by the reconciler. `next_poll_at` is `None` exactly when
/// the job is terminal, has no provider reference, or has given up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedJob {
    pub key: JobKey,
    pub kind: JobKind,
    /// Backing publish-log row, when the job was seen in a sweep.
    pub log_id: Option<DbId>,
    pub provider_reference_id: Option<String>,
    /// Transient status from the most recent probe.
    pub status: JobStatus,
    /// Authoritative override from the persisted log.
    pub final_status: Option<JobStatus>,
    pub last_checked_at: Option<Timestamp>,
    pub next_poll_at: Option<Timestamp>,
    pub backoff_delay_ms: u64,
    /// A probe for this job is in flight.
    pub checking: bool,
    pub public_url: Option<String>,
    pub posted_on: Option<Timestamp>,
    pub raw_provider_status: Option<String>,
    /// Probes completed in the current polling run.
    pub attempts: u32,
    pub polling_started_at: Option<Timestamp>,
    pub gave_up: bool,
    /// The terminal outcome has been reported.
    pub reported: bool,
}

impl TrackedJob {
    /// A job in the `New` phase: known, but nothing to poll yet.
    pub fn new(key: JobKey, kind: JobKind) -> Self {
        Self {
            key,
            kind,
            log_id: None,
            provider_reference_id: None,
            status: JobStatus::Queued,
            final_status: None,
            last_checked_at: None,
            next_poll_at: None,
            backoff_delay_ms: 0,
            checking: false,
            public_url: None,
            posted_on: None,
            raw_provider_status: None,
            attempts: 0,
            polling_started_at: None,
            gave_up: false,
            reported: false,
        }
    }

    /// The override wins whenever it is present.
    pub fn effective_status(&self) -> JobStatus {
        self.final_status.unwrap_or(self.status)
    }

    pub fn is_terminal(&self) -> bool {
        self.effective_status().is_terminal()
    }

    pub fn phase(&self) -> JobPhase {
        match self.effective_status() {
            JobStatus::Posted => JobPhase::Posted,
            JobStatus::Failed => JobPhase::Failed,
            JobStatus::Queued if self.provider_reference_id.is_none() => JobPhase::New,
            JobStatus::Queued if self.gave_up => JobPhase::Idle,
            JobStatus::Queued => JobPhase::Queued,
        }
    }

    /// Whether the fine loop should probe this job at `now`.
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.provider_reference_id.is_some()
            && !self.is_terminal()
            && !self.checking
            && !self.gave_up
            && self.next_poll_at.is_some_and(|at| now >= at)
    }

    /// Begin a fresh polling run: full budget, initial delay.
    ///
    /// No-op for terminal jobs and jobs without a provider reference.
    pub fn start_polling(&mut self, now: Timestamp, policy: &BackoffPolicy) {
        if self.is_terminal() || self.provider_reference_id.is_none() {
            self.next_poll_at = None;
            return;
        }
        let initial = policy.initial_delay_ms();
        self.attempts = 0;
        self.gave_up = false;
        self.polling_started_at = Some(now);
        self.backoff_delay_ms = initial;
        self.next_poll_at = Some(now + chrono::Duration::milliseconds(initial as i64));
    }

    /// Drop the schedule. Used on terminal transitions and give-up.
    pub fn stop_polling(&mut self) {
        self.next_poll_at = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
