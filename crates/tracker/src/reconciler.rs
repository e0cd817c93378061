//! Merges observations into tracked jobs.
//!
//! The [`Reconciler`] is pure: it mutates a [`TrackedJob`] and describes
//! side effects in a [`Reconciliation`], which the coordinator executes.
//! It is the only code that moves a job to a terminal state, and the
//! `reported` flag on the job guarantees one notification per outcome.

use jobwatch_client::models::{ContentGenerationPatch, PublishLogEntry, PublishLogPatch};
use jobwatch_core::backoff::BackoffPolicy;
use jobwatch_core::job::TrackedJob;
use jobwatch_core::status::{normalize, normalize_override, JobKind, JobStatus, RAW_STATUS_ERROR};
use jobwatch_core::types::{DbId, Timestamp};
use jobwatch_events::JobEvent;

use crate::probe::ProbeOutcome;

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// Best-effort persistence of a resolved job.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteBack {
    /// Render jobs: `PUT /content-generations/{id}`.
    ContentGeneration {
        id: DbId,
        patch: ContentGenerationPatch,
    },
    /// Publish submissions: `PUT /publish/logs/{id}`.
    PublishLog { id: DbId, patch: PublishLogPatch },
}

/// Side effects produced by one reconciliation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Notification to publish on the event bus.
    pub event: Option<JobEvent>,
    pub write_back: Option<WriteBack>,
    /// The job became terminal during this call.
    pub became_terminal: bool,
    /// The job exhausted its polling budget during this call.
    pub gave_up: bool,
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Reconciler {
    policy: BackoffPolicy,
}

impl Reconciler {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Fold a probe result into `job`.
    ///
    /// A terminal job ignores late probe results: the transition already
    /// happened and was reported.
    pub fn apply_probe(
        &self,
        job: &mut TrackedJob,
        outcome: &ProbeOutcome,
        now: Timestamp,
    ) -> Reconciliation {
        job.checking = false;
        if job.is_terminal() {
            return Reconciliation::default();
        }

        job.last_checked_at = Some(now);
        match outcome {
            ProbeOutcome::Observed {
                status,
                raw_status,
                public_url,
            } => {
                job.status = *status;
                job.raw_provider_status = Some(raw_status.clone());
                if public_url.is_some() {
                    job.public_url = public_url.clone();
                }
            }
            ProbeOutcome::Inconclusive { .. } => {
                job.raw_provider_status = Some(RAW_STATUS_ERROR.to_string());
            }
        }

        if job.is_terminal() {
            let mut result = self.settle(job, now);
            result.write_back = write_back_for(job, now);
            return result;
        }

        self.schedule_next(job, now)
    }

    /// Fold a persisted log row into `job`.
    ///
    /// `first_seen` marks a job created by this very row. Such a job
    /// already resolved before anyone watched it, so it is marked reported
    /// without a notification. Snapshots never write back: the row came
    /// from the backend.
    pub fn apply_snapshot(
        &self,
        job: &mut TrackedJob,
        entry: &PublishLogEntry,
        first_seen: bool,
        now: Timestamp,
    ) -> Reconciliation {
        job.log_id = Some(entry.id);
        if entry.public_url.is_some() {
            job.public_url = entry.public_url.clone();
        }
        if entry.posted_on.is_some() {
            job.posted_on = entry.posted_on;
        }
        if job.is_terminal() {
            return Reconciliation::default();
        }

        let adopted_reference = match entry.provider_post_id.as_deref().map(str::trim) {
            Some(reference) if !reference.is_empty() && job.provider_reference_id.is_none() => {
                job.provider_reference_id = Some(reference.to_string());
                true
            }
            _ => false,
        };

        let override_status =
            normalize_override(entry.final_status.as_deref()).filter(|s| s.is_terminal());
        if override_status.is_some() {
            job.final_status = override_status;
        } else if let Some(status) = entry.status.as_deref().map(normalize) {
            if status.is_terminal() {
                job.status = status;
            }
        }

        if job.is_terminal() {
            if first_seen {
                job.reported = true;
                job.stop_polling();
                return Reconciliation {
                    became_terminal: true,
                    ..Default::default()
                };
            }
            return self.settle(job, now);
        }

        let unscheduled = job.next_poll_at.is_none() && !job.gave_up && !job.checking;
        if adopted_reference || unscheduled {
            job.start_polling(now, &self.policy);
        }
        Reconciliation::default()
    }

    // ---- private helpers ----

    /// Stop polling a job that just turned terminal and report it once.
    fn settle(&self, job: &mut TrackedJob, now: Timestamp) -> Reconciliation {
        job.stop_polling();
        job.checking = false;
        if job.effective_status() == JobStatus::Posted && job.posted_on.is_none() {
            job.posted_on = Some(now);
        }

        if job.reported {
            return Reconciliation::default();
        }
        job.reported = true;

        Reconciliation {
            event: JobEvent::completed(job, now),
            became_terminal: true,
            ..Default::default()
        }
    }

    /// Re-arm a non-terminal job, or give up when out of budget.
    fn schedule_next(&self, job: &mut TrackedJob, now: Timestamp) -> Reconciliation {
        let delay_ms = if job.attempts == 0 {
            self.policy.initial_delay_ms()
        } else {
            self.policy.next_delay(job.backoff_delay_ms)
        };
        job.attempts += 1;
        job.backoff_delay_ms = delay_ms;

        let started_at = *job.polling_started_at.get_or_insert(now);
        if self.policy.exhausted(started_at, now) {
            job.gave_up = true;
            job.stop_polling();
            return Reconciliation {
                event: Some(JobEvent::gave_up(job, now)),
                gave_up: true,
                ..Default::default()
            };
        }

        job.next_poll_at = Some(now + chrono::Duration::milliseconds(delay_ms as i64));
        Reconciliation::default()
    }
}

/// The resolved fields to persist for a job that just turned terminal.
fn write_back_for(job: &TrackedJob, now: Timestamp) -> Option<WriteBack> {
    let effective = job.effective_status().as_str().to_string();
    match job.kind {
        JobKind::VideoRender => Some(WriteBack::ContentGeneration {
            id: job.key.entity_id,
            patch: ContentGenerationPatch {
                blotato_video_id: job.provider_reference_id.clone(),
                blotato_video_status: Some(effective),
                blotato_video_checked_at: Some(now),
                video_url: job.public_url.clone(),
            },
        }),
        JobKind::PublishSubmission => job.log_id.map(|id| WriteBack::PublishLog {
            id,
            patch: PublishLogPatch {
                status: Some(job.status.as_str().to_string()),
                final_status: Some(effective),
                posted_on: job.posted_on,
                provider_post_id: job.provider_reference_id.clone(),
                public_url: job.public_url.clone(),
                checked_at: Some(now),
            },
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
