//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans out [`JobEvent`]s to every subscriber (UI views,
//! loggers). It is shared via `Arc<EventBus>` across the application.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use jobwatch_core::job::{JobKey, TrackedJob};
use jobwatch_core::job_events::{
    EVENT_POLLING_GAVE_UP, EVENT_PUBLISH_FAILED, EVENT_PUBLISH_POSTED, EVENT_VIDEO_FAILED,
    EVENT_VIDEO_READY,
};
use jobwatch_core::status::{JobKind, JobStatus};

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// A user-facing notification about one tracked job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEvent {
    /// Dot-separated event name, e.g. `"video.ready"`.
    pub event_type: &'static str,
    pub key: JobKey,
    pub kind: JobKind,
    /// Effective status at the time of the event.
    pub status: JobStatus,
    pub public_url: Option<String>,
    /// Human-readable line suitable for a toast.
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    /// Completion notification for a job that just turned terminal.
    ///
    /// Returns `None` for non-terminal jobs.
    pub fn completed(job: &TrackedJob, at: DateTime<Utc>) -> Option<Self> {
        let status = job.effective_status();
        let (event_type, message) = match (job.kind, status) {
            (_, JobStatus::Queued) => return None,
            (JobKind::VideoRender, JobStatus::Posted) => (EVENT_VIDEO_READY, "Video ready".to_string()),
            (JobKind::VideoRender, JobStatus::Failed) => {
                (EVENT_VIDEO_FAILED, "Video render failed".to_string())
            }
            (JobKind::PublishSubmission, JobStatus::Posted) => (
                EVENT_PUBLISH_POSTED,
                format!("Published to {}", job.key.platform),
            ),
            (JobKind::PublishSubmission, JobStatus::Failed) => (
                EVENT_PUBLISH_FAILED,
                format!("Publishing to {} failed", job.key.platform),
            ),
        };

        Some(Self {
            event_type,
            key: job.key.clone(),
            kind: job.kind,
            status,
            public_url: job.public_url.clone(),
            message,
            timestamp: at,
        })
    }

    /// Notification that polling stopped without a terminal result.
    pub fn gave_up(job: &TrackedJob, at: DateTime<Utc>) -> Self {
        Self {
            event_type: EVENT_POLLING_GAVE_UP,
            key: job.key.clone(),
            kind: job.kind,
            status: job.effective_status(),
            public_url: job.public_url.clone(),
            message: "Still queued; stopped checking".to_string(),
            timestamp: at,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// # Usage
///
/// ```rust
/// use jobwatch_events::EventBus;
///
/// let bus = EventBus::default();
/// let rx = bus.subscribe();
/// assert_eq!(bus.subscriber_count(), 1);
/// # drop(rx);
/// ```
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// With no subscribers the event is silently dropped.
    pub fn publish(&self, event: JobEvent) {
        // A SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
