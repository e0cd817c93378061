//! Domain types for the job-status reconciliation engine.
//!
//! Everything in this crate is pure: no I/O, no async. The status
//! vocabulary, the backoff policy, and the [`TrackedJob`](job::TrackedJob)
//! record are shared by the HTTP client, the event bus, and the tracker.

pub mod backoff;
pub mod error;
pub mod job;
pub mod job_events;
pub mod status;
pub mod types;
