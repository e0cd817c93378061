//! Job-status reconciliation engine.
//!
//! Tracks asynchronous remote operations whose outcome is only observable
//! by polling. A [`PollCoordinator`](coordinator::PollCoordinator) drives
//! two loops over a [`JobStore`](store::JobStore):
//!
//! - a fine loop that probes each due job via [`StatusProbe`](probe::StatusProbe),
//! - a coarse sweep that re-reads the authoritative publish log.
//!
//! Every result goes through the [`Reconciler`](reconciler::Reconciler),
//! the only place that moves a job to a terminal state and emits its
//! notification. Both loops pause while the
//! [`VisibilityGate`](visibility::VisibilityGate) reports the UI hidden.
//! Callers own the running engine through a
//! [`TrackerHandle`](handle::TrackerHandle).

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod handle;
pub mod probe;
pub mod reconciler;
pub mod store;
pub mod visibility;

pub use config::{CoordinatorConfig, TrackerConfig};
pub use coordinator::PollCoordinator;
pub use error::TrackerError;
pub use handle::TrackerHandle;
pub use visibility::VisibilityGate;
