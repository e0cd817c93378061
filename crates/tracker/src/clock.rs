//! Wall-clock source for scheduling decisions.
//!
//! Job schedules are stored as UTC timestamps, so the coordinator asks a
//! [`Clock`] for "now" instead of calling `Utc::now()` directly.

use chrono::Utc;
use jobwatch_core::types::Timestamp;

pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Timestamp;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}
