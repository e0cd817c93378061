//! Job notification bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`JobEvent`]: the user-facing notification for one tracked job.

pub mod bus;

pub use bus::{EventBus, JobEvent};
