//! REST client for the publishing backend.
//!
//! Wraps the status, publish-log, and content-generation endpoints the
//! reconciliation engine depends on. [`BackendApi`] is the seam the
//! tracker programs against; [`BackendClient`] is the `reqwest`
//! implementation.

pub mod api;
pub mod backend;
pub mod models;

pub use api::{ApiError, BackendClient};
pub use backend::BackendApi;
