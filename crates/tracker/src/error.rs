/// Errors returned by [`TrackerHandle`](crate::handle::TrackerHandle).
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The coordinator task has exited; the handle is no longer usable.
    #[error("Tracker has stopped")]
    Stopped,

    #[error("Coordinator task panicked: {0}")]
    Panicked(String),
}
