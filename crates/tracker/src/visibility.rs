//! Suspends polling while nobody is looking.
//!
//! [`VisibilityGate`] wraps a `tokio::sync::watch` channel. The
//! coordinator skips every tick while the gate is closed and runs one
//! immediate tick when it reopens.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared visibility flag. Clones observe and control the same gate.
#[derive(Debug, Clone)]
pub struct VisibilityGate {
    tx: Arc<watch::Sender<bool>>,
}

impl VisibilityGate {
    pub fn new(visible: bool) -> Self {
        let (tx, _) = watch::channel(visible);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_visible(&self) -> bool {
        *self.tx.borrow()
    }

    /// Update visibility. Subscribers are only woken on an actual change.
    pub fn set_visible(&self, visible: bool) {
        self.tx.send_if_modified(|current| {
            if *current == visible {
                false
            } else {
                *current = visible;
                true
            }
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for VisibilityGate {
    fn default() -> Self {
        Self::new(true)
    }
}
