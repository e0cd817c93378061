//! Single-shot status probe for one provider reference.

use std::sync::Arc;

use jobwatch_client::BackendApi;
use jobwatch_core::status::{normalize, JobStatus};

/// Result of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The provider answered; `status` is the normalized `raw_status`.
    Observed {
        status: JobStatus,
        raw_status: String,
        public_url: Option<String>,
    },
    /// Network failure or non-2xx. Says nothing about the job itself.
    Inconclusive { error: String },
}

impl ProbeOutcome {
    /// Normalize a provider answer.
    pub fn observed(raw_status: impl Into<String>, public_url: Option<String>) -> Self {
        let raw_status = raw_status.into();
        Self::Observed {
            status: normalize(&raw_status),
            raw_status,
            public_url,
        }
    }
}

/// Calls the status endpoint and normalizes the answer.
#[derive(Clone)]
pub struct StatusProbe {
    backend: Arc<dyn BackendApi>,
}

impl StatusProbe {
    pub fn new(backend: Arc<dyn BackendApi>) -> Self {
        Self { backend }
    }

    /// Probe one provider reference. Never fails: errors become
    /// [`ProbeOutcome::Inconclusive`].
    pub async fn probe(&self, provider_reference_id: &str) -> ProbeOutcome {
        match self.backend.get_status(provider_reference_id).await {
            Ok(resp) => {
                tracing::debug!(
                    provider_ref = %provider_reference_id,
                    raw_status = %resp.status,
                    "Provider status received",
                );
                ProbeOutcome::observed(resp.status, resp.public_url)
            }
            Err(e) => {
                tracing::warn!(
                    provider_ref = %provider_reference_id,
                    error = %e,
                    "Status probe inconclusive",
                );
                ProbeOutcome::Inconclusive {
                    error: e.to_string(),
                }
            }
        }
    }
}

impl std::fmt::Debug for StatusProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusProbe").finish_non_exhaustive()
    }
}
