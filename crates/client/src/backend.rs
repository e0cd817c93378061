//! The backend seam the tracker depends on.
//!
//! The tracker never talks to `reqwest` directly; it holds an
//! `Arc<dyn BackendApi>` so tests can substitute an in-memory backend.

use async_trait::async_trait;
use jobwatch_core::job::JobKey;
use jobwatch_core::types::DbId;

use crate::api::{ApiError, BackendClient};
use crate::models::{
    ContentGenerationPatch, LogScope, PublishLogEntry, PublishLogPatch, StatusResponse,
};

/// Operations the reconciliation engine needs from the backend.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn get_status(&self, provider_reference_id: &str) -> Result<StatusResponse, ApiError>;

    async fn list_logs(&self, scope: LogScope) -> Result<Vec<PublishLogEntry>, ApiError>;

    async fn latest_log(&self, key: &JobKey) -> Result<Option<PublishLogEntry>, ApiError>;

    async fn update_content_generation(
        &self,
        content_generation_id: DbId,
        patch: &ContentGenerationPatch,
    ) -> Result<(), ApiError>;

    async fn update_publish_log(&self, log_id: DbId, patch: &PublishLogPatch)
        -> Result<(), ApiError>;
}

#[async_trait]
impl BackendApi for BackendClient {
    async fn get_status(&self, provider_reference_id: &str) -> Result<StatusResponse, ApiError> {
        BackendClient::get_status(self, provider_reference_id).await
    }

    async fn list_logs(&self, scope: LogScope) -> Result<Vec<PublishLogEntry>, ApiError> {
        BackendClient::list_logs(self, scope).await
    }

    async fn latest_log(&self, key: &JobKey) -> Result<Option<PublishLogEntry>, ApiError> {
        BackendClient::latest_log(self, key).await
    }

    async fn update_content_generation(
        &self,
        content_generation_id: DbId,
        patch: &ContentGenerationPatch,
    ) -> Result<(), ApiError> {
        BackendClient::update_content_generation(self, content_generation_id, patch).await
    }

    async fn update_publish_log(
        &self,
        log_id: DbId,
        patch: &PublishLogPatch,
    ) -> Result<(), ApiError> {
        BackendClient::update_publish_log(self, log_id, patch).await
    }
}
