//! HTTP client for the publishing backend.
//!
//! Thin wrappers over the REST endpoints using [`reqwest`]. Every call
//! goes through [`BackendClient::ensure_success`], so a non-2xx answer is
//! always an [`ApiError::Status`] carrying the response body.

use std::time::Duration;

use jobwatch_core::job::JobKey;
use jobwatch_core::types::DbId;

use crate::models::{
    ContentGenerationPatch, DataEnvelope, LogScope, PublishLogEntry, PublishLogPatch,
    StatusResponse,
};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors from the backend REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The base URL cannot have path segments appended to it.
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),

    /// The backend returned a non-2xx status code.
    #[error("Backend API error ({status}): {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

/// HTTP client for one backend base URL.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BackendClient {
    /// Create a client with the given request timeout.
    ///
    /// * `base_url` - e.g. `https://api.example.com/api`, no trailing slash.
    /// * `token`    - optional bearer token sent on every request.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, token))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /publish/status/{provider_reference_id}`.
    pub async fn get_status(&self, provider_reference_id: &str) -> Result<StatusResponse, ApiError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &["publish", "status", provider_reference_id],
            )?
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `GET /publish/logs?content_generation_id=..` or `?customer_id=..`.
    pub async fn list_logs(&self, scope: LogScope) -> Result<Vec<PublishLogEntry>, ApiError> {
        let (param, value) = scope.query_pair();
        let response = self
            .request(reqwest::Method::GET, &["publish", "logs"])?
            .query(&[(param, value)])
            .send()
            .await?;

        let envelope: DataEnvelope<Vec<PublishLogEntry>> = Self::parse_response(response).await?;
        Ok(envelope.data)
    }

    /// `GET /publish/logs/latest` for one (entity, platform, post type).
    pub async fn latest_log(&self, key: &JobKey) -> Result<Option<PublishLogEntry>, ApiError> {
        let response = self
            .request(reqwest::Method::GET, &["publish", "logs", "latest"])?
            .query(&[
                ("content_generation_id", key.entity_id.to_string()),
                ("platform", key.platform.clone()),
                ("post_type", key.post_type.clone()),
            ])
            .send()
            .await?;

        let envelope: DataEnvelope<Option<PublishLogEntry>> =
            Self::parse_response(response).await?;
        Ok(envelope.data)
    }

    /// `PUT /content-generations/{id}` with the render-status fields.
    pub async fn update_content_generation(
        &self,
        content_generation_id: DbId,
        patch: &ContentGenerationPatch,
    ) -> Result<(), ApiError> {
        let id = content_generation_id.to_string();
        let response = self
            .request(reqwest::Method::PUT, &["content-generations", &id])?
            .json(patch)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// `PUT /publish/logs/{id}` with the resolved submission fields.
    pub async fn update_publish_log(
        &self,
        log_id: DbId,
        patch: &PublishLogPatch,
    ) -> Result<(), ApiError> {
        let id = log_id.to_string();
        let response = self
            .request(reqwest::Method::PUT, &["publish", "logs", &id])?
            .json(patch)
            .send()
            .await?;

        Self::check_status(response).await
    }

    // ---- private helpers ----

    /// Build a request for `base_url` plus `segments`. Each segment is
    /// percent-encoded, so a `/`, `?` or `#` inside a reference stays part
    /// of that segment.
    fn request(
        &self,
        method: reqwest::Method,
        segments: &[&str],
    ) -> Result<reqwest::RequestBuilder, ApiError> {
        let url = self.endpoint(segments)?;
        let builder = self.client.request(method, url);
        Ok(match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, ApiError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Return the response unchanged on success, or an
    /// [`ApiError::Status`] with the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}
