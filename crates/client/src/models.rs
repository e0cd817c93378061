//! Wire models for the backend endpoints.

use jobwatch_core::job::JobKey;
use jobwatch_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};

/// Response of `GET /publish/status/{providerReferenceId}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    /// Free-form provider text; normalized by the caller.
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "publicUrl", alias = "public_url")]
    pub public_url: Option<String>,
}

/// One row of the backend-owned publish log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishLogEntry {
    pub id: DbId,
    pub content_generation_id: DbId,
    pub platform: String,
    pub post_type: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub final_status: Option<String>,
    #[serde(default)]
    pub posted_on: Option<Timestamp>,
    #[serde(default)]
    pub provider_post_id: Option<String>,
    #[serde(default)]
    pub public_url: Option<String>,
}

impl PublishLogEntry {
    /// The tracked-job key this row belongs to.
    pub fn key(&self) -> JobKey {
        JobKey::new(self.content_generation_id, &self.platform, &self.post_type)
    }
}

/// `{ "data": ... }` envelope used by the log endpoints.
#[derive(Debug, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

/// Which slice of the publish log a coarse sweep re-fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogScope {
    ContentGeneration(DbId),
    Customer(DbId),
}

impl LogScope {
    /// Query parameter selecting this scope on `GET /publish/logs`.
    pub fn query_pair(self) -> (&'static str, String) {
        match self {
            Self::ContentGeneration(id) => ("content_generation_id", id.to_string()),
            Self::Customer(id) => ("customer_id", id.to_string()),
        }
    }
}

/// Partial body for `PUT /content-generations/{id}`.
///
/// Only the render-status fields; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContentGenerationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blotato_video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blotato_video_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blotato_video_checked_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

/// Partial body for `PUT /publish/logs/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PublishLogPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posted_on: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<Timestamp>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_response_accepts_camel_and_snake_url() {
        let camel: StatusResponse =
            serde_json::from_str(r#"{"status":"published","publicUrl":"https://x/y"}"#).unwrap();
        assert_eq!(camel.public_url.as_deref(), Some("https://x/y"));

        let snake: StatusResponse =
            serde_json::from_str(r#"{"status":"queued","public_url":"https://a/b"}"#).unwrap();
        assert_eq!(snake.public_url.as_deref(), Some("https://a/b"));
    }

    #[test]
    fn status_response_tolerates_missing_status() {
        let resp: StatusResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(resp.status, "");
        assert!(resp.public_url.is_none());
    }

    #[test]
    fn log_entry_with_nulls() {
        let entry: PublishLogEntry = serde_json::from_str(
            r#"{"id":1,"content_generation_id":9,"platform":"tiktok","post_type":"video",
                "status":"queued","final_status":null,"posted_on":null}"#,
        )
        .unwrap();
        assert_eq!(entry.key(), JobKey::new(9, "tiktok", "video"));
        assert!(entry.final_status.is_none());
        assert!(entry.provider_post_id.is_none());
    }

    #[test]
    fn patch_skips_absent_fields() {
        let patch = ContentGenerationPatch {
            blotato_video_status: Some("posted".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({"blotato_video_status": "posted"}));
    }

    #[test]
    fn scope_query_pairs() {
        assert_eq!(
            LogScope::ContentGeneration(4).query_pair(),
            ("content_generation_id", "4".to_string())
        );
        assert_eq!(LogScope::Customer(8).query_pair(), ("customer_id", "8".to_string()));
    }
}
