//! Closed status vocabulary for tracked jobs.
//!
//! Providers answer with free-form status text. Every call site reasons
//! about the same three outcomes by routing that text through
//! [`normalize`], which is total: unknown input maps to
//! [`JobStatus::Queued`].

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

/// Provider words meaning the unit of work finished successfully.
pub const POSTED_WORDS: &[&str] = &["success", "published", "complete", "completed", "posted"];

/// Provider words meaning the unit of work failed.
pub const FAILED_WORDS: &[&str] = &["fail", "failed", "error"];

/// Raw status recorded when a probe was inconclusive.
pub const RAW_STATUS_ERROR: &str = "error";

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Effective state of a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Posted,
    Failed,
}

impl JobStatus {
    /// `posted` and `failed` are terminal; nothing follows them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Posted | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Posted => "posted",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map free-form provider text onto the closed vocabulary.
///
/// Case-insensitive, ignores surrounding whitespace. Anything outside the
/// known words, including the empty string, is `Queued`.
pub fn normalize(raw: &str) -> JobStatus {
    let word = raw.trim().to_ascii_lowercase();
    if POSTED_WORDS.contains(&word.as_str()) {
        JobStatus::Posted
    } else if FAILED_WORDS.contains(&word.as_str()) {
        JobStatus::Failed
    } else {
        JobStatus::Queued
    }
}

/// Normalize an optional log field, treating blank text as absent.
///
/// Used for `final_status`, where `None` and `""` both mean "no override".
pub fn normalize_override(raw: Option<&str>) -> Option<JobStatus> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(normalize)
}

// ---------------------------------------------------------------------------
// JobKind
// ---------------------------------------------------------------------------

/// What kind of remote work a tracked job observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    VideoRender,
    PublishSubmission,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VideoRender => "video_render",
            Self::PublishSubmission => "publish_submission",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
