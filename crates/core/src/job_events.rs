//! Event type names for job notifications.
//!
//! Subscribers of the event bus match on these instead of string literals.

/// A video render finished and the video is available.
pub const EVENT_VIDEO_READY: &str = "video.ready";

/// A video render failed.
pub const EVENT_VIDEO_FAILED: &str = "video.failed";

/// A publish submission went live on the target platform.
pub const EVENT_PUBLISH_POSTED: &str = "publish.posted";

/// A publish submission was rejected by the provider.
pub const EVENT_PUBLISH_FAILED: &str = "publish.failed";

/// Polling stopped without a terminal result.
pub const EVENT_POLLING_GAVE_UP: &str = "polling.gave_up";
