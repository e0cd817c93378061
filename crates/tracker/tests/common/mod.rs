#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::TimeZone;

use jobwatch_client::models::{
    ContentGenerationPatch, LogScope, PublishLogEntry, PublishLogPatch, StatusResponse,
};
use jobwatch_client::{ApiError, BackendApi};
use jobwatch_core::backoff::BackoffPolicy;
use jobwatch_core::job::JobKey;
use jobwatch_core::types::{DbId, Timestamp};
use jobwatch_tracker::clock::Clock;
use jobwatch_tracker::CoordinatorConfig;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Wall clock driven by tokio's (paused) time.
#[derive(Debug)]
pub struct TokioClock {
    base: Timestamp,
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            base: t0(),
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        let elapsed = tokio::time::Instant::now() - self.origin;
        self.base + chrono::Duration::from_std(elapsed).unwrap()
    }
}

/// Wall-clock time at which every test starts.
pub fn t0() -> Timestamp {
    chrono::Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap()
}

pub fn secs(n: i64) -> chrono::Duration {
    chrono::Duration::seconds(n)
}

// ---------------------------------------------------------------------------
// Fake backend
// ---------------------------------------------------------------------------

/// In-memory backend. Status answers are sticky per provider reference;
/// unknown references answer `"queued"`. Status calls and writes can be
/// slowed down to model a sluggish backend.
#[derive(Debug, Default)]
pub struct FakeBackend {
    statuses: Mutex<HashMap<String, Result<StatusResponse, u16>>>,
    logs: Mutex<Vec<PublishLogEntry>>,
    fail_writes: AtomicBool,
    status_delay: Mutex<Duration>,
    write_delay: Mutex<Duration>,
    pub status_calls: Mutex<Vec<String>>,
    pub list_calls: Mutex<Vec<LogScope>>,
    pub content_writes: Mutex<Vec<(DbId, ContentGenerationPatch)>>,
    pub log_writes: Mutex<Vec<(DbId, PublishLogPatch)>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn answer(&self, reference: &str, status: &str, public_url: Option<&str>) {
        self.statuses.lock().unwrap().insert(
            reference.to_string(),
            Ok(StatusResponse {
                status: status.to_string(),
                public_url: public_url.map(Into::into),
            }),
        );
    }

    pub fn fail_status(&self, reference: &str, code: u16) {
        self.statuses
            .lock()
            .unwrap()
            .insert(reference.to_string(), Err(code));
    }

    pub fn set_logs(&self, rows: Vec<PublishLogEntry>) {
        *self.logs.lock().unwrap() = rows;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn delay_status(&self, delay: Duration) {
        *self.status_delay.lock().unwrap() = delay;
    }

    pub fn delay_writes(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = delay;
    }

    pub fn status_call_count(&self) -> usize {
        self.status_calls.lock().unwrap().len()
    }

    async fn pause(delay: &Mutex<Duration>) {
        let delay = *delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    async fn write_result(&self) -> Result<(), ApiError> {
        Self::pause(&self.write_delay).await;
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(ApiError::Status {
                status: 500,
                body: "write rejected".into(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn get_status(&self, provider_reference_id: &str) -> Result<StatusResponse, ApiError> {
        self.status_calls
            .lock()
            .unwrap()
            .push(provider_reference_id.to_string());
        Self::pause(&self.status_delay).await;
        match self.statuses.lock().unwrap().get(provider_reference_id) {
            Some(Ok(resp)) => Ok(resp.clone()),
            Some(Err(code)) => Err(ApiError::Status {
                status: *code,
                body: "provider unavailable".into(),
            }),
            None => Ok(StatusResponse {
                status: "queued".into(),
                public_url: None,
            }),
        }
    }

    async fn list_logs(&self, scope: LogScope) -> Result<Vec<PublishLogEntry>, ApiError> {
        self.list_calls.lock().unwrap().push(scope);
        Ok(self.logs.lock().unwrap().clone())
    }

    async fn latest_log(&self, key: &JobKey) -> Result<Option<PublishLogEntry>, ApiError> {
        let logs = self.logs.lock().unwrap();
        Ok(logs.iter().rev().find(|row| &row.key() == key).cloned())
    }

    async fn update_content_generation(
        &self,
        content_generation_id: DbId,
        patch: &ContentGenerationPatch,
    ) -> Result<(), ApiError> {
        self.content_writes
            .lock()
            .unwrap()
            .push((content_generation_id, patch.clone()));
        self.write_result().await
    }

    async fn update_publish_log(
        &self,
        log_id: DbId,
        patch: &PublishLogPatch,
    ) -> Result<(), ApiError> {
        self.log_writes.lock().unwrap().push((log_id, patch.clone()));
        self.write_result().await
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Default timings with jitter disabled so delays are exact.
pub fn config() -> CoordinatorConfig {
    CoordinatorConfig {
        policy: BackoffPolicy {
            jitter_max: Duration::ZERO,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn log_row(
    id: DbId,
    content_generation_id: DbId,
    platform: &str,
    final_status: Option<&str>,
    provider_post_id: Option<&str>,
) -> PublishLogEntry {
    PublishLogEntry {
        id,
        content_generation_id,
        platform: platform.to_string(),
        post_type: "video".to_string(),
        status: Some("queued".to_string()),
        final_status: final_status.map(Into::into),
        posted_on: None,
        provider_post_id: provider_post_id.map(Into::into),
        public_url: None,
    }
}
