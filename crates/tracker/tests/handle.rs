//! The running engine behind a [`TrackerHandle`], with tokio's clock
//! paused so interval ticks are deterministic.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use tokio::sync::broadcast::error::TryRecvError;

use jobwatch_client::models::LogScope;
use jobwatch_client::BackendApi;
use jobwatch_core::job::{JobKey, JobPhase};
use jobwatch_core::status::JobKind;
use jobwatch_events::EventBus;
use jobwatch_tracker::TrackerHandle;

use common::{log_row, FakeBackend, TokioClock};

fn start(backend: &Arc<FakeBackend>, scope: Option<LogScope>) -> TrackerHandle {
    TrackerHandle::start_with(
        Arc::clone(backend) as Arc<dyn BackendApi>,
        Arc::new(EventBus::default()),
        Arc::new(TokioClock::new()),
        common::config(),
        scope,
    )
}

/// Let the coordinator run for `d` of paused time.
async fn run_for(d: Duration) {
    tokio::time::sleep(d).await;
}

#[tokio::test(start_paused = true)]
async fn loop_probes_due_job_and_reports_completion() {
    let backend = FakeBackend::new();
    let handle = start(&backend, None);
    let mut events = handle.subscribe();
    let key = JobKey::render(1);

    handle
        .track(key.clone(), JobKind::VideoRender, Some("vid_1".into()))
        .await
        .unwrap();
    backend.answer("vid_1", "complete", Some("https://cdn/1.mp4"));

    run_for(Duration::from_millis(4_500)).await;
    assert_eq!(backend.status_call_count(), 0);

    run_for(Duration::from_secs(2)).await;
    assert_eq!(backend.status_call_count(), 1);

    let snapshot = handle.get(&key).await.unwrap();
    assert_eq!(snapshot.phase, JobPhase::Posted);
    assert_eq!(events.recv().await.unwrap().message, "Video ready");

    run_for(Duration::from_secs(60)).await;
    assert_eq!(backend.status_call_count(), 1);
    assert_eq!(backend.content_writes.lock().unwrap().len(), 1);

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn slow_write_back_leaves_loop_responsive() {
    let backend = FakeBackend::new();
    backend.delay_writes(Duration::from_secs(15));
    backend.answer("vid_1", "complete", None);
    let handle = start(&backend, None);
    let mut events = handle.subscribe();

    handle
        .track(JobKey::render(1), JobKind::VideoRender, Some("vid_1".into()))
        .await
        .unwrap();
    run_for(Duration::from_millis(5_500)).await;
    assert_eq!(events.recv().await.unwrap().message, "Video ready");
    assert_eq!(backend.content_writes.lock().unwrap().len(), 1);

    let started = tokio::time::Instant::now();
    handle
        .track(JobKey::render(2), JobKind::VideoRender, Some("vid_2".into()))
        .await
        .unwrap();
    handle.refresh().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));

    // The other job keeps its schedule while the write is outstanding.
    run_for(Duration::from_secs(6)).await;
    assert_eq!(backend.status_calls.lock().unwrap().as_slice(), ["vid_1", "vid_2"]);

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn hidden_view_skips_ticks_and_checks_once_on_return() {
    let backend = FakeBackend::new();
    let handle = start(&backend, None);
    let key = JobKey::new(2, "tiktok", "video");

    handle
        .track(key.clone(), JobKind::PublishSubmission, Some("sub_2".into()))
        .await
        .unwrap();
    handle.set_visible(false);

    run_for(Duration::from_secs(20)).await;
    assert_eq!(backend.status_call_count(), 0);

    handle.set_visible(true);
    run_for(Duration::from_millis(10)).await;
    assert_eq!(backend.status_call_count(), 1);

    // The job was rescheduled by the immediate check; no second probe yet.
    run_for(Duration::from_secs(4)).await;
    assert_eq!(backend.status_call_count(), 1);

    let snapshot = handle.get(&key).await.unwrap();
    assert_eq!(snapshot.phase, JobPhase::Queued);
    assert_eq!(snapshot.job.attempts, 1);

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn hidden_view_skips_sweeps_and_sweeps_on_return() {
    let backend = FakeBackend::new();
    let handle = start(&backend, Some(LogScope::Customer(9)));

    // The first sweep fires on start.
    run_for(Duration::from_millis(10)).await;
    assert_eq!(backend.list_calls.lock().unwrap().len(), 1);

    handle.set_visible(false);
    run_for(Duration::from_secs(95)).await;
    assert_eq!(backend.list_calls.lock().unwrap().len(), 1);

    handle.set_visible(true);
    run_for(Duration::from_millis(10)).await;
    assert_eq!(backend.list_calls.lock().unwrap().len(), 2);

    run_for(Duration::from_secs(31)).await;
    assert_eq!(backend.list_calls.lock().unwrap().len(), 3);

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn refresh_sweeps_immediately() {
    let backend = FakeBackend::new();
    let handle = start(&backend, Some(LogScope::ContentGeneration(4)));
    let mut events = handle.subscribe();
    run_for(Duration::from_millis(10)).await;

    let key = JobKey::new(4, "youtube", "video");
    handle
        .track(key.clone(), JobKind::PublishSubmission, Some("sub_4".into()))
        .await
        .unwrap();
    backend.set_logs(vec![log_row(40, 4, "youtube", Some("posted"), Some("sub_4"))]);

    handle.refresh().await.unwrap();

    let snapshot = handle.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].phase, JobPhase::Posted);
    assert_eq!(snapshot[0].job.log_id, Some(40));
    assert_eq!(events.try_recv().unwrap().message, "Published to youtube");
    assert_eq!(backend.status_call_count(), 0);

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn untrack_and_retrigger_through_handle() {
    let backend = FakeBackend::new();
    let handle = start(&backend, None);
    let mut events = handle.subscribe();
    let key = JobKey::render(8);

    handle
        .track(key.clone(), JobKind::VideoRender, Some("vid_8".into()))
        .await
        .unwrap();
    handle.retrigger(key.clone()).await.unwrap();
    assert_eq!(handle.get(&key).await.unwrap().phase, JobPhase::Queued);

    handle.untrack(key.clone()).await.unwrap();
    assert!(handle.snapshot().await.is_empty());

    run_for(Duration::from_secs(30)).await;
    assert_eq!(backend.status_call_count(), 0);
    assert_matches!(events.try_recv(), Err(TryRecvError::Empty));

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn handles_keep_independent_stores() {
    let backend = FakeBackend::new();
    let admin = start(&backend, None);
    let customer = start(&backend, None);

    admin
        .track(JobKey::render(3), JobKind::VideoRender, Some("vid_3".into()))
        .await
        .unwrap();

    assert_eq!(admin.snapshot().await.len(), 1);
    assert!(customer.snapshot().await.is_empty());

    admin.stop().await.unwrap();
    customer.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn dropped_handle_stops_polling() {
    let backend = FakeBackend::new();
    let handle = start(&backend, None);
    handle
        .track(JobKey::render(5), JobKind::VideoRender, Some("vid_5".into()))
        .await
        .unwrap();
    drop(handle);

    run_for(Duration::from_secs(30)).await;
    assert_eq!(backend.status_call_count(), 0);
}
