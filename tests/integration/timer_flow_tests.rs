//! Integration tests for periodic ticks, the session deadline, and delay
//! detection, driven by the paused Tokio clock.

use std::time::Duration;

use pipeline_progress::models::error::ErrorKind;
use pipeline_progress::models::session::SessionStatus;
use pipeline_progress::models::stage::Stage;
use pipeline_progress::{CancelOutcome, ProgressEvent, TrackerConfig};

use super::test_helpers::{drain, timed_manager};

fn config(timeout_ms: u64) -> TrackerConfig {
    TrackerConfig {
        tick_interval_ms: 100,
        session_timeout_ms: timeout_ms,
        sample_memory: false,
        ..TrackerConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn ticks_refresh_elapsed_time() {
    let manager = timed_manager(config(60_000));
    manager.start_session("t1", None);
    let mut rx = manager.subscribe();

    tokio::time::sleep(Duration::from_millis(1_050)).await;

    let ticks = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, ProgressEvent::Progress(_)))
        .count();
    assert_eq!(ticks, 10);

    let progress = manager.get_session("t1").unwrap().progress;
    assert_eq!(progress.elapsed_time_ms, 1_000);
    assert_eq!(progress.current_stage, Stage::Idle);
    assert_eq!(progress.remaining_time_ms, 14_000, "no progress yet, full estimate remains");
    assert!(!progress.delayed);
}

#[tokio::test(start_paused = true)]
async fn deadline_fails_session_with_timeout() {
    let manager = timed_manager(TrackerConfig::default());
    manager.start_session("t2", None);
    manager.update_stage("t2", Stage::Uploading, 50.0);

    tokio::time::sleep(Duration::from_secs(16)).await;

    let session = manager.get_session("t2").unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.current_stage(), Stage::Error);
    assert_eq!(session.errors.len(), 1);
    assert_eq!(session.errors[0].error.kind, ErrorKind::Timeout);
    assert_eq!(session.errors[0].error.code, "TIMEOUT");
    assert_eq!(session.errors[0].stage, Stage::Uploading);
    assert_eq!(session.metrics.total_time_ms, Some(15_000));
}

#[tokio::test(start_paused = true)]
async fn finished_sessions_never_time_out() {
    let manager = timed_manager(config(2_000));
    manager.start_session("t3", None);
    for stage in Stage::PIPELINE.iter().skip(1) {
        manager.update_stage("t3", *stage, 100.0);
    }
    let mut rx = manager.subscribe();

    tokio::time::sleep(Duration::from_secs(10)).await;

    let session = manager.get_session("t3").unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.errors.is_empty());
    assert!(drain(&mut rx).is_empty(), "no ticks after completion");
}

#[tokio::test(start_paused = true)]
async fn cancelled_session_stops_ticking() {
    let manager = timed_manager(config(60_000));
    manager.start_session("t4", None);
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(manager.cancel_session("t4"), CancelOutcome::Cancelled);
    let mut rx = manager.subscribe();

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_session_is_flagged_delayed_once() {
    let manager = timed_manager(config(60_000));
    let mut rx = manager.subscribe();
    manager.start_session("t5", None);

    // 14 s estimate at 1.5x tolerance: late after 21 s.
    tokio::time::sleep(Duration::from_millis(20_950)).await;
    assert!(!manager.get_session("t5").unwrap().progress.delayed);

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let session = manager.get_session("t5").unwrap();
    assert!(session.progress.delayed);
    assert!(session.is_active(), "delay is reported, not enforced");

    let delayed: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            ProgressEvent::Delayed {
                elapsed_ms,
                estimated_ms,
                ..
            } => Some((elapsed_ms, estimated_ms)),
            _ => None,
        })
        .collect();
    assert_eq!(delayed, vec![(21_100, 14_000)]);
}

#[tokio::test(start_paused = true)]
async fn restart_rearms_deadline() {
    let manager = timed_manager(config(5_000));
    manager.start_session("t6", None);
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(manager.get_session("t6").unwrap().status, SessionStatus::Failed);

    manager.restart_session("t6").expect("restart");
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(manager.get_session("t6").unwrap().is_active());

    tokio::time::sleep(Duration::from_secs(3)).await;
    let session = manager.get_session("t6").unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.errors.len(), 2);
}

#[cfg(target_os = "linux")]
#[tokio::test(start_paused = true)]
async fn ticks_sample_process_memory() {
    let manager = timed_manager(TrackerConfig {
        tick_interval_ms: 100,
        session_timeout_ms: 60_000,
        ..TrackerConfig::default()
    });
    manager.start_session("t7", None);

    tokio::time::sleep(Duration::from_millis(350)).await;

    let metrics = manager.get_session("t7").unwrap().metrics;
    let current = metrics.memory_usage_bytes.expect("memory sampled");
    assert!(current > 0);
    assert!(metrics.peak_memory_bytes.expect("peak tracked") >= current);
}
