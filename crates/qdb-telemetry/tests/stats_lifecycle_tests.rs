//! Lifecycle tests for the `Stats` context.
//!
//! Shutdown must be prompt, idempotent, and final: once `stop()` returns,
//! neither the background tasks nor late protocol callers mutate anything.

use std::time::{Duration, Instant};

use qdb_telemetry::{Stats, StatsConfig};

fn short_config() -> StatsConfig {
    StatsConfig::new()
        .with_monitor_interval(Duration::from_millis(100))
        .with_global_interval(Duration::from_millis(100))
}

#[tokio::test]
async fn stop_joins_all_tasks_within_bounded_time() {
    let mut stats = Stats::spawn(short_config());
    tokio::time::sleep(Duration::from_millis(250)).await;

    let started = Instant::now();
    stats.stop().await;
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "stop took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn stop_is_idempotent() {
    let mut stats = Stats::spawn(short_config());
    stats.stop().await;
    stats.stop().await;
}

#[tokio::test]
async fn facade_calls_after_stop_are_no_ops() {
    let mut stats = Stats::spawn(short_config());
    stats.inc_propose();
    stats.add_latency(Duration::from_millis(1));
    stats.record_state_time("prepare");
    stats.stop().await;

    stats.inc_propose();
    stats.inc_prepare();
    stats.inc_total_request(10);
    stats.add_latency(Duration::from_millis(1));
    stats.record_state_time("prepare");
    stats.set_primary_id(9);

    let metrics = stats.metrics();
    assert_eq!(metrics.phase().propose_total(), 1);
    assert_eq!(metrics.phase().prepare_total(), 0);
    assert_eq!(metrics.load().total_request(), 0);
    assert_eq!(metrics.latency().call_total(), 1);

    let snap = stats.timeline().snapshot();
    assert_eq!(snap.prepare_message_times_us.len(), 1);
    assert_eq!(snap.primary_id, 0);
}

#[tokio::test]
async fn fault_injection_toggles_when_enabled() {
    let mut stats = Stats::spawn(short_config().with_fault_injection(Duration::from_millis(50)));
    assert!(!stats.is_faulty());

    // The first toggle flips the flag to faulty.
    let deadline = Instant::now() + Duration::from_secs(5);
    while !stats.is_faulty() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(stats.is_faulty(), "fault flag never flipped");

    stats.stop().await;
}

#[tokio::test]
async fn fault_injection_disabled_by_default() {
    let mut stats = Stats::spawn(short_config());
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(!stats.is_faulty());
    stats.stop().await;
}
