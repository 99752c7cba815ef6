//! Interval and global sampler tests.
//!
//! The samplers run on short cadences here; a feeder task keeps every
//! window non-idle so the gauges under test are never overwritten by an
//! idle window's zeros.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use qdb_telemetry::{Stats, StatsConfig};

#[tokio::test]
async fn sampler_reports_exact_mean_latency() {
    let mut stats = Stats::spawn(
        StatsConfig::new()
            .with_monitor_interval(Duration::from_millis(200))
            .with_global_interval(Duration::from_secs(60)),
    );

    // Feed calls of exactly 10ms recorded run time for the whole test, so
    // any window's mean is 10_000us regardless of where ticks fall.
    let running = Arc::new(AtomicBool::new(true));
    let feeder = {
        let metrics = stats.metrics().clone();
        let running = running.clone();
        tokio::spawn(async move {
            while running.load(Ordering::Relaxed) {
                for _ in 0..20 {
                    metrics.latency().add_latency(Duration::from_millis(10));
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    };

    // Let a few windows elapse.
    tokio::time::sleep(Duration::from_millis(700)).await;

    let gauges = stats.metrics().gauges();
    assert_eq!(gauges.txn_avg_latency_us(), 10_000);
    assert!(gauges.txn_throughput() > 0);

    running.store(false, Ordering::Relaxed);
    feeder.await.expect("feeder");
    stats.stop().await;
}

#[tokio::test]
async fn global_sampler_tracks_cluster_load_rate() {
    let mut stats = Stats::spawn(
        StatsConfig::new()
            .with_monitor_interval(Duration::from_secs(60))
            .with_global_interval(Duration::from_millis(200)),
    );

    let running = Arc::new(AtomicBool::new(true));
    let feeder = {
        let metrics = stats.metrics().clone();
        let running = running.clone();
        tokio::spawn(async move {
            while running.load(Ordering::Relaxed) {
                metrics.load().add_total_request(50);
                metrics.load().add_total_geo_request(10);
                metrics.load().inc_geo_request();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    };

    tokio::time::sleep(Duration::from_millis(700)).await;

    let gauges = stats.metrics().gauges();
    assert!(gauges.request_throughput() > 0);
    assert!(gauges.geo_request_throughput() > 0);

    running.store(false, Ordering::Relaxed);
    feeder.await.expect("feeder");
    stats.stop().await;
}

#[tokio::test]
async fn stop_does_not_wait_out_the_sampling_interval() {
    // Long cadences: a stop that waited for the next tick would take
    // minutes. The cancellable wait must return almost immediately.
    let mut stats = Stats::spawn(
        StatsConfig::new()
            .with_monitor_interval(Duration::from_secs(120))
            .with_global_interval(Duration::from_secs(120)),
    );

    let started = Instant::now();
    stats.stop().await;
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "stop took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn gauges_stay_zero_without_traffic() {
    let mut stats = Stats::spawn(
        StatsConfig::new()
            .with_monitor_interval(Duration::from_millis(100))
            .with_global_interval(Duration::from_millis(100)),
    );

    tokio::time::sleep(Duration::from_millis(350)).await;

    let gauges = stats.metrics().gauges();
    assert_eq!(gauges.txn_throughput(), 0);
    assert_eq!(gauges.txn_avg_latency_us(), 0);
    assert_eq!(gauges.request_throughput(), 0);
    assert_eq!(gauges.geo_request_throughput(), 0);

    stats.stop().await;
}
