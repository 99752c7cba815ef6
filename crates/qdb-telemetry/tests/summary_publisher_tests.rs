//! Summary publisher integration tests.
//!
//! The publisher is exercised both over a real TCP connection (capturing
//! the newline-delimited JSON the visualizer would receive) and through an
//! in-memory sink to pin down the trigger semantics.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

use qdb_telemetry::{
    OwnedBatch, Stats, StatsConfig, SummarySink, SummarySinkError, TimelineSummary,
};

// ============================================================================
// Test helpers
// ============================================================================

fn base_config() -> StatsConfig {
    StatsConfig::new()
        .with_monitor_interval(Duration::from_secs(60))
        .with_global_interval(Duration::from_secs(60))
        .with_summary_poll_interval(Duration::from_millis(50))
}

/// Sink capturing summaries on a channel instead of a socket.
struct ChannelSink {
    tx: mpsc::UnboundedSender<TimelineSummary>,
}

impl SummarySink for ChannelSink {
    async fn send(&mut self, summary: &TimelineSummary) -> Result<(), SummarySinkError> {
        self.tx.send(summary.clone()).map_err(|_| {
            SummarySinkError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "capture channel closed",
            ))
        })
    }
}

fn channel_sink() -> (ChannelSink, mpsc::UnboundedReceiver<TimelineSummary>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink { tx }, rx)
}

/// Drive one full transaction through the facade.
fn run_transaction(stats: &Stats, seq: u64) {
    let batch = OwnedBatch::new(
        seq,
        vec!["SET".into(), "DEL".into()],
        vec!["k1".into(), "k2".into()],
        vec!["v1".into(), String::new()],
    );
    stats.record_transaction(&batch);
    stats.record_state_time("request_pre_prepare");
    for _ in 0..3 {
        stats.inc_prepare();
        stats.record_state_time("prepare");
    }
    for _ in 0..2 {
        stats.inc_commit();
        stats.record_state_time("commit");
    }
    stats.record_state_time("execution");
}

// ============================================================================
// TCP push path
// ============================================================================

#[tokio::test]
async fn summary_is_pushed_as_json_line_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let mut stats = Stats::spawn(base_config().with_visual_addr(addr));
    stats.set_props(1, "127.0.0.1", 7001);
    stats.set_primary_id(1);
    run_transaction(&stats, 42);

    let (socket, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("publisher connected")
        .expect("accept");
    let mut lines = BufReader::new(socket).lines();
    let line = timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("line arrived")
        .expect("read")
        .expect("stream open");

    let summary: TimelineSummary = serde_json::from_str(&line).expect("valid JSON");
    assert_eq!(summary.replica_id, 1);
    assert_eq!(summary.primary_id, 1);
    assert_eq!(summary.txn_number, 42);
    assert_eq!(summary.txn_command, vec!["SET".to_string(), "DEL".to_string()]);
    assert_eq!(summary.txn_command.len(), summary.txn_key.len());
    assert_eq!(summary.txn_key.len(), summary.txn_value.len());
    assert_eq!(summary.prepare_message_times_us.len(), 3);
    assert_eq!(summary.commit_message_times_us.len(), 2);
    assert!(summary.execution_time_us.is_some());

    // Firing reset the tracked timeline for the next transaction.
    let after = stats.timeline().snapshot();
    assert_eq!(after.txn_number, 0);
    assert!(after.txn_command.is_empty());
    assert!(after.request_pre_prepare_time_us.is_none());
    assert!(after.prepare_message_times_us.is_empty());
    assert_eq!(after.replica_id, 1, "identity persists across firings");

    stats.stop().await;
}

#[tokio::test]
async fn consecutive_transactions_produce_consecutive_summaries() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let mut stats = Stats::spawn(base_config().with_visual_addr(addr));
    stats.set_props(2, "127.0.0.1", 7002);
    run_transaction(&stats, 100);

    let (socket, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("publisher connected")
        .expect("accept");
    let mut lines = BufReader::new(socket).lines();
    let first = timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("first line")
        .expect("read")
        .expect("stream open");
    let first: TimelineSummary = serde_json::from_str(&first).expect("valid JSON");
    assert_eq!(first.txn_number, 100);

    run_transaction(&stats, 101);
    let second = timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("second line")
        .expect("read")
        .expect("stream open");
    let second: TimelineSummary = serde_json::from_str(&second).expect("valid JSON");
    assert_eq!(second.txn_number, 101);

    stats.stop().await;
}

#[tokio::test]
async fn unreachable_visualizer_does_not_break_telemetry() {
    // Bind then drop a listener so the port is very likely closed.
    let closed_addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        listener.local_addr().expect("local addr")
    };

    let mut stats = Stats::spawn(base_config().with_visual_addr(closed_addr));
    run_transaction(&stats, 7);

    // Give the publisher time to attempt (and fail) the push.
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Counters keep working and shutdown stays clean.
    stats.inc_propose();
    assert_eq!(stats.metrics().phase().propose_total(), 1);
    stats.stop().await;
}

// ============================================================================
// Trigger semantics via the in-memory sink
// ============================================================================

#[tokio::test]
async fn publisher_waits_for_threshold() {
    let (sink, mut rx) = channel_sink();
    let mut stats = Stats::spawn_with_sink(base_config().with_summary_threshold(5), sink);

    stats.inc_prepare();
    stats.inc_commit();

    // Below threshold: several poll cycles pass without a summary.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(rx.try_recv().is_err(), "fired below threshold");

    stats.inc_prepare();
    stats.inc_prepare();
    stats.inc_commit();

    let summary = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("fired once threshold reached")
        .expect("channel open");
    assert_eq!(summary.txn_number, 0, "no transaction was recorded");

    stats.stop().await;
}

#[tokio::test]
async fn each_firing_rebases_the_baselines() {
    let (sink, mut rx) = channel_sink();
    let mut stats = Stats::spawn_with_sink(base_config().with_summary_threshold(2), sink);

    stats.inc_prepare();
    stats.inc_commit();
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("first firing")
        .expect("channel open");

    // No further progress: no further summaries.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(rx.try_recv().is_err(), "fired without new progress");

    stats.inc_prepare();
    stats.inc_prepare();
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("second firing")
        .expect("channel open");

    stats.stop().await;
}
