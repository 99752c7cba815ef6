//! Progress-gated summary publisher.
//!
//! The publisher watches the prepare/commit counters and, once enough votes
//! have accumulated since its last firing, takes an exclusive snapshot of
//! the transaction timeline, serializes it to JSON, and pushes it to the
//! visualizer over a persistent outbound connection. The timeline is reset
//! as part of the snapshot, so the next tracked transaction starts clean.
//!
//! Push failures are non-fatal: the error is logged and the publisher keeps
//! running, reconnecting on the next trigger. Telemetry export must never
//! stall or abort the protocol path.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::metrics::ReplicaMetrics;
use crate::timeline::{TimelineSummary, TimelineTracker};

// ============================================================================
// SummarySink trait
// ============================================================================

/// Outbound sink for serialized timeline summaries.
///
/// The publisher is generic over the sink so the socket transport can be
/// swapped for an in-memory capture in tests without touching the trigger
/// logic.
pub trait SummarySink: Send + 'static {
    /// Deliver one summary document.
    fn send(
        &mut self,
        summary: &TimelineSummary,
    ) -> impl Future<Output = Result<(), SummarySinkError>> + Send;
}

/// Errors from a summary sink.
#[derive(Debug, thiserror::Error)]
pub enum SummarySinkError {
    /// Failed to establish the visualizer connection.
    #[error("connect to visualizer {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },
    /// The summary could not be serialized.
    #[error("serialize summary: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The connection dropped mid-write.
    #[error("write summary: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// TcpSummarySink - persistent visualizer connection
// ============================================================================

/// Persistent TCP connection to the visualizer, sending one JSON document
/// per line. Connects lazily on the first send and reconnects after any
/// failure.
#[derive(Debug)]
pub struct TcpSummarySink {
    addr: SocketAddr,
    stream: Option<TcpStream>,
}

impl TcpSummarySink {
    /// Create a sink towards `addr`. No connection is opened until the
    /// first send.
    pub fn new(addr: SocketAddr) -> Self {
        TcpSummarySink { addr, stream: None }
    }
}

impl SummarySink for TcpSummarySink {
    async fn send(&mut self, summary: &TimelineSummary) -> Result<(), SummarySinkError> {
        let mut frame = serde_json::to_vec(summary)?;
        frame.push(b'\n');

        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => {
                let stream = TcpStream::connect(self.addr).await.map_err(|source| {
                    SummarySinkError::Connect {
                        addr: self.addr,
                        source,
                    }
                })?;
                debug!(addr = %self.addr, "connected to visualizer");
                stream
            }
        };

        let result = async {
            stream.write_all(&frame).await?;
            stream.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                // Keep the connection for the next push.
                self.stream = Some(stream);
                Ok(())
            }
            // The dropped stream forces a reconnect on the next send.
            Err(e) => Err(SummarySinkError::Io(e)),
        }
    }
}

// ============================================================================
// Trigger logic
// ============================================================================

/// Prepare/commit baselines deciding when a summary fires.
///
/// `check` compares the current counter values against the baselines taken
/// at the previous firing; once the combined delta reaches the threshold it
/// rebases and reports true. Deltas saturate at zero across counter
/// wraparound.
#[derive(Debug, Clone, Copy)]
pub struct SummaryTrigger {
    threshold: u64,
    prev_prepare: u64,
    prev_commit: u64,
}

impl SummaryTrigger {
    /// Create a trigger with the given threshold and starting baselines.
    pub fn new(threshold: u64, prepare: u64, commit: u64) -> Self {
        SummaryTrigger {
            threshold: threshold.max(1),
            prev_prepare: prepare,
            prev_commit: commit,
        }
    }

    /// Report whether enough progress accumulated; rebases on fire.
    pub fn check(&mut self, prepare: u64, commit: u64) -> bool {
        let delta =
            prepare.saturating_sub(self.prev_prepare) + commit.saturating_sub(self.prev_commit);
        if delta >= self.threshold {
            self.prev_prepare = prepare;
            self.prev_commit = commit;
            true
        } else {
            false
        }
    }
}

// ============================================================================
// Publisher task
// ============================================================================

/// Spawn the summary publisher over the given sink.
pub(crate) fn spawn_summary_publisher<S: SummarySink>(
    metrics: Arc<ReplicaMetrics>,
    timeline: Arc<TimelineTracker>,
    sink: S,
    poll_interval: Duration,
    threshold: u64,
    shutdown: watch::Receiver<()>,
) -> JoinHandle<()> {
    // Baselines are taken here, not inside the task, so protocol progress
    // between spawn and the task's first poll is not missed.
    let trigger = SummaryTrigger::new(
        threshold,
        metrics.phase().prepare_total(),
        metrics.phase().commit_total(),
    );
    tokio::spawn(run_summary_publisher(
        metrics,
        timeline,
        sink,
        poll_interval,
        trigger,
        shutdown,
    ))
}

async fn run_summary_publisher<S: SummarySink>(
    metrics: Arc<ReplicaMetrics>,
    timeline: Arc<TimelineTracker>,
    mut sink: S,
    poll_interval: Duration,
    mut trigger: SummaryTrigger,
    mut shutdown: watch::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let prepare = metrics.phase().prepare_total();
                let commit = metrics.phase().commit_total();
                if !trigger.check(prepare, commit) {
                    continue;
                }

                let summary = timeline.take_summary();
                match sink.send(&summary).await {
                    Ok(()) => {
                        debug!(txn = summary.txn_number, "summary pushed");
                    }
                    Err(e) => {
                        // Non-fatal: the timeline was already consumed, so
                        // the next transaction's progress re-triggers.
                        warn!(error = %e, "summary push failed");
                    }
                }
            }
            _ = shutdown.changed() => {
                debug!("summary publisher shutting down");
                break;
            }
        }
    }
}
