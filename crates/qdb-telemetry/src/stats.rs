//! Telemetry context: ownership and lifecycle of the whole subsystem.
//!
//! `Stats` is constructed exactly once at process start and handed
//! (Arc-shared or by reference) to the protocol layer; there is no lazy
//! global. It owns the counter registry, the transaction timeline, and
//! every background task, and tears them all down in `stop()`.
//!
//! Protocol call sites go through the facade methods below. They are
//! synchronous, non-blocking (the timeline ones take a short mutex, the
//! counter ones are single atomic adds), and become no-ops once `stop()`
//! has run, so a late caller during shutdown cannot crash or resurrect the
//! subsystem.
//!
//! # Usage
//!
//! ```ignore
//! use qdb_telemetry::{Stats, StatsConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut stats = Stats::spawn(StatsConfig::from_env());
//!     stats.set_props(1, "10.0.0.1", 7000);
//!
//!     // protocol handlers:
//!     stats.inc_propose();
//!     stats.record_state_time("prepare");
//!
//!     // at shutdown:
//!     stats.stop().await;
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::batch::BatchRecord;
use crate::config::StatsConfig;
use crate::metrics::ReplicaMetrics;
use crate::metrics_http::spawn_metrics_http_server;
use crate::sampler::{spawn_global_sampler, spawn_monitor_sampler};
use crate::summary::{spawn_summary_publisher, SummarySink, TcpSummarySink};
use crate::timeline::TimelineTracker;

/// Replica telemetry context.
///
/// Owns the counter registry, the timeline tracker, and the background
/// tasks (interval sampler, global sampler, summary publisher, metrics
/// endpoint, fault toggle). Construct with [`Stats::spawn`], tear down with
/// [`Stats::stop`].
#[derive(Debug)]
pub struct Stats {
    metrics: Arc<ReplicaMetrics>,
    timeline: Arc<TimelineTracker>,
    faulty: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

impl Stats {
    /// Build the registry and spawn the background tasks described by
    /// `config`. Must be called within a tokio runtime.
    ///
    /// The summary publisher runs only when `config.visual_addr` is set
    /// (pushing through a [`TcpSummarySink`]); the metrics endpoint only
    /// when `config.metrics_http_addr` is set.
    pub fn spawn(config: StatsConfig) -> Self {
        match config.visual_addr {
            Some(addr) => Self::spawn_inner(config, Some(TcpSummarySink::new(addr))),
            None => Self::spawn_inner(config, None::<TcpSummarySink>),
        }
    }

    /// Like [`Stats::spawn`], but publishes summaries through the provided
    /// sink regardless of `config.visual_addr`. This is the seam tests and
    /// non-TCP visualizer transports use.
    pub fn spawn_with_sink<S: SummarySink>(config: StatsConfig, sink: S) -> Self {
        Self::spawn_inner(config, Some(sink))
    }

    fn spawn_inner<S: SummarySink>(config: StatsConfig, sink: Option<S>) -> Self {
        let metrics = Arc::new(ReplicaMetrics::new());
        let timeline = Arc::new(TimelineTracker::new());
        let faulty = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let mut handles = Vec::new();
        handles.push(spawn_monitor_sampler(
            metrics.clone(),
            config.monitor_interval,
            shutdown_rx.clone(),
        ));
        handles.push(spawn_global_sampler(
            metrics.clone(),
            config.global_interval,
            shutdown_rx.clone(),
        ));

        if let Some(sink) = sink {
            handles.push(spawn_summary_publisher(
                metrics.clone(),
                timeline.clone(),
                sink,
                config.summary_poll_interval,
                config.summary_threshold,
                shutdown_rx.clone(),
            ));
        }

        if let Some(addr) = config.metrics_http_addr {
            handles.push(spawn_metrics_http_server(
                metrics.clone(),
                addr,
                shutdown_rx.clone(),
            ));
        }

        if config.fault_injection {
            handles.push(spawn_fault_toggle(
                faulty.clone(),
                config.fault_toggle_interval,
                shutdown_rx,
            ));
        }

        Stats {
            metrics,
            timeline,
            faulty,
            stopped: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            handles,
        }
    }

    /// Signal every background task and wait for all of them to exit.
    ///
    /// Idempotent; the second call returns immediately. After the first
    /// call returns, no task mutates the registry and the facade methods
    /// below are no-ops.
    pub async fn stop(&mut self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        debug!("telemetry stopped");
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// The shared counter registry (for export integrations and tests).
    pub fn metrics(&self) -> &Arc<ReplicaMetrics> {
        &self.metrics
    }

    /// The shared timeline tracker.
    pub fn timeline(&self) -> &Arc<TimelineTracker> {
        &self.timeline
    }

    /// Whether the fault-injection loop currently marks this replica
    /// faulty. Always false when fault injection is disabled.
    pub fn is_faulty(&self) -> bool {
        self.faulty.load(Ordering::Relaxed)
    }

    // ========================================================================
    // Intake facade
    // ========================================================================

    /// Count one client call.
    pub fn inc_client_call(&self) {
        if !self.is_stopped() {
            self.metrics.intake().inc_client_call();
        }
    }

    /// Count one client request.
    pub fn inc_client_request(&self) {
        if !self.is_stopped() {
            self.metrics.intake().inc_client_request();
        }
    }

    /// Count one raw socket receive.
    pub fn inc_socket_recv(&self) {
        if !self.is_stopped() {
            self.metrics.intake().inc_socket_recv();
        }
    }

    /// Count one network-in to worker handoff.
    pub fn server_call(&self) {
        if !self.is_stopped() {
            self.metrics.intake().inc_server_call();
        }
    }

    /// Count one worker-side message process.
    pub fn server_process(&self) {
        if !self.is_stopped() {
            self.metrics.intake().inc_server_process();
        }
    }

    // ========================================================================
    // Phase facade
    // ========================================================================

    /// Count one proposal handled.
    pub fn inc_propose(&self) {
        if !self.is_stopped() {
            self.metrics.phase().inc_propose();
        }
    }

    /// Count one prepare vote accepted.
    pub fn inc_prepare(&self) {
        if !self.is_stopped() {
            self.metrics.phase().inc_prepare();
        }
    }

    /// Count one commit vote accepted.
    pub fn inc_commit(&self) {
        if !self.is_stopped() {
            self.metrics.phase().inc_commit();
        }
    }

    /// Count one transaction queued for execution.
    pub fn inc_pending_execute(&self) {
        if !self.is_stopped() {
            self.metrics.phase().inc_pending_execute();
        }
    }

    /// Count one transaction entering execution.
    pub fn inc_execute(&self) {
        if !self.is_stopped() {
            self.metrics.phase().inc_execute();
        }
    }

    /// Count one transaction fully applied.
    pub fn inc_execute_done(&self) {
        if !self.is_stopped() {
            self.metrics.phase().inc_execute_done();
        }
    }

    // ========================================================================
    // Broadcast / fault facade
    // ========================================================================

    /// Count one broadcast message handled.
    pub fn broadcast_msg(&self) {
        if !self.is_stopped() {
            self.metrics.broadcast().inc_broadcast_msg();
        }
    }

    /// Count `num` broadcast messages sent.
    pub fn send_broadcast_msg(&self, num: u64) {
        if !self.is_stopped() {
            self.metrics.broadcast().add_send_broadcast_msg(num);
        }
    }

    /// Count one per-replica broadcast send.
    pub fn send_broadcast_msg_per_replica(&self) {
        if !self.is_stopped() {
            self.metrics.broadcast().inc_send_broadcast_msg_per_replica();
        }
    }

    /// Count one sequence assignment failure.
    pub fn seq_fail(&self) {
        if !self.is_stopped() {
            self.metrics.broadcast().inc_seq_fail();
        }
    }

    /// Accumulate a sequence gap magnitude.
    pub fn seq_gap(&self, gap: u64) {
        if !self.is_stopped() {
            self.metrics.broadcast().add_seq_gap(gap);
        }
    }

    // ========================================================================
    // Load facade
    // ========================================================================

    /// Add `num` requests to the cluster-wide total.
    pub fn inc_total_request(&self, num: u64) {
        if !self.is_stopped() {
            self.metrics.load().add_total_request(num);
        }
    }

    /// Add `num` requests to the geo-distributed total.
    pub fn inc_total_geo_request(&self, num: u64) {
        if !self.is_stopped() {
            self.metrics.load().add_total_geo_request(num);
        }
    }

    /// Count one geo request.
    pub fn inc_geo_request(&self) {
        if !self.is_stopped() {
            self.metrics.load().inc_geo_request();
        }
    }

    // ========================================================================
    // Latency facade
    // ========================================================================

    /// Record one completed call and its run time.
    pub fn add_latency(&self, run_time: Duration) {
        if !self.is_stopped() {
            self.metrics.latency().add_latency(run_time);
        }
    }

    // ========================================================================
    // Timeline facade
    // ========================================================================

    /// Set the replica identity on the timeline. Idempotent.
    pub fn set_props(&self, replica_id: u64, ip: &str, port: u16) {
        if !self.is_stopped() {
            self.timeline.set_props(replica_id, ip, port);
        }
    }

    /// Update the current primary on view change.
    pub fn set_primary_id(&self, primary_id: u64) {
        if !self.is_stopped() {
            self.timeline.set_primary_id(primary_id);
        }
    }

    /// Stamp the named protocol phase on the timeline.
    pub fn record_state_time(&self, state: &str) {
        if !self.is_stopped() {
            self.timeline.record_state_time(state);
        }
    }

    /// Capture the batch currently entering the pipeline on the timeline.
    pub fn record_transaction(&self, batch: &dyn BatchRecord) {
        if !self.is_stopped() {
            self.timeline.record_transaction(batch);
        }
    }
}

/// Spawn the fault-injection toggle loop.
fn spawn_fault_toggle(
    faulty: Arc<AtomicBool>,
    period: Duration,
    mut shutdown: watch::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let was = faulty.fetch_xor(true, Ordering::Relaxed);
                    info!(faulty = !was, "fault injection toggled");
                }
                _ = shutdown.changed() => {
                    debug!("fault toggle shutting down");
                    break;
                }
            }
        }
    })
}
