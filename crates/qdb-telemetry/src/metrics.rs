//! Atomic counter registry for replica protocol telemetry.
//!
//! This module provides lightweight, atomic counter-based metrics for the
//! agreement pipeline: client intake, protocol phases (propose / prepare /
//! commit / execute), broadcast fan-out, sequence faults, and cluster-wide
//! load. Counters are designed to be updated from any number of protocol
//! threads without coordination and read by the background samplers and the
//! metrics HTTP endpoint.
//!
//! # Design
//!
//! Every counter is an `AtomicU64` updated with `Ordering::Relaxed`. Exact
//! cross-counter ordering is not required for observability: a sampler may
//! observe a `prepare` increment before the matching `commit` becomes
//! visible, which is expected and harmless. Within a single counter there
//! are no lost updates and no torn reads.
//!
//! Counters wrap around silently at `u64::MAX`. Nothing in this module
//! returns an error.
//!
//! # Prometheus-style naming
//!
//! Each metrics group renders itself via `format_metrics()`:
//! ```text
//! qdb_client_request_total 1234
//! qdb_prepare_total 567
//! qdb_seq_gap_sum 3
//! qdb_txn_throughput 200
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

// ============================================================================
// IntakeMetrics - client and server-side request intake
// ============================================================================

/// Counters for the request intake path: client calls arriving at the
/// service layer, raw socket receives, and the network-in to worker handoff.
#[derive(Debug, Default)]
pub struct IntakeMetrics {
    client_call_total: AtomicU64,
    client_request_total: AtomicU64,
    socket_recv_total: AtomicU64,
    server_call_total: AtomicU64,
    server_process_total: AtomicU64,
}

impl IntakeMetrics {
    /// Create a new metrics instance with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the client call counter.
    pub fn inc_client_call(&self) {
        self.client_call_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the client request counter.
    pub fn inc_client_request(&self) {
        self.client_request_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the socket receive counter.
    pub fn inc_socket_recv(&self) {
        self.socket_recv_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the server call counter (network in -> worker).
    pub fn inc_server_call(&self) {
        self.server_call_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the server process counter.
    pub fn inc_server_process(&self) {
        self.server_process_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn client_call_total(&self) -> u64 {
        self.client_call_total.load(Ordering::Relaxed)
    }

    pub fn client_request_total(&self) -> u64 {
        self.client_request_total.load(Ordering::Relaxed)
    }

    pub fn socket_recv_total(&self) -> u64 {
        self.socket_recv_total.load(Ordering::Relaxed)
    }

    pub fn server_call_total(&self) -> u64 {
        self.server_call_total.load(Ordering::Relaxed)
    }

    pub fn server_process_total(&self) -> u64 {
        self.server_process_total.load(Ordering::Relaxed)
    }

    /// Format intake counters as Prometheus-style output.
    pub fn format_metrics(&self) -> String {
        let mut output = String::new();
        output.push_str("\n# Request intake counters\n");
        output.push_str(&format!(
            "qdb_client_call_total {}\n",
            self.client_call_total()
        ));
        output.push_str(&format!(
            "qdb_client_request_total {}\n",
            self.client_request_total()
        ));
        output.push_str(&format!(
            "qdb_socket_recv_total {}\n",
            self.socket_recv_total()
        ));
        output.push_str(&format!(
            "qdb_server_call_total {}\n",
            self.server_call_total()
        ));
        output.push_str(&format!(
            "qdb_server_process_total {}\n",
            self.server_process_total()
        ));
        output
    }
}

// ============================================================================
// PhaseMetrics - agreement protocol phase counters
// ============================================================================

/// Counters for transaction progress through the agreement phases.
///
/// Each counter is incremented by the protocol handler for the matching
/// phase: one `propose` per proposal handled, one `prepare`/`commit` per
/// vote accepted, one `execute`/`execute_done` per applied transaction.
#[derive(Debug, Default)]
pub struct PhaseMetrics {
    propose_total: AtomicU64,
    prepare_total: AtomicU64,
    commit_total: AtomicU64,
    pending_execute_total: AtomicU64,
    execute_total: AtomicU64,
    execute_done_total: AtomicU64,
}

/// Point-in-time copy of the phase counters, used by the interval sampler
/// for per-window delta reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseSnapshot {
    pub propose: u64,
    pub prepare: u64,
    pub commit: u64,
    pub pending_execute: u64,
    pub execute: u64,
    pub execute_done: u64,
}

impl PhaseMetrics {
    /// Create a new metrics instance with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the propose counter.
    pub fn inc_propose(&self) {
        self.propose_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the prepare counter (one per prepare vote accepted).
    pub fn inc_prepare(&self) {
        self.prepare_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the commit counter (one per commit vote accepted).
    pub fn inc_commit(&self) {
        self.commit_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the pending-execute counter.
    pub fn inc_pending_execute(&self) {
        self.pending_execute_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the execute counter.
    pub fn inc_execute(&self) {
        self.execute_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the execute-done counter.
    pub fn inc_execute_done(&self) {
        self.execute_done_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn propose_total(&self) -> u64 {
        self.propose_total.load(Ordering::Relaxed)
    }

    pub fn prepare_total(&self) -> u64 {
        self.prepare_total.load(Ordering::Relaxed)
    }

    pub fn commit_total(&self) -> u64 {
        self.commit_total.load(Ordering::Relaxed)
    }

    pub fn pending_execute_total(&self) -> u64 {
        self.pending_execute_total.load(Ordering::Relaxed)
    }

    pub fn execute_total(&self) -> u64 {
        self.execute_total.load(Ordering::Relaxed)
    }

    pub fn execute_done_total(&self) -> u64 {
        self.execute_done_total.load(Ordering::Relaxed)
    }

    /// Take a point-in-time copy of all phase counters.
    pub fn snapshot(&self) -> PhaseSnapshot {
        PhaseSnapshot {
            propose: self.propose_total(),
            prepare: self.prepare_total(),
            commit: self.commit_total(),
            pending_execute: self.pending_execute_total(),
            execute: self.execute_total(),
            execute_done: self.execute_done_total(),
        }
    }

    /// Format phase counters as Prometheus-style output.
    pub fn format_metrics(&self) -> String {
        let mut output = String::new();
        output.push_str("\n# Agreement phase counters\n");
        output.push_str(&format!("qdb_propose_total {}\n", self.propose_total()));
        output.push_str(&format!("qdb_prepare_total {}\n", self.prepare_total()));
        output.push_str(&format!("qdb_commit_total {}\n", self.commit_total()));
        output.push_str(&format!(
            "qdb_pending_execute_total {}\n",
            self.pending_execute_total()
        ));
        output.push_str(&format!("qdb_execute_total {}\n", self.execute_total()));
        output.push_str(&format!(
            "qdb_execute_done_total {}\n",
            self.execute_done_total()
        ));
        output
    }
}

// ============================================================================
// BroadcastMetrics - fan-out and sequence fault counters
// ============================================================================

/// Counters for outbound broadcast fan-out and sequence ordering faults.
///
/// `seq_gap_sum` accumulates gap magnitudes rather than occurrences: a gap
/// of 5 sequence numbers adds 5, so the value reflects how far behind the
/// replica has fallen, not how often.
#[derive(Debug, Default)]
pub struct BroadcastMetrics {
    broadcast_msg_total: AtomicU64,
    send_broadcast_msg_total: AtomicU64,
    send_broadcast_msg_per_replica_total: AtomicU64,
    seq_fail_total: AtomicU64,
    seq_gap_sum: AtomicU64,
}

impl BroadcastMetrics {
    /// Create a new metrics instance with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the broadcast message counter.
    pub fn inc_broadcast_msg(&self) {
        self.broadcast_msg_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `num` sent broadcast messages.
    pub fn add_send_broadcast_msg(&self, num: u64) {
        self.send_broadcast_msg_total
            .fetch_add(num, Ordering::Relaxed);
    }

    /// Increment the per-replica broadcast send counter.
    pub fn inc_send_broadcast_msg_per_replica(&self) {
        self.send_broadcast_msg_per_replica_total
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the sequence assignment failure counter.
    pub fn inc_seq_fail(&self) {
        self.seq_fail_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Add a sequence gap magnitude.
    pub fn add_seq_gap(&self, gap: u64) {
        self.seq_gap_sum.fetch_add(gap, Ordering::Relaxed);
    }

    pub fn broadcast_msg_total(&self) -> u64 {
        self.broadcast_msg_total.load(Ordering::Relaxed)
    }

    pub fn send_broadcast_msg_total(&self) -> u64 {
        self.send_broadcast_msg_total.load(Ordering::Relaxed)
    }

    pub fn send_broadcast_msg_per_replica_total(&self) -> u64 {
        self.send_broadcast_msg_per_replica_total
            .load(Ordering::Relaxed)
    }

    pub fn seq_fail_total(&self) -> u64 {
        self.seq_fail_total.load(Ordering::Relaxed)
    }

    pub fn seq_gap_sum(&self) -> u64 {
        self.seq_gap_sum.load(Ordering::Relaxed)
    }

    /// Format broadcast and fault counters as Prometheus-style output.
    pub fn format_metrics(&self) -> String {
        let mut output = String::new();
        output.push_str("\n# Broadcast and sequence fault counters\n");
        output.push_str(&format!(
            "qdb_broadcast_msg_total {}\n",
            self.broadcast_msg_total()
        ));
        output.push_str(&format!(
            "qdb_send_broadcast_msg_total {}\n",
            self.send_broadcast_msg_total()
        ));
        output.push_str(&format!(
            "qdb_send_broadcast_msg_per_replica_total {}\n",
            self.send_broadcast_msg_per_replica_total()
        ));
        output.push_str(&format!("qdb_seq_fail_total {}\n", self.seq_fail_total()));
        output.push_str(&format!("qdb_seq_gap_sum {}\n", self.seq_gap_sum()));
        output
    }
}

// ============================================================================
// LoadMetrics - cluster-wide request load counters
// ============================================================================

/// Counters for fleet-level load: batched request totals across the local
/// cluster and the geo-distributed deployment. Sampled by the global
/// sampler rather than the per-replica interval sampler.
#[derive(Debug, Default)]
pub struct LoadMetrics {
    total_request: AtomicU64,
    total_geo_request: AtomicU64,
    geo_request_total: AtomicU64,
}

/// Point-in-time copy of the load counters for delta computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSnapshot {
    pub total_request: u64,
    pub total_geo_request: u64,
    pub geo_request: u64,
}

impl LoadMetrics {
    /// Create a new metrics instance with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `num` requests to the cluster-wide total.
    pub fn add_total_request(&self, num: u64) {
        self.total_request.fetch_add(num, Ordering::Relaxed);
    }

    /// Add `num` requests to the geo-distributed total.
    pub fn add_total_geo_request(&self, num: u64) {
        self.total_geo_request.fetch_add(num, Ordering::Relaxed);
    }

    /// Increment the geo request counter.
    pub fn inc_geo_request(&self) {
        self.geo_request_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_request(&self) -> u64 {
        self.total_request.load(Ordering::Relaxed)
    }

    pub fn total_geo_request(&self) -> u64 {
        self.total_geo_request.load(Ordering::Relaxed)
    }

    pub fn geo_request_total(&self) -> u64 {
        self.geo_request_total.load(Ordering::Relaxed)
    }

    /// Take a point-in-time copy of all load counters.
    pub fn snapshot(&self) -> LoadSnapshot {
        LoadSnapshot {
            total_request: self.total_request(),
            total_geo_request: self.total_geo_request(),
            geo_request: self.geo_request_total(),
        }
    }

    /// Format load counters as Prometheus-style output.
    pub fn format_metrics(&self) -> String {
        let mut output = String::new();
        output.push_str("\n# Cluster load counters\n");
        output.push_str(&format!("qdb_total_request {}\n", self.total_request()));
        output.push_str(&format!(
            "qdb_total_geo_request {}\n",
            self.total_geo_request()
        ));
        output.push_str(&format!(
            "qdb_geo_request_total {}\n",
            self.geo_request_total()
        ));
        output
    }
}

// ============================================================================
// LatencyMetrics - call count + summed run time
// ============================================================================

/// Transaction latency accumulator: a call counter paired with a summed
/// run time in nanoseconds. The interval sampler derives throughput and
/// mean latency from deltas between successive snapshots, so the raw pair
/// grows monotonically and is never reset in place.
#[derive(Debug, Default)]
pub struct LatencyMetrics {
    call_total: AtomicU64,
    run_time_ns_sum: AtomicU64,
}

/// Point-in-time copy of the latency accumulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencySnapshot {
    pub calls: u64,
    pub run_time_ns: u64,
}

impl LatencyMetrics {
    /// Create a new metrics instance with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed call and its run time.
    pub fn add_latency(&self, run_time: Duration) {
        // Saturate at u64::MAX rather than silently truncating u128.
        let ns = run_time.as_nanos().min(u64::MAX as u128) as u64;
        self.call_total.fetch_add(1, Ordering::Relaxed);
        self.run_time_ns_sum.fetch_add(ns, Ordering::Relaxed);
    }

    pub fn call_total(&self) -> u64 {
        self.call_total.load(Ordering::Relaxed)
    }

    pub fn run_time_ns_sum(&self) -> u64 {
        self.run_time_ns_sum.load(Ordering::Relaxed)
    }

    /// Take a point-in-time copy of the accumulator.
    pub fn snapshot(&self) -> LatencySnapshot {
        LatencySnapshot {
            calls: self.call_total(),
            run_time_ns: self.run_time_ns_sum(),
        }
    }

    /// Format latency counters as Prometheus-style output.
    pub fn format_metrics(&self) -> String {
        let mut output = String::new();
        output.push_str("\n# Transaction latency accumulator\n");
        output.push_str(&format!("qdb_txn_call_total {}\n", self.call_total()));
        output.push_str(&format!(
            "qdb_txn_run_time_ns_sum {}\n",
            self.run_time_ns_sum()
        ));
        output
    }
}

// ============================================================================
// SamplerGauges - rates derived by the background samplers
// ============================================================================

/// Gauges written by the interval and global samplers after each window:
/// transaction throughput, mean latency, and cluster request rates. Updated
/// with plain stores; readers may see the previous window's value during an
/// update, which is acceptable for scrape output.
#[derive(Debug, Default)]
pub struct SamplerGauges {
    txn_throughput: AtomicU64,
    txn_avg_latency_us: AtomicU64,
    request_throughput: AtomicU64,
    geo_request_throughput: AtomicU64,
}

impl SamplerGauges {
    /// Create a new gauge set with all values at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the transaction throughput gauge (transactions per second).
    pub fn set_txn_throughput(&self, tps: u64) {
        self.txn_throughput.store(tps, Ordering::Relaxed);
    }

    /// Set the mean transaction latency gauge (microseconds).
    pub fn set_txn_avg_latency_us(&self, us: u64) {
        self.txn_avg_latency_us.store(us, Ordering::Relaxed);
    }

    /// Set the cluster request throughput gauge (requests per second).
    pub fn set_request_throughput(&self, rps: u64) {
        self.request_throughput.store(rps, Ordering::Relaxed);
    }

    /// Set the geo request throughput gauge (requests per second).
    pub fn set_geo_request_throughput(&self, rps: u64) {
        self.geo_request_throughput.store(rps, Ordering::Relaxed);
    }

    pub fn txn_throughput(&self) -> u64 {
        self.txn_throughput.load(Ordering::Relaxed)
    }

    pub fn txn_avg_latency_us(&self) -> u64 {
        self.txn_avg_latency_us.load(Ordering::Relaxed)
    }

    pub fn request_throughput(&self) -> u64 {
        self.request_throughput.load(Ordering::Relaxed)
    }

    pub fn geo_request_throughput(&self) -> u64 {
        self.geo_request_throughput.load(Ordering::Relaxed)
    }

    /// Format sampler gauges as Prometheus-style output.
    pub fn format_metrics(&self) -> String {
        let mut output = String::new();
        output.push_str("\n# Sampler-derived gauges\n");
        output.push_str(&format!("qdb_txn_throughput {}\n", self.txn_throughput()));
        output.push_str(&format!(
            "qdb_txn_avg_latency_us {}\n",
            self.txn_avg_latency_us()
        ));
        output.push_str(&format!(
            "qdb_request_throughput {}\n",
            self.request_throughput()
        ));
        output.push_str(&format!(
            "qdb_geo_request_throughput {}\n",
            self.geo_request_throughput()
        ));
        output
    }
}

// ============================================================================
// ReplicaMetrics - top-level registry
// ============================================================================

/// Top-level metrics registry for one replica process.
///
/// Owns one instance of every counter group. Protocol call sites reach the
/// groups through the accessors; the samplers and the metrics HTTP endpoint
/// read the same instance. All groups are independently thread-safe, so the
/// registry itself needs no locking.
#[derive(Debug, Default)]
pub struct ReplicaMetrics {
    intake: IntakeMetrics,
    phase: PhaseMetrics,
    broadcast: BroadcastMetrics,
    load: LoadMetrics,
    latency: LatencyMetrics,
    gauges: SamplerGauges,
}

impl ReplicaMetrics {
    /// Create a new registry with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get intake counters.
    pub fn intake(&self) -> &IntakeMetrics {
        &self.intake
    }

    /// Get agreement phase counters.
    pub fn phase(&self) -> &PhaseMetrics {
        &self.phase
    }

    /// Get broadcast and fault counters.
    pub fn broadcast(&self) -> &BroadcastMetrics {
        &self.broadcast
    }

    /// Get cluster load counters.
    pub fn load(&self) -> &LoadMetrics {
        &self.load
    }

    /// Get the latency accumulator.
    pub fn latency(&self) -> &LatencyMetrics {
        &self.latency
    }

    /// Get the sampler gauge set.
    pub fn gauges(&self) -> &SamplerGauges {
        &self.gauges
    }

    /// Format the full registry as Prometheus-style scrape output.
    pub fn format_metrics(&self) -> String {
        let mut output = String::new();
        output.push_str(&self.intake.format_metrics());
        output.push_str(&self.phase.format_metrics());
        output.push_str(&self.broadcast.format_metrics());
        output.push_str(&self.load.format_metrics());
        output.push_str(&self.latency.format_metrics());
        output.push_str(&self.gauges.format_metrics());
        output
    }
}
