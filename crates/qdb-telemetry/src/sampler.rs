//! Background samplers deriving rates from the counter registry.
//!
//! Two independent tokio tasks wake on fixed cadences, diff the counters
//! against the previous window, and publish the derived figures:
//!
//! - the **interval sampler** covers the replica-local transaction path:
//!   throughput and mean latency from the latency accumulator, plus
//!   per-window deltas of the intake/phase/fault counters for the log line;
//! - the **global sampler** covers the cluster-wide load counters and may
//!   run on a different cadence.
//!
//! Both loops multiplex the timer against a `watch` shutdown signal with
//! `tokio::select!`, so a stop request is observed without waiting out the
//! current sleep. Baselines rebase every window; the raw counters are never
//! reset, so concurrent increments during a snapshot are counted in the
//! next window instead of being lost.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::metrics::{LatencySnapshot, LoadSnapshot, PhaseSnapshot, ReplicaMetrics};

// ============================================================================
// Window math
// ============================================================================

/// Rates derived from one sampling window of the latency accumulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyWindow {
    /// Completed calls per second over the window.
    pub throughput: u64,
    /// Mean call latency in microseconds; 0 when the window had no calls.
    pub avg_latency_us: u64,
}

impl LatencyWindow {
    /// Compute window rates from two snapshots and the elapsed wall time.
    ///
    /// Deltas saturate at zero so a counter wraparound produces a zero rate
    /// for one window rather than a bogus huge one.
    pub fn compute(prev: LatencySnapshot, curr: LatencySnapshot, elapsed: Duration) -> Self {
        let delta_calls = curr.calls.saturating_sub(prev.calls);
        let delta_ns = curr.run_time_ns.saturating_sub(prev.run_time_ns);

        let secs = elapsed.as_secs_f64();
        let throughput = if secs > 0.0 {
            (delta_calls as f64 / secs).round() as u64
        } else {
            0
        };
        let avg_latency_us = if delta_calls > 0 {
            delta_ns / delta_calls / 1_000
        } else {
            0
        };

        LatencyWindow {
            throughput,
            avg_latency_us,
        }
    }
}

/// Per-second rate for a plain counter delta.
fn rate(prev: u64, curr: u64, elapsed: Duration) -> u64 {
    let delta = curr.saturating_sub(prev);
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (delta as f64 / secs).round() as u64
    } else {
        0
    }
}

/// Per-window deltas of the phase counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseWindow {
    pub propose: u64,
    pub prepare: u64,
    pub commit: u64,
    pub pending_execute: u64,
    pub execute: u64,
    pub execute_done: u64,
}

impl PhaseWindow {
    /// Diff two phase snapshots, saturating at zero.
    pub fn compute(prev: PhaseSnapshot, curr: PhaseSnapshot) -> Self {
        PhaseWindow {
            propose: curr.propose.saturating_sub(prev.propose),
            prepare: curr.prepare.saturating_sub(prev.prepare),
            commit: curr.commit.saturating_sub(prev.commit),
            pending_execute: curr.pending_execute.saturating_sub(prev.pending_execute),
            execute: curr.execute.saturating_sub(prev.execute),
            execute_done: curr.execute_done.saturating_sub(prev.execute_done),
        }
    }

    fn is_idle(&self) -> bool {
        *self == PhaseWindow::default()
    }
}

// ============================================================================
// Interval sampler
// ============================================================================

/// Spawn the replica-local interval sampler.
pub(crate) fn spawn_monitor_sampler(
    metrics: Arc<ReplicaMetrics>,
    period: Duration,
    shutdown: watch::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(run_monitor_sampler(metrics, period, shutdown))
}

async fn run_monitor_sampler(
    metrics: Arc<ReplicaMetrics>,
    period: Duration,
    mut shutdown: watch::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut prev_latency = metrics.latency().snapshot();
    let mut prev_phase = metrics.phase().snapshot();
    let mut prev_client_request = metrics.intake().client_request_total();
    let mut prev_seq_fail = metrics.broadcast().seq_fail_total();
    let mut prev_seq_gap = metrics.broadcast().seq_gap_sum();
    let mut last_sample = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                let elapsed = now - last_sample;
                last_sample = now;

                let latency = metrics.latency().snapshot();
                let window = LatencyWindow::compute(prev_latency, latency, elapsed);
                metrics.gauges().set_txn_throughput(window.throughput);
                metrics.gauges().set_txn_avg_latency_us(window.avg_latency_us);

                let phase = metrics.phase().snapshot();
                let phase_window = PhaseWindow::compute(prev_phase, phase);

                let client_request = metrics.intake().client_request_total();
                let seq_fail = metrics.broadcast().seq_fail_total();
                let seq_gap = metrics.broadcast().seq_gap_sum();
                let client_request_delta = client_request.saturating_sub(prev_client_request);
                let seq_fail_delta = seq_fail.saturating_sub(prev_seq_fail);
                let seq_gap_delta = seq_gap.saturating_sub(prev_seq_gap);

                let had_calls = latency.calls != prev_latency.calls;
                if phase_window.is_idle() && !had_calls && client_request_delta == 0 {
                    debug!(window_secs = elapsed.as_secs_f64(), "monitor window idle");
                } else {
                    info!(
                        window_secs = elapsed.as_secs_f64(),
                        txn_throughput = window.throughput,
                        avg_latency_us = window.avg_latency_us,
                        client_request = client_request_delta,
                        propose = phase_window.propose,
                        prepare = phase_window.prepare,
                        commit = phase_window.commit,
                        pending_execute = phase_window.pending_execute,
                        execute = phase_window.execute,
                        execute_done = phase_window.execute_done,
                        seq_fail = seq_fail_delta,
                        seq_gap = seq_gap_delta,
                        "monitor window"
                    );
                }

                prev_latency = latency;
                prev_phase = phase;
                prev_client_request = client_request;
                prev_seq_fail = seq_fail;
                prev_seq_gap = seq_gap;
            }
            _ = shutdown.changed() => {
                debug!("monitor sampler shutting down");
                break;
            }
        }
    }
}

// ============================================================================
// Global sampler
// ============================================================================

/// Spawn the cluster-load global sampler.
pub(crate) fn spawn_global_sampler(
    metrics: Arc<ReplicaMetrics>,
    period: Duration,
    shutdown: watch::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(run_global_sampler(metrics, period, shutdown))
}

async fn run_global_sampler(
    metrics: Arc<ReplicaMetrics>,
    period: Duration,
    mut shutdown: watch::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut prev: LoadSnapshot = metrics.load().snapshot();
    let mut last_sample = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                let elapsed = now - last_sample;
                last_sample = now;

                let load = metrics.load().snapshot();
                let request_rate = rate(prev.total_request, load.total_request, elapsed);
                let geo_rate = rate(prev.total_geo_request, load.total_geo_request, elapsed);
                metrics.gauges().set_request_throughput(request_rate);
                metrics.gauges().set_geo_request_throughput(geo_rate);

                if load == prev {
                    debug!(window_secs = elapsed.as_secs_f64(), "global window idle");
                } else {
                    info!(
                        window_secs = elapsed.as_secs_f64(),
                        request_throughput = request_rate,
                        geo_request_throughput = geo_rate,
                        geo_request = load.geo_request.saturating_sub(prev.geo_request),
                        "global window"
                    );
                }

                prev = load;
            }
            _ = shutdown.changed() => {
                debug!("global sampler shutting down");
                break;
            }
        }
    }
}
