//! Per-transaction phase timeline capture.
//!
//! The tracker holds the timeline of the one transaction currently being
//! summarized for the visualizer: identity of the replica and the current
//! primary, the transaction's sequence number and operation triples, and a
//! wall-clock timestamp per agreement phase. Protocol handlers stamp phases
//! as they fire; the summary publisher takes an exclusive snapshot and
//! resets the timeline for the next transaction.
//!
//! This is a sampling view, not an audit log: only one transaction's
//! timeline is held at a time, and concurrent progress on other in-flight
//! transactions is simply not reflected.
//!
//! # Thread Safety
//!
//! All state lives behind a single `parking_lot::Mutex`. Mutations are
//! in-place appends/overwrites held for sub-microsecond critical sections,
//! so protocol callers never block on I/O here.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::batch::BatchRecord;

/// Timeline of the transaction currently being captured.
#[derive(Debug, Clone, Default)]
struct TransactionTimeline {
    replica_id: u64,
    primary_id: u64,
    ip: String,
    port: u16,

    txn_number: u64,
    txn_commands: Vec<String>,
    txn_keys: Vec<String>,
    txn_values: Vec<String>,

    // Request state when this replica is primary, pre-prepare otherwise.
    request_pre_prepare_time: Option<SystemTime>,
    prepare_time: Option<SystemTime>,
    prepare_message_times: Vec<SystemTime>,
    commit_time: Option<SystemTime>,
    commit_message_times: Vec<SystemTime>,
    execution_time: Option<SystemTime>,
}

impl TransactionTimeline {
    /// Clear the transaction fields and phase timestamps, keeping identity.
    fn reset_transaction(&mut self) {
        self.txn_number = 0;
        self.txn_commands.clear();
        self.txn_keys.clear();
        self.txn_values.clear();
        self.request_pre_prepare_time = None;
        self.prepare_time = None;
        self.prepare_message_times.clear();
        self.commit_time = None;
        self.commit_message_times.clear();
        self.execution_time = None;
    }
}

/// Serializable copy of the timeline, pushed to the visualizer as JSON.
///
/// Timestamps are epoch microseconds; unset phases serialize as `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineSummary {
    pub replica_id: u64,
    pub primary_id: u64,
    pub ip: String,
    pub port: u16,

    pub txn_number: u64,
    pub txn_command: Vec<String>,
    pub txn_key: Vec<String>,
    pub txn_value: Vec<String>,

    pub request_pre_prepare_time_us: Option<u64>,
    pub prepare_time_us: Option<u64>,
    pub prepare_message_times_us: Vec<u64>,
    pub commit_time_us: Option<u64>,
    pub commit_message_times_us: Vec<u64>,
    pub execution_time_us: Option<u64>,
}

fn epoch_us(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros().min(u64::MAX as u128) as u64)
        .unwrap_or(0)
}

impl TimelineSummary {
    fn from_timeline(timeline: &TransactionTimeline) -> Self {
        TimelineSummary {
            replica_id: timeline.replica_id,
            primary_id: timeline.primary_id,
            ip: timeline.ip.clone(),
            port: timeline.port,
            txn_number: timeline.txn_number,
            txn_command: timeline.txn_commands.clone(),
            txn_key: timeline.txn_keys.clone(),
            txn_value: timeline.txn_values.clone(),
            request_pre_prepare_time_us: timeline.request_pre_prepare_time.map(epoch_us),
            prepare_time_us: timeline.prepare_time.map(epoch_us),
            prepare_message_times_us: timeline
                .prepare_message_times
                .iter()
                .copied()
                .map(epoch_us)
                .collect(),
            commit_time_us: timeline.commit_time.map(epoch_us),
            commit_message_times_us: timeline
                .commit_message_times
                .iter()
                .copied()
                .map(epoch_us)
                .collect(),
            execution_time_us: timeline.execution_time.map(epoch_us),
        }
    }
}

/// Mutex-guarded timeline tracker shared between protocol handlers and the
/// summary publisher.
#[derive(Debug, Default)]
pub struct TimelineTracker {
    inner: Mutex<TransactionTimeline>,
}

impl TimelineTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the replica identity fields. Last writer wins if called again.
    pub fn set_props(&self, replica_id: u64, ip: &str, port: u16) {
        let mut timeline = self.inner.lock();
        timeline.replica_id = replica_id;
        timeline.ip = ip.to_string();
        timeline.port = port;
    }

    /// Update the current view's primary. Called on view change.
    pub fn set_primary_id(&self, primary_id: u64) {
        self.inner.lock().primary_id = primary_id;
    }

    /// Stamp the current wall-clock time into the phase named by `state`.
    ///
    /// Recognized names: `request`, `pre_prepare`, `request_pre_prepare`
    /// (scalar request/pre-prepare stamp), `prepare` and `commit` (overwrite
    /// the scalar phase time and append to the per-vote list), `execution`
    /// or `execute`. Unrecognized names are a no-op so newer protocol stages
    /// can call in before this module learns about them.
    pub fn record_state_time(&self, state: &str) {
        let now = SystemTime::now();
        let mut timeline = self.inner.lock();
        match state {
            "request" | "pre_prepare" | "request_pre_prepare" => {
                timeline.request_pre_prepare_time = Some(now);
            }
            "prepare" => {
                timeline.prepare_time = Some(now);
                timeline.prepare_message_times.push(now);
            }
            "commit" => {
                timeline.commit_time = Some(now);
                timeline.commit_message_times.push(now);
            }
            "execution" | "execute" => {
                timeline.execution_time = Some(now);
            }
            _ => {}
        }
    }

    /// Store the batch's sequence number and operation triples, replacing
    /// the previously tracked transaction.
    ///
    /// Mismatched list lengths are captured best-effort: only the common
    /// prefix of the three sequences is kept, so the stored triples stay
    /// index-aligned.
    pub fn record_transaction(&self, batch: &dyn BatchRecord) {
        let commands = batch.commands();
        let keys = batch.keys();
        let values = batch.values();
        let len = commands.len().min(keys.len()).min(values.len());

        let mut timeline = self.inner.lock();
        timeline.txn_number = batch.seq();
        timeline.txn_commands = commands[..len].to_vec();
        timeline.txn_keys = keys[..len].to_vec();
        timeline.txn_values = values[..len].to_vec();
    }

    /// Copy the current timeline without resetting it.
    pub fn snapshot(&self) -> TimelineSummary {
        TimelineSummary::from_timeline(&self.inner.lock())
    }

    /// Copy the current timeline and reset the transaction fields and phase
    /// timestamps for the next tracked transaction. Identity fields persist.
    pub fn take_summary(&self) -> TimelineSummary {
        let mut timeline = self.inner.lock();
        let summary = TimelineSummary::from_timeline(&timeline);
        timeline.reset_transaction();
        summary
    }
}
