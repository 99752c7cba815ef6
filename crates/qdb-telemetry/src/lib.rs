//! Replica-local telemetry for the quorumdb agreement pipeline.
//!
//! This crate is the observability subsystem embedded in every replica
//! process: it counts protocol events, samples the counters on fixed
//! intervals to derive throughput and latency, captures a per-transaction
//! phase timeline, and exports through two independent paths: a JSON
//! summary pushed to the visualizer and a pull-based `/metrics` endpoint.
//!
//! # Architecture
//!
//! - [`metrics`]: atomic counter registry (`ReplicaMetrics`), written from
//!   any number of protocol threads with relaxed atomic adds.
//! - [`timeline`]: mutex-guarded timeline of the transaction currently
//!   being summarized for the visualizer.
//! - [`sampler`]: interval sampler (replica throughput/latency) and global
//!   sampler (cluster load), both on cancellable tokio timers.
//! - [`summary`]: progress-gated publisher pushing timeline summaries over
//!   a persistent TCP connection, behind the [`SummarySink`] seam.
//! - [`metrics_http`]: minimal scrape endpoint serving the registry.
//! - [`stats`]: the [`Stats`] context owning all of the above, with the
//!   facade the protocol layer calls and the `stop()` lifecycle.
//!
//! Nothing in this crate may abort the process: export failures are logged
//! and retried, unknown inputs are ignored, and post-shutdown calls are
//! no-ops.

pub mod batch;
pub mod config;
pub mod metrics;
pub mod metrics_http;
pub mod sampler;
pub mod stats;
pub mod summary;
pub mod timeline;

pub use batch::{BatchRecord, OwnedBatch};
pub use config::StatsConfig;
pub use metrics::ReplicaMetrics;
pub use stats::Stats;
pub use summary::{SummarySink, SummarySinkError, TcpSummarySink};
pub use timeline::{TimelineSummary, TimelineTracker};
