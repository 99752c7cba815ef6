//! Telemetry configuration.
//!
//! All export surfaces are disabled by default: a replica that constructs
//! `Stats` with `StatsConfig::default()` gets the counters and samplers but
//! opens no sockets. The visualizer push and the metrics HTTP endpoint are
//! enabled by setting their addresses, either programmatically or through
//! environment variables.
//!
//! # Configuration via Environment
//!
//! - `QDB_METRICS_HTTP_ADDR=127.0.0.1:9100` - enable the /metrics endpoint
//! - `QDB_VISUAL_ADDR=127.0.0.1:9300` - enable the visualizer summary push
//! - `QDB_MONITOR_INTERVAL_SECS=5` - interval sampler cadence
//! - `QDB_GLOBAL_INTERVAL_SECS=5` - global sampler cadence
//! - `QDB_FAULT_INJECTION=1` - enable the fault-injection toggle loop
//!
//! Invalid values log a warning and fall back to the default rather than
//! failing startup; telemetry must never keep a replica from booting.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::warn;

/// Environment variable for the metrics HTTP bind address.
pub const METRICS_HTTP_ADDR_ENV: &str = "QDB_METRICS_HTTP_ADDR";

/// Environment variable for the visualizer push address.
pub const VISUAL_ADDR_ENV: &str = "QDB_VISUAL_ADDR";

/// Environment variable for the interval sampler cadence in seconds.
pub const MONITOR_INTERVAL_ENV: &str = "QDB_MONITOR_INTERVAL_SECS";

/// Environment variable for the global sampler cadence in seconds.
pub const GLOBAL_INTERVAL_ENV: &str = "QDB_GLOBAL_INTERVAL_SECS";

/// Environment variable enabling the fault-injection loop.
pub const FAULT_INJECTION_ENV: &str = "QDB_FAULT_INJECTION";

/// Configuration for the `Stats` context.
#[derive(Debug, Clone)]
pub struct StatsConfig {
    /// Interval sampler cadence.
    pub monitor_interval: Duration,
    /// Global (cluster load) sampler cadence.
    pub global_interval: Duration,
    /// How often the summary publisher checks for protocol progress.
    pub summary_poll_interval: Duration,
    /// Combined prepare+commit delta that triggers a summary push.
    pub summary_threshold: u64,
    /// Visualizer push address. `None` disables the summary publisher.
    pub visual_addr: Option<SocketAddr>,
    /// Metrics HTTP bind address. `None` disables the endpoint.
    pub metrics_http_addr: Option<SocketAddr>,
    /// Whether the fault-injection toggle loop runs.
    pub fault_injection: bool,
    /// How often the fault-injection loop flips the faulty flag.
    pub fault_toggle_interval: Duration,
}

impl Default for StatsConfig {
    fn default() -> Self {
        StatsConfig {
            monitor_interval: Duration::from_secs(5),
            global_interval: Duration::from_secs(5),
            summary_poll_interval: Duration::from_secs(1),
            summary_threshold: 1,
            visual_addr: None,
            metrics_http_addr: None,
            fault_injection: false,
            fault_toggle_interval: Duration::from_secs(10),
        }
    }
}

impl StatsConfig {
    /// Default configuration: samplers on, all export surfaces off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables, starting from the
    /// defaults. Unset variables keep the default; invalid values log a
    /// warning and keep the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(addr) = parse_addr_env(METRICS_HTTP_ADDR_ENV) {
            config.metrics_http_addr = Some(addr);
        }
        if let Some(addr) = parse_addr_env(VISUAL_ADDR_ENV) {
            config.visual_addr = Some(addr);
        }
        if let Some(secs) = parse_secs_env(MONITOR_INTERVAL_ENV) {
            config.monitor_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_secs_env(GLOBAL_INTERVAL_ENV) {
            config.global_interval = Duration::from_secs(secs);
        }
        if let Ok(value) = std::env::var(FAULT_INJECTION_ENV) {
            config.fault_injection = value == "1" || value.eq_ignore_ascii_case("true");
        }

        config
    }

    /// Set the interval sampler cadence.
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Set the global sampler cadence.
    pub fn with_global_interval(mut self, interval: Duration) -> Self {
        self.global_interval = interval;
        self
    }

    /// Set the summary publisher poll cadence.
    pub fn with_summary_poll_interval(mut self, interval: Duration) -> Self {
        self.summary_poll_interval = interval;
        self
    }

    /// Set the summary trigger threshold.
    pub fn with_summary_threshold(mut self, threshold: u64) -> Self {
        self.summary_threshold = threshold;
        self
    }

    /// Enable the visualizer push towards `addr`.
    pub fn with_visual_addr(mut self, addr: SocketAddr) -> Self {
        self.visual_addr = Some(addr);
        self
    }

    /// Enable the metrics HTTP endpoint on `addr`.
    pub fn with_metrics_http_addr(mut self, addr: SocketAddr) -> Self {
        self.metrics_http_addr = Some(addr);
        self
    }

    /// Enable the fault-injection loop with the given toggle interval.
    pub fn with_fault_injection(mut self, toggle_interval: Duration) -> Self {
        self.fault_injection = true;
        self.fault_toggle_interval = toggle_interval;
        self
    }
}

fn parse_addr_env(name: &str) -> Option<SocketAddr> {
    let value = std::env::var(name).ok()?;
    match value.parse::<SocketAddr>() {
        Ok(addr) => Some(addr),
        Err(e) => {
            warn!(var = name, value = %value, error = %e, "invalid address, keeping default");
            None
        }
    }
}

fn parse_secs_env(name: &str) -> Option<u64> {
    let value = std::env::var(name).ok()?;
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Some(secs),
        Ok(_) => {
            warn!(var = name, "interval must be positive, keeping default");
            None
        }
        Err(e) => {
            warn!(var = name, value = %value, error = %e, "invalid interval, keeping default");
            None
        }
    }
}
