//! ServiceConfig - Config Loader output
//!
//! Complete service configuration: listener, the four streaming services,
//! store / archive collaborators and telemetry. Every field has a default so a
//! config file only needs to name what it changes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

use crate::Severity;

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ServiceConfig {
    /// Listener and connection limits
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerConfig,

    /// Batch ingestion
    #[serde(default)]
    #[validate(nested)]
    pub ingest: IngestConfig,

    /// Live snapshots
    #[serde(default)]
    #[validate(nested)]
    pub snapshot: SnapshotConfig,

    /// Collaboration sessions
    #[serde(default)]
    #[validate(nested)]
    pub session: SessionConfig,

    /// Alert fan-out
    #[serde(default)]
    #[validate(nested)]
    pub alerts: AlertsConfig,

    /// In-memory metric store
    #[serde(default)]
    #[validate(nested)]
    pub store: StoreConfig,

    /// Archival writes
    #[serde(default)]
    #[validate(nested)]
    pub archive: ArchiveConfig,

    /// Logging / metrics export
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to
    #[serde(default = "default_bind_addr")]
    #[validate(length(min = 1))]
    pub bind_addr: String,

    /// Maximum concurrently open streams
    #[serde(default = "default_max_connections")]
    #[validate(range(min = 1))]
    pub max_connections: usize,

    /// How long shutdown waits for in-flight streams
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_connections: default_max_connections(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:7070".to_string()
}

fn default_max_connections() -> usize {
    1024
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

/// Batch ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IngestConfig {
    /// Maximum records per batch; larger batches are rejected whole
    #[serde(default = "default_max_batch_size")]
    #[validate(range(min = 1))]
    pub max_batch_size: usize,

    /// Worker pool size per ingestion call
    #[serde(default = "default_max_concurrent_batches")]
    #[validate(range(min = 1, max = 1024))]
    pub max_concurrent_batches: usize,

    /// Cap on error strings returned in one IngestResult
    #[serde(default = "default_max_errors")]
    pub max_errors: usize,

    /// Delay before the single store-write retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Tolerated producer clock skew for "timestamp in the future"
    #[serde(default = "default_max_clock_skew_ms")]
    pub max_clock_skew_ms: u64,

    /// Metrics that produce a derived event on ingest
    #[serde(default)]
    pub event_rules: Vec<EventRule>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_concurrent_batches: default_max_concurrent_batches(),
            max_errors: default_max_errors(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_clock_skew_ms: default_max_clock_skew_ms(),
            event_rules: Vec::new(),
        }
    }
}

fn default_max_batch_size() -> usize {
    1_000
}

fn default_max_concurrent_batches() -> usize {
    4
}

fn default_max_errors() -> usize {
    100
}

fn default_retry_backoff_ms() -> u64 {
    50
}

fn default_max_clock_skew_ms() -> u64 {
    1_000
}

/// Derived-event rule for one metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRule {
    /// Metric the rule watches
    pub metric_name: String,

    /// Severity of the derived event
    #[serde(default = "default_rule_severity")]
    pub severity: Severity,

    /// Event title (defaults to the metric name)
    #[serde(default)]
    pub title: Option<String>,

    /// Only values >= this threshold produce an event
    #[serde(default)]
    pub min_value: Option<f64>,
}

impl EventRule {
    /// Whether an accepted value of `metric_name` triggers this rule
    pub fn triggers(&self, metric_name: &str, value: f64) -> bool {
        self.metric_name == metric_name && self.min_value.is_none_or(|min| value >= min)
    }
}

fn default_rule_severity() -> Severity {
    Severity::Warning
}

/// Live snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SnapshotConfig {
    /// Lower cadence bound; requests <= 0 are clamped here
    #[serde(default = "default_min_cadence_ms")]
    #[validate(range(min = 1))]
    pub min_cadence_ms: u64,

    /// Upper cadence bound
    #[serde(default = "default_max_cadence_ms")]
    #[validate(range(min = 1))]
    pub max_cadence_ms: u64,

    /// Best-effort outbound buffer per subscriber
    #[serde(default = "default_snapshot_channel_capacity")]
    #[validate(range(min = 1))]
    pub channel_capacity: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            min_cadence_ms: default_min_cadence_ms(),
            max_cadence_ms: default_max_cadence_ms(),
            channel_capacity: default_snapshot_channel_capacity(),
        }
    }
}

fn default_min_cadence_ms() -> u64 {
    100
}

fn default_max_cadence_ms() -> u64 {
    60_000
}

fn default_snapshot_channel_capacity() -> usize {
    4
}

/// Session multiplexer configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SessionConfig {
    /// Inbound silence after which a participant is considered gone
    #[serde(default = "default_session_timeout_ms")]
    #[validate(range(min = 1))]
    pub session_timeout_ms: u64,

    /// Outbound heartbeat interval
    #[serde(default = "default_heartbeat_interval_ms")]
    #[validate(range(min = 1))]
    pub heartbeat_interval_ms: u64,

    /// Per-participant outbound queue size
    #[serde(default = "default_mailbox_capacity")]
    #[validate(range(min = 1))]
    pub mailbox_capacity: usize,

    /// Recent chat messages kept per session
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Send recent history to new participants
    #[serde(default = "default_replay_history")]
    pub replay_history: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout_ms: default_session_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            mailbox_capacity: default_mailbox_capacity(),
            history_capacity: default_history_capacity(),
            replay_history: default_replay_history(),
        }
    }
}

fn default_session_timeout_ms() -> u64 {
    30_000
}

fn default_heartbeat_interval_ms() -> u64 {
    10_000
}

fn default_mailbox_capacity() -> usize {
    64
}

fn default_history_capacity() -> usize {
    100
}

fn default_replay_history() -> bool {
    true
}

/// Alert fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AlertsConfig {
    /// Events retained by the bus for slow subscribers
    #[serde(default = "default_bus_capacity")]
    #[validate(range(min = 1))]
    pub bus_capacity: usize,

    /// Outbound buffer per alert subscriber
    #[serde(default = "default_subscriber_queue")]
    #[validate(range(min = 1))]
    pub subscriber_queue: usize,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            bus_capacity: default_bus_capacity(),
            subscriber_queue: default_subscriber_queue(),
        }
    }
}

fn default_bus_capacity() -> usize {
    1_024
}

fn default_subscriber_queue() -> usize {
    64
}

/// Metric store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StoreConfig {
    /// Drop records with an already stored metric + timestamp + tags
    #[serde(default = "default_dedup")]
    pub dedup: bool,

    /// Retention cap per metric; oldest points evicted first
    #[serde(default = "default_max_points_per_metric")]
    #[validate(range(min = 1))]
    pub max_points_per_metric: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dedup: default_dedup(),
            max_points_per_metric: default_max_points_per_metric(),
        }
    }
}

fn default_dedup() -> bool {
    true
}

fn default_max_points_per_metric() -> usize {
    100_000
}

/// Archive configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ArchiveConfig {
    /// Whether accepted batches are archived
    #[serde(default)]
    pub enabled: bool,

    /// Output directory
    #[serde(default = "default_archive_path")]
    pub path: PathBuf,

    /// Batches queued for the archive worker before dropping
    #[serde(default = "default_archive_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_archive_path(),
            queue_capacity: default_archive_queue_capacity(),
        }
    }
}

fn default_archive_path() -> PathBuf {
    PathBuf::from("./archive")
}

fn default_archive_queue_capacity() -> usize {
    64
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Default log level when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus exporter port (None = disabled)
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_port: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
