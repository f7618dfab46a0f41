//! # Observability
//!
//! 日志与指标。
//!
//! - `init_with_config`: 安装 tracing subscriber (JSON / Pretty / Compact)，
//!   配置了端口时同时启动 Prometheus exporter
//! - `metrics`: 各流服务的 `record_*` 辅助函数与 ingestion 统计汇总
//!
//! ```ignore
//! observability::init_with_config(ObservabilityConfig::from_telemetry(
//!     &config.telemetry,
//!     LogFormat::Json,
//! ))?;
//!
//! let result = handler.ingest(inbound).await;
//! observability::record_ingest_call(&result, elapsed_ms);
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

pub use crate::metrics::{
    record_alert_delivered, record_alert_lagged, record_alert_subscribers, record_batch_rejected,
    record_connection_closed, record_connection_opened, record_event_derived, record_ingest_call,
    record_mailbox_drop, record_session_join, record_session_leave, record_sessions_active,
    record_snapshot_sent, record_snapshot_tick_skipped, record_store_retry, IngestStatsAggregator,
    IngestSummary, RunningStats, StatsSummary,
};

/// JSON 日志，不导出指标
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

/// 日志与指标导出设置
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Prometheus 端口，None 表示不导出
    pub metrics_port: Option<u16>,
    /// `RUST_LOG` 未设置时使用的级别
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: None,
            default_log_level: "info".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// 从服务配置的 telemetry 段构建
    pub fn from_telemetry(telemetry: &contracts::TelemetryConfig, log_format: LogFormat) -> Self {
        Self {
            log_format,
            metrics_port: telemetry.metrics_port,
            default_log_level: telemetry.log_level.clone(),
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// 结构化 JSON，带 target / 线程 / 源码位置
    #[default]
    Json,
    Pretty,
    /// 单行
    Compact,
}

impl LogFormat {
    fn layer(self) -> Box<dyn Layer<Registry> + Send + Sync> {
        match self {
            Self::Json => fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
            Self::Pretty => fmt::layer().pretty().boxed(),
            Self::Compact => fmt::layer().compact().boxed(),
        }
    }
}

/// 安装全局 subscriber；每个进程只能成功一次
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_log_level));

    tracing_subscriber::registry()
        .with(config.log_format.layer())
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "observability initialized"
    );
    Ok(())
}

/// 只启动 Prometheus exporter，不碰 tracing
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .with_context(|| format!("Failed to install Prometheus exporter on port {port}"))?;

    tracing::info!(port, "Prometheus metrics endpoint initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.default_log_level, "info");
    }

    #[test]
    fn test_from_telemetry() {
        let telemetry = contracts::TelemetryConfig {
            log_level: "debug".into(),
            metrics_port: Some(9100),
        };
        let config = ObservabilityConfig::from_telemetry(&telemetry, LogFormat::Compact);
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.default_log_level, "debug");
    }
}
