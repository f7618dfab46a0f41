//! Command implementations.

mod info;
mod serve;
mod validate;

pub use info::run_info;
pub use serve::{load_service_config, run_serve};
pub use validate::run_validate;

use contracts::ServiceConfig;

/// Collect configuration warnings (non-fatal issues)
pub(crate) fn collect_warnings(config: &ServiceConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.alerts.bus_capacity < config.alerts.subscriber_queue {
        warnings.push(format!(
            "alerts.bus_capacity ({}) is smaller than alerts.subscriber_queue ({}) - slow subscribers will lag early",
            config.alerts.bus_capacity, config.alerts.subscriber_queue
        ));
    }

    if config.session.heartbeat_interval_ms >= config.session.session_timeout_ms {
        warnings.push(format!(
            "session.heartbeat_interval_ms ({}) >= session.session_timeout_ms ({}) - idle participants will time out between heartbeats",
            config.session.heartbeat_interval_ms, config.session.session_timeout_ms
        ));
    }

    if config.session.history_capacity > 0 && !config.session.replay_history {
        warnings.push("session.history_capacity is set but replay_history is disabled".to_string());
    }

    if config.telemetry.metrics_port.is_none() {
        warnings.push("telemetry.metrics_port is not set - Prometheus metrics disabled".to_string());
    }

    if config.ingest.event_rules.is_empty() {
        warnings.push("ingest.event_rules is empty - ingestion will not derive alert events".to_string());
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_warnings() {
        let warnings = collect_warnings(&ServiceConfig::default());
        assert!(warnings.iter().any(|w| w.contains("metrics_port")));
        assert!(!warnings.iter().any(|w| w.contains("bus_capacity")));
    }

    #[test]
    fn test_heartbeat_warning() {
        let mut config = ServiceConfig::default();
        config.session.heartbeat_interval_ms = config.session.session_timeout_ms;
        let warnings = collect_warnings(&config);
        assert!(warnings.iter().any(|w| w.contains("heartbeat_interval_ms")));
    }
}
