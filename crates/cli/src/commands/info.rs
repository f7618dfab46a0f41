//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::ServiceConfig;
use tracing::info;

use crate::cli::InfoArgs;

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let json = config_loader::ConfigLoader::to_json(&config)
            .context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config, args);
    }

    Ok(())
}

fn print_config_info(config: &ServiceConfig, args: &InfoArgs) {
    println!("\n=== streamgate configuration ===\n");

    println!("Server:");
    println!("  Bind: {}", config.server.bind_addr);
    println!("  Max connections: {}", config.server.max_connections);
    println!("  Shutdown grace: {}ms", config.server.shutdown_grace_ms);

    println!("\nIngest:");
    println!("  Max batch size: {}", config.ingest.max_batch_size);
    println!("  Concurrent batches: {}", config.ingest.max_concurrent_batches);
    println!("  Max reported errors: {}", config.ingest.max_errors);
    println!("  Retry backoff: {}ms", config.ingest.retry_backoff_ms);
    println!("  Max clock skew: {}ms", config.ingest.max_clock_skew_ms);
    println!("  Event rules: {}", config.ingest.event_rules.len());
    if args.rules {
        for rule in &config.ingest.event_rules {
            let threshold = rule
                .min_value
                .map(|v| format!(">= {}", v))
                .unwrap_or_else(|| "any value".to_string());
            println!(
                "    - {} [{}] {} {}",
                rule.metric_name,
                rule.severity,
                threshold,
                rule.title.as_deref().unwrap_or("")
            );
        }
    }

    println!("\nSnapshots:");
    println!(
        "  Cadence: {}ms - {}ms",
        config.snapshot.min_cadence_ms, config.snapshot.max_cadence_ms
    );
    println!("  Channel capacity: {}", config.snapshot.channel_capacity);

    println!("\nSessions:");
    println!("  Timeout: {}ms", config.session.session_timeout_ms);
    println!("  Heartbeat: {}ms", config.session.heartbeat_interval_ms);
    println!("  Mailbox capacity: {}", config.session.mailbox_capacity);
    println!(
        "  History: {} (replay {})",
        config.session.history_capacity,
        if config.session.replay_history { "on" } else { "off" }
    );

    println!("\nAlerts:");
    println!("  Bus capacity: {}", config.alerts.bus_capacity);
    println!("  Subscriber queue: {}", config.alerts.subscriber_queue);

    println!("\nStore:");
    println!("  Dedup: {}", config.store.dedup);
    println!("  Max points per metric: {}", config.store.max_points_per_metric);

    println!("\nArchive:");
    if config.archive.enabled {
        println!("  Path: {}", config.archive.path.display());
        println!("  Queue capacity: {}", config.archive.queue_capacity);
    } else {
        println!("  Disabled");
    }

    println!("\nTelemetry:");
    println!("  Log level: {}", config.telemetry.log_level);
    match config.telemetry.metrics_port {
        Some(port) => println!("  Metrics port: {}", port),
        None => println!("  Metrics port: disabled"),
    }
}
