//! `serve` command implementation.

use anyhow::{Context, Result};
use contracts::ServiceConfig;
use server::{Server, StreamHub};
use tracing::{error, info, warn};

use crate::cli::ServeArgs;
use crate::error::CliError;

/// Load configuration for `serve` and apply CLI overrides
pub fn load_service_config(args: &ServeArgs) -> Result<ServiceConfig> {
    let mut config = match &args.config {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::config_not_found(path.display().to_string()).into());
            }
            config_loader::ConfigLoader::load_from_path(path)
                .map_err(CliError::from)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => ServiceConfig::default(),
    };

    apply_overrides(&mut config, args);
    config_loader::ConfigLoader::validate(&config).map_err(CliError::from)?;
    Ok(config)
}

fn apply_overrides(config: &mut ServiceConfig, args: &ServeArgs) {
    if let Some(ref bind) = args.bind {
        config.server.bind_addr = bind.clone();
    }
    if let Some(port) = args.metrics_port {
        config.telemetry.metrics_port = (port != 0).then_some(port);
    }
    if let Some(max) = args.max_connections {
        config.server.max_connections = max;
    }
}

/// Execute the `serve` command
pub async fn run_serve(config: ServiceConfig, args: &ServeArgs) -> Result<()> {
    info!(
        bind = %config.server.bind_addr,
        max_connections = config.server.max_connections,
        event_rules = config.ingest.event_rules.len(),
        archive = config.archive.enabled,
        "Configuration loaded"
    );

    for warning in super::collect_warnings(&config) {
        warn!("{}", warning);
    }

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        return Ok(());
    }

    let hub = StreamHub::new(config).map_err(CliError::from)?;
    let server = Server::bind(hub.clone()).await.map_err(CliError::from)?;
    if let Ok(addr) = server.local_addr() {
        info!(addr = %addr, "Listening");
    }

    let signal_hub = hub.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        warn!("Received shutdown signal, draining streams...");
        signal_hub.shutdown();
    });

    server.run().await.map_err(CliError::from)?;

    println!("{}", hub.ingest_summary());
    info!("streamgate stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
