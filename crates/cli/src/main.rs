//! # streamgate CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - 服务启动与优雅关闭

mod cli;
mod commands;
mod error;

use anyhow::Result;
use clap::Parser;
use contracts::TelemetryConfig;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{load_service_config, run_info, run_serve, run_validate};
use error::CliError;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Serve(args) => {
            // serve 的日志级别和指标端口来自配置文件，先加载再初始化
            let config = load_service_config(args)?;
            init_logging(&cli, &config.telemetry)?;
            log_startup();
            run_serve(config, args).await
        }
        Commands::Validate(args) => {
            init_logging(&cli, &TelemetryConfig::default())?;
            run_validate(args)
        }
        Commands::Info(args) => {
            init_logging(&cli, &TelemetryConfig::default())?;
            run_info(args)
        }
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

fn log_startup() {
    info!(version = env!("CARGO_PKG_VERSION"), "streamgate starting");
}

/// Initialize logging based on CLI options and the telemetry section
fn init_logging(cli: &Cli, telemetry: &TelemetryConfig) -> Result<()> {
    let mut config = ObservabilityConfig::from_telemetry(telemetry, cli.log_format.into());
    if let Some(level) = cli.level_override() {
        config.default_log_level = level.to_string();
    }

    observability::init_with_config(config)
        .map_err(|e| CliError::Observability(format!("{e:#}")))?;
    Ok(())
}
