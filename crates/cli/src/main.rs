//! # LiDAR Framer CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 监听 / 主动连接 / 回放三种数据源
//! - 配置检查与有效配置展示
//! - 周期统计与退出汇总

mod cli;
mod commands;
mod error;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_connect, run_info, run_replay, run_serve, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // LIDAR_FRAMER_* defaults may come from .env
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging based on CLI options
    init_logging(&cli)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "LiDAR Framer CLI starting"
    );

    // Execute command
    let result = match &cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Connect(args) => run_connect(args).await,
        Commands::Replay(args) => run_replay(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = format!("{e:#}"), "Command failed");
    }

    result
}

/// Install the tracing subscriber for the selected verbosity and format
fn init_logging(cli: &Cli) -> Result<()> {
    let config = observability::ObservabilityConfig {
        log_format: cli.log_format.into(),
        ..Default::default()
    }
    .with_verbosity(cli.verbose, cli.quiet);

    observability::init_tracing(&config)
}
