//! `serve`, `connect` and `replay` command implementations.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use contracts::{DecoderPreset, ServiceBlueprint};
use ingestion::MockDeviceConfig;

use crate::cli::{ConnectArgs, ReplayArgs, RunOptions, ServeArgs};
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig, Source};

/// Execute the `serve` command
pub async fn run_serve(args: &ServeArgs) -> Result<()> {
    let mut blueprint = load_blueprint(&args.options)?;
    if let Some(ref listen) = args.listen {
        info!(listen = %listen, "Overriding listen address from CLI");
        blueprint.transport.listen_addr = listen.clone();
    }
    config_loader::ConfigLoader::validate(&blueprint)
        .map_err(|e| CliError::config_validation(e.to_string()))?;

    let mock = args.mock.then(|| MockDeviceConfig {
        frames: args.mock_frames,
        missing_sequence_every: args.mock_missing_every,
        corrupt_header_every: args.mock_corrupt_every,
        ..MockDeviceConfig::for_decoder(&blueprint.to_decoder_config())
    });
    let source = Source::Listen {
        addr: blueprint.transport.listen_addr.clone(),
        mock,
    };
    execute(&args.options, blueprint, source).await
}

/// Execute the `connect` command
pub async fn run_connect(args: &ConnectArgs) -> Result<()> {
    let blueprint = load_blueprint(&args.options)?;
    let source = Source::Connect {
        addr: args.addr.clone(),
    };
    execute(&args.options, blueprint, source).await
}

/// Execute the `replay` command
pub async fn run_replay(args: &ReplayArgs) -> Result<()> {
    if !args.input.exists() {
        return Err(CliError::input_not_found(args.input.display().to_string()).into());
    }
    let blueprint = load_blueprint(&args.options)?;
    let chunk_size = args
        .chunk_size
        .unwrap_or(blueprint.transport.read_buffer_size);
    let source = Source::Replay {
        path: args.input.clone(),
        chunk_size,
    };
    execute(&args.options, blueprint, source).await
}

/// Load the configuration file (or defaults) and apply CLI overrides
pub fn load_blueprint(options: &RunOptions) -> Result<ServiceBlueprint> {
    let mut blueprint = read_config(options.config.as_deref())?;
    apply_overrides(&mut blueprint, options);
    config_loader::ConfigLoader::validate(&blueprint)
        .map_err(|e| CliError::config_validation(e.to_string()))?;
    Ok(blueprint)
}

/// Read `path`, or fall back to the built-in defaults when no file is given
pub(crate) fn read_config(path: Option<&Path>) -> Result<ServiceBlueprint> {
    match path {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            if !path.exists() {
                return Err(CliError::config_not_found(path.display().to_string()).into());
            }
        }
        None => info!("No configuration file given, using defaults"),
    }
    config_loader::ConfigLoader::load_or_default(path).with_context(|| match path {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Built-in defaults are invalid".to_string(),
    })
}

fn apply_overrides(blueprint: &mut ServiceBlueprint, options: &RunOptions) {
    if let Some(preset) = options.preset {
        let preset = DecoderPreset::from(preset);
        info!(preset = %preset, "Overriding decoder preset from CLI");
        blueprint.decoder.preset = preset;
    }
    if options.length_prefix {
        blueprint.decoder.use_length_prefix = Some(true);
    }
    if options.strict_reserved {
        blueprint.decoder.strict_reserved = Some(true);
    }
}

async fn execute(options: &RunOptions, blueprint: ServiceBlueprint, source: Source) -> Result<()> {
    let config = PipelineConfig {
        blueprint,
        source,
        max_frames: (options.max_frames > 0).then_some(options.max_frames),
        timeout: (options.timeout > 0).then(|| Duration::from_secs(options.timeout)),
        buffer_size: options.buffer_size,
        metrics_port: (options.metrics_port > 0).then_some(options.metrics_port),
    };

    let stats = Pipeline::new(config)
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        frames_complete = stats.report.frames_complete,
        packet_error_rate = format!("{:.2}%", stats.report.packet_error_rate),
        duration_secs = stats.duration.as_secs_f64(),
        "Pipeline completed"
    );
    stats.print_summary();

    info!("LiDAR Framer finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn options(config: Option<std::path::PathBuf>) -> RunOptions {
        RunOptions {
            config,
            preset: None,
            length_prefix: false,
            strict_reserved: false,
            max_frames: 0,
            timeout: 0,
            buffer_size: 16,
            metrics_port: 0,
        }
    }

    #[test]
    fn test_defaults_without_config() {
        let blueprint = load_blueprint(&options(None)).unwrap();
        assert_eq!(blueprint.to_decoder_config().packet_size, 44);
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[decoder]\npreset = \"extended\"").unwrap();

        let mut opts = options(Some(file.path().to_path_buf()));
        opts.length_prefix = true;
        opts.strict_reserved = true;

        let config = load_blueprint(&opts).unwrap().to_decoder_config();
        assert_eq!(config.packet_size, 352);
        assert!(config.use_length_prefix);
        assert!(config.strict_reserved);
    }

    #[test]
    fn test_missing_config_file() {
        let err = load_blueprint(&options(Some("/nonexistent/framer.toml".into()))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
