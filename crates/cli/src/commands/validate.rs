//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{DropPolicy, ServiceBlueprint};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    preset: String,
    packet_size: usize,
    frame_size: usize,
    length_prefix: bool,
    listen_addr: String,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            let decoder = blueprint.to_decoder_config();

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    preset: blueprint.decoder.preset.to_string(),
                    packet_size: decoder.packet_size,
                    frame_size: decoder.frame_size,
                    length_prefix: decoder.use_length_prefix,
                    listen_addr: blueprint.transport.listen_addr.clone(),
                    sink_count: blueprint.sinks.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &ServiceBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();
    let decoder = blueprint.to_decoder_config();

    if blueprint.sinks.is_empty() {
        warnings.push("No sinks configured - events are only counted".to_string());
    }

    if decoder.use_length_prefix && (decoder.batch_length_ceiling as usize) < decoder.frame_bytes() {
        warnings.push(format!(
            "decoder.batch_length_ceiling ({}) is below one frame ({} bytes) - every full batch will be rejected",
            decoder.batch_length_ceiling,
            decoder.frame_bytes()
        ));
    }

    if blueprint.transport.drop_policy == DropPolicy::Block {
        warnings.push(
            "transport.drop_policy = block - a slow consumer will stall device reads".to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Preset: {}", summary.preset);
            println!(
                "  Packets: {} bytes x {} per frame",
                summary.packet_size, summary.frame_size
            );
            println!("  Length prefix: {}", summary.length_prefix);
            println!("  Listen: {}", summary.listen_addr);
            println!("  Sinks: {}", summary.sink_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
