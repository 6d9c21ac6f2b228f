//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use contracts::DecoderPreset;
use std::path::PathBuf;

/// LiDAR Framer - packet framing and validation for LiDAR TCP byte streams
#[derive(Parser, Debug)]
#[command(
    name = "lidar-framer",
    author,
    version,
    about = "LiDAR TCP stream framer and validator",
    long_about = "Recovers validated packets and frames from a LiDAR device's TCP byte stream.\n\n\
                  Accepts device connections, connects to a relay or replays a capture, \n\
                  classifies every anomaly and dispatches events to configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "LIDAR_FRAMER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "LIDAR_FRAMER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Listen for device connections (one session per connection)
    Serve(ServeArgs),

    /// Connect to a device or relay as a client
    Connect(ConnectArgs),

    /// Decode a binary capture file
    Replay(ReplayArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display the effective configuration
    Info(InfoArgs),
}

/// Options shared by every command that decodes a stream
#[derive(Args, Debug, Clone)]
pub struct RunOptions {
    /// Path to configuration file (TOML or JSON); built-in defaults when omitted
    #[arg(short, long, env = "LIDAR_FRAMER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the decoder preset
    #[arg(long, value_enum, env = "LIDAR_FRAMER_PRESET")]
    pub preset: Option<PresetArg>,

    /// Expect a u32 big-endian length prefix before every batch
    #[arg(long)]
    pub length_prefix: bool,

    /// Reject packets whose reserved byte differs from the sentinel
    #[arg(long)]
    pub strict_reserved: bool,

    /// Stop after this many complete frames (0 = unlimited)
    #[arg(long, default_value = "0", env = "LIDAR_FRAMER_MAX_FRAMES")]
    pub max_frames: u64,

    /// Run timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "LIDAR_FRAMER_TIMEOUT")]
    pub timeout: u64,

    /// Capacity of the dispatcher input queue
    #[arg(long, default_value = "1024", env = "LIDAR_FRAMER_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "LIDAR_FRAMER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `serve` command
#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub options: RunOptions,

    /// Override the listen address from configuration
    #[arg(long, env = "LIDAR_FRAMER_LISTEN")]
    pub listen: Option<String>,

    /// Attach an in-process mock device to the listener
    #[arg(long)]
    pub mock: bool,

    /// Frames sent by the mock device
    #[arg(long, default_value = "100", requires = "mock")]
    pub mock_frames: usize,

    /// Drop sequence 1 from every Nth mock frame
    #[arg(long, requires = "mock")]
    pub mock_missing_every: Option<usize>,

    /// Corrupt the header of every Nth mock frame
    #[arg(long, requires = "mock")]
    pub mock_corrupt_every: Option<usize>,
}

/// Arguments for the `connect` command
#[derive(Parser, Debug, Clone)]
pub struct ConnectArgs {
    #[command(flatten)]
    pub options: RunOptions,

    /// Device or relay address (HOST:PORT)
    #[arg(long, env = "LIDAR_FRAMER_DEVICE_ADDR")]
    pub addr: String,
}

/// Arguments for the `replay` command
#[derive(Parser, Debug, Clone)]
pub struct ReplayArgs {
    #[command(flatten)]
    pub options: RunOptions,

    /// Capture file to decode
    #[arg(short, long)]
    pub input: PathBuf,

    /// Bytes fed per read (defaults to transport.read_buffer_size)
    #[arg(long)]
    pub chunk_size: Option<usize>,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "framer.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file; built-in defaults when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Decoder preset selectable on the command line
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum PresetArg {
    /// 44-byte packets, 8 per frame
    Compact,
    /// 352-byte packets, 8 per frame
    Extended,
    /// Compact packets behind a length prefix
    CompactPrefixed,
}

impl From<PresetArg> for DecoderPreset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Compact => DecoderPreset::Compact,
            PresetArg::Extended => DecoderPreset::Extended,
            PresetArg::CompactPrefixed => DecoderPreset::CompactPrefixed,
        }
    }
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
