//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// depthpipe - configure, resolve and stream depth camera pipelines
#[derive(Parser, Debug)]
#[command(
    name = "depthpipe",
    author,
    version,
    about = "Depth camera streaming pipeline",
    long_about = "Resolves a stream manifest against simulated or file-backed devices,\n\
                  starts streaming with retry and disconnect recovery, and reports\n\
                  synchronized frame set delivery."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "DEPTHPIPE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "DEPTHPIPE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream frame sets from the resolved device
    Run(RunArgs),

    /// Validate a pipeline manifest without streaming
    Validate(ValidateArgs),

    /// List devices and the stream profiles they advertise
    Devices(DevicesArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Pipeline manifest (TOML or JSON)
    #[arg(short, long, default_value = "pipeline.toml", env = "DEPTHPIPE_CONFIG")]
    pub config: PathBuf,

    #[command(flatten)]
    pub devices: DeviceArgs,

    /// Play back this device description or recording instead of a live device
    #[arg(long, conflicts_with = "record")]
    pub playback: Option<PathBuf>,

    /// Record the session to this file
    #[arg(long)]
    pub record: Option<PathBuf>,

    /// Playback speed multiplier for recordings
    #[arg(long, default_value = "1.0")]
    pub replay_speed: f64,

    /// Restart recordings from the first frame when they end
    #[arg(long)]
    pub replay_loop: bool,

    /// Stop after this many frame sets (0 = unlimited)
    #[arg(long, default_value = "0", env = "DEPTHPIPE_MAX_FRAMES")]
    pub max_frames: u64,

    /// Stop after this many seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "DEPTHPIPE_TIMEOUT")]
    pub timeout: u64,

    /// Per-call `wait_for_frames` bound in milliseconds
    #[arg(long, default_value = "5000")]
    pub wait_ms: u64,

    /// Resolve and print the profile, then exit without streaming
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "DEPTHPIPE_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Pipeline manifest to validate
    #[arg(short, long, default_value = "pipeline.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `devices` command
#[derive(Parser, Debug)]
pub struct DevicesArgs {
    #[command(flatten)]
    pub devices: DeviceArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Devices plugged into the simulated hub
#[derive(clap::Args, Debug, Clone, Default)]
pub struct DeviceArgs {
    /// Device description file (JSON), repeatable.
    /// Without any, a built-in depth camera with a motion module is used.
    #[arg(short, long = "device", value_name = "FILE")]
    pub device_files: Vec<PathBuf>,
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
