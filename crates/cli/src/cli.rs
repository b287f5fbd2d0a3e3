//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Trigger Bridge - forwards experiment triggers to a recording amplifier
#[derive(Parser, Debug)]
#[command(
    name = "trigger-bridge",
    author,
    version,
    about = "Amplifier trigger bridge",
    long_about = "Bridges single-byte experiment triggers to a network-attached recording \n\
                  amplifier, a streaming-bus outlet and a diagnostic console.\n\n\
                  Without a subcommand the bridge runs; `trigger-bridge <host> <port>` \n\
                  is accepted for compatibility.",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TRIGGER_BRIDGE_VERBOSE")]
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
        env = "TRIGGER_BRIDGE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the bridge (default)
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),
}

/// Arguments for the `run` command
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Amplifier host (overrides configuration)
    #[arg(env = "TRIGGER_BRIDGE_AMP_HOST")]
    pub host: Option<String>,

    /// Amplifier port (overrides configuration)
    #[arg(env = "TRIGGER_BRIDGE_AMP_PORT")]
    pub port: Option<u16>,

    /// Path to configuration file (TOML or JSON); defaults apply without one
    #[arg(short, long, env = "TRIGGER_BRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the trigger listener port
    #[arg(long, env = "TRIGGER_BRIDGE_LISTEN_PORT")]
    pub listen_port: Option<u16>,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "TRIGGER_BRIDGE_METRICS_PORT")]
    pub metrics_port: u16,

    /// Do not create the streaming-bus outlet
    #[arg(long)]
    pub no_stream_bus: bool,

    /// Do not print triggers on stdout
    #[arg(long)]
    pub no_diagnostic: bool,

    /// Skip the startup test triggers
    #[arg(long)]
    pub no_test_triggers: bool,

    /// Stop a fan-out at the first failing sink
    #[arg(long)]
    pub fail_fast: bool,

    /// Read triggers from standard input, one byte each
    #[arg(long)]
    pub stdin: bool,

    /// Emit this code periodically through the queue
    #[arg(long, value_name = "CODE", value_parser = clap::value_parser!(i8).range(1..))]
    pub heartbeat: Option<i8>,

    /// Heartbeat period in milliseconds
    #[arg(long, default_value = "1000", requires = "heartbeat")]
    pub heartbeat_interval_ms: u64,

    /// Validate configuration and exit without connecting
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "bridge.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
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
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}
