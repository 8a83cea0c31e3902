//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Frame Constructor - real-time image construction from camera sub-frames
#[derive(Parser, Debug)]
#[command(
    name = "frame-constructor",
    author,
    version,
    about = "Real-time frame construction pipeline",
    long_about = "Integrates camera sub-frames into final images off the acquisition path.\n\n\
                  Reads sub-frames from a (simulated) camera ring buffer, integrates them \n\
                  on a dedicated worker (average, summation or rank filter) and hands \n\
                  finished images to storage and a viewer."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "FRAME_CONSTRUCTOR_VERBOSE")]
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
        env = "FRAME_CONSTRUCTOR_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an acquisition through the construction pipeline
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config.toml",
        env = "FRAME_CONSTRUCTOR_CONFIG"
    )]
    pub config: PathBuf,

    /// Override the number of time points from configuration
    #[arg(long, env = "FRAME_CONSTRUCTOR_TIMEPOINTS")]
    pub timepoints: Option<u32>,

    /// Acquisition timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "FRAME_CONSTRUCTOR_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without running pipeline
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "FRAME_CONSTRUCTOR_METRICS_PORT")]
    pub metrics_port: u16,

    /// Write queue diagnostics to this directory (overrides configuration)
    #[arg(long, env = "FRAME_CONSTRUCTOR_DIAGNOSTICS_DIR")]
    pub diagnostics_dir: Option<PathBuf>,

    /// Seconds the storage may take to drain at shutdown
    #[arg(long, default_value = "10", env = "FRAME_CONSTRUCTOR_STORAGE_TIMEOUT")]
    pub storage_timeout: u64,

    /// Run without viewer notifications
    #[arg(long)]
    pub no_viewer: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show camera details
    #[arg(long)]
    pub camera: bool,

    /// Show queue, storage and viewer configuration
    #[arg(long)]
    pub outputs: bool,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["frame-constructor", "run"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.config, PathBuf::from("config.toml"));
        assert_eq!(args.timeout, 0);
        assert_eq!(args.metrics_port, 0);
        assert_eq!(args.storage_timeout, 10);
        assert!(args.timepoints.is_none());
        assert!(!args.no_viewer);
    }

    #[test]
    fn test_run_overrides() {
        let cli = Cli::try_parse_from([
            "frame-constructor",
            "-vv",
            "--log-format",
            "json",
            "run",
            "--config",
            "acq.toml",
            "--timepoints",
            "3",
            "--diagnostics-dir",
            "/tmp/diag",
            "--no-viewer",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.log_format, LogFormat::Json));
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.timepoints, Some(3));
        assert_eq!(args.diagnostics_dir, Some(PathBuf::from("/tmp/diag")));
        assert!(args.no_viewer);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["frame-constructor", "-q", "-v", "validate"]).is_err());
    }
}
