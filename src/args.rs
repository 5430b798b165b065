use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "role-monitor")]
#[command(version)]
#[command(
    about = "Manages jobstats exporters and Prometheus targets based on BCM role assignment",
    long_about = None
)]
pub(crate) struct Cli {
    /// Configuration file. Can also be set via ROLE_MONITOR_CONFIG.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the Prometheus targets directory from the config file
    #[arg(long, global = true)]
    pub prometheus_targets_dir: Option<PathBuf>,

    /// Log file. Can also be set via ROLE_MONITOR_LOG.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Hostname to look up in the BCM inventory. Can also be set via ROLE_MONITOR_HOSTNAME.
    #[arg(long, global = true)]
    pub hostname: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the reconciliation loop until SIGTERM/SIGINT (default)
    Run,

    /// Run a single reconciliation cycle and exit
    Check,

    /// Show the effective configuration and the persisted state
    Status,
}
