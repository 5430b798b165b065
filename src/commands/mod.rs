pub(crate) mod run;
pub(crate) mod status;

use crate::args::Cli;
use anyhow::Context as _;
use role_monitor::{clienv, MonitorConfig};
use std::path::PathBuf;

/// Inputs shared by every command: the effective config and node identity.
pub(crate) struct Context {
    pub config_path: PathBuf,
    pub config: MonitorConfig,
    pub hostname: String,
}

impl Context {
    pub(crate) fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let config_path = cli.config.clone().unwrap_or_else(clienv::config_path);
        let mut config = MonitorConfig::load_or_create(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

        if let Some(dir) = &cli.prometheus_targets_dir {
            config.prometheus_targets_dir = dir.clone();
        }

        let hostname = cli.hostname.clone().unwrap_or_else(clienv::hostname);

        Ok(Self {
            config_path,
            config,
            hostname,
        })
    }
}
