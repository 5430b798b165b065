use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Daemon configuration, stored as JSON.
///
/// Every key is optional on disk; missing keys take the values from
/// [`MonitorConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// BCM headnodes, tried in order
    pub bcm_headnodes: Vec<String>,
    pub bcm_port: u16,
    /// PEM client certificate for the BCM REST API
    pub cert_path: PathBuf,
    /// PEM private key matching `cert_path`
    pub key_path: PathBuf,
    /// Seconds between reconciliation cycles
    pub check_interval: u64,
    /// Seconds to wait after a failed start before retrying
    pub retry_interval: u64,
    /// Failed starts allowed before a service is left alone
    pub max_retries: u32,
    pub prometheus_targets_dir: PathBuf,
    pub node_exporter_port: u16,
    pub cgroup_exporter_port: u16,
    pub nvidia_gpu_exporter_port: u16,
    pub cluster_name: String,
    /// Role that gates the exporters (case-insensitive)
    pub role: String,
    /// systemd units managed by the daemon, reconciled in this order
    pub services: Vec<String>,
    pub state_dir: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            bcm_headnodes: Vec::new(),
            bcm_port: 8081,
            cert_path: PathBuf::from("/etc/bcm-role-monitor/admin.pem"),
            key_path: PathBuf::from("/etc/bcm-role-monitor/admin.key"),
            check_interval: 60,
            retry_interval: 600,
            max_retries: 3,
            prometheus_targets_dir: PathBuf::from("/cm/shared/apps/jobstats/prometheus-targets"),
            node_exporter_port: 9100,
            cgroup_exporter_port: 9306,
            nvidia_gpu_exporter_port: 9445,
            cluster_name: "slurm".to_string(),
            role: "slurmclient".to_string(),
            services: vec![
                "cgroup_exporter".to_string(),
                "node_exporter".to_string(),
                "nvidia_gpu_exporter".to_string(),
            ],
            state_dir: PathBuf::from("/var/lib/bcm-role-monitor"),
        }
    }
}

/// A scrape endpoint advertised in the discovery descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exporter {
    pub job: &'static str,
    pub port: u16,
}

impl MonitorConfig {
    /// Load the config at `path`, writing the defaults there first if the file
    /// does not exist yet. An unreadable or malformed file falls back to the
    /// defaults without touching it.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        tracing::trace!(path = %path.display(), "Loading monitor config");

        let config = if path.exists() {
            match Self::read(path) {
                Ok(config) => config,
                Err(e) => {
                    tracing::error!(
                        path = %path.display(),
                        "Error loading config, using defaults: {}",
                        e
                    );
                    Self::default()
                }
            }
        } else {
            let config = Self::default();
            match config.save(path) {
                Ok(()) => tracing::info!("Created default config at {}", path.display()),
                Err(e) => tracing::warn!(
                    "Could not write default config to {}: {}",
                    path.display(),
                    e
                ),
            }
            config
        };

        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.check_interval == 0 {
            return Err(MonitorError::Config(
                "check_interval must be at least 1 second".into(),
            ));
        }
        if self.role.trim().is_empty() {
            return Err(MonitorError::Config("role must not be empty".into()));
        }
        Ok(())
    }

    /// Delay between cycles
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    /// Minimum delay between start attempts
    pub fn retry_interval(&self) -> chrono::TimeDelta {
        i64::try_from(self.retry_interval)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
            .unwrap_or(chrono::TimeDelta::MAX)
    }

    /// Exporters published for this node, in descriptor order.
    pub fn exporters(&self) -> Vec<Exporter> {
        vec![
            Exporter {
                job: "node_exporter",
                port: self.node_exporter_port,
            },
            Exporter {
                job: "cgroup_exporter",
                port: self.cgroup_exporter_port,
            },
            Exporter {
                job: "gpu_exporter",
                port: self.nvidia_gpu_exporter_port,
            },
        ]
    }
}
