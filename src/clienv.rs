use std::path::PathBuf;

const ENV_CONFIG: &str = "ROLE_MONITOR_CONFIG";
const ENV_LOG: &str = "ROLE_MONITOR_LOG";
const ENV_HOSTNAME: &str = "ROLE_MONITOR_HOSTNAME";

const DEFAULT_CONFIG_PATH: &str = "/etc/bcm-role-monitor/config.json";
const DEFAULT_LOG_PATH: &str = "/var/log/bcm-role-monitor.log";

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Config file path ($ROLE_MONITOR_CONFIG or /etc/bcm-role-monitor/config.json)
pub fn config_path() -> PathBuf {
    let path = env_opt(ENV_CONFIG)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    tracing::trace!(path = %path.display(), "Resolved config path");
    path
}

/// Log file path ($ROLE_MONITOR_LOG or /var/log/bcm-role-monitor.log)
pub fn log_path() -> PathBuf {
    env_opt(ENV_LOG)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH))
}

/// Node hostname ($ROLE_MONITOR_HOSTNAME or the system hostname)
pub fn hostname() -> String {
    let name = env_opt(ENV_HOSTNAME)
        .unwrap_or_else(|| gethostname::gethostname().to_string_lossy().into_owned());
    tracing::trace!(hostname = %name, "Resolved hostname");
    name
}
