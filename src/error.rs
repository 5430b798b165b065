use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("no BCM headnodes configured")]
    NoHeadnodes,

    #[error("BCM client credential unavailable at {}: {source}", .path.display())]
    Credentials {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no BCM headnode answered (tried: {})", .tried.join(", "))]
    Unreachable { tried: Vec<String> },

    #[error("service '{name}': {reason}")]
    Service { name: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MonitorError {
    pub fn service(name: &str, reason: impl Into<String>) -> Self {
        Self::Service {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors that mean "the control plane could not be consulted this cycle".
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::NoHeadnodes | Self::Credentials { .. } | Self::Http(_) | Self::Unreachable { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
