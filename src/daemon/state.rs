use super::reconciler::RetryState;
use crate::error::Result;
use crate::fsutil;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What the daemon remembers between restarts.
///
/// Advisory only: actual service state is always re-queried.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    pub role_active: Option<bool>,
    pub last_check: Option<DateTime<Utc>>,
    pub retry_state: BTreeMap<String, RetryState>,
}

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store for `<state_dir>/<hostname>_state.json`
    pub fn new(state_dir: &Path, hostname: &str) -> Self {
        Self {
            path: state_dir.join(format!("{hostname}_state.json")),
        }
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last saved state, or the zero value when missing or unreadable.
    pub fn load(&self) -> PersistedState {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {}", self.path.display());
                return PersistedState::default();
            }
            Err(e) => {
                warn!("Error loading state from {}: {}", self.path.display(), e);
                return PersistedState::default();
            }
        };

        match serde_json::from_slice(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    "Ignoring corrupt state file {}: {}",
                    self.path.display(),
                    e
                );
                PersistedState::default()
            }
        }
    }

    /// Atomically replace the state file, creating its directory if needed
    pub fn save(&self, state: &PersistedState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_vec_pretty(state)?;
        fsutil::write_atomic(&self.path, &content)?;
        debug!("Saved state to {}", self.path.display());
        Ok(())
    }
}
