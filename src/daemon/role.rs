use super::control_plane::{ControlPlane, DeviceRecord};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

/// Whether the watched role is assigned to this node, as of `checked_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleAssignment {
    pub active: bool,
    pub checked_at: DateTime<Utc>,
}

/// Looks up `role` on `hostname`.
///
/// Returns `None` when the host is not in the inventory. Hostnames compare
/// exactly; roles compare as whole tokens, ignoring case.
pub fn role_in_inventory(devices: &[DeviceRecord], hostname: &str, role: &str) -> Option<bool> {
    devices
        .iter()
        .find(|device| device.hostname == hostname)
        .map(|device| device.roles.iter().any(|r| r.eq_ignore_ascii_case(role)))
}

pub struct RoleResolver {
    hostname: String,
    role: String,
}

impl RoleResolver {
    pub fn new(hostname: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            role: role.into(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    /// Resolve the role assignment. `None` means unknown: the caller must not
    /// act on it.
    pub async fn resolve(
        &self,
        control_plane: &dyn ControlPlane,
        now: DateTime<Utc>,
    ) -> Option<RoleAssignment> {
        let devices = match control_plane.fetch_inventory().await {
            Ok(devices) => devices,
            Err(e) if e.is_connectivity() => {
                error!("Could not check roles via BCM REST API: {}", e);
                return None;
            }
            Err(e) => {
                error!("Unusable device inventory from BCM: {}", e);
                return None;
            }
        };

        match role_in_inventory(&devices, &self.hostname, &self.role) {
            Some(active) => {
                info!("Node {} {} role: {}", self.hostname, self.role, active);
                if let Some(device) = devices.iter().find(|d| d.hostname == self.hostname) {
                    debug!("BCM device roles: {:?}", device.roles);
                }
                Some(RoleAssignment {
                    active,
                    checked_at: now,
                })
            }
            None => {
                warn!("Device {} not found in BCM device list", self.hostname);
                None
            }
        }
    }
}
