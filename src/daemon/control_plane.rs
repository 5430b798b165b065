use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Device inventory endpoint of the BCM REST API
pub const INVENTORY_PATH: &str = "rest/v1/device";

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// One entry of the control-plane device inventory.
///
/// Missing or `null` fields read as empty, so one odd record does not make
/// the whole inventory unusable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub hostname: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub roles: Vec<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Read access to the cluster control plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Check that at least one endpoint answers. Returns the endpoint that did.
    async fn probe(&self) -> Result<String>;

    /// Fetch the full device inventory from the first endpoint that returns a
    /// parseable answer.
    async fn fetch_inventory(&self) -> Result<Vec<DeviceRecord>>;
}

/// Parse a device inventory response body.
pub fn parse_inventory(body: &[u8]) -> Result<Vec<DeviceRecord>> {
    Ok(serde_json::from_slice(body)?)
}

/// BCM REST API client authenticating with a client certificate.
///
/// Headnodes use self-signed certificates, so server verification is off.
/// Credentials are read on every call so that certificates installed after
/// startup are picked up on the next cycle.
pub struct BcmClient {
    headnodes: Vec<String>,
    port: u16,
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl BcmClient {
    /// Create a client for the headnodes and credentials in `config`
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            headnodes: config.bcm_headnodes.clone(),
            port: config.bcm_port,
            cert_path: config.cert_path.clone(),
            key_path: config.key_path.clone(),
        }
    }

    /// Device inventory URL on `headnode`
    pub fn inventory_url(&self, headnode: &str) -> String {
        format!("https://{}:{}/{}", headnode, self.port, INVENTORY_PATH)
    }

    fn read_credential(path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|source| MonitorError::Credentials {
            path: path.to_path_buf(),
            source,
        })
    }

    fn http_client(&self) -> Result<reqwest::Client> {
        if self.headnodes.is_empty() {
            return Err(MonitorError::NoHeadnodes);
        }

        let mut pem = Self::read_credential(&self.cert_path)?;
        let key = Self::read_credential(&self.key_path)?;
        pem.push(b'\n');
        pem.extend_from_slice(&key);

        let identity = reqwest::Identity::from_pem(&pem)?;
        let client = reqwest::Client::builder()
            .identity(identity)
            .danger_accept_invalid_certs(true)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(client)
    }
}

/// Try `headnodes` in order and return the first one answering HTTP 200.
pub async fn probe_in_order<F, Fut>(headnodes: &[String], mut send: F) -> Result<String>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<StatusCode>>,
{
    for headnode in headnodes {
        match send(headnode.clone()).await {
            Ok(status) if status == StatusCode::OK => {
                info!(headnode = %headnode, "Connected to BCM REST API");
                return Ok(headnode.clone());
            }
            Ok(status) => {
                warn!(
                    headnode = %headnode,
                    "BCM API connectivity check failed: HTTP {}",
                    status
                );
            }
            Err(e) => {
                warn!(headnode = %headnode, "Error testing BCM connectivity: {}", e);
            }
        }
    }

    error!("Failed to connect to any BCM headnode via REST API");
    Err(MonitorError::Unreachable {
        tried: headnodes.to_vec(),
    })
}

/// Try `headnodes` in order and return the inventory of the first one that
/// answers HTTP 200 with a parseable body.
pub async fn fetch_in_order<F, Fut>(
    headnodes: &[String],
    mut get: F,
) -> Result<Vec<DeviceRecord>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<(StatusCode, Vec<u8>)>>,
{
    for headnode in headnodes {
        let (status, body) = match get(headnode.clone()).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(headnode = %headnode, "BCM REST API request failed: {}", e);
                continue;
            }
        };

        if status != StatusCode::OK {
            warn!(
                headnode = %headnode,
                "BCM API request failed: HTTP {} - {}",
                status,
                String::from_utf8_lossy(&body)
            );
            continue;
        }

        match parse_inventory(&body) {
            Ok(devices) => {
                debug!(
                    headnode = %headnode,
                    devices = devices.len(),
                    "Fetched device inventory"
                );
                return Ok(devices);
            }
            Err(e) => {
                warn!(headnode = %headnode, "Failed to parse JSON response: {}", e);
                debug!("Raw response: {}", String::from_utf8_lossy(&body));
            }
        }
    }

    error!("Could not fetch device inventory from any BCM headnode");
    Err(MonitorError::Unreachable {
        tried: headnodes.to_vec(),
    })
}

#[async_trait]
impl ControlPlane for BcmClient {
    async fn probe(&self) -> Result<String> {
        let client = self.http_client()?;

        probe_in_order(&self.headnodes, |headnode| {
            let request = client.get(self.inventory_url(&headnode)).timeout(PROBE_TIMEOUT);
            async move { Ok::<_, MonitorError>(request.send().await?.status()) }
        })
        .await
    }

    async fn fetch_inventory(&self) -> Result<Vec<DeviceRecord>> {
        let client = self.http_client()?;

        fetch_in_order(&self.headnodes, |headnode| {
            let request = client.get(self.inventory_url(&headnode)).timeout(FETCH_TIMEOUT);
            async move {
                let response = request.send().await?;
                let status = response.status();
                let body = response.bytes().await?;
                Ok::<_, MonitorError>((status, body.to_vec()))
            }
        })
        .await
    }
}
