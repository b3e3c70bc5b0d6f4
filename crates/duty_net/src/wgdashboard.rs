use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use duty_core::error::AppError;

const API_TIMEOUT: Duration = Duration::from_secs(10);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(15);

/// Blocking client for the WGDashboard REST API.
///
/// Every endpoint answers `{status, message, data}`; `expect_data` unwraps
/// that envelope and turns a false `status` into a coded error.
#[derive(Debug, Clone)]
pub struct WgDashboardClient {
    api_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<T>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WgConfiguration {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Status", default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WgPeer {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl WgPeer {
    pub fn is_running(&self) -> bool {
        self.status.as_deref() == Some("running")
    }

    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => "(unnamed)",
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WgInterfaceInfo {
    #[serde(rename = "Status", default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WgConfigurationInfo {
    #[serde(rename = "configurationInfo")]
    pub info: WgInterfaceInfo,
    #[serde(rename = "configurationPeers", default)]
    pub peers: Vec<WgPeer>,
}

/// One downloadable peer config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PeerFile {
    #[serde(rename = "fileName", default)]
    pub file_name: String,
    #[serde(default)]
    pub file: String,
}

fn expect_data<T>(envelope: ApiEnvelope<T>, what: &str) -> Result<T, AppError> {
    if !envelope.status {
        return Err(
            AppError::new("WG_API_ERROR", format!("Dashboard refused to {what}"))
                .with_details(envelope.message.unwrap_or_default()),
        );
    }
    envelope.data.ok_or_else(|| {
        AppError::new("WG_BAD_RESPONSE", format!("Dashboard returned no data for {what}"))
    })
}

impl WgDashboardClient {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<ApiEnvelope<T>, AppError> {
        let url = format!("{}{}", self.api_url, endpoint);
        let resp = ureq::get(&url)
            .set("wg-dashboard-apikey", &self.api_key)
            .timeout(timeout)
            .call()
            .map_err(|e| {
                AppError::wrap("WG_UNREACHABLE", "Failed to reach WGDashboard", e)
                    .with_retryable(true)
            })?;

        resp.into_json()
            .map_err(|e| AppError::wrap("WG_BAD_RESPONSE", "WGDashboard returned malformed JSON", e))
    }

    fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        payload: serde_json::Value,
    ) -> Result<ApiEnvelope<T>, AppError> {
        let url = format!("{}{}", self.api_url, endpoint);
        let resp = ureq::post(&url)
            .set("wg-dashboard-apikey", &self.api_key)
            .set("Content-Type", "application/json")
            .timeout(API_TIMEOUT)
            .send_json(payload)
            .map_err(|e| {
                AppError::wrap("WG_UNREACHABLE", "Failed to reach WGDashboard", e)
                    .with_retryable(true)
            })?;

        resp.into_json()
            .map_err(|e| AppError::wrap("WG_BAD_RESPONSE", "WGDashboard returned malformed JSON", e))
    }

    pub fn list_configurations(&self) -> Result<Vec<WgConfiguration>, AppError> {
        let envelope = self.get("/api/getWireguardConfigurations", API_TIMEOUT)?;
        expect_data(envelope, "list configurations")
    }

    pub fn configuration_info(&self, name: &str) -> Result<WgConfigurationInfo, AppError> {
        let endpoint = format!(
            "/api/getWireguardConfigurationInfo?configurationName={}",
            urlencoding::encode(name)
        );
        let envelope = self.get(&endpoint, API_TIMEOUT)?;
        expect_data(envelope, "load configuration info")
    }

    /// Create a peer and return its dashboard id.
    pub fn add_peer(&self, config_name: &str, peer_name: &str) -> Result<String, AppError> {
        let envelope: ApiEnvelope<Vec<WgPeer>> = self.post(
            &format!("/api/addPeers/{config_name}"),
            serde_json::json!({ "name": peer_name }),
        )?;
        let peers = expect_data(envelope, "create peer")?;
        peers
            .first()
            .map(|p| p.id.clone())
            .ok_or_else(|| AppError::new("WG_PEER_CREATE_FAILED", "Dashboard created no peer"))
    }

    pub fn delete_peer(&self, config_name: &str, peer_id: &str) -> Result<(), AppError> {
        let envelope: ApiEnvelope<serde_json::Value> = self.post(
            &format!("/api/deletePeers/{config_name}"),
            serde_json::json!({ "peers": [peer_id] }),
        )?;
        if !envelope.status {
            return Err(AppError::new("WG_API_ERROR", "Dashboard refused to delete peer")
                .with_details(envelope.message.unwrap_or_default()));
        }
        Ok(())
    }

    /// Flip the interface on/off; returns the resulting enabled state when
    /// the dashboard reports it.
    pub fn toggle_configuration(&self, name: &str) -> Result<Option<bool>, AppError> {
        let endpoint = format!(
            "/api/toggleWireguardConfiguration?configurationName={}",
            urlencoding::encode(name)
        );
        let envelope: ApiEnvelope<serde_json::Value> = self.get(&endpoint, API_TIMEOUT)?;
        if !envelope.status {
            return Err(AppError::new("WG_API_ERROR", "Dashboard refused to toggle interface")
                .with_details(envelope.message.unwrap_or_default()));
        }
        Ok(envelope.data.and_then(|v| v.as_bool()))
    }

    pub fn add_configuration(&self, payload: serde_json::Value) -> Result<(), AppError> {
        let envelope: ApiEnvelope<serde_json::Value> =
            self.post("/api/addWireguardConfiguration", payload)?;
        if !envelope.status {
            return Err(AppError::new("WG_API_ERROR", "Dashboard refused to add configuration")
                .with_details(envelope.message.unwrap_or_default()));
        }
        Ok(())
    }

    pub fn delete_configuration(&self, name: &str) -> Result<(), AppError> {
        let envelope: ApiEnvelope<serde_json::Value> = self.post(
            "/api/deleteWireguardConfiguration",
            serde_json::json!({ "ConfigurationName": name }),
        )?;
        if !envelope.status {
            return Err(
                AppError::new("WG_API_ERROR", "Dashboard refused to delete configuration")
                    .with_details(envelope.message.unwrap_or_default()),
            );
        }
        Ok(())
    }

    pub fn download_peer(&self, config_name: &str, peer_id: &str) -> Result<PeerFile, AppError> {
        // Peer ids are WireGuard public keys; always URI-encode them.
        let endpoint = format!(
            "/api/downloadPeer/{config_name}?id={}",
            urlencoding::encode(peer_id)
        );
        let envelope = self.get(&endpoint, DOWNLOAD_TIMEOUT)?;
        expect_data(envelope, "download peer config")
    }

    pub fn download_all_peers(&self, config_name: &str) -> Result<Vec<PeerFile>, AppError> {
        let envelope = self.get(
            &format!("/api/downloadAllPeers/{config_name}"),
            DOWNLOAD_TIMEOUT,
        )?;
        expect_data(envelope, "download peer configs")
    }
}
