//! Proxmox VE REST backend.
//!
//! Talks to `https://<host>:<port>/api2/json`. Authentication uses either an
//! API token (stateless header) or a username/password pair exchanged for a
//! ticket at `POST /access/ticket`. Only GET requests are issued, so the CSRF
//! token returned with the ticket is never needed.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::error::{HypervisorError, Result};
use crate::traits::HypervisorSource;
use crate::types::*;

/// Default Proxmox VE API port.
pub const DEFAULT_PORT: u16 = 8006;

/// How to authenticate against the Proxmox VE API.
#[derive(Debug, Clone)]
pub enum ProxmoxAuth {
    /// Username (with realm, e.g. `api@pve`) and password
    Password { username: String, password: String },
    /// API token ID (`user@realm!name`) and secret
    ApiToken { token_id: String, secret: String },
}

/// Connection settings for [`ProxmoxClient`].
#[derive(Debug, Clone)]
pub struct ProxmoxSettings {
    /// Hostname or IP address
    pub host: String,
    /// API port
    pub port: u16,
    /// Credentials
    pub auth: ProxmoxAuth,
    /// Verify the server certificate
    pub verify_tls: bool,
    /// Per-request timeout
    pub timeout: Duration,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct TicketData {
    ticket: String,
}

#[derive(Deserialize)]
struct AgentResult {
    #[serde(default)]
    result: Vec<GuestInterface>,
}

/// Proxmox VE API client.
pub struct ProxmoxClient {
    base_url: String,
    auth: ProxmoxAuth,
    http: reqwest::Client,
    /// Ticket obtained by password login
    ticket: RwLock<Option<String>>,
}

impl ProxmoxClient {
    /// Create a new client. No request is sent until the first call.
    pub fn new(settings: ProxmoxSettings) -> Result<Self> {
        if settings.host.trim().is_empty() {
            return Err(HypervisorError::InvalidConfig("Host cannot be empty".to_string()));
        }
        match &settings.auth {
            ProxmoxAuth::Password { username, password } => {
                if username.is_empty() {
                    return Err(HypervisorError::InvalidConfig("User cannot be empty".to_string()));
                }
                if password.is_empty() {
                    return Err(HypervisorError::InvalidConfig("Password cannot be empty".to_string()));
                }
            }
            ProxmoxAuth::ApiToken { token_id, secret } => {
                if token_id.is_empty() || secret.is_empty() {
                    return Err(HypervisorError::InvalidConfig(
                        "API token ID and secret cannot be empty".to_string(),
                    ));
                }
            }
        }
        
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!settings.verify_tls)
            .timeout(settings.timeout)
            .build()
            .map_err(|e| HypervisorError::InvalidConfig(format!("Failed to build HTTP client: {}", e)))?;
        
        if !settings.verify_tls {
            warn!(host = %settings.host, "TLS certificate verification disabled for Proxmox VE");
        }
        
        Ok(Self {
            base_url: api_base_url(&settings.host, settings.port),
            auth: settings.auth,
            http,
            ticket: RwLock::new(None),
        })
    }
    
    /// Exchange username/password for an authentication ticket.
    async fn login(&self, username: &str, password: &str) -> Result<String> {
        info!(user = %username, "Logging in to Proxmox VE");
        
        let url = format!("{}/access/ticket", self.base_url);
        let response = self
            .http
            .post(&url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(|e| HypervisorError::ConnectionFailed(e.to_string()))?;
        
        if !response.status().is_success() {
            let status = response.status();
            return Err(HypervisorError::AuthFailed(format!(
                "login rejected with status {}",
                status
            )));
        }
        
        let envelope: Envelope<TicketData> = response
            .json()
            .await
            .map_err(|e| HypervisorError::InvalidResponse(format!("ticket response: {}", e)))?;
        
        let ticket = envelope.data.ticket;
        *self.ticket.write().await = Some(ticket.clone());
        Ok(ticket)
    }
    
    async fn authorize(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        match &self.auth {
            ProxmoxAuth::ApiToken { token_id, secret } => Ok(request.header(
                "Authorization",
                format!("PVEAPIToken={}={}", token_id, secret),
            )),
            ProxmoxAuth::Password { username, password } => {
                let cached = self.ticket.read().await.clone();
                let ticket = match cached {
                    Some(ticket) => ticket,
                    None => self.login(username, password).await?,
                };
                Ok(request.header("Cookie", format!("PVEAuthCookie={}", ticket)))
            }
        }
    }
    
    /// GET a path and unwrap the `data` envelope.
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "GET");
        
        let mut response = self.send_get(&url).await?;
        
        // Tickets expire after two hours; retry once with a fresh one.
        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            && matches!(self.auth, ProxmoxAuth::Password { .. })
        {
            *self.ticket.write().await = None;
            response = self.send_get(&url).await?;
        }
        
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(HypervisorError::AuthFailed(format!("GET {} unauthorized", path)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HypervisorError::RequestFailed {
                status: status.as_u16(),
                body,
            });
        }
        
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| HypervisorError::InvalidResponse(format!("GET {}: {}", path, e)))?;
        Ok(envelope.data)
    }
    
    async fn send_get(&self, url: &str) -> Result<reqwest::Response> {
        self.authorize(self.http.get(url))
            .await?
            .send()
            .await
            .map_err(|e| HypervisorError::ConnectionFailed(e.to_string()))
    }
}

fn api_base_url(host: &str, port: u16) -> String {
    let host = host.trim().trim_end_matches('/');
    let host = host
        .strip_prefix("https://")
        .or_else(|| host.strip_prefix("http://"))
        .unwrap_or(host);
    format!("https://{}:{}/api2/json", host, port)
}

#[async_trait]
impl HypervisorSource for ProxmoxClient {
    fn name(&self) -> &str {
        "proxmox"
    }
    
    async fn list_nodes(&self) -> Result<Vec<NodeListItem>> {
        self.get("/nodes").await
    }
    
    #[instrument(skip(self))]
    async fn list_vms(&self, node: &str) -> Result<Vec<VmListItem>> {
        self.get(&format!("/nodes/{}/qemu", urlencoding::encode(node))).await
    }
    
    #[instrument(skip(self))]
    async fn get_vm_config(&self, node: &str, vmid: u32) -> Result<VmConfig> {
        let raw: serde_json::Value = self
            .get(&format!("/nodes/{}/qemu/{}/config", urlencoding::encode(node), vmid))
            .await?;
        VmConfig::from_json(raw)
    }
    
    #[instrument(skip(self))]
    async fn get_guest_network(&self, node: &str, vmid: u32) -> Result<Vec<GuestInterface>> {
        let path = format!(
            "/nodes/{}/qemu/{}/agent/network-get-interfaces",
            urlencoding::encode(node),
            vmid
        );
        
        // Proxmox answers 500 when the agent is not configured or not running.
        match self.get::<AgentResult>(&path).await {
            Ok(result) => Ok(result.result),
            Err(HypervisorError::RequestFailed { status: 500, body }) => {
                Err(HypervisorError::AgentUnavailable(if body.is_empty() {
                    format!("guest agent did not answer for VM {}", vmid)
                } else {
                    body
                }))
            }
            Err(e) => Err(e),
        }
    }
    
    async fn get_cluster_status(&self) -> Result<Vec<ClusterStatusEntry>> {
        // Entries of other types (e.g. "quorum") are not modelled.
        let raw: Vec<serde_json::Value> = self.get("/cluster/status").await?;
        raw.into_iter()
            .filter(|entry| {
                matches!(
                    entry.get("type").and_then(|t| t.as_str()),
                    Some("cluster") | Some("node")
                )
            })
            .map(|entry| {
                serde_json::from_value(entry)
                    .map_err(|e| HypervisorError::InvalidResponse(format!("cluster status: {}", e)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    fn settings(auth: ProxmoxAuth) -> ProxmoxSettings {
        ProxmoxSettings {
            host: "pve.example.com".to_string(),
            port: DEFAULT_PORT,
            auth,
            verify_tls: true,
            timeout: Duration::from_secs(10),
        }
    }
    
    #[test]
    fn test_rejects_empty_credentials() {
        let err = ProxmoxClient::new(settings(ProxmoxAuth::Password {
            username: "api@pve".to_string(),
            password: String::new(),
        }))
        .err()
        .unwrap();
        assert!(matches!(err, HypervisorError::InvalidConfig(_)));
        
        let mut s = settings(ProxmoxAuth::ApiToken {
            token_id: "api@pve!sync".to_string(),
            secret: "secret".to_string(),
        });
        s.host = " ".to_string();
        assert!(ProxmoxClient::new(s).is_err());
    }
    
    #[test]
    fn test_base_url() {
        assert_eq!(
            api_base_url("pve.example.com", DEFAULT_PORT),
            "https://pve.example.com:8006/api2/json"
        );
        assert_eq!(
            api_base_url("https://10.0.0.2/", 443),
            "https://10.0.0.2:443/api2/json"
        );
    }
}
