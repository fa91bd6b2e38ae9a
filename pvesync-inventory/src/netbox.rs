//! NetBox REST backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{InventoryError, Result};
use crate::traits::InventoryTarget;
use crate::types::{EntityKind, NewEntity, TargetId, VM_INTERFACE_OBJECT_TYPE};

/// Connection settings for [`NetBoxClient`].
#[derive(Debug, Clone)]
pub struct NetBoxSettings {
    /// Base URL, e.g. `https://netbox.example.com`
    pub url: String,
    /// API token
    pub token: String,
    /// Verify the server certificate
    pub verify_tls: bool,
    /// Per-request timeout
    pub timeout: Duration,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    results: Vec<IdOnly>,
}

#[derive(Deserialize)]
struct IdOnly {
    id: TargetId,
}

#[derive(Serialize)]
struct MacAssignment {
    assigned_object_type: &'static str,
    assigned_object_id: TargetId,
}

#[derive(Serialize)]
struct PrimaryMac {
    primary_mac_address: TargetId,
}

/// NetBox API client.
pub struct NetBoxClient {
    api_url: String,
    token: String,
    http: reqwest::Client,
}

impl NetBoxClient {
    /// Create a new client. No request is sent until the first call.
    pub fn new(settings: NetBoxSettings) -> Result<Self> {
        if settings.url.trim().is_empty() {
            return Err(InventoryError::InvalidConfig("NetBox URL cannot be empty".to_string()));
        }
        if settings.token.is_empty() {
            return Err(InventoryError::InvalidConfig("NetBox token cannot be empty".to_string()));
        }
        
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!settings.verify_tls)
            .timeout(settings.timeout)
            .build()
            .map_err(|e| InventoryError::InvalidConfig(format!("Failed to build HTTP client: {}", e)))?;
        
        if !settings.verify_tls {
            warn!(url = %settings.url, "TLS certificate verification disabled for NetBox");
        }
        
        Ok(Self {
            api_url: api_base_url(&settings.url),
            token: settings.token,
            http,
        })
    }
    
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json")
    }
    
    /// PATCH one object; the response body is ignored.
    async fn patch<T: Serialize + Sync>(&self, kind: EntityKind, id: TargetId, body: &T) -> Result<()> {
        let url = format!("{}{}{}/", self.api_url, endpoint(kind), id);
        let response = self
            .authorize(self.http.patch(&url))
            .json(body)
            .send()
            .await
            .map_err(|e| InventoryError::ConnectionFailed(e.to_string()))?;
        Self::check_status(kind, response).await?;
        Ok(())
    }
    
    async fn check_status(kind: EntityKind, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(InventoryError::AuthFailed(format!("{} request returned {}", kind, status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InventoryError::RequestFailed {
                kind,
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

/// API path of each entity kind, relative to `/api/`.
pub fn endpoint(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Device => "dcim/devices/",
        EntityKind::ClusterType => "virtualization/cluster-types/",
        EntityKind::Cluster => "virtualization/clusters/",
        EntityKind::VirtualMachine => "virtualization/virtual-machines/",
        EntityKind::Interface => "virtualization/interfaces/",
        EntityKind::MacAddress => "dcim/mac-addresses/",
        EntityKind::IpAddress => "ipam/ip-addresses/",
        EntityKind::VirtualDisk => "virtualization/virtual-disks/",
    }
}

fn api_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    let url = url.strip_suffix("/api").unwrap_or(url);
    format!("{}/api/", url)
}

#[async_trait]
impl InventoryTarget for NetBoxClient {
    fn name(&self) -> &str {
        "netbox"
    }
    
    #[instrument(skip(self))]
    async fn find(&self, kind: EntityKind, key: &str) -> Result<Option<TargetId>> {
        let field = kind
            .natural_key_field()
            .ok_or_else(|| InventoryError::Internal(format!("{} has no natural key", kind)))?;
        
        let url = format!("{}{}", self.api_url, endpoint(kind));
        let response = self
            .authorize(self.http.get(&url))
            .query(&[(field, key), ("limit", "1")])
            .send()
            .await
            .map_err(|e| InventoryError::ConnectionFailed(e.to_string()))?;
        let response = Self::check_status(kind, response).await?;
        
        let list: ListResponse = response
            .json()
            .await
            .map_err(|e| InventoryError::InvalidResponse(format!("{} list: {}", kind, e)))?;
        
        let found = list.results.first().map(|r| r.id);
        debug!(found = ?found, "Lookup");
        Ok(found)
    }
    
    #[instrument(skip(self, entity), fields(kind = %entity.kind(), key = %entity.key()))]
    async fn create(&self, entity: &NewEntity) -> Result<TargetId> {
        let kind = entity.kind();
        let url = format!("{}{}", self.api_url, endpoint(kind));
        
        let response = self
            .authorize(self.http.post(&url))
            .json(entity)
            .send()
            .await
            .map_err(|e| InventoryError::ConnectionFailed(e.to_string()))?;
        
        if response.status() == reqwest::StatusCode::BAD_REQUEST {
            let reason = response.text().await.unwrap_or_default();
            return Err(InventoryError::CreateFailed {
                kind,
                key: entity.key().to_string(),
                reason,
            });
        }
        let response = Self::check_status(kind, response).await?;
        
        let created: IdOnly = response
            .json()
            .await
            .map_err(|e| InventoryError::InvalidResponse(format!("{} create: {}", kind, e)))?;
        Ok(created.id)
    }
    
    #[instrument(skip(self))]
    async fn assign_primary_mac(&self, interface: TargetId, mac: TargetId) -> Result<()> {
        let assignment = MacAssignment {
            assigned_object_type: VM_INTERFACE_OBJECT_TYPE,
            assigned_object_id: interface,
        };
        self.patch(EntityKind::MacAddress, mac, &assignment).await?;
        self.patch(EntityKind::Interface, interface, &PrimaryMac { primary_mac_address: mac })
            .await?;
        debug!("Primary MAC assigned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_api_base_url() {
        assert_eq!(api_base_url("https://netbox.example.com"), "https://netbox.example.com/api/");
        assert_eq!(api_base_url("https://netbox.example.com/api/"), "https://netbox.example.com/api/");
    }
    
    #[test]
    fn test_endpoints() {
        assert_eq!(endpoint(EntityKind::VirtualDisk), "virtualization/virtual-disks/");
        assert_eq!(endpoint(EntityKind::MacAddress), "dcim/mac-addresses/");
    }
    
    #[test]
    fn test_rejects_empty_token() {
        let result = NetBoxClient::new(NetBoxSettings {
            url: "https://netbox.example.com".to_string(),
            token: String::new(),
            verify_tls: true,
            timeout: Duration::from_secs(10),
        });
        assert!(matches!(result, Err(InventoryError::InvalidConfig(_))));
    }
}
