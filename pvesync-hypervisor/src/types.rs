//! Wire types returned by the hypervisor API.
//!
//! These mirror the Proxmox VE JSON payloads closely and are validated when
//! they are deserialized, so that a missing or mistyped field surfaces as a
//! [`HypervisorError::InvalidResponse`](crate::HypervisorError) at the
//! collaborator boundary instead of deep inside the engine.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{HypervisorError, Result};

// =============================================================================
// NODES
// =============================================================================

/// A node as returned by `GET /nodes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeListItem {
    /// The node name (e.g., "pve01")
    pub node: String,
    /// Node status as reported ("online", "offline", "unknown")
    #[serde(default = "unknown_status")]
    pub status: String,
}

impl NodeListItem {
    pub fn new(node: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            status: status.into(),
        }
    }
}

// =============================================================================
// VIRTUAL MACHINES
// =============================================================================

/// A QEMU guest as returned by `GET /nodes/{node}/qemu`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmListItem {
    /// Hypervisor-scoped VM ID, unique per cluster but not across clusters
    #[serde(deserialize_with = "deserialize_vmid")]
    pub vmid: u32,
    /// Display name (absent for half-created guests)
    #[serde(default)]
    pub name: Option<String>,
    /// Power state ("running", "stopped", ...)
    #[serde(default = "unknown_status")]
    pub status: String,
    /// Whether this guest is a template
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub template: bool,
}

impl VmListItem {
    pub fn new(vmid: u32, name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            vmid,
            name: Some(name.into()),
            status: status.into(),
            template: false,
        }
    }
    
    /// Mark this guest as a template.
    pub fn as_template(mut self) -> Self {
        self.template = true;
        self
    }
    
    /// Name to use for the guest, falling back to `VM <vmid>`.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("VM {}", self.vmid),
        }
    }
}

/// Raw VM configuration as returned by `GET /nodes/{node}/qemu/{vmid}/config`.
///
/// The configuration is a flat key/value map whose key prefixes are
/// overloaded (`scsi0` is a disk, `scsihw` is a controller setting, `net0` a
/// NIC). Entries keep the order in which the API returned them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Map<String, Value>", into = "serde_json::Map<String, Value>")]
pub struct VmConfig {
    entries: Vec<(String, String)>,
}

impl VmConfig {
    /// Build a configuration from ordered key/value pairs.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
    
    /// Look up a value by exact key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
    
    /// Check whether a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }
    
    /// Iterate entries in source order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
    
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    
    /// Convert a JSON object into an ordered string map.
    ///
    /// Scalars are stringified; nested arrays or objects are rejected because
    /// the configuration endpoint never produces them.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Self::try_from(map),
            other => Err(HypervisorError::InvalidResponse(format!(
                "VM config must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }
}

impl TryFrom<serde_json::Map<String, Value>> for VmConfig {
    type Error = HypervisorError;
    
    fn try_from(map: serde_json::Map<String, Value>) -> Result<Self> {
        let mut entries = Vec::with_capacity(map.len());
        for (key, value) in map {
            let text = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => if b { "1".to_string() } else { "0".to_string() },
                Value::Null => continue,
                other => {
                    return Err(HypervisorError::InvalidResponse(format!(
                        "VM config key '{}' has unsupported {} value",
                        key,
                        json_type_name(&other)
                    )));
                }
            };
            entries.push((key, text));
        }
        Ok(Self { entries })
    }
}

impl From<VmConfig> for serde_json::Map<String, Value> {
    fn from(config: VmConfig) -> Self {
        config
            .entries
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect()
    }
}

// =============================================================================
// GUEST AGENT
// =============================================================================

/// One interface from the guest agent's `network-get-interfaces` report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestInterface {
    /// Interface name inside the guest (e.g., "eth0")
    pub name: String,
    /// MAC address as reported by the guest (case varies)
    #[serde(rename = "hardware-address", default)]
    pub hardware_address: Option<String>,
    /// Addresses bound to the interface
    #[serde(rename = "ip-addresses", default)]
    pub ip_addresses: Vec<GuestIpAddress>,
}

impl GuestInterface {
    pub fn new(name: impl Into<String>, hardware_address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hardware_address: Some(hardware_address.into()),
            ip_addresses: Vec::new(),
        }
    }
    
    /// Add an address.
    pub fn with_ip(
        mut self,
        ip_address: impl Into<String>,
        ip_address_type: impl Into<String>,
        prefix: u8,
    ) -> Self {
        self.ip_addresses.push(GuestIpAddress {
            ip_address: ip_address.into(),
            ip_address_type: ip_address_type.into(),
            prefix,
        });
        self
    }
}

/// An address reported by the guest agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestIpAddress {
    #[serde(rename = "ip-address")]
    pub ip_address: String,
    /// "ipv4" or "ipv6"
    #[serde(rename = "ip-address-type")]
    pub ip_address_type: String,
    pub prefix: u8,
}

// =============================================================================
// CLUSTER
// =============================================================================

/// Kind of a `GET /cluster/status` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterEntryKind {
    Cluster,
    Node,
}

/// One entry of `GET /cluster/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatusEntry {
    #[serde(rename = "type")]
    pub kind: ClusterEntryKind,
    /// Cluster name or node name
    pub name: String,
    /// Entry ID ("cluster" or "node/<name>")
    #[serde(default)]
    pub id: Option<String>,
    /// Number of member nodes (cluster entries only)
    #[serde(default)]
    pub nodes: Option<u32>,
    /// Whether the node is online (node entries only)
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub online: bool,
}

impl ClusterStatusEntry {
    pub fn cluster(name: impl Into<String>, nodes: u32) -> Self {
        Self {
            kind: ClusterEntryKind::Cluster,
            name: name.into(),
            id: Some("cluster".to_string()),
            nodes: Some(nodes),
            online: false,
        }
    }
    
    pub fn node(name: impl Into<String>, online: bool) -> Self {
        let name = name.into();
        Self {
            kind: ClusterEntryKind::Node,
            id: Some(format!("node/{}", name)),
            name,
            nodes: None,
            online,
        }
    }
}

// =============================================================================
// DESERIALIZATION HELPERS
// =============================================================================

fn unknown_status() -> String {
    "unknown".to_string()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Accept `1`, `"1"`, `true` (and their negatives) as a boolean flag.
fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Bool(b) => Ok(b),
        Value::Number(n) => Ok(n.as_i64().unwrap_or(0) != 0),
        Value::String(s) => Ok(matches!(s.as_str(), "1" | "true" | "yes")),
        Value::Null => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected a flag, got {}",
            json_type_name(&other)
        ))),
    }
}

/// VM IDs arrive as integers, but some endpoints quote them.
fn deserialize_vmid<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| serde::de::Error::custom(format!("invalid vmid {}", n))),
        Value::String(s) => s
            .parse::<u32>()
            .map_err(|_| serde::de::Error::custom(format!("invalid vmid '{}'", s))),
        other => Err(serde::de::Error::custom(format!(
            "expected a vmid, got {}",
            json_type_name(other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    
    #[test]
    fn test_vm_config_keeps_source_order() {
        let config: VmConfig = serde_json::from_value(json!({
            "scsi1": "local:vm-100-disk-1,size=8G",
            "agent": "1",
            "memory": 4096,
            "scsi0": "local:vm-100-disk-0,size=32G",
            "numa": 0,
        }))
        .unwrap();
        
        let keys: Vec<&str> = config.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["scsi1", "agent", "memory", "scsi0", "numa"]);
        assert_eq!(config.get("memory"), Some("4096"));
        assert_eq!(config.get("numa"), Some("0"));
    }
    
    #[test]
    fn test_vm_config_rejects_nested_values() {
        let err = VmConfig::from_json(json!({ "net0": ["virtio"] })).unwrap_err();
        assert!(matches!(err, HypervisorError::InvalidResponse(_)));
        
        let err = VmConfig::from_json(json!("not an object")).unwrap_err();
        assert!(err.to_string().contains("string"));
    }
    
    #[test]
    fn test_vm_list_item_flags() {
        let vm: VmListItem = serde_json::from_value(json!({
            "vmid": "9000",
            "name": "ubuntu-template",
            "status": "stopped",
            "template": 1,
        }))
        .unwrap();
        assert_eq!(vm.vmid, 9000);
        assert!(vm.template);
        
        let vm: VmListItem = serde_json::from_value(json!({ "vmid": 101 })).unwrap();
        assert_eq!(vm.status, "unknown");
        assert_eq!(vm.display_name(), "VM 101");
    }
    
    #[test]
    fn test_guest_interface_schema() {
        let iface: GuestInterface = serde_json::from_value(json!({
            "name": "eth0",
            "hardware-address": "aa:bb:cc:dd:ee:ff",
            "ip-addresses": [
                { "ip-address": "10.0.0.5", "ip-address-type": "ipv4", "prefix": 24 }
            ],
            "statistics": { "rx-bytes": 1 }
        }))
        .unwrap();
        assert_eq!(iface.hardware_address.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(iface.ip_addresses[0].prefix, 24);
        
        let lo: GuestInterface = serde_json::from_value(json!({ "name": "lo" })).unwrap();
        assert!(lo.ip_addresses.is_empty());
    }
    
    #[test]
    fn test_cluster_status_entries() {
        let entries: Vec<ClusterStatusEntry> = serde_json::from_value(json!([
            { "type": "cluster", "name": "lab", "id": "cluster", "nodes": 2, "quorate": 1 },
            { "type": "node", "name": "pve01", "id": "node/pve01", "online": 1 },
            { "type": "node", "name": "pve02", "id": "node/pve02", "online": 0 },
        ]))
        .unwrap();
        assert_eq!(entries[0].kind, ClusterEntryKind::Cluster);
        assert!(entries[1].online);
        assert!(!entries[2].online);
    }
}
