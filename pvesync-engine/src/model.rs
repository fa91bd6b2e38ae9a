//! Normalized inventory tree.
//!
//! Built once per run from the hypervisor and immutable afterwards, except
//! for the target identifiers which are filled in as entities are found or
//! created.

use pvesync_inventory::{TargetId, VmStatus};
use serde::Serialize;
use std::collections::BTreeSet;

// =============================================================================
// TARGET REFERENCES
// =============================================================================

/// Write-once identifier of an entity in the inventory system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TargetRef(Option<TargetId>);

impl TargetRef {
    pub fn get(&self) -> Option<TargetId> {
        self.0
    }
    
    pub fn is_resolved(&self) -> bool {
        self.0.is_some()
    }
    
    /// Record the identifier. Once set it never changes; the identifier in
    /// effect is returned.
    pub fn resolve(&mut self, id: TargetId) -> TargetId {
        *self.0.get_or_insert(id)
    }
}

// =============================================================================
// TREE
// =============================================================================

/// Everything discovered in one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InventoryTree {
    /// Present only in cluster pin mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_type: Option<ClusterType>,
    /// Present only in cluster pin mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<Cluster>,
    pub nodes: Vec<Node>,
}

impl InventoryTree {
    /// Iterate all VMs in node order, then VM order.
    pub fn vms(&self) -> impl Iterator<Item = &VirtualMachine> {
        self.nodes.iter().flat_map(|n| n.vms.iter())
    }
    
    pub fn vm_count(&self) -> usize {
        self.nodes.iter().map(|n| n.vms.len()).sum()
    }
    
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterType {
    pub name: String,
    pub slug: String,
    pub target_id: TargetRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cluster {
    pub name: String,
    /// Hypervisor-side identifier ("cluster")
    pub source_id: String,
    pub member_node_names: BTreeSet<String>,
    pub target_id: TargetRef,
}

// =============================================================================
// NODES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Offline,
    Unknown,
}

impl NodeStatus {
    pub fn from_api(status: &str) -> Self {
        match status {
            "online" => NodeStatus::Online,
            "offline" => NodeStatus::Offline,
            _ => NodeStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub name: String,
    pub status: NodeStatus,
    /// Device this node is pinned to (node pin mode only)
    pub target_device_id: TargetRef,
    pub vms: Vec<VirtualMachine>,
}

impl Node {
    pub fn new(name: impl Into<String>, status: NodeStatus) -> Self {
        Self {
            name: name.into(),
            status,
            target_device_id: TargetRef::default(),
            vms: Vec::new(),
        }
    }
}

// =============================================================================
// VIRTUAL MACHINES
// =============================================================================

/// Power state as reported by the hypervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    Running,
    Stopped,
    Suspended,
    Unknown,
}

impl PowerState {
    pub fn from_api(status: &str) -> Self {
        match status {
            "running" => PowerState::Running,
            "stopped" => PowerState::Stopped,
            "suspended" | "paused" => PowerState::Suspended,
            _ => PowerState::Unknown,
        }
    }
    
    /// Status recorded in the inventory: only a running guest is active.
    pub fn target_status(&self) -> VmStatus {
        match self {
            PowerState::Running => VmStatus::Active,
            _ => VmStatus::Offline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirtualMachine {
    /// Unique per hypervisor cluster only
    pub source_vm_id: u32,
    pub name: String,
    pub status: PowerState,
    /// sockets × cores
    pub vcpus: u32,
    pub memory_mb: u64,
    pub node_name: String,
    pub disks: Vec<Disk>,
    pub nics: Vec<NetworkInterface>,
    pub target_id: TargetRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Disk {
    /// Configuration key, e.g. "scsi0"
    pub slot_key: String,
    pub size_mb: u64,
    pub target_id: TargetRef,
}

impl Disk {
    pub fn new(slot_key: impl Into<String>, size_mb: u64) -> Self {
        Self {
            slot_key: slot_key.into(),
            size_mb,
            target_id: TargetRef::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInterface {
    /// Configuration key, e.g. "net0"
    pub slot_key: String,
    /// Emulated NIC model, e.g. "virtio"
    pub model: String,
    /// Lower-cased, colon-delimited
    pub mac: String,
    /// Interface name inside the guest; `None` when not enriched
    pub guest_name: Option<String>,
    pub ip_addresses: Vec<IpAddress>,
    pub target_id: TargetRef,
    pub mac_target_id: TargetRef,
}

impl NetworkInterface {
    pub fn new(slot_key: impl Into<String>, model: impl Into<String>, mac: impl Into<String>) -> Self {
        Self {
            slot_key: slot_key.into(),
            model: model.into(),
            mac: mac.into(),
            guest_name: None,
            ip_addresses: Vec::new(),
            target_id: TargetRef::default(),
            mac_target_id: TargetRef::default(),
        }
    }
    
    pub fn is_enriched(&self) -> bool {
        self.guest_name.is_some()
    }
    
    /// Name the interface is recorded under in the inventory.
    pub fn inventory_name(&self) -> &str {
        self.guest_name.as_deref().unwrap_or(&self.slot_key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    Ipv4,
    Ipv6,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpAddress {
    pub family: IpFamily,
    /// CIDR notation, "ip/prefix"
    pub address: String,
    pub target_id: TargetRef,
}

impl IpAddress {
    pub fn new(family: IpFamily, address: impl Into<String>) -> Self {
        Self {
            family,
            address: address.into(),
            target_id: TargetRef::default(),
        }
    }
}
