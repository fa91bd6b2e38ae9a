//! Entity kinds and create payloads of the inventory-of-record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned by the inventory system.
pub type TargetId = u64;

/// Content type NetBox uses for VM interfaces in generic relations.
pub const VM_INTERFACE_OBJECT_TYPE: &str = "virtualization.vminterface";

// =============================================================================
// ENTITY KINDS
// =============================================================================

/// Kinds of entity the engine reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Device,
    ClusterType,
    Cluster,
    VirtualMachine,
    Interface,
    MacAddress,
    IpAddress,
    VirtualDisk,
}

impl EntityKind {
    /// All kinds, in dependency order.
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Device,
        EntityKind::ClusterType,
        EntityKind::Cluster,
        EntityKind::VirtualMachine,
        EntityKind::MacAddress,
        EntityKind::Interface,
        EntityKind::IpAddress,
        EntityKind::VirtualDisk,
    ];
    
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Device => "device",
            EntityKind::ClusterType => "cluster-type",
            EntityKind::Cluster => "cluster",
            EntityKind::VirtualMachine => "virtual-machine",
            EntityKind::Interface => "interface",
            EntityKind::MacAddress => "mac-address",
            EntityKind::IpAddress => "ip-address",
            EntityKind::VirtualDisk => "virtual-disk",
        }
    }
    
    /// Field used for natural-key lookups, if the kind has one.
    ///
    /// Interfaces and virtual disks are only ever created under a freshly
    /// created VM, so they are never looked up.
    pub fn natural_key_field(&self) -> Option<&'static str> {
        match self {
            EntityKind::Device => Some("name"),
            EntityKind::ClusterType => Some("slug"),
            EntityKind::Cluster => Some("name"),
            EntityKind::VirtualMachine => Some("name"),
            EntityKind::MacAddress => Some("mac_address"),
            EntityKind::IpAddress => Some("address"),
            EntityKind::Interface | EntityKind::VirtualDisk => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// STATUS VALUES
// =============================================================================

/// Operational status of a virtual machine in the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmStatus {
    Active,
    Offline,
}

/// Status of an IP address in the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpStatus {
    Active,
}

// =============================================================================
// CREATE PAYLOADS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClusterType {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCluster {
    pub name: String,
    #[serde(rename = "type")]
    pub cluster_type: TargetId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVirtualMachine {
    pub name: String,
    pub status: VmStatus,
    pub vcpus: u32,
    /// Memory in MB
    pub memory: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<TargetId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<TargetId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMacAddress {
    /// Lower-cased, colon-delimited
    pub mac_address: String,
}

/// A VM interface. NetBox only accepts a primary MAC that is already
/// assigned to the interface, so the MAC is linked after creation with
/// [`InventoryTarget::assign_primary_mac`](crate::InventoryTarget::assign_primary_mac).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInterface {
    pub virtual_machine: TargetId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIpAddress {
    /// CIDR notation ("10.0.0.5/24")
    pub address: String,
    pub status: IpStatus,
    pub assigned_object_type: String,
    pub assigned_object_id: TargetId,
}

impl NewIpAddress {
    /// An active address assigned to a VM interface.
    pub fn on_interface(address: impl Into<String>, interface: TargetId) -> Self {
        Self {
            address: address.into(),
            status: IpStatus::Active,
            assigned_object_type: VM_INTERFACE_OBJECT_TYPE.to_string(),
            assigned_object_id: interface,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVirtualDisk {
    pub virtual_machine: TargetId,
    pub name: String,
    /// Size in MB
    pub size: u64,
}

/// Any entity the engine may create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum NewEntity {
    ClusterType(NewClusterType),
    Cluster(NewCluster),
    VirtualMachine(NewVirtualMachine),
    MacAddress(NewMacAddress),
    Interface(NewInterface),
    IpAddress(NewIpAddress),
    VirtualDisk(NewVirtualDisk),
}

impl NewEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            NewEntity::ClusterType(_) => EntityKind::ClusterType,
            NewEntity::Cluster(_) => EntityKind::Cluster,
            NewEntity::VirtualMachine(_) => EntityKind::VirtualMachine,
            NewEntity::MacAddress(_) => EntityKind::MacAddress,
            NewEntity::Interface(_) => EntityKind::Interface,
            NewEntity::IpAddress(_) => EntityKind::IpAddress,
            NewEntity::VirtualDisk(_) => EntityKind::VirtualDisk,
        }
    }
    
    /// Value of the kind's natural key, or the entity name for kinds without one.
    pub fn key(&self) -> &str {
        match self {
            NewEntity::ClusterType(e) => &e.slug,
            NewEntity::Cluster(e) => &e.name,
            NewEntity::VirtualMachine(e) => &e.name,
            NewEntity::MacAddress(e) => &e.mac_address,
            NewEntity::Interface(e) => &e.name,
            NewEntity::IpAddress(e) => &e.address,
            NewEntity::VirtualDisk(e) => &e.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    
    #[test]
    fn test_vm_payload_omits_unset_placement() {
        let vm = NewEntity::VirtualMachine(NewVirtualMachine {
            name: "web".to_string(),
            status: VmStatus::Active,
            vcpus: 2,
            memory: 4096,
            cluster: None,
            device: Some(7),
        });
        assert_eq!(
            serde_json::to_value(&vm).unwrap(),
            json!({ "name": "web", "status": "active", "vcpus": 2, "memory": 4096, "device": 7 })
        );
        assert_eq!(vm.kind(), EntityKind::VirtualMachine);
        assert_eq!(vm.key(), "web");
    }
    
    #[test]
    fn test_cluster_and_ip_payloads() {
        let cluster = NewEntity::Cluster(NewCluster { name: "lab".to_string(), cluster_type: 3 });
        assert_eq!(serde_json::to_value(&cluster).unwrap(), json!({ "name": "lab", "type": 3 }));
        
        let ip = NewEntity::IpAddress(NewIpAddress::on_interface("10.0.0.5/24", 11));
        assert_eq!(
            serde_json::to_value(&ip).unwrap(),
            json!({
                "address": "10.0.0.5/24",
                "status": "active",
                "assigned_object_type": "virtualization.vminterface",
                "assigned_object_id": 11
            })
        );
    }
    
    #[test]
    fn test_interface_payload_has_no_primary_mac() {
        let nic = NewEntity::Interface(NewInterface {
            virtual_machine: 4,
            name: "eth0".to_string(),
        });
        assert_eq!(serde_json::to_value(&nic).unwrap(), json!({ "virtual_machine": 4, "name": "eth0" }));
        assert_eq!(nic.key(), "eth0");
    }
    
    #[test]
    fn test_natural_keys() {
        assert_eq!(EntityKind::ClusterType.natural_key_field(), Some("slug"));
        assert_eq!(EntityKind::IpAddress.natural_key_field(), Some("address"));
        assert_eq!(EntityKind::VirtualDisk.natural_key_field(), None);
        assert_eq!(EntityKind::MacAddress.to_string(), "mac-address");
    }
}
