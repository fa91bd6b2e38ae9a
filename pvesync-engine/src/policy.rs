//! Placement policy for created VMs.

use pvesync_inventory::TargetId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SyncError};
use crate::model::{InventoryTree, Node};

/// Which placement foreign key created VMs carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinMode {
    /// Pin to the device that models the hypervisor node
    Node,
    /// Pin every VM to the hypervisor cluster
    Cluster,
    /// No placement
    #[default]
    #[serde(alias = "neither", alias = "none")]
    Unpinned,
}

impl FromStr for PinMode {
    type Err = String;
    
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "node" => Ok(PinMode::Node),
            "cluster" => Ok(PinMode::Cluster),
            "unpinned" | "neither" | "none" => Ok(PinMode::Unpinned),
            other => Err(format!("unknown pin mode '{}' (expected node, cluster or unpinned)", other)),
        }
    }
}

impl fmt::Display for PinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PinMode::Node => "node",
            PinMode::Cluster => "cluster",
            PinMode::Unpinned => "unpinned",
        })
    }
}

/// Name and slug of the cluster type created in cluster mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterTypeSpec {
    pub name: String,
    pub slug: String,
}

impl Default for ClusterTypeSpec {
    fn default() -> Self {
        Self {
            name: "Proxmox".to_string(),
            slug: "proxmox".to_string(),
        }
    }
}

/// Placement policy chosen once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinPolicy {
    /// Every node must resolve to an existing device by name.
    Node,
    /// A cluster type and cluster must exist (or be created) first.
    Cluster {
        cluster_type: ClusterTypeSpec,
        /// Overrides the name reported by the hypervisor
        cluster_name: Option<String>,
    },
    /// No placement key is set.
    Unpinned,
}

/// Placement foreign keys of one VM. At most one is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Placement {
    pub device: Option<TargetId>,
    pub cluster: Option<TargetId>,
}

impl PinPolicy {
    /// Build a policy from its mode using default cluster settings.
    pub fn from_mode(mode: PinMode) -> Self {
        match mode {
            PinMode::Node => PinPolicy::Node,
            PinMode::Cluster => PinPolicy::Cluster {
                cluster_type: ClusterTypeSpec::default(),
                cluster_name: None,
            },
            PinMode::Unpinned => PinPolicy::Unpinned,
        }
    }
    
    pub fn mode(&self) -> PinMode {
        match self {
            PinPolicy::Node => PinMode::Node,
            PinPolicy::Cluster { .. } => PinMode::Cluster,
            PinPolicy::Unpinned => PinMode::Unpinned,
        }
    }
    
    /// Whether every node must match an existing device.
    pub fn requires_devices(&self) -> bool {
        matches!(self, PinPolicy::Node)
    }
    
    /// Whether a cluster type and cluster must exist before any VM.
    pub fn requires_cluster(&self) -> bool {
        matches!(self, PinPolicy::Cluster { .. })
    }
    
    /// Resolve the placement of a VM hosted on `node`.
    ///
    /// Fails when the entity the policy pins to has not been resolved, which
    /// means the prerequisites were not validated before VM processing.
    pub fn placement(&self, tree: &InventoryTree, node: &Node) -> Result<Placement> {
        match self {
            PinPolicy::Node => {
                let device = node.target_device_id.get().ok_or_else(|| {
                    SyncError::validation(
                        format!("node {} has no matching device", node.name),
                        vec![node.name.clone()],
                    )
                })?;
                Ok(Placement {
                    device: Some(device),
                    cluster: None,
                })
            }
            PinPolicy::Cluster { .. } => {
                let cluster = tree
                    .cluster
                    .as_ref()
                    .and_then(|c| c.target_id.get())
                    .ok_or_else(|| SyncError::validation("cluster is not resolved", Vec::new()))?;
                Ok(Placement {
                    device: None,
                    cluster: Some(cluster),
                })
            }
            PinPolicy::Unpinned => Ok(Placement::default()),
        }
    }
}
