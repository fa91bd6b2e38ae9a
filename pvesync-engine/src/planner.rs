//! Natural-key lookups that decide what the executor has to create.
//!
//! Planning only reads from the inventory. Every lookup the placement
//! policy depends on happens here, so a validation failure aborts the run
//! before a single VM is written.

use pvesync_inventory::{EntityKind, InventoryTarget, TargetId};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::model::{InventoryTree, NetworkInterface, VirtualMachine};
use crate::policy::{PinMode, PinPolicy};
use crate::summary::{SyncContext, SyncSummary};

/// What to do with one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "id")]
pub enum Action {
    /// Not found, create it.
    Create,
    /// Found under this identifier.
    Exists(TargetId),
}

impl Action {
    fn from_lookup(found: Option<TargetId>) -> Self {
        found.map(Action::Exists).unwrap_or(Action::Create)
    }
}

/// A planned cluster-level entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub kind: EntityKind,
    pub key: String,
    pub action: Action,
}

/// A node matched to an existing device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceMatch {
    pub node_index: usize,
    pub name: String,
    pub device_id: TargetId,
}

/// A planned VM. Indexes point into the tree the plan was made from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmStep {
    pub node_index: usize,
    pub vm_index: usize,
    pub name: String,
    pub action: Action,
}

/// Ordered reconciliation plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub mode: PinMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_type: Option<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<Step>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceMatch>,
    pub vms: Vec<VmStep>,
}

impl Plan {
    /// Number of VMs that would be created.
    pub fn vms_to_create(&self) -> usize {
        self.vms.iter().filter(|v| v.action == Action::Create).count()
    }
}

/// Plans a run against an [`InventoryTarget`].
pub struct ReconciliationPlanner<'a> {
    target: &'a dyn InventoryTarget,
}

impl<'a> ReconciliationPlanner<'a> {
    pub fn new(target: &'a dyn InventoryTarget) -> Self {
        Self { target }
    }
    
    /// Look up every prerequisite and every VM.
    ///
    /// Under node pinning all unmatched node names are collected into one
    /// validation error. A failed VM lookup drops that VM only; failed
    /// lookups of cluster-level entities or devices end the run.
    #[instrument(skip_all, fields(run_id = %ctx.run_id, mode = %policy.mode()))]
    pub async fn plan(
        &self,
        tree: &InventoryTree,
        policy: &PinPolicy,
        ctx: &mut SyncContext,
    ) -> Result<Plan> {
        let mut plan = Plan {
            mode: policy.mode(),
            cluster_type: None,
            cluster: None,
            devices: Vec::new(),
            vms: Vec::new(),
        };
        
        if policy.requires_cluster() {
            let (cluster_type, cluster) = match (&tree.cluster_type, &tree.cluster) {
                (Some(t), Some(c)) => (t, c),
                _ => {
                    return Err(SyncError::validation(
                        "cluster pin mode requires a discovered cluster",
                        Vec::new(),
                    ))
                }
            };
            plan.cluster_type = Some(self.lookup(EntityKind::ClusterType, &cluster_type.slug).await?);
            plan.cluster = Some(self.lookup(EntityKind::Cluster, &cluster.name).await?);
        }
        
        if policy.requires_devices() {
            let mut unmatched = Vec::new();
            for (node_index, node) in tree.nodes.iter().enumerate() {
                match self.target.find(EntityKind::Device, &node.name).await? {
                    Some(device_id) => plan.devices.push(DeviceMatch {
                        node_index,
                        name: node.name.clone(),
                        device_id,
                    }),
                    None => unmatched.push(node.name.clone()),
                }
            }
            if !unmatched.is_empty() {
                return Err(SyncError::validation(
                    format!("{} hypervisor node(s) have no matching device", unmatched.len()),
                    unmatched,
                ));
            }
            info!(matched = plan.devices.len(), "All nodes matched to devices");
        }
        
        for (node_index, node) in tree.nodes.iter().enumerate() {
            for (vm_index, vm) in node.vms.iter().enumerate() {
                match self.target.find(EntityKind::VirtualMachine, &vm.name).await {
                    Ok(found) => {
                        let action = Action::from_lookup(found);
                        debug!(vm = %vm.name, ?action, "Planned VM");
                        plan.vms.push(VmStep {
                            node_index,
                            vm_index,
                            name: vm.name.clone(),
                            action,
                        });
                    }
                    Err(e) => {
                        warn!(vm = %vm.name, error = %e, "VM lookup failed, VM dropped");
                        count_subtree(&mut ctx.summary, vm, SyncSummary::dropped);
                    }
                }
            }
        }
        
        info!(
            vms = plan.vms.len(),
            to_create = plan.vms_to_create(),
            "Reconciliation planned"
        );
        Ok(plan)
    }
    
    async fn lookup(&self, kind: EntityKind, key: &str) -> Result<Step> {
        let found = self.target.find(kind, key).await?;
        debug!(entity = %kind, key = %key, ?found, "Looked up prerequisite");
        Ok(Step {
            kind,
            key: key.to_string(),
            action: Action::from_lookup(found),
        })
    }
}

/// Apply `count` to a VM and every entity beneath it.
pub(crate) fn count_subtree(summary: &mut SyncSummary, vm: &VirtualMachine, count: fn(&mut SyncSummary, EntityKind)) {
    count(summary, EntityKind::VirtualMachine);
    for nic in &vm.nics {
        count_nic(summary, nic, count);
    }
    for _ in &vm.disks {
        count(summary, EntityKind::VirtualDisk);
    }
}

/// Apply `count` to a NIC, its MAC and its addresses.
pub(crate) fn count_nic(summary: &mut SyncSummary, nic: &NetworkInterface, count: fn(&mut SyncSummary, EntityKind)) {
    count(summary, EntityKind::MacAddress);
    count(summary, EntityKind::Interface);
    for _ in &nic.ip_addresses {
        count(summary, EntityKind::IpAddress);
    }
}
