//! Applies a [`Plan`] to the inventory.

use pvesync_inventory::{
    EntityKind, InventoryError, InventoryTarget, NewCluster, NewClusterType, NewEntity, NewInterface,
    NewIpAddress, NewMacAddress, NewVirtualDisk, NewVirtualMachine, TargetId,
};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::model::{InventoryTree, NetworkInterface, VirtualMachine};
use crate::planner::{count_nic, count_subtree, Action, Plan, Step};
use crate::policy::{PinPolicy, Placement};
use crate::summary::{SyncContext, SyncSummary};

// =============================================================================
// OPERATOR CONFIRMATION
// =============================================================================

/// Asks the operator before a missing prerequisite is created.
pub trait Confirm: Send + Sync {
    /// Return `true` to go ahead.
    fn confirm(&self, prompt: &str) -> bool;
}

/// Accepts every prompt (`--yes`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// Declines every prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeNo;

impl Confirm for AssumeNo {
    fn confirm(&self, _prompt: &str) -> bool {
        false
    }
}

// =============================================================================
// EXECUTOR
// =============================================================================

/// Result of a find-or-create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolved {
    Found(TargetId),
    Created(TargetId),
}

impl Resolved {
    fn id(self) -> TargetId {
        match self {
            Resolved::Found(id) | Resolved::Created(id) => id,
        }
    }
    
    fn count(self, summary: &mut SyncSummary, kind: EntityKind) {
        match self {
            Resolved::Found(_) => summary.skipped(kind),
            Resolved::Created(_) => summary.created(kind),
        }
    }
}

/// Creates planned entities and writes their identifiers back into the tree.
pub struct ReconciliationExecutor<'a> {
    target: &'a dyn InventoryTarget,
    confirm: &'a dyn Confirm,
}

impl<'a> ReconciliationExecutor<'a> {
    pub fn new(target: &'a dyn InventoryTarget, confirm: &'a dyn Confirm) -> Self {
        Self { target, confirm }
    }
    
    /// Execute the plan.
    ///
    /// Prerequisites (cluster type, cluster, devices) are settled first and
    /// any failure there ends the run. After that each VM is isolated: a
    /// failed create drops the VM's subtree and the next VM is processed.
    ///
    /// A VM name is ingested at most once per run. A later VM whose name was
    /// already found or created is skipped with its children.
    #[instrument(skip_all, fields(run_id = %ctx.run_id, mode = %plan.mode))]
    pub async fn execute(
        &self,
        plan: &Plan,
        tree: &mut InventoryTree,
        policy: &PinPolicy,
        ctx: &mut SyncContext,
    ) -> Result<()> {
        self.settle_prerequisites(plan, tree, ctx).await?;
        
        let mut settled: HashMap<String, TargetId> = HashMap::new();
        
        for step in &plan.vms {
            let action = match (step.action, settled.get(&step.name)) {
                (Action::Create, Some(&id)) => {
                    warn!(vm = %step.name, id = id, "VM name already ingested in this run");
                    Action::Exists(id)
                }
                (action, _) => action,
            };
            
            let placement = match (action, tree.nodes.get(step.node_index)) {
                (Action::Create, Some(node)) => policy.placement(tree, node)?,
                _ => Placement::default(),
            };
            
            let Some(vm) = tree
                .nodes
                .get_mut(step.node_index)
                .and_then(|n| n.vms.get_mut(step.vm_index))
            else {
                warn!(vm = %step.name, "Planned VM is missing from the tree");
                continue;
            };
            
            match action {
                Action::Exists(id) => {
                    vm.target_id.resolve(id);
                    count_subtree(&mut ctx.summary, vm, SyncSummary::skipped);
                    info!(vm = %vm.name, id = id, "VM already exists, skipped with its children");
                }
                Action::Create => self.create_vm(vm, placement, &mut ctx.summary).await,
            }
            
            if let Some(id) = vm.target_id.get() {
                settled.entry(vm.name.clone()).or_insert(id);
            }
        }
        
        Ok(())
    }
    
    async fn settle_prerequisites(&self, plan: &Plan, tree: &mut InventoryTree, ctx: &mut SyncContext) -> Result<()> {
        if let (Some(step), Some(cluster_type)) = (&plan.cluster_type, tree.cluster_type.as_mut()) {
            let payload = NewEntity::ClusterType(NewClusterType {
                name: cluster_type.name.clone(),
                slug: cluster_type.slug.clone(),
            });
            let resolved = self.settle(step, &cluster_type.name, payload).await?;
            resolved.count(&mut ctx.summary, EntityKind::ClusterType);
            cluster_type.target_id.resolve(resolved.id());
        }
        
        if let Some(step) = &plan.cluster {
            let type_id = tree
                .cluster_type
                .as_ref()
                .and_then(|t| t.target_id.get())
                .ok_or_else(|| SyncError::validation("cluster type is not resolved", Vec::new()))?;
            let cluster = tree
                .cluster
                .as_mut()
                .ok_or_else(|| SyncError::validation("cluster pin mode requires a discovered cluster", Vec::new()))?;
            
            let payload = NewEntity::Cluster(NewCluster {
                name: cluster.name.clone(),
                cluster_type: type_id,
            });
            let resolved = self.settle(step, &cluster.name, payload).await?;
            resolved.count(&mut ctx.summary, EntityKind::Cluster);
            cluster.target_id.resolve(resolved.id());
        }
        
        for device in &plan.devices {
            if let Some(node) = tree.nodes.get_mut(device.node_index) {
                node.target_device_id.resolve(device.device_id);
                ctx.summary.skipped(EntityKind::Device);
            }
        }
        
        Ok(())
    }
    
    /// Resolve a cluster-level step, asking the operator before creating.
    async fn settle(&self, step: &Step, name: &str, payload: NewEntity) -> Result<Resolved> {
        match step.action {
            Action::Exists(id) => {
                debug!(entity = %step.kind, name = %name, id = id, "Prerequisite exists");
                Ok(Resolved::Found(id))
            }
            Action::Create => {
                if !self.confirm.confirm(&format!("{} '{}' does not exist. Create it?", step.kind, name)) {
                    return Err(SyncError::PolicyDecline {
                        kind: step.kind,
                        name: name.to_string(),
                    });
                }
                let id = self.target.create(&payload).await?;
                info!(entity = %step.kind, name = %name, id = id, "Prerequisite created");
                Ok(Resolved::Created(id))
            }
        }
    }
    
    #[instrument(skip_all, fields(vm = %vm.name))]
    async fn create_vm(&self, vm: &mut VirtualMachine, placement: Placement, summary: &mut SyncSummary) {
        let payload = NewEntity::VirtualMachine(NewVirtualMachine {
            name: vm.name.clone(),
            status: vm.status.target_status(),
            vcpus: vm.vcpus,
            memory: vm.memory_mb,
            cluster: placement.cluster,
            device: placement.device,
        });
        
        let vm_id = match self.target.create(&payload).await {
            Ok(id) => vm.target_id.resolve(id),
            Err(e) => {
                warn!(error = %e, "VM create failed, subtree dropped");
                count_subtree(summary, vm, SyncSummary::dropped);
                return;
            }
        };
        summary.created(EntityKind::VirtualMachine);
        
        for nic in vm.nics.iter_mut() {
            self.create_nic(vm_id, nic, summary).await;
        }
        
        for disk in vm.disks.iter_mut() {
            let payload = NewEntity::VirtualDisk(NewVirtualDisk {
                virtual_machine: vm_id,
                name: disk.slot_key.clone(),
                size: disk.size_mb,
            });
            match self.target.create(&payload).await {
                Ok(id) => {
                    disk.target_id.resolve(id);
                    summary.created(EntityKind::VirtualDisk);
                }
                Err(e) => {
                    warn!(disk = %disk.slot_key, error = %e, "Disk create failed");
                    summary.dropped(EntityKind::VirtualDisk);
                }
            }
        }
        
        info!(id = vm_id, nics = vm.nics.len(), disks = vm.disks.len(), "VM created");
    }
    
    /// MAC, then interface, then addresses. A failed MAC or interface drops
    /// the NIC with its addresses; a failed address drops only itself. The
    /// MAC is linked as primary once the interface exists.
    async fn create_nic(&self, vm_id: TargetId, nic: &mut NetworkInterface, summary: &mut SyncSummary) {
        let mac = NewEntity::MacAddress(NewMacAddress {
            mac_address: nic.mac.clone(),
        });
        let mac_id = match self.find_or_create(mac).await {
            Ok(resolved) => {
                resolved.count(summary, EntityKind::MacAddress);
                nic.mac_target_id.resolve(resolved.id())
            }
            Err(e) => {
                warn!(nic = %nic.slot_key, mac = %nic.mac, error = %e, "MAC address failed, NIC dropped");
                count_nic(summary, nic, SyncSummary::dropped);
                return;
            }
        };
        
        let interface = NewEntity::Interface(NewInterface {
            virtual_machine: vm_id,
            name: nic.inventory_name().to_string(),
        });
        let interface_id = match self.target.create(&interface).await {
            Ok(id) => {
                summary.created(EntityKind::Interface);
                nic.target_id.resolve(id)
            }
            Err(e) => {
                warn!(nic = %nic.slot_key, error = %e, "Interface create failed, NIC dropped");
                summary.dropped(EntityKind::Interface);
                for _ in &nic.ip_addresses {
                    summary.dropped(EntityKind::IpAddress);
                }
                return;
            }
        };
        
        // The interface stands without its primary MAC link; addresses still follow.
        if let Err(e) = self.target.assign_primary_mac(interface_id, mac_id).await {
            warn!(nic = %nic.slot_key, mac = %nic.mac, error = %e, "Failed to set primary MAC");
        }
        
        for ip in nic.ip_addresses.iter_mut() {
            let payload = NewEntity::IpAddress(NewIpAddress::on_interface(ip.address.clone(), interface_id));
            match self.find_or_create(payload).await {
                Ok(resolved) => {
                    resolved.count(summary, EntityKind::IpAddress);
                    ip.target_id.resolve(resolved.id());
                }
                Err(e) => {
                    warn!(address = %ip.address, error = %e, "IP address failed");
                    summary.dropped(EntityKind::IpAddress);
                }
            }
        }
    }
    
    async fn find_or_create(&self, payload: NewEntity) -> std::result::Result<Resolved, InventoryError> {
        let kind = payload.kind();
        if let Some(id) = self.target.find(kind, payload.key()).await? {
            debug!(entity = %kind, key = %payload.key(), id = id, "Reusing existing entity");
            return Ok(Resolved::Found(id));
        }
        Ok(Resolved::Created(self.target.create(&payload).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::planner::ReconciliationPlanner;
    use crate::policy::PinMode;
    use pvesync_inventory::MockInventory;
    
    fn vm(name: &str) -> VirtualMachine {
        let mut nic = NetworkInterface::new("net0", "virtio", "aa:bb:cc:dd:ee:ff");
        nic.guest_name = Some("eth0".to_string());
        nic.ip_addresses.push(IpAddress::new(IpFamily::Ipv4, "10.0.0.5/24"));
        VirtualMachine {
            source_vm_id: 100,
            name: name.to_string(),
            status: PowerState::Suspended,
            vcpus: 2,
            memory_mb: 4096,
            node_name: "pve01".to_string(),
            disks: vec![Disk::new("scsi0", 32768)],
            nics: vec![nic],
            target_id: TargetRef::default(),
        }
    }
    
    fn tree(vms: &[&str]) -> InventoryTree {
        let mut node = Node::new("pve01", NodeStatus::Online);
        node.vms = vms.iter().map(|n| vm(n)).collect();
        InventoryTree {
            cluster_type: None,
            cluster: None,
            nodes: vec![node],
        }
    }
    
    async fn run(target: &MockInventory, tree: &mut InventoryTree, policy: &PinPolicy, confirm: &dyn Confirm) -> Result<SyncContext> {
        let mut ctx = SyncContext::new();
        let plan = ReconciliationPlanner::new(target).plan(tree, policy, &mut ctx).await?;
        ReconciliationExecutor::new(target, confirm)
            .execute(&plan, tree, policy, &mut ctx)
            .await?;
        Ok(ctx)
    }
    
    #[tokio::test]
    async fn test_creates_in_dependency_order() {
        let target = MockInventory::new();
        let mut tree = tree(&["web"]);
        run(&target, &mut tree, &PinPolicy::Unpinned, &AssumeNo).await.unwrap();
        
        assert_eq!(
            target.created_kinds().unwrap(),
            vec![
                EntityKind::VirtualMachine,
                EntityKind::MacAddress,
                EntityKind::Interface,
                EntityKind::IpAddress,
                EntityKind::VirtualDisk,
            ]
        );
        
        let created = target.created().unwrap();
        match &created[0] {
            NewEntity::VirtualMachine(vm) => {
                assert_eq!(vm.status, pvesync_inventory::VmStatus::Offline);
                assert_eq!((vm.cluster, vm.device), (None, None));
            }
            other => panic!("unexpected entity: {other:?}"),
        }
        match &created[2] {
            NewEntity::Interface(nic) => assert_eq!(nic.name, "eth0"),
            other => panic!("unexpected entity: {other:?}"),
        }
        
        let vm = &tree.nodes[0].vms[0];
        assert!(vm.target_id.is_resolved());
        assert!(vm.nics[0].ip_addresses[0].target_id.is_resolved());
        
        let nic = &vm.nics[0];
        assert_eq!(
            target.primary_macs().unwrap(),
            vec![(nic.target_id.get().unwrap(), nic.mac_target_id.get().unwrap())]
        );
    }
    
    #[tokio::test]
    async fn test_failed_interface_drops_its_addresses() {
        let target = MockInventory::new();
        target.fail_create(EntityKind::Interface, "eth0").unwrap();
        let mut tree = tree(&["web"]);
        
        let ctx = run(&target, &mut tree, &PinPolicy::Unpinned, &AssumeYes).await.unwrap();
        
        assert_eq!(ctx.summary.get(EntityKind::MacAddress).created, 1);
        assert_eq!(ctx.summary.get(EntityKind::Interface).dropped, 1);
        assert_eq!(ctx.summary.get(EntityKind::IpAddress).dropped, 1);
        assert_eq!(target.created_count(EntityKind::IpAddress).unwrap(), 0);
        assert_eq!(ctx.summary.get(EntityKind::VirtualDisk).created, 1);
        assert!(target.primary_macs().unwrap().is_empty());
    }
    
    #[tokio::test]
    async fn test_failed_address_drops_only_itself() {
        let target = MockInventory::new();
        target.fail_create(EntityKind::IpAddress, "10.0.0.5/24").unwrap();
        let mut tree = tree(&["web"]);
        tree.nodes[0].vms[0].nics[0]
            .ip_addresses
            .push(IpAddress::new(IpFamily::Ipv6, "2001:db8::5/64"));
        
        let ctx = run(&target, &mut tree, &PinPolicy::Unpinned, &AssumeYes).await.unwrap();
        
        let ips = ctx.summary.get(EntityKind::IpAddress);
        assert_eq!((ips.created, ips.dropped), (1, 1));
        assert_eq!(ctx.summary.get(EntityKind::Interface).created, 1);
        assert_eq!(ctx.summary.get(EntityKind::VirtualDisk).created, 1);
        
        let addresses = &tree.nodes[0].vms[0].nics[0].ip_addresses;
        assert!(!addresses[0].target_id.is_resolved());
        assert!(addresses[1].target_id.is_resolved());
    }
    
    #[tokio::test]
    async fn test_failed_primary_mac_link_keeps_interface() {
        let target = MockInventory::new();
        target.fail_assign("aa:bb:cc:dd:ee:ff").unwrap();
        let mut tree = tree(&["web"]);
        
        let ctx = run(&target, &mut tree, &PinPolicy::Unpinned, &AssumeYes).await.unwrap();
        
        assert_eq!(ctx.summary.get(EntityKind::Interface).created, 1);
        assert_eq!(ctx.summary.get(EntityKind::IpAddress).created, 1);
        assert_eq!(ctx.summary.total_dropped(), 0);
    }
    
    #[tokio::test]
    async fn test_duplicate_vm_name_is_ingested_once() {
        let target = MockInventory::new();
        let mut tree = tree(&["web", "web"]);
        
        let ctx = run(&target, &mut tree, &PinPolicy::Unpinned, &AssumeYes).await.unwrap();
        
        assert_eq!(target.created_count(EntityKind::VirtualMachine).unwrap(), 1);
        assert_eq!(target.created_count(EntityKind::VirtualDisk).unwrap(), 1);
        let vms = ctx.summary.get(EntityKind::VirtualMachine);
        assert_eq!((vms.created, vms.skipped), (1, 1));
        assert_eq!(tree.nodes[0].vms[1].target_id, tree.nodes[0].vms[0].target_id);
    }
    
    #[tokio::test]
    async fn test_existing_mac_and_ip_are_reused() {
        let target = MockInventory::new();
        let mac_id = target.seed(EntityKind::MacAddress, "aa:bb:cc:dd:ee:ff").unwrap();
        target.seed(EntityKind::IpAddress, "10.0.0.5/24").unwrap();
        let mut tree = tree(&["web"]);
        
        let ctx = run(&target, &mut tree, &PinPolicy::Unpinned, &AssumeYes).await.unwrap();
        
        assert_eq!(ctx.summary.get(EntityKind::MacAddress).skipped, 1);
        assert_eq!(ctx.summary.get(EntityKind::IpAddress).skipped, 1);
        assert_eq!(target.created_count(EntityKind::MacAddress).unwrap(), 0);
        assert_eq!(tree.nodes[0].vms[0].nics[0].mac_target_id.get(), Some(mac_id));
    }
    
    #[tokio::test]
    async fn test_failed_mac_drops_nic_but_keeps_disks() {
        let target = MockInventory::new();
        target.fail_create(EntityKind::MacAddress, "aa:bb:cc:dd:ee:ff").unwrap();
        let mut tree = tree(&["web"]);
        
        let ctx = run(&target, &mut tree, &PinPolicy::Unpinned, &AssumeYes).await.unwrap();
        
        assert_eq!(ctx.summary.get(EntityKind::Interface).dropped, 1);
        assert_eq!(ctx.summary.get(EntityKind::IpAddress).dropped, 1);
        assert_eq!(ctx.summary.get(EntityKind::VirtualDisk).created, 1);
    }
    
    #[tokio::test]
    async fn test_cluster_creation_declined() {
        let target = MockInventory::new();
        let mut tree = tree(&["web"]);
        tree.cluster_type = Some(ClusterType {
            name: "Proxmox".to_string(),
            slug: "proxmox".to_string(),
            target_id: TargetRef::default(),
        });
        tree.cluster = Some(Cluster {
            name: "lab".to_string(),
            source_id: "cluster".to_string(),
            member_node_names: Default::default(),
            target_id: TargetRef::default(),
        });
        let policy = PinPolicy::from_mode(PinMode::Cluster);
        
        let err = run(&target, &mut tree, &policy, &AssumeNo).await.unwrap_err();
        assert!(matches!(err, SyncError::PolicyDecline { kind: EntityKind::ClusterType, .. }));
        assert!(target.created().unwrap().is_empty());
    }
}
