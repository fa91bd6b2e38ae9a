//! Walks the hypervisor and builds the normalized inventory tree.

use pvesync_hypervisor::{ClusterEntryKind, HypervisorSource, VmListItem};
use pvesync_inventory::EntityKind;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::correlator::NetworkCorrelator;
use crate::decoder::ConfigDecoder;
use crate::error::{Result, SyncError};
use crate::model::*;
use crate::policy::PinPolicy;
use crate::summary::SyncContext;

/// Configuration key that marks a VM as having a guest agent.
const AGENT_KEY: &str = "agent";

/// Builds an [`InventoryTree`] from a [`HypervisorSource`].
pub struct InventoryTreeBuilder {
    source: Arc<dyn HypervisorSource>,
    include_templates: bool,
}

impl InventoryTreeBuilder {
    pub fn new(source: Arc<dyn HypervisorSource>) -> Self {
        Self {
            source,
            include_templates: false,
        }
    }
    
    /// Include template VMs (excluded by default).
    pub fn include_templates(mut self, include: bool) -> Self {
        self.include_templates = include;
        self
    }
    
    /// Walk nodes, then VMs per node, in the order the hypervisor reports them.
    ///
    /// A VM whose configuration or guest report cannot be fetched is dropped
    /// and the walk continues. Failing to list nodes, or to read the cluster
    /// in cluster mode, ends the build.
    #[instrument(skip_all, fields(run_id = %ctx.run_id, source = %self.source.name()))]
    pub async fn build(&self, policy: &PinPolicy, ctx: &mut SyncContext) -> Result<InventoryTree> {
        let mut tree = InventoryTree::default();
        
        if let PinPolicy::Cluster { cluster_type, cluster_name } = policy {
            tree.cluster_type = Some(ClusterType {
                name: cluster_type.name.clone(),
                slug: cluster_type.slug.clone(),
                target_id: TargetRef::default(),
            });
            tree.cluster = Some(self.read_cluster(cluster_name.as_deref()).await?);
        }
        
        let nodes = self.source.list_nodes().await?;
        info!(count = nodes.len(), "Discovered hypervisor nodes");
        
        for item in nodes {
            let mut node = Node::new(item.node.clone(), NodeStatus::from_api(&item.status));
            
            let vms = match self.source.list_vms(&node.name).await {
                Ok(vms) => vms,
                Err(e) => {
                    warn!(node = %node.name, error = %e, "Failed to list VMs, node kept without VMs");
                    tree.nodes.push(node);
                    continue;
                }
            };
            
            for vm in vms {
                if vm.template && !self.include_templates {
                    debug!(node = %node.name, vmid = vm.vmid, "Skipping template");
                    continue;
                }
                if let Some(vm) = self.build_vm(&node.name, &vm, ctx).await {
                    node.vms.push(vm);
                }
            }
            
            info!(node = %node.name, status = ?node.status, vms = node.vms.len(), "Node walked");
            tree.nodes.push(node);
        }
        
        Ok(tree)
    }
    
    /// Build one VM, or `None` when it has to be dropped.
    #[instrument(skip(self, item, ctx), fields(vmid = item.vmid))]
    async fn build_vm(&self, node: &str, item: &VmListItem, ctx: &mut SyncContext) -> Option<VirtualMachine> {
        let name = item.display_name();
        
        let config = match self.source.get_vm_config(node, item.vmid).await {
            Ok(config) => config,
            Err(e) => {
                warn!(vm = %name, error = %e, "Failed to read VM config, VM dropped");
                ctx.summary.dropped(EntityKind::VirtualMachine);
                return None;
            }
        };
        
        let sizing = match ConfigDecoder::decode_sizing(&config) {
            Ok(sizing) => sizing,
            Err(e) => {
                warn!(vm = %name, error = %e, "Malformed VM sizing, VM dropped");
                ctx.summary.dropped(EntityKind::VirtualMachine);
                return None;
            }
        };
        
        let mut vm = VirtualMachine {
            source_vm_id: item.vmid,
            name,
            status: PowerState::from_api(&item.status),
            vcpus: sizing.vcpus,
            memory_mb: sizing.memory_mb,
            node_name: node.to_string(),
            disks: Vec::new(),
            nics: Vec::new(),
            target_id: TargetRef::default(),
        };
        
        // Devices are only reported for VMs configured with a guest agent.
        if !config.contains_key(AGENT_KEY) {
            debug!(vm = %vm.name, "No guest agent configured, devices omitted");
            return Some(vm);
        }
        
        let decoded = ConfigDecoder::decode_devices(&config);
        for e in &decoded.errors {
            warn!(vm = %vm.name, error = %e, "Malformed device slot skipped");
            ctx.summary.dropped(e.dropped_kind());
        }
        
        let report = match self.source.get_guest_network(node, item.vmid).await {
            Ok(report) => report,
            Err(e) if e.is_agent_unavailable() => {
                debug!(vm = %vm.name, reason = %e, "Guest agent unavailable, NICs left unenriched");
                Vec::new()
            }
            Err(e) => {
                warn!(vm = %vm.name, error = %e, "Failed to read guest network, VM dropped");
                ctx.summary.dropped(EntityKind::VirtualMachine);
                return None;
            }
        };
        
        let mut nics = decoded.nics;
        for e in NetworkCorrelator::correlate(&mut nics, &report) {
            warn!(vm = %vm.name, error = %e, "Malformed guest address skipped");
            ctx.summary.dropped(e.dropped_kind());
        }
        
        vm.disks = decoded.disks;
        vm.nics = nics;
        
        debug!(
            vm = %vm.name,
            disks = vm.disks.len(),
            nics = vm.nics.len(),
            enriched = vm.nics.iter().filter(|n| n.is_enriched()).count(),
            "VM decoded"
        );
        Some(vm)
    }
    
    async fn read_cluster(&self, name_override: Option<&str>) -> Result<Cluster> {
        let status = self.source.get_cluster_status().await?;
        
        let cluster = status
            .iter()
            .find(|e| e.kind == ClusterEntryKind::Cluster)
            .ok_or_else(|| {
                SyncError::validation(
                    "cluster pin mode requires a clustered hypervisor, but no cluster entry was reported",
                    Vec::new(),
                )
            })?;
        
        let members = status
            .iter()
            .filter(|e| e.kind == ClusterEntryKind::Node)
            .map(|e| e.name.clone())
            .collect();
        
        Ok(Cluster {
            name: name_override.map(str::to_string).unwrap_or_else(|| cluster.name.clone()),
            source_id: cluster.id.clone().unwrap_or_else(|| "cluster".to_string()),
            member_node_names: members,
            target_id: TargetRef::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvesync_hypervisor::{ClusterStatusEntry, GuestInterface, MockBackend, VmConfig};
    
    fn agent_config(extra: &[(&str, &str)]) -> VmConfig {
        let mut entries = vec![("agent", "1"), ("memory", "2048"), ("sockets", "1"), ("cores", "2")];
        entries.extend_from_slice(extra);
        VmConfig::from_entries(entries)
    }
    
    #[tokio::test]
    async fn test_vm_without_agent_has_no_devices() {
        let backend = Arc::new(
            MockBackend::new()
                .with_node("pve01", "online")
                .with_vm(
                    "pve01",
                    VmListItem::new(100, "plain", "stopped"),
                    VmConfig::from_entries([
                        ("memory", "1024"),
                        ("scsi0", "local:vm-100-disk-0,size=8G"),
                        ("net0", "virtio=AA:BB:CC:DD:EE:FF,bridge=vmbr0"),
                    ]),
                ),
        );
        let mut ctx = SyncContext::new();
        let tree = InventoryTreeBuilder::new(backend.clone())
            .build(&PinPolicy::Unpinned, &mut ctx)
            .await
            .unwrap();
        
        let vm = &tree.nodes[0].vms[0];
        assert!(vm.disks.is_empty());
        assert!(vm.nics.is_empty());
        assert_eq!(vm.status, PowerState::Stopped);
        assert_eq!(backend.guest_network_calls(), 0);
    }
    
    #[tokio::test]
    async fn test_agent_unavailable_keeps_unenriched_nics() {
        let backend = Arc::new(
            MockBackend::new()
                .with_node("pve01", "online")
                .with_vm(
                    "pve01",
                    VmListItem::new(100, "web", "running"),
                    agent_config(&[("net0", "virtio=AA:BB:CC:DD:EE:FF,bridge=vmbr0")]),
                ),
        );
        let mut ctx = SyncContext::new();
        let tree = InventoryTreeBuilder::new(backend)
            .build(&PinPolicy::Unpinned, &mut ctx)
            .await
            .unwrap();
        
        let nics = &tree.nodes[0].vms[0].nics;
        assert_eq!(nics.len(), 1);
        assert!(!nics[0].is_enriched());
        assert_eq!(ctx.summary.total_dropped(), 0);
    }
    
    #[tokio::test]
    async fn test_failing_vms_are_dropped_and_walk_continues() {
        let backend = Arc::new(
            MockBackend::new()
                .with_node("pve01", "online")
                .with_node("pve02", "offline")
                .with_vm("pve01", VmListItem::new(100, "a", "running"), agent_config(&[]))
                .with_vm("pve01", VmListItem::new(101, "b", "running"), agent_config(&[]))
                .with_vm("pve01", VmListItem::new(102, "c", "running"), agent_config(&[]))
                .with_vm("pve01", VmListItem::new(103, "d", "running"), VmConfig::from_entries([("agent", "1"), ("cores", "0")]))
                .with_guest_network("pve01", 100, vec![])
                .with_guest_network("pve01", 102, vec![GuestInterface::new("eth0", "aa:bb:cc:dd:ee:ff")])
                .failing_config("pve01", 101)
                .failing_guest_network("pve01", 102)
                .failing_list_vms("pve02"),
        );
        let mut ctx = SyncContext::new();
        let tree = InventoryTreeBuilder::new(backend)
            .build(&PinPolicy::Unpinned, &mut ctx)
            .await
            .unwrap();
        
        let names: Vec<&str> = tree.vms().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["a"]);
        assert_eq!(tree.nodes.len(), 2);
        assert_eq!(tree.nodes[1].status, NodeStatus::Offline);
        assert_eq!(ctx.summary.get(EntityKind::VirtualMachine).dropped, 3);
    }
    
    #[tokio::test]
    async fn test_templates_excluded_by_default() {
        let backend = Arc::new(
            MockBackend::new()
                .with_node("pve01", "online")
                .with_vm("pve01", VmListItem::new(9000, "tpl", "stopped").as_template(), VmConfig::default())
                .with_vm("pve01", VmListItem::new(100, "web", "running"), VmConfig::default()),
        );
        let mut ctx = SyncContext::new();
        
        let tree = InventoryTreeBuilder::new(backend.clone())
            .build(&PinPolicy::Unpinned, &mut ctx)
            .await
            .unwrap();
        assert_eq!(tree.vm_count(), 1);
        
        let tree = InventoryTreeBuilder::new(backend)
            .include_templates(true)
            .build(&PinPolicy::Unpinned, &mut ctx)
            .await
            .unwrap();
        assert_eq!(tree.vm_count(), 2);
    }
    
    #[tokio::test]
    async fn test_cluster_mode_reads_cluster() {
        let backend = Arc::new(
            MockBackend::new()
                .with_node("pve01", "online")
                .with_cluster_status(vec![
                    ClusterStatusEntry::cluster("lab", 2),
                    ClusterStatusEntry::node("pve01", true),
                    ClusterStatusEntry::node("pve02", false),
                ]),
        );
        let mut ctx = SyncContext::new();
        let policy = PinPolicy::from_mode(crate::policy::PinMode::Cluster);
        let tree = InventoryTreeBuilder::new(backend).build(&policy, &mut ctx).await.unwrap();
        
        let cluster = tree.cluster.unwrap();
        assert_eq!(cluster.name, "lab");
        assert_eq!(cluster.member_node_names.len(), 2);
        assert_eq!(tree.cluster_type.unwrap().slug, "proxmox");
    }
    
    #[tokio::test]
    async fn test_cluster_mode_requires_cluster_entry() {
        let backend = Arc::new(
            MockBackend::new()
                .with_node("pve01", "online")
                .with_cluster_status(vec![ClusterStatusEntry::node("pve01", true)]),
        );
        let mut ctx = SyncContext::new();
        let policy = PinPolicy::from_mode(crate::policy::PinMode::Cluster);
        let err = InventoryTreeBuilder::new(backend).build(&policy, &mut ctx).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
