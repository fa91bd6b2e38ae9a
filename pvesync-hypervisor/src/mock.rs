//! Mock hypervisor backend for testing and development.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, instrument};

use crate::error::{HypervisorError, Result};
use crate::traits::HypervisorSource;
use crate::types::*;

/// Mock hypervisor backend for testing.
///
/// Holds a fixed inventory in memory. Individual calls can be made to fail
/// with a connectivity error to exercise per-VM failure isolation.
pub struct MockBackend {
    nodes: Vec<MockNode>,
    cluster: Vec<ClusterStatusEntry>,
    failing: HashSet<FailingCall>,
    guest_network_calls: AtomicUsize,
}

struct MockNode {
    item: NodeListItem,
    vms: Vec<MockVm>,
}

struct MockVm {
    item: VmListItem,
    config: VmConfig,
    /// `None` means the guest agent does not answer
    guest: Option<Vec<GuestInterface>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FailingCall {
    ListVms(String),
    Config(String, u32),
    GuestNetwork(String, u32),
}

impl MockBackend {
    /// Create an empty mock backend.
    pub fn new() -> Self {
        info!("Creating mock hypervisor backend");
        Self {
            nodes: Vec::new(),
            cluster: Vec::new(),
            failing: HashSet::new(),
            guest_network_calls: AtomicUsize::new(0),
        }
    }
    
    /// Add a node.
    pub fn with_node(mut self, name: impl Into<String>, status: impl Into<String>) -> Self {
        self.nodes.push(MockNode {
            item: NodeListItem::new(name, status),
            vms: Vec::new(),
        });
        self
    }
    
    /// Add a guest to an existing node.
    ///
    /// # Panics
    /// Panics if the node has not been added first.
    pub fn with_vm(mut self, node: &str, vm: VmListItem, config: VmConfig) -> Self {
        self.node_mut(node).vms.push(MockVm {
            item: vm,
            config,
            guest: None,
        });
        self
    }
    
    /// Set the guest agent report for a guest.
    pub fn with_guest_network(mut self, node: &str, vmid: u32, report: Vec<GuestInterface>) -> Self {
        self.vm_mut(node, vmid).guest = Some(report);
        self
    }
    
    /// Set the `/cluster/status` answer.
    pub fn with_cluster_status(mut self, entries: Vec<ClusterStatusEntry>) -> Self {
        self.cluster = entries;
        self
    }
    
    /// Make `list_vms` fail for a node.
    pub fn failing_list_vms(mut self, node: &str) -> Self {
        self.failing.insert(FailingCall::ListVms(node.to_string()));
        self
    }
    
    /// Make `get_vm_config` fail for a guest.
    pub fn failing_config(mut self, node: &str, vmid: u32) -> Self {
        self.failing.insert(FailingCall::Config(node.to_string(), vmid));
        self
    }
    
    /// Make `get_guest_network` fail with a connectivity error for a guest.
    pub fn failing_guest_network(mut self, node: &str, vmid: u32) -> Self {
        self.failing.insert(FailingCall::GuestNetwork(node.to_string(), vmid));
        self
    }
    
    /// Number of guest agent queries served so far.
    pub fn guest_network_calls(&self) -> usize {
        self.guest_network_calls.load(Ordering::SeqCst)
    }
    
    fn node_mut(&mut self, node: &str) -> &mut MockNode {
        self.nodes
            .iter_mut()
            .find(|n| n.item.node == node)
            .unwrap_or_else(|| panic!("mock node {} not defined", node))
    }
    
    fn vm_mut(&mut self, node: &str, vmid: u32) -> &mut MockVm {
        self.node_mut(node)
            .vms
            .iter_mut()
            .find(|v| v.item.vmid == vmid)
            .unwrap_or_else(|| panic!("mock VM {} not defined on {}", vmid, node))
    }
    
    fn find_node(&self, node: &str) -> Result<&MockNode> {
        self.nodes
            .iter()
            .find(|n| n.item.node == node)
            .ok_or_else(|| HypervisorError::NodeNotFound(node.to_string()))
    }
    
    fn find_vm(&self, node: &str, vmid: u32) -> Result<&MockVm> {
        self.find_node(node)?
            .vms
            .iter()
            .find(|v| v.item.vmid == vmid)
            .ok_or_else(|| HypervisorError::VmNotFound {
                node: node.to_string(),
                vmid,
            })
    }
    
    fn check(&self, call: FailingCall) -> Result<()> {
        if self.failing.contains(&call) {
            return Err(HypervisorError::ConnectionFailed(format!(
                "injected failure for {:?}",
                call
            )));
        }
        Ok(())
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HypervisorSource for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }
    
    async fn list_nodes(&self) -> Result<Vec<NodeListItem>> {
        let nodes: Vec<NodeListItem> = self.nodes.iter().map(|n| n.item.clone()).collect();
        debug!(count = nodes.len(), "Listed nodes");
        Ok(nodes)
    }
    
    #[instrument(skip(self))]
    async fn list_vms(&self, node: &str) -> Result<Vec<VmListItem>> {
        self.check(FailingCall::ListVms(node.to_string()))?;
        let vms: Vec<VmListItem> = self
            .find_node(node)?
            .vms
            .iter()
            .map(|v| v.item.clone())
            .collect();
        debug!(count = vms.len(), "Listed VMs");
        Ok(vms)
    }
    
    #[instrument(skip(self))]
    async fn get_vm_config(&self, node: &str, vmid: u32) -> Result<VmConfig> {
        self.check(FailingCall::Config(node.to_string(), vmid))?;
        Ok(self.find_vm(node, vmid)?.config.clone())
    }
    
    #[instrument(skip(self))]
    async fn get_guest_network(&self, node: &str, vmid: u32) -> Result<Vec<GuestInterface>> {
        self.guest_network_calls.fetch_add(1, Ordering::SeqCst);
        self.check(FailingCall::GuestNetwork(node.to_string(), vmid))?;
        
        self.find_vm(node, vmid)?
            .guest
            .clone()
            .ok_or_else(|| HypervisorError::AgentUnavailable(format!(
                "QEMU guest agent is not running on VM {}",
                vmid
            )))
    }
    
    async fn get_cluster_status(&self) -> Result<Vec<ClusterStatusEntry>> {
        Ok(self.cluster.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    fn backend() -> MockBackend {
        MockBackend::new()
            .with_node("pve01", "online")
            .with_vm(
                "pve01",
                VmListItem::new(100, "web", "running"),
                VmConfig::from_entries([("agent", "1"), ("memory", "2048")]),
            )
            .with_vm(
                "pve01",
                VmListItem::new(101, "db", "stopped"),
                VmConfig::from_entries([("memory", "1024")]),
            )
            .with_guest_network("pve01", 100, vec![GuestInterface::new("eth0", "AA:BB:CC:DD:EE:FF")])
    }
    
    #[tokio::test]
    async fn test_lists_in_declared_order() {
        let backend = backend();
        let nodes = backend.list_nodes().await.unwrap();
        assert_eq!(nodes, vec![NodeListItem::new("pve01", "online")]);
        
        let vms = backend.list_vms("pve01").await.unwrap();
        let ids: Vec<u32> = vms.iter().map(|v| v.vmid).collect();
        assert_eq!(ids, vec![100, 101]);
        
        assert!(matches!(
            backend.list_vms("pve99").await,
            Err(HypervisorError::NodeNotFound(_))
        ));
    }
    
    #[tokio::test]
    async fn test_guest_network_availability() {
        let backend = backend().failing_config("pve01", 101);
        
        let report = backend.get_guest_network("pve01", 100).await.unwrap();
        assert_eq!(report.len(), 1);
        
        let err = backend.get_guest_network("pve01", 101).await.unwrap_err();
        assert!(err.is_agent_unavailable());
        assert_eq!(backend.guest_network_calls(), 2);
        
        let err = backend.get_vm_config("pve01", 101).await.unwrap_err();
        assert!(matches!(err, HypervisorError::ConnectionFailed(_)));
    }
}
