//! Core hypervisor source trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::*;

/// Read-only view of a hypervisor's inventory.
///
/// Every call is a single blocking round-trip from the engine's point of
/// view; the engine awaits them one at a time.
#[async_trait]
pub trait HypervisorSource: Send + Sync {
    /// Name of the backend (e.g., "proxmox", "mock").
    fn name(&self) -> &str;
    
    // =========================================================================
    // Nodes & Guests
    // =========================================================================
    
    /// List hypervisor nodes in the order the API reports them.
    async fn list_nodes(&self) -> Result<Vec<NodeListItem>>;
    
    /// List QEMU guests on a node in the order the API reports them.
    async fn list_vms(&self, node: &str) -> Result<Vec<VmListItem>>;
    
    /// Get the raw configuration map of a guest.
    async fn get_vm_config(&self, node: &str, vmid: u32) -> Result<VmConfig>;
    
    /// Get the guest agent's network interface report.
    ///
    /// Returns [`HypervisorError::AgentUnavailable`](crate::HypervisorError)
    /// when the agent is not installed or not running.
    async fn get_guest_network(&self, node: &str, vmid: u32) -> Result<Vec<GuestInterface>>;
    
    // =========================================================================
    // Cluster
    // =========================================================================
    
    /// Get cluster membership. Standalone hosts report only node entries.
    async fn get_cluster_status(&self) -> Result<Vec<ClusterStatusEntry>>;
}
