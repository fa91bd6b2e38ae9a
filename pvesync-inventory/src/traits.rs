//! Core inventory target trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{EntityKind, NewEntity, TargetId};

/// Read/write access to the inventory-of-record.
///
/// The engine looks entities up by natural key and creates new ones. The
/// only update is linking an interface to its primary MAC; nothing is
/// deleted.
#[async_trait]
pub trait InventoryTarget: Send + Sync {
    /// Name of the backend (e.g., "netbox", "mock").
    fn name(&self) -> &str;
    
    /// Find an entity by its natural key. The first match wins.
    async fn find(&self, kind: EntityKind, key: &str) -> Result<Option<TargetId>>;
    
    /// Create an entity and return its identifier.
    async fn create(&self, entity: &NewEntity) -> Result<TargetId>;
    
    /// Assign a MAC address to a VM interface and make it the interface's
    /// primary MAC.
    async fn assign_primary_mac(&self, interface: TargetId, mac: TargetId) -> Result<()>;
}
