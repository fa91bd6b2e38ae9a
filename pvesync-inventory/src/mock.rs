//! Mock inventory backend for testing and development.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::error::{InventoryError, Result};
use crate::traits::InventoryTarget;
use crate::types::{EntityKind, NewEntity, TargetId};

/// Mock inventory backend for testing.
///
/// Stores entities in memory, indexed by kind and key, and records every
/// create in order so tests can assert on what was written.
pub struct MockInventory {
    store: RwLock<MockStore>,
}

#[derive(Default)]
struct MockStore {
    next_id: TargetId,
    records: Vec<MockRecord>,
    failing_creates: HashSet<(EntityKind, String)>,
    failing_finds: HashSet<(EntityKind, String)>,
    /// `(interface, mac)` links, in order
    primary_macs: Vec<(TargetId, TargetId)>,
    /// MAC keys whose assignment fails
    failing_assignments: HashSet<String>,
}

/// A stored entity.
#[derive(Debug, Clone, PartialEq)]
pub struct MockRecord {
    pub kind: EntityKind,
    pub id: TargetId,
    pub key: String,
    /// `None` for entities seeded with [`MockInventory::seed`]
    pub payload: Option<NewEntity>,
}

impl MockInventory {
    /// Create an empty mock inventory.
    pub fn new() -> Self {
        info!("Creating mock inventory backend");
        Self {
            store: RwLock::new(MockStore {
                next_id: 1,
                ..Default::default()
            }),
        }
    }
    
    /// Insert a pre-existing entity and return its identifier.
    pub fn seed(&self, kind: EntityKind, key: impl Into<String>) -> Result<TargetId> {
        let mut store = self.write()?;
        let id = store.allocate();
        store.records.push(MockRecord {
            kind,
            id,
            key: key.into(),
            payload: None,
        });
        Ok(id)
    }
    
    /// Make creates of `kind` with `key` fail.
    pub fn fail_create(&self, kind: EntityKind, key: impl Into<String>) -> Result<()> {
        self.write()?.failing_creates.insert((kind, key.into()));
        Ok(())
    }
    
    /// Make lookups of `kind` with `key` fail with a connectivity error.
    pub fn fail_find(&self, kind: EntityKind, key: impl Into<String>) -> Result<()> {
        self.write()?.failing_finds.insert((kind, key.into()));
        Ok(())
    }
    
    /// Make assigning the MAC with `key` to an interface fail.
    pub fn fail_assign(&self, mac: impl Into<String>) -> Result<()> {
        self.write()?.failing_assignments.insert(mac.into());
        Ok(())
    }
    
    /// `(interface, mac)` pairs linked through
    /// [`InventoryTarget::assign_primary_mac`], in order.
    pub fn primary_macs(&self) -> Result<Vec<(TargetId, TargetId)>> {
        Ok(self.read()?.primary_macs.clone())
    }
    
    /// Entities created through [`InventoryTarget::create`], in order.
    pub fn created(&self) -> Result<Vec<NewEntity>> {
        Ok(self
            .read()?
            .records
            .iter()
            .filter_map(|r| r.payload.clone())
            .collect())
    }
    
    /// Kinds of the created entities, in order.
    pub fn created_kinds(&self) -> Result<Vec<EntityKind>> {
        Ok(self.created()?.iter().map(NewEntity::kind).collect())
    }
    
    /// Number of created entities of a kind.
    pub fn created_count(&self, kind: EntityKind) -> Result<usize> {
        Ok(self.created()?.iter().filter(|e| e.kind() == kind).count())
    }
    
    /// All stored entities, seeded ones included.
    pub fn records(&self) -> Result<Vec<MockRecord>> {
        Ok(self.read()?.records.clone())
    }
    
    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MockStore>> {
        self.store
            .read()
            .map_err(|_| InventoryError::Internal("Lock poisoned".to_string()))
    }
    
    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MockStore>> {
        self.store
            .write()
            .map_err(|_| InventoryError::Internal("Lock poisoned".to_string()))
    }
}

impl MockStore {
    fn allocate(&mut self) -> TargetId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
    
    fn record(&self, kind: EntityKind, id: TargetId) -> Result<&MockRecord> {
        self.records
            .iter()
            .find(|r| r.kind == kind && r.id == id)
            .ok_or_else(|| InventoryError::RequestFailed {
                kind,
                status: 404,
                body: format!("{} {} not found", kind, id),
            })
    }
}

impl Default for MockInventory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InventoryTarget for MockInventory {
    fn name(&self) -> &str {
        "mock"
    }
    
    #[instrument(skip(self))]
    async fn find(&self, kind: EntityKind, key: &str) -> Result<Option<TargetId>> {
        if kind.natural_key_field().is_none() {
            return Err(InventoryError::Internal(format!("{} has no natural key", kind)));
        }
        
        let store = self.read()?;
        if store.failing_finds.contains(&(kind, key.to_string())) {
            return Err(InventoryError::ConnectionFailed(format!(
                "injected lookup failure for {} '{}'",
                kind, key
            )));
        }
        
        let found = store
            .records
            .iter()
            .find(|r| r.kind == kind && r.key == key)
            .map(|r| r.id);
        debug!(found = ?found, "Lookup");
        Ok(found)
    }
    
    #[instrument(skip(self, entity), fields(kind = %entity.kind(), key = %entity.key()))]
    async fn create(&self, entity: &NewEntity) -> Result<TargetId> {
        let kind = entity.kind();
        let key = entity.key().to_string();
        
        let mut store = self.write()?;
        if store.failing_creates.contains(&(kind, key.clone())) {
            return Err(InventoryError::CreateFailed {
                kind,
                key,
                reason: "injected failure".to_string(),
            });
        }
        
        let id = store.allocate();
        store.records.push(MockRecord {
            kind,
            id,
            key,
            payload: Some(entity.clone()),
        });
        
        debug!(id = id, "Mock entity created");
        Ok(id)
    }
    
    #[instrument(skip(self))]
    async fn assign_primary_mac(&self, interface: TargetId, mac: TargetId) -> Result<()> {
        let mut store = self.write()?;
        store.record(EntityKind::Interface, interface)?;
        let key = store.record(EntityKind::MacAddress, mac)?.key.clone();
        if store.failing_assignments.contains(&key) {
            return Err(InventoryError::ConnectionFailed(format!(
                "injected assignment failure for MAC '{}'",
                key
            )));
        }
        
        store.primary_macs.push((interface, mac));
        Ok(())
    }
}
