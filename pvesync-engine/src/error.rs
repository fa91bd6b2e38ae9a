//! Error taxonomy of a sync run.
//!
//! | Kind | Source | Handling |
//! |------|--------|----------|
//! | Connectivity | [`HypervisorError`], [`InventoryError`] | logged, entity/VM dropped |
//! | Parse | [`DecodeError`] | logged, single entity dropped |
//! | Validation | pin policy prerequisites | fatal |
//! | PolicyDecline | operator said no | fatal |

use pvesync_hypervisor::HypervisorError;
use pvesync_inventory::{EntityKind, InventoryError};
use thiserror::Error;

/// A malformed token in a VM configuration or guest agent report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{key}: no size= token in '{value}'")]
    MissingSize { key: String, value: String },
    
    #[error("{key}: invalid size '{size}'")]
    InvalidSize { key: String, size: String },
    
    #[error("{key}: no MAC address in '{value}'")]
    MissingMac { key: String, value: String },
    
    #[error("{key}: invalid MAC address '{mac}'")]
    InvalidMac { key: String, mac: String },
    
    #[error("{key}: expected a positive integer, got '{value}'")]
    InvalidNumber { key: String, value: String },
    
    #[error("{interface}: invalid {family} address '{address}/{prefix}'")]
    InvalidIp {
        interface: String,
        family: String,
        address: String,
        prefix: u8,
    },
}

impl DecodeError {
    /// Kind of entity that is dropped because of this error.
    pub fn dropped_kind(&self) -> EntityKind {
        match self {
            DecodeError::MissingSize { .. } | DecodeError::InvalidSize { .. } => EntityKind::VirtualDisk,
            DecodeError::MissingMac { .. } | DecodeError::InvalidMac { .. } => EntityKind::Interface,
            DecodeError::InvalidNumber { .. } => EntityKind::VirtualMachine,
            DecodeError::InvalidIp { .. } => EntityKind::IpAddress,
        }
    }
}

/// Errors that abort a stage of the sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The hypervisor could not be read.
    #[error("Hypervisor error: {0}")]
    Hypervisor(#[from] HypervisorError),
    
    /// The inventory could not be read or written.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),
    
    /// Malformed configuration token.
    #[error("Parse error: {0}")]
    Parse(#[from] DecodeError),
    
    /// A target entity the pin policy depends on does not exist.
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        /// Names that could not be resolved
        unmatched: Vec<String>,
    },
    
    /// The operator declined to create a missing entity.
    #[error("Operator declined to create {kind} '{name}'")]
    PolicyDecline { kind: EntityKind, name: String },
}

impl SyncError {
    pub fn validation(message: impl Into<String>, unmatched: Vec<String>) -> Self {
        SyncError::Validation {
            message: message.into(),
            unmatched,
        }
    }
    
    /// Whether this error must end the whole run.
    ///
    /// Connectivity and parse errors are recovered at VM or entity
    /// granularity; when they escape to the top level it is because the
    /// entity they concern is a prerequisite for every VM.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Validation { .. } | SyncError::PolicyDecline { .. })
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_fatal_kinds() {
        assert!(SyncError::validation("unmatched nodes", vec!["pve02".to_string()]).is_fatal());
        assert!(SyncError::PolicyDecline {
            kind: EntityKind::Cluster,
            name: "lab".to_string()
        }
        .is_fatal());
        assert!(!SyncError::from(HypervisorError::ConnectionFailed("timeout".to_string())).is_fatal());
    }
    
    #[test]
    fn test_dropped_kind() {
        let err = DecodeError::MissingSize {
            key: "scsi0".to_string(),
            value: "local:vm-100-disk-0".to_string(),
        };
        assert_eq!(err.dropped_kind(), EntityKind::VirtualDisk);
        assert_eq!(err.to_string(), "scsi0: no size= token in 'local:vm-100-disk-0'");
    }
}
