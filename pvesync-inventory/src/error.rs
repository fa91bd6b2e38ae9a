//! Error types for the inventory target.

use thiserror::Error;

use crate::types::EntityKind;

/// Errors that can occur while reading from or writing to the inventory.
#[derive(Error, Debug)]
pub enum InventoryError {
    /// Failed to reach the inventory API.
    #[error("Failed to connect to inventory: {0}")]
    ConnectionFailed(String),
    
    /// The token was rejected.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),
    
    /// The API answered with a non-success status.
    #[error("{kind} request failed with status {status}: {body}")]
    RequestFailed {
        kind: EntityKind,
        status: u16,
        body: String,
    },
    
    /// A create was refused (validation, uniqueness, ...).
    #[error("Failed to create {kind} '{key}': {reason}")]
    CreateFailed {
        kind: EntityKind,
        key: String,
        reason: String,
    },
    
    /// The API answered with a payload that does not match the schema.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    
    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
    
    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
