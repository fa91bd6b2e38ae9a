//! Error types for the hypervisor source.

use thiserror::Error;

/// Errors that can occur while reading inventory from the hypervisor.
#[derive(Error, Debug)]
pub enum HypervisorError {
    /// Failed to reach the hypervisor API.
    #[error("Failed to connect to hypervisor: {0}")]
    ConnectionFailed(String),
    
    /// Credentials were rejected.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),
    
    /// The API answered with a non-success status.
    #[error("Request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },
    
    /// The API answered with a payload that does not match the schema.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    
    /// The guest agent is not installed, not enabled, or not running.
    #[error("Guest agent unavailable: {0}")]
    AgentUnavailable(String),
    
    /// Node was not found.
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    
    /// VM was not found.
    #[error("VM {vmid} not found on node {node}")]
    VmNotFound { node: String, vmid: u32 },
    
    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl HypervisorError {
    /// Whether this error means "no telemetry" rather than "no connectivity".
    pub fn is_agent_unavailable(&self) -> bool {
        matches!(self, HypervisorError::AgentUnavailable(_))
    }
}

/// Result type alias for hypervisor operations.
pub type Result<T> = std::result::Result<T, HypervisorError>;
