//! # pvesync Hypervisor
//!
//! Read-only access to hypervisor inventory.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         HypervisorSource Trait          │
//! │ (list_nodes, list_vms, get_vm_config,   │
//! │  get_guest_network, get_cluster_status) │
//! └─────────────────────┬───────────────────┘
//!                       │
//!         ┌─────────────┴─────────────┐
//!         ▼                           ▼
//! ┌───────────────────┐     ┌───────────────────┐
//! │   ProxmoxClient   │     │    MockBackend    │
//! │  (PVE REST API)   │     │    (in memory)    │
//! └───────────────────┘     └───────────────────┘
//! ```

pub mod error;
pub mod traits;
pub mod types;
pub mod mock;
pub mod proxmox;

pub use error::HypervisorError;
pub use traits::HypervisorSource;
pub use types::*;
pub use mock::MockBackend;
pub use proxmox::{ProxmoxAuth, ProxmoxClient, ProxmoxSettings};
