//! # pvesync Inventory
//!
//! Access to the inventory-of-record (NetBox) that discovered VMs are
//! reconciled into. Only natural-key lookups and creates are supported.

pub mod error;
pub mod traits;
pub mod types;
pub mod mock;
pub mod netbox;

pub use error::InventoryError;
pub use traits::InventoryTarget;
pub use types::*;
pub use mock::{MockInventory, MockRecord};
pub use netbox::{NetBoxClient, NetBoxSettings};
