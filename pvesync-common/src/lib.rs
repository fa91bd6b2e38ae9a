//! # pvesync Common
//!
//! Shared utilities for the pvesync components.
//!
//! ## Logging
//!
//! ```rust,ignore
//! use pvesync_common::{init_logging, LogFormat};
//!
//! init_logging("info", LogFormat::Pretty).unwrap();
//! tracing::info!(node = "pve01", "Walking node");
//! ```

pub mod logging;

pub use logging::{init_logging, init_logging_json, init_logging_pretty, LogFormat};
