//! # pvesync
//!
//! Discovers the virtual machines of a Proxmox VE host or cluster and
//! reconciles them, with their NICs, addresses and disks, into NetBox.
//!
//! ## Usage
//! ```bash
//! pvesync --config /etc/pvesync/pvesync.yaml --pin-mode cluster
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use pvesync_engine::{AssumeYes, Confirm};
use std::path::Path;
use tracing::info;

mod cli;
mod config;
mod prompt;
mod run;

use cli::Args;
use config::{Config, DEFAULT_CONFIG_PATH};
use prompt::StdinConfirm;
use run::RunOptions;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();
    
    // Load configuration; an explicit path must exist, the default may not
    let (config, source) = Config::load_or_default(args.config.as_deref(), Path::new(DEFAULT_CONFIG_PATH))?;
    let config = config.with_cli_overrides(&args);
    
    // Initialize logging
    let format = config.logging.format.parse().context("Invalid logging.format")?;
    pvesync_common::init_logging(&config.logging.level, format)?;
    
    info!(version = env!("CARGO_PKG_VERSION"), "Starting pvesync");
    match &source {
        Some(path) => info!(config_path = %path.display(), "Configuration loaded"),
        None => info!(
            default_path = DEFAULT_CONFIG_PATH,
            "No config file found, using CLI arguments and defaults"
        ),
    }
    
    config.validate().context("Invalid configuration")?;
    
    let confirm: &dyn Confirm = if args.yes { &AssumeYes } else { &StdinConfirm };
    let options = RunOptions {
        dry_run: args.dry_run,
        tree_out: args.tree_out.clone(),
    };
    
    run::run(&config, &options, confirm).await
}
