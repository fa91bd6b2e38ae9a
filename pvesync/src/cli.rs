//! Command-line argument parsing.

use clap::Parser;
use pvesync_engine::PinMode;
use std::path::PathBuf;

/// pvesync - Reconcile Proxmox VE virtual machines into NetBox
#[derive(Parser, Debug, Default)]
#[command(name = "pvesync")]
#[command(about = "pvesync - Reconcile Proxmox VE virtual machines into NetBox")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long, env = "PVESYNC_CONFIG")]
    pub config: Option<String>,
    
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "PVESYNC_LOG_LEVEL")]
    pub log_level: Option<String>,
    
    /// Log format (pretty, json)
    #[arg(long, env = "PVESYNC_LOG_FORMAT")]
    pub log_format: Option<String>,
    
    // ========================================================================
    // Proxmox VE
    // ========================================================================
    
    /// Proxmox VE host name or address
    #[arg(long, env = "PVESYNC_PROXMOX_HOST")]
    pub proxmox_host: Option<String>,
    
    /// Proxmox VE API port
    #[arg(long, env = "PVESYNC_PROXMOX_PORT")]
    pub proxmox_port: Option<u16>,
    
    /// Proxmox VE user, including realm (e.g. root@pam)
    #[arg(long, env = "PVESYNC_PROXMOX_USER")]
    pub proxmox_user: Option<String>,
    
    /// Proxmox VE password
    #[arg(long, env = "PVESYNC_PROXMOX_PASSWORD", hide_env_values = true)]
    pub proxmox_password: Option<String>,
    
    /// Proxmox VE API token ID (user@realm!name)
    #[arg(long, env = "PVESYNC_PROXMOX_TOKEN_ID")]
    pub proxmox_token_id: Option<String>,
    
    /// Proxmox VE API token secret
    #[arg(long, env = "PVESYNC_PROXMOX_TOKEN_SECRET", hide_env_values = true)]
    pub proxmox_token_secret: Option<String>,
    
    /// Skip Proxmox VE certificate verification
    #[arg(long)]
    pub proxmox_insecure: bool,
    
    // ========================================================================
    // NetBox
    // ========================================================================
    
    /// NetBox base URL
    #[arg(long, env = "PVESYNC_NETBOX_URL")]
    pub netbox_url: Option<String>,
    
    /// NetBox API token
    #[arg(long, env = "PVESYNC_NETBOX_TOKEN", hide_env_values = true)]
    pub netbox_token: Option<String>,
    
    /// Skip NetBox certificate verification
    #[arg(long)]
    pub netbox_insecure: bool,
    
    // ========================================================================
    // Sync behaviour
    // ========================================================================
    
    /// Placement of created VMs (node, cluster, unpinned)
    #[arg(long, env = "PVESYNC_PIN_MODE")]
    pub pin_mode: Option<PinMode>,
    
    /// Cluster name to use instead of the one Proxmox VE reports
    #[arg(long, env = "PVESYNC_CLUSTER_NAME")]
    pub cluster_name: Option<String>,
    
    /// Include template VMs
    #[arg(long)]
    pub include_templates: bool,
    
    /// Answer yes to every confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
    
    /// Plan only, write nothing to NetBox
    #[arg(long)]
    pub dry_run: bool,
    
    /// Write the discovered tree to this file instead of stdout
    #[arg(long)]
    pub tree_out: Option<PathBuf>,
}
