//! Configuration management for pvesync.

use anyhow::{bail, Context, Result};
use pvesync_engine::{ClusterTypeSpec, PinMode, PinPolicy};
use pvesync_hypervisor::{ProxmoxAuth, ProxmoxSettings};
use pvesync_inventory::NetBoxSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Args;

/// Location tried when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pvesync/pvesync.yaml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Proxmox VE connection
    pub proxmox: ProxmoxConfig,
    /// NetBox connection
    pub netbox: NetBoxConfig,
    /// Reconciliation behaviour
    pub sync: SyncConfig,
    /// Log output
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        
        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }
        
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        
        Ok(config)
    }
    
    /// Load `explicit`, or `default_path` when no path was given.
    ///
    /// Only a missing default file falls back to built-in defaults; an
    /// unreadable or malformed one is an error. Returns the path loaded.
    pub fn load_or_default(explicit: Option<&str>, default_path: &Path) -> Result<(Self, Option<PathBuf>)> {
        let path = match explicit {
            Some(path) => PathBuf::from(path),
            None if !default_path.exists() => return Ok((Config::default(), None)),
            None => default_path.to_path_buf(),
        };
        let config = Config::load(&path)?;
        Ok((config, Some(path)))
    }
    
    /// Apply CLI argument (and `PVESYNC_*` environment) overrides.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
        if let Some(ref format) = args.log_format {
            self.logging.format = format.clone();
        }
        
        if let Some(ref host) = args.proxmox_host {
            self.proxmox.host = host.clone();
        }
        if let Some(port) = args.proxmox_port {
            self.proxmox.port = port;
        }
        if let Some(ref user) = args.proxmox_user {
            self.proxmox.user = Some(user.clone());
        }
        if let Some(ref password) = args.proxmox_password {
            self.proxmox.password = Some(password.clone());
        }
        if let Some(ref token_id) = args.proxmox_token_id {
            self.proxmox.token_id = Some(token_id.clone());
        }
        if let Some(ref secret) = args.proxmox_token_secret {
            self.proxmox.token_secret = Some(secret.clone());
        }
        if args.proxmox_insecure {
            self.proxmox.verify_tls = false;
        }
        
        if let Some(ref url) = args.netbox_url {
            self.netbox.url = url.clone();
        }
        if let Some(ref token) = args.netbox_token {
            self.netbox.token = token.clone();
        }
        if args.netbox_insecure {
            self.netbox.verify_tls = false;
        }
        
        if let Some(mode) = args.pin_mode {
            self.sync.pin_mode = mode;
        }
        if let Some(ref name) = args.cluster_name {
            self.sync.cluster_name = Some(name.clone());
        }
        if args.include_templates {
            self.sync.include_templates = true;
        }
        
        self
    }
    
    /// Reject configurations that cannot reach both systems.
    pub fn validate(&self) -> Result<()> {
        if self.proxmox.host.trim().is_empty() {
            bail!("proxmox.host is required");
        }
        self.proxmox.auth()?;
        
        if self.netbox.url.trim().is_empty() {
            bail!("netbox.url is required");
        }
        if self.netbox.token.trim().is_empty() {
            bail!("netbox.token is required");
        }
        
        if self.sync.cluster_type.name.trim().is_empty() || self.sync.cluster_type.slug.trim().is_empty() {
            bail!("sync.cluster_type needs both a name and a slug");
        }
        
        self.logging.format.parse::<pvesync_common::LogFormat>()?;
        Ok(())
    }
    
    /// Placement policy for this run.
    pub fn policy(&self) -> PinPolicy {
        match self.sync.pin_mode {
            PinMode::Cluster => PinPolicy::Cluster {
                cluster_type: self.sync.cluster_type.clone(),
                cluster_name: self.sync.cluster_name.clone(),
            },
            mode => PinPolicy::from_mode(mode),
        }
    }
}

/// Proxmox VE connection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxmoxConfig {
    pub host: String,
    pub port: u16,
    /// User with realm, for ticket authentication
    pub user: Option<String>,
    pub password: Option<String>,
    /// API token ID, preferred over user/password when set
    pub token_id: Option<String>,
    pub token_secret: Option<String>,
    pub verify_tls: bool,
    pub timeout_secs: u64,
}

impl Default for ProxmoxConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: pvesync_hypervisor::proxmox::DEFAULT_PORT,
            user: None,
            password: None,
            token_id: None,
            token_secret: None,
            verify_tls: true,
            timeout_secs: 30,
        }
    }
}

impl ProxmoxConfig {
    fn auth(&self) -> Result<ProxmoxAuth> {
        match (&self.token_id, &self.token_secret, &self.user, &self.password) {
            (Some(token_id), Some(secret), _, _) => Ok(ProxmoxAuth::ApiToken {
                token_id: token_id.clone(),
                secret: secret.clone(),
            }),
            (Some(_), None, _, _) => bail!("proxmox.token_secret is required with proxmox.token_id"),
            (None, _, Some(user), Some(password)) => Ok(ProxmoxAuth::Password {
                username: user.clone(),
                password: password.clone(),
            }),
            _ => bail!("proxmox credentials are required (token_id/token_secret or user/password)"),
        }
    }
    
    /// Settings for the Proxmox VE client.
    pub fn settings(&self) -> Result<ProxmoxSettings> {
        Ok(ProxmoxSettings {
            host: self.host.clone(),
            port: self.port,
            auth: self.auth()?,
            verify_tls: self.verify_tls,
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

/// NetBox connection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetBoxConfig {
    pub url: String,
    pub token: String,
    pub verify_tls: bool,
    pub timeout_secs: u64,
}

impl Default for NetBoxConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            verify_tls: true,
            timeout_secs: 30,
        }
    }
}

impl NetBoxConfig {
    /// Settings for the NetBox client.
    pub fn settings(&self) -> NetBoxSettings {
        NetBoxSettings {
            url: self.url.clone(),
            token: self.token.clone(),
            verify_tls: self.verify_tls,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Reconciliation configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub pin_mode: PinMode,
    /// Overrides the cluster name reported by Proxmox VE
    pub cluster_name: Option<String>,
    pub cluster_type: ClusterTypeSpec,
    pub include_templates: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
