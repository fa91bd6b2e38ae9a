//! One sync run: discover, render, plan, confirm, execute.

use anyhow::{Context, Result};
use pvesync_engine::{
    Confirm, InventoryTree, InventoryTreeBuilder, ReconciliationExecutor, ReconciliationPlanner,
    SyncContext, SyncError,
};
use pvesync_hypervisor::ProxmoxClient;
use pvesync_inventory::NetBoxClient;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};

use crate::config::Config;

/// Per-invocation switches that are not part of the configuration file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub tree_out: Option<std::path::PathBuf>,
}

/// Run a full sync against the configured Proxmox VE and NetBox.
pub async fn run(config: &Config, options: &RunOptions, confirm: &dyn Confirm) -> Result<()> {
    let source = Arc::new(
        ProxmoxClient::new(config.proxmox.settings()?).context("Failed to create Proxmox VE client")?,
    );
    let target = NetBoxClient::new(config.netbox.settings()).context("Failed to create NetBox client")?;
    let policy = config.policy();
    
    let mut ctx = SyncContext::new();
    let span = info_span!("sync", run_id = %ctx.run_id);
    
    async {
        info!(
            proxmox = %config.proxmox.host,
            netbox = %config.netbox.url,
            pin_mode = %policy.mode(),
            dry_run = options.dry_run,
            "Starting sync run"
        );
        
        let mut tree = InventoryTreeBuilder::new(source)
            .include_templates(config.sync.include_templates)
            .build(&policy, &mut ctx)
            .await
            .map_err(report)?;
        info!(nodes = tree.nodes.len(), vms = tree.vm_count(), "Discovery finished");
        
        write_tree(&tree, options.tree_out.as_deref())?;
        
        let plan = ReconciliationPlanner::new(&target)
            .plan(&tree, &policy, &mut ctx)
            .await
            .map_err(report)?;
        
        if options.dry_run {
            println!("{}", serde_json::to_string_pretty(&plan)?);
            info!("Dry run, nothing written");
            return finish(&mut ctx);
        }
        
        let prompt = format!(
            "Reconcile {} VM(s) ({} new) into {}?",
            plan.vms.len(),
            plan.vms_to_create(),
            config.netbox.url
        );
        if !confirm.confirm(&prompt) {
            info!("Reconciliation cancelled by operator");
            return finish(&mut ctx);
        }
        
        ReconciliationExecutor::new(&target, confirm)
            .execute(&plan, &mut tree, &policy, &mut ctx)
            .await
            .map_err(report)?;
        
        finish(&mut ctx)
    }
    .instrument(span)
    .await
}

fn finish(ctx: &mut SyncContext) -> Result<()> {
    ctx.finish();
    eprint!("{}", ctx.summary.render_table());
    Ok(())
}

/// Log a stage failure and convert it for `main`.
fn report(e: SyncError) -> anyhow::Error {
    match &e {
        SyncError::Validation { message, unmatched } if !unmatched.is_empty() => {
            error!(unmatched = ?unmatched, "{}", message);
        }
        _ => error!(error = %e, fatal = e.is_fatal(), "Sync run aborted"),
    }
    anyhow::Error::new(e)
}

/// Render the tree as pretty JSON to `path`, or stdout when unset.
fn write_tree(tree: &InventoryTree, path: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(tree)?;
    match path {
        Some(path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("Failed to write tree to {}", path.display()))?;
            info!(path = %path.display(), "Tree written");
        }
        None => println!("{}", json),
    }
    Ok(())
}
