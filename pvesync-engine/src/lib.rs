//! # pvesync Engine
//!
//! Turns what a hypervisor reports into entities of an inventory-of-record.
//!
//! ```text
//!  HypervisorSource ──► InventoryTreeBuilder ──► InventoryTree
//!                        (ConfigDecoder,              │
//!                         NetworkCorrelator)          ▼
//!                                         ReconciliationPlanner ◄── PinPolicy
//!                                                     │
//!                                                     ▼
//!  InventoryTarget ◄──────────────────── ReconciliationExecutor ◄── Confirm
//! ```
//!
//! Every stage awaits one collaborator call at a time, so lookups and creates
//! for the same natural key never overlap and parents always resolve before
//! their children.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pvesync_engine::{reconcile, AssumeYes, PinPolicy, SyncOptions};
//!
//! let options = SyncOptions::new(PinPolicy::Unpinned);
//! let outcome = reconcile(source, &target, &AssumeYes, &options).await?;
//! println!("{}", outcome.context.summary.render_table());
//! ```

pub mod builder;
pub mod correlator;
pub mod decoder;
pub mod error;
pub mod executor;
pub mod model;
pub mod planner;
pub mod policy;
pub mod summary;

pub use builder::InventoryTreeBuilder;
pub use correlator::NetworkCorrelator;
pub use decoder::ConfigDecoder;
pub use error::{DecodeError, Result, SyncError};
pub use executor::{AssumeNo, AssumeYes, Confirm, ReconciliationExecutor};
pub use model::*;
pub use planner::{Action, Plan, ReconciliationPlanner};
pub use policy::{ClusterTypeSpec, PinMode, PinPolicy, Placement};
pub use summary::{Counts, SyncContext, SyncSummary};

use pvesync_hypervisor::HypervisorSource;
use pvesync_inventory::InventoryTarget;
use std::sync::Arc;
use tracing::info;

/// Options of one run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub policy: PinPolicy,
    pub include_templates: bool,
    /// Plan only; nothing is written to the inventory.
    pub dry_run: bool,
}

impl SyncOptions {
    pub fn new(policy: PinPolicy) -> Self {
        Self {
            policy,
            include_templates: false,
            dry_run: false,
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct SyncOutcome {
    pub tree: InventoryTree,
    pub plan: Plan,
    pub context: SyncContext,
}

/// Build, plan and execute in one go.
pub async fn reconcile(
    source: Arc<dyn HypervisorSource>,
    target: &dyn InventoryTarget,
    confirm: &dyn Confirm,
    options: &SyncOptions,
) -> Result<SyncOutcome> {
    let mut context = SyncContext::new();
    
    let mut tree = InventoryTreeBuilder::new(source)
        .include_templates(options.include_templates)
        .build(&options.policy, &mut context)
        .await?;
    
    let plan = ReconciliationPlanner::new(target)
        .plan(&tree, &options.policy, &mut context)
        .await?;
    
    if options.dry_run {
        info!(run_id = %context.run_id, "Dry run, nothing written");
    } else {
        ReconciliationExecutor::new(target, confirm)
            .execute(&plan, &mut tree, &options.policy, &mut context)
            .await?;
    }
    
    context.finish();
    Ok(SyncOutcome { tree, plan, context })
}
