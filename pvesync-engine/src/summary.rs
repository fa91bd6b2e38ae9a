//! Per-run bookkeeping.

use chrono::{DateTime, Utc};
use pvesync_inventory::EntityKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::info;
use uuid::Uuid;

/// Outcome counts for one entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    /// Newly created in the inventory
    pub created: usize,
    /// Already existed (or belongs to a VM that already existed)
    pub skipped: usize,
    /// Lost to a parse or connectivity failure
    pub dropped: usize,
}

/// Outcome counts per entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    counts: BTreeMap<EntityKind, Counts>,
}

impl SyncSummary {
    pub fn created(&mut self, kind: EntityKind) {
        self.entry(kind).created += 1;
    }
    
    pub fn skipped(&mut self, kind: EntityKind) {
        self.entry(kind).skipped += 1;
    }
    
    pub fn dropped(&mut self, kind: EntityKind) {
        self.entry(kind).dropped += 1;
    }
    
    pub fn get(&self, kind: EntityKind) -> Counts {
        self.counts.get(&kind).copied().unwrap_or_default()
    }
    
    pub fn total_created(&self) -> usize {
        self.counts.values().map(|c| c.created).sum()
    }
    
    pub fn total_dropped(&self) -> usize {
        self.counts.values().map(|c| c.dropped).sum()
    }
    
    /// Render as a fixed-width table, one row per kind that saw any activity.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<16} {:>8} {:>8} {:>8}", "ENTITY", "CREATED", "SKIPPED", "DROPPED");
        for kind in EntityKind::ALL {
            if let Some(c) = self.counts.get(&kind) {
                let _ = writeln!(
                    out,
                    "{:<16} {:>8} {:>8} {:>8}",
                    kind.as_str(),
                    c.created,
                    c.skipped,
                    c.dropped
                );
            }
        }
        out
    }
    
    fn entry(&mut self, kind: EntityKind) -> &mut Counts {
        self.counts.entry(kind).or_default()
    }
}

/// State threaded through every stage of a run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: SyncSummary,
}

impl SyncContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            summary: SyncSummary::default(),
        }
    }
    
    /// Mark the run finished and log the summary.
    pub fn finish(&mut self) {
        let finished_at = Utc::now();
        self.finished_at = Some(finished_at);
        
        for kind in EntityKind::ALL {
            let c = self.summary.get(kind);
            if c != Counts::default() {
                info!(
                    run_id = %self.run_id,
                    entity = %kind,
                    created = c.created,
                    skipped = c.skipped,
                    dropped = c.dropped,
                    "Sync summary"
                );
            }
        }
        info!(
            run_id = %self.run_id,
            elapsed_ms = (finished_at - self.started_at).num_milliseconds(),
            created = self.summary.total_created(),
            dropped = self.summary.total_dropped(),
            "Sync run finished"
        );
    }
}

impl Default for SyncContext {
    fn default() -> Self {
        Self::new()
    }
}
