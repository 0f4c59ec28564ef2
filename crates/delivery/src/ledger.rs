//! Execution ledger — the at-most-once record of which campaign steps have
//! fired.
//!
//! Multiple workers may race to report the same `(campaign, order)` pair.
//! The first writer wins; later writers are told they lost and must not
//! side-effect. The ledger is the single authority on executed-ness.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use engage_scheduler::campaign::AutomationCampaign;

#[derive(Clone)]
pub struct ExecutionLedger {
    executions: Arc<DashMap<(Uuid, u32), DateTime<Utc>>>,
    duplicates: Arc<AtomicU64>,
}

impl std::fmt::Debug for ExecutionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionLedger")
            .field("executions", &self.executions.len())
            .field("duplicates", &self.duplicates.load(Ordering::Relaxed))
            .finish()
    }
}

impl ExecutionLedger {
    pub fn new() -> Self {
        Self {
            executions: Arc::new(DashMap::new()),
            duplicates: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records that a step executed at `as_of`. Returns `true` for the
    /// first writer; `false` means another worker already recorded this
    /// step and the caller must treat its own attempt as a no-op.
    pub fn record_execution(&self, campaign_id: Uuid, order: u32, as_of: DateTime<Utc>) -> bool {
        match self.executions.entry((campaign_id, order)) {
            Entry::Occupied(_) => {
                self.duplicates.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("delivery.steps.duplicate").increment(1);
                debug!(campaign_id = %campaign_id, order, "Duplicate execution report dropped");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(as_of);
                metrics::counter!("delivery.steps.executed").increment(1);
                true
            }
        }
    }

    pub fn executed_at(&self, campaign_id: Uuid, order: u32) -> Option<DateTime<Utc>> {
        self.executions.get(&(campaign_id, order)).map(|r| *r)
    }

    pub fn is_executed(&self, campaign_id: Uuid, order: u32) -> bool {
        self.executions.contains_key(&(campaign_id, order))
    }

    /// How many losing duplicate reports the ledger has absorbed.
    pub fn duplicate_count(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    /// Stamps every recorded execution for this campaign onto its steps.
    pub fn apply_to(&self, campaign: &mut AutomationCampaign) {
        for step in &mut campaign.steps {
            if let Some(at) = self.executed_at(campaign.id, step.order) {
                step.executed_at = Some(at);
            }
        }
    }
}

impl Default for ExecutionLedger {
    fn default() -> Self {
        Self::new()
    }
}
