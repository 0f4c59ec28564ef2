//! In-memory campaign store, the single writer of campaign status.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use engage_core::event_bus::{make_event, EventSink};
use engage_core::types::EngagementEventType;
use engage_scheduler::campaign::{AutomationCampaign, CampaignStateMachine, CampaignStatus};
use engage_scheduler::schedule::completion_eligible;

#[derive(Clone)]
pub struct CampaignStore {
    campaigns: Arc<DashMap<Uuid, AutomationCampaign>>,
    state_machine: Arc<CampaignStateMachine>,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for CampaignStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampaignStore")
            .field("campaigns", &self.campaigns.len())
            .finish()
    }
}

impl CampaignStore {
    pub fn new() -> Self {
        Self {
            campaigns: Arc::new(DashMap::new()),
            state_machine: Arc::new(CampaignStateMachine::new()),
            event_sink: engage_core::event_bus::noop_sink(),
        }
    }

    /// Attach an event sink for emitting engagement events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Stores a new campaign. The campaign arrives with its start instant
    /// already fixed; nothing in the store ever rewrites it.
    pub fn create(&self, campaign: AutomationCampaign) -> Result<Uuid> {
        if campaign.started_at.is_none() {
            return Err(anyhow!("campaign {} has no start instant", campaign.id));
        }
        let id = campaign.id;
        info!(campaign_id = %id, name = %campaign.name, "Creating campaign");
        let event = make_event(
            EngagementEventType::CampaignCreated,
            Some(id),
            Some(campaign.contact_id),
        );
        self.campaigns.insert(id, campaign);
        self.event_sink.emit(event);
        metrics::counter!("delivery.campaigns.created").increment(1);
        Ok(id)
    }

    pub fn get(&self, id: &Uuid) -> Option<AutomationCampaign> {
        self.campaigns.get(id).map(|r| r.clone())
    }

    /// All campaigns, newest first.
    pub fn list(&self) -> Vec<AutomationCampaign> {
        let mut all: Vec<AutomationCampaign> =
            self.campaigns.iter().map(|r| r.clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    pub fn list_by_status(&self, status: CampaignStatus) -> Vec<AutomationCampaign> {
        let mut matching: Vec<AutomationCampaign> = self
            .campaigns
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.clone())
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching
    }

    pub fn pause(&self, id: &Uuid, as_of: DateTime<Utc>) -> Result<()> {
        self.transition(id, CampaignStatus::Paused, as_of, |campaign| {
            campaign.paused_at = Some(as_of);
        })?;
        self.emit_for(id, EngagementEventType::CampaignPaused);
        Ok(())
    }

    pub fn resume(&self, id: &Uuid, as_of: DateTime<Utc>) -> Result<()> {
        self.transition(id, CampaignStatus::Active, as_of, |_| {})?;
        self.emit_for(id, EngagementEventType::CampaignResumed);
        Ok(())
    }

    pub fn cancel(&self, id: &Uuid, as_of: DateTime<Utc>) -> Result<()> {
        self.transition(id, CampaignStatus::Canceled, as_of, |campaign| {
            campaign.canceled_at = Some(as_of);
        })?;
        self.emit_for(id, EngagementEventType::CampaignCanceled);
        Ok(())
    }

    /// Flips the campaign to completed when every step has executed.
    /// Returns whether the transition happened.
    pub fn complete_if_eligible(&self, id: &Uuid, as_of: DateTime<Utc>) -> Result<bool> {
        let eligible = {
            let campaign = self
                .campaigns
                .get(id)
                .ok_or_else(|| anyhow!("campaign {} not found", id))?;
            completion_eligible(&campaign)
        };
        if !eligible {
            return Ok(false);
        }
        self.transition(id, CampaignStatus::Completed, as_of, |campaign| {
            campaign.completed_at = Some(as_of);
        })?;
        self.emit_for(id, EngagementEventType::CampaignCompleted);
        metrics::counter!("delivery.campaigns.completed").increment(1);
        Ok(true)
    }

    /// Writes an execution instant onto one step. The ledger decides who
    /// gets to call this; the store just records the outcome.
    pub fn stamp_execution(&self, id: &Uuid, order: u32, at: DateTime<Utc>) -> Result<()> {
        let mut campaign = self
            .campaigns
            .get_mut(id)
            .ok_or_else(|| anyhow!("campaign {} not found", id))?;
        let step = campaign
            .steps
            .iter_mut()
            .find(|s| s.order == order)
            .ok_or_else(|| anyhow!("campaign {} has no step with order {}", id, order))?;
        step.executed_at = Some(at);
        campaign.updated_at = at;
        Ok(())
    }

    fn transition<F>(
        &self,
        id: &Uuid,
        to: CampaignStatus,
        as_of: DateTime<Utc>,
        apply: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut AutomationCampaign),
    {
        let mut campaign = self
            .campaigns
            .get_mut(id)
            .ok_or_else(|| anyhow!("campaign {} not found", id))?;
        self.state_machine.check(campaign.status, to)?;
        campaign.status = to;
        campaign.updated_at = as_of;
        apply(&mut campaign);
        Ok(())
    }

    fn emit_for(&self, id: &Uuid, event_type: EngagementEventType) {
        let contact_id = self.campaigns.get(id).map(|c| c.contact_id);
        self.event_sink
            .emit(make_event(event_type, Some(*id), contact_id));
    }
}

impl Default for CampaignStore {
    fn default() -> Self {
        Self::new()
    }
}
