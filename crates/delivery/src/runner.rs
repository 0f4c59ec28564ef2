//! Batch execution passes over due steps and follow-ups.
//!
//! The runner ties the ledger and the store together: the ledger arbitrates
//! at-most-once execution, the store records the outcome, and the runner
//! reports what it did through events and counters.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info};
use uuid::Uuid;

use engage_core::event_bus::{make_event, EventSink};
use engage_core::types::EngagementEventType;
use engage_scheduler::campaign::CampaignStatus;
use engage_scheduler::followups::{schedule_sequence, FollowUpSequence, ScheduledFollowUp};
use engage_scheduler::schedule::pending_steps;

use crate::ledger::ExecutionLedger;
use crate::store::CampaignStore;

const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Clone)]
pub struct DeliveryRunner {
    store: CampaignStore,
    ledger: ExecutionLedger,
    event_sink: Arc<dyn EventSink>,
    batch_size: usize,
}

impl std::fmt::Debug for DeliveryRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryRunner")
            .field("store", &self.store)
            .field("ledger", &self.ledger)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl DeliveryRunner {
    pub fn new(store: CampaignStore, ledger: ExecutionLedger) -> Self {
        Self {
            store,
            ledger,
            event_sink: engage_core::event_bus::noop_sink(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Attach an event sink for emitting engagement events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Cap on items handled per pass.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn store(&self) -> &CampaignStore {
        &self.store
    }

    pub fn ledger(&self) -> &ExecutionLedger {
        &self.ledger
    }

    /// Executes one step of an active campaign. Returns `false` when
    /// another worker already recorded this step.
    pub fn execute_step(
        &self,
        campaign_id: &Uuid,
        order: u32,
        as_of: DateTime<Utc>,
    ) -> Result<bool> {
        let campaign = self
            .store
            .get(campaign_id)
            .ok_or_else(|| anyhow!("campaign {} not found", campaign_id))?;
        if campaign.status != CampaignStatus::Active {
            return Err(anyhow!(
                "campaign {} is not active, refusing to execute step {}",
                campaign_id,
                order
            ));
        }
        let step = campaign
            .step(order)
            .ok_or_else(|| anyhow!("campaign {} has no step with order {}", campaign_id, order))?;

        if !self.ledger.record_execution(*campaign_id, order, as_of) {
            return Ok(false);
        }

        self.store.stamp_execution(campaign_id, order, as_of)?;
        debug!(campaign_id = %campaign_id, order, step = %step.name, "Executed step");

        let mut event = make_event(
            EngagementEventType::StepExecuted,
            Some(*campaign_id),
            Some(campaign.contact_id),
        );
        event.step_order = Some(order);
        event.detail = Some(step.name.clone());
        self.event_sink.emit(event);

        self.store.complete_if_eligible(campaign_id, as_of)?;
        Ok(true)
    }

    /// One pass over every active campaign, executing steps that are due at
    /// `as_of`. Per-step failures are logged and skipped so one bad
    /// campaign cannot stall the rest. Returns how many steps executed.
    pub fn process_due_steps(&self, as_of: DateTime<Utc>) -> Result<usize> {
        let mut executed = 0;
        let mut errors = 0;

        'campaigns: for campaign in self.store.list_by_status(CampaignStatus::Active) {
            let due = pending_steps(&campaign, as_of)?;
            for step in due {
                if executed >= self.batch_size {
                    break 'campaigns;
                }
                match self.execute_step(&campaign.id, step.order, as_of) {
                    Ok(true) => executed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        errors += 1;
                        error!(
                            campaign_id = %campaign.id,
                            order = step.order,
                            error = %e,
                            "Step execution failed"
                        );
                    }
                }
            }
        }

        info!(executed, errors, "Due-step pass complete");
        Ok(executed)
    }

    /// One pass over due follow-ups, sending each through `send`. Success
    /// marks the follow-up sent; failure marks it failed with the error
    /// recorded. Returns `(sent, failed)` counts.
    pub fn process_due_followups<F>(
        &self,
        followups: &mut [ScheduledFollowUp],
        as_of: DateTime<Utc>,
        mut send: F,
    ) -> (usize, usize)
    where
        F: FnMut(&ScheduledFollowUp) -> Result<()>,
    {
        let mut sent = 0;
        let mut failed = 0;

        for followup in followups.iter_mut() {
            if !(followup.is_pending() && followup.scheduled_for <= as_of) {
                continue;
            }
            if sent + failed >= self.batch_size {
                break;
            }
            match send(followup) {
                Ok(()) => {
                    followup.mark_sent(as_of);
                    metrics::counter!("delivery.followups.sent").increment(1);
                    self.event_sink.emit(make_event(
                        EngagementEventType::FollowUpSent,
                        None,
                        Some(followup.contact_id),
                    ));
                    sent += 1;
                }
                Err(e) => {
                    error!(
                        followup_id = %followup.id,
                        contact_id = %followup.contact_id,
                        error = %e,
                        "Follow-up send failed"
                    );
                    followup.mark_failed(e.to_string());
                    metrics::counter!("delivery.followups.failed").increment(1);
                    let mut event = make_event(
                        EngagementEventType::FollowUpFailed,
                        None,
                        Some(followup.contact_id),
                    );
                    event.detail = Some(e.to_string());
                    self.event_sink.emit(event);
                    failed += 1;
                }
            }
        }

        info!(sent, failed, "Follow-up pass complete");
        (sent, failed)
    }

    /// Queues a canned follow-up sequence for a contact, announcing each
    /// rung on the event bus.
    pub fn schedule_sequence_for(
        &self,
        contact_id: Uuid,
        sequence: FollowUpSequence,
        start_delay_hours: u32,
        as_of: DateTime<Utc>,
    ) -> Vec<ScheduledFollowUp> {
        let scheduled = schedule_sequence(contact_id, sequence, start_delay_hours, as_of);
        for followup in &scheduled {
            self.event_sink.emit(make_event(
                EngagementEventType::FollowUpScheduled,
                None,
                Some(followup.contact_id),
            ));
        }
        info!(
            contact_id = %contact_id,
            count = scheduled.len(),
            "Scheduled follow-up sequence"
        );
        scheduled
    }
}
