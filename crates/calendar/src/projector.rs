//! Calendar event projection — a read-only flattening of campaign steps and
//! follow-ups into displayable events inside one time window.
//!
//! Projection never mutates its inputs and holds no cache; rendering layers
//! recompute it per pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use engage_core::types::MessageType;
use engage_scheduler::campaign::AutomationCampaign;
use engage_scheduler::followups::{FollowUpStatus, ScheduledFollowUp};
use engage_scheduler::schedule::{due_at, ScheduleError};

use crate::window::TimeWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarEventKind {
    AutomationStep,
    FollowUp,
}

/// One renderable calendar entry. Step events carry their campaign and step
/// order; follow-up events carry neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub kind: CalendarEventKind,
    pub title: String,
    pub source_step_order: Option<u32>,
    pub message_type: Option<MessageType>,
    pub due_at: DateTime<Utc>,
    pub executed: bool,
    pub campaign_id: Option<Uuid>,
    pub contact_id: Uuid,
}

/// Projects every campaign step due inside `window` into a calendar event.
///
/// Ordering is ascending by due instant, with ties broken by campaign id
/// then step order so simultaneous events render in a stable order. Fails
/// if any campaign in the set has no start instant.
pub fn project_events(
    campaigns: &[AutomationCampaign],
    window: &TimeWindow,
) -> Result<Vec<CalendarEvent>, ScheduleError> {
    let mut events = Vec::new();
    for campaign in campaigns {
        for step in &campaign.steps {
            let due = due_at(campaign, step)?;
            if !window.contains(due) {
                continue;
            }
            events.push(CalendarEvent {
                id: format!("step-{}", step.id),
                kind: CalendarEventKind::AutomationStep,
                title: step.name.clone(),
                source_step_order: Some(step.order),
                message_type: Some(step.message_type),
                due_at: due,
                executed: step.is_executed(),
                campaign_id: Some(campaign.id),
                contact_id: campaign.contact_id,
            });
        }
    }
    sort_events(&mut events);
    Ok(events)
}

/// Projects follow-ups falling inside `window`. A follow-up counts as
/// executed once it has been sent.
pub fn project_followups(
    followups: &[ScheduledFollowUp],
    window: &TimeWindow,
) -> Vec<CalendarEvent> {
    let mut events: Vec<CalendarEvent> = followups
        .iter()
        .filter(|f| window.contains(f.scheduled_for))
        .map(|f| CalendarEvent {
            id: format!("followup-{}", f.id),
            kind: CalendarEventKind::FollowUp,
            title: if f.title.is_empty() {
                "Follow-up".to_string()
            } else {
                f.title.clone()
            },
            source_step_order: None,
            message_type: None,
            due_at: f.scheduled_for,
            executed: f.status == FollowUpStatus::Sent,
            campaign_id: None,
            contact_id: f.contact_id,
        })
        .collect();
    sort_events(&mut events);
    events
}

/// Merges already-projected event lists into one calendar, re-sorted under
/// the same ordering rule.
pub fn merge_events(mut events: Vec<CalendarEvent>, mut more: Vec<CalendarEvent>) -> Vec<CalendarEvent> {
    events.append(&mut more);
    sort_events(&mut events);
    events
}

fn sort_events(events: &mut [CalendarEvent]) {
    events.sort_by(|a, b| {
        (a.due_at, a.campaign_id, a.source_step_order, &a.id).cmp(&(
            b.due_at,
            b.campaign_id,
            b.source_step_order,
            &b.id,
        ))
    });
}
