//! Campaign and step types plus the lifecycle state machine.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use engage_core::types::MessageType;

// ─── Campaign Lifecycle ─────────────────────────────────────────────────────

/// Lifecycle status of an automation campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Active,
    Paused,
    Completed,
    Canceled,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

/// Describes a single valid status transition for a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: CampaignStatus,
    pub to: CampaignStatus,
    pub trigger: String,
}

/// Guards campaign lifecycle by enforcing a finite set of valid status
/// transitions. Completed and canceled are terminal.
#[derive(Debug, Clone)]
pub struct CampaignStateMachine {
    pub transitions: Vec<StatusTransition>,
}

impl CampaignStateMachine {
    pub fn new() -> Self {
        let transitions = vec![
            // Active ->
            StatusTransition {
                from: CampaignStatus::Active,
                to: CampaignStatus::Paused,
                trigger: "pause".to_string(),
            },
            StatusTransition {
                from: CampaignStatus::Active,
                to: CampaignStatus::Completed,
                trigger: "all_steps_executed".to_string(),
            },
            StatusTransition {
                from: CampaignStatus::Active,
                to: CampaignStatus::Canceled,
                trigger: "cancel".to_string(),
            },
            // Paused ->
            StatusTransition {
                from: CampaignStatus::Paused,
                to: CampaignStatus::Active,
                trigger: "resume".to_string(),
            },
            StatusTransition {
                from: CampaignStatus::Paused,
                to: CampaignStatus::Canceled,
                trigger: "cancel_while_paused".to_string(),
            },
        ];

        Self { transitions }
    }

    /// Returns `true` if the given transition is allowed.
    pub fn can_transition(&self, from: CampaignStatus, to: CampaignStatus) -> bool {
        self.transitions
            .iter()
            .any(|t| t.from == from && t.to == to)
    }

    /// Validates a transition, returning an error when it is not permitted.
    pub fn check(&self, from: CampaignStatus, to: CampaignStatus) -> Result<()> {
        if self.can_transition(from, to) {
            Ok(())
        } else {
            Err(anyhow!("Invalid status transition from {from} to {to}"))
        }
    }
}

impl Default for CampaignStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Campaign Data ──────────────────────────────────────────────────────────

/// One timed touch in a campaign. Delays are measured from the campaign's
/// start, never from the previous step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignStep {
    pub id: Uuid,
    pub order: u32,
    pub name: String,
    pub message_type: MessageType,
    pub delay_days: u32,
    pub delay_hours: u32,
    pub subject: String,
    pub body: String,
    pub executed_at: Option<DateTime<Utc>>,
}

impl CampaignStep {
    pub fn new(order: u32, name: impl Into<String>, message_type: MessageType) -> Self {
        Self {
            id: Uuid::new_v4(),
            order,
            name: name.into(),
            message_type,
            delay_days: 0,
            delay_hours: 0,
            subject: String::new(),
            body: String::new(),
            executed_at: None,
        }
    }

    pub fn with_delay(mut self, days: u32, hours: u32) -> Self {
        self.delay_days = days;
        self.delay_hours = hours;
        self
    }

    pub fn with_content(mut self, subject: impl Into<String>, body: impl Into<String>) -> Self {
        self.subject = subject.into();
        self.body = body.into();
        self
    }

    pub fn is_executed(&self) -> bool {
        self.executed_at.is_some()
    }
}

/// A timed sequence of steps applied to one contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationCampaign {
    pub id: Uuid,
    pub name: String,
    pub template_id: Option<Uuid>,
    pub contact_id: Uuid,
    pub status: CampaignStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub steps: Vec<CampaignStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AutomationCampaign {
    /// Creates an active campaign started at `as_of`. The start instant is
    /// the anchor every step delay is measured from.
    pub fn new(name: impl Into<String>, contact_id: Uuid, as_of: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            template_id: None,
            contact_id,
            status: CampaignStatus::Active,
            started_at: Some(as_of),
            paused_at: None,
            completed_at: None,
            canceled_at: None,
            steps: Vec::new(),
            created_at: as_of,
            updated_at: as_of,
        }
    }

    pub fn with_steps(mut self, mut steps: Vec<CampaignStep>) -> Self {
        steps.sort_by_key(|s| s.order);
        self.steps = steps;
        self
    }

    pub fn step(&self, order: u32) -> Option<&CampaignStep> {
        self.steps.iter().find(|s| s.order == order)
    }

    pub fn executed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_executed()).count()
    }

    /// True when every step has executed. Says nothing about status; the
    /// store decides when to flip the campaign to completed.
    pub fn all_steps_executed(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.is_executed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn make_campaign() -> AutomationCampaign {
        AutomationCampaign::new("Welcome", Uuid::new_v4(), as_of()).with_steps(vec![
            CampaignStep::new(1, "Intro email", MessageType::Email).with_delay(1, 0),
            CampaignStep::new(0, "Welcome email", MessageType::Email),
        ])
    }

    #[test]
    fn test_steps_sorted_by_order() {
        let campaign = make_campaign();
        let orders: Vec<u32> = campaign.steps.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![0, 1]);
    }

    #[test]
    fn test_all_steps_executed() {
        let mut campaign = make_campaign();
        assert!(!campaign.all_steps_executed());

        for step in &mut campaign.steps {
            step.executed_at = Some(as_of());
        }
        assert!(campaign.all_steps_executed());
        assert_eq!(campaign.executed_count(), 2);
    }

    #[test]
    fn test_empty_campaign_is_never_complete() {
        let campaign = AutomationCampaign::new("Empty", Uuid::new_v4(), as_of());
        assert!(!campaign.all_steps_executed());
    }

    #[test]
    fn test_state_machine_allows_pause_and_resume() {
        let machine = CampaignStateMachine::new();
        assert!(machine.can_transition(CampaignStatus::Active, CampaignStatus::Paused));
        assert!(machine.can_transition(CampaignStatus::Paused, CampaignStatus::Active));
        assert!(machine.check(CampaignStatus::Active, CampaignStatus::Completed).is_ok());
    }

    #[test]
    fn test_state_machine_terminal_states() {
        let machine = CampaignStateMachine::new();
        assert!(!machine.can_transition(CampaignStatus::Completed, CampaignStatus::Active));
        assert!(!machine.can_transition(CampaignStatus::Canceled, CampaignStatus::Active));
        assert!(machine.check(CampaignStatus::Paused, CampaignStatus::Completed).is_err());
    }
}
