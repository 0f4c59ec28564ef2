//! Shared domain vocabulary used across the engagement crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ─── Messaging ──────────────────────────────────────────────────────────────

/// Channel a campaign step or follow-up goes out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Email,
    Sms,
    Task,
    Webhook,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageType::Email => "email",
            MessageType::Sms => "sms",
            MessageType::Task => "task",
            MessageType::Webhook => "webhook",
        };
        write!(f, "{s}")
    }
}

/// Category a sequence template is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateCategory {
    Nurture,
    Onboarding,
    Engagement,
    Reactivation,
    Custom,
}

// ─── Contact Snapshot ───────────────────────────────────────────────────────

/// Point-in-time view of a contact's attributes, as handed over by the CRM
/// store. Decision predicates evaluate against this snapshot only; the core
/// never reaches back into contact storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactSnapshot {
    pub contact_id: Uuid,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl ContactSnapshot {
    pub fn new(contact_id: Uuid) -> Self {
        Self {
            contact_id,
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }
}

// ─── Engagement Events ──────────────────────────────────────────────────────

/// Event kinds emitted by the recording surfaces (ledger, store, runner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementEventType {
    CampaignCreated,
    CampaignCompleted,
    CampaignPaused,
    CampaignResumed,
    CampaignCanceled,
    StepExecuted,
    FollowUpScheduled,
    FollowUpSent,
    FollowUpFailed,
    EnrollmentStarted,
    EnrollmentAdvanced,
    EnrollmentCompleted,
    VariantEnrolled,
    VariantConverted,
}

/// One analytics event describing something the engagement core observed.
/// Routed out through the [`crate::event_bus::EventSink`] trait.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementEvent {
    pub event_id: Uuid,
    pub event_type: EngagementEventType,
    pub campaign_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub workflow_id: Option<Uuid>,
    pub step_order: Option<u32>,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}
