//! Sequence templates — reusable step ladders campaigns are stamped from.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use engage_core::types::{MessageType, TemplateCategory};

use crate::campaign::{AutomationCampaign, CampaignStep};

/// One step of a template: everything a [`CampaignStep`] needs except the
/// campaign it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepBlueprint {
    pub order: u32,
    pub name: String,
    pub message_type: MessageType,
    pub delay_days: u32,
    pub delay_hours: u32,
    pub subject: String,
    pub body: String,
}

impl StepBlueprint {
    pub fn new(order: u32, name: impl Into<String>, delay_days: u32) -> Self {
        Self {
            order,
            name: name.into(),
            message_type: MessageType::Email,
            delay_days,
            delay_hours: 0,
            subject: String::new(),
            body: String::new(),
        }
    }

    pub fn with_message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }
}

/// A named, categorized ladder of step blueprints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: TemplateCategory,
    pub is_system_template: bool,
    pub steps: Vec<StepBlueprint>,
    pub created_at: DateTime<Utc>,
}

impl SequenceTemplate {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: TemplateCategory,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            category,
            is_system_template: false,
            steps: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_steps(mut self, steps: Vec<StepBlueprint>) -> Self {
        self.steps = steps;
        self
    }

    fn system(mut self) -> Self {
        self.is_system_template = true;
        self
    }

    /// Stamps out a campaign for `contact_id`, started at `as_of`.
    pub fn instantiate(
        &self,
        name: impl Into<String>,
        contact_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> AutomationCampaign {
        let steps = self
            .steps
            .iter()
            .map(|b| {
                let mut step = CampaignStep::new(b.order, b.name.clone(), b.message_type)
                    .with_delay(b.delay_days, b.delay_hours);
                step.subject = b.subject.clone();
                step.body = b.body.clone();
                step
            })
            .collect();

        let mut campaign = AutomationCampaign::new(name, contact_id, as_of).with_steps(steps);
        campaign.template_id = Some(self.id);
        campaign
    }
}

/// The stock templates every fresh install ships with.
pub fn builtin_templates() -> Vec<SequenceTemplate> {
    vec![
        SequenceTemplate::new(
            "Lead Nurture - 7 Day",
            "A 7-day nurture sequence for new leads",
            TemplateCategory::Nurture,
        )
        .system()
        .with_steps(vec![
            StepBlueprint::new(0, "Welcome email", 0),
            StepBlueprint::new(1, "Value proposition", 1),
            StepBlueprint::new(2, "Case study", 3),
            StepBlueprint::new(3, "Offer a call", 7).with_message_type(MessageType::Task),
        ]),
        SequenceTemplate::new(
            "Lead Nurture - 30 Day",
            "Extended 30-day lead nurture campaign",
            TemplateCategory::Nurture,
        )
        .system()
        .with_steps(vec![
            StepBlueprint::new(0, "Welcome email", 0),
            StepBlueprint::new(1, "Weekly digest", 7),
            StepBlueprint::new(2, "Mid-point check-in", 14),
            StepBlueprint::new(3, "Closing offer", 30),
        ]),
        SequenceTemplate::new(
            "Customer Onboarding",
            "Welcome and onboard new customers",
            TemplateCategory::Onboarding,
        )
        .system()
        .with_steps(vec![
            StepBlueprint::new(0, "Welcome aboard", 0),
            StepBlueprint::new(1, "Getting started guide", 1),
            StepBlueprint::new(2, "Kickoff call", 3).with_message_type(MessageType::Task),
        ]),
        SequenceTemplate::new(
            "Weekly Check-in",
            "Regular weekly engagement touchpoint",
            TemplateCategory::Engagement,
        )
        .system()
        .with_steps(vec![
            StepBlueprint::new(0, "This week's update", 0),
            StepBlueprint::new(1, "Next week's update", 7),
        ]),
        SequenceTemplate::new(
            "Re-engagement Campaign",
            "Win back inactive contacts",
            TemplateCategory::Reactivation,
        )
        .system()
        .with_steps(vec![
            StepBlueprint::new(0, "We miss you", 0),
            StepBlueprint::new(1, "What's new", 3),
            StepBlueprint::new(2, "Last chance offer", 10),
        ]),
        SequenceTemplate::new(
            "Product Launch Sequence",
            "Announce and promote new products",
            TemplateCategory::Engagement,
        )
        .system()
        .with_steps(vec![
            StepBlueprint::new(0, "Announcement", 0),
            StepBlueprint::new(1, "Feature deep-dive", 2),
            StepBlueprint::new(2, "Launch day", 5).with_message_type(MessageType::Sms),
        ]),
    ]
}

/// In-memory template registry.
#[derive(Clone)]
pub struct TemplateLibrary {
    templates: Arc<DashMap<Uuid, SequenceTemplate>>,
}

impl std::fmt::Debug for TemplateLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateLibrary")
            .field("templates", &self.templates.len())
            .finish()
    }
}

impl TemplateLibrary {
    pub fn new() -> Self {
        Self {
            templates: Arc::new(DashMap::new()),
        }
    }

    pub fn insert(&self, template: SequenceTemplate) -> Uuid {
        let id = template.id;
        self.templates.insert(id, template);
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<SequenceTemplate> {
        self.templates.get(id).map(|r| r.clone())
    }

    /// All templates, ordered by name.
    pub fn list(&self) -> Vec<SequenceTemplate> {
        let mut all: Vec<SequenceTemplate> =
            self.templates.iter().map(|r| r.clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Loads the stock templates, skipping any whose name is already
    /// present. Returns how many were created.
    pub fn seed_builtin(&self) -> usize {
        let mut created = 0;
        for template in builtin_templates() {
            let exists = self.templates.iter().any(|r| r.name == template.name);
            if exists {
                continue;
            }
            info!(name = %template.name, "Seeded template");
            self.insert(template);
            created += 1;
        }
        created
    }

    /// Stamps a campaign out of the template with the given id.
    pub fn apply(
        &self,
        template_id: &Uuid,
        campaign_name: impl Into<String>,
        contact_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<AutomationCampaign> {
        let template = self
            .templates
            .get(template_id)
            .ok_or_else(|| anyhow!("template {} not found", template_id))?;
        Ok(template.instantiate(campaign_name, contact_id, as_of))
    }
}

impl Default for TemplateLibrary {
    fn default() -> Self {
        Self::new()
    }
}
