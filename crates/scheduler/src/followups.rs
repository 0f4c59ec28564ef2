//! Follow-up rules, scheduled follow-ups, and canned follow-up sequences.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

// ─── Rules ──────────────────────────────────────────────────────────────────

/// Declarative rule for automatic follow-up scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpRule {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    /// Contact status that triggers this rule. `None` means the rule is
    /// applied manually, never by a status change.
    pub trigger_on_status: Option<String>,
    pub delay_days: u32,
    pub subject_template: String,
    pub body_template: String,
    pub created_at: DateTime<Utc>,
}

impl FollowUpRule {
    pub fn new(name: impl Into<String>, delay_days: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_active: true,
            trigger_on_status: None,
            delay_days,
            subject_template: String::new(),
            body_template: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn triggered_by(mut self, status: impl Into<String>) -> Self {
        self.trigger_on_status = Some(status.into());
        self
    }

    /// Schedules one follow-up under this rule, due `delay_days` after
    /// `as_of`.
    pub fn schedule(&self, contact_id: Uuid, as_of: DateTime<Utc>) -> ScheduledFollowUp {
        ScheduledFollowUp::new(
            contact_id,
            Some(self.id),
            as_of + Duration::days(i64::from(self.delay_days)),
            as_of,
        )
    }
}

/// Applies every active rule triggered by `new_status` for this contact.
pub fn schedule_for_status(
    rules: &[FollowUpRule],
    contact_id: Uuid,
    new_status: &str,
    as_of: DateTime<Utc>,
) -> Vec<ScheduledFollowUp> {
    rules
        .iter()
        .filter(|r| r.is_active && r.trigger_on_status.as_deref() == Some(new_status))
        .map(|r| {
            info!(rule = %r.name, contact_id = %contact_id, "Scheduling follow-up from rule");
            r.schedule(contact_id, as_of)
        })
        .collect()
}

// ─── Scheduled Follow-Ups ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpStatus {
    Pending,
    Sent,
    Cancelled,
    Failed,
}

/// One queued follow-up touch for a contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledFollowUp {
    pub id: Uuid,
    pub contact_id: Uuid,
    pub rule_id: Option<Uuid>,
    pub title: String,
    pub scheduled_for: DateTime<Utc>,
    pub status: FollowUpStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledFollowUp {
    pub fn new(
        contact_id: Uuid,
        rule_id: Option<Uuid>,
        scheduled_for: DateTime<Utc>,
        as_of: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            contact_id,
            rule_id,
            title: String::new(),
            scheduled_for,
            status: FollowUpStatus::Pending,
            sent_at: None,
            error_message: None,
            created_at: as_of,
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == FollowUpStatus::Pending
    }

    pub fn mark_sent(&mut self, as_of: DateTime<Utc>) {
        self.status = FollowUpStatus::Sent;
        self.sent_at = Some(as_of);
    }

    pub fn mark_cancelled(&mut self) {
        self.status = FollowUpStatus::Cancelled;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = FollowUpStatus::Failed;
        self.error_message = Some(error.into());
    }
}

/// Pending follow-ups due at or before `as_of`, earliest first.
pub fn due_followups<'a>(
    followups: &'a [ScheduledFollowUp],
    as_of: DateTime<Utc>,
) -> Vec<&'a ScheduledFollowUp> {
    let mut due: Vec<&ScheduledFollowUp> = followups
        .iter()
        .filter(|f| f.is_pending() && f.scheduled_for <= as_of)
        .collect();
    due.sort_by_key(|f| f.scheduled_for);
    due
}

// ─── Sequences ──────────────────────────────────────────────────────────────

/// Canned follow-up ladders, from softest to most insistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpSequence {
    Standard,
    Aggressive,
    Gentle,
}

impl FollowUpSequence {
    /// Day offsets and titles for each rung of the ladder.
    pub fn rungs(&self) -> &'static [(u32, &'static str)] {
        match self {
            FollowUpSequence::Standard => &[
                (1, "Initial follow-up"),
                (3, "Second follow-up"),
                (7, "Third follow-up"),
                (14, "Final follow-up"),
            ],
            FollowUpSequence::Aggressive => &[
                (1, "Immediate follow-up"),
                (2, "Quick check-in"),
                (4, "Third touch"),
                (7, "One week follow-up"),
            ],
            FollowUpSequence::Gentle => &[
                (3, "Gentle check-in"),
                (7, "One week follow-up"),
                (14, "Two week follow-up"),
                (30, "Monthly check-in"),
            ],
        }
    }
}

/// Schedules an entire sequence for a contact. The first rung is measured
/// from `as_of` plus `start_delay_hours`; later rungs stack day offsets on
/// top of that same start.
pub fn schedule_sequence(
    contact_id: Uuid,
    sequence: FollowUpSequence,
    start_delay_hours: u32,
    as_of: DateTime<Utc>,
) -> Vec<ScheduledFollowUp> {
    let start = as_of + Duration::hours(i64::from(start_delay_hours));
    sequence
        .rungs()
        .iter()
        .map(|(days, title)| {
            ScheduledFollowUp::new(
                contact_id,
                None,
                start + Duration::days(i64::from(*days)),
                as_of,
            )
            .titled(*title)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_rule_schedules_with_delay() {
        let rule = FollowUpRule::new("Three day nudge", 3);
        let followup = rule.schedule(Uuid::new_v4(), as_of());

        assert_eq!(followup.scheduled_for, as_of() + Duration::days(3));
        assert_eq!(followup.rule_id, Some(rule.id));
        assert!(followup.is_pending());
    }

    #[test]
    fn test_schedule_for_status_filters_rules() {
        let rules = vec![
            FollowUpRule::new("Lead outreach", 1).triggered_by("lead"),
            FollowUpRule::new("Win-back", 7).triggered_by("inactive"),
            {
                let mut inactive_rule = FollowUpRule::new("Disabled", 1).triggered_by("lead");
                inactive_rule.is_active = false;
                inactive_rule
            },
        ];

        let scheduled = schedule_for_status(&rules, Uuid::new_v4(), "lead", as_of());
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].scheduled_for, as_of() + Duration::days(1));
    }

    #[test]
    fn test_due_followups_filters_and_orders() {
        let contact = Uuid::new_v4();
        let mut sent = ScheduledFollowUp::new(contact, None, as_of() - Duration::days(2), as_of());
        sent.mark_sent(as_of());

        let followups = vec![
            ScheduledFollowUp::new(contact, None, as_of() + Duration::days(1), as_of()),
            ScheduledFollowUp::new(contact, None, as_of() - Duration::hours(1), as_of()),
            sent,
            ScheduledFollowUp::new(contact, None, as_of(), as_of()),
        ];

        let due = due_followups(&followups, as_of());
        assert_eq!(due.len(), 2);
        assert!(due[0].scheduled_for <= due[1].scheduled_for);
        // The boundary instant itself counts as due.
        assert!(due.iter().any(|f| f.scheduled_for == as_of()));
    }

    #[test]
    fn test_sequence_ladder_offsets() {
        let contact = Uuid::new_v4();
        let ladder = schedule_sequence(contact, FollowUpSequence::Standard, 24, as_of());

        let start = as_of() + Duration::hours(24);
        assert_eq!(ladder.len(), 4);
        assert_eq!(ladder[0].scheduled_for, start + Duration::days(1));
        assert_eq!(ladder[3].scheduled_for, start + Duration::days(14));
        assert_eq!(ladder[0].title, "Initial follow-up");
    }

    #[test]
    fn test_gentle_sequence_spreads_out() {
        let ladder = schedule_sequence(Uuid::new_v4(), FollowUpSequence::Gentle, 0, as_of());
        assert_eq!(ladder[0].scheduled_for, as_of() + Duration::days(3));
        assert_eq!(ladder[3].scheduled_for, as_of() + Duration::days(30));
    }

    #[test]
    fn test_mark_failed_records_the_error() {
        let mut followup = ScheduledFollowUp::new(Uuid::new_v4(), None, as_of(), as_of());
        followup.mark_failed("smtp timeout");
        assert_eq!(followup.status, FollowUpStatus::Failed);
        assert_eq!(followup.error_message.as_deref(), Some("smtp timeout"));
    }
}
