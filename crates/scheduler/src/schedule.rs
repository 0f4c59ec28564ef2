//! Due-time arithmetic for campaign steps.
//!
//! Every step's due instant is derived fresh from the campaign's start plus
//! the step's own delay. Delays never chain off the previous step, so
//! executing a step late does not push later steps back.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::campaign::{AutomationCampaign, CampaignStatus, CampaignStep};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// Scheduling questions are unanswerable before the campaign has a
    /// start instant.
    #[error("campaign {0} has not started, no schedule to compute")]
    NotStarted(Uuid),
}

/// When `step` is due: campaign start plus the step's day and hour delay.
pub fn due_at(
    campaign: &AutomationCampaign,
    step: &CampaignStep,
) -> Result<DateTime<Utc>, ScheduleError> {
    let started_at = campaign
        .started_at
        .ok_or(ScheduleError::NotStarted(campaign.id))?;
    Ok(started_at
        + Duration::days(i64::from(step.delay_days))
        + Duration::hours(i64::from(step.delay_hours)))
}

/// Steps that are unexecuted and due at or before `as_of`, ordered by
/// due instant then step order.
pub fn pending_steps<'a>(
    campaign: &'a AutomationCampaign,
    as_of: DateTime<Utc>,
) -> Result<Vec<&'a CampaignStep>, ScheduleError> {
    let mut due: Vec<(DateTime<Utc>, &CampaignStep)> = Vec::new();
    for step in &campaign.steps {
        if step.is_executed() {
            continue;
        }
        let at = due_at(campaign, step)?;
        if at <= as_of {
            due.push((at, step));
        }
    }
    due.sort_by_key(|(at, step)| (*at, step.order));
    Ok(due.into_iter().map(|(_, step)| step).collect())
}

/// True when the step's due instant has strictly passed without execution.
pub fn is_overdue(
    campaign: &AutomationCampaign,
    step: &CampaignStep,
    as_of: DateTime<Utc>,
) -> Result<bool, ScheduleError> {
    Ok(!step.is_executed() && due_at(campaign, step)? < as_of)
}

/// The full projected timetable: every step's order paired with its due
/// instant, in schedule order.
pub fn schedule_preview(
    campaign: &AutomationCampaign,
) -> Result<Vec<(u32, DateTime<Utc>)>, ScheduleError> {
    let mut timetable = Vec::with_capacity(campaign.steps.len());
    for step in &campaign.steps {
        timetable.push((step.order, due_at(campaign, step)?));
    }
    timetable.sort_by_key(|(order, at)| (*at, *order));
    Ok(timetable)
}

/// Whether the campaign is ready to be marked completed: still active and
/// every step executed. Only signals eligibility; the caller performs the
/// transition.
pub fn completion_eligible(campaign: &AutomationCampaign) -> bool {
    campaign.status == CampaignStatus::Active && campaign.all_steps_executed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use engage_core::types::MessageType;

    fn started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn make_campaign() -> AutomationCampaign {
        AutomationCampaign::new("Nurture", Uuid::new_v4(), started()).with_steps(vec![
            CampaignStep::new(0, "Day zero", MessageType::Email),
            CampaignStep::new(1, "Day one", MessageType::Email).with_delay(1, 0),
            CampaignStep::new(2, "Day two", MessageType::Sms).with_delay(2, 0),
        ])
    }

    #[test]
    fn test_due_at_anchors_to_campaign_start() {
        let campaign = make_campaign();
        let day = |d: u32| Utc.with_ymd_and_hms(2024, 1, 1 + d, 0, 0, 0).unwrap();

        assert_eq!(due_at(&campaign, &campaign.steps[0]).unwrap(), day(0));
        assert_eq!(due_at(&campaign, &campaign.steps[1]).unwrap(), day(1));
        assert_eq!(due_at(&campaign, &campaign.steps[2]).unwrap(), day(2));
    }

    #[test]
    fn test_due_at_mixes_days_and_hours() {
        let campaign = AutomationCampaign::new("Mixed", Uuid::new_v4(), started()).with_steps(
            vec![CampaignStep::new(0, "Soon", MessageType::Email).with_delay(1, 6)],
        );
        assert_eq!(
            due_at(&campaign, &campaign.steps[0]).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_delays_never_chain() {
        // Executing step 1 four days late must not move step 2.
        let mut campaign = make_campaign();
        campaign.steps[1].executed_at = Some(Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap());

        assert_eq!(
            due_at(&campaign, &campaign.steps[2]).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_unstarted_campaign_is_an_error() {
        let mut campaign = make_campaign();
        campaign.started_at = None;

        let result = due_at(&campaign, &campaign.steps[0]);
        assert_eq!(result, Err(ScheduleError::NotStarted(campaign.id)));
        assert!(pending_steps(&campaign, started()).is_err());
    }

    #[test]
    fn test_pending_steps_filters_and_orders() {
        let mut campaign = make_campaign();
        campaign.steps[0].executed_at = Some(started());

        let as_of = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();
        let pending = pending_steps(&campaign, as_of).unwrap();
        let orders: Vec<u32> = pending.iter().map(|s| s.order).collect();
        // Step 0 executed, step 1 due, step 2 not due until Jan 3.
        assert_eq!(orders, vec![1]);
    }

    #[test]
    fn test_pending_steps_includes_exact_boundary() {
        let campaign = make_campaign();
        let as_of = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let pending = pending_steps(&campaign, as_of).unwrap();
        let orders: Vec<u32> = pending.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![0, 1]);
    }

    #[test]
    fn test_is_overdue_is_strict() {
        let campaign = make_campaign();
        let step = &campaign.steps[1];

        let exactly_due = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert!(!is_overdue(&campaign, step, exactly_due).unwrap());
        assert!(is_overdue(&campaign, step, exactly_due + Duration::seconds(1)).unwrap());
    }

    #[test]
    fn test_schedule_preview_orders_the_timetable() {
        let campaign = AutomationCampaign::new("Preview", Uuid::new_v4(), started()).with_steps(
            vec![
                CampaignStep::new(0, "Later", MessageType::Email).with_delay(3, 0),
                CampaignStep::new(1, "Sooner", MessageType::Email).with_delay(0, 12),
            ],
        );
        let timetable = schedule_preview(&campaign).unwrap();
        let orders: Vec<u32> = timetable.iter().map(|(order, _)| *order).collect();
        assert_eq!(orders, vec![1, 0]);
    }

    #[test]
    fn test_completion_eligibility() {
        let mut campaign = make_campaign();
        assert!(!completion_eligible(&campaign));

        for step in &mut campaign.steps {
            step.executed_at = Some(started());
        }
        assert!(completion_eligible(&campaign));

        campaign.status = CampaignStatus::Paused;
        assert!(!completion_eligible(&campaign));
    }
}
