//! Aggregate counters over campaigns and follow-ups.

use serde::{Deserialize, Serialize};

use crate::campaign::{AutomationCampaign, CampaignStatus};
use crate::followups::ScheduledFollowUp;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationStats {
    pub total_campaigns: u64,
    pub active_campaigns: u64,
    pub paused_campaigns: u64,
    pub completed_campaigns: u64,
    pub canceled_campaigns: u64,
    pub total_steps: u64,
    pub executed_steps: u64,
    pub pending_followups: u64,
}

impl AutomationStats {
    pub fn collect(campaigns: &[AutomationCampaign], followups: &[ScheduledFollowUp]) -> Self {
        let mut stats = AutomationStats::default();
        for campaign in campaigns {
            stats.total_campaigns += 1;
            match campaign.status {
                CampaignStatus::Active => stats.active_campaigns += 1,
                CampaignStatus::Paused => stats.paused_campaigns += 1,
                CampaignStatus::Completed => stats.completed_campaigns += 1,
                CampaignStatus::Canceled => stats.canceled_campaigns += 1,
            }
            stats.total_steps += campaign.steps.len() as u64;
            stats.executed_steps += campaign.executed_count() as u64;
        }
        stats.pending_followups = followups.iter().filter(|f| f.is_pending()).count() as u64;
        stats
    }
}
