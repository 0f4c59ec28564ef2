//! Campaign step scheduling. Campaigns are stamped from templates, every
//! step's due time is anchored to the campaign start, and follow-up rules
//! queue individual touches outside any campaign.

pub mod campaign;
pub mod followups;
pub mod schedule;
pub mod stats;
pub mod templates;

pub use campaign::{
    AutomationCampaign, CampaignStateMachine, CampaignStatus, CampaignStep,
};
pub use followups::{
    due_followups, schedule_sequence, FollowUpRule, FollowUpSequence, FollowUpStatus,
    ScheduledFollowUp,
};
pub use schedule::{
    completion_eligible, due_at, is_overdue, pending_steps, schedule_preview, ScheduleError,
};
pub use stats::AutomationStats;
pub use templates::{builtin_templates, SequenceTemplate, StepBlueprint, TemplateLibrary};
