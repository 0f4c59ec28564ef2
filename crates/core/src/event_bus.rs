//! Engagement event bus — trait for emitting analytics events from any module.
//!
//! Recording surfaces accept an `Arc<dyn EventSink>` and emit events as they
//! observe executions, sends, and enrollment movement. Routing the events
//! onward (warehouse, webhooks) is the host application's concern.

use crate::types::{EngagementEvent, EngagementEventType};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// Trait for emitting engagement events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngagementEvent);
}

/// No-op sink for tests and modules that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: EngagementEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<EngagementEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<EngagementEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_type(&self, event_type: EngagementEventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: EngagementEvent) {
        self.events.lock().push(event);
    }
}

/// Convenience builder for creating `EngagementEvent` with minimal boilerplate.
pub fn make_event(
    event_type: EngagementEventType,
    campaign_id: Option<Uuid>,
    contact_id: Option<Uuid>,
) -> EngagementEvent {
    EngagementEvent {
        event_id: Uuid::new_v4(),
        event_type,
        campaign_id,
        contact_id,
        workflow_id: None,
        step_order: None,
        detail: None,
        timestamp: Utc::now(),
    }
}

/// Convenience: create a no-op event bus for modules that don't need it.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sink() {
        let sink = capture_sink();
        assert_eq!(sink.count(), 0);

        let campaign = Uuid::new_v4();
        let contact = Uuid::new_v4();
        sink.emit(make_event(
            EngagementEventType::StepExecuted,
            Some(campaign),
            Some(contact),
        ));
        sink.emit(make_event(
            EngagementEventType::FollowUpSent,
            None,
            Some(contact),
        ));

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.count_type(EngagementEventType::StepExecuted), 1);
        assert_eq!(sink.count_type(EngagementEventType::FollowUpSent), 1);

        let events = sink.events();
        assert_eq!(events[0].campaign_id, Some(campaign));
        assert_eq!(events[1].contact_id, Some(contact));
    }

    #[test]
    fn test_noop_sink() {
        let sink = noop_sink();
        // Should not panic
        sink.emit(make_event(EngagementEventType::CampaignCreated, None, None));
    }
}
