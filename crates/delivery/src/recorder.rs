//! A/B counter recording — the delivery side owns the enrollment and
//! conversion counters, incremented atomically so evaluator snapshots never
//! see a torn read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use engage_abtest::{evaluate, AbTest, AbTestReport, Variant, VariantStats};
use engage_core::event_bus::{make_event, EventSink};
use engage_core::types::EngagementEventType;

struct TestCounters {
    workflow_id: Uuid,
    name: String,
    split_percentage: u8,
    is_active: bool,
    created_at: DateTime<Utc>,
    enrolled_a: AtomicU64,
    converted_a: AtomicU64,
    enrolled_b: AtomicU64,
    converted_b: AtomicU64,
}

#[derive(Clone)]
pub struct AbTestRecorder {
    tests: Arc<DashMap<Uuid, TestCounters>>,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for AbTestRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbTestRecorder")
            .field("tests", &self.tests.len())
            .finish()
    }
}

impl AbTestRecorder {
    pub fn new() -> Self {
        Self {
            tests: Arc::new(DashMap::new()),
            event_sink: engage_core::event_bus::noop_sink(),
        }
    }

    /// Attach an event sink for emitting engagement events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Starts tracking a test, seeding counters from the given snapshot.
    pub fn register(&self, test: AbTest) -> Uuid {
        let id = test.id;
        info!(test_id = %id, name = %test.name, "Registering A/B test");
        self.tests.insert(
            id,
            TestCounters {
                workflow_id: test.workflow_id,
                name: test.name,
                split_percentage: test.split_percentage,
                is_active: test.is_active,
                created_at: test.created_at,
                enrolled_a: AtomicU64::new(test.variant_a.enrolled),
                converted_a: AtomicU64::new(test.variant_a.converted),
                enrolled_b: AtomicU64::new(test.variant_b.enrolled),
                converted_b: AtomicU64::new(test.variant_b.converted),
            },
        );
        id
    }

    pub fn record_enrollment(&self, test_id: &Uuid, variant: Variant) -> Result<()> {
        let counters = self
            .tests
            .get(test_id)
            .ok_or_else(|| anyhow!("A/B test {} not found", test_id))?;
        match variant {
            Variant::A => counters.enrolled_a.fetch_add(1, Ordering::Relaxed),
            Variant::B => counters.enrolled_b.fetch_add(1, Ordering::Relaxed),
        };
        metrics::counter!("abtest.enrollments").increment(1);
        let mut event = make_event(EngagementEventType::VariantEnrolled, None, None);
        event.workflow_id = Some(counters.workflow_id);
        event.detail = Some(format!("variant:{variant}"));
        self.event_sink.emit(event);
        Ok(())
    }

    pub fn record_conversion(&self, test_id: &Uuid, variant: Variant) -> Result<()> {
        let counters = self
            .tests
            .get(test_id)
            .ok_or_else(|| anyhow!("A/B test {} not found", test_id))?;
        match variant {
            Variant::A => counters.converted_a.fetch_add(1, Ordering::Relaxed),
            Variant::B => counters.converted_b.fetch_add(1, Ordering::Relaxed),
        };
        metrics::counter!("abtest.conversions").increment(1);
        let mut event = make_event(EngagementEventType::VariantConverted, None, None);
        event.workflow_id = Some(counters.workflow_id);
        event.detail = Some(format!("variant:{variant}"));
        self.event_sink.emit(event);
        Ok(())
    }

    /// A point-in-time copy of the test and its counters.
    pub fn snapshot(&self, test_id: &Uuid) -> Result<AbTest> {
        let counters = self
            .tests
            .get(test_id)
            .ok_or_else(|| anyhow!("A/B test {} not found", test_id))?;
        Ok(AbTest {
            id: *test_id,
            workflow_id: counters.workflow_id,
            name: counters.name.clone(),
            split_percentage: counters.split_percentage,
            variant_a: VariantStats {
                enrolled: counters.enrolled_a.load(Ordering::Relaxed),
                converted: counters.converted_a.load(Ordering::Relaxed),
            },
            variant_b: VariantStats {
                enrolled: counters.enrolled_b.load(Ordering::Relaxed),
                converted: counters.converted_b.load(Ordering::Relaxed),
            },
            is_active: counters.is_active,
            created_at: counters.created_at,
        })
    }

    /// Evaluates the current counters into a winner report.
    pub fn report(&self, test_id: &Uuid, min_sample_size: u64) -> Result<AbTestReport> {
        let snapshot = self.snapshot(test_id)?;
        Ok(evaluate(&snapshot, min_sample_size))
    }

    /// Snapshots of every test attached to the given workflow.
    pub fn by_workflow(&self, workflow_id: &Uuid) -> Vec<AbTest> {
        let ids: Vec<Uuid> = self
            .tests
            .iter()
            .filter(|r| r.workflow_id == *workflow_id)
            .map(|r| *r.key())
            .collect();
        ids.iter().filter_map(|id| self.snapshot(id).ok()).collect()
    }
}

impl Default for AbTestRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engage_abtest::Winner;

    fn make_test() -> AbTest {
        AbTest::new(Uuid::new_v4(), "Subject line test", 50)
    }

    #[test]
    fn test_register_and_snapshot() {
        let recorder = AbTestRecorder::new();
        let id = recorder.register(make_test());

        let snapshot = recorder.snapshot(&id).unwrap();
        assert_eq!(snapshot.variant_a.enrolled, 0);
        assert_eq!(snapshot.variant_b.enrolled, 0);
    }

    #[test]
    fn test_record_and_report() {
        let recorder = AbTestRecorder::new();
        let id = recorder.register(make_test());

        for _ in 0..100 {
            recorder.record_enrollment(&id, Variant::A).unwrap();
            recorder.record_enrollment(&id, Variant::B).unwrap();
        }
        for _ in 0..25 {
            recorder.record_conversion(&id, Variant::A).unwrap();
        }
        for _ in 0..30 {
            recorder.record_conversion(&id, Variant::B).unwrap();
        }

        let report = recorder.report(&id, 0).unwrap();
        assert_eq!(report.conversion_rate_a, 25.0);
        assert_eq!(report.conversion_rate_b, 30.0);
        assert_eq!(report.winner, Winner::B);
    }

    #[test]
    fn test_unknown_test_errors() {
        let recorder = AbTestRecorder::new();
        assert!(recorder.record_enrollment(&Uuid::new_v4(), Variant::A).is_err());
        assert!(recorder.snapshot(&Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_concurrent_increments_all_land() {
        let recorder = AbTestRecorder::new();
        let id = recorder.register(make_test());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let recorder = recorder.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..250 {
                    recorder.record_enrollment(&id, Variant::A).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = recorder.snapshot(&id).unwrap();
        assert_eq!(snapshot.variant_a.enrolled, 1000);
    }

    #[test]
    fn test_by_workflow_filters() {
        let recorder = AbTestRecorder::new();
        let workflow_id = Uuid::new_v4();
        recorder.register(AbTest::new(workflow_id, "One", 50));
        recorder.register(AbTest::new(workflow_id, "Two", 30));
        recorder.register(make_test());

        assert_eq!(recorder.by_workflow(&workflow_id).len(), 2);
    }
}
