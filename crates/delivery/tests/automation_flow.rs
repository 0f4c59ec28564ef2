//! End-to-end pass over the engagement pipeline: author a workflow, enroll
//! contacts, run a templated campaign to completion, project the calendar,
//! and read out the A/B winner.

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use uuid::Uuid;

    use engage_abtest::{AbTest, Variant, Winner};
    use engage_calendar::{
        merge_events, project_events, project_followups, window_for, CalendarEventKind,
        Granularity,
    };
    use engage_core::event_bus::capture_sink;
    use engage_core::types::{ContactSnapshot, EngagementEventType};
    use engage_delivery::{AbTestRecorder, CampaignStore, DeliveryRunner, ExecutionLedger};
    use engage_scheduler::{FollowUpSequence, TemplateLibrary};
    use engage_workflow::graph::{
        ActionConfig, NodeConfig, SplitTestConfig, WorkflowEdge, WorkflowNode, BRANCH_A,
        BRANCH_B,
    };
    use engage_workflow::{EnrollmentEngine, Workflow};

    fn march_first() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn make_runner(sink: std::sync::Arc<engage_core::event_bus::CaptureSink>) -> DeliveryRunner {
        let store = CampaignStore::new().with_event_sink(sink.clone());
        DeliveryRunner::new(store, ExecutionLedger::new()).with_event_sink(sink)
    }

    /// A two-armed split workflow: start -> ab_test -> (A|B action) -> end.
    fn make_split_workflow() -> Workflow {
        let mut workflow = Workflow::new("Subject line split", "Tests two subject lines");
        workflow.add_node(WorkflowNode::new("start", "Start", NodeConfig::Start));
        workflow.add_node(WorkflowNode::new(
            "split",
            "50/50 split",
            NodeConfig::AbTest(SplitTestConfig {
                split_percentage: 50,
                test_id: None,
            }),
        ));
        workflow.add_node(WorkflowNode::new(
            "variant-a",
            "Subject A",
            NodeConfig::Action(ActionConfig {
                message_type: engage_core::types::MessageType::Email,
                template_ref: Some("subject-a".into()),
            }),
        ));
        workflow.add_node(WorkflowNode::new(
            "variant-b",
            "Subject B",
            NodeConfig::Action(ActionConfig {
                message_type: engage_core::types::MessageType::Email,
                template_ref: Some("subject-b".into()),
            }),
        ));
        workflow.add_node(WorkflowNode::new("end", "End", NodeConfig::End));
        workflow.add_edge(WorkflowEdge::new("start", "split"));
        workflow.add_edge(WorkflowEdge::labeled("split", "variant-a", BRANCH_A));
        workflow.add_edge(WorkflowEdge::labeled("split", "variant-b", BRANCH_B));
        workflow.add_edge(WorkflowEdge::new("variant-a", "end"));
        workflow.add_edge(WorkflowEdge::new("variant-b", "end"));
        workflow.activate().expect("split workflow should validate");
        workflow
    }

    #[test]
    fn templated_campaign_runs_to_completion() {
        let sink = capture_sink();
        let runner = make_runner(sink.clone());

        let library = TemplateLibrary::new();
        library.seed_builtin();
        let template = library
            .list()
            .into_iter()
            .find(|t| t.name == "Customer Onboarding")
            .expect("stock template present");

        let contact = Uuid::new_v4();
        let campaign = library
            .apply(&template.id, "Onboard Initech", contact, march_first())
            .unwrap();
        let campaign_id = runner.store().create(campaign).unwrap();

        // Onboarding steps land on day 0, 1, and 3.
        assert_eq!(runner.process_due_steps(march_first()).unwrap(), 1);
        assert_eq!(
            runner
                .process_due_steps(march_first() + Duration::days(1))
                .unwrap(),
            1
        );
        assert_eq!(
            runner
                .process_due_steps(march_first() + Duration::days(3))
                .unwrap(),
            1
        );

        let finished = runner.store().get(&campaign_id).unwrap();
        assert_eq!(
            finished.status,
            engage_scheduler::CampaignStatus::Completed
        );
        assert_eq!(sink.count_type(EngagementEventType::CampaignCreated), 1);
        assert_eq!(sink.count_type(EngagementEventType::StepExecuted), 3);
        assert_eq!(sink.count_type(EngagementEventType::CampaignCompleted), 1);

        // Every executed step shows as such on the March calendar.
        let window = window_for(march_first(), Granularity::Month);
        let events = project_events(&[finished], &window).unwrap();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.executed));
    }

    #[test]
    fn split_workflow_enrolls_every_contact() {
        let sink = capture_sink();
        let engine = EnrollmentEngine::new().with_event_sink(sink.clone());
        let workflow_id = engine.register_workflow(make_split_workflow()).unwrap();

        for _ in 0..40 {
            let contact = ContactSnapshot::new(Uuid::new_v4());
            engine.enroll(&workflow_id, &contact, march_first()).unwrap();
        }

        let stats = engine.stats(&workflow_id);
        assert_eq!(stats.total, 40);
        assert_eq!(stats.completed, 40);
        assert_eq!(sink.count_type(EngagementEventType::VariantEnrolled), 40);
    }

    #[test]
    fn recorded_counters_produce_a_winner() {
        let recorder = AbTestRecorder::new();
        let test_id = recorder.register(AbTest::new(Uuid::new_v4(), "CTA wording", 50));

        for _ in 0..100 {
            recorder.record_enrollment(&test_id, Variant::A).unwrap();
            recorder.record_enrollment(&test_id, Variant::B).unwrap();
        }
        for _ in 0..25 {
            recorder.record_conversion(&test_id, Variant::A).unwrap();
        }
        for _ in 0..30 {
            recorder.record_conversion(&test_id, Variant::B).unwrap();
        }

        let report = recorder.report(&test_id, 50).unwrap();
        assert_eq!(report.winner, Winner::B);
        assert!(report.is_conclusive);
        assert_eq!(report.conversion_rate_a, 25.0);
        assert_eq!(report.conversion_rate_b, 30.0);
    }

    #[test]
    fn calendar_merges_steps_and_followups_in_order() {
        let sink = capture_sink();
        let runner = make_runner(sink);

        let contact = Uuid::new_v4();
        let campaign = engage_scheduler::AutomationCampaign::new(
            "Kickoff push",
            contact,
            march_first(),
        )
        .with_steps(vec![engage_scheduler::CampaignStep::new(
            0,
            "Kickoff",
            engage_core::types::MessageType::Email,
        )
        .with_delay(4, 0)]);
        let campaign_id = runner.store().create(campaign).unwrap();

        let followups =
            runner.schedule_sequence_for(contact, FollowUpSequence::Standard, 0, march_first());

        let window = window_for(march_first(), Granularity::Month);
        let campaigns = vec![runner.store().get(&campaign_id).unwrap()];
        let merged = merge_events(
            project_events(&campaigns, &window).unwrap(),
            project_followups(&followups, &window),
        );

        // Follow-ups at Mar 2/4/8/15 interleave with the step on Mar 5.
        assert_eq!(merged.len(), 5);
        let kinds: Vec<CalendarEventKind> = merged.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                CalendarEventKind::FollowUp,
                CalendarEventKind::FollowUp,
                CalendarEventKind::AutomationStep,
                CalendarEventKind::FollowUp,
                CalendarEventKind::FollowUp,
            ]
        );
        assert!(merged.windows(2).all(|w| w[0].due_at <= w[1].due_at));
    }
}
