//! Engage Kit — contact engagement automation toolkit.
//!
//! Seeds a demo environment (templates, campaigns, a split workflow, an A/B
//! test) and exposes it through inspection commands: calendar projection,
//! simulated delivery passes, and A/B reports.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use engage_abtest::{AbTest, SplitStrategy, Variant};
use engage_calendar::{
    merge_events, navigate, project_events, project_followups, window_for, CalendarEvent,
    CalendarEventKind, Direction, Granularity, TimeWindow,
};
use engage_core::config::AppConfig;
use engage_core::types::{ContactSnapshot, MessageType};
use engage_delivery::{AbTestRecorder, CampaignStore, DeliveryRunner, ExecutionLedger};
use engage_scheduler::{
    AutomationStats, CampaignStatus, FollowUpSequence, ScheduledFollowUp, TemplateLibrary,
};
use engage_workflow::conditions::{Condition, ConditionGroup, ConditionOperator};
use engage_workflow::graph::{
    ActionConfig, DecisionConfig, NodeConfig, SplitTestConfig, WaitConfig, WaitUnit,
    WorkflowEdge, WorkflowNode, BRANCH_A, BRANCH_B, BRANCH_NO, BRANCH_YES,
};
use engage_workflow::{EnrollmentEngine, Workflow};

#[derive(Parser)]
#[command(name = "engage-kit")]
#[command(about = "Contact engagement automation toolkit")]
#[command(version)]
struct Cli {
    /// Path to a config file (overrides defaults)
    #[arg(long, env = "ENGAGE__CONFIG")]
    config: Option<String>,

    /// Reference instant for all time-dependent output (RFC 3339 or
    /// YYYY-MM-DD; defaults to now)
    #[arg(long, value_parser = parse_as_of)]
    as_of: Option<DateTime<Utc>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Project the engagement calendar for one time window
    Calendar {
        /// Window granularity: week, month, year (default from config)
        #[arg(short, long)]
        granularity: Option<String>,
    },

    /// Simulate delivery passes day by day and report what fired
    Run {
        /// How many days to simulate
        #[arg(long, default_value = "7")]
        days: u32,
    },

    /// List the stock sequence templates and their step ladders
    Templates,

    /// Validate and describe the demo workflows
    Workflows,

    /// Show the A/B test report
    Abtest {
        /// Minimum per-variant sample size before a winner is conclusive
        #[arg(long)]
        min_sample: Option<u64>,
    },

    /// Show aggregate automation statistics
    Stats,
}

fn parse_as_of(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(s) {
        return Ok(instant.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| DateTime::<Utc>::from_naive_utc_and_offset(d.and_time(NaiveTime::MIN), Utc))
        .map_err(|_| format!("not a date: '{s}' (expected RFC 3339 or YYYY-MM-DD)"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "engage_kit=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    let as_of = cli.as_of.unwrap_or_else(Utc::now);

    info!(instance_id = %config.instance_id, as_of = %as_of, "Engage Kit starting");

    let demo = seed_demo(&config, as_of)?;

    match cli.command {
        Commands::Calendar { granularity } => cmd_calendar(&demo, &config, as_of, granularity),
        Commands::Run { days } => cmd_run(demo, as_of, days),
        Commands::Templates => cmd_templates(&demo),
        Commands::Workflows => cmd_workflows(&demo),
        Commands::Abtest { min_sample } => cmd_abtest(&demo, &config, min_sample),
        Commands::Stats => cmd_stats(&demo),
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Demo environment
// ---------------------------------------------------------------------------

struct DemoEnv {
    runner: DeliveryRunner,
    engine: EnrollmentEngine,
    recorder: AbTestRecorder,
    library: TemplateLibrary,
    followups: Vec<ScheduledFollowUp>,
    workflow_id: Uuid,
    test_id: Uuid,
}

/// A workflow exercising every node kind: score gate, cool-off wait, and a
/// subject-line split.
fn make_demo_workflow(split_percentage: u8) -> anyhow::Result<Workflow> {
    let mut workflow = Workflow::new("Lead qualification", "Routes leads by score");
    workflow.add_node(WorkflowNode::new("start", "Start", NodeConfig::Start));
    workflow.add_node(WorkflowNode::new(
        "gate",
        "Hot lead?",
        NodeConfig::Decision(DecisionConfig {
            condition: ConditionGroup::all_of(vec![Condition::new(
                "lead_score",
                ConditionOperator::GreaterThan,
                json!(50),
            )]),
        }),
    ));
    workflow.add_node(WorkflowNode::new(
        "split",
        "Subject line split",
        NodeConfig::AbTest(SplitTestConfig {
            split_percentage,
            test_id: None,
        }),
    ));
    workflow.add_node(WorkflowNode::new(
        "subject-a",
        "Subject A",
        NodeConfig::Action(ActionConfig {
            message_type: MessageType::Email,
            template_ref: Some("subject-a".into()),
        }),
    ));
    workflow.add_node(WorkflowNode::new(
        "subject-b",
        "Subject B",
        NodeConfig::Action(ActionConfig {
            message_type: MessageType::Email,
            template_ref: Some("subject-b".into()),
        }),
    ));
    workflow.add_node(WorkflowNode::new(
        "cool-off",
        "Wait three days",
        NodeConfig::Wait(WaitConfig {
            duration: 3,
            unit: WaitUnit::Days,
        }),
    ));
    workflow.add_node(WorkflowNode::new(
        "nudge",
        "Gentle nudge",
        NodeConfig::Action(ActionConfig {
            message_type: MessageType::Email,
            template_ref: Some("nudge".into()),
        }),
    ));
    workflow.add_node(WorkflowNode::new("end", "End", NodeConfig::End));

    workflow.add_edge(WorkflowEdge::new("start", "gate"));
    workflow.add_edge(WorkflowEdge::labeled("gate", "split", BRANCH_YES));
    workflow.add_edge(WorkflowEdge::labeled("gate", "cool-off", BRANCH_NO));
    workflow.add_edge(WorkflowEdge::labeled("split", "subject-a", BRANCH_A));
    workflow.add_edge(WorkflowEdge::labeled("split", "subject-b", BRANCH_B));
    workflow.add_edge(WorkflowEdge::new("subject-a", "end"));
    workflow.add_edge(WorkflowEdge::new("subject-b", "end"));
    workflow.add_edge(WorkflowEdge::new("cool-off", "nudge"));
    workflow.add_edge(WorkflowEdge::new("nudge", "end"));
    workflow
        .activate()
        .map_err(|e| anyhow::anyhow!("demo workflow failed validation: {e}"))?;
    Ok(workflow)
}

fn seed_demo(config: &AppConfig, as_of: DateTime<Utc>) -> anyhow::Result<DemoEnv> {
    let store = CampaignStore::new();
    let runner = DeliveryRunner::new(store, ExecutionLedger::new())
        .with_batch_size(config.delivery.batch_size);
    let strategy = if config.abtest.sticky_assignment {
        SplitStrategy::Sticky
    } else {
        SplitStrategy::Random
    };
    let engine = EnrollmentEngine::new().with_strategy(strategy);
    let recorder = AbTestRecorder::new();
    let library = TemplateLibrary::new();

    library.seed_builtin();

    // Two templated campaigns at different points in their life.
    let onboarding = find_template(&library, "Customer Onboarding")?;
    let nurture = find_template(&library, "Lead Nurture - 7 Day")?;
    let campaign = library.apply(
        &onboarding,
        "Onboard Globex",
        Uuid::new_v4(),
        as_of - Duration::days(2),
    )?;
    runner.store().create(campaign)?;
    let campaign = library.apply(&nurture, "Nurture Initech", Uuid::new_v4(), as_of)?;
    runner.store().create(campaign)?;

    // A follow-up ladder for a contact outside any campaign.
    let followups =
        runner.schedule_sequence_for(Uuid::new_v4(), FollowUpSequence::Standard, 24, as_of);

    // The split workflow with a handful of enrolled demo leads.
    let workflow = make_demo_workflow(config.abtest.default_split_percentage)?;
    let workflow_id = engine.register_workflow(workflow)?;
    for score in [80, 20, 95, 60, 35, 72] {
        let contact = ContactSnapshot::new(Uuid::new_v4())
            .with_attribute("lead_score", json!(score));
        engine.enroll(&workflow_id, &contact, as_of)?;
    }

    // An A/B test with counters already accumulated by delivery.
    let test_id = recorder.register(AbTest::new(
        workflow_id,
        "Subject line test",
        config.abtest.default_split_percentage,
    ));
    for _ in 0..100 {
        recorder.record_enrollment(&test_id, Variant::A)?;
        recorder.record_enrollment(&test_id, Variant::B)?;
    }
    for _ in 0..25 {
        recorder.record_conversion(&test_id, Variant::A)?;
    }
    for _ in 0..30 {
        recorder.record_conversion(&test_id, Variant::B)?;
    }

    Ok(DemoEnv {
        runner,
        engine,
        recorder,
        library,
        followups,
        workflow_id,
        test_id,
    })
}

fn find_template(library: &TemplateLibrary, name: &str) -> anyhow::Result<Uuid> {
    library
        .list()
        .into_iter()
        .find(|t| t.name == name)
        .map(|t| t.id)
        .ok_or_else(|| anyhow::anyhow!("stock template '{name}' missing"))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_calendar(demo: &DemoEnv, config: &AppConfig, as_of: DateTime<Utc>, granularity: Option<String>) {
    let requested = granularity.unwrap_or_else(|| config.calendar.default_granularity.clone());
    let granularity: Granularity = match requested.parse() {
        Ok(g) => g,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let window = window_for(as_of, granularity);
    let campaigns = demo.runner.store().list();
    let events = match project_events(&campaigns, &window) {
        Ok(events) => events,
        Err(e) => {
            eprintln!("Projection failed: {e}");
            std::process::exit(1);
        }
    };
    let merged = merge_events(events, project_followups(&demo.followups, &window));

    println!(
        "=== Calendar: {} -> {} ({}) ===",
        window.start.format("%Y-%m-%d"),
        window.end.format("%Y-%m-%d"),
        window.granularity
    );
    println!();
    if merged.is_empty() {
        println!("  Nothing scheduled in this window.");
    } else {
        println!(
            "  {:<17} {:<16} {:<28} {:<8} Status",
            "Due", "Kind", "Title", "Step"
        );
        println!("  {}", "-".repeat(80));
        for event in &merged {
            println!(
                "  {:<17} {:<16} {:<28} {:<8} {}",
                event.due_at.format("%Y-%m-%d %H:%M"),
                kind_label(event),
                truncate(&event.title, 26),
                event
                    .source_step_order
                    .map(|o| o.to_string())
                    .unwrap_or_else(|| "-".into()),
                if event.executed { "executed" } else { "pending" },
            );
        }
    }
    println!();
    println!("  {} events in window", merged.len());

    let prev = navigate(&window, Direction::Prev);
    let next = navigate(&window, Direction::Next);
    println!();
    println!("  Prev window: {}", window_label(&prev));
    println!("  Next window: {}", window_label(&next));
}

fn cmd_run(demo: DemoEnv, as_of: DateTime<Utc>, days: u32) {
    println!("=== Delivery Simulation: {} days ===", days);
    println!();

    let mut followups = demo.followups;
    for day in 0..=days {
        let instant = as_of + Duration::days(i64::from(day));
        let executed = match demo.runner.process_due_steps(instant) {
            Ok(n) => n,
            Err(e) => {
                eprintln!("Delivery pass failed: {e}");
                std::process::exit(1);
            }
        };
        let (sent, failed) = demo
            .runner
            .process_due_followups(&mut followups, instant, |_| Ok(()));
        let resumed = demo.engine.resume_due(instant);

        println!(
            "  day {:>2} ({})  steps: {:<3} follow-ups: {:<3} resumed: {:<3} failures: {}",
            day,
            instant.format("%Y-%m-%d"),
            executed,
            sent,
            resumed,
            failed,
        );
    }

    println!();
    println!("  Campaigns after the run:");
    for campaign in demo.runner.store().list() {
        println!(
            "    {:<24} {:<10} {}/{} steps executed",
            truncate(&campaign.name, 22),
            campaign.status,
            campaign.executed_count(),
            campaign.steps.len(),
        );
    }
    println!(
        "  Duplicate execution reports absorbed: {}",
        demo.runner.ledger().duplicate_count()
    );
}

fn cmd_templates(demo: &DemoEnv) {
    println!("=== Sequence Templates ===");
    println!();
    for template in demo.library.list() {
        println!(
            "  {} [{:?}]{}",
            template.name,
            template.category,
            if template.is_system_template {
                " (stock)"
            } else {
                ""
            }
        );
        println!("    {}", template.description);
        for step in &template.steps {
            println!(
                "    +{:>2}d {:<8} {}",
                step.delay_days, step.message_type, step.name,
            );
        }
        println!();
    }
}

fn cmd_workflows(demo: &DemoEnv) {
    println!("=== Workflows ===");
    println!();

    if let Some(workflow) = demo.engine.workflow(&demo.workflow_id) {
        println!(
            "  {} ({} nodes, {} edges, {})",
            workflow.name,
            workflow.nodes.len(),
            workflow.edges.len(),
            if workflow.is_active { "active" } else { "draft" },
        );
        match workflow.validate() {
            Ok(()) => println!("    validation: ok"),
            Err(e) => println!("    validation: {e}"),
        }
        for node in &workflow.nodes {
            let targets: Vec<String> = workflow
                .outgoing(&node.id)
                .iter()
                .map(|e| match &e.label {
                    Some(label) => format!("{}:{}", label, e.to),
                    None => e.to.clone(),
                })
                .collect();
            println!(
                "    [{:<8}] {:<20} -> {}",
                node.kind(),
                node.label,
                if targets.is_empty() {
                    "(terminal)".to_string()
                } else {
                    targets.join(", ")
                },
            );
        }
    }

    let stats = demo.engine.stats(&demo.workflow_id);
    println!();
    println!(
        "  Enrollments: {} total, {} active, {} waiting, {} completed, {} errored",
        stats.total, stats.active, stats.waiting, stats.completed, stats.error,
    );

    // A deliberately broken draft, to show what validation reports.
    let mut draft = Workflow::new("Broken draft", "Two entry points");
    draft.add_node(WorkflowNode::new("start-1", "Start", NodeConfig::Start));
    draft.add_node(WorkflowNode::new("start-2", "Start again", NodeConfig::Start));
    draft.add_node(WorkflowNode::new("end", "End", NodeConfig::End));
    draft.add_edge(WorkflowEdge::new("start-1", "end"));
    draft.add_edge(WorkflowEdge::new("start-2", "end"));

    println!();
    println!("  {} (draft)", draft.name);
    match draft.validate() {
        Ok(()) => println!("    validation: ok"),
        Err(e) => println!("    validation: {e}"),
    }
}

fn cmd_abtest(demo: &DemoEnv, config: &AppConfig, min_sample: Option<u64>) {
    let min_sample = min_sample.unwrap_or(config.abtest.min_sample_size);
    let report = match demo.recorder.report(&demo.test_id, min_sample) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Report failed: {e}");
            std::process::exit(1);
        }
    };
    let snapshot = match demo.recorder.snapshot(&demo.test_id) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!("Snapshot failed: {e}");
            std::process::exit(1);
        }
    };

    println!("=== A/B Test: {} ===", snapshot.name);
    println!();
    println!(
        "  {:<10} {:>10} {:>10} {:>8}",
        "Variant", "Enrolled", "Converted", "Rate"
    );
    println!("  {}", "-".repeat(42));
    println!(
        "  {:<10} {:>10} {:>10} {:>7.1}%",
        "A",
        snapshot.variant_a.enrolled,
        snapshot.variant_a.converted,
        report.conversion_rate_a,
    );
    println!(
        "  {:<10} {:>10} {:>10} {:>7.1}%",
        "B",
        snapshot.variant_b.enrolled,
        snapshot.variant_b.converted,
        report.conversion_rate_b,
    );
    println!();
    println!("  Winner: {}", report.winner);
    if min_sample > 0 {
        println!(
            "  Conclusive: {} (min {} per variant, smallest arm has {})",
            if report.is_conclusive { "yes" } else { "no" },
            min_sample,
            snapshot
                .variant_a
                .enrolled
                .min(snapshot.variant_b.enrolled),
        );
    } else {
        println!("  Point estimate only, no minimum sample gate applied.");
    }
}

fn cmd_stats(demo: &DemoEnv) {
    let campaigns = demo.runner.store().list();
    let stats = AutomationStats::collect(&campaigns, &demo.followups);

    println!("=== Automation Stats ===");
    println!();
    println!("  Campaigns");
    println!("    Total:      {}", stats.total_campaigns);
    println!("    Active:     {}", stats.active_campaigns);
    println!("    Paused:     {}", stats.paused_campaigns);
    println!("    Completed:  {}", stats.completed_campaigns);
    println!("    Canceled:   {}", stats.canceled_campaigns);
    println!();
    println!("  Steps");
    println!("    Total:      {}", stats.total_steps);
    println!("    Executed:   {}", stats.executed_steps);
    println!();
    println!("  Follow-ups");
    println!("    Pending:    {}", stats.pending_followups);

    let active = demo
        .runner
        .store()
        .list_by_status(CampaignStatus::Active)
        .len();
    println!();
    println!("  {} campaigns currently eligible for delivery passes", active);
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

fn kind_label(event: &CalendarEvent) -> &'static str {
    match event.kind {
        CalendarEventKind::AutomationStep => "campaign step",
        CalendarEventKind::FollowUp => "follow-up",
    }
}

fn window_label(window: &TimeWindow) -> String {
    format!(
        "{} -> {}",
        window.start.format("%Y-%m-%d"),
        window.end.format("%Y-%m-%d")
    )
}

fn truncate(s: &str, max: usize) -> String {
    if max < 3 {
        return s.chars().take(max).collect();
    }
    let char_count = s.chars().count();
    if char_count > max {
        let truncated: String = s.chars().take(max - 2).collect();
        format!("{truncated}..")
    } else {
        s.to_string()
    }
}
