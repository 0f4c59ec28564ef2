//! Enrollment engine — walks contacts through active workflow graphs.
//!
//! One live enrollment per `(workflow, contact)` pair; re-enrolling while an
//! enrollment is active or waiting returns the existing one, matching how
//! the CRM's enroll endpoint behaves. Time always comes in through the
//! caller's `as_of` instant.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use engage_abtest::SplitStrategy;
use engage_core::event_bus::{make_event, EventSink};
use engage_core::types::{ContactSnapshot, EngagementEventType};

use crate::graph::Workflow;
use crate::router::{route_from, RouteContext, RouteOutcome};

/// Upper bound on nodes visited in one walk. Graphs may legitimately cycle
/// back through waits; a cycle with no wait in it would otherwise spin.
const MAX_HOPS_PER_WALK: usize = 64;

/// Runtime status of an enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Waiting,
    Completed,
    Exited,
    Error,
}

/// A contact's live position inside a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub contact_id: Uuid,
    pub current_node_id: String,
    pub status: EnrollmentStatus,
    /// Snapshot captured at enrollment time; decisions evaluate against it.
    pub contact: ContactSnapshot,
    pub entered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resume_at: Option<DateTime<Utc>>,
    /// Node ids visited so far, in order.
    pub path: Vec<String>,
}

/// Aggregate enrollment counts for one workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentStats {
    pub workflow_id: Uuid,
    pub total: u64,
    pub active: u64,
    pub waiting: u64,
    pub completed: u64,
    pub exited: u64,
    pub error: u64,
}

/// Engine holding workflow definitions and the enrollments moving through
/// them.
#[derive(Clone)]
pub struct EnrollmentEngine {
    workflows: Arc<DashMap<Uuid, Workflow>>,
    enrollments: Arc<DashMap<Uuid, Enrollment>>,
    event_sink: Arc<dyn EventSink>,
    strategy: SplitStrategy,
}

impl std::fmt::Debug for EnrollmentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrollmentEngine")
            .field("workflows", &self.workflows.len())
            .field("enrollments", &self.enrollments.len())
            .finish()
    }
}

impl EnrollmentEngine {
    pub fn new() -> Self {
        Self {
            workflows: Arc::new(DashMap::new()),
            enrollments: Arc::new(DashMap::new()),
            event_sink: engage_core::event_bus::noop_sink(),
            strategy: SplitStrategy::default(),
        }
    }

    /// Attach an event sink for emitting engagement events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Choose how split-test nodes assign variants.
    pub fn with_strategy(mut self, strategy: SplitStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Store a workflow definition. Active workflows must pass validation;
    /// drafts are stored as-is and refuse enrollment until activated.
    pub fn register_workflow(&self, workflow: Workflow) -> Result<Uuid> {
        if workflow.is_active {
            workflow
                .validate()
                .map_err(|e| anyhow!("workflow {} is not valid: {}", workflow.id, e))?;
        }
        let id = workflow.id;
        info!(workflow_id = %id, name = %workflow.name, "Registering workflow");
        self.workflows.insert(id, workflow);
        Ok(id)
    }

    /// Returns a clone of the workflow with the given id, if it exists.
    pub fn workflow(&self, id: &Uuid) -> Option<Workflow> {
        self.workflows.get(id).map(|r| r.clone())
    }

    pub fn enrollment(&self, id: &Uuid) -> Option<Enrollment> {
        self.enrollments.get(id).map(|r| r.clone())
    }

    /// Enroll a contact and advance it until the walk parks on a wait node
    /// or finishes. Returns the existing enrollment id if the contact is
    /// already live in this workflow.
    pub fn enroll(
        &self,
        workflow_id: &Uuid,
        contact: &ContactSnapshot,
        as_of: DateTime<Utc>,
    ) -> Result<Uuid> {
        let workflow = self
            .workflows
            .get(workflow_id)
            .ok_or_else(|| anyhow!("workflow {} not found", workflow_id))?;

        if !workflow.is_active {
            return Err(anyhow!("workflow {} is not active", workflow_id));
        }

        if let Some(existing) = self.live_enrollment(workflow_id, &contact.contact_id) {
            info!(
                enrollment_id = %existing,
                workflow_id = %workflow_id,
                contact_id = %contact.contact_id,
                "Contact already enrolled"
            );
            return Ok(existing);
        }

        let start = workflow
            .start_node()
            .ok_or_else(|| anyhow!("workflow {} has no start node", workflow_id))?;

        let enrollment_id = Uuid::new_v4();
        let mut enrollment = Enrollment {
            id: enrollment_id,
            workflow_id: *workflow_id,
            contact_id: contact.contact_id,
            current_node_id: start.id.clone(),
            status: EnrollmentStatus::Active,
            contact: contact.clone(),
            entered_at: as_of,
            updated_at: as_of,
            resume_at: None,
            path: vec![start.id.clone()],
        };

        info!(
            enrollment_id = %enrollment_id,
            workflow_id = %workflow_id,
            contact_id = %contact.contact_id,
            "Contact entered workflow"
        );
        let mut event = make_event(
            EngagementEventType::EnrollmentStarted,
            None,
            Some(contact.contact_id),
        );
        event.workflow_id = Some(*workflow_id);
        self.event_sink.emit(event);

        self.walk(&workflow, &mut enrollment, as_of);
        self.enrollments.insert(enrollment_id, enrollment);
        Ok(enrollment_id)
    }

    /// Manually exits a live enrollment, freeing the contact for re-entry.
    pub fn exit(&self, enrollment_id: &Uuid, as_of: DateTime<Utc>) -> Result<()> {
        let mut enrollment = self
            .enrollments
            .get_mut(enrollment_id)
            .ok_or_else(|| anyhow!("enrollment {} not found", enrollment_id))?;
        if !matches!(
            enrollment.status,
            EnrollmentStatus::Active | EnrollmentStatus::Waiting
        ) {
            return Err(anyhow!("enrollment {} is not live", enrollment_id));
        }
        enrollment.status = EnrollmentStatus::Exited;
        enrollment.resume_at = None;
        enrollment.updated_at = as_of;
        info!(
            enrollment_id = %enrollment_id,
            contact_id = %enrollment.contact_id,
            "Contact exited workflow"
        );
        Ok(())
    }

    /// Wake every waiting enrollment whose `resume_at` has passed and keep
    /// walking it. Returns how many enrollments were resumed.
    pub fn resume_due(&self, as_of: DateTime<Utc>) -> usize {
        let due: Vec<Uuid> = self
            .enrollments
            .iter()
            .filter(|r| {
                r.status == EnrollmentStatus::Waiting
                    && r.resume_at.map(|at| at <= as_of).unwrap_or(false)
            })
            .map(|r| r.id)
            .collect();

        let mut resumed = 0;
        for id in due {
            let workflow = {
                let Some(enrollment) = self.enrollments.get(&id) else {
                    continue;
                };
                self.workflows
                    .get(&enrollment.workflow_id)
                    .map(|w| w.clone())
            };
            let Some(workflow) = workflow else { continue };
            if let Some(mut enrollment) = self.enrollments.get_mut(&id) {
                enrollment.status = EnrollmentStatus::Active;
                enrollment.resume_at = None;
                self.walk(&workflow, &mut enrollment, as_of);
                resumed += 1;
            }
        }
        resumed
    }

    /// Computes aggregate statistics for the given workflow's enrollments.
    pub fn stats(&self, workflow_id: &Uuid) -> EnrollmentStats {
        let mut stats = EnrollmentStats {
            workflow_id: *workflow_id,
            total: 0,
            active: 0,
            waiting: 0,
            completed: 0,
            exited: 0,
            error: 0,
        };
        for entry in self.enrollments.iter() {
            if entry.workflow_id != *workflow_id {
                continue;
            }
            stats.total += 1;
            match entry.status {
                EnrollmentStatus::Active => stats.active += 1,
                EnrollmentStatus::Waiting => stats.waiting += 1,
                EnrollmentStatus::Completed => stats.completed += 1,
                EnrollmentStatus::Exited => stats.exited += 1,
                EnrollmentStatus::Error => stats.error += 1,
            }
        }
        stats
    }

    fn live_enrollment(&self, workflow_id: &Uuid, contact_id: &Uuid) -> Option<Uuid> {
        self.enrollments
            .iter()
            .find(|r| {
                r.workflow_id == *workflow_id
                    && r.contact_id == *contact_id
                    && matches!(
                        r.status,
                        EnrollmentStatus::Active | EnrollmentStatus::Waiting
                    )
            })
            .map(|r| r.id)
    }

    /// Advance an enrollment node by node until it parks or finishes.
    fn walk(&self, workflow: &Workflow, enrollment: &mut Enrollment, as_of: DateTime<Utc>) {
        let ctx = RouteContext::new(enrollment.contact.clone(), as_of)
            .with_strategy(self.strategy);

        for _ in 0..MAX_HOPS_PER_WALK {
            let outcome = match route_from(workflow, &enrollment.current_node_id, &ctx) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        enrollment_id = %enrollment.id,
                        node_id = %enrollment.current_node_id,
                        error = %e,
                        "Routing failed, marking enrollment errored"
                    );
                    enrollment.status = EnrollmentStatus::Error;
                    enrollment.updated_at = as_of;
                    return;
                }
            };

            match outcome {
                RouteOutcome::Advance { next } => {
                    self.move_to(enrollment, next, as_of);
                }
                RouteOutcome::Act {
                    message_type, next, ..
                } => {
                    let mut event = make_event(
                        EngagementEventType::EnrollmentAdvanced,
                        None,
                        Some(enrollment.contact_id),
                    );
                    event.workflow_id = Some(enrollment.workflow_id);
                    event.detail = Some(format!("action:{message_type}"));
                    self.event_sink.emit(event);
                    self.move_to(enrollment, next, as_of);
                }
                RouteOutcome::Branch { next, .. } => {
                    self.move_to(enrollment, next, as_of);
                }
                RouteOutcome::Split { variant, next, .. } => {
                    let mut event = make_event(
                        EngagementEventType::VariantEnrolled,
                        None,
                        Some(enrollment.contact_id),
                    );
                    event.workflow_id = Some(enrollment.workflow_id);
                    event.detail = Some(format!("variant:{variant}"));
                    self.event_sink.emit(event);
                    self.move_to(enrollment, next, as_of);
                }
                RouteOutcome::Hold { resume_at, next } => {
                    enrollment.status = EnrollmentStatus::Waiting;
                    enrollment.resume_at = Some(resume_at);
                    self.move_to(enrollment, next, as_of);
                    return;
                }
                RouteOutcome::Finish => {
                    enrollment.status = EnrollmentStatus::Completed;
                    enrollment.updated_at = as_of;
                    let mut event = make_event(
                        EngagementEventType::EnrollmentCompleted,
                        None,
                        Some(enrollment.contact_id),
                    );
                    event.workflow_id = Some(enrollment.workflow_id);
                    self.event_sink.emit(event);
                    return;
                }
            }
        }

        warn!(
            enrollment_id = %enrollment.id,
            "Walk exceeded {MAX_HOPS_PER_WALK} hops, marking enrollment errored"
        );
        enrollment.status = EnrollmentStatus::Error;
        enrollment.updated_at = as_of;
    }

    fn move_to(&self, enrollment: &mut Enrollment, next: String, as_of: DateTime<Utc>) {
        enrollment.path.push(next.clone());
        enrollment.current_node_id = next;
        enrollment.updated_at = as_of;
    }
}

impl Default for EnrollmentEngine {
    fn default() -> Self {
        Self::new()
    }
}
