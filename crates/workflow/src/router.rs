//! Single-node routing — resolves where an enrollment goes next.
//!
//! `route_from` is pure over the graph and a caller-supplied context (contact
//! snapshot, as-of instant, split strategy); it never touches the system
//! clock and performs no I/O.

use crate::conditions::ConditionError;
use crate::graph::{NodeConfig, Workflow, BRANCH_A, BRANCH_B, BRANCH_NO, BRANCH_YES};
use chrono::{DateTime, Utc};
use engage_abtest::{assign_variant, SplitStrategy, Variant};
use engage_core::types::{ContactSnapshot, MessageType};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("node \"{0}\" not found in workflow")]
    UnknownNode(String),

    #[error("node \"{0}\" has no outgoing edge to follow")]
    NoOutgoingEdge(String),

    #[error("node \"{node_id}\" has no branch labeled \"{label}\"")]
    MissingBranch { node_id: String, label: String },
}

/// Everything route resolution needs besides the graph itself.
#[derive(Debug, Clone)]
pub struct RouteContext {
    pub contact: ContactSnapshot,
    pub as_of: DateTime<Utc>,
    pub strategy: SplitStrategy,
}

impl RouteContext {
    pub fn new(contact: ContactSnapshot, as_of: DateTime<Utc>) -> Self {
        Self {
            contact,
            as_of,
            strategy: SplitStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: SplitStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Where one routing step landed.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Move straight on (start nodes).
    Advance { next: String },
    /// Surface the action to the delivery side, then move on.
    Act {
        message_type: MessageType,
        template_ref: Option<String>,
        next: String,
    },
    /// Park the enrollment until `resume_at`, then continue at `next`.
    Hold {
        resume_at: DateTime<Utc>,
        next: String,
    },
    /// A decision predicate picked a branch.
    Branch { took_yes: bool, next: String },
    /// A split test assigned a variant.
    Split {
        variant: Variant,
        test_id: Option<Uuid>,
        next: String,
    },
    /// An end node finished the enrollment.
    Finish,
}

/// Resolve one node of `workflow` for the contact in `ctx`.
///
/// A decision predicate that cannot be evaluated (missing contact attribute)
/// takes the `no` branch; the failure is logged, not fatal, so a thin
/// snapshot cannot strand an enrollment mid-graph.
pub fn route_from(
    workflow: &Workflow,
    node_id: &str,
    ctx: &RouteContext,
) -> Result<RouteOutcome, RouteError> {
    let node = workflow
        .node(node_id)
        .ok_or_else(|| RouteError::UnknownNode(node_id.to_string()))?;

    match &node.config {
        NodeConfig::Start => Ok(RouteOutcome::Advance {
            next: sole_target(workflow, node_id)?,
        }),
        NodeConfig::Action(cfg) => Ok(RouteOutcome::Act {
            message_type: cfg.message_type,
            template_ref: cfg.template_ref.clone(),
            next: sole_target(workflow, node_id)?,
        }),
        NodeConfig::Wait(cfg) => Ok(RouteOutcome::Hold {
            resume_at: ctx.as_of + cfg.as_duration(),
            next: sole_target(workflow, node_id)?,
        }),
        NodeConfig::Decision(cfg) => {
            let took_yes = match cfg.condition.evaluate(&ctx.contact) {
                Ok(result) => result,
                Err(ConditionError::MissingAttribute(field)) => {
                    warn!(
                        node_id = node_id,
                        field = %field,
                        "decision predicate unevaluable, taking the no branch"
                    );
                    false
                }
            };
            let label = if took_yes { BRANCH_YES } else { BRANCH_NO };
            Ok(RouteOutcome::Branch {
                took_yes,
                next: labeled_target(workflow, node_id, label)?,
            })
        }
        NodeConfig::AbTest(cfg) => {
            let scope = cfg
                .test_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| node.id.clone());
            let variant = assign_variant(
                cfg.split_percentage,
                &ctx.contact.contact_id,
                &scope,
                ctx.strategy,
            );
            let label = match variant {
                Variant::A => BRANCH_A,
                Variant::B => BRANCH_B,
            };
            Ok(RouteOutcome::Split {
                variant,
                test_id: cfg.test_id,
                next: labeled_target(workflow, node_id, label)?,
            })
        }
        NodeConfig::End => Ok(RouteOutcome::Finish),
    }
}

fn sole_target(workflow: &Workflow, node_id: &str) -> Result<String, RouteError> {
    workflow
        .outgoing(node_id)
        .first()
        .map(|e| e.to.clone())
        .ok_or_else(|| RouteError::NoOutgoingEdge(node_id.to_string()))
}

fn labeled_target(workflow: &Workflow, node_id: &str, label: &str) -> Result<String, RouteError> {
    workflow
        .outgoing(node_id)
        .iter()
        .find(|e| e.label.as_deref() == Some(label))
        .map(|e| e.to.clone())
        .ok_or_else(|| RouteError::MissingBranch {
            node_id: node_id.to_string(),
            label: label.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{Condition, ConditionGroup, ConditionOperator};
    use crate::graph::{
        ActionConfig, DecisionConfig, SplitTestConfig, WaitConfig, WaitUnit, WorkflowEdge,
        WorkflowNode,
    };
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap()
    }

    fn make_contact(score: i64) -> ContactSnapshot {
        ContactSnapshot::new(Uuid::new_v4()).with_attribute("lead_score", json!(score))
    }

    fn make_decision_workflow() -> Workflow {
        let mut workflow = Workflow::new("Score gate", "");
        workflow.add_node(WorkflowNode::new("start", "Start", NodeConfig::Start));
        workflow.add_node(WorkflowNode::new(
            "gate",
            "Hot lead?",
            NodeConfig::Decision(DecisionConfig {
                condition: ConditionGroup::all_of(vec![Condition::new(
                    "lead_score",
                    ConditionOperator::GreaterThanOrEqual,
                    json!(50),
                )]),
            }),
        ));
        workflow.add_node(WorkflowNode::new(
            "call",
            "Book a call",
            NodeConfig::Action(ActionConfig {
                message_type: MessageType::Task,
                template_ref: None,
            }),
        ));
        workflow.add_node(WorkflowNode::new(
            "cool-off",
            "Cool off",
            NodeConfig::Wait(WaitConfig {
                duration: 3,
                unit: WaitUnit::Days,
            }),
        ));
        workflow.add_node(WorkflowNode::new(
            "nudge",
            "Nudge email",
            NodeConfig::Action(ActionConfig {
                message_type: MessageType::Email,
                template_ref: Some("nudge".into()),
            }),
        ));
        workflow.add_node(WorkflowNode::new("end", "End", NodeConfig::End));
        workflow.add_edge(WorkflowEdge::new("start", "gate"));
        workflow.add_edge(WorkflowEdge::labeled("gate", "call", BRANCH_YES));
        workflow.add_edge(WorkflowEdge::labeled("gate", "cool-off", BRANCH_NO));
        workflow.add_edge(WorkflowEdge::new("call", "end"));
        workflow.add_edge(WorkflowEdge::new("cool-off", "nudge"));
        workflow.add_edge(WorkflowEdge::new("nudge", "end"));
        workflow
    }

    #[test]
    fn test_start_advances() {
        let workflow = make_decision_workflow();
        let ctx = RouteContext::new(make_contact(80), as_of());
        let outcome = route_from(&workflow, "start", &ctx).unwrap();
        assert_eq!(outcome, RouteOutcome::Advance { next: "gate".into() });
    }

    #[test]
    fn test_decision_takes_yes_branch() {
        let workflow = make_decision_workflow();
        let ctx = RouteContext::new(make_contact(80), as_of());
        let outcome = route_from(&workflow, "gate", &ctx).unwrap();
        assert_eq!(
            outcome,
            RouteOutcome::Branch {
                took_yes: true,
                next: "call".into(),
            }
        );
    }

    #[test]
    fn test_decision_takes_no_branch() {
        let workflow = make_decision_workflow();
        let ctx = RouteContext::new(make_contact(10), as_of());
        let outcome = route_from(&workflow, "gate", &ctx).unwrap();
        assert_eq!(
            outcome,
            RouteOutcome::Branch {
                took_yes: false,
                next: "cool-off".into(),
            }
        );
    }

    #[test]
    fn test_unevaluable_decision_defaults_to_no() {
        let workflow = make_decision_workflow();
        let bare = ContactSnapshot::new(Uuid::new_v4());
        let ctx = RouteContext::new(bare, as_of());
        let outcome = route_from(&workflow, "gate", &ctx).unwrap();
        assert_eq!(
            outcome,
            RouteOutcome::Branch {
                took_yes: false,
                next: "cool-off".into(),
            }
        );
    }

    #[test]
    fn test_wait_holds_until_resume() {
        let workflow = make_decision_workflow();
        let ctx = RouteContext::new(make_contact(10), as_of());
        let outcome = route_from(&workflow, "cool-off", &ctx).unwrap();
        assert_eq!(
            outcome,
            RouteOutcome::Hold {
                resume_at: as_of() + Duration::days(3),
                next: "nudge".into(),
            }
        );
    }

    #[test]
    fn test_action_surfaces_config() {
        let workflow = make_decision_workflow();
        let ctx = RouteContext::new(make_contact(10), as_of());
        let outcome = route_from(&workflow, "nudge", &ctx).unwrap();
        assert_eq!(
            outcome,
            RouteOutcome::Act {
                message_type: MessageType::Email,
                template_ref: Some("nudge".into()),
                next: "end".into(),
            }
        );
    }

    #[test]
    fn test_end_finishes() {
        let workflow = make_decision_workflow();
        let ctx = RouteContext::new(make_contact(10), as_of());
        assert_eq!(
            route_from(&workflow, "end", &ctx).unwrap(),
            RouteOutcome::Finish
        );
    }

    #[test]
    fn test_split_follows_assigned_label() {
        let mut workflow = Workflow::new("Split", "");
        workflow.add_node(WorkflowNode::new(
            "split",
            "Split",
            NodeConfig::AbTest(SplitTestConfig {
                split_percentage: 100,
                test_id: None,
            }),
        ));
        workflow.add_node(WorkflowNode::new("a", "A", NodeConfig::End));
        workflow.add_node(WorkflowNode::new("b", "B", NodeConfig::End));
        workflow.add_edge(WorkflowEdge::labeled("split", "a", BRANCH_A));
        workflow.add_edge(WorkflowEdge::labeled("split", "b", BRANCH_B));

        let ctx = RouteContext::new(make_contact(0), as_of());
        let outcome = route_from(&workflow, "split", &ctx).unwrap();
        assert_eq!(
            outcome,
            RouteOutcome::Split {
                variant: Variant::A,
                test_id: None,
                next: "a".into(),
            }
        );
    }

    #[test]
    fn test_unknown_node_errors() {
        let workflow = make_decision_workflow();
        let ctx = RouteContext::new(make_contact(10), as_of());
        assert_eq!(
            route_from(&workflow, "ghost", &ctx),
            Err(RouteError::UnknownNode("ghost".into()))
        );
    }

    #[test]
    fn test_missing_branch_errors() {
        let mut workflow = make_decision_workflow();
        workflow.edges.retain(|e| e.label.as_deref() != Some(BRANCH_NO));
        let ctx = RouteContext::new(make_contact(10), as_of());
        assert_eq!(
            route_from(&workflow, "gate", &ctx),
            Err(RouteError::MissingBranch {
                node_id: "gate".into(),
                label: BRANCH_NO.into(),
            })
        );
    }
}
