//! Workflow graph model — typed nodes, directed edges, structural validation.
//!
//! Graphs are arena-style: flat node and edge lists referenced by opaque
//! string ids, so validation and traversal are plain passes over the
//! collections. Drafts may be structurally broken; activation runs the full
//! validation and is the only way `is_active` becomes true.

use crate::conditions::ConditionGroup;
use chrono::{DateTime, Duration, Utc};
use engage_core::types::MessageType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use thiserror::Error;
use uuid::Uuid;

// ─── Nodes ──────────────────────────────────────────────────────────────────

/// Kind discriminator for a node, derived from its config variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    Action,
    Decision,
    Wait,
    AbTest,
    End,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeKind::Start => "start",
            NodeKind::Action => "action",
            NodeKind::Decision => "decision",
            NodeKind::Wait => "wait",
            NodeKind::AbTest => "ab_test",
            NodeKind::End => "end",
        };
        write!(f, "{s}")
    }
}

/// Kind-specific node parameters. Serialized adjacently so a node reads as
/// `{"kind": "wait", "config": {...}}`; `start` and `end` carry no config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "config")]
pub enum NodeConfig {
    Start,
    Action(ActionConfig),
    Decision(DecisionConfig),
    Wait(WaitConfig),
    AbTest(SplitTestConfig),
    End,
}

impl NodeConfig {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeConfig::Start => NodeKind::Start,
            NodeConfig::Action(_) => NodeKind::Action,
            NodeConfig::Decision(_) => NodeKind::Decision,
            NodeConfig::Wait(_) => NodeKind::Wait,
            NodeConfig::AbTest(_) => NodeKind::AbTest,
            NodeConfig::End => NodeKind::End,
        }
    }
}

/// What an action node sends and which message template it renders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    pub message_type: MessageType,
    pub template_ref: Option<String>,
}

/// Predicate a decision node evaluates against the contact snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    pub condition: ConditionGroup,
}

/// How long a wait node parks an enrollment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitConfig {
    pub duration: u32,
    pub unit: WaitUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitUnit {
    Minutes,
    Hours,
    Days,
}

impl WaitConfig {
    pub fn as_duration(&self) -> Duration {
        match self.unit {
            WaitUnit::Minutes => Duration::minutes(self.duration as i64),
            WaitUnit::Hours => Duration::hours(self.duration as i64),
            WaitUnit::Days => Duration::days(self.duration as i64),
        }
    }
}

/// Split ratio for an `ab_test` node; `test_id` links the counter record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitTestConfig {
    /// Share of traffic routed to variant A, in percent.
    pub split_percentage: u8,
    pub test_id: Option<Uuid>,
}

/// Canvas coordinates. Irrelevant to execution semantics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// One unit of campaign logic inside a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    pub label: String,
    #[serde(flatten)]
    pub config: NodeConfig,
    #[serde(default)]
    pub position: Position,
}

impl WorkflowNode {
    pub fn new(id: impl Into<String>, label: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            config,
            position: Position::default(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.config.kind()
    }
}

// ─── Edges ──────────────────────────────────────────────────────────────────

/// Branch labels the validator and router recognize. Decision branches use
/// `yes`/`no`, split branches use `A`/`B`; matching is exact.
pub const BRANCH_YES: &str = "yes";
pub const BRANCH_NO: &str = "no";
pub const BRANCH_A: &str = "A";
pub const BRANCH_B: &str = "B";

/// Directed connection between two nodes, optionally labeled for branches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl WorkflowEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            label: None,
        }
    }

    pub fn labeled(
        from: impl Into<String>,
        to: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            label: Some(label.into()),
        }
    }
}

// ─── Validation ─────────────────────────────────────────────────────────────

/// Structural defects that make a workflow unfit for activation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("workflow has no start node")]
    NoStartNode,

    #[error("workflow has {0} start nodes, expected exactly one")]
    MultipleStartNodes(usize),

    #[error("edge \"{from}\" -> \"{to}\" references missing node \"{missing}\"")]
    DanglingEdge {
        from: String,
        to: String,
        missing: String,
    },

    #[error("node \"{0}\" is not reachable from the start node")]
    UnreachableNode(String),

    #[error("node \"{node_id}\" has {found} well-formed branches, expected {expected}")]
    InvalidBranchCount {
        node_id: String,
        expected: usize,
        found: usize,
    },
}

// ─── Workflow ───────────────────────────────────────────────────────────────

/// Authored graph of engagement logic. `is_active` is only ever set through
/// [`Workflow::activate`]; any structural edit drops it back to draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            is_active: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn start_node(&self) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.kind() == NodeKind::Start)
    }

    /// Outgoing edges of a node in author order.
    pub fn outgoing(&self, node_id: &str) -> Vec<&WorkflowEdge> {
        self.edges.iter().filter(|e| e.from == node_id).collect()
    }

    /// Add a node, dropping the workflow back to draft until re-activated.
    pub fn add_node(&mut self, node: WorkflowNode) {
        self.nodes.push(node);
        self.is_active = false;
        self.updated_at = Utc::now();
    }

    /// Add an edge, dropping the workflow back to draft until re-activated.
    pub fn add_edge(&mut self, edge: WorkflowEdge) {
        self.edges.push(edge);
        self.is_active = false;
        self.updated_at = Utc::now();
    }

    /// Node ids reachable from `node_id` by following edges forward,
    /// including `node_id` itself. Unknown ids yield the empty set.
    pub fn reachable_from(&self, node_id: &str) -> BTreeSet<String> {
        let mut reachable = BTreeSet::new();
        if self.node(node_id).is_none() {
            return reachable;
        }
        let known: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            adjacency
                .entry(edge.from.as_str())
                .or_default()
                .push(edge.to.as_str());
        }

        let mut queue = VecDeque::from([node_id]);
        reachable.insert(node_id.to_string());
        while let Some(current) = queue.pop_front() {
            for next in adjacency.get(current).into_iter().flatten() {
                if known.contains(next) && reachable.insert((*next).to_string()) {
                    queue.push_back(next);
                }
            }
        }
        reachable
    }

    /// Checks the graph structure, reporting the first defect found:
    /// exactly one start node, no dangling edge endpoints, a well-formed
    /// branch fan-out per node, and full reachability from start. Decision
    /// nodes need exactly two distinctly labeled branches; `ab_test` nodes
    /// need exactly one `A` and one `B` branch.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let start_ids: Vec<&str> = self
            .nodes
            .iter()
            .filter(|n| n.kind() == NodeKind::Start)
            .map(|n| n.id.as_str())
            .collect();
        let start_id = match start_ids.as_slice() {
            [] => return Err(ValidationError::NoStartNode),
            [only] => *only,
            many => return Err(ValidationError::MultipleStartNodes(many.len())),
        };

        let known: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        for edge in &self.edges {
            for endpoint in [edge.from.as_str(), edge.to.as_str()] {
                if !known.contains(endpoint) {
                    return Err(ValidationError::DanglingEdge {
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                        missing: endpoint.to_string(),
                    });
                }
            }
        }

        for node in &self.nodes {
            self.check_branches(node)?;
        }

        let reachable = self.reachable_from(start_id);
        for node in &self.nodes {
            if !reachable.contains(&node.id) {
                return Err(ValidationError::UnreachableNode(node.id.clone()));
            }
        }

        Ok(())
    }

    fn check_branches(&self, node: &WorkflowNode) -> Result<(), ValidationError> {
        let outgoing = self.outgoing(&node.id);
        match node.kind() {
            NodeKind::Decision | NodeKind::AbTest => {
                if outgoing.len() != 2 {
                    return Err(ValidationError::InvalidBranchCount {
                        node_id: node.id.clone(),
                        expected: 2,
                        found: outgoing.len(),
                    });
                }
                let mut labels: Vec<&str> =
                    outgoing.iter().filter_map(|e| e.label.as_deref()).collect();
                labels.sort_unstable();
                labels.dedup();
                let well_formed = match node.kind() {
                    NodeKind::AbTest => labels == [BRANCH_A, BRANCH_B],
                    _ => labels.len() == 2,
                };
                if !well_formed {
                    return Err(ValidationError::InvalidBranchCount {
                        node_id: node.id.clone(),
                        expected: 2,
                        found: labels.len(),
                    });
                }
            }
            NodeKind::End => {}
            _ => {
                if outgoing.is_empty() {
                    return Err(ValidationError::InvalidBranchCount {
                        node_id: node.id.clone(),
                        expected: 1,
                        found: 0,
                    });
                }
            }
        }
        Ok(())
    }

    /// Validate and, on success, mark the workflow active. A draft failing
    /// validation stays inactive and the defect is returned.
    pub fn activate(&mut self) -> Result<(), ValidationError> {
        self.validate()?;
        self.is_active = true;
        self.updated_at = Utc::now();
        Ok(())
    }
}
