//! Workflow graphs and the enrollment engine that walks contacts through
//! them. Graphs are author-editable drafts until activation, which gates on
//! structural validation.

pub mod conditions;
pub mod enrollment;
pub mod graph;
pub mod router;

pub use conditions::{Condition, ConditionGroup, ConditionOperator, LogicalOperator};
pub use enrollment::{Enrollment, EnrollmentEngine, EnrollmentStats, EnrollmentStatus};
pub use graph::{
    NodeConfig, NodeKind, ValidationError, Workflow, WorkflowEdge, WorkflowNode,
};
pub use router::{route_from, RouteContext, RouteOutcome};
