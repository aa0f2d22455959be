//! Workflow templates (declarative DAGs) and per-bead executions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::BeadId;

/// Stable identifier for a workflow template.
pub type TemplateId = String;
/// Stable identifier for a workflow execution.
pub type ExecutionId = String;

/// Node category. `Commit` nodes carry the hard policy that only an
/// Engineering Manager may execute them (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Investigate,
    Implement,
    Review,
    Commit,
    Verify,
    Escalate,
}

/// Condition under which an edge is traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCondition {
    Success,
    Failure,
    Approve,
    Deny,
    Timeout,
}

/// A single node in a workflow template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub node_key: String,
    pub node_type: NodeType,
    pub role_required: String,
    pub timeout_seconds: u64,
}

/// A directed edge between two nodes, taken when `condition` matches
/// the outcome of executing `from_node_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub from_node_key: String,
    pub to_node_key: String,
    pub condition: EdgeCondition,
}

/// A declarative DAG of nodes and edges for one workflow type
/// (`bug`, `feature`, `ui`, `code-review`, `bootstrap`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: TemplateId,
    pub workflow_type: String,
    pub start_node_key: String,
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
    /// Cycle-count threshold past which an execution escalates even
    /// without a `Failure`/no-matching-edge condition.
    pub escalation_cycle_threshold: u32,
}

impl WorkflowTemplate {
    /// Look up a node by key.
    #[must_use]
    pub fn node(&self, key: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.node_key == key)
    }

    /// Find the outgoing edge from `key` matching `condition`, if any.
    #[must_use]
    pub fn edge(&self, key: &str, condition: EdgeCondition) -> Option<&WorkflowEdge> {
        self.edges
            .iter()
            .find(|e| e.from_node_key == key && e.condition == condition)
    }
}

/// Execution lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Escalated,
    Completed,
    Failed,
}

impl ExecutionStatus {
    /// Terminal statuses never transition again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Escalated | Self::Completed | Self::Failed)
    }
}

/// Per-bead instance of a [`WorkflowTemplate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub bead_id: BeadId,
    pub template_id: TemplateId,
    /// Empty means "before start".
    pub current_node_key: String,
    pub cycle_count: u32,
    pub status: ExecutionStatus,
    pub escalation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowExecution {
    /// Create a new pending execution, positioned before the start node.
    #[must_use]
    pub fn new(bead_id: impl Into<BeadId>, template_id: impl Into<TemplateId>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            bead_id: bead_id.into(),
            template_id: template_id.into(),
            current_node_key: String::new(),
            cycle_count: 0,
            status: ExecutionStatus::Pending,
            escalation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_template() -> WorkflowTemplate {
        WorkflowTemplate {
            id: "bug".into(),
            workflow_type: "bug".into(),
            start_node_key: "investigate".into(),
            nodes: vec![
                WorkflowNode {
                    node_key: "investigate".into(),
                    node_type: NodeType::Investigate,
                    role_required: "engineer".into(),
                    timeout_seconds: 600,
                },
                WorkflowNode {
                    node_key: "commit".into(),
                    node_type: NodeType::Commit,
                    role_required: "qa-engineer".into(),
                    timeout_seconds: 600,
                },
            ],
            edges: vec![WorkflowEdge {
                from_node_key: "investigate".into(),
                to_node_key: "commit".into(),
                condition: EdgeCondition::Success,
            }],
            escalation_cycle_threshold: 10,
        }
    }

    #[test]
    fn edge_lookup_matches_condition() {
        let tpl = sample_template();
        assert!(tpl.edge("investigate", EdgeCondition::Success).is_some());
        assert!(tpl.edge("investigate", EdgeCondition::Failure).is_none());
    }

    #[test]
    fn terminal_statuses() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Escalated.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(!ExecutionStatus::Pending.is_terminal());
    }
}
