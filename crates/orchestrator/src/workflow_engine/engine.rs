//! The workflow engine itself (spec.md §4.5).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::model::{
    Bead, EdgeCondition, ExecutionId, ExecutionStatus, NodeType, WorkflowExecution,
    WorkflowTemplate,
};
use crate::persona;
use crate::workflow_engine::error::{WorkflowError, WorkflowResult};
use crate::workflow_engine::templates::{default_template_for, templates_by_type};

/// Content for the CEO decision bead created when an execution escalates.
pub struct EscalationInfo {
    pub title: String,
    pub description: String,
}

/// Drives per-bead workflow executions against a fixed set of
/// templates. Writes are serialized per execution (spec.md §5: "The
/// Workflow Engine serializes writes per execution"), realized here as
/// a single lock around the execution map — short critical sections,
/// matching the Agent Registry's policy.
#[derive(Clone)]
pub struct WorkflowEngine {
    templates: Vec<WorkflowTemplate>,
    executions: Arc<RwLock<HashMap<ExecutionId, WorkflowExecution>>>,
    /// bead id -> execution id, so `EnsureForBead` is idempotent.
    by_bead: Arc<RwLock<HashMap<String, ExecutionId>>>,
}

impl WorkflowEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            templates: templates_by_type(),
            executions: Arc::new(RwLock::new(HashMap::new())),
            by_bead: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn template(&self, id: &str) -> WorkflowResult<&WorkflowTemplate> {
        self.templates
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| WorkflowError::TemplateNotFound(id.to_string()))
    }

    /// If the bead has no execution yet, pick a template by bead title
    /// keywords and create a pending one positioned at the start node.
    pub async fn ensure_for_bead(&self, bead: &Bead) -> WorkflowExecution {
        if let Some(existing_id) = self.by_bead.read().await.get(&bead.id).cloned() {
            if let Some(existing) = self.executions.read().await.get(&existing_id) {
                return existing.clone();
            }
        }
        let template = default_template_for(&bead.title);
        let mut execution = WorkflowExecution::new(bead.id.clone(), template.id.clone());
        execution.current_node_key = template.start_node_key.clone();
        execution.status = ExecutionStatus::Running;

        self.executions
            .write()
            .await
            .insert(execution.id.clone(), execution.clone());
        self.by_bead
            .write()
            .await
            .insert(bead.id.clone(), execution.id.clone());
        execution
    }

    /// Fetch an execution by id.
    pub async fn get(&self, execution_id: &str) -> WorkflowResult<WorkflowExecution> {
        self.executions
            .read()
            .await
            .get(execution_id)
            .cloned()
            .ok_or_else(|| WorkflowError::ExecutionNotFound(execution_id.to_string()))
    }

    /// Resolve the role required by the execution's current node. For
    /// commit-type nodes the required role is forced to Engineering
    /// Manager regardless of what the node declares — a hard policy
    /// (spec.md §4.5, P9): only Engineering Managers commit.
    pub async fn role_requirement_for_current(
        &self,
        execution: &WorkflowExecution,
    ) -> WorkflowResult<String> {
        let template = self.template(&execution.template_id)?;
        let node = template
            .node(&execution.current_node_key)
            .ok_or_else(|| WorkflowError::NodeNotFound(execution.current_node_key.clone()))?;
        if node.node_type == NodeType::Commit {
            Ok(persona::normalize_role("Engineering Manager"))
        } else {
            Ok(persona::normalize_role(&node.role_required))
        }
    }

    /// Node type of the execution's current node, so the dispatcher can
    /// pick the right success/failure edge condition — `review` nodes
    /// only declare `approve`/`deny` edges, not `success`/`failure`.
    pub async fn node_type_for_current(&self, execution: &WorkflowExecution) -> WorkflowResult<NodeType> {
        let template = self.template(&execution.template_id)?;
        let node = template
            .node(&execution.current_node_key)
            .ok_or_else(|| WorkflowError::NodeNotFound(execution.current_node_key.clone()))?;
        Ok(node.node_type)
    }

    /// `false` if the current node's timeout elapsed without progress
    /// since the execution was last updated; the caller must skip
    /// dispatch and let escalation proceed.
    pub async fn is_node_ready(&self, execution: &WorkflowExecution) -> WorkflowResult<bool> {
        let template = self.template(&execution.template_id)?;
        let node = template
            .node(&execution.current_node_key)
            .ok_or_else(|| WorkflowError::NodeNotFound(execution.current_node_key.clone()))?;
        let elapsed = Utc::now().signed_duration_since(execution.updated_at);
        let timed_out = elapsed
            .to_std()
            .map(|d| d.as_secs() > node.timeout_seconds)
            .unwrap_or(false);
        Ok(!timed_out)
    }

    /// Traverse the outgoing edge matching `condition`. If no matching
    /// edge exists, or the template's escalation-cycle threshold is
    /// crossed, transition to `Escalated` and record a reason.
    pub async fn advance(
        &self,
        execution_id: &str,
        condition: EdgeCondition,
    ) -> WorkflowResult<WorkflowExecution> {
        let mut executions = self.executions.write().await;
        let execution = executions
            .get_mut(execution_id)
            .ok_or_else(|| WorkflowError::ExecutionNotFound(execution_id.to_string()))?;
        if execution.status.is_terminal() {
            return Err(WorkflowError::AlreadyTerminal(execution_id.to_string()));
        }

        let template = self
            .templates
            .iter()
            .find(|t| t.id == execution.template_id)
            .ok_or_else(|| WorkflowError::TemplateNotFound(execution.template_id.clone()))?;

        execution.cycle_count += 1;
        execution.updated_at = Utc::now();

        if execution.cycle_count >= template.escalation_cycle_threshold {
            execution.status = ExecutionStatus::Escalated;
            execution.escalation_reason =
                Some(format!("cycle count reached threshold of {}", template.escalation_cycle_threshold));
            return Ok(execution.clone());
        }

        match template.edge(&execution.current_node_key, condition) {
            Some(edge) => {
                execution.current_node_key = edge.to_node_key.clone();
                if template.node(&execution.current_node_key).is_none() {
                    execution.status = ExecutionStatus::Completed;
                }
            }
            None => {
                execution.status = ExecutionStatus::Escalated;
                execution.escalation_reason = Some(format!(
                    "no outgoing edge from '{}' for condition {:?}",
                    execution.current_node_key, condition
                ));
            }
        }
        Ok(execution.clone())
    }

    /// Drives the not-successful transition for the current node,
    /// appending `err_text` to the escalation reason if it escalates.
    /// `condition` is `failure` for most node types, but `deny` for
    /// `review` nodes, which declare `approve`/`deny` edges instead.
    pub async fn fail_node(
        &self,
        execution_id: &str,
        _agent_id: &str,
        condition: EdgeCondition,
        err_text: &str,
    ) -> WorkflowResult<WorkflowExecution> {
        let result = self.advance(execution_id, condition).await?;
        if result.status == ExecutionStatus::Escalated {
            let mut executions = self.executions.write().await;
            if let Some(execution) = executions.get_mut(execution_id) {
                execution.escalation_reason = Some(format!(
                    "{} (last error: {err_text})",
                    execution.escalation_reason.clone().unwrap_or_default()
                ));
            }
        }
        self.get(execution_id).await
    }

    /// Content for the CEO decision bead created when an execution
    /// escalates (spec.md §4.5).
    #[must_use]
    pub fn escalation_info(&self, execution: &WorkflowExecution, bead_title: &str) -> EscalationInfo {
        let reason = execution
            .escalation_reason
            .clone()
            .unwrap_or_else(|| "workflow escalated".to_string());
        EscalationInfo {
            title: format!("[CEO] Workflow escalation: {bead_title}"),
            description: format!(
                "Bead {} escalated from workflow execution {} at node '{}' after {} cycles: {reason}",
                execution.bead_id, execution.id, execution.current_node_key, execution.cycle_count
            ),
        }
    }
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}
