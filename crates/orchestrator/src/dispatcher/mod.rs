//! The dispatcher: binds ready beads to idle agents each cycle and
//! drives the worker action loop for each binding (spec.md §4.7).

mod error;

pub use error::{DispatchError, DispatchResult};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::MaxHops;
use crate::events::{Event, EventBus, Topic};
use crate::loop_detector::{self, DispatchHistory};
use crate::model::{
    Agent, AgentId, Bead, BeadId, BeadStatus, BeadType, EdgeCondition, ExecutionStatus, Priority,
    ProviderId,
};
use crate::persona;
use crate::readiness::{ReadinessGate, ReadinessMode, ReadinessReport};
use crate::router;
use crate::store::{AgentRegistry, BeadChanges, BeadStore, ProviderRegistry};
use crate::worker::{
    ActionLoop, CancelToken, LoopOutcome, Provider as WorkerProvider, TaskContext,
    Workspace as WorkerWorkspace,
};
use crate::workflow_engine::WorkflowEngine;

/// Per-project snapshot consulted before a cycle spends any dispatch
/// budget (spec.md §4.7 step 1).
#[derive(Debug, Clone)]
pub struct SystemStatus {
    pub has_active_providers: bool,
    pub readiness: ReadinessReport,
    pub ready_bead_count: usize,
    pub idle_agent_count: usize,
}

/// What one `run_cycle` call did, returned for logging and tests.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub parked: bool,
    pub parked_reason: Option<String>,
    pub dispatched: Vec<(BeadId, AgentId)>,
    pub escalated: Vec<BeadId>,
    pub closed: Vec<BeadId>,
    pub applied_fixes: Vec<BeadId>,
    pub hops_used: u32,
}

/// Binds ready beads to idle agents, runs the worker action loop for
/// each binding, and advances each bead's workflow execution in
/// response. Owns no business state itself; all mutable state lives in
/// the stores, registry, and workflow engine it is handed at
/// construction (spec.md §5: "no component owns another's lock").
#[derive(Clone)]
pub struct Dispatcher {
    beads: BeadStore,
    agents: AgentRegistry,
    providers: ProviderRegistry,
    workflows: WorkflowEngine,
    events: EventBus,
    readiness: Arc<dyn ReadinessGate>,
    readiness_mode: ReadinessMode,
    max_hops: MaxHops,
    action_loop_max_iterations: u32,
    provider_clients: Arc<RwLock<HashMap<ProviderId, Arc<dyn WorkerProvider>>>>,
    workspaces: Arc<RwLock<HashMap<String, Arc<dyn WorkerWorkspace>>>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        beads: BeadStore,
        agents: AgentRegistry,
        providers: ProviderRegistry,
        workflows: WorkflowEngine,
        events: EventBus,
        readiness: Arc<dyn ReadinessGate>,
        readiness_mode: ReadinessMode,
        max_hops: MaxHops,
    ) -> Self {
        Self {
            beads,
            agents,
            providers,
            workflows,
            events,
            readiness,
            readiness_mode,
            max_hops,
            action_loop_max_iterations: 20,
            provider_clients: Arc::new(RwLock::new(HashMap::new())),
            workspaces: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn with_action_loop_max_iterations(mut self, max_iterations: u32) -> Self {
        self.action_loop_max_iterations = max_iterations;
        self
    }

    /// Register the live LLM client a provider id resolves to. Distinct
    /// from [`ProviderRegistry`], which tracks bookkeeping metadata
    /// only (spec.md §6: the registry and the client are separate
    /// collaborators).
    pub async fn register_provider_client(&self, provider_id: impl Into<String>, client: Arc<dyn WorkerProvider>) {
        self.provider_clients.write().await.insert(provider_id.into(), client);
    }

    /// Register the workspace collaborator for a project.
    pub async fn register_workspace(&self, project_id: impl Into<String>, workspace: Arc<dyn WorkerWorkspace>) {
        self.workspaces.write().await.insert(project_id.into(), workspace);
    }

    /// Snapshot the preconditions a cycle checks before spending budget.
    pub async fn status(&self, project_id: &str) -> SystemStatus {
        let readiness = self.readiness.check(project_id).await;
        let ready = self.beads.list_ready(Some(project_id)).await;
        let idle = self.agents.idle_by_project(project_id, &self.providers).await;
        SystemStatus {
            has_active_providers: self.providers.has_active().await,
            ready_bead_count: ready.len(),
            idle_agent_count: idle.len(),
            readiness,
        }
    }

    /// Run one dispatch cycle for a project (spec.md §4.7).
    pub async fn run_cycle(&self, project_id: &str) -> DispatchResult<DispatchReport> {
        let mut report = DispatchReport::default();

        if !self.providers.has_active().await {
            report.parked = true;
            report.parked_reason = Some("no active providers registered".to_string());
            info!(project_id, "dispatch cycle parked: no active providers registered");
            return Ok(report);
        }

        let readiness = self.readiness.check(project_id).await;
        if !readiness.ready {
            warn!(project_id, issues = ?readiness.issues, "project failed readiness check");
            if self.readiness_mode == ReadinessMode::Block {
                report.parked = true;
                report.parked_reason = Some(format!("readiness check failed: {:?}", readiness.issues));
                return Ok(report);
            }
        }

        self.apply_approved_fixes(project_id, &mut report).await?;

        let mut ready = self.beads.list_ready(Some(project_id)).await;
        ready.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)));

        let mut idle_agents = self.agents.idle_by_project(project_id, &self.providers).await;
        let max_hops = self.max_hops.get();
        let had_ready_beads = !ready.is_empty();
        let had_idle_agents = !idle_agents.is_empty();

        for bead in ready {
            if idle_agents.is_empty() {
                break;
            }
            if bead.bead_type == BeadType::Decision {
                continue;
            }
            if bead.priority == Priority::P0 && !router::bypasses_p0_hold(&bead) {
                continue;
            }

            let bead = match self.retitle_if_routed(bead).await? {
                Some(b) => b,
                None => continue,
            };

            let history = DispatchHistory::from_context_json(bead.context_get("dispatch_history"));
            let ping_pong_stuck = loop_detector::classify(&history).is_stuck();
            let hop_ceiling_reached = bead.dispatch_count() >= max_hops;
            if ping_pong_stuck || hop_ceiling_reached {
                let reason = if ping_pong_stuck {
                    "dispatch alternated between two agents for 6 runs"
                } else {
                    "dispatch_count reached the MAX_HOPS ceiling without the loop detector confirming progress"
                };
                self.escalate_stuck_bead(&bead, reason, &mut report).await?;
                continue;
            }

            if !bead.redispatch_requested() && bead.status != BeadStatus::InProgress && bead.context_get("last_run_at").is_some() {
                continue;
            }

            let execution = self.workflows.ensure_for_bead(&bead).await;
            if execution.status.is_terminal() {
                self.finalize_terminal_execution(&bead, &execution, &mut report).await?;
                continue;
            }
            if !self.workflows.is_node_ready(&execution).await? {
                let after = self.workflows.advance(&execution.id, EdgeCondition::Timeout).await?;
                self.apply_workflow_transition(&bead, &after, &mut report).await?;
                continue;
            }

            let role_required = self.workflows.role_requirement_for_current(&execution).await?;
            let chosen = if let Some(assigned_id) = bead.assigned_to.clone() {
                // Already claimed: only the agent holding it may pick it
                // back up, and only if that agent is idle right now.
                idle_agents.iter().find(|a| a.id == assigned_id).cloned()
            } else {
                persona::resolve(&bead.title, &bead.tags, &idle_agents)
                    .filter(|a| a.normalized_role() == role_required)
                    .or_else(|| idle_agents.iter().find(|a| a.normalized_role() == role_required))
                    .cloned()
            };
            let Some(agent) = chosen else {
                continue;
            };

            let claimed = match self.beads.claim(&bead.id, &agent.id).await {
                Ok(claimed) => claimed,
                Err(crate::store::StoreError::AlreadyClaimed { bead_id }) => {
                    info!(bead_id, "bead claimed by another agent this cycle, skipping");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            self.agents.assign(&agent.id, &claimed.id).await?;

            let mut history = history;
            history.push(agent.id.clone());
            self.beads
                .update(
                    &claimed.id,
                    BeadChanges::new()
                        .with_context("dispatch_history", history.to_context_json())
                        .with_context("dispatch_count", (claimed.dispatch_count() + 1).to_string()),
                )
                .await?;
            self.events.publish(Event::new(
                Topic::BeadAssigned,
                serde_json::json!({"bead_id": claimed.id, "agent_id": agent.id}),
            ));

            idle_agents.retain(|a| a.id != agent.id);
            report.hops_used += 1;
            report.dispatched.push((claimed.id.clone(), agent.id.clone()));

            self.run_worker_turn(&claimed, &agent, &execution, &role_required, &mut report)
                .await?;
        }

        if !report.parked {
            report.parked = true;
            report.parked_reason = Some(if !report.dispatched.is_empty() {
                "idle".to_string()
            } else if had_ready_beads && !had_idle_agents {
                "no idle agents with active providers".to_string()
            } else {
                "no dispatchable beads".to_string()
            });
        }

        Ok(report)
    }

    /// Apply the auto-bug router's title rewrite if it wants one, and
    /// return the refreshed bead. `None` if the bead disappeared from
    /// under us (shouldn't happen outside concurrent test setups, but
    /// the store contract makes that theoretically possible).
    async fn retitle_if_routed(&self, bead: Bead) -> DispatchResult<Option<Bead>> {
        let Some(new_title) = router::route(&bead) else {
            return Ok(Some(bead));
        };
        let updated = self
            .beads
            .update(&bead.id, BeadChanges::new().with_title(new_title))
            .await?;
        Ok(Some(updated))
    }

    async fn escalate_stuck_bead(&self, bead: &Bead, reason: &str, report: &mut DispatchReport) -> DispatchResult<()> {
        if bead.context_get("loop_detected").is_some() {
            return Ok(());
        }
        self.beads
            .update(
                &bead.id,
                BeadChanges::new()
                    .with_status(BeadStatus::Open)
                    .with_priority(Priority::P0)
                    .with_assigned_to(None)
                    .with_context("loop_detected", "true")
                    .with_context("loop_detected_reason", reason)
                    .with_context("loop_detected_at", Utc::now().to_rfc3339()),
            )
            .await?;
        self.create_ceo_decision(
            &bead.project_id,
            format!("[CEO] Loop detected: {}", bead.title),
            format!("Bead {} looks stuck, not productive: {reason}.", bead.id),
            &bead.id,
        )
        .await?;
        report.escalated.push(bead.id.clone());
        Ok(())
    }

    async fn finalize_terminal_execution(
        &self,
        bead: &Bead,
        execution: &crate::model::WorkflowExecution,
        report: &mut DispatchReport,
    ) -> DispatchResult<()> {
        match execution.status {
            ExecutionStatus::Completed => {
                self.beads
                    .update(&bead.id, BeadChanges::new().with_status(BeadStatus::Closed))
                    .await?;
                self.events.publish(Event::new(
                    Topic::BeadStatusChange,
                    serde_json::json!({"bead_id": bead.id, "status": "closed"}),
                ));
                report.closed.push(bead.id.clone());
            }
            ExecutionStatus::Escalated => {
                self.escalate_workflow(bead, execution, report).await?;
            }
            ExecutionStatus::Pending | ExecutionStatus::Running | ExecutionStatus::Failed => {}
        }
        Ok(())
    }

    async fn apply_workflow_transition(
        &self,
        bead: &Bead,
        execution: &crate::model::WorkflowExecution,
        report: &mut DispatchReport,
    ) -> DispatchResult<()> {
        if execution.status.is_terminal() {
            return self.finalize_terminal_execution(bead, execution, report).await;
        }
        self.events.publish(Event::new(
            Topic::WorkflowAdvanced,
            serde_json::json!({"bead_id": bead.id, "node": execution.current_node_key}),
        ));
        Ok(())
    }

    async fn escalate_workflow(
        &self,
        bead: &Bead,
        execution: &crate::model::WorkflowExecution,
        report: &mut DispatchReport,
    ) -> DispatchResult<()> {
        if bead.context_get("escalation_bead_created").is_some() {
            return Ok(());
        }
        let info = self.workflows.escalation_info(execution, &bead.title);
        self.beads
            .update(
                &bead.id,
                BeadChanges::new()
                    .with_status(BeadStatus::Blocked)
                    .with_context("escalation_bead_created", "true"),
            )
            .await?;
        self.create_ceo_decision(&bead.project_id, info.title, info.description, &bead.id)
            .await?;
        self.events.publish(Event::new(
            Topic::WorkflowEscalated,
            serde_json::json!({"bead_id": bead.id, "execution_id": execution.id}),
        ));
        report.escalated.push(bead.id.clone());
        Ok(())
    }

    async fn create_ceo_decision(
        &self,
        project_id: &str,
        title: impl Into<String>,
        description: impl Into<String>,
        parent_bead_id: &str,
    ) -> DispatchResult<Bead> {
        let decision = self
            .beads
            .create(title, description, Priority::P0, BeadType::Decision, project_id.to_string())
            .await;
        self.beads
            .update(
                &decision.id,
                BeadChanges::new().with_context("parent_bead_id", parent_bead_id.to_string()),
            )
            .await?;
        Ok(decision)
    }

    /// Sweep closed decision beads for a CEO-approved fix and, for
    /// each one not yet acted on, file the `[apply-fix]` follow-up
    /// bead (spec.md §4.7 P7, S6: "CEO approval unblocks the fix").
    async fn apply_approved_fixes(&self, project_id: &str, report: &mut DispatchReport) -> DispatchResult<()> {
        let all = self.beads.list_all(Some(project_id)).await;
        for decision in all {
            if decision.bead_type != BeadType::Decision || decision.status != BeadStatus::Closed {
                continue;
            }
            if decision.context_get("applied_fix").is_some() {
                continue;
            }
            let approved = decision
                .context_get("close_reason")
                .map(|r| r.to_lowercase().contains("approve"))
                .unwrap_or(false);
            if !approved {
                continue;
            }
            let parent_bead_id = decision.context_get("parent_bead_id").unwrap_or("").to_string();
            let proposing_agent = decision.context_get("proposing_agent_id").map(str::to_string);
            let fix_bead = self
                .beads
                .create(
                    format!("[apply-fix] {}", decision.title),
                    format!(
                        "CEO approved decision {} (parent bead {parent_bead_id}); apply the fix it describes.",
                        decision.id
                    ),
                    Priority::P1,
                    BeadType::Task,
                    project_id.to_string(),
                )
                .await;
            self.beads
                .update(
                    &fix_bead.id,
                    BeadChanges::new()
                        .with_context("parent_bead_id", decision.id.clone())
                        .with_assigned_to(proposing_agent.clone()),
                )
                .await?;
            self.beads
                .update(&decision.id, BeadChanges::new().with_context("applied_fix", "true"))
                .await?;
            report.applied_fixes.push(fix_bead.id);
        }
        Ok(())
    }

    async fn run_worker_turn(
        &self,
        bead: &Bead,
        agent: &Agent,
        execution: &crate::model::WorkflowExecution,
        role_required: &str,
        report: &mut DispatchReport,
    ) -> DispatchResult<()> {
        let client = self
            .provider_clients
            .read()
            .await
            .get(&agent.provider_id)
            .cloned()
            .ok_or_else(|| DispatchError::NoProviderClient(agent.provider_id.clone()))?;
        let workspace = self
            .workspaces
            .read()
            .await
            .get(&bead.project_id)
            .cloned()
            .ok_or_else(|| DispatchError::NoWorkspace(bead.project_id.clone()))?;
        let provider_meta = self.providers.get(&agent.provider_id).await?;

        let ctx = TaskContext {
            persona_body: format!("You are acting as the {role_required} on this project."),
            task_description: format!("{}\n\n{}", bead.title, bead.description),
            model: provider_meta.model.clone(),
            is_auto_filed_bug: router::is_auto_filed(bead) && bead.bead_type == BeadType::Bug,
            bead_id: bead.id.clone(),
            project_id: bead.project_id.clone(),
            agent_id: agent.id.clone(),
        };

        let loop_runner = ActionLoop::new(client, workspace, self.beads.clone())
            .with_max_iterations(self.action_loop_max_iterations);
        let cancel = CancelToken::new();
        let outcome = loop_runner.run(&ctx, &cancel).await;

        let node_type = self.workflows.node_type_for_current(execution).await?;
        let (success_condition, failure_condition) = if node_type == crate::model::NodeType::Review {
            (EdgeCondition::Approve, EdgeCondition::Deny)
        } else {
            (EdgeCondition::Success, EdgeCondition::Failure)
        };

        let mut bookkeeping = BeadChanges::new()
            .with_context("last_run_at", Utc::now().to_rfc3339())
            .with_context("redispatch_requested", "false");

        let after = match outcome {
            Ok(LoopOutcome::Done { reason, tokens_used, .. }) => {
                info!(bead_id = %bead.id, agent_id = %agent.id, reason, "worker turn completed");
                bookkeeping = bookkeeping
                    .with_context("model_used", provider_meta.model.clone())
                    .with_context("token_count", tokens_used.to_string())
                    .with_context("summary_output", reason);
                self.workflows.advance(&execution.id, success_condition).await?
            }
            Ok(LoopOutcome::IterationsExhausted { turns }) => {
                warn!(bead_id = %bead.id, agent_id = %agent.id, turns = turns.len(), "worker turn exhausted its iteration budget");
                bookkeeping = bookkeeping.with_context("last_run_error", "iterations exhausted without a terminal action");
                self.workflows
                    .fail_node(
                        &execution.id,
                        &agent.id,
                        failure_condition,
                        "iterations exhausted without a terminal action",
                    )
                    .await?
            }
            Err(e) => {
                warn!(bead_id = %bead.id, agent_id = %agent.id, error = %e, "worker turn failed");
                bookkeeping = bookkeeping.with_context("last_run_error", e.to_string());
                self.workflows
                    .fail_node(&execution.id, &agent.id, failure_condition, &e.to_string())
                    .await?
            }
        };

        self.beads.update(&bead.id, bookkeeping).await?;
        self.agents.release(&agent.id).await?;

        if after.status.is_terminal() {
            self.finalize_terminal_execution(bead, &after, report).await?;
        } else {
            // Unassign so the next stage's (possibly different-role)
            // agent can claim it; a node transition is not a handoff
            // back to the same agent.
            self.beads
                .update(
                    &bead.id,
                    BeadChanges::new()
                        .with_status(BeadStatus::Open)
                        .with_assigned_to(None)
                        .with_context("redispatch_requested", "true"),
                )
                .await?;
            self.events.publish(Event::new(
                Topic::WorkflowAdvanced,
                serde_json::json!({"bead_id": bead.id, "node": after.current_node_key}),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Agent as ModelAgent, Provider as ModelProvider, ProviderStatus};
    use crate::readiness::AlwaysReady;
    use crate::worker::{BashResult, ChatMessage, ChatOptions, ChatOutcome, PatchOutcome, ProviderError, TreeEntry, WorkspaceError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedProvider(Mutex<Vec<String>>);

    impl ScriptedProvider {
        fn new(scripts: Vec<&str>) -> Self {
            Self(Mutex::new(scripts.into_iter().rev().map(String::from).collect()))
        }
    }

    #[async_trait]
    impl WorkerProvider for ScriptedProvider {
        async fn complete_chat(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _options: &ChatOptions,
        ) -> Result<ChatOutcome, ProviderError> {
            let text = self.0.lock().unwrap().pop().unwrap_or_else(|| "{\"type\":\"done\",\"reason\":\"fallback\"}".to_string());
            Ok(ChatOutcome { text, tokens_used: 10, finish_reason: "stop".to_string() })
        }

        async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
            Ok(vec!["stub".to_string()])
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    struct NullWorkspace;

    #[async_trait]
    impl WorkerWorkspace for NullWorkspace {
        async fn read_file(&self, _path: &str) -> Result<String, WorkspaceError> {
            Ok(String::new())
        }
        async fn write_file(&self, _path: &str, _content: &str) -> Result<(), WorkspaceError> {
            Ok(())
        }
        async fn read_tree(&self, _path: &str, _max_depth: usize, _limit: usize) -> Result<Vec<TreeEntry>, WorkspaceError> {
            Ok(Vec::new())
        }
        async fn search_text(&self, _path: &str, _query: &str, _limit: usize) -> Result<Vec<String>, WorkspaceError> {
            Ok(Vec::new())
        }
        async fn apply_patch(&self, _unified_diff: &str) -> Result<PatchOutcome, WorkspaceError> {
            Ok(PatchOutcome { applied: true, output: String::new() })
        }
        async fn bash(&self, _cmd: &str, _timeout_secs: u64) -> Result<BashResult, WorkspaceError> {
            Ok(BashResult { exit_code: 0, stdout: String::new(), stderr: String::new() })
        }
        async fn git_commit(&self, _message: &str, _files: &[String]) -> Result<String, WorkspaceError> {
            Ok("deadbeef".to_string())
        }
        async fn git_push(&self, _branch: &str, _set_upstream: bool) -> Result<(), WorkspaceError> {
            Ok(())
        }
        async fn git_status(&self) -> Result<String, WorkspaceError> {
            Ok(String::new())
        }
        async fn git_diff(&self) -> Result<String, WorkspaceError> {
            Ok(String::new())
        }
    }

    async fn harness() -> (Dispatcher, BeadStore, AgentRegistry, ProviderRegistry) {
        let beads = BeadStore::new();
        let agents = AgentRegistry::new();
        let providers = ProviderRegistry::new();
        providers
            .register(ModelProvider::new("prov-1", "anthropic", "https://x", "claude"))
            .await;
        providers.set_status("prov-1", ProviderStatus::Active).await.unwrap();

        let dispatcher = Dispatcher::new(
            beads.clone(),
            agents.clone(),
            providers.clone(),
            WorkflowEngine::new(),
            EventBus::new(),
            Arc::new(AlwaysReady),
            ReadinessMode::Warn,
            MaxHops::new(20),
        );
        dispatcher
            .register_provider_client("prov-1", Arc::new(ScriptedProvider::new(vec!["{\"type\":\"done\",\"reason\":\"looks fine\"}"])))
            .await;
        dispatcher.register_workspace("proj-1", Arc::new(NullWorkspace)).await;
        (dispatcher, beads, agents, providers)
    }

    #[tokio::test]
    async fn cycle_parks_when_no_active_providers() {
        let beads = BeadStore::new();
        let agents = AgentRegistry::new();
        let providers = ProviderRegistry::new();
        let dispatcher = Dispatcher::new(
            beads,
            agents,
            providers,
            WorkflowEngine::new(),
            EventBus::new(),
            Arc::new(AlwaysReady),
            ReadinessMode::Warn,
            MaxHops::new(20),
        );
        let report = dispatcher.run_cycle("proj-1").await.unwrap();
        assert!(report.parked);
    }

    #[tokio::test]
    async fn cycle_binds_a_ready_bead_to_a_matching_idle_agent() {
        let (dispatcher, beads, agents, _providers) = harness().await;
        let bead = beads
            .create("[backend-engineer] fix the crash", "d", Priority::P2, BeadType::Bug, "proj-1")
            .await;
        agents
            .register(ModelAgent::new("Ada", "Backend Engineer", "prov-1", "proj-1"))
            .await;

        let report = dispatcher.run_cycle("proj-1").await.unwrap();
        assert_eq!(report.dispatched.len(), 1);
        assert_eq!(
            report.closed.len(),
            0,
            "the bug template has more stages after investigate, so one done turn only advances one node"
        );
        let after = beads.get(&bead.id).await.unwrap();
        assert_eq!(after.status, BeadStatus::Open, "released back for the next stage's dispatch");
        assert_eq!(after.dispatch_count(), 1);
    }

    #[tokio::test]
    async fn happy_path_walks_every_stage_to_completion() {
        let (dispatcher, beads, agents, _providers) = harness().await;
        let bead = beads
            .create("[backend-engineer] fix the crash", "d", Priority::P2, BeadType::Bug, "proj-1")
            .await;
        agents
            .register(ModelAgent::new("Ada", "Backend Engineer", "prov-1", "proj-1"))
            .await;
        agents
            .register(ModelAgent::new("Quinn", "QA Engineer", "prov-1", "proj-1"))
            .await;
        agents
            .register(ModelAgent::new("Emery", "Engineering Manager", "prov-1", "proj-1"))
            .await;

        let mut closed = false;
        for _ in 0..10 {
            let report = dispatcher.run_cycle("proj-1").await.unwrap();
            if !report.closed.is_empty() {
                closed = true;
                break;
            }
        }
        assert!(closed, "bug workflow (investigate/implement/review/commit/verify) should reach its final node");
        let after = beads.get(&bead.id).await.unwrap();
        assert_eq!(after.status, BeadStatus::Closed);
    }

    #[tokio::test]
    async fn p0_bead_without_auto_filed_tag_is_held() {
        let (dispatcher, beads, agents, _providers) = harness().await;
        beads
            .create("[backend-engineer] critical outage", "d", Priority::P0, BeadType::Bug, "proj-1")
            .await;
        agents
            .register(ModelAgent::new("Ada", "Backend Engineer", "prov-1", "proj-1"))
            .await;

        let report = dispatcher.run_cycle("proj-1").await.unwrap();
        assert!(report.dispatched.is_empty());
    }

    #[tokio::test]
    async fn auto_filed_p0_bug_bypasses_the_hold() {
        let (dispatcher, beads, agents, _providers) = harness().await;
        beads
            .create(
                "[backend-engineer] [auto-filed] panic: nil pointer",
                "d",
                Priority::P0,
                BeadType::Bug,
                "proj-1",
            )
            .await;
        agents
            .register(ModelAgent::new("Ada", "Backend Engineer", "prov-1", "proj-1"))
            .await;

        let report = dispatcher.run_cycle("proj-1").await.unwrap();
        assert_eq!(report.dispatched.len(), 1);
    }

    #[tokio::test]
    async fn decision_beads_are_never_directly_dispatched() {
        let (dispatcher, beads, agents, _providers) = harness().await;
        beads
            .create("[backend-engineer] approve this", "d", Priority::P1, BeadType::Decision, "proj-1")
            .await;
        agents
            .register(ModelAgent::new("Ada", "Backend Engineer", "prov-1", "proj-1"))
            .await;

        let report = dispatcher.run_cycle("proj-1").await.unwrap();
        assert!(report.dispatched.is_empty());
    }

    #[tokio::test]
    async fn stuck_ping_pong_history_escalates_instead_of_dispatching() {
        let (dispatcher, beads, agents, _providers) = harness().await;
        let bead = beads
            .create("[backend-engineer] flaky thing", "d", Priority::P2, BeadType::Bug, "proj-1")
            .await;
        let mut history = DispatchHistory::new();
        for agent_id in ["a", "b", "a", "b", "a", "b"] {
            history.push(agent_id);
        }
        beads
            .update(
                &bead.id,
                BeadChanges::new().with_context("dispatch_history", history.to_context_json()),
            )
            .await
            .unwrap();
        agents
            .register(ModelAgent::new("Ada", "Backend Engineer", "prov-1", "proj-1"))
            .await;

        let report = dispatcher.run_cycle("proj-1").await.unwrap();
        assert!(report.dispatched.is_empty());
        assert_eq!(report.escalated.len(), 1);
        let escalated = beads.get(&bead.id).await.unwrap();
        assert_eq!(escalated.status, BeadStatus::Open);
        assert_eq!(escalated.priority, Priority::P0);
        assert_eq!(escalated.assigned_to, None);
        assert_eq!(escalated.context_get("loop_detected"), Some("true"));
        assert_eq!(
            escalated.context_get("loop_detected_reason"),
            Some("dispatch alternated between two agents for 6 runs")
        );
        assert_eq!(beads.list_all(Some("proj-1")).await.len(), 2, "a CEO decision bead was filed");
    }

    #[tokio::test]
    async fn ceo_approved_decision_files_an_apply_fix_bead() {
        let (dispatcher, beads, _agents, _providers) = harness().await;
        let decision = beads
            .create("[CEO] Code Fix Approval: x", "d", Priority::P0, BeadType::Decision, "proj-1")
            .await;
        beads
            .update(
                &decision.id,
                BeadChanges::new()
                    .with_status(BeadStatus::Closed)
                    .with_context("close_reason", "approved, ship it")
                    .with_context("parent_bead_id", "bead-0")
                    .with_context("proposing_agent_id", "agent-prop"),
            )
            .await
            .unwrap();

        let report = dispatcher.run_cycle("proj-1").await.unwrap();
        assert_eq!(report.applied_fixes.len(), 1);
        let fix_bead = beads.get(&report.applied_fixes[0]).await.unwrap();
        assert_eq!(fix_bead.assigned_to.as_deref(), Some("agent-prop"));

        // A second cycle must not refile the same fix.
        let second = dispatcher.run_cycle("proj-1").await.unwrap();
        assert!(second.applied_fixes.is_empty());
    }

    #[tokio::test]
    async fn no_idle_agent_leaves_the_bead_ready_for_next_cycle() {
        let (dispatcher, beads, _agents, _providers) = harness().await;
        beads
            .create("[backend-engineer] needs an agent", "d", Priority::P2, BeadType::Bug, "proj-1")
            .await;

        let report = dispatcher.run_cycle("proj-1").await.unwrap();
        assert!(report.dispatched.is_empty());
    }
}
