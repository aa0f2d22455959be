//! The bounded turn-by-turn action loop (spec.md §4.8).
//!
//! Reified as an explicit state machine over `(conversation,
//! iterations_remaining, last_result)` per spec.md §9 Design Notes,
//! rather than deep recursion, so cancellation and persistence stay
//! simple.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::{BeadId, BeadStatus, BeadType, Priority};
use crate::store::{BeadChanges, BeadStore};
use crate::worker::actions::{Action, ActionResult};
use crate::worker::error::{ActionLoopError, ActionLoopResult};
use crate::worker::provider::{ChatMessage, ChatOptions, MessageRole, Provider};
use crate::worker::workspace::Workspace;

/// Maximum structural-retry attempts before declaring execution
/// failure (spec.md §4.8 step 2, recommended value 2).
pub const MAX_STRUCTURAL_RETRIES: u32 = 2;
/// Default bound on turns per loop (spec.md §4.8, recommended value 20).
pub const DEFAULT_MAX_ITERATIONS: u32 = 20;

/// A cheap, cloneable cancellation flag checked between turns. The
/// dispatcher holds a clone per in-flight execution and flips it when
/// the cycle it belongs to is torn down.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Task-scoped context handed to the loop: persona body, the
/// accumulated conversation seed, and free-form task context text
/// (project metadata, bead attributes, and — for auto-filed bugs —
/// the investigation template).
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub persona_body: String,
    pub task_description: String,
    pub model: String,
    pub is_auto_filed_bug: bool,
    /// The bead this run is working, so `create_bead`/`close_bead`
    /// actions can link context back to it.
    pub bead_id: BeadId,
    pub project_id: String,
    /// The agent driving this run, recorded on beads it creates so a
    /// later approval can route an `[apply-fix]` bead back to it.
    pub agent_id: String,
}

fn parse_bead_type(raw: &str) -> BeadType {
    match raw.to_lowercase().as_str() {
        "bug" => BeadType::Bug,
        "feature" => BeadType::Feature,
        "epic" => BeadType::Epic,
        "decision" => BeadType::Decision,
        _ => BeadType::Task,
    }
}

fn parse_priority(raw: Option<&str>) -> Priority {
    match raw.map(str::to_lowercase).as_deref() {
        Some("p0") => Priority::P0,
        Some("p1") => Priority::P1,
        Some("p3") => Priority::P3,
        _ => Priority::P2,
    }
}

/// One (action, result) pair recorded in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub action: Action,
    pub result: ActionResult,
}

/// Terminal outcome of a loop run.
#[derive(Debug, Clone)]
pub enum LoopOutcome {
    /// The model emitted `done`, or an auto-filed investigation
    /// produced its approval bead and stopped early.
    Done {
        reason: String,
        tokens_used: u32,
        turns: Vec<Turn>,
    },
    /// Iterations were exhausted without a `done` action.
    IterationsExhausted { turns: Vec<Turn> },
}

/// The seven-step auto-filed-bug investigation template (spec.md
/// §4.8 "Special case: auto-filed bug investigation").
pub const AUTO_FILED_INVESTIGATION_TEMPLATE: &str = "\
1. Extract error context from the bug report.
2. Search the workspace for the offending code.
3. Read the relevant files.
4. Analyse the root cause.
5. Propose a patch.
6. Create a `decision` bead requesting CEO approval for the fix, including a risk assessment.
7. Stop and wait for approval; do not apply the fix in this run.";

fn build_prompt(ctx: &TaskContext) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::new(MessageRole::System, ctx.persona_body.clone())];
    let mut user_body = ctx.task_description.clone();
    if ctx.is_auto_filed_bug {
        user_body.push_str("\n\n# Investigation steps\n\n");
        user_body.push_str(AUTO_FILED_INVESTIGATION_TEMPLATE);
    }
    user_body.push_str(
        "\n\nRespond with exactly one JSON action object matching the action schema \
        (bash, file_read, file_write, file_tree, file_search, apply_patch, git_commit, \
        git_push, git_status, git_diff, create_pr, create_bead, close_bead, verify, done).",
    );
    messages.push(ChatMessage::new(MessageRole::User, user_body));
    messages
}

/// Drives one bead's action loop against a provider and a workspace.
pub struct ActionLoop {
    provider: Arc<dyn Provider>,
    workspace: Arc<dyn Workspace>,
    beads: BeadStore,
    max_iterations: u32,
}

impl ActionLoop {
    #[must_use]
    pub fn new(provider: Arc<dyn Provider>, workspace: Arc<dyn Workspace>, beads: BeadStore) -> Self {
        Self {
            provider,
            workspace,
            beads,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Run the loop to completion. See spec.md §4.8 for the per-turn
    /// contract: compose prompt, call provider, validate, execute,
    /// append, repeat until `done`, exhaustion, an unrecoverable
    /// error, or cancellation.
    pub async fn run(
        &self,
        ctx: &TaskContext,
        cancel: &CancelToken,
    ) -> ActionLoopResult<LoopOutcome> {
        let mut conversation = build_prompt(ctx);
        let mut turns: Vec<Turn> = Vec::new();
        let mut iterations_remaining = self.max_iterations;
        let mut build_and_test_passed = false;
        let mut total_tokens = 0u32;

        while iterations_remaining > 0 {
            if cancel.is_cancelled() {
                return Err(ActionLoopError::Cancelled);
            }
            iterations_remaining -= 1;

            let action = match self
                .decode_action(&ctx.model, &mut conversation, &mut total_tokens)
                .await?
            {
                Some(action) => action,
                None => {
                    return Err(ActionLoopError::StructuralFailure {
                        attempts: MAX_STRUCTURAL_RETRIES + 1,
                        last_error: "provider never produced a valid action".to_string(),
                    })
                }
            };

            if let Action::Done { reason } = &action {
                turns.push(Turn {
                    action: action.clone(),
                    result: ActionResult::ok("loop terminated by model"),
                });
                return Ok(LoopOutcome::Done {
                    reason: reason.clone(),
                    tokens_used: total_tokens,
                    turns,
                });
            }

            if let Action::GitPush { .. } = &action {
                if !build_and_test_passed {
                    let refusal = ActionResult::err(
                        "git_push refused: no successful build+test recorded earlier in this loop",
                    );
                    conversation.push(ChatMessage::new(
                        MessageRole::Tool,
                        serde_json::to_string(&refusal).unwrap_or_default(),
                    ));
                    turns.push(Turn {
                        action,
                        result: refusal,
                    });
                    continue;
                }
            }

            let result = self.execute(&action, ctx).await;
            if let Action::Bash { cmd, .. } = &action {
                if result.ok && (cmd.contains("test") || cmd.contains("build")) {
                    build_and_test_passed = true;
                }
            }
            if let Action::Verify { .. } = &action {
                if result.ok {
                    build_and_test_passed = true;
                }
            }

            conversation.push(ChatMessage::new(
                MessageRole::Tool,
                serde_json::to_string(&result).unwrap_or_default(),
            ));

            let stop_after_create_bead = ctx.is_auto_filed_bug
                && matches!(&action, Action::CreateBead { bead_type, .. } if bead_type == "decision");

            turns.push(Turn { action, result });

            if stop_after_create_bead {
                return Ok(LoopOutcome::Done {
                    reason: "auto-filed investigation filed its approval bead".to_string(),
                    tokens_used: total_tokens,
                    turns,
                });
            }

        }

        Ok(LoopOutcome::IterationsExhausted { turns })
    }

    async fn execute(&self, action: &Action, ctx: &TaskContext) -> ActionResult {
        match action {
            Action::Bash { cmd, timeout_secs } => {
                match self.workspace.bash(cmd, timeout_secs.unwrap_or(120)).await {
                    Ok(r) if r.exit_code == 0 => ActionResult::ok(r.stdout),
                    Ok(r) => ActionResult::err(format!("exit {}: {}", r.exit_code, r.stderr)),
                    Err(e) => ActionResult::err(e.to_string()),
                }
            }
            Action::FileRead { path } => match self.workspace.read_file(path).await {
                Ok(content) => ActionResult::ok(content),
                Err(e) => ActionResult::err(e.to_string()),
            },
            Action::FileWrite { path, content } => {
                match self.workspace.write_file(path, content).await {
                    Ok(()) => ActionResult::ok(format!("wrote {path}")),
                    Err(e) => ActionResult::err(e.to_string()),
                }
            }
            Action::FileTree { path, max_depth } => {
                match self.workspace.read_tree(path, max_depth.unwrap_or(4), 500).await {
                    Ok(entries) => ActionResult::ok(format!("{} entries", entries.len())),
                    Err(e) => ActionResult::err(e.to_string()),
                }
            }
            Action::FileSearch { path, query } => {
                match self.workspace.search_text(path, query, 100).await {
                    Ok(hits) => ActionResult::ok(format!("{} matches", hits.len())),
                    Err(e) => ActionResult::err(e.to_string()),
                }
            }
            Action::ApplyPatch { patch } => match self.workspace.apply_patch(patch).await {
                Ok(outcome) if outcome.applied => ActionResult::ok("patch applied"),
                Ok(outcome) => ActionResult::err(outcome.output),
                Err(e) => ActionResult::err(e.to_string()),
            },
            Action::GitCommit { message, files } => {
                match self.workspace.git_commit(message, files).await {
                    Ok(sha) => ActionResult::ok(sha),
                    Err(e) => ActionResult::err(e.to_string()),
                }
            }
            Action::GitPush { branch, set_upstream } => {
                match self.workspace.git_push(branch, *set_upstream).await {
                    Ok(()) => ActionResult::ok(format!("pushed {branch}")),
                    Err(e) => ActionResult::err(e.to_string()),
                }
            }
            Action::GitStatus => match self.workspace.git_status().await {
                Ok(status) => ActionResult::ok(status),
                Err(e) => ActionResult::err(e.to_string()),
            },
            Action::GitDiff => match self.workspace.git_diff().await {
                Ok(diff) => ActionResult::ok(diff),
                Err(e) => ActionResult::err(e.to_string()),
            },
            Action::CreatePr { title, .. } => {
                ActionResult::ok(format!("would open PR '{title}' (GitHub collaborator out of core scope)"))
            }
            Action::CreateBead {
                title,
                description,
                bead_type,
                priority,
            } => {
                let new_bead = self
                    .beads
                    .create(
                        title.clone(),
                        description.clone(),
                        parse_priority(priority.as_deref()),
                        parse_bead_type(bead_type),
                        ctx.project_id.clone(),
                    )
                    .await;
                self.beads
                    .update(
                        &new_bead.id,
                        BeadChanges::new()
                            .with_context("parent_bead_id", ctx.bead_id.clone())
                            .with_context("proposing_agent_id", ctx.agent_id.clone()),
                    )
                    .await
                    .ok();
                ActionResult::ok(format!("created bead {}", new_bead.id))
            }
            Action::CloseBead { bead_id, reason } => {
                match self
                    .beads
                    .update(
                        bead_id,
                        BeadChanges::new()
                            .with_status(BeadStatus::Closed)
                            .with_context("close_reason", reason.clone()),
                    )
                    .await
                {
                    Ok(_) => ActionResult::ok(format!("closed bead {bead_id}")),
                    Err(e) => ActionResult::err(e.to_string()),
                }
            }
            Action::Verify { .. } => ActionResult::ok("verification recorded"),
            Action::Done { .. } => ActionResult::ok("done"),
        }
    }

    /// Call the provider, decode and validate the action envelope,
    /// retrying up to [`MAX_STRUCTURAL_RETRIES`] times on structural
    /// failure by feeding the validator error back as an assistant
    /// observation (spec.md §4.8 steps 2–3).
    async fn decode_action(
        &self,
        model: &str,
        conversation: &mut Vec<ChatMessage>,
        total_tokens: &mut u32,
    ) -> ActionLoopResult<Option<Action>> {
        for attempt in 0..=MAX_STRUCTURAL_RETRIES {
            let outcome = self
                .provider
                .complete_chat(model, conversation, &ChatOptions::default())
                .await;

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) if e.is_transient() && attempt < MAX_STRUCTURAL_RETRIES => {
                    warn!(attempt, error = %e, "transient provider error, retrying");
                    continue;
                }
                Err(e) => return Err(ActionLoopError::ProviderExhausted(e.to_string())),
            };

            *total_tokens += outcome.tokens_used;
            conversation.push(ChatMessage::new(MessageRole::Assistant, outcome.text.clone()));

            match serde_json::from_str::<Action>(&outcome.text) {
                Ok(action) => match action.validate() {
                    Ok(()) => return Ok(Some(action)),
                    Err(validation_error) => {
                        conversation.push(ChatMessage::new(
                            MessageRole::Tool,
                            format!("validation error: {validation_error}"),
                        ));
                    }
                },
                Err(parse_error) => {
                    conversation.push(ChatMessage::new(
                        MessageRole::Tool,
                        format!("schema validation error: {parse_error}"),
                    ));
                }
            }
        }
        info!("exhausted structural retries without a valid action");
        Ok(None)
    }
}
