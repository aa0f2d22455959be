//! The closed action schema an agent emits each turn (spec.md §4.8).

use serde::{Deserialize, Serialize};

/// Tagged variant over the closed action set. `type + payload`, per
/// spec.md §9 Design Notes ("avoid open inheritance hierarchies;
/// prefer type + payload").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Bash { cmd: String, timeout_secs: Option<u64> },
    FileRead { path: String },
    FileWrite { path: String, content: String },
    FileTree { path: String, max_depth: Option<usize> },
    FileSearch { path: String, query: String },
    ApplyPatch { patch: String },
    GitCommit { message: String, files: Vec<String> },
    GitPush { branch: String, set_upstream: bool },
    GitStatus,
    GitDiff,
    CreatePr { title: String, body: String },
    CreateBead {
        title: String,
        description: String,
        bead_type: String,
        #[serde(default)]
        priority: Option<String>,
    },
    CloseBead { bead_id: String, reason: String },
    Verify { notes: Option<String> },
    Done { reason: String },
}

impl Action {
    /// A short, stable signature used by the loop detector's
    /// action-repeat variant.
    #[must_use]
    pub fn signature(&self) -> &'static str {
        match self {
            Self::Bash { .. } => "bash",
            Self::FileRead { .. } => "file_read",
            Self::FileWrite { .. } => "file_write",
            Self::FileTree { .. } => "file_tree",
            Self::FileSearch { .. } => "file_search",
            Self::ApplyPatch { .. } => "apply_patch",
            Self::GitCommit { .. } => "git_commit",
            Self::GitPush { .. } => "git_push",
            Self::GitStatus => "git_status",
            Self::GitDiff => "git_diff",
            Self::CreatePr { .. } => "create_pr",
            Self::CreateBead { .. } => "create_bead",
            Self::CloseBead { .. } => "close_bead",
            Self::Verify { .. } => "verify",
            Self::Done { .. } => "done",
        }
    }

    /// Validate the chosen action's required parameters (spec.md §4.8
    /// step 3). Structural decoding already enforces field presence
    /// via `serde`; this layer enforces non-emptiness of fields the
    /// schema alone can't.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::ApplyPatch { patch } if patch.trim().is_empty() => {
                Err("apply_patch requires a non-empty patch".to_string())
            }
            Self::CreateBead { title, .. } if title.trim().is_empty() => {
                Err("create_bead requires a title".to_string())
            }
            Self::CloseBead { bead_id, reason } if bead_id.trim().is_empty() || reason.trim().is_empty() => {
                Err("close_bead requires bead_id and reason".to_string())
            }
            Self::GitCommit { message, .. } if message.trim().is_empty() => {
                Err("git_commit requires a message".to_string())
            }
            Self::Bash { cmd, .. } if cmd.trim().is_empty() => {
                Err("bash requires a non-empty cmd".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Outcome of executing one action against the workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub ok: bool,
    pub summary: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl ActionResult {
    #[must_use]
    pub fn ok(summary: impl Into<String>) -> Self {
        Self {
            ok: true,
            summary: summary.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn err(summary: impl Into<String>) -> Self {
        Self {
            ok: false,
            summary: summary.into(),
            data: None,
        }
    }
}
