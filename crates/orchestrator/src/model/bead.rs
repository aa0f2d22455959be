//! The bead: the unit of work the dispatcher binds to an agent.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::AgentId;

/// Stable identifier for a bead.
pub type BeadId = String;

/// Priority, ordered so that `P0 < P1 < P2 < P3` sorts critical work first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
}

impl Priority {
    /// `true` for the critical tier.
    #[must_use]
    pub const fn is_critical(self) -> bool {
        matches!(self, Self::P0)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::P0 => write!(f, "P0"),
            Self::P1 => write!(f, "P1"),
            Self::P2 => write!(f, "P2"),
            Self::P3 => write!(f, "P3"),
        }
    }
}

/// The bead's work category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeadType {
    Task,
    Bug,
    Feature,
    Epic,
    Decision,
}

/// Bead lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeadStatus {
    Open,
    InProgress,
    Blocked,
    Closed,
}

/// A unit of work tracked by the control plane.
///
/// `context` is the free-form string→string bookkeeping map described
/// in spec.md §3: `dispatch_count`, `dispatch_history`, `last_run_at`,
/// `redispatch_requested`, `loop_detected`, `loop_detected_reason`,
/// `escalation_bead_created`, and friends. It is intentionally loosely
/// typed — callers (dispatcher, workflow engine) own the keys they read
/// and write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bead {
    pub id: BeadId,
    pub project_id: String,
    pub title: String,
    pub description: String,
    pub bead_type: BeadType,
    pub priority: Priority,
    pub status: BeadStatus,
    pub assigned_to: Option<AgentId>,
    pub tags: Vec<String>,
    pub blocked_by: Vec<BeadId>,
    pub blocks: Vec<BeadId>,
    pub parent: Option<BeadId>,
    pub children: Vec<BeadId>,
    pub context: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bead {
    /// Create a new open bead with a generated id.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        priority: Priority,
        bead_type: BeadType,
        project_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            title: title.into(),
            description: description.into(),
            bead_type,
            priority,
            status: BeadStatus::Open,
            assigned_to: None,
            tags: Vec::new(),
            blocked_by: Vec::new(),
            blocks: Vec::new(),
            parent: None,
            children: Vec::new(),
            context: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A bead is ready when it's not blocked by any open prerequisite
    /// and its own status is one a dispatcher may act on.
    #[must_use]
    pub fn is_ready(&self, closed: impl Fn(&BeadId) -> bool) -> bool {
        matches!(self.status, BeadStatus::Open | BeadStatus::InProgress)
            && self.blocked_by.iter().all(|dep| closed(dep))
    }

    /// Read a context value.
    #[must_use]
    pub fn context_get(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }

    /// Parse `dispatch_count` from context, defaulting to zero.
    #[must_use]
    pub fn dispatch_count(&self) -> u32 {
        self.context
            .get("dispatch_count")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0)
    }

    /// `true` if the context marks this bead as loop-pathological.
    #[must_use]
    pub fn loop_detected(&self) -> bool {
        self.context
            .get("loop_detected")
            .is_some_and(|v| v == "true")
    }

    /// `true` if `redispatch_requested` is set in context.
    #[must_use]
    pub fn redispatch_requested(&self) -> bool {
        self.context
            .get("redispatch_requested")
            .is_some_and(|v| v == "true")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_bead_is_open_and_unassigned() {
        let bead = Bead::new("fix the thing", "desc", Priority::P2, BeadType::Bug, "proj-1");
        assert_eq!(bead.status, BeadStatus::Open);
        assert!(bead.assigned_to.is_none());
        assert_eq!(bead.dispatch_count(), 0);
    }

    #[test]
    fn ready_respects_blocked_by() {
        let mut bead = Bead::new("t", "d", Priority::P2, BeadType::Task, "proj-1");
        bead.blocked_by.push("other".to_string());
        assert!(!bead.is_ready(|_| false));
        assert!(bead.is_ready(|_| true));
    }

    #[test]
    fn closed_bead_is_never_ready() {
        let mut bead = Bead::new("t", "d", Priority::P2, BeadType::Task, "proj-1");
        bead.status = BeadStatus::Closed;
        assert!(!bead.is_ready(|_| true));
    }

    #[test]
    fn priority_orders_critical_first() {
        let mut ps = vec![Priority::P3, Priority::P0, Priority::P2];
        ps.sort();
        assert_eq!(ps, vec![Priority::P0, Priority::P2, Priority::P3]);
    }
}
