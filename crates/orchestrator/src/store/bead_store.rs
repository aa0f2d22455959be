//! In-memory bead store satisfying the contract of spec.md §4.1.
//!
//! A concrete database is explicitly out of core scope (spec.md §6,
//! "Persisted state ... schema is out of core scope"); this
//! implementation is the one exercised by the dispatcher and its
//! tests, and is written so that a future server-backed store is a
//! drop-in replacement (same `BeadStore` shape, same mutation
//! semantics per the (status, assigned_to, context) fail-atomic
//! tuple).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::model::{Bead, BeadId, BeadStatus, BeadType, Priority};
use crate::store::error::{StoreError, StoreResult};

/// Field-level changes applied atomically by [`BeadStore::update`].
#[derive(Debug, Default, Clone)]
pub struct BeadChanges {
    pub status: Option<BeadStatus>,
    pub assigned_to: Option<Option<String>>,
    pub title: Option<String>,
    pub priority: Option<Priority>,
    pub context: HashMap<String, String>,
}

impl BeadChanges {
    /// Start a builder with no changes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_status(mut self, status: BeadStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_assigned_to(mut self, agent_id: Option<String>) -> Self {
        self.assigned_to = Some(agent_id);
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Thread-safe in-memory bead store.
///
/// Mutations on a single bead are serialized by the store's internal
/// lock, which satisfies the "fail-atomic with respect to the bead's
/// tuple of (status, assigned_to, context)" contract: readers never
/// observe a half-applied `update`.
#[derive(Debug, Clone, Default)]
pub struct BeadStore {
    beads: Arc<RwLock<HashMap<BeadId, Bead>>>,
}

impl BeadStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bead and insert it.
    pub async fn create(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
        priority: Priority,
        bead_type: BeadType,
        project_id: impl Into<String>,
    ) -> Bead {
        let bead = Bead::new(title, description, priority, bead_type, project_id);
        self.beads.write().await.insert(bead.id.clone(), bead.clone());
        bead
    }

    /// Insert a fully formed bead (used by tests and seed data).
    pub async fn insert(&self, bead: Bead) {
        self.beads.write().await.insert(bead.id.clone(), bead);
    }

    /// Fetch a single bead by id.
    pub async fn get(&self, id: &str) -> StoreResult<Bead> {
        self.beads
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::BeadNotFound(id.to_string()))
    }

    /// Beads that are not blocked (every `blocked_by` entry is closed)
    /// and whose status is `open` or `in_progress`. `project_id` of
    /// `None` returns the whole fleet.
    pub async fn list_ready(&self, project_id: Option<&str>) -> Vec<Bead> {
        let beads = self.beads.read().await;
        let closed = |id: &BeadId| {
            beads
                .get(id)
                .map(|b| b.status == BeadStatus::Closed)
                .unwrap_or(true)
        };
        beads
            .values()
            .filter(|b| project_id.map(|p| b.project_id == p).unwrap_or(true))
            .filter(|b| b.is_ready(closed))
            .cloned()
            .collect()
    }

    /// Atomically merge field and context-map changes into a bead.
    pub async fn update(&self, id: &str, changes: BeadChanges) -> StoreResult<Bead> {
        let mut beads = self.beads.write().await;
        let bead = beads
            .get_mut(id)
            .ok_or_else(|| StoreError::BeadNotFound(id.to_string()))?;
        if let Some(status) = changes.status {
            bead.status = status;
        }
        if let Some(assigned) = changes.assigned_to {
            bead.assigned_to = assigned;
        }
        if let Some(title) = changes.title {
            bead.title = title;
        }
        if let Some(priority) = changes.priority {
            bead.priority = priority;
        }
        for (k, v) in changes.context {
            bead.context.insert(k, v);
        }
        bead.updated_at = Utc::now();
        Ok(bead.clone())
    }

    /// Claim an unassigned bead for an agent: sets `status=in_progress`,
    /// `assigned_to=agent_id`. Fails with [`StoreError::AlreadyClaimed`]
    /// if the bead is already assigned to someone.
    pub async fn claim(&self, bead_id: &str, agent_id: &str) -> StoreResult<Bead> {
        let mut beads = self.beads.write().await;
        let bead = beads
            .get_mut(bead_id)
            .ok_or_else(|| StoreError::BeadNotFound(bead_id.to_string()))?;
        if let Some(existing) = &bead.assigned_to {
            if existing != agent_id {
                return Err(StoreError::AlreadyClaimed {
                    bead_id: bead_id.to_string(),
                });
            }
        }
        bead.status = BeadStatus::InProgress;
        bead.assigned_to = Some(agent_id.to_string());
        bead.updated_at = Utc::now();
        Ok(bead.clone())
    }

    /// All beads regardless of status, optionally scoped to a project.
    /// Used by scans that need to see closed beads too (e.g. the CEO
    /// approval → apply-fix sweep), where [`Self::list_ready`]'s
    /// closed-bead exclusion would hide the very beads being searched.
    pub async fn list_all(&self, project_id: Option<&str>) -> Vec<Bead> {
        self.beads
            .read()
            .await
            .values()
            .filter(|b| project_id.map(|p| b.project_id == p).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// Number of beads currently tracked (used by boundary tests).
    pub async fn len(&self) -> usize {
        self.beads.read().await.len()
    }

    /// `true` when the store holds no beads.
    pub async fn is_empty(&self) -> bool {
        self.beads.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_list_ready() {
        let store = BeadStore::new();
        store
            .create("t", "d", Priority::P2, BeadType::Task, "proj-1")
            .await;
        let ready = store.list_ready(Some("proj-1")).await;
        assert_eq!(ready.len(), 1);
    }

    #[tokio::test]
    async fn blocked_bead_is_not_ready() {
        let store = BeadStore::new();
        let blocker = store
            .create("blocker", "d", Priority::P2, BeadType::Task, "proj-1")
            .await;
        let mut blocked = Bead::new("blocked", "d", Priority::P2, BeadType::Task, "proj-1");
        blocked.blocked_by.push(blocker.id);
        store.insert(blocked).await;

        let ready = store.list_ready(Some("proj-1")).await;
        assert_eq!(ready.len(), 1, "only the blocker itself is ready");
    }

    #[tokio::test]
    async fn claim_twice_by_different_agents_conflicts() {
        let store = BeadStore::new();
        let bead = store
            .create("t", "d", Priority::P2, BeadType::Task, "proj-1")
            .await;
        store.claim(&bead.id, "agent-a").await.unwrap();
        let result = store.claim(&bead.id, "agent-b").await;
        assert!(matches!(result, Err(StoreError::AlreadyClaimed { .. })));
    }

    #[tokio::test]
    async fn claim_is_idempotent_for_same_agent() {
        let store = BeadStore::new();
        let bead = store
            .create("t", "d", Priority::P2, BeadType::Task, "proj-1")
            .await;
        store.claim(&bead.id, "agent-a").await.unwrap();
        let second = store.claim(&bead.id, "agent-a").await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn update_merges_context_without_clobbering() {
        let store = BeadStore::new();
        let bead = store
            .create("t", "d", Priority::P2, BeadType::Task, "proj-1")
            .await;
        store
            .update(&bead.id, BeadChanges::new().with_context("dispatch_count", "1"))
            .await
            .unwrap();
        store
            .update(&bead.id, BeadChanges::new().with_context("last_run_at", "now"))
            .await
            .unwrap();
        let bead = store.get(&bead.id).await.unwrap();
        assert_eq!(bead.context.get("dispatch_count").map(String::as_str), Some("1"));
        assert_eq!(bead.context.get("last_run_at").map(String::as_str), Some("now"));
    }
}
