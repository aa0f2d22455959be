//! The worker agent: a persona-assigned identity bound to a provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{BeadId, ProviderId};

/// Stable identifier for an agent.
pub type AgentId = String;

/// Agent lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Working,
    Paused,
}

/// A worker identity: a persona bound to a provider, owned by a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub project_id: String,
    pub display_name: String,
    pub role: String,
    pub provider_id: ProviderId,
    pub status: AgentStatus,
    pub current_bead: Option<BeadId>,
    pub last_heartbeat: DateTime<Utc>,
}

impl Agent {
    /// Create a new idle agent.
    #[must_use]
    pub fn new(
        display_name: impl Into<String>,
        role: impl Into<String>,
        provider_id: impl Into<ProviderId>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            display_name: display_name.into(),
            role: role.into(),
            provider_id: provider_id.into(),
            status: AgentStatus::Idle,
            current_bead: None,
            last_heartbeat: Utc::now(),
        }
    }

    /// Normalized role: lower-case, parens stripped, slashes/whitespace
    /// collapsed to single hyphens, trimmed. Mirrors the persona
    /// matcher's hint normalization so role comparisons are symmetric.
    #[must_use]
    pub fn normalized_role(&self) -> String {
        crate::persona::normalize_role(&self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_agent_is_idle_with_no_bead() {
        let agent = Agent::new("Ada", "Engineering Manager", "prov-1", "proj-1");
        assert_eq!(agent.status, AgentStatus::Idle);
        assert!(agent.current_bead.is_none());
    }

    #[test]
    fn normalized_role_matches_persona_normalizer() {
        let agent = Agent::new("Ada", "Engineering Manager", "prov-1", "proj-1");
        assert_eq!(agent.normalized_role(), "engineering-manager");
    }
}
