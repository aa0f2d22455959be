//! In-memory agent registry satisfying spec.md §4.2.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::model::{Agent, AgentId, AgentStatus, ProviderId};
use crate::store::error::{StoreError, StoreResult};
use crate::store::provider_registry::ProviderRegistry;

/// Default staleness threshold before a `working` agent is considered
/// stuck and reset (spec.md §4.2: "default 5 minutes without a
/// heartbeat").
pub const DEFAULT_STUCK_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// Thread-safe in-memory agent registry. Per spec.md §5: "The Agent
/// Registry uses a single mutex for its map and short critical
/// sections" — here, a single `RwLock` around the map.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Arc<RwLock<HashMap<AgentId, Agent>>>,
}

impl AgentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, agent: Agent) {
        self.agents.write().await.insert(agent.id.clone(), agent);
    }

    pub async fn get(&self, id: &str) -> StoreResult<Agent> {
        self.agents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::AgentNotFound(id.to_string()))
    }

    /// Agents with status `idle` whose provider is active.
    pub async fn idle_by_project(
        &self,
        project_id: &str,
        providers: &ProviderRegistry,
    ) -> Vec<Agent> {
        let agents = self.agents.read().await;
        let mut idle = Vec::new();
        for agent in agents.values() {
            if agent.project_id != project_id || agent.status != AgentStatus::Idle {
                continue;
            }
            if providers.is_active(&agent.provider_id).await {
                idle.push(agent.clone());
            }
        }
        idle
    }

    /// Flip an agent to `working` and record its current bead.
    pub async fn assign(&self, agent_id: &str, bead_id: &str) -> StoreResult<Agent> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| StoreError::AgentNotFound(agent_id.to_string()))?;
        if let Some(current) = &agent.current_bead {
            if current != bead_id {
                return Err(StoreError::AgentAlreadyAssigned {
                    agent_id: agent_id.to_string(),
                    current: current.clone(),
                });
            }
        }
        agent.status = AgentStatus::Working;
        agent.current_bead = Some(bead_id.to_string());
        agent.last_heartbeat = Utc::now();
        Ok(agent.clone())
    }

    /// Flip an agent back to `idle` and clear its current bead.
    pub async fn release(&self, agent_id: &str) -> StoreResult<Agent> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| StoreError::AgentNotFound(agent_id.to_string()))?;
        agent.status = AgentStatus::Idle;
        agent.current_bead = None;
        agent.last_heartbeat = Utc::now();
        Ok(agent.clone())
    }

    /// Record a heartbeat without otherwise changing agent state.
    pub async fn heartbeat(&self, agent_id: &str) -> StoreResult<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| StoreError::AgentNotFound(agent_id.to_string()))?;
        agent.last_heartbeat = Utc::now();
        Ok(())
    }

    /// Move agents stuck in `working` past `older_than` back to `idle`
    /// and clear their current bead; un-pause paused agents whose
    /// providers became active again. Returns the ids reset.
    pub async fn reset_stuck(
        &self,
        older_than: Duration,
        providers: &ProviderRegistry,
    ) -> Vec<AgentId> {
        let now = Utc::now();
        let mut reset = Vec::new();
        let mut agents = self.agents.write().await;
        for agent in agents.values_mut() {
            match agent.status {
                AgentStatus::Working => {
                    let age = now.signed_duration_since(agent.last_heartbeat);
                    if age.to_std().map(|d| d >= older_than).unwrap_or(false) {
                        agent.status = AgentStatus::Idle;
                        agent.current_bead = None;
                        reset.push(agent.id.clone());
                    }
                }
                AgentStatus::Paused => {
                    if providers.is_active(&agent.provider_id).await {
                        agent.status = AgentStatus::Idle;
                        reset.push(agent.id.clone());
                    }
                }
                AgentStatus::Idle => {}
            }
        }
        reset
    }

    /// Pause an agent (e.g. because its provider went inactive).
    pub async fn pause(&self, agent_id: &str) -> StoreResult<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| StoreError::AgentNotFound(agent_id.to_string()))?;
        agent.status = AgentStatus::Paused;
        Ok(())
    }

    /// All agents bound to a given provider (used when a provider goes inactive).
    pub async fn by_provider(&self, provider_id: &ProviderId) -> Vec<Agent> {
        self.agents
            .read()
            .await
            .values()
            .filter(|a| &a.provider_id == provider_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Agent, Provider, ProviderStatus};

    async fn registry_with_active_provider() -> (AgentRegistry, ProviderRegistry) {
        let agents = AgentRegistry::new();
        let providers = ProviderRegistry::new();
        providers
            .register(Provider::new("prov-1", "anthropic", "https://x", "model"))
            .await;
        providers.set_status("prov-1", ProviderStatus::Active).await.unwrap();
        (agents, providers)
    }

    #[tokio::test]
    async fn idle_by_project_filters_inactive_providers() {
        let (agents, providers) = registry_with_active_provider().await;
        let a = Agent::new("A", "engineer", "prov-1", "proj-1");
        agents.register(a.clone()).await;

        let idle = agents.idle_by_project("proj-1", &providers).await;
        assert_eq!(idle.len(), 1);

        providers.set_status("prov-1", ProviderStatus::Inactive).await.unwrap();
        let idle = agents.idle_by_project("proj-1", &providers).await;
        assert!(idle.is_empty());
    }

    #[tokio::test]
    async fn assign_then_release_round_trips() {
        let (agents, _providers) = registry_with_active_provider().await;
        let a = Agent::new("A", "engineer", "prov-1", "proj-1");
        agents.register(a.clone()).await;

        agents.assign(&a.id, "bead-1").await.unwrap();
        let working = agents.get(&a.id).await.unwrap();
        assert_eq!(working.status, AgentStatus::Working);
        assert_eq!(working.current_bead.as_deref(), Some("bead-1"));

        agents.release(&a.id).await.unwrap();
        let idle = agents.get(&a.id).await.unwrap();
        assert_eq!(idle.status, AgentStatus::Idle);
        assert!(idle.current_bead.is_none());
    }

    #[tokio::test]
    async fn assign_to_different_bead_while_working_conflicts() {
        let (agents, _providers) = registry_with_active_provider().await;
        let a = Agent::new("A", "engineer", "prov-1", "proj-1");
        agents.register(a.clone()).await;
        agents.assign(&a.id, "bead-1").await.unwrap();
        let result = agents.assign(&a.id, "bead-2").await;
        assert!(matches!(result, Err(StoreError::AgentAlreadyAssigned { .. })));
    }

    #[tokio::test]
    async fn reset_stuck_moves_stale_working_agents_to_idle() {
        let (agents, providers) = registry_with_active_provider().await;
        let mut a = Agent::new("A", "engineer", "prov-1", "proj-1");
        a.status = AgentStatus::Working;
        a.current_bead = Some("bead-1".into());
        a.last_heartbeat = Utc::now() - chrono::Duration::minutes(10);
        agents.register(a.clone()).await;

        let reset = agents.reset_stuck(Duration::from_secs(300), &providers).await;
        assert_eq!(reset, vec![a.id.clone()]);
        let refreshed = agents.get(&a.id).await.unwrap();
        assert_eq!(refreshed.status, AgentStatus::Idle);
        assert!(refreshed.current_bead.is_none());
    }
}
