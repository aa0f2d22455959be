//! Motivation engine: periodic triggers that synthesize new beads from
//! observed conditions (spec.md §4.10).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;

use crate::events::{Event, EventBus, Topic};
use crate::model::{Bead, BeadType, Priority};
use crate::store::BeadStore;

/// Default cooldown between firings of the same motivation (spec.md
/// §4.10: "default 5 min per motivation").
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// A predicate-plus-action rule. Implementors observe system state and
/// decide whether to synthesize a bead.
#[async_trait]
pub trait Motivation: Send + Sync {
    /// Stable name, used as the cooldown key.
    fn name(&self) -> &str;

    /// Evaluate the predicate; return `Some(bead seed)` to fire.
    async fn evaluate(&self) -> Option<(String, String, Priority, BeadType, String)>;
}

/// Drives a set of [`Motivation`]s on a cooldown, creating beads in the
/// store and publishing `motivation.fired` when one fires.
pub struct MotivationEngine {
    motivations: Vec<Arc<dyn Motivation>>,
    store: BeadStore,
    events: EventBus,
    cooldown: Duration,
    last_fired: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
}

impl MotivationEngine {
    #[must_use]
    pub fn new(store: BeadStore, events: EventBus) -> Self {
        Self {
            motivations: Vec::new(),
            store,
            events,
            cooldown: DEFAULT_COOLDOWN,
            last_fired: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn register(&mut self, motivation: Arc<dyn Motivation>) {
        self.motivations.push(motivation);
    }

    /// Evaluate every registered motivation once. Motivations inside
    /// their cooldown window are skipped. Returns the beads created
    /// this tick.
    pub async fn tick(&self) -> Vec<Bead> {
        let mut created = Vec::new();
        for motivation in &self.motivations {
            if self.in_cooldown(motivation.name()).await {
                continue;
            }
            if let Some((title, description, priority, bead_type, project_id)) =
                motivation.evaluate().await
            {
                let bead = self
                    .store
                    .create(title, description, priority, bead_type, project_id)
                    .await;
                self.events.publish(Event::new(
                    Topic::MotivationFired,
                    serde_json::json!({"motivation": motivation.name(), "bead_id": bead.id}),
                ));
                info!(motivation = motivation.name(), bead_id = %bead.id, "motivation fired");
                self.last_fired
                    .write()
                    .await
                    .insert(motivation.name().to_string(), Utc::now());
                created.push(bead);
            }
        }
        created
    }

    async fn in_cooldown(&self, name: &str) -> bool {
        let last_fired = self.last_fired.read().await;
        match last_fired.get(name) {
            Some(at) => {
                let elapsed = Utc::now().signed_duration_since(*at);
                elapsed.to_std().map(|d| d < self.cooldown).unwrap_or(false)
            }
            None => false,
        }
    }
}

/// Fires once whenever no ready beads exist for a project, creating a
/// low-priority exploratory task. Grounded on spec.md §4.10's "idle
/// system" detector.
pub struct IdleSystemMotivation {
    pub project_id: String,
    pub store: BeadStore,
}

#[async_trait]
impl Motivation for IdleSystemMotivation {
    fn name(&self) -> &str {
        "idle-system"
    }

    async fn evaluate(&self) -> Option<(String, String, Priority, BeadType, String)> {
        let ready = self.store.list_ready(Some(&self.project_id)).await;
        if ready.is_empty() {
            Some((
                "Idle system: survey backlog for follow-up work".to_string(),
                "No ready beads were found; the motivation engine is proposing exploratory work."
                    .to_string(),
                Priority::P3,
                BeadType::Task,
                self.project_id.clone(),
            ))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn idle_system_motivation_fires_when_no_ready_beads() {
        let store = BeadStore::new();
        let events = EventBus::new();
        let mut engine = MotivationEngine::new(store.clone(), events);
        engine.register(Arc::new(IdleSystemMotivation {
            project_id: "proj-1".to_string(),
            store: store.clone(),
        }));

        let created = engine.tick().await;
        assert_eq!(created.len(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn cooldown_suppresses_repeated_firing() {
        let store = BeadStore::new();
        let events = EventBus::new();
        let mut engine = MotivationEngine::new(store.clone(), events)
            .with_cooldown(Duration::from_secs(3600));
        engine.register(Arc::new(IdleSystemMotivation {
            project_id: "proj-1".to_string(),
            store: store.clone(),
        }));

        engine.tick().await;
        let second = engine.tick().await;
        assert!(second.is_empty(), "cooldown should suppress the second firing");
    }

    #[tokio::test]
    async fn motivation_does_not_fire_when_ready_beads_exist() {
        let store = BeadStore::new();
        store
            .create("t", "d", Priority::P2, BeadType::Task, "proj-1")
            .await;
        let events = EventBus::new();
        let mut engine = MotivationEngine::new(store.clone(), events);
        engine.register(Arc::new(IdleSystemMotivation {
            project_id: "proj-1".to_string(),
            store: store.clone(),
        }));

        let created = engine.tick().await;
        assert!(created.is_empty());
    }
}
