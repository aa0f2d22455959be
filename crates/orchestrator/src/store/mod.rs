//! Persistence-shaped collaborators: the bead store, agent registry,
//! and provider registry. A concrete database is out of core scope
//! (spec.md §6); the in-memory implementations here are the ones the
//! dispatcher and its tests exercise.

mod agent_registry;
mod bead_store;
mod error;
mod provider_registry;

pub use agent_registry::{AgentRegistry, DEFAULT_STUCK_THRESHOLD};
pub use bead_store::{BeadChanges, BeadStore};
pub use error::{StoreError, StoreResult};
pub use provider_registry::ProviderRegistry;
