//! Errors raised by the bead store, agent registry, and provider registry.

use thiserror::Error;

/// Errors from [`super::bead_store::BeadStore`], [`super::agent_registry::AgentRegistry`],
/// and [`super::provider_registry::ProviderRegistry`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// `Claim` found the bead already bound to an agent (spec.md §4.1,
    /// §7 "State conflict" — not an error upstream, logged at INFO and
    /// the cycle moves on).
    #[error("bead {bead_id} is already claimed")]
    AlreadyClaimed { bead_id: String },

    #[error("bead {0} not found")]
    BeadNotFound(String),

    #[error("agent {0} not found")]
    AgentNotFound(String),

    #[error("provider {0} not found")]
    ProviderNotFound(String),

    #[error("agent {agent_id} already has a current bead ({current})")]
    AgentAlreadyAssigned { agent_id: String, current: String },
}

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
