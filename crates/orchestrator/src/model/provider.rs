//! The LLM provider: an external endpoint an agent is bound to.

use serde::{Deserialize, Serialize};

/// Stable identifier for a provider.
pub type ProviderId = String;

/// Provider lifecycle state. Only `Active` providers are eligible for
/// dispatch (spec.md invariant / P5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Pending,
    Active,
    Inactive,
    Failed,
}

impl ProviderStatus {
    /// `true` only for `Active`.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// An external LLM endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,
    pub provider_type: String,
    pub endpoint: String,
    pub status: ProviderStatus,
    pub model: String,
    pub capabilities: Vec<String>,
}

impl Provider {
    /// Create a new provider, pending until activated externally.
    #[must_use]
    pub fn new(
        id: impl Into<ProviderId>,
        provider_type: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            provider_type: provider_type.into(),
            endpoint: endpoint.into(),
            status: ProviderStatus::Pending,
            model: model.into(),
            capabilities: Vec::new(),
        }
    }
}
