//! In-memory provider registry satisfying spec.md §4.3 (implied) and
//! the "Active/inactive state is toggled externally; dispatcher only
//! consumes it" contract of spec.md §6.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::model::{Provider, ProviderId, ProviderStatus};
use crate::store::error::{StoreError, StoreResult};

/// Thread-safe in-memory provider registry.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Arc<RwLock<HashMap<ProviderId, Provider>>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, provider: Provider) {
        self.providers
            .write()
            .await
            .insert(provider.id.clone(), provider);
    }

    pub async fn get(&self, id: &str) -> StoreResult<Provider> {
        self.providers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::ProviderNotFound(id.to_string()))
    }

    pub async fn is_active(&self, id: &str) -> bool {
        self.providers
            .read()
            .await
            .get(id)
            .map(|p| p.status.is_active())
            .unwrap_or(false)
    }

    pub async fn set_status(&self, id: &str, status: ProviderStatus) -> StoreResult<()> {
        let mut providers = self.providers.write().await;
        let provider = providers
            .get_mut(id)
            .ok_or_else(|| StoreError::ProviderNotFound(id.to_string()))?;
        provider.status = status;
        Ok(())
    }

    /// `true` if at least one registered provider is active (spec.md
    /// §4.7 step 1: "If there are no active providers, ... park").
    pub async fn has_active(&self) -> bool {
        self.providers
            .read()
            .await
            .values()
            .any(|p| p.status.is_active())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn has_active_reflects_status_changes() {
        let registry = ProviderRegistry::new();
        assert!(!registry.has_active().await);

        registry
            .register(Provider::new("p1", "anthropic", "https://x", "model"))
            .await;
        assert!(!registry.has_active().await);

        registry.set_status("p1", ProviderStatus::Active).await.unwrap();
        assert!(registry.has_active().await);

        registry.set_status("p1", ProviderStatus::Inactive).await.unwrap();
        assert!(!registry.has_active().await);
    }
}
