//! The LLM provider collaborator contract (spec.md §6 "Provider").

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Conversation roles accepted by [`Provider::complete_chat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in the accumulated conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Per-call overrides. Empty today; reserved for temperature, max
/// tokens, etc. which are provider-specific and out of core scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatOptions {
    pub max_output_tokens: Option<u32>,
}

/// Successful provider response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOutcome {
    pub text: String,
    pub tokens_used: u32,
    pub finish_reason: String,
}

/// Taxonomy mirrors spec.md §7: transient (network/5xx/rate-limit,
/// retried by the caller) vs. everything else treated as terminal for
/// this call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("provider call was cancelled")]
    Cancelled,

    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// External LLM endpoint contract (spec.md §6). Real implementations
/// (Anthropic, OpenAI, ...) are out of core scope; [`EchoProvider`]
/// below is a deterministic local default so the binary has something
/// to dispatch against without network credentials.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn complete_chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatOutcome, ProviderError>;

    async fn list_models(&self) -> Result<Vec<String>, ProviderError>;

    async fn health_check(&self) -> bool;
}

/// A provider that always answers its first turn with `done`. Used as
/// the built-in default so `dispatchd` can run end-to-end locally
/// without a configured LLM endpoint; never routes network calls.
#[derive(Debug, Clone, Default)]
pub struct EchoProvider;

#[async_trait]
impl Provider for EchoProvider {
    async fn complete_chat(
        &self,
        _model: &str,
        _messages: &[ChatMessage],
        _options: &ChatOptions,
    ) -> Result<ChatOutcome, ProviderError> {
        Ok(ChatOutcome {
            text: "{\"type\":\"done\",\"reason\":\"echo provider has no real work to do\"}".to_string(),
            tokens_used: 0,
            finish_reason: "stop".to_string(),
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(vec!["echo-1".to_string()])
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_provider_always_emits_a_done_action() {
        let provider = EchoProvider;
        let outcome = provider
            .complete_chat("echo-1", &[], &ChatOptions::default())
            .await
            .unwrap();
        assert!(outcome.text.contains("\"type\":\"done\""));
        assert!(provider.health_check().await);
    }
}
