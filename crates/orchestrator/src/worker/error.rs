//! Errors surfaced by the worker action loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActionLoopError {
    /// The provider kept returning structurally invalid action
    /// envelopes past the retry budget (spec.md §4.8 step 2).
    #[error("provider returned an invalid action envelope {attempts} times: {last_error}")]
    StructuralFailure { attempts: u32, last_error: String },

    /// A provider call failed and could not be retried further
    /// (spec.md §7 "Transient provider error").
    #[error("provider call failed after retries: {0}")]
    ProviderExhausted(String),

    /// The cycle's cancellation token fired mid-loop.
    #[error("action loop cancelled")]
    Cancelled,
}

pub type ActionLoopResult<T> = std::result::Result<T, ActionLoopError>;
