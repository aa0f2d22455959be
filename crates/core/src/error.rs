//! Core error type shared across the workspace.

use thiserror::Error;

/// Workspace-wide error type for conditions that don't fit a more
/// specific crate-local error enum.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("JSON parse error")]
    JsonParseFailed {
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Unknown(String),
}

/// Workspace-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build an invalid-state error.
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    /// Build a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_factory() {
        let err = Error::invalid_state("bead already claimed");
        assert!(matches!(err, Error::InvalidState { .. }));
        assert!(err.to_string().contains("bead already claimed"));
    }

    #[test]
    fn not_found_factory() {
        let err = Error::not_found("agent a-1");
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
