//! Errors raised by the workflow engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("execution {0} not found")]
    ExecutionNotFound(String),

    #[error("template {0} not found")]
    TemplateNotFound(String),

    #[error("execution {0} is already terminal")]
    AlreadyTerminal(String),

    #[error("node {0} not found in template")]
    NodeNotFound(String),
}

pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;
