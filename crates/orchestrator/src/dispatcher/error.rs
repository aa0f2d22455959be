//! Errors surfaced by a dispatch cycle.

use thiserror::Error;

use crate::store::StoreError;
use crate::workflow_engine::WorkflowError;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("store error during dispatch: {0}")]
    Store(#[from] StoreError),

    #[error("workflow error during dispatch: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("no workspace registered for project '{0}'")]
    NoWorkspace(String),

    #[error("no provider client registered for provider '{0}'")]
    NoProviderClient(String),
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
