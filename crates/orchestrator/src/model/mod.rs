//! Core data types: beads, agents, providers, and workflow templates.

mod agent;
mod bead;
mod provider;
mod workflow;

pub use agent::{Agent, AgentId, AgentStatus};
pub use bead::{Bead, BeadId, BeadStatus, BeadType, Priority};
pub use provider::{Provider, ProviderId, ProviderStatus};
pub use workflow::{
    EdgeCondition, ExecutionId, ExecutionStatus, NodeType, TemplateId, WorkflowEdge,
    WorkflowExecution, WorkflowNode, WorkflowTemplate,
};
