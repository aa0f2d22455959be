//! Workflow engine: template-defined DAG execution per bead (spec.md §4.5).

mod engine;
mod error;
mod templates;

pub use engine::{EscalationInfo, WorkflowEngine};
pub use error::{WorkflowError, WorkflowResult};
pub use templates::{default_template_for, templates_by_type};
