//! Readiness gate: per-project capability check consulted by the
//! dispatcher before it considers that project's beads (spec.md §4.11).

use async_trait::async_trait;

/// How the dispatcher reacts to a failed readiness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessMode {
    /// Drop beads whose project is not ready; park the whole cycle if
    /// every ready project fails.
    Block,
    /// Record issues but do not skip beads.
    Warn,
}

/// Outcome of a readiness check for a project.
#[derive(Debug, Clone)]
pub struct ReadinessReport {
    pub ready: bool,
    pub issues: Vec<String>,
}

impl ReadinessReport {
    #[must_use]
    pub fn ready() -> Self {
        Self {
            ready: true,
            issues: Vec::new(),
        }
    }

    #[must_use]
    pub fn not_ready(issues: Vec<String>) -> Self {
        Self {
            ready: false,
            issues,
        }
    }
}

/// Per-project readiness predicate. Typical checks (spec.md §4.11):
/// the git working copy is writable and pointing at the right branch,
/// required credentials are present, the beads file is parseable.
#[async_trait]
pub trait ReadinessGate: Send + Sync {
    async fn check(&self, project_id: &str) -> ReadinessReport;
}

/// A gate that is always ready; used when no readiness checks are
/// configured.
#[derive(Debug, Clone, Default)]
pub struct AlwaysReady;

#[async_trait]
impl ReadinessGate for AlwaysReady {
    async fn check(&self, _project_id: &str) -> ReadinessReport {
        ReadinessReport::ready()
    }
}
