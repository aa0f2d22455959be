//! Loop detector: distinguishes productive iteration from stuck
//! repetition (spec.md §4.6).

use serde::{Deserialize, Serialize};

/// Bounded length of the per-bead dispatch history (spec.md §3: "last
/// N (N=20) agent ids").
pub const HISTORY_RETENTION: usize = 20;

/// Number of trailing entries inspected for the alternation pattern.
const ALTERNATION_WINDOW: usize = 6;

/// Verdict of a loop classification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopVerdict {
    Productive,
    Stuck { reason: String },
}

impl LoopVerdict {
    #[must_use]
    pub fn is_stuck(&self) -> bool {
        matches!(self, Self::Stuck { .. })
    }
}

/// Rolling history of the agent ids that have handled a bead, bounded
/// to [`HISTORY_RETENTION`] entries. Stored as JSON in the bead's
/// context map under `dispatch_history` per spec.md §3.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchHistory {
    entries: Vec<String>,
}

impl DispatchHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from the JSON stored in a bead's context map. An absent
    /// or unparsable value is treated as an empty history.
    #[must_use]
    pub fn from_context_json(raw: Option<&str>) -> Self {
        raw.and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default()
    }

    /// Serialize back to the JSON form stored in context.
    #[must_use]
    pub fn to_context_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "[]".to_string())
    }

    /// Record a dispatch to `agent_id`, truncating to the retention
    /// window.
    pub fn push(&mut self, agent_id: impl Into<String>) {
        self.entries.push(agent_id.into());
        if self.entries.len() > HISTORY_RETENTION {
            let overflow = self.entries.len() - HISTORY_RETENTION;
            self.entries.drain(0..overflow);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

/// Classify a dispatch history for the two-agent ping-pong pattern
/// (spec.md §4.6, P3):
///
/// - require at least 6 entries
/// - take the last 6; if they contain exactly two distinct agent ids
///   and strictly alternate (A,B,A,B,A,B), the bead is stuck.
///
/// The action-signature-based variant (Epic 7, Task 2) is recommended
/// but not mandated by spec.md; [`classify_action_signatures`] below
/// implements it for callers that track per-turn action kinds.
#[must_use]
pub fn classify(history: &DispatchHistory) -> LoopVerdict {
    if history.len() < ALTERNATION_WINDOW {
        return LoopVerdict::Productive;
    }
    let window = &history.entries()[history.len() - ALTERNATION_WINDOW..];
    let distinct: std::collections::HashSet<&String> = window.iter().collect();
    if distinct.len() != 2 {
        return LoopVerdict::Productive;
    }
    let a = &window[0];
    let b = &window[1];
    if a == b {
        return LoopVerdict::Productive;
    }
    let alternates = window
        .iter()
        .enumerate()
        .all(|(i, id)| if i % 2 == 0 { id == a } else { id == b });
    if alternates {
        LoopVerdict::Stuck {
            reason: "dispatch alternated between two agents for 6 runs".to_string(),
        }
    } else {
        LoopVerdict::Productive
    }
}

/// A single (action-kind, progress-metric) observation inside the
/// worker action loop, used by the recommended action-signature
/// variant.
#[derive(Debug, Clone)]
pub struct ActionObservation {
    pub action_kind: String,
    pub progress_delta: u32,
}

/// Recommended variant (spec.md §4.6, "Epic 7, Task 2"): if the same
/// action kind repeats at least `repeat_threshold` times consecutively
/// and no observation in that run advanced any progress metric,
/// classify as stuck.
#[must_use]
pub fn classify_action_signatures(
    observations: &[ActionObservation],
    repeat_threshold: usize,
) -> LoopVerdict {
    if observations.len() < repeat_threshold {
        return LoopVerdict::Productive;
    }
    let tail = &observations[observations.len() - repeat_threshold..];
    let first_kind = &tail[0].action_kind;
    let same_kind = tail.iter().all(|o| &o.action_kind == first_kind);
    let no_progress = tail.iter().all(|o| o.progress_delta == 0);
    if same_kind && no_progress {
        LoopVerdict::Stuck {
            reason: format!(
                "action '{first_kind}' repeated {repeat_threshold} times with no progress"
            ),
        }
    } else {
        LoopVerdict::Productive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fewer_than_six_entries_is_never_stuck() {
        let mut h = DispatchHistory::new();
        for _ in 0..5 {
            h.push("agent-a");
        }
        assert_eq!(classify(&h), LoopVerdict::Productive);
    }

    #[test]
    fn strict_alternation_is_stuck() {
        let mut h = DispatchHistory::new();
        for agent in ["a", "b", "a", "b", "a", "b"] {
            h.push(agent);
        }
        let verdict = classify(&h);
        assert!(verdict.is_stuck());
        if let LoopVerdict::Stuck { reason } = verdict {
            assert_eq!(reason, "dispatch alternated between two agents for 6 runs");
        }
    }

    #[test]
    fn three_distinct_agents_is_not_stuck() {
        let mut h = DispatchHistory::new();
        for agent in ["a", "b", "c", "a", "b", "c"] {
            h.push(agent);
        }
        assert_eq!(classify(&h), LoopVerdict::Productive);
    }

    #[test]
    fn same_agent_repeated_is_not_ping_pong() {
        let mut h = DispatchHistory::new();
        for _ in 0..6 {
            h.push("a");
        }
        assert_eq!(classify(&h), LoopVerdict::Productive);
    }

    #[test]
    fn non_alternating_two_agents_is_not_stuck() {
        let mut h = DispatchHistory::new();
        for agent in ["a", "a", "b", "a", "b", "b"] {
            h.push(agent);
        }
        assert_eq!(classify(&h), LoopVerdict::Productive);
    }

    #[test]
    fn history_truncates_to_retention_window() {
        let mut h = DispatchHistory::new();
        for i in 0..(HISTORY_RETENTION + 5) {
            h.push(format!("agent-{i}"));
        }
        assert_eq!(h.len(), HISTORY_RETENTION);
        assert_eq!(h.entries()[0], "agent-5");
    }

    #[test]
    fn context_json_round_trips() {
        let mut h = DispatchHistory::new();
        h.push("a");
        h.push("b");
        let json = h.to_context_json();
        let restored = DispatchHistory::from_context_json(Some(&json));
        assert_eq!(restored.entries(), h.entries());
    }

    #[test]
    fn missing_context_json_is_empty_history() {
        let restored = DispatchHistory::from_context_json(None);
        assert!(restored.is_empty());
    }

    #[test]
    fn action_signature_repeat_without_progress_is_stuck() {
        let obs: Vec<_> = (0..3)
            .map(|_| ActionObservation {
                action_kind: "bash".to_string(),
                progress_delta: 0,
            })
            .collect();
        assert!(classify_action_signatures(&obs, 3).is_stuck());
    }

    #[test]
    fn action_signature_repeat_with_progress_is_productive() {
        let obs = vec![
            ActionObservation {
                action_kind: "bash".to_string(),
                progress_delta: 0,
            },
            ActionObservation {
                action_kind: "bash".to_string(),
                progress_delta: 1,
            },
            ActionObservation {
                action_kind: "bash".to_string(),
                progress_delta: 0,
            },
        ];
        assert!(!classify_action_signatures(&obs, 3).is_stuck());
    }
}
