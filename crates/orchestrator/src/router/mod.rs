//! Auto-bug router: tags incoming failure reports with a persona hint
//! (spec.md §4.3).

use crate::model::{Bead, Priority};
use crate::persona;

/// A single pattern → persona mapping.
struct Rule {
    needle: &'static str,
    persona: &'static str,
}

/// Fixed mapping from failure-text fragments to persona hints. Order
/// matters: the first matching rule wins.
const RULES: &[Rule] = &[
    Rule {
        needle: "referenceerror",
        persona: "web-designer",
    },
    Rule {
        needle: "typeerror",
        persona: "web-designer",
    },
    Rule {
        needle: "panic:",
        persona: "backend-engineer",
    },
    Rule {
        needle: "goroutine",
        persona: "backend-engineer",
    },
    Rule {
        needle: "nullpointerexception",
        persona: "backend-engineer",
    },
    Rule {
        needle: "build failed",
        persona: "devops-engineer",
    },
    Rule {
        needle: "pipeline failed",
        persona: "devops-engineer",
    },
    Rule {
        needle: "docker",
        persona: "devops-engineer",
    },
    Rule {
        needle: "sql",
        persona: "database-engineer",
    },
    Rule {
        needle: "migration failed",
        persona: "database-engineer",
    },
];

/// Match `text` (title + description, lower-cased) against the fixed
/// mapping and return the first matching persona.
#[must_use]
pub fn classify(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    RULES
        .iter()
        .find(|rule| lowered.contains(rule.needle))
        .map(|rule| rule.persona)
}

/// Apply the router to a bead: if a rule matches and the bead has no
/// explicit persona hint already, prepend `[<persona>]` to the title.
/// Idempotent (R1): running this twice on the same bead is a no-op the
/// second time, because [`persona::extract_hint`] finds the hint that
/// was just written and the "no explicit hint" guard short-circuits.
///
/// Returns `Some(new_title)` if the title changed.
#[must_use]
pub fn route(bead: &Bead) -> Option<String> {
    if persona::extract_hint(&bead.title, &bead.tags).is_some() {
        return None;
    }
    let haystack = format!("{} {}", bead.title, bead.description);
    let persona = classify(&haystack)?;
    Some(format!("[{persona}] {}", bead.title))
}

/// P0 beads are normally excluded from a later dispatch pass, but
/// auto-filed ones are the deliberate exception (spec.md §4.3, §4.7
/// step 5, P8).
#[must_use]
pub fn is_auto_filed(bead: &Bead) -> bool {
    bead.title.contains("[auto-filed]")
}

/// Convenience: `true` when a P0 bead should still be dispatched
/// despite the general P0 bypass.
#[must_use]
pub fn bypasses_p0_hold(bead: &Bead) -> bool {
    bead.priority == Priority::P0 && is_auto_filed(bead)
}
