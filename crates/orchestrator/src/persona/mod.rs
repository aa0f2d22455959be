//! Persona matching: resolve a bracketed role hint on a bead against
//! idle agents (spec.md §4.4).

use regex::Regex;

use crate::model::Agent;

/// `[auto-filed]` is a system marker the auto-bug router stamps onto
/// regression reports, not a persona hint; it must not shadow a real
/// hint bracket elsewhere in the title.
const RESERVED_TAGS: &[&str] = &["auto-filed"];

/// Extract a role hint from a bracketed tag like `[engineering-manager]`
/// anywhere in the title, or from a tag of the same shape. Skips
/// [`RESERVED_TAGS`] so a system marker bracket doesn't get mistaken
/// for the persona hint.
#[must_use]
pub fn extract_hint(title: &str, tags: &[String]) -> Option<String> {
    let re = Regex::new(r"\[([a-zA-Z][a-zA-Z0-9_/() -]*)\]").ok()?;
    for caps in re.captures_iter(title) {
        let normalized = normalize_role(&caps[1]);
        if !RESERVED_TAGS.contains(&normalized.as_str()) {
            return Some(normalized);
        }
    }
    for tag in tags {
        if let Some(caps) = re.captures(tag) {
            let normalized = normalize_role(&caps[1]);
            if !RESERVED_TAGS.contains(&normalized.as_str()) {
                return Some(normalized);
            }
        }
    }
    None
}

/// Normalize a role string: lower-case, parentheses stripped, slashes
/// and whitespace collapsed to `-`, runs of `-` collapsed, trimmed.
/// Mirrors spec.md §4.4 step 2 exactly, and is also used for agent
/// role comparison so both sides normalize identically.
#[must_use]
pub fn normalize_role(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let no_parens: String = lowered.chars().filter(|c| *c != '(' && *c != ')').collect();
    let mut collapsed = String::with_capacity(no_parens.len());
    let mut last_was_sep = false;
    for ch in no_parens.chars() {
        let is_sep = ch == '/' || ch.is_whitespace() || ch == '-' || ch == '_';
        if is_sep {
            if !last_was_sep && !collapsed.is_empty() {
                collapsed.push('-');
            }
            last_was_sep = true;
        } else {
            collapsed.push(ch);
            last_was_sep = false;
        }
    }
    collapsed.trim_matches('-').to_string()
}

/// Find an idle agent whose normalized role equals the hint.
#[must_use]
pub fn match_agent<'a>(hint: &str, idle_agents: &'a [Agent]) -> Option<&'a Agent> {
    let normalized_hint = normalize_role(hint);
    idle_agents
        .iter()
        .find(|a| a.normalized_role() == normalized_hint)
}

/// Given a bead's title/tags and the idle agent pool, resolve an
/// assignment following spec.md §4.4:
/// 1. extract hint, 2. match by normalized role, 3. otherwise `None`
///    (caller may assign any idle agent).
#[must_use]
pub fn resolve<'a>(title: &str, tags: &[String], idle_agents: &'a [Agent]) -> Option<&'a Agent> {
    let hint = extract_hint(title, tags)?;
    match_agent(&hint, idle_agents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Agent;

    #[test]
    fn normalize_collapses_separators_and_parens() {
        assert_eq!(normalize_role("Engineering Manager"), "engineering-manager");
        assert_eq!(normalize_role("QA / Test (Lead)"), "qa-test-lead");
        assert_eq!(normalize_role("  backend_engineer  "), "backend-engineer");
    }

    #[test]
    fn extract_hint_from_title() {
        let hint = extract_hint("[web-designer] ReferenceError: foo", &[]);
        assert_eq!(hint.as_deref(), Some("web-designer"));
    }

    #[test]
    fn extract_hint_from_tags_when_title_has_none() {
        let hint = extract_hint("fix login button", &["[backend-engineer]".to_string()]);
        assert_eq!(hint.as_deref(), Some("backend-engineer"));
    }

    #[test]
    fn auto_filed_marker_does_not_shadow_a_real_hint() {
        let hint = extract_hint("[web-designer] [auto-filed] ReferenceError: foo", &[]);
        assert_eq!(hint.as_deref(), Some("web-designer"));
    }

    #[test]
    fn auto_filed_marker_alone_yields_no_hint() {
        assert!(extract_hint("[auto-filed] ReferenceError: foo", &[]).is_none());
    }

    #[test]
    fn no_hint_returns_none() {
        assert!(extract_hint("just a plain title", &[]).is_none());
    }

    #[test]
    fn resolve_finds_idle_agent_by_role() {
        let agents = vec![
            Agent::new("A", "QA Engineer", "p1", "proj"),
            Agent::new("B", "Engineering Manager", "p1", "proj"),
        ];
        let found = resolve("[engineering-manager] ship it", &[], &agents).unwrap();
        assert_eq!(found.display_name, "B");
    }

    #[test]
    fn resolve_returns_none_when_no_match() {
        let agents = vec![Agent::new("A", "QA Engineer", "p1", "proj")];
        assert!(resolve("[devops-engineer] deploy", &[], &agents).is_none());
    }
}
