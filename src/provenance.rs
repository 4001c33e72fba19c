//! Decision-by provenance labels.
//!
//! `"AI"` means the model's verdict stands untouched. `"AI -> Dr. X"` marks
//! an escalation routed to (or confirmed by) reviewer X. `"AI + Dr. X"`
//! marks a verdict the reviewer changed.

use crate::models::{DecisionStatus, UserOut};
use crate::status::canonical_status;

pub const AI: &str = "AI";

/// Name shown after "Dr.", `"Unknown"` without a logged-in user.
pub fn reviewer_name(user: Option<&UserOut>) -> String {
    user.map(UserOut::full_name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Unknown".to_string())
}

pub fn escalated_to(reviewer: &str) -> String {
    format!("AI -> Dr. {reviewer}")
}

pub fn overridden_by(reviewer: &str) -> String {
    format!("AI + Dr. {reviewer}")
}

/// Provenance of a fresh AI verdict.
pub fn initial_decision_by(status: &str, reviewer: &str) -> String {
    if canonical_status(status) == Some(DecisionStatus::Escalate) {
        escalated_to(reviewer)
    } else {
        AI.to_string()
    }
}

/// Provenance after a reviewer edits an entry.
///
/// An entry the AI escalated and that is still escalated keeps the arrow.
/// Any other change of status (after normalization) or of reasoning is an
/// override. Otherwise the AI verdict stands.
pub fn reviewed_decision_by(
    original_status: &str,
    original_reasoning: Option<&str>,
    new_status: &str,
    new_reasoning: &str,
    reviewer: &str,
) -> String {
    let original = canonical_status(original_status);
    let current = canonical_status(new_status);

    let escalation_kept = original == Some(DecisionStatus::Escalate)
        && current == Some(DecisionStatus::Escalate);
    if escalation_kept {
        return escalated_to(reviewer);
    }

    let status_changed = match (original, current) {
        (Some(a), Some(b)) => a != b,
        _ => original_status != new_status,
    };
    let reasoning_changed = original_reasoning.unwrap_or("") != new_reasoning;

    if status_changed || reasoning_changed {
        overridden_by(reviewer)
    } else {
        AI.to_string()
    }
}

/// Only AI-originated entries may be edited by a reviewer.
pub fn is_ai_decision(decision_by: Option<&str>) -> bool {
    decision_by.map_or(true, |d| d.contains(AI))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserOut {
        UserOut {
            id: 7,
            email: "house@example.org".into(),
            first_name: "Gregory".into(),
            last_name: "House".into(),
            is_active: true,
        }
    }

    #[test]
    fn reviewer_name_defaults_to_unknown() {
        assert_eq!(reviewer_name(Some(&user())), "Gregory House");
        assert_eq!(reviewer_name(None), "Unknown");
    }

    #[test]
    fn fresh_escalation_routes_to_reviewer() {
        assert_eq!(initial_decision_by("escalate", "Gregory House"), "AI -> Dr. Gregory House");
        assert_eq!(initial_decision_by("approve", "Gregory House"), "AI");
        assert_eq!(initial_decision_by("unknown", "Gregory House"), "AI");
    }

    #[test]
    fn unchanged_entry_stays_ai() {
        let by = reviewed_decision_by("approve", Some("fine"), "Approved", "fine", "X");
        assert_eq!(by, "AI");
    }

    #[test]
    fn escalation_kept_uses_arrow_even_with_new_reasoning() {
        let by = reviewed_decision_by("escalate", Some("unsure"), "escalate", "called patient", "X");
        assert_eq!(by, "AI -> Dr. X");
    }

    #[test]
    fn status_change_is_override() {
        let by = reviewed_decision_by("escalate", Some("unsure"), "approve", "unsure", "X");
        assert_eq!(by, "AI + Dr. X");
        let by = reviewed_decision_by("approve", Some("ok"), "deny", "ok", "X");
        assert_eq!(by, "AI + Dr. X");
    }

    #[test]
    fn reasoning_change_is_override() {
        let by = reviewed_decision_by("deny", Some("labs old"), "deny", "labs very old", "X");
        assert_eq!(by, "AI + Dr. X");
    }

    #[test]
    fn missing_original_reasoning_matches_empty() {
        assert_eq!(reviewed_decision_by("approve", None, "approve", "", "X"), "AI");
    }

    #[test]
    fn editable_only_when_ai_involved() {
        assert!(is_ai_decision(Some("AI")));
        assert!(is_ai_decision(Some("AI + Dr. X")));
        assert!(is_ai_decision(None));
        assert!(!is_ai_decision(Some("Dr. X")));
    }
}
