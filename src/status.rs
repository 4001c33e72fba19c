//! Status normalization shared by every view.
//!
//! The backend stores refill verdicts as `approve` / `deny` / `escalate`.
//! Older rows and raw model output use other spellings ("Approved",
//! "pending", "Escalated"), so every comparison goes through
//! [`normalize_status_for_database`] first.

use serde::{Deserialize, Serialize};

use crate::models::DecisionStatus;

/// Maps any spelling to its canonical token. Unrecognized input is
/// returned unchanged.
pub fn normalize_status_for_database(status: &str) -> String {
    match canonical_status(status) {
        Some(canonical) => canonical.as_str().to_string(),
        None => {
            tracing::debug!(status, "Unrecognized status passed through");
            status.to_string()
        }
    }
}

/// Canonical decision for a status string, if it has one.
pub fn canonical_status(status: &str) -> Option<DecisionStatus> {
    let lower = status.to_lowercase();
    if lower.contains("approve") {
        Some(DecisionStatus::Approve)
    } else if lower.contains("deny") || lower == "denied" {
        Some(DecisionStatus::Deny)
    } else if lower.contains("escalate") || lower == "pending" {
        Some(DecisionStatus::Escalate)
    } else {
        None
    }
}

/// Display label: Approved / Denied / Pending, anything else unchanged.
pub fn format_status_for_ui(status: &str) -> String {
    match canonical_status(status) {
        Some(canonical) => canonical.display_label().to_string(),
        None => status.to_string(),
    }
}

pub fn is_approved_status(status: &str) -> bool {
    canonical_status(status) == Some(DecisionStatus::Approve)
}

pub fn is_denied_status(status: &str) -> bool {
    canonical_status(status) == Some(DecisionStatus::Deny)
}

pub fn is_escalated_status(status: &str) -> bool {
    canonical_status(status) == Some(DecisionStatus::Escalate)
}

/// Bucket a refill status falls into for filtering and analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusBucket {
    Approved,
    Denied,
    Review,
    Other,
}

impl StatusBucket {
    /// Canonical tokens first; free-text rows such as "Denied by pharmacist"
    /// or "review required" are matched on their wording.
    pub fn of(status: &str) -> Self {
        match canonical_status(status) {
            Some(DecisionStatus::Approve) => Self::Approved,
            Some(DecisionStatus::Deny) => Self::Denied,
            Some(DecisionStatus::Escalate) => Self::Review,
            None => {
                let lower = status.to_lowercase();
                if lower.contains("denied") {
                    Self::Denied
                } else if lower.contains("pending") || lower == "review required" {
                    Self::Review
                } else {
                    Self::Other
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "approve", "Approved", "APPROVE", "pre-approved", "deny", "Denied", "DENY", "escalate",
        "Escalated", "pending", "PENDING", "Found", "No Codes Found", "unknown", "", "pending review",
    ];

    #[test]
    fn anything_containing_approve_is_approve() {
        for s in ["approve", "Approved", "APPROVE", "auto-approve later", "reApProVed"] {
            assert_eq!(normalize_status_for_database(s), "approve", "{s}");
        }
    }

    #[test]
    fn deny_and_escalate_spellings() {
        assert_eq!(normalize_status_for_database("DENY"), "deny");
        assert_eq!(normalize_status_for_database("denied"), "deny");
        assert_eq!(normalize_status_for_database("Escalated"), "escalate");
        assert_eq!(normalize_status_for_database("Pending"), "escalate");
    }

    #[test]
    fn unknown_status_passes_through() {
        assert_eq!(normalize_status_for_database("Found"), "Found");
        assert_eq!(normalize_status_for_database(""), "");
        assert_eq!(format_status_for_ui("No Codes Found"), "No Codes Found");
    }

    #[test]
    fn normalization_is_idempotent() {
        for s in SAMPLES {
            let once = normalize_status_for_database(s);
            assert_eq!(normalize_status_for_database(&once), once, "{s}");
        }
    }

    #[test]
    fn display_is_stable_under_normalization() {
        for s in SAMPLES {
            assert_eq!(
                format_status_for_ui(&normalize_status_for_database(s)),
                format_status_for_ui(s),
                "{s}"
            );
        }
    }

    #[test]
    fn display_labels() {
        assert_eq!(format_status_for_ui("approve"), "Approved");
        assert_eq!(format_status_for_ui("deny"), "Denied");
        assert_eq!(format_status_for_ui("escalate"), "Pending");
    }

    #[test]
    fn predicates_agree_with_normalization() {
        assert!(is_approved_status("Approved"));
        assert!(is_denied_status("denied"));
        assert!(is_escalated_status("pending"));
        assert!(!is_escalated_status("Found"));
    }

    #[test]
    fn buckets() {
        assert_eq!(StatusBucket::of("approve"), StatusBucket::Approved);
        assert_eq!(StatusBucket::of("Denied by pharmacist"), StatusBucket::Denied);
        assert_eq!(StatusBucket::of("review required"), StatusBucket::Review);
        assert_eq!(StatusBucket::of("Pending review"), StatusBucket::Review);
        assert_eq!(StatusBucket::of("Found"), StatusBucket::Other);
    }
}
