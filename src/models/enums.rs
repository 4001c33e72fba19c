use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Macro to generate a wire-string enum with as_str + std::str::FromStr
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ClientError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ClientError::Validation(format!(
                        "Invalid {}: {}",
                        stringify!($name),
                        s
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(ActionType {
    PrescriptionRefill => "Prescription Refill",
    IcdPrediction => "ICD Prediction",
});

// Canonical tokens persisted to the backend.
str_enum!(DecisionStatus {
    Approve => "approve",
    Deny => "deny",
    Escalate => "escalate",
});

str_enum!(IcdOutcome {
    Found => "Found",
    NoCodesFound => "No Codes Found",
});

str_enum!(ReadinessStatus {
    Incomplete => "Incomplete",
    Ready => "Ready",
    UpToDate => "Up-to-date",
});

impl DecisionStatus {
    /// Past-tense label shown next to a decision.
    pub fn display_label(&self) -> &'static str {
        match self {
            Self::Approve => "Approved",
            Self::Deny => "Denied",
            Self::Escalate => "Pending",
        }
    }
}

impl ReadinessStatus {
    /// Roster ordering: patients needing processing first.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Ready => 1,
            Self::Incomplete => 2,
            Self::UpToDate => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn action_type_uses_display_strings_on_the_wire() {
        let json = serde_json::to_string(&ActionType::PrescriptionRefill).unwrap();
        assert_eq!(json, "\"Prescription Refill\"");
        let parsed: ActionType = serde_json::from_str("\"ICD Prediction\"").unwrap();
        assert_eq!(parsed, ActionType::IcdPrediction);
    }

    #[test]
    fn decision_status_parses_canonical_tokens() {
        assert_eq!(DecisionStatus::from_str("approve").unwrap(), DecisionStatus::Approve);
        assert_eq!(DecisionStatus::from_str("escalate").unwrap(), DecisionStatus::Escalate);
        assert!(DecisionStatus::from_str("Approved").is_err());
    }

    #[test]
    fn decision_labels() {
        assert_eq!(DecisionStatus::Approve.display_label(), "Approved");
        assert_eq!(DecisionStatus::Deny.display_label(), "Denied");
        assert_eq!(DecisionStatus::Escalate.display_label(), "Pending");
    }

    #[test]
    fn readiness_priority_orders_ready_first() {
        assert!(ReadinessStatus::Ready.priority() < ReadinessStatus::Incomplete.priority());
        assert!(ReadinessStatus::Incomplete.priority() < ReadinessStatus::UpToDate.priority());
        assert_eq!(ReadinessStatus::UpToDate.to_string(), "Up-to-date");
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(ActionType::from_str("refill").is_err());
        assert!(IcdOutcome::from_str("").is_err());
    }
}
