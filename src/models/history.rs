use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::enums::ActionType;
use super::lenient;

/// One audit record of an AI or reviewer decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub patient_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub action_type: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub medication: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub status: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub decision_by: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub icd_codes: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub reasoning: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub original_status: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub original_reasoning: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub timestamp: Option<String>,
}

impl HistoryEntry {
    pub fn action(&self) -> Option<ActionType> {
        self.action_type.parse().ok()
    }

    pub fn is_refill(&self) -> bool {
        self.action() == Some(ActionType::PrescriptionRefill)
    }

    pub fn is_icd(&self) -> bool {
        self.action() == Some(ActionType::IcdPrediction)
    }

    /// Parsed timestamp. Accepts RFC 3339 and naive `YYYY-MM-DDTHH:MM:SS[.f]`
    /// (treated as UTC, which is what the backend stores).
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = self.timestamp.as_deref()?.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    /// Calendar date of the entry in the local time zone.
    pub fn local_date(&self) -> Option<chrono::NaiveDate> {
        self.parsed_timestamp()
            .map(|dt| dt.with_timezone(&Local).date_naive())
    }

    /// ICD codes split on commas, trimmed, blanks dropped.
    pub fn icd_code_list(&self) -> Vec<String> {
        self.icd_codes
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Body of `POST /api/v1/history/batch`, one element per decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHistoryEntry {
    pub user_id: i64,
    pub patient_id: String,
    pub action_type: ActionType,
    pub medication: String,
    pub status: String,
    pub decision_by: String,
    pub icd_codes: Option<String>,
    pub reasoning: Option<String>,
    pub original_status: String,
    pub original_reasoning: Option<String>,
}

/// Body of `PATCH /api/v1/history/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryUpdate {
    pub status: String,
    pub reasoning: String,
    pub decision_by: String,
}
