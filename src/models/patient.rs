use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lenient::{self, value_text};

/// A patient record as served by the backend.
///
/// Fields the dashboard does not know about are kept in `extra` and sent
/// back untouched on update. Text fields accept numbers and booleans as
/// their text; `age` is kept exactly as sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    #[serde(default, deserialize_with = "lenient::string")]
    pub patient_id: String,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub age: Option<Value>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub gender: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub diagnosis: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub comorbidities: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub allergies: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub icd_notes: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub icd_pmh: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub labs: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub medication: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub refill_request_date: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_filled: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_visit: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub refill_history: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub refill_notes: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::date_part",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_processed_request_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Patient {
    pub fn new(patient_id: &str) -> Self {
        Self {
            patient_id: patient_id.to_string(),
            ..Self::default()
        }
    }

    /// String view of a named field, `None` when absent.
    /// Numbers are coerced to their decimal text.
    pub fn field_text(&self, field: &str) -> Option<String> {
        let text = |v: &Option<String>| v.clone();
        match field {
            "patient_id" => Some(self.patient_id.clone()),
            "name" => text(&self.name),
            "age" => self.age.as_ref().and_then(value_text),
            "gender" => text(&self.gender),
            "diagnosis" => text(&self.diagnosis),
            "comorbidities" => text(&self.comorbidities),
            "allergies" => text(&self.allergies),
            "icd_notes" => text(&self.icd_notes),
            "icd_pmh" => text(&self.icd_pmh),
            "labs" => text(&self.labs),
            "medication" => text(&self.medication),
            "refill_request_date" => text(&self.refill_request_date),
            "last_filled" => text(&self.last_filled),
            "last_visit" => text(&self.last_visit),
            "refill_history" => text(&self.refill_history),
            "refill_notes" => text(&self.refill_notes),
            "last_processed_request_date" => text(&self.last_processed_request_date),
            other => self.extra.get(other).and_then(value_text),
        }
    }

    /// Age in whole years when the stored value reads as one: a
    /// non-negative number, or text starting with digits.
    pub fn age_years(&self) -> Option<u32> {
        match self.age.as_ref()? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => lenient::leading_integer(s),
            _ => None,
        }
    }

    /// Display name, falling back to the ID for unnamed records.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.patient_id)
    }

    /// `true` once a refill request has been sent through batch processing.
    pub fn has_been_processed(&self) -> bool {
        self.last_processed_request_date
            .as_deref()
            .is_some_and(|d| !d.is_empty())
    }

    /// Copy of this record marked as processed for its current request.
    pub fn mark_processed(&self) -> Self {
        let mut updated = self.clone();
        updated.last_processed_request_date = self.refill_request_date.clone();
        updated
    }
}
