//! Request and response payloads of the decision-support endpoints.
//!
//! The backend owns the decisioning; these types only shape what is sent
//! and pick out the handful of fields the dashboard reads back.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::patient::Patient;

const NOT_SPECIFIED: &str = "Not specified";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefillRequest {
    pub patient_id: String,
    pub medication: String,
    pub refill_request_date: String,
    pub last_filled: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientContext {
    pub last_visit: String,
    pub labs: String,
    pub diagnosis: String,
    pub notes: String,
    pub age: Value,
    pub gender: String,
    pub allergies: String,
    pub comorbidities: String,
    pub refill_history: String,
}

/// Body of `POST /api/v1/evaluate-refill`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefillRequestPayload {
    pub refill_request: RefillRequest,
    pub patient_context: PatientContext,
}

/// Body of `POST /api/v1/predict-icd`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcdRequestPayload {
    pub note: String,
    pub age: Value,
    pub sex: String,
    pub past_medical_history: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedPatientRequest {
    pub icd_request_data: IcdRequestPayload,
    pub refill_request_data: RefillRequestPayload,
}

/// Body of `POST /api/v1/combined_icd_refill`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedRequest {
    pub patients: Vec<CombinedPatientRequest>,
}

fn or_default(value: &Option<String>, fallback: &str) -> String {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Age as a number when it reads as whole years, else the stored text,
/// else `fallback`.
fn age_value(patient: &Patient, fallback: Option<&str>) -> Value {
    if let Some(years) = patient.age_years() {
        return Value::from(years);
    }
    let text = patient
        .field_text("age")
        .filter(|t| !t.trim().is_empty());
    match (text, fallback) {
        (Some(text), _) => Value::String(text),
        (None, Some(fallback)) => Value::String(fallback.to_string()),
        (None, None) => Value::Null,
    }
}

impl RefillRequestPayload {
    /// Single-patient evaluation: today's date is the request date and
    /// blanks are sent as "Not specified".
    pub fn for_analysis(patient: &Patient, today: NaiveDate) -> Self {
        let ns = |v: &Option<String>| or_default(v, NOT_SPECIFIED);
        Self {
            refill_request: RefillRequest {
                patient_id: patient.patient_id.clone(),
                medication: ns(&patient.medication),
                refill_request_date: today.format("%Y-%m-%d").to_string(),
                last_filled: ns(&patient.last_filled),
            },
            patient_context: PatientContext {
                last_visit: ns(&patient.last_visit),
                labs: ns(&patient.labs),
                diagnosis: ns(&patient.diagnosis),
                notes: ns(&patient.refill_notes),
                age: age_value(patient, Some(NOT_SPECIFIED)),
                gender: ns(&patient.gender),
                allergies: ns(&patient.allergies),
                comorbidities: ns(&patient.comorbidities),
                refill_history: ns(&patient.refill_history),
            },
        }
    }

    /// Batch evaluation: the stored request date is used as-is.
    pub fn for_batch(patient: &Patient) -> Self {
        let blank = |v: &Option<String>| or_default(v, "");
        Self {
            refill_request: RefillRequest {
                patient_id: patient.patient_id.clone(),
                medication: blank(&patient.medication),
                refill_request_date: blank(&patient.refill_request_date),
                last_filled: blank(&patient.last_filled),
            },
            patient_context: PatientContext {
                last_visit: blank(&patient.last_visit),
                labs: blank(&patient.labs),
                diagnosis: blank(&patient.diagnosis),
                notes: blank(&patient.refill_notes),
                age: age_value(patient, None),
                gender: blank(&patient.gender),
                allergies: blank(&patient.allergies),
                comorbidities: blank(&patient.comorbidities),
                refill_history: blank(&patient.refill_history),
            },
        }
    }
}

impl IcdRequestPayload {
    pub fn for_analysis(patient: &Patient) -> Self {
        Self {
            note: or_default(&patient.icd_notes, "No clinical notes available"),
            age: age_value(patient, Some(NOT_SPECIFIED)),
            sex: or_default(&patient.gender, NOT_SPECIFIED),
            past_medical_history: or_default(&patient.icd_pmh, "none"),
        }
    }

    pub fn for_batch(patient: &Patient) -> Self {
        Self {
            note: or_default(&patient.icd_notes, ""),
            age: age_value(patient, None),
            sex: or_default(&patient.gender, ""),
            past_medical_history: or_default(&patient.comorbidities, ""),
        }
    }
}

impl CombinedRequest {
    pub fn for_patients(patients: &[Patient]) -> Self {
        Self {
            patients: patients
                .iter()
                .map(|p| CombinedPatientRequest {
                    icd_request_data: IcdRequestPayload::for_batch(p),
                    refill_request_data: RefillRequestPayload::for_batch(p),
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefillDecision {
    #[serde(default)]
    pub decision: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response of `evaluate-refill`. Older backends nest the verdict under
/// `refill_decision`, newer ones return it at the top level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefillEvaluation {
    #[serde(default)]
    pub refill_decision: Option<RefillDecision>,
    #[serde(default)]
    pub decision: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RefillEvaluation {
    /// Raw verdict string, `"unknown"` when the backend sent none.
    pub fn raw_decision(&self) -> String {
        self.refill_decision
            .as_ref()
            .and_then(|d| d.decision.clone())
            .or_else(|| self.decision.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn reasoning(&self) -> Option<String> {
        self.reason.clone().or_else(|| {
            self.refill_decision
                .as_ref()
                .and_then(|d| d.reason.clone())
        })
    }
}

impl RefillDecision {
    pub fn raw_decision(&self) -> String {
        self.decision
            .clone()
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IcdPrediction {
    #[serde(default)]
    pub icd_code: String,
    #[serde(default)]
    pub justification: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response of `predict-icd`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IcdPredictionResponse {
    #[serde(default)]
    pub predictions: Option<Vec<IcdPrediction>>,
}

impl IcdPredictionResponse {
    pub fn has_codes(&self) -> bool {
        self.predictions.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// Codes joined with `", "`, `None` when the field was absent.
    pub fn joined_codes(&self) -> Option<String> {
        self.predictions.as_ref().map(|preds| {
            preds
                .iter()
                .map(|p| p.icd_code.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        })
    }

    /// Justifications joined with `" | "`, `None` when the field was absent.
    pub fn joined_justifications(&self) -> Option<String> {
        self.predictions.as_ref().map(|preds| {
            preds
                .iter()
                .map(|p| p.justification.as_str())
                .collect::<Vec<_>>()
                .join(" | ")
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedResult {
    #[serde(default)]
    pub refill_decision: Option<RefillDecision>,
    #[serde(default)]
    pub icd_prediction: Option<IcdPredictionResponse>,
}

/// Response of `combined_icd_refill`; `results[i]` belongs to `patients[i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedResponse {
    #[serde(default)]
    pub results: Vec<CombinedResult>,
}
