//! Patient readiness classification.
//!
//! Recomputed from the current snapshot on every render; the backend keeps
//! no status column that this logic trusts.

use serde::{Deserialize, Serialize};

use crate::models::{Patient, ReadinessStatus};

/// Fields that must be non-blank before a patient can be sent for a decision.
pub const REQUIRED_FIELDS: [&str; 14] = [
    "patient_id",
    "name",
    "age",
    "gender",
    "diagnosis",
    "comorbidities",
    "allergies",
    "icd_notes",
    "labs",
    "medication",
    "refill_request_date",
    "last_filled",
    "refill_history",
    "refill_notes",
];

/// Required fields that are missing or blank, in declaration order.
pub fn missing_fields(patient: &Patient) -> Vec<&'static str> {
    REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| {
            patient
                .field_text(field)
                .map_or(true, |value| value.trim().is_empty())
        })
        .collect()
}

pub fn is_patient_ready(patient: &Patient) -> bool {
    missing_fields(patient).is_empty()
}

/// Incomplete, Ready (never processed, or request date moved since the last
/// run), or Up-to-date.
pub fn patient_status(patient: &Patient) -> ReadinessStatus {
    if !is_patient_ready(patient) {
        return ReadinessStatus::Incomplete;
    }
    if !patient.has_been_processed() {
        return ReadinessStatus::Ready;
    }
    if patient.last_processed_request_date != patient.refill_request_date {
        ReadinessStatus::Ready
    } else {
        ReadinessStatus::UpToDate
    }
}

/// Stable sort: Ready, then Incomplete, then Up-to-date.
pub fn sort_by_priority(patients: &mut [Patient]) {
    patients.sort_by_key(|p| patient_status(p).priority());
}

/// Case-insensitive match on ID, name or medication. Blank query matches all.
pub fn matches_query(patient: &Patient, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }
    let hit = |v: Option<&str>| v.is_some_and(|s| s.to_lowercase().contains(&query));
    hit(Some(patient.patient_id.as_str()))
        || hit(patient.name.as_deref())
        || hit(patient.medication.as_deref())
}

/// Autocomplete match on name or ID. An empty query offers nothing.
pub fn matches_name_or_id(patient: &Patient, query: &str) -> bool {
    let query = query.to_lowercase();
    if query.is_empty() {
        return false;
    }
    patient.patient_id.to_lowercase().contains(&query)
        || patient
            .name
            .as_deref()
            .is_some_and(|n| n.to_lowercase().contains(&query))
}

/// Number of patients per readiness class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub ready: usize,
    pub incomplete: usize,
    pub up_to_date: usize,
}

impl StatusCounts {
    pub fn tally(patients: &[Patient]) -> Self {
        patients
            .iter()
            .fold(Self::default(), |mut counts, p| {
                match patient_status(p) {
                    ReadinessStatus::Ready => counts.ready += 1,
                    ReadinessStatus::Incomplete => counts.incomplete += 1,
                    ReadinessStatus::UpToDate => counts.up_to_date += 1,
                }
                counts
            })
    }

    pub fn total(&self) -> usize {
        self.ready + self.incomplete + self.up_to_date
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Patient with all 14 required fields filled.
    pub(crate) fn complete_patient(id: &str) -> Patient {
        let mut p = Patient::new(id);
        p.name = Some("Jane Doe".into());
        p.age = Some(48.into());
        p.gender = Some("Female".into());
        p.diagnosis = Some("Hypothyroidism".into());
        p.comorbidities = Some("Obesity, Hyperlipidemia".into());
        p.allergies = Some("Penicillin".into());
        p.icd_notes = Some("Patient presents with vomiting.".into());
        p.labs = Some("TSH = 2.4, T4 normal".into());
        p.medication = Some("Levothyroxine 50mcg".into());
        p.refill_request_date = Some("2025-01-01".into());
        p.last_filled = Some("2024-12-01".into());
        p.refill_history = Some("First time refill".into());
        p.refill_notes = Some("Routine refill".into());
        p
    }

    #[test]
    fn complete_patient_is_ready() {
        let p = complete_patient("P1");
        assert!(is_patient_ready(&p));
        assert!(missing_fields(&p).is_empty());
    }

    #[test]
    fn each_required_field_is_checked() {
        for field in REQUIRED_FIELDS {
            let mut p = complete_patient("P1");
            match field {
                "patient_id" => p.patient_id = "   ".into(),
                "age" => p.age = None,
                "name" => p.name = None,
                "gender" => p.gender = Some("".into()),
                "diagnosis" => p.diagnosis = Some(" \t".into()),
                "comorbidities" => p.comorbidities = None,
                "allergies" => p.allergies = None,
                "icd_notes" => p.icd_notes = None,
                "labs" => p.labs = Some(" ".into()),
                "medication" => p.medication = None,
                "refill_request_date" => p.refill_request_date = None,
                "last_filled" => p.last_filled = None,
                "refill_history" => p.refill_history = None,
                "refill_notes" => p.refill_notes = Some("".into()),
                _ => unreachable!(),
            }
            assert!(!is_patient_ready(&p), "{field} should be required");
            assert_eq!(missing_fields(&p), vec![field]);
        }
    }

    #[test]
    fn presence_is_checked_on_text_form() {
        let mut p = complete_patient("P1");
        p.age = Some("48 years".into());
        assert!(is_patient_ready(&p));
        p.age = Some("unknown".into());
        assert!(is_patient_ready(&p));
        p.age = Some("  ".into());
        assert_eq!(missing_fields(&p), vec!["age"]);
        p.age = Some(serde_json::Value::Null);
        assert_eq!(missing_fields(&p), vec!["age"]);
    }

    #[test]
    fn backend_record_with_numeric_fields_is_ready() {
        let p: Patient = serde_json::from_value(serde_json::json!({
            "patient_id": 101,
            "name": "Jane Doe",
            "age": "48 years",
            "gender": "Female",
            "diagnosis": "Hypothyroidism",
            "comorbidities": "Obesity",
            "allergies": "Penicillin",
            "icd_notes": "Vomiting",
            "labs": "TSH = 2.4",
            "medication": "Levothyroxine 50mcg",
            "refill_request_date": "2025-01-01",
            "last_filled": "2024-12-01",
            "refill_history": 3,
            "refill_notes": "Routine"
        }))
        .unwrap();
        assert_eq!(patient_status(&p), ReadinessStatus::Ready);

        let p: Patient = serde_json::from_value(serde_json::json!({
            "patient_id": "P2",
            "refill_history": null
        }))
        .unwrap();
        assert!(missing_fields(&p).contains(&"refill_history"));
    }

    #[test]
    fn optional_fields_do_not_affect_readiness() {
        let mut p = complete_patient("P1");
        p.last_visit = None;
        p.icd_pmh = None;
        assert!(is_patient_ready(&p));
    }

    #[test]
    fn status_follows_dates() {
        let mut p = complete_patient("P1");
        assert_eq!(patient_status(&p), ReadinessStatus::Ready);

        p.last_processed_request_date = Some("2024-12-01".into());
        assert_eq!(patient_status(&p), ReadinessStatus::Ready);

        p.last_processed_request_date = Some("2025-01-01".into());
        assert_eq!(patient_status(&p), ReadinessStatus::UpToDate);

        p.labs = None;
        assert_eq!(patient_status(&p), ReadinessStatus::Incomplete);
    }

    #[test]
    fn empty_processed_date_counts_as_never_processed() {
        let mut p = complete_patient("P1");
        p.last_processed_request_date = Some(String::new());
        assert_eq!(patient_status(&p), ReadinessStatus::Ready);
    }

    #[test]
    fn sort_puts_ready_first_and_keeps_order() {
        let mut done = complete_patient("A");
        done.last_processed_request_date = done.refill_request_date.clone();
        let mut incomplete = complete_patient("B");
        incomplete.labs = None;
        let ready1 = complete_patient("C");
        let ready2 = complete_patient("D");
        let mut list = vec![done, incomplete, ready1, ready2];
        sort_by_priority(&mut list);
        let ids: Vec<_> = list.iter().map(|p| p.patient_id.as_str()).collect();
        assert_eq!(ids, vec!["C", "D", "B", "A"]);
    }

    #[test]
    fn search_matches_id_name_medication() {
        let p = complete_patient("P001");
        assert!(matches_query(&p, "p00"));
        assert!(matches_query(&p, "JANE"));
        assert!(matches_query(&p, "levothyroxine"));
        assert!(matches_query(&p, "  "));
        assert!(!matches_query(&p, "omeprazole"));
    }

    #[test]
    fn autocomplete_needs_a_query() {
        let p = complete_patient("P001");
        assert!(!matches_name_or_id(&p, ""));
        assert!(matches_name_or_id(&p, "doe"));
        assert!(!matches_name_or_id(&p, "levo"));
    }

    #[test]
    fn counts_tally_every_class() {
        let mut done = complete_patient("A");
        done.last_processed_request_date = done.refill_request_date.clone();
        let mut incomplete = complete_patient("B");
        incomplete.name = None;
        let counts = StatusCounts::tally(&[done, incomplete, complete_patient("C")]);
        assert_eq!(
            counts,
            StatusCounts {
                ready: 1,
                incomplete: 1,
                up_to_date: 1
            }
        );
        assert_eq!(counts.total(), 3);
    }
}
