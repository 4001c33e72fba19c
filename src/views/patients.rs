//! Patient directory: roster with readiness labels, CRUD, profile and
//! quick analysis.

use chrono::NaiveDate;
use serde::Serialize;

use super::analysis::{analyze_patient, AnalysisKinds, AnalysisOutcome};
use super::history::sort_newest_first;
use super::ViewContext;
use crate::error::{ClientError, ClientResult};
use crate::events::{DashboardEvent, Subscription};
use crate::models::{HistoryEntry, Patient, ReadinessStatus};
use crate::readiness;

/// One roster line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientRow {
    pub patient_id: String,
    pub name: String,
    pub medication: String,
    pub status: ReadinessStatus,
    /// Quick analysis is only offered for ready patients.
    pub can_quick_analyze: bool,
}

impl PatientRow {
    fn from_patient(patient: &Patient) -> Self {
        let status = readiness::patient_status(patient);
        Self {
            patient_id: patient.patient_id.clone(),
            name: patient.display_name().to_string(),
            medication: patient.medication.clone().unwrap_or_default(),
            status,
            can_quick_analyze: status == ReadinessStatus::Ready,
        }
    }
}

/// Everything the profile page shows.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientProfile {
    pub patient: Patient,
    pub status: ReadinessStatus,
    pub missing_fields: Vec<&'static str>,
    pub history: Vec<HistoryEntry>,
}

pub struct PatientDirectory {
    ctx: ViewContext,
    events: Subscription,
    patients: Vec<Patient>,
    query: String,
}

impl PatientDirectory {
    pub fn new(ctx: ViewContext) -> Self {
        let events = ctx.bus.subscribe();
        Self {
            ctx,
            events,
            patients: Vec::new(),
            query: String::new(),
        }
    }

    pub fn load(&mut self) -> ClientResult<()> {
        self.patients = self.ctx.backend().list_patients()?;
        Ok(())
    }

    pub fn sync(&mut self) -> ClientResult<()> {
        if self.events.saw(DashboardEvent::PatientsUpdated) {
            self.load()?;
        }
        Ok(())
    }

    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
    }

    pub fn patients(&self) -> &[Patient] {
        &self.patients
    }

    pub fn rows(&self) -> Vec<PatientRow> {
        self.patients
            .iter()
            .filter(|p| readiness::matches_query(p, &self.query))
            .map(PatientRow::from_patient)
            .collect()
    }

    pub fn counts(&self) -> readiness::StatusCounts {
        readiness::StatusCounts::tally(&self.patients)
    }

    /// Creates a patient. ID and name are required; the rest may be filled
    /// in later.
    pub fn create(&mut self, patient: &Patient) -> ClientResult<Patient> {
        if patient.patient_id.trim().is_empty() {
            return Err(ClientError::Validation("Patient ID is required".into()));
        }
        if patient.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            return Err(ClientError::Validation("Patient name is required".into()));
        }
        let created = self.ctx.backend().create_patient(patient).map_err(|e| {
            ClientError::Validation(format!(
                "Failed to create patient: {}",
                e.user_message("create patients")
            ))
        })?;
        tracing::info!(patient_id = %created.patient_id, "Created patient");
        self.patients.push(created.clone());
        self.notify();
        Ok(created)
    }

    pub fn update(&mut self, patient: &Patient) -> ClientResult<()> {
        self.ctx.backend().update_patient(patient)?;
        tracing::info!(patient_id = %patient.patient_id, "Updated patient");
        match self
            .patients
            .iter_mut()
            .find(|p| p.patient_id == patient.patient_id)
        {
            Some(existing) => *existing = patient.clone(),
            None => self.patients.push(patient.clone()),
        }
        self.notify();
        Ok(())
    }

    pub fn delete(&mut self, patient_id: &str) -> ClientResult<()> {
        self.ctx.backend().delete_patient(patient_id)?;
        tracing::info!(patient_id, "Deleted patient");
        self.patients.retain(|p| p.patient_id != patient_id);
        self.notify();
        Ok(())
    }

    /// Fresh copy of the patient plus that patient's history.
    pub fn profile(&self, patient_id: &str) -> ClientResult<PatientProfile> {
        let backend = self.ctx.backend();
        let patient = backend.get_patient(patient_id)?;
        let mut history = backend.list_history(Some(patient_id))?;
        history.retain(|e| e.patient_id.as_deref() == Some(patient_id));
        sort_newest_first(&mut history);
        Ok(PatientProfile {
            status: readiness::patient_status(&patient),
            missing_fields: readiness::missing_fields(&patient),
            patient,
            history,
        })
    }

    pub fn quick_analysis(
        &self,
        patient_id: &str,
        kinds: AnalysisKinds,
        today: NaiveDate,
    ) -> ClientResult<AnalysisOutcome> {
        let patient = self
            .patients
            .iter()
            .find(|p| p.patient_id == patient_id)
            .ok_or_else(|| ClientError::Validation(format!("Unknown patient {patient_id}")))?;
        if readiness::patient_status(patient) != ReadinessStatus::Ready {
            return Err(ClientError::Validation(
                "Quick analysis is only available for ready patients".into(),
            ));
        }
        analyze_patient(&self.ctx, patient, kinds, today)
    }

    /// Our own mutations are already applied locally.
    fn notify(&self) {
        self.ctx.bus.publish_all();
        self.events.drain();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::{ClinicalBackend, MockBackend};
    use crate::models::UserOut;
    use crate::readiness::tests::complete_patient;

    fn setup(patients: Vec<Patient>) -> (Arc<MockBackend>, PatientDirectory) {
        let user = UserOut {
            id: 2,
            email: "a@b.c".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            is_active: true,
        };
        let backend = Arc::new(MockBackend::new().logged_in_as(user).with_patients(patients));
        let ctx = ViewContext::for_backend(backend.clone());
        ctx.session.check_session();
        let mut view = PatientDirectory::new(ctx);
        view.load().unwrap();
        (backend, view)
    }

    #[test]
    fn rows_carry_readiness() {
        let mut incomplete = complete_patient("P2");
        incomplete.allergies = None;
        let (_b, view) = setup(vec![complete_patient("P1"), incomplete]);
        let rows = view.rows();
        assert_eq!(rows[0].status, ReadinessStatus::Ready);
        assert!(rows[0].can_quick_analyze);
        assert_eq!(rows[1].status, ReadinessStatus::Incomplete);
        assert!(!rows[1].can_quick_analyze);
        assert_eq!(view.counts().total(), 2);
    }

    #[test]
    fn crud_publishes_both_events() {
        let (backend, mut view) = setup(Vec::new());
        let other = view.ctx.bus.subscribe();

        let mut p = Patient::new("P7");
        p.name = Some("Grace Hopper".into());
        view.create(&p).unwrap();
        let seen = other.drain();
        assert!(seen.contains(&DashboardEvent::PatientsUpdated));
        assert!(seen.contains(&DashboardEvent::HistoryUpdated));

        p.medication = Some("Metformin 500mg".into());
        view.update(&p).unwrap();
        assert_eq!(
            backend.patients()[0].medication.as_deref(),
            Some("Metformin 500mg")
        );
        assert!(other.saw(DashboardEvent::PatientsUpdated));

        view.delete("P7").unwrap();
        assert!(backend.patients().is_empty());
        assert!(view.rows().is_empty());
    }

    #[test]
    fn create_validates_and_reports_backend_errors() {
        let (_b, mut view) = setup(vec![complete_patient("P1")]);
        assert!(view.create(&Patient::new("P9")).is_err());
        let err = view.create(&complete_patient("P1")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to create patient: Patient P1 already exists"
        );
    }

    #[test]
    fn profile_includes_own_history() {
        let (backend, view) = setup(vec![complete_patient("P1")]);
        backend
            .record_history(&[crate::models::NewHistoryEntry {
                user_id: 2,
                patient_id: "P1".into(),
                action_type: crate::models::ActionType::PrescriptionRefill,
                medication: "X".into(),
                status: "approve".into(),
                decision_by: "AI".into(),
                icd_codes: None,
                reasoning: None,
                original_status: "approve".into(),
                original_reasoning: None,
            }])
            .unwrap();
        let profile = view.profile("P1").unwrap();
        assert_eq!(profile.status, ReadinessStatus::Ready);
        assert!(profile.missing_fields.is_empty());
        assert_eq!(profile.history.len(), 1);
        assert!(view.profile("nope").is_err());
    }

    #[test]
    fn quick_analysis_only_for_ready() {
        let mut done = complete_patient("P2");
        done.last_processed_request_date = done.refill_request_date.clone();
        let (backend, view) = setup(vec![complete_patient("P1"), done]);
        let today = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();

        let err = view
            .quick_analysis("P2", AnalysisKinds::BOTH, today)
            .unwrap_err();
        assert!(err.to_string().contains("ready patients"));

        let outcome = view.quick_analysis("P1", AnalysisKinds::BOTH, today).unwrap();
        assert_eq!(outcome.history_recorded, 2);
        assert_eq!(backend.history().len(), 2);
    }

    #[test]
    fn search_and_sync() {
        let (backend, mut view) = setup(vec![complete_patient("P1")]);
        view.set_query("levo");
        assert_eq!(view.rows().len(), 1);
        view.set_query("zzz");
        assert!(view.rows().is_empty());

        backend.upload_patients(&[complete_patient("P2")]).unwrap();
        view.ctx.bus.publish(DashboardEvent::PatientsUpdated);
        view.sync().unwrap();
        assert_eq!(view.patients().len(), 2);
    }
}
