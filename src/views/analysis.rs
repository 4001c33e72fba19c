//! Single-patient analysis: pick a patient, choose refill and/or ICD
//! analysis, call the backend, and write the audit entries.

use chrono::NaiveDate;

use super::{AnalysisState, ViewContext};
use crate::error::{ClientError, ClientResult};
use crate::events::{DashboardEvent, Subscription};
use crate::models::{
    ActionType, IcdOutcome, IcdPredictionResponse, IcdRequestPayload, NewHistoryEntry, Patient,
    RefillEvaluation, RefillRequestPayload, UserOut,
};
use crate::provenance;
use crate::readiness;
use crate::status::normalize_status_for_database;

const NOT_SPECIFIED: &str = "Not specified";

/// Which analyses to run. At least one must be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisKinds {
    pub refill: bool,
    pub icd: bool,
}

impl AnalysisKinds {
    pub const BOTH: Self = Self {
        refill: true,
        icd: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.refill && !self.icd
    }
}

impl Default for AnalysisKinds {
    fn default() -> Self {
        Self::BOTH
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisOutcome {
    pub patient_id: String,
    pub refill: Option<RefillEvaluation>,
    pub icd: Option<IcdPredictionResponse>,
    /// Audit entries accepted by the backend.
    pub history_recorded: usize,
}

impl AnalysisOutcome {
    /// Verdict in canonical form, if refill analysis ran.
    pub fn refill_status(&self) -> Option<String> {
        self.refill
            .as_ref()
            .map(|r| normalize_status_for_database(&r.raw_decision()))
    }
}

/// Audit entry for a refill verdict. Escalations are routed to the reviewer.
pub(crate) fn refill_entry(
    user: &UserOut,
    patient_id: &str,
    medication: &str,
    raw_decision: &str,
    reasoning: Option<String>,
) -> NewHistoryEntry {
    let status = normalize_status_for_database(raw_decision);
    let reviewer = provenance::reviewer_name(Some(user));
    NewHistoryEntry {
        user_id: user.id,
        patient_id: patient_id.to_string(),
        action_type: ActionType::PrescriptionRefill,
        medication: medication.to_string(),
        decision_by: provenance::initial_decision_by(&status, &reviewer),
        icd_codes: None,
        reasoning: reasoning.clone(),
        original_status: status.clone(),
        original_reasoning: reasoning,
        status,
    }
}

/// Audit entry for an ICD prediction. Always attributed to the AI.
pub(crate) fn icd_entry(
    user: &UserOut,
    patient_id: &str,
    medication: &str,
    prediction: &IcdPredictionResponse,
) -> NewHistoryEntry {
    let status = if prediction.has_codes() {
        IcdOutcome::Found
    } else {
        IcdOutcome::NoCodesFound
    };
    let reasoning = prediction.joined_justifications();
    NewHistoryEntry {
        user_id: user.id,
        patient_id: patient_id.to_string(),
        action_type: ActionType::IcdPrediction,
        medication: medication.to_string(),
        status: status.as_str().to_string(),
        decision_by: provenance::AI.to_string(),
        icd_codes: prediction.joined_codes(),
        reasoning: reasoning.clone(),
        original_status: status.as_str().to_string(),
        original_reasoning: reasoning,
    }
}

/// Runs the chosen analyses for one patient and records the audit entries.
///
/// Any failed decision call aborts the run before history is written.
/// A failed history write is logged and does not fail the analysis.
pub fn analyze_patient(
    ctx: &ViewContext,
    patient: &Patient,
    kinds: AnalysisKinds,
    today: NaiveDate,
) -> ClientResult<AnalysisOutcome> {
    if kinds.is_empty() {
        return Err(ClientError::Validation(
            "Please select at least one analysis type.".into(),
        ));
    }

    let backend = ctx.backend();
    let user = ctx.session.current_user();
    let medication = patient
        .medication
        .as_deref()
        .filter(|m| !m.is_empty())
        .unwrap_or(NOT_SPECIFIED);
    let mut outcome = AnalysisOutcome {
        patient_id: patient.patient_id.clone(),
        ..AnalysisOutcome::default()
    };
    let mut entries = Vec::new();

    if kinds.refill {
        let evaluation =
            backend.evaluate_refill(&RefillRequestPayload::for_analysis(patient, today))?;
        if let Some(user) = &user {
            entries.push(refill_entry(
                user,
                &patient.patient_id,
                medication,
                &evaluation.raw_decision(),
                evaluation.reasoning(),
            ));
        }
        outcome.refill = Some(evaluation);
    }

    if kinds.icd {
        let prediction = backend.predict_icd(&IcdRequestPayload::for_analysis(patient))?;
        if let Some(user) = &user {
            entries.push(icd_entry(user, &patient.patient_id, medication, &prediction));
        }
        outcome.icd = Some(prediction);
    }

    if !entries.is_empty() {
        match backend.record_history(&entries) {
            Ok(()) => {
                outcome.history_recorded = entries.len();
                ctx.bus.publish(DashboardEvent::HistoryUpdated);
            }
            Err(e) => tracing::warn!(
                patient_id = %patient.patient_id,
                error = %e,
                "Failed to record analysis history"
            ),
        }
    }

    tracing::info!(
        patient_id = %patient.patient_id,
        refill = kinds.refill,
        icd = kinds.icd,
        "Patient analysis complete"
    );
    Ok(outcome)
}

/// The single-patient tab: autocomplete, analysis type toggles, results.
pub struct SinglePatientAnalysis {
    ctx: ViewContext,
    events: Subscription,
    patients: Vec<Patient>,
    selected: Option<Patient>,
    kinds: AnalysisKinds,
    state: AnalysisState,
    outcome: Option<AnalysisOutcome>,
}

impl SinglePatientAnalysis {
    pub fn new(ctx: ViewContext) -> Self {
        let events = ctx.bus.subscribe();
        Self {
            ctx,
            events,
            patients: Vec::new(),
            selected: None,
            kinds: AnalysisKinds::default(),
            state: AnalysisState::Idle,
            outcome: None,
        }
    }

    pub fn load(&mut self) -> ClientResult<()> {
        self.patients = self.ctx.backend().list_patients()?;
        Ok(())
    }

    /// Re-fetches the roster if another view changed it.
    pub fn sync(&mut self) -> ClientResult<()> {
        if self.events.saw(DashboardEvent::PatientsUpdated) {
            self.load()?;
        }
        Ok(())
    }

    /// Autocomplete on name or ID.
    pub fn suggestions(&self, query: &str) -> Vec<&Patient> {
        self.patients
            .iter()
            .filter(|p| readiness::matches_name_or_id(p, query))
            .collect()
    }

    pub fn select(&mut self, patient_id: &str) -> ClientResult<&Patient> {
        let patient = self
            .patients
            .iter()
            .find(|p| p.patient_id == patient_id)
            .cloned()
            .ok_or_else(|| ClientError::Validation(format!("Unknown patient {patient_id}")))?;
        self.outcome = None;
        self.state = AnalysisState::Idle;
        let selected = self.selected.insert(patient);
        Ok(&*selected)
    }

    pub fn selected(&self) -> Option<&Patient> {
        self.selected.as_ref()
    }

    pub fn set_kinds(&mut self, kinds: AnalysisKinds) {
        self.kinds = kinds;
    }

    pub fn state(&self) -> &AnalysisState {
        &self.state
    }

    pub fn outcome(&self) -> Option<&AnalysisOutcome> {
        self.outcome.as_ref()
    }

    pub fn analyze(&mut self, today: NaiveDate) -> ClientResult<&AnalysisOutcome> {
        let patient = self
            .selected
            .clone()
            .ok_or_else(|| ClientError::Validation("Please select a patient".into()))?;
        self.state = AnalysisState::Analyzing;
        self.outcome = None;
        match analyze_patient(&self.ctx, &patient, self.kinds, today) {
            Ok(outcome) => {
                self.state = AnalysisState::ResultsShown;
                let outcome = self.outcome.insert(outcome);
                Ok(&*outcome)
            }
            Err(e) => {
                self.state = AnalysisState::Error(e.user_message("analyze patients"));
                Err(e)
            }
        }
    }

    pub fn reset(&mut self) {
        self.selected = None;
        self.outcome = None;
        self.state = AnalysisState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::MockBackend;
    use crate::readiness::tests::complete_patient;

    fn ada() -> UserOut {
        UserOut {
            id: 3,
            email: "ada@example.org".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            is_active: true,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    fn setup(backend: MockBackend) -> (Arc<MockBackend>, ViewContext) {
        let backend = Arc::new(backend.logged_in_as(ada()));
        let ctx = ViewContext::for_backend(backend.clone());
        ctx.session.check_session();
        (backend, ctx)
    }

    #[test]
    fn escalation_is_routed_to_reviewer() {
        let (backend, ctx) = setup(
            MockBackend::new()
                .with_patients(vec![complete_patient("P1")])
                .with_verdict("P1", "Escalated", "Labs outdated")
                .with_icd_codes("P1", &[("R11.10", "vomiting")]),
        );
        let events = ctx.bus.subscribe();
        let outcome =
            analyze_patient(&ctx, &complete_patient("P1"), AnalysisKinds::BOTH, today()).unwrap();

        assert_eq!(outcome.refill_status().as_deref(), Some("escalate"));
        assert_eq!(outcome.history_recorded, 2);
        assert!(events.saw(DashboardEvent::HistoryUpdated));

        let history = backend.history();
        assert_eq!(history[0].status, "escalate");
        assert_eq!(history[0].decision_by.as_deref(), Some("AI -> Dr. Ada Lovelace"));
        assert_eq!(history[0].original_reasoning.as_deref(), Some("Labs outdated"));
        assert_eq!(history[1].status, "Found");
        assert_eq!(history[1].icd_codes.as_deref(), Some("R11.10"));
        assert_eq!(history[1].decision_by.as_deref(), Some("AI"));
    }

    #[test]
    fn icd_only_without_codes() {
        let (backend, ctx) = setup(MockBackend::new().with_patients(vec![complete_patient("P1")]));
        let kinds = AnalysisKinds {
            refill: false,
            icd: true,
        };
        let outcome = analyze_patient(&ctx, &complete_patient("P1"), kinds, today()).unwrap();
        assert!(outcome.refill.is_none());
        assert_eq!(backend.history()[0].status, "No Codes Found");
        assert!(!backend.calls().contains(&"evaluate_refill".to_string()));
    }

    #[test]
    fn no_analysis_type_is_rejected() {
        let (backend, ctx) = setup(MockBackend::new());
        let kinds = AnalysisKinds {
            refill: false,
            icd: false,
        };
        let err = analyze_patient(&ctx, &complete_patient("P1"), kinds, today()).unwrap_err();
        assert_eq!(err.to_string(), "Please select at least one analysis type.");
        assert!(backend.calls().iter().all(|c| c == "me"));
    }

    #[test]
    fn backend_failure_sets_error_state() {
        let (backend, ctx) = setup(MockBackend::new().with_patients(vec![complete_patient("P1")]));
        backend.fail_on("evaluate_refill");
        let mut view = SinglePatientAnalysis::new(ctx);
        view.load().unwrap();
        view.select("P1").unwrap();
        assert!(view.analyze(today()).is_err());
        assert_eq!(view.state().error(), Some("evaluate_refill failed"));
        assert!(backend.history().is_empty());
        assert_eq!(view.selected().map(|p| p.patient_id.as_str()), Some("P1"));
    }

    #[test]
    fn history_failure_does_not_fail_analysis() {
        let (backend, ctx) = setup(MockBackend::new().with_patients(vec![complete_patient("P1")]));
        backend.fail_on("record_history");
        let outcome =
            analyze_patient(&ctx, &complete_patient("P1"), AnalysisKinds::BOTH, today()).unwrap();
        assert_eq!(outcome.history_recorded, 0);
        assert_eq!(outcome.refill_status().as_deref(), Some("approve"));
    }

    #[test]
    fn suggestions_and_results_flow() {
        let mut other = complete_patient("P2");
        other.name = Some("John Smith".into());
        let (_backend, ctx) =
            setup(MockBackend::new().with_patients(vec![complete_patient("P1"), other]));
        let mut view = SinglePatientAnalysis::new(ctx.clone());
        view.load().unwrap();
        assert!(view.suggestions("").is_empty());
        assert_eq!(view.suggestions("smith").len(), 1);
        assert!(matches!(
            view.analyze(today()),
            Err(ClientError::Validation(_))
        ));
        view.select("P2").unwrap();
        view.analyze(today()).unwrap();
        assert_eq!(view.state(), &AnalysisState::ResultsShown);
        view.reset();
        assert!(view.selected().is_none() && view.outcome().is_none());

        ctx.bus.publish(DashboardEvent::PatientsUpdated);
        view.sync().unwrap();
    }
}
