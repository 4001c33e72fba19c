use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::ClinicalBackend;
use crate::error::{ClientError, ClientResult};
use crate::models::{
    ChangePasswordRequest, CombinedRequest, CombinedResponse, CombinedResult, ForgotPasswordInfo,
    HistoryEntry, HistoryUpdate, IcdPrediction, IcdPredictionResponse, IcdRequestPayload,
    LoginCredentials, NewHistoryEntry, Patient, RefillDecision, RefillEvaluation,
    RefillRequestPayload, ResetPasswordInfo, SignupCredentials, UserOut,
};

/// In-memory backend for tests and offline demos.
///
/// Behaves like the real service for the parts the dashboard relies on:
/// cookie-less session after login, patient CRUD keyed by `patient_id`,
/// history with server-assigned ids and timestamps, and canned verdicts.
pub struct MockBackend {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    users: Vec<(UserOut, String)>,
    session: Option<UserOut>,
    patients: Vec<Patient>,
    history: Vec<HistoryEntry>,
    next_history_id: i64,
    verdicts: HashMap<String, (String, String)>,
    icd_codes: HashMap<String, Vec<IcdPrediction>>,
    failing_endpoints: HashSet<String>,
    failing_updates: HashSet<String>,
    calls: Vec<String>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_history_id: 1,
                ..MockState::default()
            }),
        }
    }

    /// Registers an account that can log in.
    pub fn with_user(self, user: UserOut, password: &str) -> Self {
        self.lock().users.push((user, password.to_string()));
        self
    }

    /// Starts already logged in as `user`.
    pub fn logged_in_as(self, user: UserOut) -> Self {
        {
            let mut state = self.lock();
            state.users.push((user.clone(), String::new()));
            state.session = Some(user);
        }
        self
    }

    pub fn with_patients(self, patients: Vec<Patient>) -> Self {
        self.lock().patients = patients;
        self
    }

    pub fn with_history(self, entries: Vec<HistoryEntry>) -> Self {
        {
            let mut state = self.lock();
            for mut entry in entries {
                if entry.id.is_none() {
                    entry.id = Some(state.next_history_id);
                }
                state.next_history_id = state.next_history_id.max(entry.id.unwrap_or(0) + 1);
                state.history.push(entry);
            }
        }
        self
    }

    /// Verdict returned for a patient's refill; default is `approve`.
    pub fn with_verdict(self, patient_id: &str, decision: &str, reason: &str) -> Self {
        self.lock().verdicts.insert(
            patient_id.to_string(),
            (decision.to_string(), reason.to_string()),
        );
        self
    }

    /// ICD codes predicted for a patient; default is none.
    pub fn with_icd_codes(self, patient_id: &str, codes: &[(&str, &str)]) -> Self {
        let predictions = codes
            .iter()
            .map(|(code, why)| IcdPrediction {
                icd_code: code.to_string(),
                justification: why.to_string(),
                ..IcdPrediction::default()
            })
            .collect();
        self.lock()
            .icd_codes
            .insert(patient_id.to_string(), predictions);
        self
    }

    /// Makes an endpoint answer HTTP 500. Names match the trait methods.
    pub fn fail_on(&self, endpoint: &str) {
        self.lock().failing_endpoints.insert(endpoint.to_string());
    }

    /// Makes `update_patient` fail for one patient only.
    pub fn fail_update_for(&self, patient_id: &str) {
        self.lock().failing_updates.insert(patient_id.to_string());
    }

    /// Drops the session, as an expired cookie would.
    pub fn expire_session(&self) {
        self.lock().session = None;
    }

    /// Trait methods called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn patients(&self) -> Vec<Patient> {
        self.lock().patients.clone()
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.lock().history.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records the call and applies failure injection.
    fn enter(&self, endpoint: &str) -> ClientResult<MutexGuard<'_, MockState>> {
        let mut state = self.lock();
        state.calls.push(endpoint.to_string());
        if state.failing_endpoints.contains(endpoint) {
            return Err(ClientError::Http {
                status: 500,
                body: format!("{endpoint} failed"),
            });
        }
        Ok(state)
    }

    /// Like [`enter`](Self::enter) but also requires a session.
    fn enter_authed(&self, endpoint: &str) -> ClientResult<MutexGuard<'_, MockState>> {
        let state = self.enter(endpoint)?;
        if state.session.is_none() {
            return Err(ClientError::Unauthorized);
        }
        Ok(state)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(what: &str, id: &str) -> ClientError {
    ClientError::Http {
        status: 404,
        body: format!("{what} {id} not found"),
    }
}

impl MockState {
    fn verdict(&self, patient_id: &str) -> (String, String) {
        self.verdicts
            .get(patient_id)
            .cloned()
            .unwrap_or_else(|| ("approve".to_string(), "Meets refill criteria".to_string()))
    }

    fn icd(&self, patient_id: &str) -> IcdPredictionResponse {
        IcdPredictionResponse {
            predictions: Some(self.icd_codes.get(patient_id).cloned().unwrap_or_default()),
        }
    }

    fn upsert(&mut self, patient: Patient) {
        match self
            .patients
            .iter_mut()
            .find(|p| p.patient_id == patient.patient_id)
        {
            Some(existing) => *existing = patient,
            None => self.patients.push(patient),
        }
    }
}

impl ClinicalBackend for MockBackend {
    fn login(&self, credentials: &LoginCredentials) -> ClientResult<UserOut> {
        let mut state = self.enter("login")?;
        let user = state
            .users
            .iter()
            .find(|(u, pw)| u.email == credentials.email && *pw == credentials.password)
            .map(|(u, _)| u.clone())
            .ok_or(ClientError::Unauthorized)?;
        state.session = Some(user.clone());
        Ok(user)
    }

    fn register(&self, credentials: &SignupCredentials) -> ClientResult<UserOut> {
        let mut state = self.enter("register")?;
        if state.users.iter().any(|(u, _)| u.email == credentials.email) {
            return Err(ClientError::Http {
                status: 400,
                body: "Email already registered".into(),
            });
        }
        let user = UserOut {
            id: state.users.len() as i64 + 1,
            email: credentials.email.clone(),
            first_name: credentials.first_name.clone(),
            last_name: credentials.last_name.clone(),
            is_active: true,
        };
        state.users.push((user.clone(), credentials.password.clone()));
        Ok(user)
    }

    fn logout(&self) -> ClientResult<()> {
        self.enter("logout")?.session = None;
        Ok(())
    }

    fn me(&self) -> ClientResult<Option<UserOut>> {
        Ok(self.enter("me")?.session.clone())
    }

    fn google_auth(&self, token: &str) -> ClientResult<()> {
        let mut state = self.enter("google_auth")?;
        if token.is_empty() {
            return Err(ClientError::Unauthorized);
        }
        let user = state
            .users
            .first()
            .map(|(u, _)| u.clone())
            .ok_or(ClientError::Unauthorized)?;
        state.session = Some(user);
        Ok(())
    }

    fn change_password(&self, request: &ChangePasswordRequest) -> ClientResult<()> {
        let mut state = self.enter_authed("change_password")?;
        let email = state.session.as_ref().map(|u| u.email.clone());
        let account = state
            .users
            .iter_mut()
            .find(|(u, _)| Some(&u.email) == email.as_ref())
            .ok_or(ClientError::Unauthorized)?;
        if account.1 != request.current_password {
            return Err(ClientError::Http {
                status: 400,
                body: "Current password is incorrect".into(),
            });
        }
        account.1 = request.new_password.clone();
        Ok(())
    }

    fn forgot_password(&self, _request: &ForgotPasswordInfo) -> ClientResult<()> {
        self.enter("forgot_password").map(|_| ())
    }

    fn reset_password(&self, request: &ResetPasswordInfo) -> ClientResult<()> {
        self.enter("reset_password")?;
        if request.token.is_empty() {
            return Err(ClientError::Http {
                status: 400,
                body: "Invalid or expired token".into(),
            });
        }
        Ok(())
    }

    fn list_patients(&self) -> ClientResult<Vec<Patient>> {
        Ok(self.enter_authed("list_patients")?.patients.clone())
    }

    fn get_patient(&self, patient_id: &str) -> ClientResult<Patient> {
        self.enter_authed("get_patient")?
            .patients
            .iter()
            .find(|p| p.patient_id == patient_id)
            .cloned()
            .ok_or_else(|| not_found("Patient", patient_id))
    }

    fn create_patient(&self, patient: &Patient) -> ClientResult<Patient> {
        let mut state = self.enter_authed("create_patient")?;
        if state.patients.iter().any(|p| p.patient_id == patient.patient_id) {
            return Err(ClientError::Http {
                status: 400,
                body: format!("Patient {} already exists", patient.patient_id),
            });
        }
        state.patients.push(patient.clone());
        Ok(patient.clone())
    }

    fn update_patient(&self, patient: &Patient) -> ClientResult<()> {
        let mut state = self.enter_authed("update_patient")?;
        if state.failing_updates.contains(&patient.patient_id) {
            return Err(ClientError::Http {
                status: 500,
                body: format!("update of {} failed", patient.patient_id),
            });
        }
        let existing = state
            .patients
            .iter_mut()
            .find(|p| p.patient_id == patient.patient_id)
            .ok_or_else(|| not_found("Patient", &patient.patient_id))?;
        *existing = patient.clone();
        Ok(())
    }

    fn delete_patient(&self, patient_id: &str) -> ClientResult<()> {
        let mut state = self.enter_authed("delete_patient")?;
        let before = state.patients.len();
        state.patients.retain(|p| p.patient_id != patient_id);
        if state.patients.len() == before {
            return Err(not_found("Patient", patient_id));
        }
        Ok(())
    }

    fn upload_patients(&self, patients: &[Patient]) -> ClientResult<()> {
        let mut state = self.enter_authed("upload_patients")?;
        for patient in patients {
            state.upsert(patient.clone());
        }
        Ok(())
    }

    fn evaluate_refill(&self, request: &RefillRequestPayload) -> ClientResult<RefillEvaluation> {
        let state = self.enter_authed("evaluate_refill")?;
        let (decision, reason) = state.verdict(&request.refill_request.patient_id);
        Ok(RefillEvaluation {
            decision: Some(decision),
            reason: Some(reason),
            ..RefillEvaluation::default()
        })
    }

    fn predict_icd(&self, request: &IcdRequestPayload) -> ClientResult<IcdPredictionResponse> {
        let state = self.enter_authed("predict_icd")?;
        // ICD requests carry no patient id; match on the clinical note.
        let patient_id = state
            .patients
            .iter()
            .find(|p| p.icd_notes.as_deref() == Some(request.note.as_str()))
            .map(|p| p.patient_id.clone())
            .unwrap_or_default();
        Ok(state.icd(&patient_id))
    }

    fn combined_icd_refill(&self, request: &CombinedRequest) -> ClientResult<CombinedResponse> {
        let state = self.enter_authed("combined_icd_refill")?;
        let results = request
            .patients
            .iter()
            .map(|p| {
                let id = &p.refill_request_data.refill_request.patient_id;
                let (decision, reason) = state.verdict(id);
                CombinedResult {
                    refill_decision: Some(RefillDecision {
                        decision: Some(decision),
                        reason: Some(reason),
                        ..RefillDecision::default()
                    }),
                    icd_prediction: Some(state.icd(id)),
                }
            })
            .collect();
        Ok(CombinedResponse { results })
    }

    fn list_history(&self, patient_id: Option<&str>) -> ClientResult<Vec<HistoryEntry>> {
        let state = self.enter_authed("list_history")?;
        Ok(state
            .history
            .iter()
            .filter(|h| patient_id.map_or(true, |id| h.patient_id.as_deref() == Some(id)))
            .cloned()
            .collect())
    }

    fn record_history(&self, entries: &[NewHistoryEntry]) -> ClientResult<()> {
        let mut state = self.enter_authed("record_history")?;
        let now = chrono::Utc::now().to_rfc3339();
        for entry in entries {
            let id = state.next_history_id;
            state.next_history_id += 1;
            state.history.push(HistoryEntry {
                id: Some(id),
                user_id: Some(entry.user_id),
                patient_id: Some(entry.patient_id.clone()),
                action_type: entry.action_type.as_str().to_string(),
                medication: Some(entry.medication.clone()),
                status: entry.status.clone(),
                decision_by: Some(entry.decision_by.clone()),
                icd_codes: entry.icd_codes.clone(),
                reasoning: entry.reasoning.clone(),
                original_status: Some(entry.original_status.clone()),
                original_reasoning: entry.original_reasoning.clone(),
                timestamp: Some(now.clone()),
            });
        }
        Ok(())
    }

    fn update_history(&self, id: i64, update: &HistoryUpdate) -> ClientResult<()> {
        let mut state = self.enter_authed("update_history")?;
        let entry = state
            .history
            .iter_mut()
            .find(|h| h.id == Some(id))
            .ok_or_else(|| not_found("History entry", &id.to_string()))?;
        entry.status = update.status.clone();
        entry.reasoning = Some(update.reasoning.clone());
        entry.decision_by = Some(update.decision_by.clone());
        Ok(())
    }
}
