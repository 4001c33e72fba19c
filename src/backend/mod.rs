//! Decision-support backend access.
//!
//! Every REST endpoint the dashboard consumes is a method on
//! [`ClinicalBackend`]. [`HttpBackend`] talks to the real service with a
//! credentialed cookie store; [`MockBackend`] keeps everything in memory.

pub mod http;
pub mod mock;

pub use http::HttpBackend;
pub use mock::MockBackend;

use crate::error::ClientResult;
use crate::models::{
    ChangePasswordRequest, CombinedRequest, CombinedResponse, ForgotPasswordInfo, HistoryEntry,
    HistoryUpdate, IcdPredictionResponse, IcdRequestPayload, LoginCredentials, NewHistoryEntry,
    Patient, RefillEvaluation, RefillRequestPayload, ResetPasswordInfo, SignupCredentials,
    UserOut,
};

pub trait ClinicalBackend: Send + Sync {
    // ── /unauth ─────────────────────────────────────────────

    fn login(&self, credentials: &LoginCredentials) -> ClientResult<UserOut>;

    fn register(&self, credentials: &SignupCredentials) -> ClientResult<UserOut>;

    fn logout(&self) -> ClientResult<()>;

    /// Current session owner; `None` when the cookie is missing or expired.
    fn me(&self) -> ClientResult<Option<UserOut>>;

    fn google_auth(&self, token: &str) -> ClientResult<()>;

    fn change_password(&self, request: &ChangePasswordRequest) -> ClientResult<()>;

    fn forgot_password(&self, request: &ForgotPasswordInfo) -> ClientResult<()>;

    fn reset_password(&self, request: &ResetPasswordInfo) -> ClientResult<()>;

    // ── /patients ───────────────────────────────────────────

    fn list_patients(&self) -> ClientResult<Vec<Patient>>;

    fn get_patient(&self, patient_id: &str) -> ClientResult<Patient>;

    fn create_patient(&self, patient: &Patient) -> ClientResult<Patient>;

    fn update_patient(&self, patient: &Patient) -> ClientResult<()>;

    fn delete_patient(&self, patient_id: &str) -> ClientResult<()>;

    /// Bulk upsert used by CSV import.
    fn upload_patients(&self, patients: &[Patient]) -> ClientResult<()>;

    // ── decisioning ─────────────────────────────────────────

    fn evaluate_refill(&self, request: &RefillRequestPayload) -> ClientResult<RefillEvaluation>;

    fn predict_icd(&self, request: &IcdRequestPayload) -> ClientResult<IcdPredictionResponse>;

    fn combined_icd_refill(&self, request: &CombinedRequest) -> ClientResult<CombinedResponse>;

    // ── /history ────────────────────────────────────────────

    fn list_history(&self, patient_id: Option<&str>) -> ClientResult<Vec<HistoryEntry>>;

    fn record_history(&self, entries: &[NewHistoryEntry]) -> ClientResult<()>;

    fn update_history(&self, id: i64, update: &HistoryUpdate) -> ClientResult<()>;
}
