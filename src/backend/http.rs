use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::ClinicalBackend;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::models::{
    ChangePasswordRequest, CombinedRequest, CombinedResponse, ForgotPasswordInfo,
    GoogleAuthToken, HistoryEntry, HistoryUpdate, IcdPredictionResponse, IcdRequestPayload,
    LoginCredentials, NewHistoryEntry, Patient, RefillEvaluation, RefillRequestPayload,
    ResetPasswordInfo, SignupCredentials, UserOut,
};

/// Blocking REST client for the decision-support backend.
///
/// The session cookie set by `/unauth/login` lives in the client's cookie
/// store and is sent with every later request, for the life of the process.
pub struct HttpBackend {
    config: ClientConfig,
    client: Client,
}

impl HttpBackend {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> ClientResult<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn base_url(&self) -> &str {
        &self.config.api_base
    }

    fn url(&self, path: &str) -> String {
        self.config.url(path)
    }

    /// URL with one extra, percent-encoded path segment (`/patients/{id}`).
    fn url_with_segment(&self, path: &str, segment: &str) -> ClientResult<Url> {
        let mut url = Url::parse(&self.url(path))
            .map_err(|e| ClientError::Validation(format!("Invalid backend URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Validation("Backend URL cannot have a path".into()))?
            .push(segment);
        Ok(url)
    }

    fn send(&self, request: RequestBuilder) -> ClientResult<Response> {
        let response = request.send().map_err(|e| {
            if e.is_connect() {
                ClientError::Connection(self.config.api_base.clone())
            } else if e.is_timeout() {
                ClientError::Transport(format!(
                    "Request timed out after {}s",
                    self.config.timeout_secs
                ))
            } else {
                ClientError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::debug!(status = status.as_u16(), "Backend rejected request");
            return Err(ClientError::from_status(status, body));
        }
        Ok(response)
    }

    fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        self.send(request)?
            .json::<T>()
            .map_err(|e| ClientError::ResponseParsing(e.to_string()))
    }

    fn send_empty(&self, request: RequestBuilder) -> ClientResult<()> {
        self.send(request).map(|_| ())
    }

    fn post_empty<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ClientResult<()> {
        self.send_empty(self.client.post(self.url(path)).json(body))
    }
}

impl ClinicalBackend for HttpBackend {
    fn login(&self, credentials: &LoginCredentials) -> ClientResult<UserOut> {
        self.send_json(self.client.post(self.url("/api/v1/unauth/login")).json(credentials))
    }

    fn register(&self, credentials: &SignupCredentials) -> ClientResult<UserOut> {
        self.send_json(
            self.client
                .post(self.url("/api/v1/unauth/register"))
                .json(credentials),
        )
    }

    fn logout(&self) -> ClientResult<()> {
        self.send_empty(self.client.post(self.url("/api/v1/unauth/logout")))
    }

    fn me(&self) -> ClientResult<Option<UserOut>> {
        match self.send_json(self.client.get(self.url("/api/v1/unauth/me"))) {
            Ok(user) => Ok(Some(user)),
            Err(ClientError::Unauthorized) => Ok(None),
            Err(other) => Err(other),
        }
    }

    fn google_auth(&self, token: &str) -> ClientResult<()> {
        self.post_empty(
            "/api/v1/unauth/google-auth",
            &GoogleAuthToken {
                token: token.to_string(),
            },
        )
    }

    fn change_password(&self, request: &ChangePasswordRequest) -> ClientResult<()> {
        self.post_empty("/api/v1/unauth/change-password", request)
    }

    fn forgot_password(&self, request: &ForgotPasswordInfo) -> ClientResult<()> {
        self.post_empty("/api/v1/unauth/forgot-password", request)
    }

    fn reset_password(&self, request: &ResetPasswordInfo) -> ClientResult<()> {
        self.post_empty("/api/v1/unauth/reset-password", request)
    }

    fn list_patients(&self) -> ClientResult<Vec<Patient>> {
        let body: Value = self.send_json(self.client.get(self.url("/api/v1/patients")))?;
        match body {
            Value::Array(_) => serde_json::from_value(body)
                .map_err(|e| ClientError::ResponseParsing(e.to_string())),
            other => {
                tracing::warn!(kind = json_kind(&other), "Expected patient array");
                Ok(Vec::new())
            }
        }
    }

    fn get_patient(&self, patient_id: &str) -> ClientResult<Patient> {
        let url = self.url_with_segment("/api/v1/patients", patient_id)?;
        self.send_json(self.client.get(url))
    }

    fn create_patient(&self, patient: &Patient) -> ClientResult<Patient> {
        self.send_json(self.client.post(self.url("/api/v1/patients")).json(patient))
    }

    fn update_patient(&self, patient: &Patient) -> ClientResult<()> {
        let url = self.url_with_segment("/api/v1/patients", &patient.patient_id)?;
        self.send_empty(self.client.put(url).json(patient))
    }

    fn delete_patient(&self, patient_id: &str) -> ClientResult<()> {
        let url = self.url_with_segment("/api/v1/patients", patient_id)?;
        self.send_empty(self.client.delete(url))
    }

    fn upload_patients(&self, patients: &[Patient]) -> ClientResult<()> {
        self.post_empty("/api/v1/patients/batch", patients)
    }

    fn evaluate_refill(&self, request: &RefillRequestPayload) -> ClientResult<RefillEvaluation> {
        self.send_json(self.client.post(self.url("/api/v1/evaluate-refill")).json(request))
    }

    fn predict_icd(&self, request: &IcdRequestPayload) -> ClientResult<IcdPredictionResponse> {
        self.send_json(self.client.post(self.url("/api/v1/predict-icd")).json(request))
    }

    fn combined_icd_refill(&self, request: &CombinedRequest) -> ClientResult<CombinedResponse> {
        self.send_json(
            self.client
                .post(self.url("/api/v1/combined_icd_refill"))
                .json(request),
        )
    }

    fn list_history(&self, patient_id: Option<&str>) -> ClientResult<Vec<HistoryEntry>> {
        let mut request = self.client.get(self.url("/api/v1/history"));
        if let Some(id) = patient_id {
            request = request.query(&[("patient_id", id)]);
        }
        let body: Value = self.send_json(request)?;
        match body {
            Value::Array(_) => serde_json::from_value(body)
                .map_err(|e| ClientError::ResponseParsing(e.to_string())),
            other => {
                tracing::warn!(kind = json_kind(&other), "Expected history array");
                Ok(Vec::new())
            }
        }
    }

    fn record_history(&self, entries: &[NewHistoryEntry]) -> ClientResult<()> {
        self.post_empty("/api/v1/history/batch", entries)
    }

    fn update_history(&self, id: i64, update: &HistoryUpdate) -> ClientResult<()> {
        let url = self.url_with_segment("/api/v1/history", &id.to_string())?;
        self.send_empty(self.client.patch(url).json(update))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_trims_trailing_slash() {
        let backend = HttpBackend::new(ClientConfig::new("http://localhost:8000/", 5)).unwrap();
        assert_eq!(backend.base_url(), "http://localhost:8000");
    }

    #[test]
    fn patient_id_segment_is_encoded() {
        let backend = HttpBackend::new(ClientConfig::default()).unwrap();
        let url = backend
            .url_with_segment("/api/v1/patients", "P 1/2")
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/v1/patients/P%201%2F2");
    }

    #[test]
    fn unreachable_backend_is_connection_error() {
        // Port 9 (discard) is closed on test machines.
        let backend = HttpBackend::new(ClientConfig::new("http://127.0.0.1:9", 2)).unwrap();
        let err = backend.list_patients().unwrap_err();
        assert!(
            matches!(err, ClientError::Connection(_) | ClientError::Transport(_)),
            "{err:?}"
        );
    }

    #[test]
    fn json_kind_names() {
        assert_eq!(json_kind(&Value::Null), "null");
        assert_eq!(json_kind(&serde_json::json!({"a": 1})), "object");
    }
}
