//! Authentication flows and the in-memory user identity.
//!
//! The server owns the session through an HTTP-only cookie; the client only
//! remembers who the cookie belongs to, for the life of the process.

use std::sync::{Arc, RwLock};

use crate::backend::ClinicalBackend;
use crate::error::{ClientError, ClientResult};
use crate::models::{
    ChangePasswordRequest, ForgotPasswordInfo, LoginCredentials, ResetPasswordInfo,
    SignupCredentials, UserOut,
};
use crate::provenance;

pub struct Session {
    backend: Arc<dyn ClinicalBackend>,
    user: RwLock<Option<UserOut>>,
}

impl Session {
    pub fn new(backend: Arc<dyn ClinicalBackend>) -> Self {
        Self {
            backend,
            user: RwLock::new(None),
        }
    }

    pub fn backend(&self) -> &Arc<dyn ClinicalBackend> {
        &self.backend
    }

    pub fn current_user(&self) -> Option<UserOut> {
        self.user
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_user().is_some()
    }

    /// The logged-in user, or `NotLoggedIn` for flows that write history.
    pub fn require_user(&self) -> ClientResult<UserOut> {
        self.current_user().ok_or(ClientError::NotLoggedIn)
    }

    /// "First Last" of the session user, `"Unknown"` without one.
    pub fn reviewer_name(&self) -> String {
        provenance::reviewer_name(self.current_user().as_ref())
    }

    fn set_user(&self, user: Option<UserOut>) {
        *self
            .user
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = user;
    }

    /// Asks the server who owns the current cookie. Any failure counts as
    /// logged out.
    pub fn check_session(&self) -> Option<UserOut> {
        let user = match self.backend.me() {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(error = %e, "Session check failed");
                None
            }
        };
        self.set_user(user.clone());
        user
    }

    pub fn login(&self, email: &str, password: &str) -> ClientResult<UserOut> {
        let credentials = LoginCredentials {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        match self.backend.login(&credentials) {
            Ok(user) => {
                tracing::info!(user_id = user.id, "Logged in");
                self.set_user(Some(user.clone()));
                Ok(user)
            }
            Err(e) => {
                self.set_user(None);
                Err(friendly(e, "Invalid email or password. Please try again."))
            }
        }
    }

    /// Google sign-in: the server sets the cookie, then `me` says who we are.
    pub fn login_with_google(&self, token: &str) -> ClientResult<UserOut> {
        if let Err(e) = self.backend.google_auth(token) {
            self.set_user(None);
            return Err(friendly(e, "Google login failed"));
        }
        self.check_session()
            .ok_or_else(|| ClientError::Validation("Google login failed".into()))
    }

    /// Creates an account. The user still has to log in afterwards.
    pub fn signup(&self, credentials: &SignupCredentials) -> ClientResult<UserOut> {
        let result = self
            .backend
            .register(credentials)
            .map_err(|e| friendly(e, "Signup failed. Please try again."));
        self.set_user(None);
        result
    }

    /// Clears the local identity even when the server call fails.
    pub fn logout(&self) {
        if let Err(e) = self.backend.logout() {
            tracing::warn!(error = %e, "Logout request failed");
        }
        self.set_user(None);
        tracing::info!("Logged out");
    }

    pub fn change_password(&self, current: &str, new: &str) -> ClientResult<()> {
        self.require_user()?;
        self.backend
            .change_password(&ChangePasswordRequest {
                current_password: current.to_string(),
                new_password: new.to_string(),
            })
            .map_err(|e| friendly(e, "Password change failed"))
    }

    pub fn forgot_password(&self, email: &str) -> ClientResult<()> {
        self.backend
            .forgot_password(&ForgotPasswordInfo {
                email: email.trim().to_string(),
            })
            .map_err(|e| friendly(e, "Failed to send reset email"))
    }

    pub fn reset_password(&self, token: &str, password: &str, confirm: &str) -> ClientResult<()> {
        if password != confirm {
            return Err(ClientError::Validation("Passwords do not match".into()));
        }
        self.backend
            .reset_password(&ResetPasswordInfo {
                token: token.to_string(),
                new_password: password.to_string(),
            })
            .map_err(|e| friendly(e, "Failed to reset password"))
    }
}

/// Rejections from the auth endpoints become one fixed message; transport
/// problems keep their own text so the user can tell the backend is down.
fn friendly(err: ClientError, message: &str) -> ClientError {
    match err {
        ClientError::Unauthorized | ClientError::Http { .. } => {
            ClientError::Validation(message.to_string())
        }
        other => other,
    }
}
