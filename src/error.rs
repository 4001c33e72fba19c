//! Client-side error types.
//!
//! Failures fall into two families: the backend answered with a non-2xx
//! status, or the request never produced a usable response. Views turn
//! either into a single inline message via [`ClientError::user_message`].

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Not logged in")]
    NotLoggedIn,
    #[error("Backend returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Cannot reach backend at {0}")]
    Connection(String),
    #[error("HTTP client error: {0}")]
    Transport(String),
    #[error("Unexpected response: {0}")]
    ResponseParsing(String),
    #[error("{0}")]
    Validation(String),
    #[error("CSV error: {0}")]
    Csv(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Maps a non-2xx status and its body. 401 is special-cased so views
    /// can ask the user to log in instead of showing the raw body.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        if status == StatusCode::UNAUTHORIZED {
            ClientError::Unauthorized
        } else {
            ClientError::Http {
                status: status.as_u16(),
                body,
            }
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Unauthorized | ClientError::NotLoggedIn)
    }

    /// Inline message for a failed action, e.g. `user_message("view patients")`.
    pub fn user_message(&self, action: &str) -> String {
        match self {
            ClientError::Unauthorized | ClientError::NotLoggedIn => {
                format!("Please log in to {action}")
            }
            ClientError::Http { body, status } if body.trim().is_empty() => {
                format!("Failed to {action} (HTTP {status})")
            }
            ClientError::Http { body, .. } => body.trim().to_string(),
            other => other.to_string(),
        }
    }
}

impl From<csv::Error> for ClientError {
    fn from(err: csv::Error) -> Self {
        ClientError::Csv(err.to_string())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
