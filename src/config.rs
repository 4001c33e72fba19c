use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Clinidash";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Backend used when nothing else is configured.
pub const DEFAULT_API_BASE: &str = "http://localhost:8000";

/// Environment variable naming the backend base URL.
pub const API_BASE_ENV: &str = "CLINIDASH_API_BASE";

/// Environment variable overriding the HTTP request timeout (seconds).
pub const TIMEOUT_ENV: &str = "CLINIDASH_TIMEOUT_SECS";

/// Connect and request timeout used when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Filter applied when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "clinidash=info,clinidash_lib=info,reqwest=warn"
}

/// Where exported CSV files go when the user gives no path.
/// Falls back to the home directory, then the working directory.
pub fn export_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Connection settings for the decision-support backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base: String,
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(api_base: &str, timeout_secs: u64) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            timeout_secs,
        }
    }

    /// Reads `CLINIDASH_API_BASE` and `CLINIDASH_TIMEOUT_SECS`.
    /// Blank or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let base = std::env::var(API_BASE_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let timeout = std::env::var(TIMEOUT_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|&secs| secs > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self::new(&base, timeout)
    }

    /// Absolute URL for an API path such as `/api/v1/patients`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE, DEFAULT_TIMEOUT_SECS)
    }
}
