// src/errors.rs
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read session store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session store {path} is not a valid array of account records: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// Per-account failures. Each of these is local to one session run and must
// never abort a concurrent run or the final store write.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("browser error: {0}")]
    Browser(String),
    #[error("navigation to the login page failed: {0}")]
    Navigation(String),
    #[error("login form interaction failed: {0}")]
    Form(String),
    #[error("site rejected the credentials")]
    InvalidCredentials,
    #[error("manual CAPTCHA window elapsed without resolution")]
    CaptchaTimeout,
    #[error("login did not reach a terminal state within the configured window")]
    OutcomeTimeout,
    #[error("login looked successful but the '{0}' cookie never appeared")]
    CookieNotFound(String),
}

impl RunError {
    // Short tag used for screenshot filenames so failures are easy to triage
    // in the per-account directory.
    pub fn tag(&self) -> &'static str {
        match self {
            RunError::Browser(_) => "error_browser",
            RunError::Navigation(_) => "error_navigation",
            RunError::Form(_) => "error_login_form",
            RunError::InvalidCredentials => "error_invalid_credentials",
            RunError::CaptchaTimeout => "error_captcha_timeout",
            RunError::OutcomeTimeout => "error_timeout",
            RunError::CookieNotFound(_) => "error_cookie_missing",
        }
    }
}
