//! Error types for pagewatch

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrapeError {
    /// A backend failed to launch, connect or navigate.
    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("Challenge page still present on {backend} after {attempts} attempts")]
    ChallengeUnresolved { backend: String, attempts: u32 },

    /// Page content did not qualify as a real render.
    #[error("Content rejected: {0}")]
    ContentRejected(String),

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Failed to load cookies from {path}: {reason}")]
    CookieLoad { path: PathBuf, reason: String },

    #[error("Failed to store cookies at {path}: {reason}")]
    CookieStore { path: PathBuf, reason: String },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Timed out after {waited_ms}ms waiting for {what}")]
    Timeout { what: String, waited_ms: u64 },

    #[error("Failed to parse markup: {0}")]
    Parse(String),

    #[error("Failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("All backends exhausted without qualifying content ({attempts} attempts)")]
    AllBackendsExhausted { attempts: u32 },

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File system error")]
    Io(#[from] std::io::Error),
}

impl ScrapeError {
    pub(crate) fn timeout(what: impl Into<String>, waited: std::time::Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            waited_ms: waited.as_millis() as u64,
        }
    }
}

impl From<figment::Error> for ScrapeError {
    fn from(e: figment::Error) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;
