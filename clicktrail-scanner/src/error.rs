use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Browser error: {0}")]
    BrowserError(#[from] chromiumoxide::error::CdpError),

    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Navigation to {url} failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("{url} left the audited origin, landed on {landed}")]
    OffOrigin { url: String, landed: String },

    #[error("No element at index {index} for selector {selector}")]
    ElementNotFound { selector: String, index: usize },

    #[error("Script error: {0}")]
    ScriptError(String),

    #[error("{0} is not supported by this driver")]
    Unsupported(&'static str),

    #[error("Browser is already closed")]
    AlreadyClosed,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl ScanError {
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        ScanError::Timeout {
            operation: operation.into(),
            timeout,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
