//! Error types for the offline worker.

use gamemaster_common::ErrorCategory;
use gamemaster_net::NetError;
use thiserror::Error;

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, ServiceWorkerError>;

/// Errors that can occur in service worker operations.
#[derive(Error, Debug)]
pub enum ServiceWorkerError {
    #[error("Install failed for {url}: {reason}")]
    InstallFailed { url: String, reason: String },

    #[error("State error: {0}")]
    StateError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceWorkerError {
    pub fn install_failed(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::InstallFailed {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn cache(msg: impl Into<String>) -> Self {
        Self::CacheError(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::StateError(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl ErrorCategory for ServiceWorkerError {
    fn category(&self) -> &'static str {
        match self {
            ServiceWorkerError::InstallFailed { .. } => "install",
            ServiceWorkerError::StateError(_) => "state",
            ServiceWorkerError::CacheError(_) => "cache",
            ServiceWorkerError::Config(_) => "config",
            ServiceWorkerError::Client(_) => "client",
            ServiceWorkerError::Network(e) => e.category(),
            ServiceWorkerError::InvalidUrl(_) => "invalid_url",
            ServiceWorkerError::Serialization(_) => "serialization",
            ServiceWorkerError::Io(_) => "io",
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            // The host retries a failed install on its own schedule.
            ServiceWorkerError::InstallFailed { .. } => true,
            ServiceWorkerError::Network(e) => e.is_retryable(),
            _ => false,
        }
    }
}
