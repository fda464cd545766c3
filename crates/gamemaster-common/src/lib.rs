//! # GameMaster Common
//!
//! Logging configuration and shared error helpers for the GameMaster
//! offline worker crates.
//!
//! ## Features
//!
//! - Logging configuration and setup (`tracing-subscriber`)
//! - Error classification shared across crate boundaries

use thiserror::Error;

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};

/// Classification for errors that cross crate boundaries.
///
/// Each crate keeps its own error enum; this trait lets callers (the
/// harness, log fields) treat them uniformly.
pub trait ErrorCategory {
    /// Short, stable category name used in logs and reports.
    fn category(&self) -> &'static str;

    /// Whether the host could reasonably retry the failed operation.
    fn is_retryable(&self) -> bool {
        false
    }
}

/// A configuration value could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {kind}: {value}")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseError {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

impl ErrorCategory for ParseError {
    fn category(&self) -> &'static str {
        "config"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("log format", "yaml");
        assert_eq!(err.to_string(), "Invalid log format: yaml");
        assert_eq!(err.category(), "config");
        assert!(!err.is_retryable());
    }
}
