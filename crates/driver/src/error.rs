//! Error types for the verification driver

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Element not found: none of [{}] matched within {timeout_ms} ms", selectors.join(", "))]
    ElementNotFound {
        selectors: Vec<String>,
        timeout_ms: u64,
    },

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout after {timeout_ms} ms waiting for: {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("Browser bridge error: {0}")]
    Bridge(String),

    #[error("Node.js not found at '{0}'. Install Node.js and run: npm i playwright")]
    NodeNotFound(String),

    #[error("Readiness check failed for {url} after {attempts} attempts")]
    NotReady { url: String, attempts: usize },

    #[error("Feature list error: {0}")]
    FeatureList(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Expected, scenario-level failure categories.
///
/// Errors that map to one of these are recorded in the run report. Errors
/// that map to none of them abort the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ElementNotFound,
    NavigationFailure,
    AssertionFailure,
    NetworkError,
    Timeout,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ElementNotFound => "element_not_found",
            FailureKind::NavigationFailure => "navigation_failure",
            FailureKind::AssertionFailure => "assertion_failure",
            FailureKind::NetworkError => "network_error",
            FailureKind::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DriverError {
    /// Classify this error; `None` means it is not an expected step failure.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            DriverError::ElementNotFound { .. } => Some(FailureKind::ElementNotFound),
            DriverError::Navigation(_) => Some(FailureKind::NavigationFailure),
            DriverError::AssertionFailed(_) => Some(FailureKind::AssertionFailure),
            DriverError::Network(_) | DriverError::Http(_) => Some(FailureKind::NetworkError),
            DriverError::Timeout { .. } => Some(FailureKind::Timeout),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_failures_are_classified() {
        let err = DriverError::ElementNotFound {
            selectors: vec![".cart-icon".into()],
            timeout_ms: 100,
        };
        assert_eq!(err.failure_kind(), Some(FailureKind::ElementNotFound));
        assert_eq!(
            DriverError::Navigation("refused".into()).failure_kind(),
            Some(FailureKind::NavigationFailure)
        );
    }

    #[test]
    fn test_unexpected_errors_are_unclassified() {
        assert!(DriverError::InvalidScenario("no steps".into()).failure_kind().is_none());
        assert!(DriverError::Bridge("pipe closed".into()).failure_kind().is_none());
    }

    #[test]
    fn test_not_found_message_lists_candidates() {
        let err = DriverError::ElementNotFound {
            selectors: vec!["[data-testid=cart]".into(), ".cart-icon".into()],
            timeout_ms: 5000,
        };
        assert_eq!(
            err.to_string(),
            "Element not found: none of [[data-testid=cart], .cart-icon] matched within 5000 ms"
        );
    }
}
