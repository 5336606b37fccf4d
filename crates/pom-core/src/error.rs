//! Unified Error Model
use crate::data_model::ProofState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    #[error("CONTENT/UNSUPPORTED: {0}")]
    UnsupportedContentType(String),

    #[error("CHALLENGE/EXPIRED: challenge {0} is past its deadline")]
    ChallengeExpired(String),

    #[error("LEDGER/UNAVAILABLE: {0}")]
    LedgerUnavailable(String),

    #[error("PLATFORM/UNAVAILABLE: {0}")]
    PlatformUnavailable(String),

    #[error("TIMEOUT/{operation}: no answer within {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("ANCHOR/DUPLICATE: fingerprint {0} is already anchored")]
    DuplicateAnchor(String),

    #[error("LIFECYCLE/INVALID: cannot apply {event} to a {from} record")]
    InvalidTransition { from: ProofState, event: String },

    #[error("LEDGER/FUNDS: {0}")]
    InsufficientFunds(String),

    #[error("NOT_FOUND/{0}")]
    NotFound(String),

    #[error("INPUT/{0}")]
    InvalidInput(String),

    #[error("STORAGE/{0}")]
    Storage(String),

    #[error("CONFIG/{0}")]
    Config(String),
}

/// How a caller should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The request cannot succeed as submitted.
    Fatal,
    /// The workflow can continue after a corrective step (e.g. reissuing a challenge).
    Recoverable,
    /// Transient; retry the same call with backoff.
    Retryable,
    /// A lifecycle invariant would be broken. Never retried.
    Conflict,
}

impl ProofError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::LedgerUnavailable(_) | Self::PlatformUnavailable(_) | Self::Timeout { .. } => {
                ErrorClass::Retryable
            }
            Self::ChallengeExpired(_) => ErrorClass::Recoverable,
            Self::DuplicateAnchor(_) | Self::InvalidTransition { .. } => ErrorClass::Conflict,
            Self::UnsupportedContentType(_)
            | Self::InsufficientFunds(_)
            | Self::NotFound(_)
            | Self::InvalidInput(_)
            | Self::Storage(_)
            | Self::Config(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    /// Stable machine-readable code, used in API bodies and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedContentType(_) => "unsupported_content_type",
            Self::ChallengeExpired(_) => "challenge_expired",
            Self::LedgerUnavailable(_) => "ledger_unavailable",
            Self::PlatformUnavailable(_) => "platform_unavailable",
            Self::Timeout { .. } => "timeout",
            Self::DuplicateAnchor(_) => "duplicate_anchor",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::InsufficientFunds(_) => "insufficient_funds",
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
        }
    }

    pub fn invalid_transition(from: ProofState, event: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from,
            event: event.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(ProofError::LedgerUnavailable("down".into()).is_retryable());
        assert!(ProofError::timeout("ledger.commit", std::time::Duration::from_secs(2)).is_retryable());
        assert_eq!(
            ProofError::ChallengeExpired("c1".into()).class(),
            ErrorClass::Recoverable
        );
        assert_eq!(
            ProofError::invalid_transition(ProofState::Draft, "anchored").class(),
            ErrorClass::Conflict
        );
        assert!(!ProofError::InsufficientFunds("empty".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = ProofError::invalid_transition(ProofState::Draft, "anchored");
        assert_eq!(
            err.to_string(),
            "LIFECYCLE/INVALID: cannot apply anchored to a draft record"
        );

        let err = ProofError::timeout("platform.fetch", std::time::Duration::from_millis(1500));
        assert_eq!(err.to_string(), "TIMEOUT/platform.fetch: no answer within 1500ms");
    }
}
