//! Error taxonomy shared by every layer.

use serde::{Deserialize, Serialize};

/// Coarse classification of failures.
///
/// Each crate keeps its own error enum; they all map onto one of these
/// kinds so that the HTTP boundary can pick a status code without knowing
/// the concrete error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed request, missing field, non-positive quantity or TTL.
    InvalidInput,
    /// Reserving would drive available stock negative.
    InsufficientStock,
    /// Reservation or order does not exist.
    NotFound,
    /// Transition from the current status is not permitted.
    InvalidState,
    /// An expected-status guard fired.
    Conflict,
    /// A required store is not wired.
    ServiceUnavailable,
    /// The caller's cancellation token fired. Safe to retry.
    Cancelled,
    /// Everything else.
    Internal,
}

impl ErrorKind {
    /// Returns true if retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::ServiceUnavailable | ErrorKind::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Conflict => "conflict",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_kinds_are_retryable() {
        assert!(ErrorKind::Cancelled.is_retryable());
        assert!(ErrorKind::ServiceUnavailable.is_retryable());
        assert!(!ErrorKind::InvalidState.is_retryable());
        assert!(!ErrorKind::Internal.is_retryable());
    }
}
