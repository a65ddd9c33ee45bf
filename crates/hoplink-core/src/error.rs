//! Error types for hop establishment.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while establishing or tearing down a single hop.
///
/// `Timeout` and `HandshakeFailed` are retried up to the hop's retry
/// budget; the remaining kinds are terminal for the attempt. The error is
/// `Clone` so it can be stored in per-hop status and re-broadcast on the
/// event stream.
#[derive(Error, Debug, Clone)]
pub enum HopError {
    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("hop attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("identity rejected for {0}")]
    IdentityRejected(String),

    #[error("all fallback chains exhausted; last error: {0}")]
    AllFallbacksExhausted(Box<HopError>),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
}

/// Discriminant-only view of [`HopError`], used for matching in status
/// reporting without carrying the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopErrorKind {
    ProfileNotFound,
    HandshakeFailed,
    Timeout,
    IdentityRejected,
    AllFallbacksExhausted,
    ResourceExhausted,
}

impl HopError {
    /// The kind of this error.
    pub fn kind(&self) -> HopErrorKind {
        match self {
            HopError::ProfileNotFound(_) => HopErrorKind::ProfileNotFound,
            HopError::HandshakeFailed(_) => HopErrorKind::HandshakeFailed,
            HopError::Timeout(_) => HopErrorKind::Timeout,
            HopError::IdentityRejected(_) => HopErrorKind::IdentityRejected,
            HopError::AllFallbacksExhausted(_) => HopErrorKind::AllFallbacksExhausted,
            HopError::ResourceExhausted(_) => HopErrorKind::ResourceExhausted,
        }
    }

    /// Whether this error may be retried within the hop's retry budget.
    ///
    /// `IdentityRejected` requires a new explicit trust decision and is
    /// never auto-retried. `ProfileNotFound` and `ResourceExhausted` are
    /// fatal for the affected hop.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HopError::Timeout(_) | HopError::HandshakeFailed(_))
    }

    /// Unwrap the innermost concrete hop error.
    ///
    /// For `AllFallbacksExhausted` this walks down to the last concrete
    /// error; all other variants return themselves.
    pub fn root(&self) -> &HopError {
        match self {
            HopError::AllFallbacksExhausted(inner) => inner.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(HopError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(HopError::HandshakeFailed("refused".into()).is_retryable());
        assert!(!HopError::ProfileNotFound("p1".into()).is_retryable());
        assert!(!HopError::IdentityRejected("host:22".into()).is_retryable());
        assert!(!HopError::ResourceExhausted("no ports".into()).is_retryable());
    }

    #[test]
    fn root_unwraps_nested_fallback_errors() {
        let inner = HopError::Timeout(Duration::from_secs(1));
        let wrapped = HopError::AllFallbacksExhausted(Box::new(
            HopError::AllFallbacksExhausted(Box::new(inner)),
        ));
        assert_eq!(wrapped.root().kind(), HopErrorKind::Timeout);
    }

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            HopError::HandshakeFailed("x".into()).kind(),
            HopErrorKind::HandshakeFailed
        );
    }
}
