//! Error types returned by the routers.

use approute_core::{DocumentError, InvalidAppId};

use crate::storage::CacheError;
use crate::transport::TransportError;

/// Errors returned by router operations.
///
/// Cloned once per waiter when a coalesced fetch completes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    #[error("invalid application id: {0}")]
    InvalidAppId(#[from] InvalidAppId),
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),
    #[error("network failure: {0}")]
    NetworkFailure(String),
    #[error("malformed router response: {0}")]
    MalformedResponse(String),
    #[error("no RTM server available for {app_id}")]
    NoFallbackAvailable { app_id: String },
    #[error("resolution was cancelled before it completed")]
    Cancelled,
}

impl RouterError {
    /// Whether the error came from talking to the remote router.
    #[must_use]
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            RouterError::NetworkFailure(_) | RouterError::MalformedResponse(_)
        )
    }
}

impl From<CacheError> for RouterError {
    fn from(e: CacheError) -> Self {
        RouterError::CacheUnavailable(e.to_string())
    }
}

impl From<TransportError> for RouterError {
    fn from(e: TransportError) -> Self {
        RouterError::NetworkFailure(e.to_string())
    }
}

impl From<DocumentError> for RouterError {
    fn from(e: DocumentError) -> Self {
        RouterError::MalformedResponse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_pick_the_right_kind() {
        let e: RouterError = CacheError::Unavailable("disk full".into()).into();
        assert!(matches!(e, RouterError::CacheUnavailable(_)));

        let e: RouterError = TransportError::Timeout { timeout_ms: 10 }.into();
        assert!(e.is_fetch_failure());
        assert!(matches!(e, RouterError::NetworkFailure(_)));

        let e: RouterError = DocumentError::NotAnObject.into();
        assert!(e.is_fetch_failure());
        assert!(matches!(e, RouterError::MalformedResponse(_)));
    }

    #[test]
    fn cancelled_is_not_a_fetch_failure() {
        assert!(!RouterError::Cancelled.is_fetch_failure());
    }
}
