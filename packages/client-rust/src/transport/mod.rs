//! HTTP transport boundary used to fetch router documents.
//!
//! Routers only ever issue a single `GET` and look at the status code and the
//! body, so the boundary is one async method. [`http::ReqwestTransport`] is
//! the production implementation; tests script responses instead.

pub mod http;
#[cfg(test)]
pub(crate) mod scripted;

use std::time::Duration;

use async_trait::async_trait;

pub use http::ReqwestTransport;

/// Errors raised while performing a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("invalid request url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request to {url} failed: {reason}")]
    Connection { url: String, reason: String },
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
}

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Returns the body for 2xx responses.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Status`] for any other status.
    pub fn into_success_body(self, url: &str) -> Result<Vec<u8>, TransportError> {
        if (200..300).contains(&self.status) {
            Ok(self.body)
        } else {
            Err(TransportError::Status {
                status: self.status,
                url: url.to_string(),
            })
        }
    }
}

/// Performs HTTP `GET` requests on behalf of the routers.
///
/// Used as `Arc<dyn RouterTransport>`.
#[async_trait]
pub trait RouterTransport: Send + Sync + 'static {
    /// Issue a `GET` for `url` and return the raw response.
    async fn get(&self, url: &str) -> Result<TransportResponse, TransportError>;
}

/// Appends query parameters to `base`.
///
/// # Errors
///
/// Returns [`TransportError::InvalidUrl`] if `base` is not an absolute URL.
pub fn with_query(base: &str, params: &[(&str, &str)]) -> Result<String, TransportError> {
    reqwest::Url::parse_with_params(base, params)
        .map(String::from)
        .map_err(|e| TransportError::InvalidUrl {
            url: base.to_string(),
            reason: e.to_string(),
        })
}

/// Issues a `GET` bounded by `timeout` and returns the 2xx body.
///
/// # Errors
///
/// Returns [`TransportError::Timeout`] when the deadline passes, the
/// transport's own error when the request fails, and
/// [`TransportError::Status`] for non-2xx responses.
pub async fn get_with_timeout(
    transport: &dyn RouterTransport,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>, TransportError> {
    match tokio::time::timeout(timeout, transport.get(url)).await {
        Ok(result) => result?.into_success_body(url),
        Err(_elapsed) => {
            #[allow(clippy::cast_possible_truncation)]
            let timeout_ms = timeout.as_millis() as u64;
            Err(TransportError::Timeout { timeout_ms })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::scripted::ScriptedTransport;
    use super::*;

    #[test]
    fn with_query_encodes_parameters() {
        let url = with_query("https://app-router.com/2/route", &[("appId", "a b")]).unwrap();
        assert_eq!(url, "https://app-router.com/2/route?appId=a+b");
    }

    #[test]
    fn with_query_rejects_relative_urls() {
        let err = with_query("not a url", &[]).unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl { .. }));
    }

    #[test]
    fn non_success_status_is_an_error() {
        let resp = TransportResponse {
            status: 503,
            body: Vec::new(),
        };
        assert_eq!(
            resp.into_success_body("https://x"),
            Err(TransportError::Status {
                status: 503,
                url: "https://x".to_string()
            })
        );
    }

    #[tokio::test]
    async fn slow_requests_time_out() {
        let transport = ScriptedTransport::new()
            .with_delay(Duration::from_millis(200))
            .respond("https://slow", 200, "{}");
        let err = get_with_timeout(&transport, "https://slow", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout { timeout_ms: 20 });
    }

    #[tokio::test]
    async fn fast_requests_return_body() {
        let transport = ScriptedTransport::new().respond("https://fast", 200, "{\"ok\":1}");
        let body = get_with_timeout(&transport, "https://fast", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(body, b"{\"ok\":1}");
    }
}
