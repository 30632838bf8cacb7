//! [`RouterTransport`] implementation over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{RouterTransport, TransportError, TransportResponse};

const USER_AGENT: &str = concat!("approute/", env!("CARGO_PKG_VERSION"));

/// Pooled async HTTP client for router lookups.
///
/// Cheap to clone: clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl ReqwestTransport {
    /// Creates a transport whose requests give up after `request_timeout`.
    ///
    /// Routers apply their own deadline on top; this one only bounds
    /// requests made through the transport directly.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connection`] if the TLS backend cannot be
    /// initialized.
    pub fn new(request_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| TransportError::Connection {
                url: String::new(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            request_timeout,
        })
    }
}

#[async_trait]
impl RouterTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!(
                    url = url,
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    "Router request failed"
                );
                if e.is_timeout() {
                    #[allow(clippy::cast_possible_truncation)]
                    let timeout_ms = self.request_timeout.as_millis() as u64;
                    TransportError::Timeout { timeout_ms }
                } else {
                    TransportError::Connection {
                        url: url.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status().as_u16();
        debug!(url = url, status = status, "Router response received");

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Connection {
                url: url.to_string(),
                reason: format!("failed to read body: {e}"),
            })?;

        Ok(TransportResponse {
            status,
            body: body.to_vec(),
        })
    }
}
