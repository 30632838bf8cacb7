//! Scripted in-memory transport for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{RouterTransport, TransportError, TransportResponse};

#[derive(Debug, Clone)]
enum Reply {
    Response(TransportResponse),
    Error(TransportError),
}

/// Answers requests from a list of `(url prefix, reply)` rules.
///
/// The most recently added matching rule wins, so a test can change the
/// server's answer midway. Every requested URL is recorded.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    rules: Mutex<Vec<(String, Reply)>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
    panic_next: AtomicBool,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every request sleeps for `delay` before answering.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The next request panics instead of answering.
    pub(crate) fn panic_once(self) -> Self {
        self.panic_next.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn respond(self, prefix: &str, status: u16, body: &str) -> Self {
        self.set_response(prefix, status, body);
        self
    }

    pub(crate) fn fail(self, prefix: &str, error: TransportError) -> Self {
        self.set_error(prefix, error);
        self
    }

    pub(crate) fn set_response(&self, prefix: &str, status: u16, body: &str) {
        self.rules.lock().push((
            prefix.to_string(),
            Reply::Response(TransportResponse {
                status,
                body: body.as_bytes().to_vec(),
            }),
        ));
    }

    pub(crate) fn set_error(&self, prefix: &str, error: TransportError) {
        self.rules
            .lock()
            .push((prefix.to_string(), Reply::Error(error)));
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub(crate) fn call_count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|url| url.starts_with(prefix))
            .count()
    }

    /// Highest number of requests that were ever running at the same time.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RouterTransport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, TransportError> {
        self.calls.lock().push(url.to_string());
        assert!(
            !self.panic_next.swap(false, Ordering::SeqCst),
            "scripted transport panic for {url}"
        );
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let reply = self
            .rules
            .lock()
            .iter()
            .rev()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone());

        match reply {
            Some(Reply::Response(resp)) => Ok(resp),
            Some(Reply::Error(e)) => Err(e),
            None => Ok(TransportResponse {
                status: 404,
                body: Vec::new(),
            }),
        }
    }
}
