//! HTTP transport abstraction for testability.
//!
//! All upstream traffic goes through the [`Transport`] trait so that the
//! client, the upload pipeline, and the poller can be exercised against a
//! mock in tests. The real implementation wraps a shared `reqwest::Client`
//! with connection keep-alive.

use crate::config::ProxySettings;
use std::future::Future;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Default User-Agent string for upstream requests.
/// The upstream rejects requests without a browser-looking User-Agent.
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Transport-level errors.
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    /// Connection-level failure (DNS, connect, reset, body read).
    #[error("network error: {0}")]
    Network(String),

    /// The request exceeded its timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl TransportError {
    /// True for failures where no HTTP response was received.
    ///
    /// Retry policies back off longer for these than for status failures.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    /// HTTP status code, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Async HTTP operations used by the gateway.
///
/// Header slices are `(name, value)` pairs; callers own the formatting of
/// dynamic values (dates, signatures, tokens).
pub trait Transport: Send + Sync {
    /// Performs a GET request and returns the response body.
    fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    /// Performs a POST request with a JSON body.
    fn post_json(
        &self,
        url: &str,
        json_body: &str,
        headers: &[(&str, &str)],
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    /// Performs a POST request with a raw byte body.
    fn post_bytes(
        &self,
        url: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;
}

/// Sharing a transport across components keeps one connection pool.
impl<T: Transport> Transport for std::sync::Arc<T> {
    fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send {
        (**self).get(url, headers)
    }

    fn post_json(
        &self,
        url: &str,
        json_body: &str,
        headers: &[(&str, &str)],
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send {
        (**self).post_json(url, json_body, headers)
    }

    fn post_bytes(
        &self,
        url: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send {
        (**self).post_bytes(url, body, headers)
    }
}

/// Real transport over a pooled `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with the given per-request timeout.
    ///
    /// Connection pooling keeps upstream connections warm between the
    /// submit, poll, and upload calls of a single generation.
    pub fn new(timeout_secs: u64) -> Result<Self, TransportError> {
        Self::builder(timeout_secs)
            .build()
            .map(|client| Self { client })
            .map_err(|e| TransportError::Network(format!("failed to create HTTP client: {}", e)))
    }

    /// Creates a transport routed through a SOCKS5 proxy.
    pub fn with_proxy(timeout_secs: u64, proxy: &ProxySettings) -> Result<Self, TransportError> {
        let mut upstream_proxy = reqwest::Proxy::all(proxy.url())
            .map_err(|e| TransportError::Network(format!("invalid proxy url: {}", e)))?;
        if !proxy.bypass.is_empty() {
            let no_proxy = reqwest::NoProxy::from_string(&proxy.bypass.join(","));
            upstream_proxy = upstream_proxy.no_proxy(no_proxy);
        }

        Self::builder(timeout_secs)
            .proxy(upstream_proxy)
            .connect_timeout(std::time::Duration::from_secs(proxy.timeout_secs))
            .build()
            .map(|client| Self { client })
            .map_err(|e| TransportError::Network(format!("failed to create HTTP client: {}", e)))
    }

    fn builder(timeout_secs: u64) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent(DEFAULT_USER_AGENT)
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .tcp_nodelay(true)
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<Vec<u8>, TransportError> {
        let response = request.send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Upstream returned error status");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(classify)?;
        trace!(bytes = bytes.len(), "Response body read");
        Ok(bytes.to_vec())
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else {
        TransportError::Network(e.to_string())
    }
}

impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Vec<u8>, TransportError> {
        debug!(url = url, "HTTP GET");
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        self.execute(request).await
    }

    async fn post_json(
        &self,
        url: &str,
        json_body: &str,
        headers: &[(&str, &str)],
    ) -> Result<Vec<u8>, TransportError> {
        debug!(url = url, "HTTP POST (json)");
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(json_body.to_string());
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        self.execute(request).await
    }

    async fn post_bytes(
        &self,
        url: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> Result<Vec<u8>, TransportError> {
        debug!(url = url, bytes = body.len(), "HTTP POST (bytes)");
        let mut request = self.client.post(url).body(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        self.execute(request).await
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// One request observed by the mock.
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub method: String,
        pub url: String,
        pub body: Vec<u8>,
        pub headers: Vec<(String, String)>,
    }

    type Handler = Box<dyn Fn(&RecordedRequest) -> Result<Vec<u8>, TransportError> + Send + Sync>;

    /// Scripted mock transport.
    ///
    /// Responses are served FIFO regardless of URL; tests queue them in the
    /// order the code under test issues requests, and can inspect every
    /// recorded request afterwards. Concurrent tests install a handler
    /// instead, which answers each request by inspecting it.
    #[derive(Default)]
    pub struct MockTransport {
        responses: Mutex<VecDeque<Result<Vec<u8>, TransportError>>>,
        requests: Mutex<Vec<RecordedRequest>>,
        handler: Mutex<Option<Handler>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues a raw response body.
        pub fn push_ok(&self, body: impl Into<Vec<u8>>) {
            self.responses.lock().unwrap().push_back(Ok(body.into()));
        }

        /// Queues a JSON response body.
        pub fn push_json(&self, value: serde_json::Value) {
            self.push_ok(value.to_string().into_bytes());
        }

        /// Queues an error.
        pub fn push_err(&self, err: TransportError) {
            self.responses.lock().unwrap().push_back(Err(err));
        }

        /// Installs a request-inspecting handler, replacing FIFO serving.
        pub fn set_handler(
            &self,
            handler: impl Fn(&RecordedRequest) -> Result<Vec<u8>, TransportError>
                + Send
                + Sync
                + 'static,
        ) {
            *self.handler.lock().unwrap() = Some(Box::new(handler));
        }

        /// Returns all requests observed so far.
        pub fn recorded(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }

        /// Number of requests observed so far.
        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn record_and_pop(
            &self,
            method: &str,
            url: &str,
            body: Vec<u8>,
            headers: &[(&str, &str)],
        ) -> Result<Vec<u8>, TransportError> {
            let request = RecordedRequest {
                method: method.to_string(),
                url: url.to_string(),
                body,
                headers: headers
                    .iter()
                    .map(|(n, v)| (n.to_string(), v.to_string()))
                    .collect(),
            };
            self.requests.lock().unwrap().push(request.clone());

            if let Some(handler) = self.handler.lock().unwrap().as_ref() {
                return handler(&request);
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(TransportError::Network("mock response queue empty".into()))
                })
        }
    }

    impl Transport for MockTransport {
        async fn get(
            &self,
            url: &str,
            headers: &[(&str, &str)],
        ) -> Result<Vec<u8>, TransportError> {
            self.record_and_pop("GET", url, Vec::new(), headers)
        }

        async fn post_json(
            &self,
            url: &str,
            json_body: &str,
            headers: &[(&str, &str)],
        ) -> Result<Vec<u8>, TransportError> {
            self.record_and_pop("POST", url, json_body.as_bytes().to_vec(), headers)
        }

        async fn post_bytes(
            &self,
            url: &str,
            body: Vec<u8>,
            headers: &[(&str, &str)],
        ) -> Result<Vec<u8>, TransportError> {
            self.record_and_pop("POST", url, body, headers)
        }
    }

    #[test]
    fn test_error_classification() {
        assert!(TransportError::Network("x".into()).is_network());
        assert!(TransportError::Timeout("x".into()).is_network());
        assert!(!TransportError::Status {
            status: 500,
            body: String::new()
        }
        .is_network());
    }

    #[test]
    fn test_status_accessor() {
        let err = TransportError::Status {
            status: 429,
            body: "slow down".into(),
        };
        assert_eq!(err.status(), Some(429));
        assert_eq!(TransportError::Network("x".into()).status(), None);
    }

    #[tokio::test]
    async fn test_mock_serves_fifo() {
        let mock = MockTransport::new();
        mock.push_ok(b"first".to_vec());
        mock.push_ok(b"second".to_vec());

        assert_eq!(mock.get("http://a", &[]).await.unwrap(), b"first");
        assert_eq!(mock.get("http://b", &[]).await.unwrap(), b"second");
        assert!(mock.get("http://c", &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let mock = MockTransport::new();
        mock.push_ok(Vec::new());
        mock.post_json("http://x/api", "{}", &[("h", "v")])
            .await
            .unwrap();

        let recorded = mock.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].method, "POST");
        assert_eq!(recorded[0].url, "http://x/api");
        assert_eq!(recorded[0].headers, vec![("h".to_string(), "v".to_string())]);
    }
}
