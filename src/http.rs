//! HTTP client abstraction for the basket service.
//!
//! This module defines the `HttpClient` trait to abstract request execution,
//! enabling testability with mock implementations. Classification of responses
//! into outcomes lives in [`crate::domain::outcome`].

use crate::domain::identity::{ClientProfile, ResolvedIdentity};
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Response from an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as a string
    pub body: String,
}

/// One call to the basket service, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiRequest {
    /// HTTP method (e.g., "POST")
    pub method: String,
    /// The path portion of the URL (e.g., "/basket/items")
    pub path: String,
    /// The request body as a JSON string, empty for none
    pub body: String,
}

impl ApiRequest {
    /// Build a `POST` carrying `body` as JSON.
    ///
    /// # Errors
    /// Returns a serialization error if `body` cannot be encoded.
    pub fn post_json<T: Serialize>(path: impl Into<String>, body: &T) -> Result<Self> {
        Ok(Self {
            method: "POST".to_string(),
            path: path.into(),
            body: serde_json::to_string(body)?,
        })
    }

    /// Mock lookup key, "{method} {path}".
    pub fn key(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Trait for executing HTTP requests against the basket service.
///
/// Implementations send the identity headers with every call and return the raw
/// status and body. Any status, including 409, is an `Ok` response; `Err` is reserved
/// for calls that got no response at all.
///
/// # Example
/// ```ignore
/// let client = ReqwestHttpClient::new("https://basket.example.com", 30_000, ClientProfile::default())?;
/// let response = client.execute(&request, &identity).await?;
/// println!("Status: {}, Body: {}", response.status, response.body);
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync + Clone {
    /// Execute one request.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The request fails due to network issues
    /// - The request times out
    /// - The URL or a header value is invalid
    async fn execute(&self, request: &ApiRequest, identity: &ResolvedIdentity)
    -> Result<HttpResponse>;
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

/// Production HTTP client using reqwest.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    base_url: String,
    profile: ClientProfile,
}

impl ReqwestHttpClient {
    /// Create a client for `base_url` with a per-request timeout.
    ///
    /// # Errors
    /// Returns an error if the underlying client cannot be built (e.g. TLS backend).
    pub fn new(base_url: &str, timeout_ms: u64, profile: ClientProfile) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self::with_client(client, base_url, profile))
    }

    /// Wrap an already configured reqwest client (custom proxy or TLS settings).
    pub fn with_client(client: reqwest::Client, base_url: &str, profile: ClientProfile) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            profile,
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    #[tracing::instrument(skip(self, request, identity), fields(method = %request.method, path = %request.path))]
    async fn execute(
        &self,
        request: &ApiRequest,
        identity: &ResolvedIdentity,
    ) -> Result<HttpResponse> {
        let url = format!("{}{}", self.base_url, request.path);

        tracing::debug!(url = %url, "Executing HTTP request");

        let method = request.method.parse::<reqwest::Method>().map_err(|e| {
            tracing::error!(method = %request.method, error = %e, "Invalid HTTP method");
            anyhow::anyhow!("Invalid HTTP method '{}': {}", request.method, e)
        })?;

        let mut req = self
            .client
            .request(method, &url)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json");

        for (name, value) in identity.headers().into_iter().chain(self.profile.headers()) {
            req = req.header(name, value);
        }

        if let Some(session) = &identity.session {
            req = req.header("Cookie", session.as_str());
            tracing::trace!("Added session cookie");
        }

        if !request.body.is_empty() {
            req = req.body(request.body.clone());
            tracing::trace!(body_len = request.body.len(), "Added request body");
        }

        let response = req.send().await.map_err(|e| {
            tracing::error!(url = %url, error = %e, "HTTP request failed");
            e
        })?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::debug!(
            status = status,
            response_len = body.len(),
            "HTTP request completed"
        );

        Ok(HttpResponse { status, body })
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Mock HTTP client for testing.
///
/// Allows configuring predetermined responses for specific requests without
/// making actual HTTP calls.
///
/// # Example
/// ```ignore
/// let mock = MockHttpClient::new();
/// mock.add_status("POST /basket/items", 409, r#"{"data":{"basketId":"B1"}}"#);
/// mock.add_status("POST /basket/items", 200, r#"{"basket":{"id":"B1"}}"#);
/// ```
#[derive(Clone)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, Vec<Result<HttpResponse>>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

/// Record of a call made to the mock HTTP client.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub method: String,
    pub path: String,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl MockCall {
    /// Body parsed as JSON, `Null` when empty or not JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap_or(serde_json::Value::Null)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl MockHttpClient {
    /// Create a new mock HTTP client.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Add a predetermined response for a specific method and path.
    ///
    /// The key is formatted as "{method} {path}". Multiple responses can be
    /// added for the same key - they will be returned in FIFO order.
    pub fn add_response(&self, key: &str, response: Result<HttpResponse>) {
        self.responses
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(response);
    }

    /// Shorthand for [`add_response`](Self::add_response) with a status and body.
    pub fn add_status(&self, key: &str, status: u16, body: &str) {
        self.add_response(
            key,
            Ok(HttpResponse {
                status,
                body: body.to_string(),
            }),
        );
    }

    /// Get all calls that have been made to this mock client.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Calls made to one path, in order.
    pub fn calls_to(&self, path: &str) -> Vec<MockCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.path == path)
            .cloned()
            .collect()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Highest number of requests that were executing at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(
        &self,
        request: &ApiRequest,
        identity: &ResolvedIdentity,
    ) -> Result<HttpResponse> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        // Guard to ensure we decrement even if cancelled/panicked
        let _guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
        };

        let mut headers: Vec<(String, String)> = identity
            .headers()
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        if let Some(session) = &identity.session {
            headers.push(("Cookie".to_string(), session.clone()));
        }

        self.calls.lock().push(MockCall {
            method: request.method.clone(),
            path: request.path.clone(),
            body: request.body.clone(),
            headers,
        });

        // Yield so overlapping callers would be observable through max_in_flight
        tokio::task::yield_now().await;

        let key = request.key();
        let response = {
            let mut responses = self.responses.lock();
            responses
                .get_mut(&key)
                .filter(|queue| !queue.is_empty())
                .map(|queue| queue.remove(0))
        };

        response.unwrap_or_else(|| {
            Err(crate::error::CaddieError::Other(anyhow::anyhow!(
                "No mock response configured for {}",
                key
            )))
        })
    }
}

/// Guard that decrements the in-flight counter when dropped.
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
