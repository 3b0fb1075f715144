//! HTTP Client Abstraction
//!
//! Plain GET transport for the manifest endpoint and the static asset URLs
//! it advertises. Asset bodies are streamed, never buffered whole.

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// A GET for a JSON document. Assets go through
/// [`HttpClient::download_stream`] instead.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    /// Overrides the client's own request timeout
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            timeout: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn timeout(self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self
        }
    }
}

/// Fully buffered response.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Decode the body. A decode failure is `OperationFailed` carrying the
    /// serde message.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| BridgeError::OperationFailed(format!("Response is not valid JSON: {}", e)))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into [`BridgeError::HttpStatus`].
    pub fn error_for_status(self, url: &str) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(BridgeError::HttpStatus {
                status: self.status,
                url: url.to_string(),
            })
        }
    }
}

/// Statuses worth asking again for: server trouble and rate limiting.
pub fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 429
}

/// How often, and how patiently, [`HttpClient::execute_with_retry`] asks.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first; zero counts as one
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Ceiling for any single wait
    pub max_delay: Duration,
    /// Double the wait after every attempt instead of keeping it flat
    pub use_exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            use_exponential_backoff: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that performs exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if !self.use_exponential_backoff {
            return self.base_delay.min(self.max_delay);
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Transport seam between the sync core and the host's HTTP stack.
///
/// Implementations own connection pooling, TLS and transport-level timeouts.
/// The sync core adds no timeout of its own.
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest, RetryPolicy};
///
/// async fn fetch_manifest(client: &dyn HttpClient, url: &str) -> Result<Manifest> {
///     client
///         .execute_with_retry(HttpRequest::get(url), RetryPolicy::default())
///         .await?
///         .error_for_status(url)?
///         .json()
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// One attempt, body fully buffered.
    ///
    /// # Errors
    ///
    /// Connection, TLS and timeout failures. Non-2xx statuses come back as
    /// responses, not errors.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Execute an HTTP request, repeating it on transport failures and on
    /// 5xx/429 responses until `policy.max_attempts` is used up.
    ///
    /// The last outcome is returned as is, so an exhausted 503 still comes
    /// back as a response.
    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let attempts = policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let outcome = self.execute(request.clone()).await;
            let retryable = match &outcome {
                Ok(response) => is_retryable_status(response.status),
                Err(e) => e.is_transient(),
            };
            if !retryable || attempt >= attempts {
                return outcome;
            }
            tokio::time::sleep(policy.delay_for(attempt)).await;
            attempt += 1;
        }
    }

    /// Open `url` for streaming. The URL is used verbatim; a non-2xx status
    /// is [`BridgeError::HttpStatus`].
    async fn download_stream(
        &self,
        url: String,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;
}
