//! Fetching the target page for structural analysis.
//!
//! The only suspending operation in a mapping job. `PageSource` is the
//! seam: the job runner holds an `Arc<dyn PageSource>` so tests can drive
//! the state machine without a network.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Classified fetch failure. The job state machine keys its retry and
/// failure-cause decisions off these variants.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out fetching {url} after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("unexpected status {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("target page {url} is not parseable html")]
    Parse { url: String },
}

impl FetchError {
    /// Transient failures are retried with backoff; the rest fail fast.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network { .. } => true,
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            FetchError::Timeout { .. } | FetchError::Parse { .. } => false,
        }
    }
}

/// A fetched page ready for analysis.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub html: String,
}

/// Source of rendered page markup for a mapping job.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// HTTP page source backed by reqwest.
pub struct HttpPageSource {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpPageSource {
    pub fn new(timeout_ms: u64) -> Self {
        let ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                  AppleWebKit/537.36 (KHTML, like Gecko) \
                  Chrome/131.0.0.0 Safari/537.36";

        let timeout = Duration::from_millis(timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(ua)
            .build()
            .unwrap_or_default();

        Self { client, timeout }
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            } else {
                FetchError::Network {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = resp.status().as_u16();
        if status != 200 {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let is_html = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("text/html") || ct.contains("application/xhtml"))
            .unwrap_or(true);
        if !is_html {
            return Err(FetchError::Parse {
                url: url.to_string(),
            });
        }

        let body = resp.text().await.map_err(|e| FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        if body.trim().is_empty() {
            return Err(FetchError::Parse {
                url: url.to_string(),
            });
        }

        Ok(FetchedPage {
            url: url.to_string(),
            html: body,
        })
    }
}

/// Exponential backoff delay for retry attempt `n` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(250 * 2u64.pow(attempt.saturating_sub(1).min(6)))
}
