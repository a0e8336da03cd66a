//! Firebase REST adapters
//!
//! The mobile shells talk to Firebase through these adapters instead of a
//! platform SDK, so the whole conversion pipeline runs from one Rust core.
//!
//! Modules:
//! - auth: Identity Toolkit v1 (sign-up, profile, lookup) + token refresh
//! - firestore: Firestore v1 documents (get/patch/runQuery/commit)
//!
//! Both adapters honor the emulator hosts from `FirebaseConfig`, which is
//! how integration runs work without touching a live project.

pub mod auth;
pub mod firestore;

use std::time::Duration;

pub use auth::FirebaseAuth;
pub use firestore::Firestore;

// ============================================================================
// Error type
// ============================================================================

/// Transport-level failures shared by both adapters. Each adapter maps
/// these onto its collaborator error type (`AuthError` / `StoreError`)
/// before they leave the module.
#[derive(Debug, thiserror::Error)]
pub enum FirebaseError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Retry
// ============================================================================

/// Ceiling for server-requested delays; 429s have been seen asking for hours.
const RETRY_AFTER_CAP_SECS: u64 = 30;

/// Backoff settings for transient Firebase failures. Both adapters run with
/// the defaults; the fields exist so tests can tighten them.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// 408, 429, and 5xx are transient; every other status is an answer.
    fn should_retry(&self, status: reqwest::StatusCode) -> bool {
        status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
    }

    /// Delay after failed attempt `attempt` (1-based). A parseable
    /// `Retry-After` header wins over the computed backoff; both are capped.
    fn backoff(
        &self,
        attempt: u32,
        retry_after: Option<&reqwest::header::HeaderValue>,
    ) -> Duration {
        if let Some(hinted) = retry_after_hint(retry_after) {
            return hinted;
        }
        let doubled = self
            .initial_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        Duration::from_millis(doubled.min(self.max_backoff_ms).saturating_add(jitter_ms()))
    }
}

/// Server-provided delay in whole seconds, when present and sane. The
/// HTTP-date form of `Retry-After` is ignored.
fn retry_after_hint(header: Option<&reqwest::header::HeaderValue>) -> Option<Duration> {
    let secs = header?.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(secs.min(RETRY_AFTER_CAP_SECS)))
}

/// 0..150ms of clock noise so clients that failed together do not retry
/// together.
fn jitter_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()))
        .unwrap_or(0)
        % 150
}

/// Send a request, repeating transient failures (retryable statuses plus
/// connect/timeout transport errors) under the policy's backoff. Other 4xx
/// responses come back as-is for the caller to map.
pub async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, FirebaseError> {
    let final_attempt = policy.max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        // Streaming bodies cannot be cloned; those get a single attempt.
        let Some(this_try) = request.try_clone() else {
            return Ok(request.send().await?);
        };

        let wait = match this_try.send().await {
            Ok(response) if attempt < final_attempt && policy.should_retry(response.status()) => {
                let wait = policy.backoff(
                    attempt,
                    response.headers().get(reqwest::header::RETRY_AFTER),
                );
                log::warn!(
                    "firebase retry {attempt}/{final_attempt} after status {} (sleep {wait:?})",
                    response.status()
                );
                wait
            }
            Ok(response) => return Ok(response),
            Err(err) if attempt < final_attempt && (err.is_timeout() || err.is_connect()) => {
                let wait = policy.backoff(attempt, None);
                log::warn!(
                    "firebase retry {attempt}/{final_attempt} after transport error: {err} (sleep {wait:?})"
                );
                wait
            }
            Err(err) => return Err(err.into()),
        };

        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}

/// Read an error response body and pull out Firebase's `error.message`.
/// Falls back to the raw body when the shape is unexpected.
pub(crate) async fn api_error(response: reqwest::Response) -> FirebaseError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or(body);
    FirebaseError::Api { status, message }
}
