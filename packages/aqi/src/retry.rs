//! HTTP retry with exponential backoff.
//!
//! Every AQS request goes through [`send_json`]. Connection failures,
//! timeouts, HTTP 429 and 5xx responses, and bodies that cannot be read
//! or decoded are retried; any other 4xx is permanent. All of these share
//! one attempt budget.
//!
//! ```ignore
//! let body = retry::send_json(|| client.get(&url).query(&params), policy).await?;
//! ```

use std::time::Duration;

use crate::AqiError;

/// Maximum length of the response body preview included in logs.
const BODY_PREVIEW_LEN: usize = 500;

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Backoff base; retry `n` waits `base_delay * 2^n`.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2_u32.saturating_pow(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(4, Duration::from_secs(1))
    }
}

struct Failure {
    error: AqiError,
    transient: bool,
}

impl Failure {
    const fn transient(error: AqiError) -> Self {
        Self {
            error,
            transient: true,
        }
    }

    const fn permanent(error: AqiError) -> Self {
        Self {
            error,
            transient: false,
        }
    }
}

/// Sends the request built by `build_request` and parses the body as
/// JSON, retrying transient failures under `policy`.
///
/// `build_request` is called once per attempt since a
/// [`reqwest::RequestBuilder`] is consumed by `send()`.
///
/// # Errors
///
/// Returns [`AqiError`] on a permanent failure or once the retry budget
/// is spent.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(build_request: F, policy: RetryPolicy) -> Result<serde_json::Value, AqiError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut retry = 0;
    loop {
        match attempt(&build_request).await {
            Ok(value) => return Ok(value),
            Err(failure) if failure.transient && retry < policy.max_retries => {
                retry += 1;
                let delay = policy.delay_for(retry);
                log::warn!(
                    "  {} (retry {retry}/{} in {delay:?})",
                    failure.error,
                    policy.max_retries
                );
                tokio::time::sleep(delay).await;
            }
            Err(failure) => {
                if failure.transient {
                    log::error!(
                        "  giving up after {} retries: {}",
                        policy.max_retries,
                        failure.error
                    );
                }
                return Err(failure.error);
            }
        }
    }
}

#[allow(clippy::future_not_send)]
async fn attempt<F>(build_request: &F) -> Result<serde_json::Value, Failure>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = build_request().send().await.map_err(|e| {
        let transient = is_transient(&e);
        let error = AqiError::Http(e.without_url());
        if transient {
            Failure::transient(error)
        } else {
            Failure::permanent(error)
        }
    })?;

    let status = response.status();
    let path = response.url().path().to_string();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(Failure::transient(AqiError::Status {
            status: status.as_u16(),
            path,
        }));
    }
    if status.is_client_error() {
        return Err(Failure::permanent(AqiError::Status {
            status: status.as_u16(),
            path,
        }));
    }

    let text = response
        .text()
        .await
        .map_err(|e| Failure::transient(AqiError::Http(e.without_url())))?;

    serde_json::from_str(&text).map_err(|e| {
        let preview: String = text.chars().take(BODY_PREVIEW_LEN).collect();
        log::debug!(
            "JSON parse failed\n  path: {path}\n  status: {status}\n  received: {} bytes\n  body preview: {preview}",
            text.len()
        );
        Failure::transient(AqiError::Json(e))
    })
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1))
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok": true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/data", server.uri());
        let body = send_json(|| client.get(&url), fast(3)).await.unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn client_errors_are_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/data", server.uri());
        let result = send_json(|| client.get(&url), fast(3)).await;
        assert!(matches!(result, Err(AqiError::Status { status: 400, .. })));
    }

    #[tokio::test]
    async fn rate_limit_exhausts_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/data", server.uri());
        let result = send_json(|| client.get(&url), fast(2)).await;
        assert!(matches!(result, Err(AqiError::Status { status: 429, .. })));
    }

    #[tokio::test]
    async fn garbled_body_is_refetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"Header": [{"#))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[1, 2]"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/data", server.uri());
        let body = send_json(|| client.get(&url), fast(1)).await.unwrap();
        assert_eq!(body, serde_json::json!([1, 2]));
    }
}
