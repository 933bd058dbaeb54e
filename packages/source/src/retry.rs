//! Bounded retry with capped exponential backoff.
//!
//! Every outbound request goes through [`with_retry`] (usually via
//! [`send_text`]) so transient failures get retried the same way
//! everywhere: timeouts, connection errors, HTTP 429 and HTTP 5xx are
//! retried; any other 4xx is permanent.
//!
//! ```ignore
//! let policy = RetryPolicy::default();
//! let html = retry::send_text(&client, &url, &policy, &throttle).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use crate::FetchError;
use crate::throttle::Throttle;

/// How many times to try and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based):
    /// `base * 2^(attempt - 1)`, capped at `max_delay`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Runs `op` until it succeeds, fails permanently, or the policy's
/// attempts run out. `op` receives the 1-based attempt number.
///
/// # Errors
///
/// Returns the last [`FetchError`] produced by `op`.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.backoff_delay(attempt);
                log::warn!(
                    "{label}: {e} (attempt {attempt}/{max_attempts}), retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    log::error!("{label}: {e}, giving up after {attempt} attempt(s)");
                }
                return Err(e);
            }
        }
    }
}

/// GETs `url` and returns the body as text, waiting on `throttle` before
/// every attempt (successful or not).
///
/// # Errors
///
/// Returns [`FetchError`] if the request fails after all retries, the
/// server returns a non-retryable status, or the body cannot be decoded.
pub async fn send_text(
    client: &reqwest::Client,
    url: &str,
    policy: &RetryPolicy,
    throttle: &Throttle,
) -> Result<String, FetchError> {
    with_retry(policy, url, |_| async move {
        throttle.wait().await;

        let response = client.get(url).send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let body = response.text().await.map_err(classify)?;
        if body.trim().is_empty() {
            return Err(FetchError::Unparseable("empty response body".to_string()));
        }
        Ok(body)
    })
    .await
}

/// Maps a `reqwest` error onto the fetch error taxonomy.
fn classify(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_decode() {
        FetchError::Unparseable(e.to_string())
    } else if let Some(status) = e.status() {
        FetchError::HttpStatus(status.as_u16())
    } else {
        FetchError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        };
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(8));
        assert_eq!(policy.backoff_delay(4), Duration::from_secs(10));
        assert_eq!(policy.backoff_delay(40), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(3), "test", |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(FetchError::HttpStatus(503))
                } else {
                    Ok("page")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("page"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(3), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::Timeout) }
        })
        .await;

        assert_eq!(result, Err(FetchError::Timeout));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_permanent_client_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(5), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::HttpStatus(404)) }
        })
        .await;

        assert_eq!(result, Err(FetchError::HttpStatus(404)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn passes_attempt_numbers_to_the_operation() {
        let mut seen = Vec::new();
        let _: Result<(), _> = with_retry(&fast_policy(3), "test", |attempt| {
            seen.push(attempt);
            async { Err(FetchError::Network("refused".into())) }
        })
        .await;
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
