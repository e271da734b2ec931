//! Centralised retry with exponential backoff.
//!
//! Every boundary that may see transient failures (LLM calls, store writes)
//! goes through [`with_backoff`] so retry behaviour is uniform: transients
//! back off exponentially, rate limits wait out the server's hint, and
//! permanent errors return immediately.

use std::future::Future;
use std::time::Duration;

use agora_domain::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retrying after `attempt` failures (1-based): doubles
    /// each time, capped at `max_delay_ms`.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        self.base_delay_ms
            .saturating_mul(1u64 << (attempt - 1).min(16))
            .min(self.max_delay_ms)
    }
}

/// Run `op`, retrying transient failures per `policy`.
///
/// `what` labels the operation in logs. A `RateLimited` error with a
/// `retry_after_ms` hint overrides the exponential delay.
pub async fn with_backoff<T, F, Fut>(policy: BackoffPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt + 1 < policy.max_attempts => {
                attempt += 1;
                let delay_ms = match &e {
                    Error::RateLimited {
                        retry_after_ms: Some(ms),
                    } => *ms,
                    _ => policy.delay_ms(attempt),
                };
                tracing::warn!(
                    error = %e,
                    attempt,
                    delay_ms,
                    "{what} failed transiently; retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let policy = BackoffPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 4,
        };
        let result = with_backoff(policy, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::Http("503".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff(BackoffPolicy::default(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(Error::InvalidRequest {
                    provider: "p".into(),
                    message: "bad".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff(
            BackoffPolicy {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 4,
            },
            "test",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::Timeout("slow".into())) }
            },
        )
        .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn delay_doubles_and_caps() {
        let p = BackoffPolicy {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 3_000,
        };
        assert_eq!(p.delay_ms(1), 500);
        assert_eq!(p.delay_ms(2), 1_000);
        assert_eq!(p.delay_ms(3), 2_000);
        assert_eq!(p.delay_ms(4), 3_000);
        assert_eq!(p.delay_ms(5), 3_000);
    }
}
