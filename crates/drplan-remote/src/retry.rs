//! Bounded exponential backoff for transient remote errors.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::error::RemoteResult;

/// Retry policy for transient remote failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base: Duration::from_millis(500),
            cap: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// No retries — single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base: Duration::ZERO,
            cap: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based), doubled each attempt,
    /// capped, with up to 25% jitter.
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base.saturating_mul(1u32 << attempt.min(16));
        let capped = exp.min(self.cap);
        if capped.is_zero() {
            return capped;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 4);
        capped + Duration::from_millis(jitter_ms)
    }
}

/// Run `op`, retrying transient [`crate::error::RemoteError`]s per the policy.
///
/// Permanent errors and exhausted retries surface to the caller unchanged.
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> RemoteResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RemoteResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                debug!(error = %e, attempt, ?delay, "transient remote error, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base: Duration::from_millis(1),
            cap: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&fast_policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(RemoteError::Throttled("busy".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: RemoteResult<()> = with_backoff(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RemoteError::AccessDenied("no".into())) }
        })
        .await;
        assert_eq!(result, Err(RemoteError::AccessDenied("no".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: RemoteResult<()> = with_backoff(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RemoteError::Timeout("slow".into())) }
        })
        .await;
        assert_eq!(result, Err(RemoteError::Timeout("slow".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
