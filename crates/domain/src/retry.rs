//! Bounded retry of optimistic writes.

use std::future::Future;
use std::time::Duration;

use crate::error::DomainError;

/// How often a write that lost a version race is reloaded and tried again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Pause before retry `n` is `backoff × n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// A single attempt.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    fn delay_before(&self, retry: u32) -> Duration {
        self.backoff.saturating_mul(retry)
    }
}

/// Runs `attempt` until it succeeds, fails with something other than a
/// concurrency conflict, or the policy runs out of attempts.
///
/// Each call to `attempt` must reload whatever state it depends on.
pub async fn retry_on_conflict<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut attempt: F,
) -> Result<T, DomainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DomainError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut tries = 1;

    loop {
        match attempt().await {
            Err(e) if e.is_conflict() && tries < max_attempts => {
                tracing::warn!(operation, attempt = tries, error = %e, "write conflict, retrying");
                metrics::counter!("conflict_retries", "operation" => operation).increment(1);
                tokio::time::sleep(policy.delay_before(tries)).await;
                tries += 1;
            }
            Err(e) => {
                if e.is_conflict() {
                    tracing::error!(operation, attempts = tries, "giving up after repeated conflicts");
                }
                return Err(e);
            }
            Ok(value) => return Ok(value),
        }
    }
}
