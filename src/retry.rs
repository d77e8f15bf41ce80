//! Bounded retry for fallible async operations.
//!
//! Policies are a narrow interface (`max_attempts`, `delay_after`) so the
//! worker channel can swap fixed-delay for exponential backoff without
//! changes. Waiting uses `tokio::time::sleep`, which suspends the task and
//! never blocks the thread.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Strategy deciding how many attempts to make and how long to wait between them
pub trait RetryPolicy: Send + Sync {
    /// Total number of attempts, including the first one
    fn max_attempts(&self) -> u32;

    /// Delay to wait after `failed_attempt` (1-based) failed
    fn delay_after(&self, failed_attempt: u32) -> Duration;
}

/// Fixed-delay retry configuration
///
/// Supplied once per retrying call site and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(rename = "delay_ms", with = "duration_ms")]
    pub delay: Duration,
}

impl RetryConfig {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy for RetryConfig {
    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn delay_after(&self, _failed_attempt: u32) -> Duration {
        self.delay
    }
}

/// Exponential backoff: `initial × multiplier^(n-1)`, capped at `max_delay`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    pub max_attempts: u32,
    pub initial: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial: Duration::from_millis(10),
            multiplier: 2.0,
            max_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled.max(0.0))
        }
    }
}

/// Why a retried operation gave up
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// Policy allowed zero attempts; the operation never ran
    InvalidConfig { max_attempts: u32 },

    /// Every attempt failed; `last` is the most recent failure
    Exhausted { attempts: u32, last: E },

    /// Error classified as not worth retrying
    Permanent(E),
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::InvalidConfig { max_attempts } => write!(
                f,
                "retry policy must allow at least one attempt (got {})",
                max_attempts
            ),
            RetryError::Exhausted { attempts, last } => {
                write!(f, "gave up after {} attempts: {}", attempts, last)
            }
            RetryError::Permanent(err) => write!(f, "permanent failure: {}", err),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

/// Retry `operation` on every failure until it succeeds or the policy runs out
pub async fn retry<P, F, Fut, T, E>(operation: F, policy: &P) -> Result<T, RetryError<E>>
where
    P: RetryPolicy + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    retry_if(operation, policy, |_| true).await
}

/// Retry `operation` while `is_transient` accepts the error
///
/// **Algorithm:**
/// 1. Reject a policy with zero attempts before running anything
/// 2. Attempt operation; return on success
/// 3. Non-transient error: return `Permanent` immediately
/// 4. Last attempt failed: return `Exhausted` without sleeping
/// 5. Otherwise sleep `delay_after(attempt)` and go to 2
pub async fn retry_if<P, F, Fut, T, E, C>(
    mut operation: F,
    policy: &P,
    mut is_transient: C,
) -> Result<T, RetryError<E>>
where
    P: RetryPolicy + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
    C: FnMut(&E) -> bool,
{
    let max_attempts = policy.max_attempts();
    if max_attempts == 0 {
        return Err(RetryError::InvalidConfig { max_attempts });
    }

    let mut attempt = 0;
    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(attempt, max_attempts, "Retrying operation");
        }

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !is_transient(&err) {
            tracing::debug!(attempt, error = %err, "Permanent failure, not retrying");
            return Err(RetryError::Permanent(err));
        }

        if attempt >= max_attempts {
            tracing::warn!(attempt, error = %err, "Retry attempts exhausted");
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }

        let delay = policy.delay_after(attempt);
        tracing::warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Attempt failed, will retry after delay"
        );
        tokio::time::sleep(delay).await;
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
