//! Bounded retry with backoff.
//!
//! [`with_retry`] re-runs an asynchronous operation while the caller's
//! predicate says its error is worth retrying. The engine never inspects
//! errors itself; classification belongs to the predicate.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::Error;
use crate::observability::{CLIENT_REQUEST_RETRIES, CLIENT_RETRY_BACKOFF};

/// Decides whether an error is worth another attempt.
pub type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Notified after each backoff delay, right before the next attempt.
pub type RetryHook<E> = Arc<dyn Fn(&RetryContext<'_, E>) + Send + Sync>;

/// Extracts a minimum wait the failed call asked for, such as `Retry-After`.
pub type DelayHint<E> = Arc<dyn Fn(&E) -> Option<Duration> + Send + Sync>;

/// How long to wait between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backoff {
    /// Wait `base_delay * 2^attempt`, counting attempts from zero.
    Exponential {
        /// Delay before the first retry.
        base_delay: Duration,
    },
    /// Wait `steps[attempt]`; the last step repeats if attempts outnumber steps.
    Steps(Vec<Duration>),
}

impl Backoff {
    /// The delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Exponential { base_delay } => {
                let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
                base_delay.saturating_mul(factor)
            }
            Backoff::Steps(steps) => {
                let index = (attempt as usize).min(steps.len().saturating_sub(1));
                steps.get(index).copied().unwrap_or_default()
            }
        }
    }
}

/// State of one retry-wrapped call, handed to the retry hook.
#[derive(Debug)]
pub struct RetryContext<'a, E> {
    /// Zero-based index of the retry about to run.
    pub attempt: u32,
    /// The delay that was waited before this retry.
    pub delay: Duration,
    /// The error that triggered the retry.
    pub last_error: &'a E,
}

/// Configuration for [`with_retry`].
pub struct RetryConfig<E> {
    /// Retries after the first attempt; the operation runs at most `max_retries + 1` times.
    pub max_retries: u32,
    /// Delay schedule.
    pub backoff: Backoff,
    /// Which errors are retried.
    pub should_retry: RetryPredicate<E>,
    /// Optional notification before each retry.
    pub on_retry: Option<RetryHook<E>>,
    /// Optional lower bound on the delay, taken from the error.
    pub delay_hint: Option<DelayHint<E>>,
}

impl<E> RetryConfig<E> {
    /// Exponential backoff that retries every error.
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Exponential { base_delay },
            should_retry: Arc::new(|_| true),
            on_retry: None,
            delay_hint: None,
        }
    }

    /// Fixed delays, one retry per step.
    pub fn stepped(steps: Vec<Duration>) -> Self {
        Self {
            max_retries: steps.len() as u32,
            backoff: Backoff::Steps(steps),
            should_retry: Arc::new(|_| true),
            on_retry: None,
            delay_hint: None,
        }
    }

    /// A configuration that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::from_millis(1))
    }

    /// Sets the retryability predicate.
    pub fn with_should_retry(mut self, should_retry: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.should_retry = Arc::new(should_retry);
        self
    }

    /// Sets the retry hook.
    pub fn with_on_retry(
        mut self,
        on_retry: impl Fn(&RetryContext<'_, E>) + Send + Sync + 'static,
    ) -> Self {
        self.on_retry = Some(Arc::new(on_retry));
        self
    }

    /// Never wait less than the delay `delay_hint` extracts from the error.
    pub fn with_delay_hint(
        mut self,
        delay_hint: impl Fn(&E) -> Option<Duration> + Send + Sync + 'static,
    ) -> Self {
        self.delay_hint = Some(Arc::new(delay_hint));
        self
    }
}

impl<E> Clone for RetryConfig<E> {
    fn clone(&self) -> Self {
        Self {
            max_retries: self.max_retries,
            backoff: self.backoff.clone(),
            should_retry: Arc::clone(&self.should_retry),
            on_retry: self.on_retry.clone(),
            delay_hint: self.delay_hint.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryConfig<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("on_retry", &self.on_retry.is_some())
            .field("delay_hint", &self.delay_hint.is_some())
            .finish()
    }
}

/// Run `operation`, retrying failures the config's predicate accepts.
///
/// A rejected error is returned after exactly one call. Otherwise the
/// operation runs at most `max_retries + 1` times and the last error is
/// returned once retries are exhausted.
pub async fn with_retry<T, E, F, Fut>(mut operation: F, config: &RetryConfig<E>) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !(config.should_retry)(&err) {
            tracing::debug!(error = %err, "error is not retryable");
            return Err(err);
        }
        if attempt >= config.max_retries {
            tracing::warn!(error = %err, retries = attempt, "giving up after retries");
            return Err(err);
        }

        let mut delay = config.backoff.delay_for(attempt);
        if let Some(hint) = config.delay_hint.as_ref().and_then(|hint| hint(&err)) {
            delay = delay.max(hint);
        }
        tracing::debug!(error = %err, attempt, delay_ms = delay.as_millis() as u64, "retrying");
        CLIENT_REQUEST_RETRIES.click();
        CLIENT_RETRY_BACKOFF.add(delay.as_secs_f64());
        tokio::time::sleep(delay).await;

        if let Some(on_retry) = &config.on_retry {
            on_retry(&RetryContext {
                attempt,
                delay,
                last_error: &err,
            });
        }
        attempt += 1;
    }
}

const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
    "429",
];

/// The `Retry-After` delay the backend attached to `error`, if any.
pub fn retry_after_hint(error: &Error) -> Option<Duration> {
    error.retry_after().map(Duration::from_secs)
}

/// Returns true if `error` signals a rate limit.
///
/// Matches status 429 or a message containing a rate-limit marker.
pub fn is_rate_limit_error(error: &Error) -> bool {
    if error.is_rate_limit() || error.status_code() == Some(429) {
        return true;
    }
    let message = error.to_string().to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|marker| message.contains(marker))
}
