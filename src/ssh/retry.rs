use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::FlowError;

/// Bounded-retry policy with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Random jitter fraction applied to each delay (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Delay before a given attempt (0-indexed; the first attempt never waits).
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = attempt.saturating_sub(1);
        #[expect(clippy::cast_precision_loss)]
        let base_delay = (self.initial_delay_ms as f64)
            * self
                .backoff_multiplier
                .powi(i32::try_from(exponent).unwrap_or(i32::MAX));

        #[expect(clippy::cast_precision_loss)]
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let jitter_range = capped_delay * self.jitter;
        let jitter = if jitter_range > 0.0 {
            rand_simple().mul_add(2.0, -1.0) * jitter_range
        } else {
            0.0
        };

        #[expect(clippy::cast_precision_loss)]
        let final_delay = (capped_delay + jitter).clamp(0.0, self.max_delay_ms as f64);

        Duration::from_millis(final_delay as u64)
    }
}

/// Simple pseudo-random number generator (0.0 to 1.0)
/// Using a basic approach to avoid adding rand as a dependency
fn rand_simple() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (f64::from(nanos) / f64::from(u32::MAX)).fract()
}

/// Whether an error class is worth another attempt.
///
/// Wrong-exit and missing-file errors are deliberately non-transient:
/// retrying a rejected command or an absent remote file cannot succeed.
#[must_use]
pub fn is_transient(error: &FlowError) -> bool {
    match error {
        FlowError::Connection { .. }
        | FlowError::ChannelOpen { .. }
        | FlowError::ChannelClosed { .. } => true,
        FlowError::Transfer { reason } => {
            reason.contains("channel") || reason.contains("connection")
        }
        _ => false,
    }
}

/// Runs an async operation up to `max_attempts` times, retrying only
/// while `should_retry` approves the error.
///
/// # Errors
///
/// Returns the last error when attempts are exhausted, or the first
/// error the predicate declines.
///
/// # Panics
///
/// Panics if `max_attempts` is 0 (at least one attempt must be configured).
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        let delay = config.delay_for_attempt(attempt);
        if !delay.is_zero() {
            debug!(
                operation = %operation_name,
                attempt = attempt + 1,
                delay_ms = delay.as_millis(),
                "retrying after delay"
            );
            sleep(delay).await;
        }

        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        operation = %operation_name,
                        attempt = attempt + 1,
                        "operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                let is_last_attempt = attempt + 1 >= config.max_attempts;
                if is_last_attempt || !should_retry(&e) {
                    warn!(
                        operation = %operation_name,
                        attempt = attempt + 1,
                        error = %e,
                        "operation failed, not retrying"
                    );
                    return Err(e);
                }
                warn!(
                    operation = %operation_name,
                    attempt = attempt + 1,
                    max_attempts = config.max_attempts,
                    error = %e,
                    "operation failed, will retry"
                );
                last_error = Some(e);
            }
        }
    }

    Err(last_error.expect("at least one attempt was made"))
}
