//! Retry with exponential backoff
//!
//! One generic wrapper serves every fetch path. Policy is uniform: any
//! failure consumes an attempt from the same budget, and the delay grows
//! by `backoff_multiplier` up to `max_delay` between attempts.

use crate::config::RetryConfig;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Successful result of a retried operation
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Value from the successful attempt
    pub value: T,
    /// Retries that were needed (0 when the first attempt succeeded)
    pub retries: u32,
}

/// All attempts failed
#[derive(Debug)]
pub struct RetriesExhausted<E> {
    /// Total attempts made
    pub attempts: u32,
    /// Error from the final attempt
    pub last_error: E,
}

/// Run an async operation with exponential backoff
///
/// `max_attempts` is the total attempt budget, so a default of 3 means
/// one initial try plus up to two retries. The closure receives the
/// 1-based attempt number for logging.
pub async fn fetch_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<RetryOutcome<T>, RetriesExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay = config.initial_delay;

    for attempt in 1..=max_attempts {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "operation succeeded after retry");
                }
                return Ok(RetryOutcome {
                    value,
                    retries: attempt - 1,
                });
            }
            Err(e) if attempt < max_attempts => {
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis(),
                    "operation failed, retrying"
                );

                let sleep_for = if config.jitter { add_jitter(delay) } else { delay };
                tokio::time::sleep(sleep_for).await;

                let next = Duration::from_secs_f64(
                    delay.as_secs_f64() * config.backoff_multiplier,
                );
                delay = next.min(config.max_delay);
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    attempts = max_attempts,
                    "operation failed, attempt budget exhausted"
                );
                return Err(RetriesExhausted {
                    attempts: max_attempts,
                    last_error: e,
                });
            }
        }
    }

    unreachable!("loop always returns within max_attempts iterations")
}

/// Add random jitter to a delay
///
/// Uniform between 0% and 100% of the base, so the result lies in
/// `[delay, 2 * delay]`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
