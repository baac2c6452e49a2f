use std::{fmt::Display, future::Future, time::Duration};

use tracing::{error, warn};

pub mod policies;

/// Runs a fallible async operation with a backoff retry.
///
/// Retries the given `operation` up to `max_retries` times with delays increasing according to the
/// provided config that implements [`Backoff`]. The operation receives the zero-based attempt
/// number so callers can report progress between attempts.
///
/// Logs a warning on each failure and an error if all retries are exhausted.
///
/// # Returns
///
/// - `Ok(R)` if the operation succeeds within allowed attempts.
/// - `Err(E)` with the last error if all attempts fail.
///
/// # Example
///
/// ```rust
/// use xbridge_common::retry::{policies::ExponentialBackoff, retry_with_backoff};
///
/// # async fn run() {
/// let result: Result<(), &str> = retry_with_backoff(
///     "my_task",
///     3,
///     &ExponentialBackoff::new(500, 150, 100),
///     |_attempt| async { Err("failed to do something") },
/// )
/// .await;
/// # }
/// ```
pub async fn retry_with_backoff<R, E, F, Fut>(
    name: &str,
    max_retries: u16,
    backoff: &impl Backoff,
    mut operation: F,
) -> Result<R, E>
where
    F: FnMut(u16) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: Display,
{
    let mut delay = backoff.base_delay_ms();
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_retries => {
                warn!(
                    attempt = attempt + 1,
                    %err,
                    %name,
                    delay_ms = delay,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay = backoff.next_delay_ms(delay);
                attempt += 1;
            }
            Err(err) => {
                error!(%err, %name, "max retries exceeded, returning with the last error");
                return Err(err);
            }
        }
    }
}

pub trait Backoff {
    /// Base delay in ms.
    fn base_delay_ms(&self) -> u64;

    /// Generates next delay given current delay.
    fn next_delay_ms(&self, curr_delay_ms: u64) -> u64;
}
