use super::Backoff;

/// Configuration for exponential retry backoff.
///
/// Delays grow by a fixed-point multiplier expressed as the ratio
/// `multiplier / multiplier_base`, and are capped at `max_delay_ms`.
///
/// # Example
///
/// ```
/// use xbridge_common::retry::{policies::ExponentialBackoff, Backoff};
///
/// // starts at 1000ms and grows by 1.5x each retry: 1000ms → 1500ms → 2250ms → ...
/// let backoff = ExponentialBackoff::new(1000, 150, 100);
/// assert_eq!(backoff.next_delay_ms(1000), 1500);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    /// Initial delay before the first retry, in milliseconds.
    base_delay_ms: u64,

    /// Numerator of the backoff multiplier (e.g., `150` for 1.5x).
    multiplier: u64,

    /// Denominator of the backoff multiplier (e.g., `100` for 1.5x).
    multiplier_base: u64,

    /// Upper bound on any single delay, in milliseconds.
    max_delay_ms: u64,
}

impl ExponentialBackoff {
    pub fn new(base_delay_ms: u64, multiplier: u64, multiplier_base: u64) -> Self {
        assert!(multiplier_base != 0);
        Self {
            base_delay_ms,
            multiplier,
            multiplier_base,
            max_delay_ms: u64::MAX,
        }
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay_ms: 1500, // 1.5 secs should be a sane default
            multiplier: 15,
            multiplier_base: 10,
            max_delay_ms: u64::MAX,
        }
    }
}

impl Backoff for ExponentialBackoff {
    fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms.min(self.max_delay_ms)
    }

    fn next_delay_ms(&self, curr_delay_ms: u64) -> u64 {
        let next = curr_delay_ms.saturating_mul(self.multiplier) / self.multiplier_base;
        next.min(self.max_delay_ms)
    }
}
