use std::time::Duration;

/// Capped exponential backoff: `min(base * 2^n, max)` for retry index `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            max: Duration::from_millis(10_000),
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before retry `retry` (0 for the first retry)
    pub fn delay(&self, retry: u32) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let factor = 2u64.checked_pow(retry).unwrap_or(u64::MAX);
        let delay_ms = base_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms).min(self.max)
    }
}
