use rand::Rng;
use std::time::Duration;

/// Retry policy for failed jobs
///
/// The backoff for a failed attempt `n` is `base_backoff * 2^(n-1)`, scaled
/// by a random factor in `[1.0, 1.0 + jitter)` and capped at `max_backoff`.
/// With `jitter < 1.0` the doubling dominates, so successive delays below
/// the cap are strictly increasing.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts before a job is dead-lettered
    pub max_attempts: u32,

    /// Backoff after the first failed attempt
    pub base_backoff: Duration,

    /// Ceiling for any single backoff
    pub max_backoff: Duration,

    /// Jitter fraction spread across retries of the same logical job
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(3600),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with custom budget and base backoff
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts,
            base_backoff,
            ..Self::default()
        }
    }

    /// Whether the given attempt number has used up the budget
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    /// Jittered exponential backoff for the given failed attempt
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let base = self.base_backoff.as_secs_f64() * 2f64.powi(exponent.min(32) as i32);

        let factor = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(1.0..1.0 + self.jitter)
        } else {
            1.0
        };

        let secs = (base * factor).min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}
