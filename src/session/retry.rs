use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded retry policy for session restoration.
///
/// The auth provider may take a few hundred milliseconds to warm up after
/// process start, so `restore` polls it a fixed number of times with a
/// growing delay instead of giving up on the first `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // 5 polls over ~3.3s covers the observed provider warm-up comfortably.
        Self {
            max_attempts: 5,
            initial_delay_ms: 400,
            backoff_factor: 1.5,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given zero-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.max(1.0).powi(attempt as i32);
        Duration::from_millis(self.initial_delay_ms).mul_f64(factor)
    }
}
