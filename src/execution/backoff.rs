//! Exponential backoff retry for `collaborator_unavailable` errors (spec
//! §7: base 100ms, cap 30s, 5 attempts, then fatal).

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::EngineError;

/// Backoff schedule parameters, taken from [`crate::config::Config`].
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub cap_ms: u64,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    /// Delay before retry attempt `attempt` (0-indexed): `base * 2^attempt`,
    /// capped at `cap_ms`.
    fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.base_ms.saturating_mul(1u64 << attempt.min(32));
        Duration::from_millis(scaled.min(self.cap_ms))
    }
}

/// Run `operation`, retrying with exponential backoff whenever it returns
/// `EngineError::CollaboratorUnavailable`. Any other error is returned
/// immediately without retrying. Exhausting `max_attempts` returns the last
/// error observed.
pub fn retry_with_backoff<T>(
    policy: BackoffPolicy,
    collaborator: &str,
    mut operation: impl FnMut() -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    let mut attempt = 0u32;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(err @ EngineError::CollaboratorUnavailable { .. }) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt - 1);
                warn!(collaborator, attempt, delay_ms = delay.as_millis() as u64, "retrying after collaborator_unavailable");
                thread::sleep(delay);
            }
            Err(other) => return Err(other),
        }
    }
}
