//! Bounded exponential-backoff retry for orchestration calls.
//!
//! Transient failures (`OrchError::Unavailable`) are retried with a
//! doubling delay capped at a maximum; everything else surfaces
//! immediately. After the attempt budget is spent the last error is
//! returned and the caller decides what to do with it.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::OrchResult;

/// Retry tuning for orchestration client calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first (≥ 1).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on the doubling delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Run `op` under the retry policy.
///
/// `label` names the operation for log lines. Non-transient errors are
/// never retried.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> OrchResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = OrchResult<T>>,
{
    let mut delay = policy.base_delay;
    let mut attempt = 1u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                debug!(
                    %label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient orchestration failure, retrying"
                );
                tokio::time::sleep(delay).await;
                // Double the delay up to the cap.
                delay = (delay * 2).min(policy.max_delay);
                attempt += 1;
            }
            Err(err) => {
                if err.is_transient() {
                    warn!(%label, attempts = attempt, error = %err, "retry budget exhausted");
                }
                return Err(err);
            }
        }
    }
}
