//! Bounded re-execution of a unit of work.

use std::future::Future;
use std::time::Duration;

use crate::error::MarketError;

/// Pause before re-running after a uniqueness conflict, so that a
/// time-stamped code built by the next attempt falls in a later millisecond.
const CONFLICT_BACKOFF: Duration = Duration::from_millis(1);

/// Runs `attempt` until it succeeds, fails with a non-retryable error, or has
/// been retried `max_retries` times.
///
/// Every attempt must open its own unit of work so that stock levels are
/// re-validated against the state left by the failed attempt. Surfaced
/// failures are left for the caller to log.
pub async fn with_retries<T, F, Fut>(
    max_retries: u32,
    operation: &'static str,
    mut attempt: F,
) -> Result<T, MarketError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MarketError>>,
{
    let mut retries = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && retries < max_retries => {
                retries += 1;
                metrics::counter!("unit_of_work_retries_total", "operation" => operation)
                    .increment(1);
                tracing::warn!(operation, retry = retries, error = %e, "unit of work failed, retrying");
                if matches!(e, MarketError::Conflict(_)) {
                    tokio::time::sleep(CONFLICT_BACKOFF).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
}
