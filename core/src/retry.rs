//! Exponential backoff retry policy (§7).
//!
//! Retrying is the coordinator's decision, not the actuator's (§4.5) —
//! this helper is used by the coordinator when driving C5 operations,
//! not inside the actuator itself. Only `ExternalFailure`-kind errors
//! are retried; validation/authorization/state/cryptographic errors are
//! surfaced immediately on the first attempt.

use crate::error::{Error, Result};
use std::time::Duration;

/// Base delay before the first retry.
pub const BASE_DELAY: Duration = Duration::from_secs(1);
/// Delay is never allowed to exceed this, regardless of how many
/// attempts have doubled past it.
pub const MAX_DELAY: Duration = Duration::from_secs(30);
/// Number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Delay before retry attempt `attempt` (1-indexed): `base * 2^(attempt-1)`,
/// capped at [`MAX_DELAY`].
pub fn backoff_delay(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    let multiplier = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
    BASE_DELAY
        .checked_mul(multiplier as u32)
        .unwrap_or(MAX_DELAY)
        .min(MAX_DELAY)
}

/// Run `op`, retrying with exponential backoff while the returned error
/// is retryable ([`Error::is_retryable`]), up to `max_retries` extra
/// attempts beyond the first. On exhaustion, wraps the last error in
/// [`Error::PersistentExternalFailure`] with the attempt count and
/// preserved cause chain.
///
/// Non-retryable errors are returned immediately without sleeping.
pub async fn retry_with_backoff<F, Fut, T>(max_retries: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(err) if err.is_retryable() && attempt < max_retries => {
                attempt += 1;
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
            Err(err) if err.is_retryable() => {
                return Err(Error::PersistentExternalFailure {
                    attempts: attempt + 1,
                    source: Box::new(err),
                });
            }
            Err(err) => return Err(err),
        }
    }
}
