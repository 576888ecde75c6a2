//! Timelock calculator (C2).
//!
//! Computes the asymmetric window `T_asset < T_btc` that makes cross-ledger
//! atomicity hold: once the asset leg expires the seller still has a window
//! to either reveal the preimage on BTC or let BTC refund too, and once BTC
//! refunds the asset leg has already refunded. Getting this backwards (`T_btc
//! <= T_asset`) lets a griefing buyer wait for one leg to refund and still
//! claim the other.

use crate::error::{Error, Result};
use std::time::{SystemTime, UNIX_EPOCH};

const MIN_BUFFER_SECS: u64 = 3600; // 1h
const MAX_BUFFER_SECS: u64 = 24 * 3600; // 24h
const DEFAULT_BUFFER_SECS: u64 = 2 * 3600; // 2h

/// The asymmetric timelock window for one swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelockWindow {
    /// Buyer-visible deadline on the asset leg (unix seconds).
    pub t_asset: u64,
    /// Deadline on the Bitcoin leg (unix seconds). Always `t_asset + buffer`.
    pub t_btc: u64,
    /// The buffer `Δ` in seconds, `1h <= Δ <= 24h`.
    pub buffer_secs: u64,
}

/// Compute `{T_asset, T_btc, Δ}` given a buyer-visible asset deadline and a
/// buffer. `buffer_secs` defaults to 2h (`DEFAULT_BUFFER_SECS`) when `None`.
///
/// Validates: `T_asset > now`, `T_btc > T_asset`, `1h <= Δ <= 24h`.
pub fn compute_window(t_asset: u64, buffer_secs: Option<u64>) -> Result<TimelockWindow> {
    compute_window_at(t_asset, buffer_secs, now())
}

/// Same as [`compute_window`] but with an injectable "now" for testing.
pub fn compute_window_at(t_asset: u64, buffer_secs: Option<u64>, now: u64) -> Result<TimelockWindow> {
    let buffer_secs = buffer_secs.unwrap_or(DEFAULT_BUFFER_SECS);
    if !(MIN_BUFFER_SECS..=MAX_BUFFER_SECS).contains(&buffer_secs) {
        return Err(Error::InvalidBuffer(buffer_secs));
    }
    if t_asset <= now {
        return Err(Error::ExpiryTooSoon);
    }
    let t_btc = t_asset
        .checked_add(buffer_secs)
        .ok_or_else(|| Error::Internal("timelock overflow".into()))?;
    if t_btc <= t_asset {
        return Err(Error::Internal("T_btc must exceed T_asset".into()));
    }
    Ok(TimelockWindow {
        t_asset,
        t_btc,
        buffer_secs,
    })
}

/// Validate the asset-leg expiry bound from `saleOpen`'s precondition:
/// `now + 1h < T <= now + 30d`.
pub fn validate_asset_expiry(expiry: u64) -> Result<()> {
    validate_asset_expiry_at(expiry, now())
}

pub fn validate_asset_expiry_at(expiry: u64, now: u64) -> Result<()> {
    const MIN_WINDOW: u64 = 3600; // 1h, exclusive lower bound
    const MAX_WINDOW: u64 = 30 * 24 * 3600; // 30d, inclusive upper bound

    if expiry <= now.saturating_add(MIN_WINDOW) {
        return Err(Error::ExpiryTooSoon);
    }
    if expiry > now.saturating_add(MAX_WINDOW) {
        return Err(Error::ExpiryTooFar);
    }
    Ok(())
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_asymmetric_window() {
        let now = 1_000_000;
        let window = compute_window_at(now + 10_800, Some(3600), now).unwrap();
        assert_eq!(window.t_asset, now + 10_800);
        assert_eq!(window.t_btc, now + 10_800 + 3600);
        assert_eq!(window.buffer_secs, 3600);
        assert!(window.t_btc - window.t_asset >= 3600);
    }

    #[test]
    fn rejects_past_deadline() {
        let now = 1_000_000;
        assert!(matches!(
            compute_window_at(now, None, now),
            Err(Error::ExpiryTooSoon)
        ));
        assert!(matches!(
            compute_window_at(now - 1, None, now),
            Err(Error::ExpiryTooSoon)
        ));
    }

    #[test]
    fn rejects_buffer_out_of_range() {
        let now = 1_000_000;
        assert!(matches!(
            compute_window_at(now + 10_000, Some(MIN_BUFFER_SECS - 1), now),
            Err(Error::InvalidBuffer(_))
        ));
        assert!(matches!(
            compute_window_at(now + 10_000, Some(MAX_BUFFER_SECS + 1), now),
            Err(Error::InvalidBuffer(_))
        ));
    }

    #[test]
    fn default_buffer_is_two_hours() {
        let now = 1_000_000;
        let window = compute_window_at(now + 50_000, None, now).unwrap();
        assert_eq!(window.buffer_secs, DEFAULT_BUFFER_SECS);
    }

    #[test]
    fn asset_expiry_boundaries() {
        let now = 1_000_000;
        assert!(matches!(
            validate_asset_expiry_at(now + 3599, now),
            Err(Error::ExpiryTooSoon)
        ));
        assert!(validate_asset_expiry_at(now + 3601, now).is_ok());
        assert!(validate_asset_expiry_at(now + 30 * 86_400, now).is_ok());
        assert!(matches!(
            validate_asset_expiry_at(now + 30 * 86_400 + 1, now),
            Err(Error::ExpiryTooFar)
        ));
    }
}
