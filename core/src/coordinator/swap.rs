//! Per-swap state (§3.1) and the monotonic transitions the coordinator
//! actor drives it through (§3.4, §4.6). A `PendingSwap` never decides
//! anything on its own — it only accepts or rejects a transition based
//! on its current status, so the actor's dispatch logic stays the only
//! place that calls out to the actuator or observer.

use crate::asset_ledger::{AssetAddress, TokenId};
use crate::error::{Error, Result};
use crate::secret::{Commitment, Secret};
use crate::types::SwapStatus;
use bitcoin::Txid;
use serde::{Deserialize, Serialize};

/// Input to `register(swap)` (§4.6 step 1). `seller_asset_addr` is not
/// named explicitly in the data model's field list, but the asset HTLC
/// module's `saleOpen` requires `caller = owner` (§4.3): the coordinator
/// must know the seller's identity on the asset ledger, distinct from
/// their Bitcoin receiving address, to submit that call on the seller's
/// behalf. See `DESIGN.md`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSwapRequest {
    pub hash_h: Commitment,
    pub token_id: TokenId,
    pub price_sats: u64,
    pub seller_btc_addr: String,
    pub seller_asset_addr: AssetAddress,
    pub buyer_asset_addr: AssetAddress,
    pub deadline_t_asset: u64,
}

/// Coordinator-side record of one swap in flight (§3.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSwap {
    pub hash_h: Commitment,
    pub token_id: TokenId,
    pub price_sats: u64,
    pub seller_btc_addr: String,
    pub seller_asset_addr: AssetAddress,
    pub buyer_asset_addr: AssetAddress,
    pub deadline_t_asset: u64,
    pub status: SwapStatus,
    pub btc_txid: Option<Txid>,
    pub reveal_txid: Option<Txid>,
    pub secret_s: Option<Secret>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl PendingSwap {
    pub fn new(req: RegisterSwapRequest, now: u64) -> Self {
        Self {
            hash_h: req.hash_h,
            token_id: req.token_id,
            price_sats: req.price_sats,
            seller_btc_addr: req.seller_btc_addr,
            seller_asset_addr: req.seller_asset_addr,
            buyer_asset_addr: req.buyer_asset_addr,
            deadline_t_asset: req.deadline_t_asset,
            status: SwapStatus::WaitingBtc,
            btc_txid: None,
            reveal_txid: None,
            secret_s: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `T_asset_adjusted` from §4.6 step 3: the asset-leg deadline minus
    /// the coordinator's own head-start buffer (Open Question 1 — kept
    /// independent of the BTC/asset safety gap Δ).
    pub fn t_asset_adjusted(&self, head_start_secs: u64) -> u64 {
        self.deadline_t_asset.saturating_sub(head_start_secs)
    }

    fn expect_status(&self, expected: SwapStatus) -> Result<()> {
        if self.status != expected {
            return Err(Error::Internal(format!(
                "swap {} expected status {expected}, found {}",
                self.hash_h, self.status
            )));
        }
        Ok(())
    }

    /// `waiting_btc -> btc_locked` (§4.6 step 2).
    pub fn mark_btc_seen(&mut self, txid: Txid, now: u64) -> Result<()> {
        self.expect_status(SwapStatus::WaitingBtc)?;
        self.btc_txid = Some(txid);
        self.status = SwapStatus::BtcLocked;
        self.updated_at = now;
        Ok(())
    }

    /// A previously-seen funding tx disappeared before the asset leg
    /// opened (§4.4 reorg policy): drop back to `waiting_btc`.
    pub fn mark_reorged_to_waiting(&mut self, now: u64) -> Result<()> {
        self.expect_status(SwapStatus::BtcLocked)?;
        self.btc_txid = None;
        self.status = SwapStatus::WaitingBtc;
        self.updated_at = now;
        Ok(())
    }

    /// `btc_locked -> asset_locked` (§4.6 step 3).
    pub fn mark_asset_locked(&mut self, now: u64) -> Result<()> {
        self.expect_status(SwapStatus::BtcLocked)?;
        self.status = SwapStatus::AssetLocked;
        self.updated_at = now;
        Ok(())
    }

    /// Records a revealed preimage without yet changing status — the
    /// actor still has to submit `claim` before the swap moves to
    /// `claimed` (§4.6 step 4).
    pub fn record_reveal(&mut self, secret: Secret, reveal_txid: Txid) {
        self.secret_s = Some(secret);
        self.reveal_txid = Some(reveal_txid);
    }

    /// `asset_locked -> claimed` (§4.6 step 4).
    pub fn mark_claimed(&mut self, secret: Secret, now: u64) -> Result<()> {
        self.expect_status(SwapStatus::AssetLocked)?;
        self.secret_s = Some(secret);
        self.status = SwapStatus::Claimed;
        self.updated_at = now;
        Ok(())
    }

    /// `{btc_locked, asset_locked} -> refunded` (§4.6 step 5).
    pub fn mark_refunded(&mut self, now: u64) -> Result<()> {
        if self.status != SwapStatus::BtcLocked && self.status != SwapStatus::AssetLocked {
            return Err(Error::Internal(format!(
                "swap {} cannot refund from status {}",
                self.hash_h, self.status
            )));
        }
        self.status = SwapStatus::Refunded;
        self.updated_at = now;
        Ok(())
    }

    /// `* -> expired` (§4.6 step 5, the no-asset-ever-opened and
    /// lost-the-claim-race branches).
    pub fn mark_expired(&mut self, now: u64) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::Internal(format!(
                "swap {} already terminal ({})",
                self.hash_h, self.status
            )));
        }
        self.status = SwapStatus::Expired;
        self.updated_at = now;
        Ok(())
    }
}
