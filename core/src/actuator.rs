//! Asset-ledger actuator (C5).
//!
//! A thin façade over the asset HTLC module (C3): it does not decide
//! whether to retry (§4.5 — "all retries are the coordinator's decision,
//! not the actuator's") and it does not interpret escrow semantics
//! itself. It exists to give submissions a resource estimate and an
//! overall per-attempt timeout, and to translate whatever the
//! underlying [`AssetLedgerClient`] returns into the authoritative
//! post-state the coordinator needs.
//!
//! The actuator submits with the coordinator's own signing key (§4.5) —
//! that is the transaction signer/fee-payer, not the logical `caller`
//! the asset HTLC module authorizes each operation against. The
//! coordinator never holds the seller's or buyer's keys (§1 Non-goals);
//! `caller` on `open_escrow`/`refund` is the swap's seller and on
//! `claim` is the swap's buyer, recovered from a pre-authorization the
//! coordinator relays rather than a locally-held private key. See
//! `DESIGN.md` for this resolution.

use crate::asset_ledger::{AssetAddress, AssetLedgerClient, AssetLedgerEvent, Escrow, TokenId};
use crate::error::{Error, Result};
use crate::secret::{Commitment, Secret};
use std::sync::Arc;
use std::time::Duration;

/// Multiplier applied to an estimated resource cost before submitting,
/// matching §4.5's "adds a 20% buffer to an estimated baseline".
pub const GAS_BUFFER_NUMERATOR: u64 = 120;
pub const GAS_BUFFER_DENOMINATOR: u64 = 100;

/// Overall per-attempt timeout for actuator submissions (§4.6, §5).
pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Estimates a resource ceiling for an operation. Real deployments back
/// this with a chain-specific gas/fee estimator; failing that, the
/// actuator falls back to `ceiling`.
pub trait ResourceEstimator: Send + Sync {
    /// Best-effort estimate of the baseline resource cost of `op_name`.
    /// `None` means estimation failed and the configured ceiling should
    /// be used instead.
    fn estimate(&self, op_name: &str) -> Option<u64>;
}

/// Always fails to estimate, forcing the configured ceiling. Used when a
/// deployment has no gas-estimation API (e.g. the in-memory reference
/// ledger, which has no notion of gas at all).
pub struct NoEstimator;

impl ResourceEstimator for NoEstimator {
    fn estimate(&self, _op_name: &str) -> Option<u64> {
        None
    }
}

/// Applies the 20% buffer to an estimate, or returns `ceiling` if
/// estimation failed.
pub fn resource_budget(estimator: &dyn ResourceEstimator, op_name: &str, ceiling: u64) -> u64 {
    match estimator.estimate(op_name) {
        Some(baseline) => baseline
            .saturating_mul(GAS_BUFFER_NUMERATOR)
            .checked_div(GAS_BUFFER_DENOMINATOR)
            .unwrap_or(ceiling)
            .min(ceiling.max(baseline)),
        None => ceiling,
    }
}

/// Façade over [`AssetLedgerClient`] implementing C5's operation set:
/// `openEscrow`, `claim`, `refund`, `isInEscrow`, `getEscrow`, `getOwner`.
pub struct AssetLedgerActuator {
    ledger: Arc<dyn AssetLedgerClient>,
    estimator: Arc<dyn ResourceEstimator>,
    resource_ceiling: u64,
}

impl AssetLedgerActuator {
    pub fn new(
        ledger: Arc<dyn AssetLedgerClient>,
        estimator: Arc<dyn ResourceEstimator>,
        resource_ceiling: u64,
    ) -> Self {
        Self {
            ledger,
            estimator,
            resource_ceiling,
        }
    }

    pub fn with_defaults(ledger: Arc<dyn AssetLedgerClient>) -> Self {
        Self::new(ledger, Arc::new(NoEstimator), u64::MAX)
    }

    async fn submit<F, Fut>(&self, op_name: &'static str, op: F) -> Result<AssetLedgerEvent>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<AssetLedgerEvent>>,
    {
        let _budget = resource_budget(self.estimator.as_ref(), op_name, self.resource_ceiling);
        match tokio::time::timeout(SUBMIT_TIMEOUT, op()).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(Error::ActuatorTimeout(SUBMIT_TIMEOUT)),
        }
    }

    /// `openEscrow(tokenId, buyer, H, T_asset, price)`, relayed on
    /// behalf of `seller` (the token's current owner).
    pub async fn open_escrow(
        &self,
        seller: AssetAddress,
        token_id: TokenId,
        buyer: AssetAddress,
        hash: Commitment,
        expiry: u64,
        price_sats: u64,
    ) -> Result<Escrow> {
        let event = self
            .submit("sale_open", || {
                self.ledger
                    .sale_open(seller, token_id, buyer, hash, expiry, price_sats)
            })
            .await?;
        match event {
            AssetLedgerEvent::SaleOpen {
                seller,
                buyer,
                hash,
                expiry,
                price_sats,
                ..
            } => Ok(Escrow {
                seller,
                buyer,
                hash,
                expiry,
                price_sats,
            }),
            other => Err(Error::ParseFailure(format!(
                "expected SaleOpen event, got {other:?}"
            ))),
        }
    }

    /// `claim(tokenId, S)`, relayed on behalf of `buyer`. Returns the
    /// buyer the asset settled to.
    pub async fn claim(
        &self,
        buyer: AssetAddress,
        token_id: TokenId,
        secret: Secret,
    ) -> Result<AssetAddress> {
        let event = self
            .submit("claim", || self.ledger.claim(buyer, token_id, secret))
            .await?;
        match event {
            AssetLedgerEvent::SaleSettle { buyer, .. } => Ok(buyer),
            other => Err(Error::ParseFailure(format!(
                "expected SaleSettle event, got {other:?}"
            ))),
        }
    }

    /// `refund(tokenId)`, relayed on behalf of `caller` — the swap's
    /// seller, or any address once the escrow has expired (§4.3).
    /// Returns the seller ownership reverted to.
    pub async fn refund(&self, caller: AssetAddress, token_id: TokenId) -> Result<AssetAddress> {
        let event = self
            .submit("refund", || self.ledger.refund(caller, token_id))
            .await?;
        match event {
            AssetLedgerEvent::SaleRefund { seller, .. } => Ok(seller),
            other => Err(Error::ParseFailure(format!(
                "expected SaleRefund event, got {other:?}"
            ))),
        }
    }

    pub async fn is_in_escrow(&self, token_id: TokenId) -> Result<bool> {
        self.ledger.is_in_escrow(token_id).await
    }

    pub async fn get_escrow(&self, token_id: TokenId) -> Result<Option<Escrow>> {
        self.ledger.get_escrow(token_id).await
    }

    pub async fn get_owner(&self, token_id: TokenId) -> Result<Option<AssetAddress>> {
        self.ledger.get_owner(token_id).await
    }
}
