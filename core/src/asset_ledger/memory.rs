//! In-memory reference implementation of the asset HTLC module.
//!
//! Stands in for a real smart-asset runtime in development and in the
//! end-to-end scenario tests (§8, E1-E6). Implements the full operation
//! table from §4.3 including the reentrancy discipline: `claim` and
//! `refund` remove the escrow record before touching ownership.

use super::{AssetAddress, AssetLedgerClient, AssetLedgerEvent, Escrow, TokenId, TokenMetadata};
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::secret::{self, Secret};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

struct TokenRecord {
    owner: AssetAddress,
    meta: TokenMetadata,
}

/// An in-process `AssetLedgerClient`. Single-writer-per-token is
/// enforced by holding the whole table lock for the duration of each
/// mutating call, which also gives us the "ledger's own sequencing"
/// the spec leans on to rule out concurrent claim/refund races.
pub struct InMemoryAssetLedger {
    tokens: RwLock<HashMap<TokenId, TokenRecord>>,
    escrows: RwLock<HashMap<TokenId, Escrow>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryAssetLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            escrows: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    fn now(&self) -> u64 {
        self.clock.now()
    }
}

#[async_trait]
impl AssetLedgerClient for InMemoryAssetLedger {
    async fn mint(
        &self,
        caller: AssetAddress,
        token_id: TokenId,
        meta: TokenMetadata,
    ) -> Result<AssetLedgerEvent> {
        if token_id == 0 {
            return Err(Error::Internal("token id must be nonzero".into()));
        }
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(&token_id) {
            return Err(Error::DuplicateTokenId(token_id));
        }
        let title = meta.title.clone();
        tokens.insert(
            token_id,
            TokenRecord {
                owner: caller.clone(),
                meta,
            },
        );
        Ok(AssetLedgerEvent::Minted {
            token_id,
            owner: caller,
            title,
        })
    }

    async fn set_note(
        &self,
        caller: AssetAddress,
        token_id: TokenId,
        note: String,
    ) -> Result<AssetLedgerEvent> {
        if note.len() > 140 {
            return Err(Error::NoteTooLong(note.len()));
        }
        if self.is_in_escrow(token_id).await? {
            return Err(Error::InEscrow(token_id));
        }
        let mut tokens = self.tokens.write().await;
        let record = tokens.get_mut(&token_id).ok_or(Error::NoSuchToken(token_id))?;
        if record.owner != caller {
            return Err(Error::NotOwner);
        }
        if record.meta.frozen {
            return Err(Error::Frozen(token_id));
        }
        record.meta.note = note.clone();
        Ok(AssetLedgerEvent::NoteAdded { token_id, note })
    }

    async fn freeze_metadata(
        &self,
        caller: AssetAddress,
        token_id: TokenId,
    ) -> Result<AssetLedgerEvent> {
        if self.is_in_escrow(token_id).await? {
            return Err(Error::InEscrow(token_id));
        }
        let mut tokens = self.tokens.write().await;
        let record = tokens.get_mut(&token_id).ok_or(Error::NoSuchToken(token_id))?;
        if record.owner != caller {
            return Err(Error::NotOwner);
        }
        if record.meta.frozen {
            return Err(Error::AlreadyFrozen);
        }
        record.meta.frozen = true;
        Ok(AssetLedgerEvent::MetadataFrozen { token_id })
    }

    async fn sale_open(
        &self,
        caller: AssetAddress,
        token_id: TokenId,
        buyer: AssetAddress,
        hash: crate::secret::Commitment,
        expiry: u64,
        price_sats: u64,
    ) -> Result<AssetLedgerEvent> {
        // Hold the escrows write lock across the whole
        // check-then-insert: two concurrent `sale_open` calls on the
        // same token must not both observe "not in escrow" and then
        // both insert (§8 "at most one active escrow per token" at
        // every observable instant, not just between locked sections).
        let mut escrows = self.escrows.write().await;
        if escrows.contains_key(&token_id) {
            return Err(Error::InEscrow(token_id));
        }
        {
            let tokens = self.tokens.read().await;
            let record = tokens.get(&token_id).ok_or(Error::NoSuchToken(token_id))?;
            if record.owner != caller {
                return Err(Error::NotOwner);
            }
            if buyer.is_zero() || buyer == record.owner {
                return Err(Error::InvalidBuyer);
            }
        }
        if hash.is_zero() {
            return Err(Error::InvalidHash);
        }
        if price_sats == 0 {
            return Err(Error::InvalidPrice);
        }
        crate::timelock::validate_asset_expiry_at(expiry, self.now())?;

        let escrow = Escrow {
            seller: caller.clone(),
            buyer: buyer.clone(),
            hash,
            expiry,
            price_sats,
        };
        escrows.insert(token_id, escrow);

        Ok(AssetLedgerEvent::SaleOpen {
            token_id,
            seller: caller,
            buyer,
            hash,
            expiry,
            price_sats,
        })
    }

    async fn claim(
        &self,
        caller: AssetAddress,
        token_id: TokenId,
        secret: Secret,
    ) -> Result<AssetLedgerEvent> {
        let mut escrows = self.escrows.write().await;
        let escrow = escrows.get(&token_id).cloned().ok_or(Error::NotInEscrow(token_id))?;
        if caller != escrow.buyer {
            return Err(Error::NotBuyer);
        }
        if self.now() >= escrow.expiry {
            return Err(Error::Expired);
        }
        if !secret::verify(&secret, &escrow.hash) {
            return Err(Error::BadSecret);
        }

        // Reentrancy discipline: clear escrow before transferring (§4.3).
        escrows.remove(&token_id);
        drop(escrows);

        let mut tokens = self.tokens.write().await;
        let record = tokens.get_mut(&token_id).ok_or(Error::NoSuchToken(token_id))?;
        record.owner = escrow.buyer.clone();

        Ok(AssetLedgerEvent::SaleSettle {
            token_id,
            seller: escrow.seller,
            buyer: escrow.buyer,
            hash: escrow.hash,
        })
    }

    async fn refund(&self, caller: AssetAddress, token_id: TokenId) -> Result<AssetLedgerEvent> {
        let mut escrows = self.escrows.write().await;
        let escrow = escrows.get(&token_id).cloned().ok_or(Error::NotInEscrow(token_id))?;
        let expired = self.now() >= escrow.expiry;
        if caller != escrow.seller && !expired {
            return Err(Error::RefundNotYet);
        }

        // Reentrancy discipline: clear escrow before ownership is final.
        // Ownership never moved from seller, so there is no transfer to
        // perform, but we still clear first to match the ordering §4.3
        // mandates for claim/refund symmetry.
        escrows.remove(&token_id);

        Ok(AssetLedgerEvent::SaleRefund {
            token_id,
            seller: escrow.seller,
            buyer: escrow.buyer,
            hash: escrow.hash,
        })
    }

    async fn transfer(
        &self,
        caller: AssetAddress,
        token_id: TokenId,
        to: AssetAddress,
    ) -> Result<AssetLedgerEvent> {
        if self.is_in_escrow(token_id).await? {
            return Err(Error::InEscrow(token_id));
        }
        let mut tokens = self.tokens.write().await;
        let record = tokens.get_mut(&token_id).ok_or(Error::NoSuchToken(token_id))?;
        if record.owner != caller {
            return Err(Error::NotOwner);
        }
        record.owner = to.clone();
        Ok(AssetLedgerEvent::Transfer {
            token_id,
            from: caller,
            to,
        })
    }

    async fn is_in_escrow(&self, token_id: TokenId) -> Result<bool> {
        Ok(self.escrows.read().await.contains_key(&token_id))
    }

    async fn can_claim(&self, token_id: TokenId, secret: &Secret) -> Result<bool> {
        let escrows = self.escrows.read().await;
        Ok(match escrows.get(&token_id) {
            Some(e) => self.now() < e.expiry && secret::verify(secret, &e.hash),
            None => false,
        })
    }

    async fn can_refund(&self, token_id: TokenId) -> Result<bool> {
        let escrows = self.escrows.read().await;
        Ok(match escrows.get(&token_id) {
            Some(e) => self.now() >= e.expiry,
            None => false,
        })
    }

    async fn get_escrow(&self, token_id: TokenId) -> Result<Option<Escrow>> {
        Ok(self.escrows.read().await.get(&token_id).cloned())
    }

    async fn get_owner(&self, token_id: TokenId) -> Result<Option<AssetAddress>> {
        Ok(self.tokens.read().await.get(&token_id).map(|r| r.owner.clone()))
    }

    async fn get_metadata(&self, token_id: TokenId) -> Result<Option<TokenMetadata>> {
        Ok(self.tokens.read().await.get(&token_id).map(|r| r.meta.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::secret::generate_secret;

    fn addr(s: &str) -> AssetAddress {
        AssetAddress(s.to_string())
    }

    fn ledger_at(now: u64) -> (InMemoryAssetLedger, Arc<TestClock>) {
        let clock = Arc::new(TestClock::new(now));
        (InMemoryAssetLedger::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn mint_then_sale_open_then_claim() {
        let (ledger, clock) = ledger_at(1_000_000);
        let seller = addr("seller");
        let buyer = addr("buyer");

        let meta = TokenMetadata::new("2019 Audi A4", "vehicle", "", "", "").unwrap();
        ledger.mint(seller.clone(), 1, meta).await.unwrap();

        let (secret, hash) = generate_secret().unwrap();
        let expiry = clock.now() + 10_800;
        ledger
            .sale_open(seller.clone(), 1, buyer.clone(), hash, expiry, 50_000_000)
            .await
            .unwrap();

        assert!(ledger.is_in_escrow(1).await.unwrap());
        let event = ledger.claim(buyer.clone(), 1, secret).await.unwrap();
        assert!(matches!(event, AssetLedgerEvent::SaleSettle { .. }));
        assert_eq!(ledger.get_owner(1).await.unwrap(), Some(buyer));
        assert!(!ledger.is_in_escrow(1).await.unwrap());
    }

    #[tokio::test]
    async fn refund_after_expiry_by_anyone() {
        let (ledger, clock) = ledger_at(1_000_000);
        let seller = addr("seller");
        let buyer = addr("buyer");
        let meta = TokenMetadata::new("widget", "", "", "", "").unwrap();
        ledger.mint(seller.clone(), 1, meta).await.unwrap();
        let (_secret, hash) = generate_secret().unwrap();
        let expiry = clock.now() + 10_800;
        ledger
            .sale_open(seller.clone(), 1, buyer.clone(), hash, expiry, 10)
            .await
            .unwrap();

        clock.advance(10_801);
        let event = ledger.refund(addr("random stranger"), 1).await.unwrap();
        assert!(matches!(event, AssetLedgerEvent::SaleRefund { .. }));
        assert_eq!(ledger.get_owner(1).await.unwrap(), Some(seller));
    }

    #[tokio::test]
    async fn early_seller_refund_allowed() {
        let (ledger, clock) = ledger_at(1_000_000);
        let seller = addr("seller");
        let buyer = addr("buyer");
        let meta = TokenMetadata::new("widget", "", "", "", "").unwrap();
        ledger.mint(seller.clone(), 1, meta).await.unwrap();
        let (_secret, hash) = generate_secret().unwrap();
        let expiry = clock.now() + 10_800;
        ledger
            .sale_open(seller.clone(), 1, buyer, hash, expiry, 10)
            .await
            .unwrap();

        ledger.refund(seller, 1).await.unwrap();
        assert!(!ledger.is_in_escrow(1).await.unwrap());
    }

    #[tokio::test]
    async fn wrong_secret_rejected() {
        let (ledger, clock) = ledger_at(1_000_000);
        let seller = addr("seller");
        let buyer = addr("buyer");
        let meta = TokenMetadata::new("widget", "", "", "", "").unwrap();
        ledger.mint(seller.clone(), 1, meta).await.unwrap();
        let (_secret, hash) = generate_secret().unwrap();
        let (wrong_secret, _) = generate_secret().unwrap();
        let expiry = clock.now() + 10_800;
        ledger
            .sale_open(seller, 1, buyer.clone(), hash, expiry, 10)
            .await
            .unwrap();

        let err = ledger.claim(buyer, 1, wrong_secret).await.unwrap_err();
        assert!(matches!(err, Error::BadSecret));
        assert!(ledger.is_in_escrow(1).await.unwrap());
    }

    #[tokio::test]
    async fn claim_after_expiry_rejected_then_refundable() {
        let (ledger, clock) = ledger_at(1_000_000);
        let seller = addr("seller");
        let buyer = addr("buyer");
        let meta = TokenMetadata::new("widget", "", "", "", "").unwrap();
        ledger.mint(seller.clone(), 1, meta).await.unwrap();
        let (secret, hash) = generate_secret().unwrap();
        let expiry = clock.now() + 10_800;
        ledger
            .sale_open(seller, 1, buyer.clone(), hash, expiry, 10)
            .await
            .unwrap();

        clock.advance(10_801);
        let err = ledger.claim(buyer, 1, secret).await.unwrap_err();
        assert!(matches!(err, Error::Expired));
        assert!(ledger.can_refund(1).await.unwrap());
    }

    #[tokio::test]
    async fn double_open_rejected() {
        let (ledger, clock) = ledger_at(1_000_000);
        let seller = addr("seller");
        let buyer = addr("buyer");
        let meta = TokenMetadata::new("widget", "", "", "", "").unwrap();
        ledger.mint(seller.clone(), 1, meta).await.unwrap();
        let (_secret, hash) = generate_secret().unwrap();
        let expiry = clock.now() + 10_800;
        ledger
            .sale_open(seller.clone(), 1, buyer.clone(), hash, expiry, 10)
            .await
            .unwrap();

        let err = ledger
            .sale_open(seller, 1, buyer, hash, expiry, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InEscrow(1)));
    }

    #[tokio::test]
    async fn transfer_blocked_while_in_escrow() {
        let (ledger, clock) = ledger_at(1_000_000);
        let seller = addr("seller");
        let buyer = addr("buyer");
        let meta = TokenMetadata::new("widget", "", "", "", "").unwrap();
        ledger.mint(seller.clone(), 1, meta).await.unwrap();
        let (_secret, hash) = generate_secret().unwrap();
        let expiry = clock.now() + 10_800;
        ledger
            .sale_open(seller.clone(), 1, buyer, hash, expiry, 10)
            .await
            .unwrap();

        let err = ledger
            .transfer(seller, 1, addr("someone else"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InEscrow(1)));
    }

    #[tokio::test]
    async fn claim_then_refund_fails_not_in_escrow() {
        let (ledger, clock) = ledger_at(1_000_000);
        let seller = addr("seller");
        let buyer = addr("buyer");
        let meta = TokenMetadata::new("widget", "", "", "", "").unwrap();
        ledger.mint(seller.clone(), 1, meta).await.unwrap();
        let (secret, hash) = generate_secret().unwrap();
        let expiry = clock.now() + 10_800;
        ledger
            .sale_open(seller, 1, buyer.clone(), hash, expiry, 10)
            .await
            .unwrap();
        ledger.claim(buyer.clone(), 1, secret).await.unwrap();

        let err = ledger.refund(buyer, 1).await.unwrap_err();
        assert!(matches!(err, Error::NotInEscrow(1)));
    }
}
