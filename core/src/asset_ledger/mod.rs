//! Asset HTLC module (C3).
//!
//! Models the asset ledger as a single entity with two capabilities —
//! `TokenRegistry` (mint, note, freeze, transfer, ownership) and
//! `EscrowSubsystem` (saleOpen, claim, refund) — instead of the deep
//! mixin hierarchy (token-standard + ownership + reentrancy-guard + HTLC
//! extension) a typical reference implementation uses. Reentrancy
//! discipline becomes a local precondition on `claim`/`refund` (clear the
//! escrow before transferring) rather than a cross-cutting base class.
//!
//! [`AssetLedgerClient`] is the trait the actuator (C5) and the
//! coordinator (C6) program against; [`memory`] provides an in-process
//! implementation used in development and tests, standing in for
//! whatever smart-asset runtime a deployment actually talks to.

pub mod memory;

use crate::error::{Error, Result};
use crate::secret::{Commitment, Secret};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque address on the asset ledger. The coordinator never interprets
/// this beyond equality and the zero sentinel — it could be an EVM
/// address, a UTXO-style script hash, or anything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetAddress(pub String);

impl AssetAddress {
    pub fn zero() -> Self {
        AssetAddress(String::new())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for AssetAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            f.write_str("<zero>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Numeric id of a minted token. Must be nonzero.
pub type TokenId = u64;

const MAX_TITLE_LEN: usize = 100;
const MAX_NOTE_LEN: usize = 140;
const MAX_FIELD_LEN: usize = 500;

/// Per-token metadata (§4.2). `frozen` starts `false` and is one-way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub title: String,
    pub category: String,
    pub identifiers: String,
    pub attributes: String,
    pub note: String,
    pub frozen: bool,
}

impl TokenMetadata {
    /// Validate and construct fresh metadata for `mint`. `frozen` is
    /// always `false` at mint time.
    pub fn new(
        title: impl Into<String>,
        category: impl Into<String>,
        identifiers: impl Into<String>,
        attributes: impl Into<String>,
        note: impl Into<String>,
    ) -> Result<Self> {
        let title = title.into();
        let category = category.into();
        let identifiers = identifiers.into();
        let attributes = attributes.into();
        let note = note.into();

        if title.is_empty() || title.len() > MAX_TITLE_LEN {
            return Err(Error::InvalidTitle(title.len()));
        }
        if category.len() > MAX_FIELD_LEN {
            return Err(Error::InvalidMetadata("category"));
        }
        if identifiers.len() > MAX_FIELD_LEN {
            return Err(Error::InvalidMetadata("identifiers"));
        }
        if attributes.len() > MAX_FIELD_LEN {
            return Err(Error::InvalidMetadata("attributes"));
        }
        if note.len() > MAX_NOTE_LEN {
            return Err(Error::NoteTooLong(note.len()));
        }

        Ok(TokenMetadata {
            title,
            category,
            identifiers,
            attributes,
            note,
            frozen: false,
        })
    }
}

/// An active escrow on one token (§3.3, §4.2). At most one per token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escrow {
    pub seller: AssetAddress,
    pub buyer: AssetAddress,
    pub hash: Commitment,
    pub expiry: u64,
    pub price_sats: u64,
}

/// Canonical lifecycle events the asset HTLC module emits (§6.1). Raw
/// ledger logs are normalized into these by the event normalizer (C7);
/// the in-memory reference ledger emits them directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AssetLedgerEvent {
    Minted {
        token_id: TokenId,
        owner: AssetAddress,
        title: String,
    },
    Transfer {
        token_id: TokenId,
        from: AssetAddress,
        to: AssetAddress,
    },
    NoteAdded {
        token_id: TokenId,
        note: String,
    },
    MetadataFrozen {
        token_id: TokenId,
    },
    SaleOpen {
        token_id: TokenId,
        seller: AssetAddress,
        buyer: AssetAddress,
        hash: Commitment,
        expiry: u64,
        price_sats: u64,
    },
    SaleSettle {
        token_id: TokenId,
        seller: AssetAddress,
        buyer: AssetAddress,
        hash: Commitment,
    },
    SaleRefund {
        token_id: TokenId,
        seller: AssetAddress,
        buyer: AssetAddress,
        hash: Commitment,
    },
}

/// Client interface to the asset HTLC module (§4.3), implemented either
/// by [`memory::InMemoryAssetLedger`] directly or by a real ledger RPC
/// client behind the actuator (C5).
///
/// `caller` on each mutating call represents the authenticated party
/// making the request; the ledger enforces the authorization
/// preconditions from §4.3 itself rather than trusting the caller.
#[async_trait]
pub trait AssetLedgerClient: Send + Sync {
    async fn mint(
        &self,
        caller: AssetAddress,
        token_id: TokenId,
        meta: TokenMetadata,
    ) -> Result<AssetLedgerEvent>;

    async fn set_note(
        &self,
        caller: AssetAddress,
        token_id: TokenId,
        note: String,
    ) -> Result<AssetLedgerEvent>;

    async fn freeze_metadata(
        &self,
        caller: AssetAddress,
        token_id: TokenId,
    ) -> Result<AssetLedgerEvent>;

    async fn sale_open(
        &self,
        caller: AssetAddress,
        token_id: TokenId,
        buyer: AssetAddress,
        hash: Commitment,
        expiry: u64,
        price_sats: u64,
    ) -> Result<AssetLedgerEvent>;

    async fn claim(
        &self,
        caller: AssetAddress,
        token_id: TokenId,
        secret: Secret,
    ) -> Result<AssetLedgerEvent>;

    /// `caller = escrow.seller` OR `now >= escrow.expiry` (anyone).
    async fn refund(&self, caller: AssetAddress, token_id: TokenId) -> Result<AssetLedgerEvent>;

    async fn transfer(
        &self,
        caller: AssetAddress,
        token_id: TokenId,
        to: AssetAddress,
    ) -> Result<AssetLedgerEvent>;

    async fn is_in_escrow(&self, token_id: TokenId) -> Result<bool>;

    async fn can_claim(&self, token_id: TokenId, secret: &Secret) -> Result<bool>;

    async fn can_refund(&self, token_id: TokenId) -> Result<bool>;

    async fn get_escrow(&self, token_id: TokenId) -> Result<Option<Escrow>>;

    async fn get_owner(&self, token_id: TokenId) -> Result<Option<AssetAddress>>;

    async fn get_metadata(&self, token_id: TokenId) -> Result<Option<TokenMetadata>>;
}
