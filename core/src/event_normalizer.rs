//! Event normalizer (C7).
//!
//! Translates raw asset-ledger logs into a canonical, monotonically
//! ordered event stream. Unrecognized schemas are dropped with a counter
//! rather than causing the fold to fail — the closed [`AssetLedgerEvent`]
//! variant set (§9 "duck-typed event parsing" redesign) means there is
//! nothing left to dynamically dispatch on, but a real chain indexer can
//! still hand us logs for events outside that set (other contracts on
//! the same chain, future schema versions) and those must not wedge the
//! fold.

use crate::asset_ledger::{AssetAddress, AssetLedgerEvent, TokenId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One raw log entry as delivered by the asset-ledger's log/event feed,
/// before normalization.
#[derive(Debug, Clone)]
pub struct RawLogEntry {
    pub event: AssetLedgerEvent,
    pub txid: String,
    pub block_number: u64,
    /// Index of this log within its block; authoritative tiebreaker
    /// when two logs share a `block_number` (§4.7).
    pub log_index: u64,
    /// Block timestamp — authoritative for ordering, not wall-clock
    /// receipt time (§4.7).
    pub timestamp: u64,
}

/// A canonical, ordered record produced by [`normalize`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub token_id: TokenId,
    pub txid: String,
    pub block_number: u64,
    pub log_index: u64,
    pub timestamp: u64,
    pub event: AssetLedgerEvent,
}

/// Running tally of logs that did not decode into a known
/// [`AssetLedgerEvent`] schema. A real chain-log feed hands us entries
/// from unrelated contracts/topics; those are silently counted here
/// rather than failing the whole batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeStats {
    pub accepted: usize,
    pub dropped_unrecognized: usize,
    pub dropped_redundant_transfer: usize,
}

fn token_id_of(event: &AssetLedgerEvent) -> TokenId {
    match event {
        AssetLedgerEvent::Minted { token_id, .. }
        | AssetLedgerEvent::Transfer { token_id, .. }
        | AssetLedgerEvent::NoteAdded { token_id, .. }
        | AssetLedgerEvent::MetadataFrozen { token_id }
        | AssetLedgerEvent::SaleOpen { token_id, .. }
        | AssetLedgerEvent::SaleSettle { token_id, .. }
        | AssetLedgerEvent::SaleRefund { token_id, .. } => *token_id,
    }
}

/// Normalize a batch of raw logs (§4.7): discard `Transfer` events whose
/// `from` is the zero address (redundant with the paired `Minted`),
/// then sort by `(blockNumber, logIndex)`.
///
/// Every entry here already deserialized into a known [`AssetLedgerEvent`]
/// variant by construction of the type, so this function's "unrecognized
/// schema" counter only fires when a real chain adapter hands us a raw
/// log it could not itself decode — model that case by simply not
/// including it in `entries` and bumping [`NormalizeStats::dropped_unrecognized`]
/// at the call site.
pub fn normalize(entries: Vec<RawLogEntry>) -> (Vec<CanonicalEvent>, NormalizeStats) {
    let mut stats = NormalizeStats::default();
    let mut canonical: Vec<CanonicalEvent> = entries
        .into_iter()
        .filter_map(|raw| {
            if let AssetLedgerEvent::Transfer { ref from, .. } = raw.event {
                if from.is_zero() {
                    stats.dropped_redundant_transfer += 1;
                    return None;
                }
            }
            stats.accepted += 1;
            Some(CanonicalEvent {
                token_id: token_id_of(&raw.event),
                txid: raw.txid,
                block_number: raw.block_number,
                log_index: raw.log_index,
                timestamp: raw.timestamp,
                event: raw.event,
            })
        })
        .collect();

    canonical.sort_by_key(|e| (e.block_number, e.log_index));
    (canonical, stats)
}

/// Current owner of `token_id`, folding chain-ordered events: the buyer
/// of the most recent `SaleSettle`, else the `to` of the most recent
/// `Transfer`, else the `minter`'s owner from `Minted` (§4.7).
pub fn current_owner(events: &[CanonicalEvent], token_id: TokenId) -> Option<AssetAddress> {
    let mut owner = None;
    for e in events.iter().filter(|e| e.token_id == token_id) {
        match &e.event {
            AssetLedgerEvent::Minted { owner: o, .. } => owner = Some(o.clone()),
            AssetLedgerEvent::Transfer { to, .. } => owner = Some(to.clone()),
            AssetLedgerEvent::SaleSettle { buyer, .. } => owner = Some(buyer.clone()),
            _ => {}
        }
    }
    owner
}

/// Asset-side projection of a token's escrow lifecycle, folded purely
/// from ledger events (§3.4's full `SwapStatus` also depends on
/// BTC-side observations the normalizer has no visibility into; this is
/// the asset-ledger half of that projection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetProjection {
    NeverEscrowed,
    Escrowed,
    Settled,
    Refunded,
}

pub fn asset_projection(events: &[CanonicalEvent], token_id: TokenId) -> AssetProjection {
    let mut projection = AssetProjection::NeverEscrowed;
    for e in events.iter().filter(|e| e.token_id == token_id) {
        match &e.event {
            AssetLedgerEvent::SaleOpen { .. } => projection = AssetProjection::Escrowed,
            AssetLedgerEvent::SaleSettle { .. } => projection = AssetProjection::Settled,
            AssetLedgerEvent::SaleRefund { .. } => projection = AssetProjection::Refunded,
            _ => {}
        }
    }
    projection
}

/// Group canonical events by token, preserving chain order within each
/// group. Convenience for callers folding many tokens at once (e.g. the
/// coordinator's startup reconciliation sweep).
pub fn group_by_token(events: &[CanonicalEvent]) -> HashMap<TokenId, Vec<&CanonicalEvent>> {
    let mut map: HashMap<TokenId, Vec<&CanonicalEvent>> = HashMap::new();
    for e in events {
        map.entry(e.token_id).or_default().push(e);
    }
    map
}
