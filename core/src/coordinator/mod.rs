//! Swap coordinator (C6): the actor that drives each [`swap::PendingSwap`]
//! through its lifecycle, and the handle client code uses to talk to it.

pub mod actor;
pub mod handle;
pub mod swap;

use crate::asset_ledger::TokenId;
use crate::secret::Commitment;
use crate::types::SwapStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot of the coordinator's book (§6.4 admin API `stats`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    pub total: usize,
    pub by_status: BTreeMap<SwapStatus, usize>,
    pub oldest_pending_age_secs: Option<u64>,
}

/// Conditions an operator needs to know about but that are not failures
/// the coordinator can resolve on its own (§4.6 "Forced operations").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorAlert {
    /// BTC funding was reorged out after the asset leg already opened;
    /// no auto-refund is attempted (Open Question, resolved in `DESIGN.md`).
    FundingDisappearedAfterAssetLocked { hash_h: Commitment, token_id: TokenId },
}

/// Notifications the actor publishes for observers (logging, metrics,
/// an admin websocket) to subscribe to. Distinct from the inbox
/// messages the actor itself consumes.
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    StatusChanged {
        hash_h: Commitment,
        token_id: TokenId,
        status: SwapStatus,
    },
    Alert(OperatorAlert),
}
