//! Bitcoin observer (C4).
//!
//! Watches a seller's funding address for an HTLC payment, tracks
//! confirmations, and scans the witnesses of whatever later spends that
//! output for the HTLC preimage. [`BtcChainClient`] is the seam: a real
//! deployment backs it with an Electrum/Esplora/bitcoind RPC client, and
//! tests back it with an in-memory fake that can be told to "produce" a
//! transaction or a reorg on command.
//!
//! The observer owns two pieces of mutable state per the data model —
//! the set of watched addresses and the processed-txid idempotency
//! cache — and only the observer mutates them; the coordinator reads
//! them through its own queries but never writes here directly.

use crate::error::{Error, Result};
use crate::secret::{self, Commitment, Secret};
use async_trait::async_trait;
use bitcoin::Txid;
use std::collections::HashSet;
use tokio::sync::RwLock;

/// Default poll interval for the funding-address scan, in seconds (§4.4).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Funding transactions paying under this many sats still fund the swap
/// (if they otherwise meet `priceBTC`), but are flagged with a dust
/// warning (§8 boundary notes).
pub const DUST_LIMIT_SATS: u64 = 1_000;

/// A candidate funding transaction paying into a watched address, as
/// reported by the chain data source.
#[derive(Debug, Clone)]
pub struct FundingCandidate {
    pub txid: Txid,
    /// `Σ round(vout.value · 10^8)` summed over outputs paying the
    /// watched address, in satoshis.
    pub total_sats: u64,
    pub confirmations: u64,
}

/// A transaction observed spending a previously-funding output, carrying
/// witness data that may contain the HTLC preimage.
#[derive(Debug, Clone)]
pub struct SpendingTx {
    pub txid: Txid,
    /// One witness stack per input, each stack a list of raw witness
    /// elements in push order.
    pub witnesses: Vec<Vec<Vec<u8>>>,
}

/// Abstraction over a Bitcoin chain data source: a full node RPC, an
/// Electrum server, or an Esplora-style HTTP indexer. Both polling and a
/// push-based websocket feed can implement this; the observer's pipeline
/// is idempotent either way (§4.4).
#[async_trait]
pub trait BtcChainClient: Send + Sync {
    /// Transactions paying the given address, most recent chain state.
    async fn funding_candidates(&self, address: &str) -> Result<Vec<FundingCandidate>>;

    /// Current confirmation count for `txid`, or `None` if it is no
    /// longer found on the best chain (a reorg dropped it).
    async fn confirmations(&self, txid: &Txid) -> Result<Option<u64>>;

    /// The transaction that spends `txid`'s outputs, if one has been
    /// seen yet.
    async fn spending_tx(&self, txid: &Txid) -> Result<Option<SpendingTx>>;
}

/// Outcome of polling one watched swap's funding address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundingObservation {
    /// No qualifying funding transaction has been seen yet.
    NotYetSeen,
    /// A funding transaction was seen and/or its confirmation count
    /// changed. `confirmations >= min_confirmations` means the caller
    /// may advance the swap to `asset_locked`.
    Funded {
        txid: Txid,
        total_sats: u64,
        confirmations: u64,
        overpaid_sats: u64,
        dust_warning: bool,
    },
    /// A previously observed funding tx is no longer present on the
    /// best chain (§4.4 reorg policy).
    Reorged,
}

/// Outcome of scanning for a revealed preimage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretObservation {
    NotYetRevealed,
    Revealed { secret: Secret, reveal_txid: Txid },
}

/// The Bitcoin observer (C4). Stateless with respect to swap identity —
/// it is handed an address/commitment/expected-amount per call and
/// reports what it currently sees; the coordinator (C6) owns mapping
/// that back to a swap.
pub struct BitcoinObserver<C: BtcChainClient> {
    client: C,
    min_confirmations: u64,
    processed_txids: RwLock<HashSet<Txid>>,
}

impl<C: BtcChainClient> BitcoinObserver<C> {
    pub fn new(client: C, min_confirmations: u64) -> Self {
        Self {
            client,
            min_confirmations: min_confirmations.max(1),
            processed_txids: RwLock::new(HashSet::new()),
        }
    }

    /// Poll `address` for a transaction paying at least `expected_sats`.
    /// Idempotent: once a qualifying txid has been accepted it is never
    /// re-evaluated from scratch, only re-checked for confirmations and
    /// disappearance.
    pub async fn poll_funding(
        &self,
        address: &str,
        expected_sats: u64,
        known_txid: Option<Txid>,
    ) -> Result<FundingObservation> {
        if let Some(txid) = known_txid {
            return match self.client.confirmations(&txid).await? {
                None => Ok(FundingObservation::Reorged),
                Some(confirmations) => {
                    // We don't have the original total here; re-derive it
                    // from the candidate list so overpaid/dust stay accurate.
                    let candidates = self.client.funding_candidates(address).await?;
                    let total_sats = candidates
                        .iter()
                        .find(|c| c.txid == txid)
                        .map(|c| c.total_sats)
                        .unwrap_or(expected_sats);
                    Ok(FundingObservation::Funded {
                        txid,
                        total_sats,
                        confirmations,
                        overpaid_sats: total_sats.saturating_sub(expected_sats),
                        dust_warning: total_sats < DUST_LIMIT_SATS,
                    })
                }
            };
        }

        let candidates = self.client.funding_candidates(address).await?;
        let mut processed = self.processed_txids.write().await;

        for candidate in candidates {
            if processed.contains(&candidate.txid) {
                continue;
            }
            if candidate.total_sats < expected_sats {
                // Underpayment: not a match, leave unprocessed in case a
                // later output in the same address tops it up is a
                // different tx entirely — this one never qualifies.
                continue;
            }
            processed.insert(candidate.txid);
            return Ok(FundingObservation::Funded {
                txid: candidate.txid,
                total_sats: candidate.total_sats,
                confirmations: candidate.confirmations,
                overpaid_sats: candidate.total_sats.saturating_sub(expected_sats),
                dust_warning: candidate.total_sats < DUST_LIMIT_SATS,
            });
        }
        Ok(FundingObservation::NotYetSeen)
    }

    pub fn has_enough_confirmations(&self, confirmations: u64) -> bool {
        confirmations >= self.min_confirmations
    }

    /// Scan the transaction spending `funding_txid` for a witness element
    /// hashing to `commitment` (§4.4 secret extraction).
    pub async fn scan_for_secret(
        &self,
        funding_txid: &Txid,
        commitment: &Commitment,
    ) -> Result<SecretObservation> {
        let spend = match self.client.spending_tx(funding_txid).await? {
            Some(s) => s,
            None => return Ok(SecretObservation::NotYetRevealed),
        };

        for witness_stack in &spend.witnesses {
            for element in witness_stack {
                if secret::matches_commitment(element, commitment) {
                    let mut bytes = [0u8; 32];
                    bytes.copy_from_slice(element);
                    return Ok(SecretObservation::Revealed {
                        secret: Secret::from_bytes(bytes),
                        reveal_txid: spend.txid,
                    });
                }
            }
        }
        Ok(SecretObservation::NotYetRevealed)
    }

    /// Forget a processed txid. Called by the eviction sweep for swaps
    /// that have reached a terminal state more than 24h ago (§4.4
    /// idempotency set bound).
    pub async fn evict_processed(&self, txid: &Txid) {
        self.processed_txids.write().await.remove(txid);
    }

    pub async fn is_processed(&self, txid: &Txid) -> bool {
        self.processed_txids.read().await.contains(txid)
    }
}

/// Round a BTC-denominated floating point amount from an external API
/// to the nearest satoshi (§4.4 amount semantics). Kept separate from
/// the observer so chain-client implementations can reuse it when
/// building [`FundingCandidate`] from whatever their API returns.
pub fn btc_to_sats_rounded(btc: f64) -> Result<u64> {
    if !btc.is_finite() || btc < 0.0 {
        return Err(Error::ParseFailure(format!("invalid BTC amount: {btc}")));
    }
    Ok((btc * 100_000_000.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::str::FromStr;
    use tokio::sync::Mutex;

    struct FakeChainClient {
        candidates: Mutex<HashMap<String, Vec<FundingCandidate>>>,
        confirmations: Mutex<HashMap<Txid, Option<u64>>>,
        spends: Mutex<HashMap<Txid, SpendingTx>>,
    }

    impl FakeChainClient {
        fn new() -> Self {
            Self {
                candidates: Mutex::new(HashMap::new()),
                confirmations: Mutex::new(HashMap::new()),
                spends: Mutex::new(HashMap::new()),
            }
        }

        async fn push_candidate(&self, address: &str, candidate: FundingCandidate) {
            self.confirmations
                .lock()
                .await
                .insert(candidate.txid, Some(candidate.confirmations));
            self.candidates
                .lock()
                .await
                .entry(address.to_string())
                .or_default()
                .push(candidate);
        }

        async fn drop_tx(&self, txid: &Txid) {
            self.confirmations.lock().await.insert(*txid, None);
        }

        async fn push_spend(&self, funding_txid: Txid, spend: SpendingTx) {
            self.spends.lock().await.insert(funding_txid, spend);
        }
    }

    #[async_trait]
    impl BtcChainClient for FakeChainClient {
        async fn funding_candidates(&self, address: &str) -> Result<Vec<FundingCandidate>> {
            Ok(self
                .candidates
                .lock()
                .await
                .get(address)
                .cloned()
                .unwrap_or_default())
        }

        async fn confirmations(&self, txid: &Txid) -> Result<Option<u64>> {
            Ok(self.confirmations.lock().await.get(txid).copied().flatten())
        }

        async fn spending_tx(&self, txid: &Txid) -> Result<Option<SpendingTx>> {
            Ok(self.spends.lock().await.get(txid).cloned())
        }
    }

    fn txid(byte: u8) -> Txid {
        let hex = hex::encode([byte; 32]);
        Txid::from_str(&hex).unwrap()
    }

    #[tokio::test]
    async fn detects_funding_meeting_price() {
        let client = FakeChainClient::new();
        let txid = txid(1);
        client
            .push_candidate(
                "seller-addr",
                FundingCandidate {
                    txid,
                    total_sats: 50_000_000,
                    confirmations: 1,
                },
            )
            .await;
        let observer = BitcoinObserver::new(client, 1);

        let obs = observer
            .poll_funding("seller-addr", 50_000_000, None)
            .await
            .unwrap();
        assert!(matches!(obs, FundingObservation::Funded { confirmations: 1, .. }));
    }

    #[tokio::test]
    async fn underpayment_does_not_qualify() {
        let client = FakeChainClient::new();
        client
            .push_candidate(
                "seller-addr",
                FundingCandidate {
                    txid: txid(2),
                    total_sats: 100,
                    confirmations: 1,
                },
            )
            .await;
        let observer = BitcoinObserver::new(client, 1);

        let obs = observer.poll_funding("seller-addr", 1_000, None).await.unwrap();
        assert_eq!(obs, FundingObservation::NotYetSeen);
    }

    #[tokio::test]
    async fn overpayment_and_dust_surfaced() {
        let client = FakeChainClient::new();
        client
            .push_candidate(
                "seller-addr",
                FundingCandidate {
                    txid: txid(3),
                    total_sats: 900,
                    confirmations: 1,
                },
            )
            .await;
        let observer = BitcoinObserver::new(client, 1);

        let obs = observer.poll_funding("seller-addr", 500, None).await.unwrap();
        match obs {
            FundingObservation::Funded {
                overpaid_sats,
                dust_warning,
                ..
            } => {
                assert_eq!(overpaid_sats, 400);
                assert!(dust_warning);
            }
            other => panic!("expected Funded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn idempotent_second_poll_does_not_rereturn_same_tx() {
        let client = FakeChainClient::new();
        client
            .push_candidate(
                "seller-addr",
                FundingCandidate {
                    txid: txid(4),
                    total_sats: 1_000,
                    confirmations: 1,
                },
            )
            .await;
        let observer = BitcoinObserver::new(client, 1);
        let first = observer.poll_funding("seller-addr", 1_000, None).await.unwrap();
        assert!(matches!(first, FundingObservation::Funded { .. }));

        // A second "fresh scan" poll (no known_txid) must not re-surface
        // the same tx as a brand new observation.
        let second = observer.poll_funding("seller-addr", 1_000, None).await.unwrap();
        assert_eq!(second, FundingObservation::NotYetSeen);
    }

    #[tokio::test]
    async fn reorg_reported_when_txid_disappears() {
        let client = FakeChainClient::new();
        let txid = txid(5);
        client
            .push_candidate(
                "seller-addr",
                FundingCandidate {
                    txid,
                    total_sats: 1_000,
                    confirmations: 1,
                },
            )
            .await;
        client.drop_tx(&txid).await;
        let observer = BitcoinObserver::new(client, 1);

        let obs = observer
            .poll_funding("seller-addr", 1_000, Some(txid))
            .await
            .unwrap();
        assert_eq!(obs, FundingObservation::Reorged);
    }

    #[tokio::test]
    async fn extracts_preimage_from_witness() {
        let (secret, commitment) = secret::generate_secret().unwrap();
        let client = FakeChainClient::new();
        let funding_txid = txid(6);
        let reveal_txid = txid(7);
        client
            .push_spend(
                funding_txid,
                SpendingTx {
                    txid: reveal_txid,
                    witnesses: vec![vec![
                        vec![0xde, 0xad],
                        secret.as_bytes().to_vec(),
                        vec![1],
                    ]],
                },
            )
            .await;
        let observer = BitcoinObserver::new(client, 1);

        let obs = observer.scan_for_secret(&funding_txid, &commitment).await.unwrap();
        match obs {
            SecretObservation::Revealed { secret: found, reveal_txid: rtx } => {
                assert!(secret::verify(&found, &commitment));
                assert_eq!(rtx, reveal_txid);
            }
            other => panic!("expected Revealed, got {other:?}"),
        }
        let _ = secret;
    }

    #[tokio::test]
    async fn wrong_witness_element_not_mistaken_for_preimage() {
        let (_secret, commitment) = secret::generate_secret().unwrap();
        let client = FakeChainClient::new();
        let funding_txid = txid(8);
        client
            .push_spend(
                funding_txid,
                SpendingTx {
                    txid: txid(9),
                    witnesses: vec![vec![vec![0xaa; 32]]],
                },
            )
            .await;
        let observer = BitcoinObserver::new(client, 1);

        let obs = observer.scan_for_secret(&funding_txid, &commitment).await.unwrap();
        assert_eq!(obs, SecretObservation::NotYetRevealed);
    }

    #[test]
    fn btc_to_sats_rounds_correctly() {
        assert_eq!(btc_to_sats_rounded(0.5).unwrap(), 50_000_000);
        assert_eq!(btc_to_sats_rounded(0.000_000_015).unwrap(), 2);
    }
}
