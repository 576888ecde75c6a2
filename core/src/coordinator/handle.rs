//! Handle to a running [`super::actor::SwapCoordinatorActor`] (§6.4).
//!
//! Simple reads (`get_swap`, `list_swaps`) go straight to [`SharedState`]
//! without a round trip through the actor, since they cannot race with
//! anything the actor itself needs to serialize on. Everything else —
//! registration, forced operations, stats — is sent as a message so it
//! is processed on the actor's single task, in arrival order.

use super::actor::{CoordinatorConfig, CoordinatorMessage, SharedState, SwapCoordinatorActor};
use super::swap::{PendingSwap, RegisterSwapRequest};
use super::{CoordinatorEvent, CoordinatorStats};
use crate::actuator::AssetLedgerActuator;
use crate::asset_ledger::TokenId;
use crate::bitcoin_observer::BtcChainClient;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::secret::{Commitment, Secret};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// A running coordinator. Cloning shares the same underlying actor.
#[derive(Clone)]
pub struct SwapCoordinatorHandle {
    shared: Arc<SharedState>,
    sender: mpsc::Sender<CoordinatorMessage>,
}

impl SwapCoordinatorHandle {
    /// Spawns the actor's message loop, the Bitcoin observer poll loop,
    /// and the eviction ticker as background tasks, and returns a handle
    /// to talk to the running coordinator plus the event stream it
    /// publishes on.
    pub fn spawn<C: BtcChainClient + 'static>(
        actuator: Arc<AssetLedgerActuator>,
        observer: Arc<crate::bitcoin_observer::BitcoinObserver<C>>,
        clock: Arc<dyn Clock>,
        config: CoordinatorConfig,
    ) -> (Self, mpsc::Receiver<CoordinatorEvent>) {
        let shared = Arc::new(SharedState::new());
        let (events_tx, events_rx) = mpsc::channel(1024);
        let poll_interval = config.poll_interval;

        let (actor, sender) = SwapCoordinatorActor::new(
            shared.clone(),
            actuator,
            observer.clone(),
            clock,
            config,
            events_tx,
        );

        tokio::spawn(actor.run());
        tokio::spawn(super::actor::run_observer_loop(
            shared.clone(),
            observer,
            sender.clone(),
            poll_interval,
        ));
        tokio::spawn(super::actor::run_eviction_ticker(
            sender.clone(),
            super::actor::EVICTION_SWEEP_INTERVAL,
        ));

        (Self { shared, sender }, events_rx)
    }

    /// `register(swap)` (§4.6 step 1, §6.4).
    pub async fn register_swap(&self, req: RegisterSwapRequest) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(CoordinatorMessage::Register { req, reply })
            .await
            .map_err(|_| Error::Internal("coordinator actor is no longer running".into()))?;
        rx.await
            .map_err(|_| Error::Internal("coordinator actor dropped the reply channel".into()))?
    }

    /// `getSwap(hashH)` (§6.4). Reads [`SharedState`] directly.
    pub async fn get_swap(&self, hash_h: &Commitment) -> Option<PendingSwap> {
        self.shared.swaps.read().await.get(hash_h).cloned()
    }

    /// `listSwaps([filter])` (§6.4).
    pub async fn list_swaps(&self) -> Vec<PendingSwap> {
        self.shared.swaps.read().await.values().cloned().collect()
    }

    /// `forceClaim(tokenId, S)` (§4.6 "Forced operations", §6.4).
    pub async fn force_claim(&self, token_id: TokenId, secret: Secret) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(CoordinatorMessage::ForceClaim {
                token_id,
                secret,
                reply,
            })
            .await
            .map_err(|_| Error::Internal("coordinator actor is no longer running".into()))?;
        rx.await
            .map_err(|_| Error::Internal("coordinator actor dropped the reply channel".into()))?
    }

    /// `forceRefund(tokenId)` (§4.6 "Forced operations", §6.4).
    pub async fn force_refund(&self, token_id: TokenId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(CoordinatorMessage::ForceRefund { token_id, reply })
            .await
            .map_err(|_| Error::Internal("coordinator actor is no longer running".into()))?;
        rx.await
            .map_err(|_| Error::Internal("coordinator actor dropped the reply channel".into()))?
    }

    /// `stats()` (§6.4). Round-trips through the actor so the snapshot is
    /// computed against the actor's own view of "now".
    pub async fn stats(&self) -> Result<CoordinatorStats> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(CoordinatorMessage::Stats(reply))
            .await
            .map_err(|_| Error::Internal("coordinator actor is no longer running".into()))?;
        rx.await
            .map_err(|_| Error::Internal("coordinator actor dropped the reply channel".into()))
    }

    /// Triggers an out-of-band eviction sweep, normally only run on
    /// [`super::actor::EVICTION_SWEEP_INTERVAL`]'s ticker. Exposed for
    /// admin tooling and tests.
    pub async fn trigger_eviction_sweep(&self) -> Result<()> {
        self.sender
            .send(CoordinatorMessage::EvictionSweep)
            .await
            .map_err(|_| Error::Internal("coordinator actor is no longer running".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_ledger::memory::InMemoryAssetLedger;
    use crate::asset_ledger::{AssetAddress, TokenMetadata};
    use crate::bitcoin_observer::{BitcoinObserver, FundingCandidate, SpendingTx};
    use crate::clock::TestClock;
    use crate::secret::generate_secret;
    use crate::types::SwapStatus;
    use async_trait::async_trait;
    use bitcoin::Txid;
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::time::Duration;
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

        async fn fund(&self, address: &str, candidate: FundingCandidate) {
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

        async fn reveal(&self, funding_txid: Txid, spend: SpendingTx) {
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
        Txid::from_str(&hex::encode([byte; 32])).unwrap()
    }

    fn addr(s: &str) -> AssetAddress {
        AssetAddress(s.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_end_to_end() {
        let clock = Arc::new(TestClock::new(1_000_000));
        let ledger = Arc::new(InMemoryAssetLedger::new(clock.clone()));
        let seller = addr("seller");
        let buyer = addr("buyer");
        ledger
            .mint(seller.clone(), 1, TokenMetadata::new("widget", "", "", "", "").unwrap())
            .await
            .unwrap();
        let actuator = Arc::new(AssetLedgerActuator::with_defaults(ledger.clone()));

        let chain = FakeChainClient::new();
        let (secret, hash_h) = generate_secret().unwrap();
        let funding_txid = txid(1);
        chain
            .fund(
                "seller-btc-addr",
                FundingCandidate {
                    txid: funding_txid,
                    total_sats: 50_000_000,
                    confirmations: 1,
                },
            )
            .await;
        chain
            .reveal(
                funding_txid,
                SpendingTx {
                    txid: txid(2),
                    witnesses: vec![vec![secret.as_bytes().to_vec()]],
                },
            )
            .await;
        let observer = Arc::new(BitcoinObserver::new(chain, 1));

        let config = CoordinatorConfig {
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let (handle, mut events) =
            SwapCoordinatorHandle::spawn(actuator, observer, clock.clone(), config);

        handle
            .register_swap(RegisterSwapRequest {
                hash_h,
                token_id: 1,
                price_sats: 50_000_000,
                seller_btc_addr: "seller-btc-addr".into(),
                seller_asset_addr: seller.clone(),
                buyer_asset_addr: buyer.clone(),
                deadline_t_asset: clock.now() + 100_000,
            })
            .await
            .unwrap();

        let mut saw_claimed = false;
        for _ in 0..20 {
            tokio::time::advance(Duration::from_millis(50)).await;
            tokio::task::yield_now().await;
            if let Ok(Some(CoordinatorEvent::StatusChanged {
                status: SwapStatus::Claimed,
                ..
            })) = tokio::time::timeout(Duration::from_millis(1), events.recv()).await
            {
                saw_claimed = true;
                break;
            }
        }
        assert!(saw_claimed, "expected the swap to reach claimed");

        let swap = handle.get_swap(&hash_h).await.unwrap();
        assert_eq!(swap.status, SwapStatus::Claimed);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_registration_rejected() {
        let clock = Arc::new(TestClock::new(1_000_000));
        let ledger = Arc::new(InMemoryAssetLedger::new(clock.clone()));
        let seller = addr("seller");
        ledger
            .mint(seller.clone(), 1, TokenMetadata::new("widget", "", "", "", "").unwrap())
            .await
            .unwrap();
        let actuator = Arc::new(AssetLedgerActuator::with_defaults(ledger));
        let observer = Arc::new(BitcoinObserver::new(FakeChainClient::new(), 1));
        let (handle, _events) =
            SwapCoordinatorHandle::spawn(actuator, observer, clock.clone(), CoordinatorConfig::default());

        let (_secret, hash_h) = generate_secret().unwrap();
        let req = RegisterSwapRequest {
            hash_h,
            token_id: 1,
            price_sats: 1_000,
            seller_btc_addr: "addr".into(),
            seller_asset_addr: seller.clone(),
            buyer_asset_addr: addr("buyer"),
            deadline_t_asset: clock.now() + 10_000,
        };
        handle.register_swap(req.clone()).await.unwrap();
        let err = handle.register_swap(req).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateHash(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn stats_reflects_registered_swap() {
        let clock = Arc::new(TestClock::new(1_000_000));
        let ledger = Arc::new(InMemoryAssetLedger::new(clock.clone()));
        let seller = addr("seller");
        ledger
            .mint(seller.clone(), 1, TokenMetadata::new("widget", "", "", "", "").unwrap())
            .await
            .unwrap();
        let actuator = Arc::new(AssetLedgerActuator::with_defaults(ledger));
        let observer = Arc::new(BitcoinObserver::new(FakeChainClient::new(), 1));
        let (handle, _events) =
            SwapCoordinatorHandle::spawn(actuator, observer, clock.clone(), CoordinatorConfig::default());

        let (_secret, hash_h) = generate_secret().unwrap();
        handle
            .register_swap(RegisterSwapRequest {
                hash_h,
                token_id: 1,
                price_sats: 1_000,
                seller_btc_addr: "addr".into(),
                seller_asset_addr: seller,
                buyer_asset_addr: addr("buyer"),
                deadline_t_asset: clock.now() + 10_000,
            })
            .await
            .unwrap();

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.by_status.get(&SwapStatus::WaitingBtc), Some(&1));
    }
}
