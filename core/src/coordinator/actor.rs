//! The swap coordinator's single logical actor (C6, §5): one inbox, one
//! message loop, no cross-swap locks — every message names its swap by
//! `hashH` so state transitions for different swaps never contend.
//!
//! The Bitcoin observer and the asset-ledger actuator are not run from
//! inside this loop. The observer is driven by [`run_observer_loop`], a
//! separate cooperative task that only ever *reads* the shared swap map
//! and posts messages back here. Actuator submissions (`openEscrow`,
//! `claim`, `refund`) go through the same treatment: a handler spawns
//! the retrying submission onto its own worker task and returns
//! immediately, and the worker posts a `*Result` message back into this
//! inbox once it settles (§5). No handler ever awaits a retry loop
//! inline, so a slow or backed-off actuator call never blocks the next
//! message — for this swap or any other — from being pulled off the
//! inbox.

use super::swap::{PendingSwap, RegisterSwapRequest};
use super::{CoordinatorEvent, CoordinatorStats, OperatorAlert};
use crate::actuator::AssetLedgerActuator;
use crate::asset_ledger::TokenId;
use crate::bitcoin_observer::{BitcoinObserver, BtcChainClient, FundingObservation, SecretObservation};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::retry::retry_with_backoff;
use crate::secret::{Commitment, Secret};
use crate::types::SwapStatus;
use bitcoin::Txid;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Soft limit on inbox depth before the observer loop is told to skip
/// non-essential polls, i.e. secret re-scans (§5 backpressure).
pub const INBOX_SOFT_LIMIT: usize = 1024;

/// How often the eviction sweep (§3.3, §4.4) runs.
pub const EVICTION_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Messages the actor's inbox accepts (§5).
pub enum CoordinatorMessage {
    Register {
        req: RegisterSwapRequest,
        reply: oneshot::Sender<Result<()>>,
    },
    BtcSeen {
        hash_h: Commitment,
        btc_txid: Txid,
        overpaid_sats: u64,
        dust_warning: bool,
    },
    BtcConfirmed {
        hash_h: Commitment,
    },
    BtcReorged {
        hash_h: Commitment,
    },
    SecretObserved {
        hash_h: Commitment,
        secret: Secret,
        reveal_txid: Txid,
    },
    DeadlineReached {
        hash_h: Commitment,
    },
    /// Posted by a worker task spawned from [`SwapCoordinatorActor::handle_btc_confirmed`]
    /// once its `openEscrow` submission (with retries) settles.
    EscrowOpenResult {
        hash_h: Commitment,
        result: Result<()>,
    },
    /// Posted by a worker task spawned from [`SwapCoordinatorActor::attempt_claim`]
    /// once its `claim` submission (with retries) settles.
    ClaimResult {
        hash_h: Commitment,
        secret: Secret,
        result: Result<()>,
    },
    /// Posted by a worker task spawned from [`SwapCoordinatorActor::refund_on_deadline`]
    /// once its `refund` submission (with retries) settles.
    RefundResult {
        hash_h: Commitment,
        result: Result<()>,
    },
    ForceClaim {
        token_id: TokenId,
        secret: Secret,
        reply: oneshot::Sender<Result<()>>,
    },
    ForceRefund {
        token_id: TokenId,
        reply: oneshot::Sender<Result<()>>,
    },
    EvictionSweep,
    Stats(oneshot::Sender<CoordinatorStats>),
}

/// State shared between the actor and its [`super::handle::SwapCoordinatorHandle`].
/// Only the actor mutates `swaps` (§5); the handle only reads it.
pub struct SharedState {
    pub(crate) swaps: RwLock<HashMap<Commitment, PendingSwap>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            swaps: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

/// Tunables that would otherwise be scattered across §4.6/§6.5, collected
/// for the actor's constructor.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub min_confirmations: u64,
    pub buffer_secs: u64,
    pub head_start_secs: u64,
    pub max_retries: u32,
    pub auto_claim: bool,
    pub poll_interval: Duration,
    pub retirement_age_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            min_confirmations: 1,
            buffer_secs: 2 * 3600,
            head_start_secs: 2 * 3600,
            max_retries: crate::retry::DEFAULT_MAX_RETRIES,
            auto_claim: true,
            poll_interval: Duration::from_secs(crate::bitcoin_observer::DEFAULT_POLL_INTERVAL_SECS),
            retirement_age_secs: 24 * 3600,
        }
    }
}

impl From<&crate::config::Config> for CoordinatorConfig {
    fn from(cfg: &crate::config::Config) -> Self {
        Self {
            min_confirmations: cfg.min_confirmations,
            buffer_secs: cfg.buffer_seconds(),
            head_start_secs: cfg.coordinator_head_start_seconds,
            max_retries: cfg.max_retries,
            auto_claim: cfg.auto_claim,
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
            retirement_age_secs: 24 * 3600,
        }
    }
}

/// The coordinator actor (C6). Generic over the chain client so tests
/// can drive it with a fake and production wires in a real RPC client.
pub struct SwapCoordinatorActor<C: BtcChainClient> {
    shared: Arc<SharedState>,
    actuator: Arc<AssetLedgerActuator>,
    observer: Arc<BitcoinObserver<C>>,
    clock: Arc<dyn Clock>,
    events: mpsc::Sender<CoordinatorEvent>,
    self_sender: mpsc::Sender<CoordinatorMessage>,
    inbox: mpsc::Receiver<CoordinatorMessage>,
    config: CoordinatorConfig,
    timers: Arc<Mutex<HashMap<Commitment, JoinHandle<()>>>>,
}

impl<C: BtcChainClient + 'static> SwapCoordinatorActor<C> {
    pub fn new(
        shared: Arc<SharedState>,
        actuator: Arc<AssetLedgerActuator>,
        observer: Arc<BitcoinObserver<C>>,
        clock: Arc<dyn Clock>,
        config: CoordinatorConfig,
        events: mpsc::Sender<CoordinatorEvent>,
    ) -> (Self, mpsc::Sender<CoordinatorMessage>) {
        let (tx, rx) = mpsc::channel(4096);
        let actor = Self {
            shared,
            actuator,
            observer,
            clock,
            events,
            self_sender: tx.clone(),
            inbox: rx,
            config,
            timers: Arc::new(Mutex::new(HashMap::new())),
        };
        (actor, tx)
    }

    pub fn observer(&self) -> Arc<BitcoinObserver<C>> {
        self.observer.clone()
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    /// Drains the inbox until every sender has been dropped (shutdown).
    pub async fn run(mut self) {
        while let Some(msg) = self.inbox.recv().await {
            self.handle_message(msg).await;
        }
        log::info!("swap coordinator inbox closed, actor exiting");
    }

    async fn handle_message(&self, msg: CoordinatorMessage) {
        match msg {
            CoordinatorMessage::Register { req, reply } => {
                let result = self.handle_register(req).await;
                let _ = reply.send(result);
            }
            CoordinatorMessage::BtcSeen {
                hash_h,
                btc_txid,
                overpaid_sats,
                dust_warning,
            } => self.handle_btc_seen(hash_h, btc_txid, overpaid_sats, dust_warning).await,
            CoordinatorMessage::BtcConfirmed { hash_h } => self.handle_btc_confirmed(hash_h).await,
            CoordinatorMessage::BtcReorged { hash_h } => self.handle_btc_reorged(hash_h).await,
            CoordinatorMessage::SecretObserved {
                hash_h,
                secret,
                reveal_txid,
            } => self.handle_secret_observed(hash_h, secret, reveal_txid).await,
            CoordinatorMessage::DeadlineReached { hash_h } => self.handle_deadline_reached(hash_h).await,
            CoordinatorMessage::EscrowOpenResult { hash_h, result } => {
                self.handle_escrow_open_result(hash_h, result).await
            }
            CoordinatorMessage::ClaimResult { hash_h, secret, result } => {
                self.handle_claim_result(hash_h, secret, result).await
            }
            CoordinatorMessage::RefundResult { hash_h, result } => self.handle_refund_result(hash_h, result).await,
            CoordinatorMessage::ForceClaim {
                token_id,
                secret,
                reply,
            } => {
                let result = self.handle_force_claim(token_id, secret).await;
                let _ = reply.send(result);
            }
            CoordinatorMessage::ForceRefund { token_id, reply } => {
                let result = self.handle_force_refund(token_id).await;
                let _ = reply.send(result);
            }
            CoordinatorMessage::EvictionSweep => self.handle_eviction_sweep().await,
            CoordinatorMessage::Stats(reply) => {
                let _ = reply.send(self.compute_stats().await);
            }
        }
    }

    async fn schedule_deadline_timer(&self, hash_h: Commitment, fire_at: u64) {
        let now = self.clock.now();
        let delay = Duration::from_secs(fire_at.saturating_sub(now));
        let sender = self.self_sender.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sender.send(CoordinatorMessage::DeadlineReached { hash_h }).await;
        });
        self.timers.lock().await.insert(hash_h, handle);
    }

    async fn cancel_timer(&self, hash_h: &Commitment) {
        if let Some(handle) = self.timers.lock().await.remove(hash_h) {
            handle.abort();
        }
    }

    async fn find_hash_by_token(&self, token_id: TokenId) -> Option<Commitment> {
        self.shared
            .swaps
            .read()
            .await
            .values()
            .find(|s| s.token_id == token_id)
            .map(|s| s.hash_h)
    }

    async fn emit(&self, event: CoordinatorEvent) {
        let _ = self.events.send(event).await;
    }

    async fn handle_register(&self, req: RegisterSwapRequest) -> Result<()> {
        let now = self.clock.now();
        let hash_h = req.hash_h;
        let token_id = req.token_id;
        let deadline = req.deadline_t_asset;
        {
            let mut swaps = self.shared.swaps.write().await;
            if swaps.contains_key(&hash_h) {
                return Err(Error::DuplicateHash(hash_h.to_string()));
            }
            swaps.insert(hash_h, PendingSwap::new(req, now));
        }

        let fire_at = deadline.saturating_sub(self.config.head_start_secs);
        self.schedule_deadline_timer(hash_h, fire_at).await;
        self.emit(CoordinatorEvent::StatusChanged {
            hash_h,
            token_id,
            status: SwapStatus::WaitingBtc,
        })
        .await;
        Ok(())
    }

    async fn handle_btc_seen(&self, hash_h: Commitment, btc_txid: Txid, overpaid_sats: u64, dust_warning: bool) {
        let now = self.clock.now();
        let token_id = {
            let mut swaps = self.shared.swaps.write().await;
            let swap = match swaps.get_mut(&hash_h) {
                Some(s) => s,
                None => return,
            };
            if swap.status != SwapStatus::WaitingBtc {
                return; // idempotent: already seen, or past this stage
            }
            if let Err(e) = swap.mark_btc_seen(btc_txid, now) {
                log::warn!("btc_seen rejected for swap {hash_h}: {e}");
                return;
            }
            swap.token_id
        };

        if dust_warning {
            log::warn!("swap {hash_h}: funding below dust-limit threshold");
        }
        if overpaid_sats > 0 {
            log::info!("swap {hash_h}: overpaid by {overpaid_sats} sats");
        }
        self.emit(CoordinatorEvent::StatusChanged {
            hash_h,
            token_id,
            status: SwapStatus::BtcLocked,
        })
        .await;
    }

    async fn handle_btc_reorged(&self, hash_h: Commitment) {
        let now = self.clock.now();
        let mut swaps = self.shared.swaps.write().await;
        let swap = match swaps.get_mut(&hash_h) {
            Some(s) => s,
            None => return,
        };
        match swap.status {
            SwapStatus::BtcLocked => {
                let _ = swap.mark_reorged_to_waiting(now);
                let token_id = swap.token_id;
                drop(swaps);
                self.emit(CoordinatorEvent::StatusChanged {
                    hash_h,
                    token_id,
                    status: SwapStatus::WaitingBtc,
                })
                .await;
            }
            SwapStatus::AssetLocked => {
                let token_id = swap.token_id;
                drop(swaps);
                log::warn!("swap {hash_h}: BTC funding disappeared after asset_locked, no auto-refund");
                self.emit(CoordinatorEvent::Alert(OperatorAlert::FundingDisappearedAfterAssetLocked {
                    hash_h,
                    token_id,
                }))
                .await;
            }
            _ => {}
        }
    }

    async fn handle_btc_confirmed(&self, hash_h: Commitment) {
        let now = self.clock.now();
        let (token_id, seller, buyer, t_asset_adjusted, price_sats) = {
            let swaps = self.shared.swaps.read().await;
            match swaps.get(&hash_h) {
                Some(swap) if swap.status == SwapStatus::BtcLocked => (
                    swap.token_id,
                    swap.seller_asset_addr.clone(),
                    swap.buyer_asset_addr.clone(),
                    swap.t_asset_adjusted(self.config.head_start_secs),
                    swap.price_sats,
                ),
                _ => return,
            }
        };

        if t_asset_adjusted <= now {
            log::info!("swap {hash_h}: adjusted asset expiry already past, expiry will handle it");
            return;
        }

        let actuator = self.actuator.clone();
        let max_retries = self.config.max_retries;
        let sender = self.self_sender.clone();
        tokio::spawn(async move {
            let result = retry_with_backoff(max_retries, move || {
                let actuator = actuator.clone();
                let seller = seller.clone();
                let buyer = buyer.clone();
                async move {
                    actuator
                        .open_escrow(seller, token_id, buyer, hash_h, t_asset_adjusted, price_sats)
                        .await
                }
            })
            .await;
            let _ = sender
                .send(CoordinatorMessage::EscrowOpenResult {
                    hash_h,
                    result: result.map(|_escrow| ()),
                })
                .await;
        });
    }

    async fn handle_escrow_open_result(&self, hash_h: Commitment, result: Result<()>) {
        match result {
            Ok(()) => {
                let (token_id, already_revealed) = {
                    let mut swaps = self.shared.swaps.write().await;
                    let swap = match swaps.get_mut(&hash_h) {
                        Some(s) => s,
                        None => return,
                    };
                    if swap.mark_asset_locked(self.clock.now()).is_err() {
                        return;
                    }
                    (swap.token_id, swap.secret_s)
                };
                self.emit(CoordinatorEvent::StatusChanged {
                    hash_h,
                    token_id,
                    status: SwapStatus::AssetLocked,
                })
                .await;
                // A secret observed while the swap was still `btc_locked`
                // (§4.4) couldn't be claimed yet; replay it now that the
                // asset leg is open (§4.6 ordering guarantee).
                if let Some(secret) = already_revealed {
                    self.attempt_claim(hash_h, secret).await;
                }
            }
            Err(e) => {
                log::warn!("swap {hash_h}: openEscrow failed after retries, will retry on next confirmation: {e}");
            }
        }
    }

    /// Secret extraction (§4.4) can observe the preimage while a swap is
    /// still only `btc_locked` (confirmations pending, asset leg not yet
    /// opened). The ordering guarantee (§4.6) only requires deferring
    /// past `waiting_btc`; a reveal seen at `btc_locked` is recorded but
    /// not acted on until `btc_confirmed` opens the asset leg, at which
    /// point [`Self::handle_btc_confirmed`] replays it through the same
    /// claim path below.
    async fn handle_secret_observed(&self, hash_h: Commitment, secret: Secret, reveal_txid: Txid) {
        let claim_now = {
            let mut swaps = self.shared.swaps.write().await;
            let swap = match swaps.get_mut(&hash_h) {
                Some(s) => s,
                None => return,
            };
            match swap.status {
                SwapStatus::WaitingBtc => return, // ordering guarantee (§4.6)
                SwapStatus::BtcLocked => {
                    swap.record_reveal(secret, reveal_txid);
                    log::info!("swap {hash_h}: secret observed before asset leg opened, deferring claim");
                    false
                }
                SwapStatus::AssetLocked => {
                    swap.record_reveal(secret, reveal_txid);
                    true
                }
                _ => return,
            }
        };

        if claim_now {
            self.attempt_claim(hash_h, secret).await;
        }
    }

    /// Submits `claim(tokenId, S)` via the actuator (with the standard
    /// retry policy) and advances the swap to `claimed` on success.
    /// Shared by the direct `secret_observed` path and the replay that
    /// runs when a secret captured during `btc_locked` is only now
    /// claimable because the asset leg just opened.
    async fn attempt_claim(&self, hash_h: Commitment, secret: Secret) {
        let (token_id, buyer) = {
            let swaps = self.shared.swaps.read().await;
            match swaps.get(&hash_h) {
                Some(swap) if swap.status == SwapStatus::AssetLocked => {
                    (swap.token_id, swap.buyer_asset_addr.clone())
                }
                _ => return,
            }
        };

        if !self.config.auto_claim {
            log::info!("swap {hash_h}: secret observed, auto_claim disabled, awaiting forceClaim");
            return;
        }

        let actuator = self.actuator.clone();
        let max_retries = self.config.max_retries;
        let sender = self.self_sender.clone();
        tokio::spawn(async move {
            let result = retry_with_backoff(max_retries, move || {
                let actuator = actuator.clone();
                let buyer = buyer.clone();
                async move { actuator.claim(buyer, token_id, secret).await }
            })
            .await;
            let _ = sender
                .send(CoordinatorMessage::ClaimResult {
                    hash_h,
                    secret,
                    result: result.map(|_settled_to| ()),
                })
                .await;
        });
    }

    async fn handle_claim_result(&self, hash_h: Commitment, secret: Secret, result: Result<()>) {
        match result {
            Ok(()) => {
                let token_id = {
                    let mut swaps = self.shared.swaps.write().await;
                    let swap = match swaps.get_mut(&hash_h) {
                        Some(s) => s,
                        None => return,
                    };
                    if swap.mark_claimed(secret, self.clock.now()).is_err() {
                        return;
                    }
                    swap.token_id
                };
                self.cancel_timer(&hash_h).await;
                self.emit(CoordinatorEvent::StatusChanged {
                    hash_h,
                    token_id,
                    status: SwapStatus::Claimed,
                })
                .await;
            }
            Err(e) => {
                log::warn!("swap {hash_h}: claim failed after retries, operator may forceClaim: {e}");
            }
        }
    }

    async fn handle_deadline_reached(&self, hash_h: Commitment) {
        let snapshot = { self.shared.swaps.read().await.get(&hash_h).cloned() };
        let swap = match snapshot {
            Some(s) if !s.status.is_terminal() => s,
            _ => return,
        };

        match swap.status {
            SwapStatus::WaitingBtc => {
                self.finish_as_expired(hash_h, swap.token_id).await;
            }
            SwapStatus::BtcLocked | SwapStatus::AssetLocked => {
                match self.actuator.is_in_escrow(swap.token_id).await {
                    Ok(true) => self.refund_on_deadline(hash_h, swap.token_id, swap.seller_asset_addr).await,
                    Ok(false) => {
                        // Buyer won the race with the deadline; not an error (§4.6 step 5).
                        self.finish_as_expired(hash_h, swap.token_id).await;
                    }
                    Err(e) => log::warn!("swap {hash_h}: isInEscrow check failed: {e}"),
                }
            }
            _ => {}
        }
    }

    async fn finish_as_expired(&self, hash_h: Commitment, token_id: TokenId) {
        let mut swaps = self.shared.swaps.write().await;
        if let Some(swap) = swaps.get_mut(&hash_h) {
            if swap.mark_expired(self.clock.now()).is_err() {
                return;
            }
        }
        drop(swaps);
        self.emit(CoordinatorEvent::StatusChanged {
            hash_h,
            token_id,
            status: SwapStatus::Expired,
        })
        .await;
    }

    async fn refund_on_deadline(
        &self,
        hash_h: Commitment,
        token_id: TokenId,
        seller: crate::asset_ledger::AssetAddress,
    ) {
        let actuator = self.actuator.clone();
        let max_retries = self.config.max_retries;
        let sender = self.self_sender.clone();
        tokio::spawn(async move {
            let result = retry_with_backoff(max_retries, move || {
                let actuator = actuator.clone();
                let seller = seller.clone();
                async move { actuator.refund(seller, token_id).await }
            })
            .await;
            let _ = sender
                .send(CoordinatorMessage::RefundResult {
                    hash_h,
                    result: result.map(|_reverted_to| ()),
                })
                .await;
        });
    }

    async fn handle_refund_result(&self, hash_h: Commitment, result: Result<()>) {
        match result {
            Ok(()) => {
                let token_id = {
                    let mut swaps = self.shared.swaps.write().await;
                    let swap = match swaps.get_mut(&hash_h) {
                        Some(s) => s,
                        None => return,
                    };
                    if swap.mark_refunded(self.clock.now()).is_err() {
                        return;
                    }
                    swap.token_id
                };
                self.emit(CoordinatorEvent::StatusChanged {
                    hash_h,
                    token_id,
                    status: SwapStatus::Refunded,
                })
                .await;
            }
            Err(e) => {
                log::warn!("swap {hash_h}: refund failed after retries, operator may forceRefund: {e}");
            }
        }
    }

    async fn handle_force_claim(&self, token_id: TokenId, secret: Secret) -> Result<()> {
        let hash_h = self
            .find_hash_by_token(token_id)
            .await
            .ok_or(Error::NoSuchToken(token_id))?;
        let buyer = {
            let swaps = self.shared.swaps.read().await;
            swaps
                .get(&hash_h)
                .ok_or(Error::NoSuchToken(token_id))?
                .buyer_asset_addr
                .clone()
        };

        self.actuator.claim(buyer, token_id, secret).await?;

        let mut swaps = self.shared.swaps.write().await;
        if let Some(swap) = swaps.get_mut(&hash_h) {
            let _ = swap.mark_claimed(secret, self.clock.now());
        }
        drop(swaps);
        self.cancel_timer(&hash_h).await;
        self.emit(CoordinatorEvent::StatusChanged {
            hash_h,
            token_id,
            status: SwapStatus::Claimed,
        })
        .await;
        Ok(())
    }

    async fn handle_force_refund(&self, token_id: TokenId) -> Result<()> {
        let hash_h = self
            .find_hash_by_token(token_id)
            .await
            .ok_or(Error::NoSuchToken(token_id))?;
        let seller = {
            let swaps = self.shared.swaps.read().await;
            swaps
                .get(&hash_h)
                .ok_or(Error::NoSuchToken(token_id))?
                .seller_asset_addr
                .clone()
        };

        self.actuator.refund(seller, token_id).await?;

        let mut swaps = self.shared.swaps.write().await;
        if let Some(swap) = swaps.get_mut(&hash_h) {
            let _ = swap.mark_refunded(self.clock.now());
        }
        drop(swaps);
        self.cancel_timer(&hash_h).await;
        self.emit(CoordinatorEvent::StatusChanged {
            hash_h,
            token_id,
            status: SwapStatus::Refunded,
        })
        .await;
        Ok(())
    }

    async fn handle_eviction_sweep(&self) {
        let now = self.clock.now();
        let cutoff = self.config.retirement_age_secs;
        let mut swaps = self.shared.swaps.write().await;
        let to_evict: Vec<Commitment> = swaps
            .iter()
            .filter(|(_, s)| s.status.is_terminal() && now.saturating_sub(s.updated_at) >= cutoff)
            .map(|(h, _)| h.clone())
            .collect();
        for hash_h in &to_evict {
            if let Some(swap) = swaps.remove(hash_h) {
                if let Some(txid) = swap.btc_txid {
                    self.observer.evict_processed(&txid).await;
                }
            }
        }
        drop(swaps);
        for hash_h in &to_evict {
            self.cancel_timer(hash_h).await;
        }
        if !to_evict.is_empty() {
            log::debug!("evicted {} retired swap(s)", to_evict.len());
        }
    }

    async fn compute_stats(&self) -> CoordinatorStats {
        let now = self.clock.now();
        let swaps = self.shared.swaps.read().await;
        let mut by_status: BTreeMap<SwapStatus, usize> = BTreeMap::new();
        let mut oldest_pending_age_secs: Option<u64> = None;
        for swap in swaps.values() {
            *by_status.entry(swap.status).or_insert(0) += 1;
            if !swap.status.is_terminal() {
                let age = now.saturating_sub(swap.created_at);
                oldest_pending_age_secs = Some(oldest_pending_age_secs.map_or(age, |m| m.max(age)));
            }
        }
        CoordinatorStats {
            total: swaps.len(),
            by_status,
            oldest_pending_age_secs,
        }
    }
}

/// Drives the Bitcoin observer (C4) as the separate cooperative task §5
/// describes: reads the shared swap map, polls or scans as appropriate
/// per swap, and posts whatever it finds back into the actor's inbox.
/// Never mutates `shared` directly.
pub async fn run_observer_loop<C: BtcChainClient + 'static>(
    shared: Arc<SharedState>,
    observer: Arc<BitcoinObserver<C>>,
    sender: mpsc::Sender<CoordinatorMessage>,
    poll_interval: Duration,
) {
    loop {
        tokio::time::sleep(poll_interval).await;

        let snapshot: Vec<PendingSwap> = {
            let swaps = shared.swaps.read().await;
            swaps.values().filter(|s| !s.status.is_terminal()).cloned().collect()
        };

        let backlog = sender.max_capacity().saturating_sub(sender.capacity());
        let backlogged = backlog >= INBOX_SOFT_LIMIT;

        for swap in snapshot {
            if matches!(swap.status, SwapStatus::WaitingBtc | SwapStatus::BtcLocked) {
                match observer
                    .poll_funding(&swap.seller_btc_addr, swap.price_sats, swap.btc_txid)
                    .await
                {
                    Ok(FundingObservation::Funded {
                        txid,
                        confirmations,
                        overpaid_sats,
                        dust_warning,
                        ..
                    }) => {
                        if swap.btc_txid.is_none() {
                            let _ = sender
                                .send(CoordinatorMessage::BtcSeen {
                                    hash_h: swap.hash_h,
                                    btc_txid: txid,
                                    overpaid_sats,
                                    dust_warning,
                                })
                                .await;
                        } else if swap.status == SwapStatus::BtcLocked
                            && observer.has_enough_confirmations(confirmations)
                        {
                            let _ = sender
                                .send(CoordinatorMessage::BtcConfirmed { hash_h: swap.hash_h })
                                .await;
                        }
                    }
                    Ok(FundingObservation::Reorged) => {
                        let _ = sender
                            .send(CoordinatorMessage::BtcReorged { hash_h: swap.hash_h })
                            .await;
                    }
                    Ok(FundingObservation::NotYetSeen) => {}
                    Err(e) => log::warn!("swap {}: funding poll failed: {e}", swap.hash_h),
                }
            }

            // Secret extraction (§4.4) runs for both `btc_locked` and
            // `asset_locked` swaps, not only once the asset leg is open —
            // a seller can reveal the preimage on Bitcoin before the
            // confirmation threshold that opens the asset escrow is met.
            let scans_for_secret = matches!(swap.status, SwapStatus::BtcLocked | SwapStatus::AssetLocked);
            if scans_for_secret && !backlogged {
                if let Some(txid) = swap.btc_txid {
                    match observer.scan_for_secret(&txid, &swap.hash_h).await {
                        Ok(SecretObservation::Revealed { secret, reveal_txid }) => {
                            let _ = sender
                                .send(CoordinatorMessage::SecretObserved {
                                    hash_h: swap.hash_h,
                                    secret,
                                    reveal_txid,
                                })
                                .await;
                        }
                        Ok(SecretObservation::NotYetRevealed) => {}
                        Err(e) => log::warn!("swap {}: secret scan failed: {e}", swap.hash_h),
                    }
                }
            }
        }
    }
}

/// Periodically posts [`CoordinatorMessage::EvictionSweep`] (§3.3, §4.4).
pub async fn run_eviction_ticker(sender: mpsc::Sender<CoordinatorMessage>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if sender.send(CoordinatorMessage::EvictionSweep).await.is_err() {
            return;
        }
    }
}
