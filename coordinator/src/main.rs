//! Swap coordinator daemon (§6.4).
//!
//! Wires the Bitcoin observer, the asset-ledger actuator, and the C6
//! actor together against a concrete chain client, then serves the
//! admin surface over stdin until told to shut down. Exit code `0` on a
//! clean shutdown, `1` on an unrecoverable startup error (§6.4).

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use swap_coordinator_core::actuator::AssetLedgerActuator;
use swap_coordinator_core::asset_ledger::memory::InMemoryAssetLedger;
use swap_coordinator_core::bitcoin_observer::{BitcoinObserver, BtcChainClient, FundingCandidate, SpendingTx};
use swap_coordinator_core::clock::SystemClock;
use swap_coordinator_core::coordinator::actor::CoordinatorConfig;
use swap_coordinator_core::coordinator::handle::SwapCoordinatorHandle;
use swap_coordinator_core::coordinator::swap::RegisterSwapRequest;
use swap_coordinator_core::coordinator::CoordinatorEvent;
use swap_coordinator_core::error::Result;
use swap_coordinator_core::secret::Commitment;
use swap_coordinator_core::Config;

/// Placeholder chain client until a real Electrum/Esplora/bitcoind
/// adapter is wired in. Reports nothing, which keeps every registered
/// swap parked in `waiting_btc` rather than silently fabricating
/// payment activity.
struct NullChainClient;

#[async_trait::async_trait]
impl BtcChainClient for NullChainClient {
    async fn funding_candidates(&self, _address: &str) -> Result<Vec<FundingCandidate>> {
        Ok(Vec::new())
    }

    async fn confirmations(&self, _txid: &bitcoin::Txid) -> Result<Option<u64>> {
        Ok(None)
    }

    async fn spending_tx(&self, _txid: &bitcoin::Txid) -> Result<Option<SpendingTx>> {
        Ok(None)
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run().await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            log::error!("fatal: {e}");
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<()> {
    let config = Config::load()?;
    log::info!("swap coordinator starting up");

    let clock = Arc::new(SystemClock);
    let ledger = Arc::new(InMemoryAssetLedger::new(clock.clone()));
    let actuator = Arc::new(AssetLedgerActuator::with_defaults(ledger));
    let observer = Arc::new(BitcoinObserver::new(NullChainClient, config.min_confirmations));
    let coordinator_config = CoordinatorConfig::from(&config);

    let (handle, events) = SwapCoordinatorHandle::spawn(actuator, observer, clock, coordinator_config);
    tokio::spawn(log_events(events));

    let admin = tokio::task::spawn_blocking(move || run_admin_console(handle));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("received shutdown signal, exiting");
        }
        res = admin => {
            if let Err(e) = res {
                log::warn!("admin console task ended unexpectedly: {e}");
            }
        }
    }

    Ok(())
}

async fn log_events(mut events: tokio::sync::mpsc::Receiver<CoordinatorEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            CoordinatorEvent::StatusChanged { hash_h, token_id, status } => {
                log::info!("swap {hash_h} (token {token_id}) -> {status}");
            }
            CoordinatorEvent::Alert(alert) => {
                log::warn!("operator alert: {alert:?}");
            }
        }
    }
}

/// Minimal line-oriented admin surface (§6.4): `register`, `stats`,
/// `list`, `force-claim`, `force-refund`, `quit`. A production
/// deployment would expose this as an RPC/HTTP API instead; stdin is
/// enough to exercise the coordinator by hand or from a test harness.
///
/// Runs on a blocking-pool thread (via `spawn_blocking`) since
/// `std::io::Stdin::lock().lines()` blocks the calling thread for the
/// whole process lifetime; a bare `tokio::spawn` would tie up a
/// worker thread that the runtime needs for everything else. Each
/// command hops back onto the runtime with `Handle::block_on`.
fn run_admin_console(handle: SwapCoordinatorHandle) {
    let rt = tokio::runtime::Handle::current();
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["stats"] => match rt.block_on(handle.stats()) {
                Ok(stats) => println!("{}", serde_json::to_string_pretty(&stats).unwrap_or_default()),
                Err(e) => eprintln!("error: {e}"),
            },
            ["list"] => {
                let swaps = rt.block_on(handle.list_swaps());
                println!("{}", serde_json::to_string_pretty(&swaps).unwrap_or_default());
            }
            ["get", hash_h] => match Commitment::from_hex(hash_h) {
                Ok(h) => match rt.block_on(handle.get_swap(&h)) {
                    Some(swap) => println!("{}", serde_json::to_string_pretty(&swap).unwrap_or_default()),
                    None => println!("no such swap"),
                },
                Err(e) => eprintln!("error: {e}"),
            },
            ["force-claim", token_id, secret_hex] => {
                let token_id: u64 = match token_id.parse() {
                    Ok(t) => t,
                    Err(_) => {
                        eprintln!("error: invalid token id");
                        continue;
                    }
                };
                let secret = match swap_coordinator_core::secret::Secret::from_hex(secret_hex) {
                    Ok(s) => s,
                    Err(e) => {
                        eprintln!("error: {e}");
                        continue;
                    }
                };
                if let Err(e) = rt.block_on(handle.force_claim(token_id, secret)) {
                    eprintln!("error: {e}");
                } else {
                    println!("ok");
                }
            }
            ["force-refund", token_id] => {
                let token_id: u64 = match token_id.parse() {
                    Ok(t) => t,
                    Err(_) => {
                        eprintln!("error: invalid token id");
                        continue;
                    }
                };
                if let Err(e) = rt.block_on(handle.force_refund(token_id)) {
                    eprintln!("error: {e}");
                } else {
                    println!("ok");
                }
            }
            ["register", json] => match serde_json::from_str::<RegisterSwapRequest>(json) {
                Ok(req) => match rt.block_on(handle.register_swap(req)) {
                    Ok(()) => println!("ok"),
                    Err(e) => eprintln!("error: {e}"),
                },
                Err(e) => eprintln!("error: malformed register payload: {e}"),
            },
            ["quit"] | ["exit"] => {
                log::info!("admin console requested shutdown");
                break;
            }
            _ => {
                eprintln!(
                    "commands: stats | list | get <hashH> | register <json> | force-claim <tokenId> <secretHex> | force-refund <tokenId> | quit"
                );
            }
        }
        let _ = io::stdout().flush();
    }
}
