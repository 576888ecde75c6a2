//! Cross-ledger HTLC swap coordinator — core library
//!
//! Platform-agnostic coordination logic for atomic swaps between a
//! Bitcoin UTXO HTLC and an abstract smart-asset ledger HTLC. This
//! crate holds no process lifecycle, no CLI, and no concrete RPC
//! clients — those live in the `coordinator` binary crate. Everything
//! here is built against traits (`BtcChainClient`, `AssetLedgerClient`)
//! so it can be driven by fakes in tests and by real chain/ledger
//! clients in production.
//!
//! # Example
//!
//! ```rust,ignore
//! use swap_coordinator_core::asset_ledger::memory::InMemoryAssetLedger;
//! use swap_coordinator_core::secret::generate_secret;
//!
//! let ledger = InMemoryAssetLedger::with_system_clock();
//! let (secret, commitment) = generate_secret()?;
//! ```

pub mod actuator;
pub mod asset_ledger;
pub mod bitcoin_observer;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event_normalizer;
pub mod handoff;
pub mod retry;
pub mod script;
pub mod secret;
pub mod timelock;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::{BtcNetwork, SwapStatus};
