//! Configuration (§6.5).
//!
//! Layered the way the teacher loads its own runtime settings: defaults
//! baked into the struct, overridden by environment variables via the
//! `config` crate. Loading a `.env` file (via `dotenvy`) into the process
//! environment before calling [`Config::load`] is the binary crate's job,
//! not this library's — this module only ever reads `std::env`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

fn default_min_confirmations() -> u64 {
    1
}

fn default_buffer_hours() -> u64 {
    2
}

fn default_poll_interval_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    5
}

fn default_auto_claim() -> bool {
    true
}

fn default_head_start_seconds() -> u64 {
    2 * 3600
}

/// All fields from §6.5, plus `COORDINATOR_HEAD_START_SECONDS` (Open
/// Question 1 — kept independent of `HTLC_TIMEOUT_BUFFER_HOURS`; see
/// `DESIGN.md`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub btc_api_url: String,
    pub btc_ws_url: Option<String>,
    pub asset_rpc_url: String,
    pub asset_contract_address: String,
    pub coordinator_private_key: String,

    #[serde(default = "default_min_confirmations")]
    pub min_confirmations: u64,
    #[serde(default = "default_buffer_hours")]
    pub htlc_timeout_buffer_hours: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_auto_claim")]
    pub auto_claim: bool,
    #[serde(default = "default_head_start_seconds")]
    pub coordinator_head_start_seconds: u64,
}

impl Config {
    /// Load from the process environment, falling through to the
    /// defaults above for anything unset. Required fields with no
    /// default (`BTC_API_URL`, `ASSET_RPC_URL`, `ASSET_CONTRACT_ADDRESS`,
    /// `COORDINATOR_PRIVATE_KEY`) surface a [`Error::Config`] if missing.
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("min_confirmations", default_min_confirmations() as i64)?
            .set_default("htlc_timeout_buffer_hours", default_buffer_hours() as i64)?
            .set_default("poll_interval_ms", default_poll_interval_ms() as i64)?
            .set_default("max_retries", default_max_retries() as i64)?
            .set_default("auto_claim", default_auto_claim())?
            .set_default(
                "coordinator_head_start_seconds",
                default_head_start_seconds() as i64,
            )?
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        settings.try_deserialize().map_err(Error::from)
    }

    pub fn buffer_seconds(&self) -> u64 {
        self.htlc_timeout_buffer_hours * 3600
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // `std::env` is process-global; serialize tests that touch it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_applied_when_only_required_fields_set() {
        let _guard = ENV_LOCK.lock().unwrap();
        for (k, v) in [
            ("BTC_API_URL", "https://example.invalid"),
            ("ASSET_RPC_URL", "https://example.invalid"),
            ("ASSET_CONTRACT_ADDRESS", "0xabc"),
            ("COORDINATOR_PRIVATE_KEY", "deadbeef"),
        ] {
            std::env::set_var(k, v);
        }
        for k in [
            "MIN_CONFIRMATIONS",
            "HTLC_TIMEOUT_BUFFER_HOURS",
            "POLL_INTERVAL_MS",
            "MAX_RETRIES",
            "AUTO_CLAIM",
            "COORDINATOR_HEAD_START_SECONDS",
            "BTC_WS_URL",
        ] {
            std::env::remove_var(k);
        }

        let cfg = Config::load().unwrap();
        assert_eq!(cfg.min_confirmations, 1);
        assert_eq!(cfg.htlc_timeout_buffer_hours, 2);
        assert_eq!(cfg.poll_interval_ms, 30_000);
        assert_eq!(cfg.max_retries, 5);
        assert!(cfg.auto_claim);
        assert_eq!(cfg.coordinator_head_start_seconds, 7200);
        assert_eq!(cfg.buffer_seconds(), 7200);

        for k in [
            "BTC_API_URL",
            "ASSET_RPC_URL",
            "ASSET_CONTRACT_ADDRESS",
            "COORDINATOR_PRIVATE_KEY",
        ] {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        for k in [
            "BTC_API_URL",
            "ASSET_RPC_URL",
            "ASSET_CONTRACT_ADDRESS",
            "COORDINATOR_PRIVATE_KEY",
        ] {
            std::env::remove_var(k);
        }
        assert!(Config::load().is_err());
    }
}
