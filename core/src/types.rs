//! Shared data-model types (§3): networks, hex helpers, swap status.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Serde module for serializing `[u8; 32]` as lowercase hex strings.
pub(crate) mod hex_bytes32 {
    use super::*;

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}

/// Bitcoin network the observer and script builder operate against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BtcNetwork {
    Bitcoin,
    Testnet,
    Regtest,
    Signet,
}

impl BtcNetwork {
    /// Convert to the `bitcoin` crate's network type.
    pub fn to_bitcoin_network(self) -> bitcoin::Network {
        match self {
            BtcNetwork::Bitcoin => bitcoin::Network::Bitcoin,
            BtcNetwork::Testnet => bitcoin::Network::Testnet,
            BtcNetwork::Regtest => bitcoin::Network::Regtest,
            BtcNetwork::Signet => bitcoin::Network::Signet,
        }
    }
}

impl std::str::FromStr for BtcNetwork {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bitcoin" | "mainnet" => Ok(BtcNetwork::Bitcoin),
            "testnet" | "testnet3" => Ok(BtcNetwork::Testnet),
            "regtest" => Ok(BtcNetwork::Regtest),
            "signet" => Ok(BtcNetwork::Signet),
            other => Err(crate::error::Error::Other(format!(
                "unknown BTC network: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for BtcNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BtcNetwork::Bitcoin => "bitcoin",
            BtcNetwork::Testnet => "testnet",
            BtcNetwork::Regtest => "regtest",
            BtcNetwork::Signet => "signet",
        };
        f.write_str(s)
    }
}

/// Status enumeration for a pending swap (§3.4).
///
/// ```text
/// waiting_btc -> btc_locked -> asset_locked -> claimed   (happy path)
/// waiting_btc -> expired                                 (no BTC ever seen)
/// asset_locked -> refunded                                (deadline, no claim)
/// ```
/// `claimed`, `refunded`, and `expired` are sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStatus {
    WaitingBtc,
    BtcLocked,
    AssetLocked,
    Claimed,
    Refunded,
    Expired,
}

impl SwapStatus {
    /// Terminal statuses never transition further (§3.4).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SwapStatus::Claimed | SwapStatus::Refunded | SwapStatus::Expired
        )
    }
}

impl std::fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SwapStatus::WaitingBtc => "waiting_btc",
            SwapStatus::BtcLocked => "btc_locked",
            SwapStatus::AssetLocked => "asset_locked",
            SwapStatus::Claimed => "claimed",
            SwapStatus::Refunded => "refunded",
            SwapStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}
