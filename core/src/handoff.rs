//! Buyer handoff payload (§6.2): the QR/deep-link payload a seller's
//! wallet or storefront hands to a buyer so their wallet can pay the BTC
//! leg of the swap. Purely a data-transfer type — rendering it as a QR
//! code or deep link is UI surface and out of scope (§1).

use crate::error::{Error, Result};
use crate::types::BtcNetwork;
use serde::{Deserialize, Serialize};

pub const HANDOFF_VERSION: &str = "1.0";

/// JSON handoff payload (§6.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffPayload {
    pub version: String,
    #[serde(rename = "hashH")]
    pub hash_h: String,
    /// Satoshis, encoded as a decimal string to avoid JSON-number
    /// precision loss on clients with a float-backed parser.
    #[serde(rename = "priceBTC")]
    pub price_sats: String,
    #[serde(rename = "receiverAddress")]
    pub receiver_address: String,
    pub deadline: u64,
    #[serde(rename = "tokenId")]
    pub token_id: String,
    #[serde(rename = "assetTitle")]
    pub asset_title: String,
    #[serde(rename = "networkBTC")]
    pub network_btc: BtcNetwork,
    #[serde(rename = "networkAsset")]
    pub network_asset: String,
}

impl HandoffPayload {
    pub fn new(
        hash_h: impl Into<String>,
        price_sats: u64,
        receiver_address: impl Into<String>,
        deadline: u64,
        token_id: u64,
        asset_title: impl Into<String>,
        network_btc: BtcNetwork,
        network_asset: impl Into<String>,
    ) -> Self {
        Self {
            version: HANDOFF_VERSION.to_string(),
            hash_h: hash_h.into(),
            price_sats: price_sats.to_string(),
            receiver_address: receiver_address.into(),
            deadline,
            token_id: token_id.to_string(),
            asset_title: asset_title.into(),
            network_btc,
            network_asset: network_asset.into(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::ParseFailure(e.to_string()))
    }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Error::ParseFailure(e.to_string()))
    }

    /// Alternative `bitcoin:` URI encoding for wallet compatibility
    /// (§6.2). Amount is expressed in whole BTC per BIP-21, derived from
    /// the satoshi price carried in this payload.
    pub fn to_bip21_uri(&self) -> Result<String> {
        let price_sats: u64 = self
            .price_sats
            .parse()
            .map_err(|_| Error::ParseFailure("priceBTC is not a valid integer".into()))?;
        let btc = price_sats as f64 / 100_000_000.0;
        let label = urlencode(&self.asset_title);
        let message = urlencode(&format!("HTLC swap {}", self.hash_h));
        Ok(format!(
            "bitcoin:{}?amount={:.8}&label={}&message={}",
            self.receiver_address, btc, label, message
        ))
    }
}

/// Minimal percent-encoding sufficient for the `label`/`message` query
/// parameters of a `bitcoin:` URI — this payload never carries
/// attacker-controlled binary data, only titles and hex strings.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
