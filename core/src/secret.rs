//! Hash/preimage primitives (C1).
//!
//! The commitment scheme is fixed to SHA-256 so the same preimage settles
//! both the Bitcoin leg (`OP_SHA256` in the HTLC script, §6.3) and the asset
//! leg (the asset HTLC module recomputes SHA-256 over the raw 32-byte
//! preimage, §4.3). Do not swap in a keyed MAC or Keccak here — it would
//! silently break cross-ledger settlement rather than fail loudly.

use crate::error::{Error, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 32-byte secret preimage `S`.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(#[serde(with = "crate::types::hex_bytes32")] [u8; 32]);

/// A 32-byte SHA-256 commitment `H = SHA-256(S)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Commitment(#[serde(with = "crate::types::hex_bytes32")] [u8; 32]);

impl Secret {
    /// Bytes of the preimage.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding without a `0x` prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex, accepting an optional `0x` prefix. Rejects anything
    /// that does not decode to exactly 32 bytes.
    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Secret(parse_32_bytes(s)?))
    }

    /// Wrap raw bytes extracted from a witness stack as a candidate
    /// preimage. Callers must still check it against a commitment with
    /// [`verify`] before trusting it.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Secret(bytes)
    }

    /// Recompute the commitment for this secret.
    pub fn commitment(&self) -> Commitment {
        Commitment(sha256(&self.0))
    }
}

impl Commitment {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Commitment(parse_32_bytes(s)?))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Commitment(bytes)
    }

    /// `true` iff `self == 0`, the sentinel the asset HTLC module rejects
    /// as `InvalidHash` (§4.3 `saleOpen` preconditions).
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the raw preimage in logs/debug output.
        write!(f, "Secret(..)")
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", self.to_hex())
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Strip an optional `0x` prefix, lowercase, and decode exactly 32 bytes of
/// hex. Rejects anything else with [`Error::MalformedHex`].
fn parse_32_bytes(s: &str) -> Result<[u8; 32]> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.len() != 64 {
        return Err(Error::MalformedHex);
    }
    let lower = s.to_lowercase();
    let bytes = hex::decode(&lower).map_err(|_| Error::MalformedHex)?;
    bytes.try_into().map_err(|_| Error::MalformedHex)
}

/// Draw 32 bytes from a cryptographically secure RNG and compute its
/// commitment. Returns `(S, H)`.
pub fn generate_secret() -> Result<(Secret, Commitment)> {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| Error::RngFailure(e.to_string()))?;
    let secret = Secret(bytes);
    let commitment = secret.commitment();
    Ok((secret, commitment))
}

/// Byte-exact equality of `SHA-256(S)` and `H`.
pub fn verify(secret: &Secret, commitment: &Commitment) -> bool {
    secret.commitment() == *commitment
}

/// Hash an arbitrary witness element and compare it to a commitment — used
/// by the Bitcoin observer when scanning spending witnesses (§4.4). Accepts
/// raw bytes rather than a [`Secret`] since witness stack elements are not
/// necessarily a valid preimage.
pub fn matches_commitment(candidate: &[u8], commitment: &Commitment) -> bool {
    candidate.len() == 32 && sha256(candidate) == *commitment.as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_and_verify_round_trip() {
        let (secret, commitment) = generate_secret().unwrap();
        assert!(verify(&secret, &commitment));
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let (_s1, h1) = generate_secret().unwrap();
        let (s2, _h2) = generate_secret().unwrap();
        assert!(!verify(&s2, &h1));
    }

    #[test]
    fn determinism_of_commitment() {
        let (secret, commitment) = generate_secret().unwrap();
        // verify(S, H) holds iff H == SHA-256(S), byte exact, every time.
        for _ in 0..5 {
            assert!(verify(&secret, &commitment));
        }
    }

    #[test]
    fn hex_normalization() {
        let (secret, _) = generate_secret().unwrap();
        let lower = secret.to_hex();
        let upper = lower.to_uppercase();
        let prefixed = format!("0x{upper}");
        assert_eq!(Secret::from_hex(&lower).unwrap(), Secret::from_hex(&prefixed).unwrap());
    }

    #[test]
    fn malformed_hex_rejected() {
        assert!(matches!(Secret::from_hex("not-hex"), Err(Error::MalformedHex)));
        assert!(matches!(Secret::from_hex("aabb"), Err(Error::MalformedHex)));
        let too_long = "aa".repeat(33);
        assert!(matches!(Secret::from_hex(&too_long), Err(Error::MalformedHex)));
    }

    #[test]
    fn commitment_zero_sentinel() {
        let zero = Commitment::from_bytes([0u8; 32]);
        assert!(zero.is_zero());
        let (_, nonzero) = generate_secret().unwrap();
        assert!(!nonzero.is_zero());
    }

    #[test]
    fn matches_commitment_checks_length() {
        let (secret, commitment) = generate_secret().unwrap();
        assert!(matches_commitment(secret.as_bytes(), &commitment));
        assert!(!matches_commitment(&secret.as_bytes()[..31], &commitment));
        let mut too_long = secret.as_bytes().to_vec();
        too_long.push(0xff);
        assert!(!matches_commitment(&too_long, &commitment));
    }
}
