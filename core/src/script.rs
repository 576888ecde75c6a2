//! Bitcoin HTLC script (§6.3).
//!
//! Builds the BIP-199-style HTLC redeem script the observer (C4) watches
//! for and the funding address is derived from (P2WSH, §6.3):
//!
//! ```text
//! OP_IF
//!   OP_SHA256 <H> OP_EQUALVERIFY OP_DUP OP_HASH160 <receiverPKH>
//! OP_ELSE
//!   <T_btc> OP_CHECKLOCKTIMEVERIFY OP_DROP OP_DUP OP_HASH160 <senderPKH>
//! OP_ENDIF
//! OP_EQUALVERIFY OP_CHECKSIG
//! ```
//!
//! This module only builds the script and the funding address, and
//! assembles/parses the witness stacks for the two spending paths. It
//! does not sign or broadcast transactions — the coordinator never holds
//! the seller's or buyer's BTC keys (§1 Non-goals: "no custody of user
//! keys"); script construction here is for address derivation and for
//! recognizing claim/refund witnesses the observer (C4) scans.

use crate::error::{Error, Result};
use crate::secret::{Commitment, Secret};
use bitcoin::hashes::Hash;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::{Address, Network, PubkeyHash, ScriptBuf, Witness};

/// Build the HTLC redeem script for one swap.
///
/// `t_btc` is the Bitcoin-leg absolute locktime (unix seconds, §4.2);
/// values below `500_000_000` would be interpreted by `OP_CHECKLOCKTIMEVERIFY`
/// as a block height rather than a timestamp, so this is rejected rather
/// than silently producing a script that locks on the wrong axis.
pub fn build_htlc_script(
    commitment: &Commitment,
    receiver_pkh: &PubkeyHash,
    sender_pkh: &PubkeyHash,
    t_btc: u64,
) -> Result<ScriptBuf> {
    const LOCKTIME_THRESHOLD: u64 = 500_000_000;
    if t_btc < LOCKTIME_THRESHOLD {
        return Err(Error::Internal(format!(
            "T_btc {t_btc} is below the CLTV timestamp threshold; would lock on block height"
        )));
    }
    if t_btc > i64::MAX as u64 {
        return Err(Error::Internal("T_btc exceeds representable locktime".into()));
    }

    let hash_push = PushBytesBuf::try_from(commitment.as_bytes().to_vec())
        .map_err(|e| Error::Internal(format!("commitment push bytes: {e}")))?;

    Ok(Builder::new()
        .push_opcode(bitcoin::opcodes::all::OP_IF)
        .push_opcode(bitcoin::opcodes::all::OP_SHA256)
        .push_slice(&hash_push)
        .push_opcode(bitcoin::opcodes::all::OP_EQUALVERIFY)
        .push_opcode(bitcoin::opcodes::all::OP_DUP)
        .push_opcode(bitcoin::opcodes::all::OP_HASH160)
        .push_slice(receiver_pkh)
        .push_opcode(bitcoin::opcodes::all::OP_ELSE)
        .push_int(t_btc as i64)
        .push_opcode(bitcoin::opcodes::all::OP_CLTV)
        .push_opcode(bitcoin::opcodes::all::OP_DROP)
        .push_opcode(bitcoin::opcodes::all::OP_DUP)
        .push_opcode(bitcoin::opcodes::all::OP_HASH160)
        .push_slice(sender_pkh)
        .push_opcode(bitcoin::opcodes::all::OP_ENDIF)
        .push_opcode(bitcoin::opcodes::all::OP_EQUALVERIFY)
        .push_opcode(bitcoin::opcodes::all::OP_CHECKSIG)
        .into_script())
}

/// P2WSH funding address for a built HTLC script (§6.3 "Funded as
/// P2WSH").
pub fn funding_address(redeem_script: &ScriptBuf, network: Network) -> Address {
    Address::p2wsh(redeem_script, network)
}

/// Assemble the claim witness: `<sig> <S> <1> <redeemScript>` (§6.3).
pub fn claim_witness(signature: &[u8], secret: &Secret, redeem_script: &ScriptBuf) -> Witness {
    let mut witness = Witness::new();
    witness.push(signature);
    witness.push(secret.as_bytes());
    witness.push([1u8]);
    witness.push(redeem_script.as_bytes());
    witness
}

/// Assemble the refund witness: `<sig> <0> <redeemScript>` (§6.3).
pub fn refund_witness(signature: &[u8], redeem_script: &ScriptBuf) -> Witness {
    let mut witness = Witness::new();
    witness.push(signature);
    witness.push([]);
    witness.push(redeem_script.as_bytes());
    witness
}

/// Hash a 33-byte compressed public key into the `PubkeyHash` used by
/// the script above. Kept separate so callers that already have a
/// `bitcoin::PublicKey` can use [`bitcoin::PublicKey::pubkey_hash`]
/// directly; this is for callers holding raw bytes (e.g. decoded from
/// an address book entry).
pub fn pubkey_hash_from_bytes(pubkey_bytes: &[u8]) -> PubkeyHash {
    PubkeyHash::hash(pubkey_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::generate_secret;

    fn pkh(byte: u8) -> PubkeyHash {
        pubkey_hash_from_bytes(&[byte; 33])
    }

    #[test]
    fn builds_nonempty_script_and_p2wsh_address() {
        let (_secret, commitment) = generate_secret().unwrap();
        let script = build_htlc_script(&commitment, &pkh(1), &pkh(2), 1_700_000_000).unwrap();
        assert!(!script.is_empty());
        let addr = funding_address(&script, Network::Testnet);
        assert!(addr.to_string().starts_with("tb1"));
    }

    #[test]
    fn rejects_locktime_below_timestamp_threshold() {
        let (_secret, commitment) = generate_secret().unwrap();
        let err = build_htlc_script(&commitment, &pkh(1), &pkh(2), 500_000).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn claim_and_refund_witnesses_take_opposite_branches() {
        let (secret, commitment) = generate_secret().unwrap();
        let script = build_htlc_script(&commitment, &pkh(1), &pkh(2), 1_700_000_000).unwrap();
        let sig = vec![0xAB; 71];

        let claim = claim_witness(&sig, &secret, &script);
        assert_eq!(claim.len(), 4);
        assert_eq!(claim.nth(2).unwrap(), [1u8]);

        let refund = refund_witness(&sig, &script);
        assert_eq!(refund.len(), 3);
        assert_eq!(refund.nth(1).unwrap(), &[] as &[u8]);
    }
}
