//! Signed-message digests and compact recoverable signatures.
//!
//! A signed message is hashed as
//! `sha256d(varint(len(magic)) ‖ magic ‖ varint(len(msg)) ‖ msg)` and signed
//! with a recoverable ECDSA signature serialized in 65 bytes: a header byte
//! `27 + recovery id (+4 when the key is compressed)` followed by `r ‖ s`.

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1};
use thiserror::Error;

use super::hash::sha256d;
use super::keys::{p2pkh_address, Network, OperatorKey};
use crate::protocol::varint;

/// Prefix the network's wallets prepend before hashing a signed message.
pub const MESSAGE_MAGIC: &str = "DarkCoin Signed Message:\n";

/// Length of a compact recoverable signature.
pub const COMPACT_SIGNATURE_LEN: usize = 65;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("compact signature must be {COMPACT_SIGNATURE_LEN} bytes, got {0}")]
    BadLength(usize),
    #[error("invalid signature header byte {0}")]
    BadHeader(u8),
    #[error("signature is malformed or does not recover a key")]
    Unrecoverable,
}

/// Digest a signed message commits to.
pub fn signed_message_hash(message: &[u8]) -> [u8; 32] {
    let magic = MESSAGE_MAGIC.as_bytes();
    let mut data = Vec::with_capacity(magic.len() + message.len() + 10);
    varint::encode_into(magic.len() as u64, &mut data);
    data.extend_from_slice(magic);
    varint::encode_into(message.len() as u64, &mut data);
    data.extend_from_slice(message);
    sha256d(&data)
}

/// Signs `message` with the operator key, returning the 65-byte compact form.
pub fn sign_message(key: &OperatorKey, message: &[u8]) -> [u8; COMPACT_SIGNATURE_LEN] {
    let digest = Message::from_digest(signed_message_hash(message));
    let secp = Secp256k1::signing_only();
    let sig: RecoverableSignature = secp.sign_ecdsa_recoverable(&digest, key.secret());
    let (rec_id, body) = sig.serialize_compact();

    let mut out = [0u8; COMPACT_SIGNATURE_LEN];
    // Recovery ids are 0..=3.
    out[0] = 27 + rec_id.to_i32() as u8 + if key.is_compressed() { 4 } else { 0 };
    out[1..].copy_from_slice(&body);
    out
}

/// Recovers the signer's key and whether it signed as compressed.
pub fn recover_public_key(
    message: &[u8],
    signature: &[u8],
) -> Result<(PublicKey, bool), SignatureError> {
    if signature.len() != COMPACT_SIGNATURE_LEN {
        return Err(SignatureError::BadLength(signature.len()));
    }
    let header = signature[0];
    if !(27..=34).contains(&header) {
        return Err(SignatureError::BadHeader(header));
    }
    let flag = header - 27;
    let compressed = flag >= 4;
    let rec_id = RecoveryId::from_i32(i32::from(flag & 3))
        .map_err(|_| SignatureError::BadHeader(header))?;
    let sig = RecoverableSignature::from_compact(&signature[1..], rec_id)
        .map_err(|_| SignatureError::Unrecoverable)?;

    let digest = Message::from_digest(signed_message_hash(message));
    let secp = Secp256k1::verification_only();
    let pk = secp
        .recover_ecdsa(&digest, &sig)
        .map_err(|_| SignatureError::Unrecoverable)?;
    Ok((pk, compressed))
}

/// Checks that `signature` over `message` was made by the key behind
/// `address`.
pub fn verify_message(
    address: &str,
    message: &[u8],
    signature: &[u8],
    network: Network,
) -> Result<bool, SignatureError> {
    let (pk, compressed) = recover_public_key(message, signature)?;
    let serialized = if compressed {
        pk.serialize().to_vec()
    } else {
        pk.serialize_uncompressed().to_vec()
    };
    Ok(p2pkh_address(&serialized, network) == address)
}
