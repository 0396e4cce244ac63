//! Operator keys and base58check addresses.

use std::fmt;

use secp256k1::{PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::hash::hash160;

/// Chain whose address and WIF prefixes apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    /// Version byte of pay-to-pubkey-hash addresses.
    pub fn pubkey_address_prefix(self) -> u8 {
        match self {
            Network::Mainnet => 0x4c,
            Network::Testnet => 0x8c,
        }
    }

    /// Version byte of WIF private keys.
    pub fn wif_prefix(self) -> u8 {
        match self {
            Network::Mainnet => 0xcc,
            Network::Testnet => 0xef,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("base58check decoding failed: {0}")]
    Base58(String),
    #[error("unexpected version byte 0x{found:02x} (expected 0x{expected:02x})")]
    WrongNetwork { expected: u8, found: u8 },
    #[error("unexpected payload length {0}")]
    BadLength(usize),
    #[error("invalid secret key")]
    InvalidSecret,
}

/// The masternode's operator key.
///
/// WIF keys may carry the compressed-pubkey flag.  Keys produced by the
/// daemon's own `masternode genkey` do not, so [`OperatorKey::generate`]
/// yields uncompressed keys as well.
#[derive(Clone, PartialEq, Eq)]
pub struct OperatorKey {
    secret: SecretKey,
    compressed: bool,
}

impl fmt::Debug for OperatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorKey")
            .field("compressed", &self.compressed)
            .finish_non_exhaustive()
    }
}

impl OperatorKey {
    /// Uncompressed key from raw secret bytes.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Result<Self, KeyError> {
        let secret = SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidSecret)?;
        Ok(Self {
            secret,
            compressed: false,
        })
    }

    /// A fresh random uncompressed key.
    pub fn generate() -> Self {
        let secret = SecretKey::new(&mut secp256k1::rand::thread_rng());
        Self {
            secret,
            compressed: false,
        }
    }

    pub fn with_compression(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    /// Decodes a WIF string for `network`.
    pub fn from_wif(wif: &str, network: Network) -> Result<Self, KeyError> {
        let payload = bs58::decode(wif.trim())
            .with_check(None)
            .into_vec()
            .map_err(|e| KeyError::Base58(e.to_string()))?;
        let (&version, rest) = payload
            .split_first()
            .ok_or(KeyError::BadLength(payload.len()))?;
        if version != network.wif_prefix() {
            return Err(KeyError::WrongNetwork {
                expected: network.wif_prefix(),
                found: version,
            });
        }
        let (secret_bytes, compressed) = match rest.len() {
            32 => (rest, false),
            33 if rest[32] == 0x01 => (&rest[..32], true),
            n => return Err(KeyError::BadLength(n)),
        };
        let secret = SecretKey::from_slice(secret_bytes).map_err(|_| KeyError::InvalidSecret)?;
        Ok(Self { secret, compressed })
    }

    /// Encodes the key as WIF for `network`.
    pub fn to_wif(&self, network: Network) -> String {
        let mut payload = Vec::with_capacity(34);
        payload.push(network.wif_prefix());
        payload.extend_from_slice(&self.secret.secret_bytes());
        if self.compressed {
            payload.push(0x01);
        }
        bs58::encode(payload).with_check().into_string()
    }

    pub fn public_key(&self) -> PublicKey {
        let secp = Secp256k1::signing_only();
        PublicKey::from_secret_key(&secp, &self.secret)
    }

    /// Serialized public key in the form the WIF flag selects.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        let pk = self.public_key();
        if self.compressed {
            pk.serialize().to_vec()
        } else {
            pk.serialize_uncompressed().to_vec()
        }
    }

    pub fn address(&self, network: Network) -> String {
        p2pkh_address(&self.public_key_bytes(), network)
    }
}

/// Base58check pay-to-pubkey-hash address of a serialized public key.
pub fn p2pkh_address(public_key: &[u8], network: Network) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(network.pubkey_address_prefix());
    payload.extend_from_slice(&hash160(public_key));
    bs58::encode(payload).with_check().into_string()
}

/// Key hash carried by a pay-to-pubkey-hash address.
pub fn decode_address(address: &str, network: Network) -> Result<[u8; 20], KeyError> {
    let payload = bs58::decode(address.trim())
        .with_check(None)
        .into_vec()
        .map_err(|e| KeyError::Base58(e.to_string()))?;
    if payload.len() != 21 {
        return Err(KeyError::BadLength(payload.len()));
    }
    if payload[0] != network.pubkey_address_prefix() {
        return Err(KeyError::WrongNetwork {
            expected: network.pubkey_address_prefix(),
            found: payload[0],
        });
    }
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[1..]);
    Ok(hash)
}

pub fn is_valid_address(address: &str, network: Network) -> bool {
    decode_address(address, network).is_ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
