//! Hashes, keys, addresses and message signatures.

/// Double SHA-256 and HASH160.
pub mod hash;

/// WIF operator keys, network prefixes and base58check addresses.
pub mod keys;

/// Signed-message digests and compact recoverable signatures.
pub mod message;
