//! # mnode-core
//!
//! Shared library for the masternode operator toolkit containing the
//! identity model, the broadcast wire format, and the signing primitives.
//!
//! It has zero dependencies on OS APIs, async runtimes, network sockets or
//! hardware drivers; everything here is deterministic and unit-testable.
//!
//! # Architecture overview (for beginners)
//!
//! A masternode is a server that provides services to a proof-of-service
//! network in exchange for rewards.  To be recognised by the network the
//! operator must periodically *announce* it: a signed message that ties the
//! server's IP address to a fixed-amount *collateral* output and to an
//! *operator key* that the server itself holds.
//!
//! This crate defines:
//!
//! - **`domain`** – The masternode identity, BIP32 derivation paths, the
//!   backend connection states and the collateral verdict types.
//!
//! - **`protocol`** – How the announcement travels to the backend: the
//!   variable-length integer encoding, the exact byte layout of the
//!   broadcast payload, and the text contracts of the backend's replies.
//!
//! - **`crypto`** – Hashes (double SHA-256, HASH160), base58check addresses,
//!   WIF private keys and compact recoverable message signatures.

pub mod crypto;
pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `mnode_core::MasternodeIdentity` instead of the full module path.
pub use crypto::keys::{Network, OperatorKey};
pub use domain::collateral::{Advisory, CollateralProof, Utxo, REQUIRED_COLLATERAL_SATOSHIS};
pub use domain::connection::ConnectionState;
pub use domain::identity::{IdentityError, MasternodeIdentity};
pub use domain::path::{Bip32Path, PathError, SearchOrder};
pub use domain::status::MasternodeEntry;
pub use protocol::broadcast::{
    build_broadcast, AnnounceContext, BroadcastPayload, BroadcastRequest, Signatures,
};
pub use protocol::replies::{BroadcastReply, DashdRelaySummary, RelaySummary, RelaySummaryParser};
