//! Domain entities for the masternode operator toolkit.
//!
//! This module contains pure business rules with no infrastructure
//! dependencies.  Code in outer layers (application, infrastructure, CLI)
//! depends on these types, but the domain never depends on them.

/// Masternode identity, validation and `masternode.conf` import.
pub mod identity;

/// BIP32 derivation paths and the ordered collateral search space.
pub mod path;

/// Backend connection states.
pub mod connection;

/// Collateral verdicts and operator advisories.
pub mod collateral;

/// Backend masternode-list entries.
pub mod status;
