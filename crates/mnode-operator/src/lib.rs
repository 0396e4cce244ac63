//! mnode-operator library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does mnode-operator do? (for beginners)
//!
//! A masternode stays on the network's list only while its operator keeps
//! announcing it.  Starting one takes several steps that must all agree:
//!
//! 1. The backend daemon must be reachable and fully synchronized, or the
//!    chain data the announcement refers to may be stale.
//! 2. The collateral (a single output of exactly 1000 coins) must still be
//!    unspent at the configured address.
//! 3. The hardware wallet holding the collateral key signs the announcement,
//!    so that key never touches this machine.
//! 4. The operator key in the configuration signs a ping anchored a few
//!    blocks below the tip.
//! 5. The assembled payload is dry-run through the daemon's decoder and only
//!    then relayed to the network.
//!
//! Supporting tasks, such as finding which derivation path holds a
//! collateral address, `masternode.conf` import and operator key
//! generation, live alongside.

/// Application layer: use cases for the operator.
pub mod application;

/// Infrastructure layer: RPC client, storage, and hardware adapters.
pub mod infrastructure;
