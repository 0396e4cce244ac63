//! Application layer use cases for the operator toolkit.
//!
//! # What is the "application" layer? (for beginners)
//!
//! The application layer sits between the domain in `mnode-core` (pure
//! rules and wire formats) and the infrastructure (HTTP, files, devices).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil an operator goal (e.g. "start
//!   this masternode").
//! - **Depend on abstractions** (traits such as [`backend::BackendRpc`] and
//!   [`hardware::HardwareWallet`]) rather than concrete adapters, so the
//!   adapters can be swapped or stubbed in tests.
//! - **Contain no socket or file I/O** of their own.
//!
//! # Sub-modules
//!
//! - **`hardware`** – The signing-device capability and the gate that keeps
//!   device calls exclusive and off the async runtime's worker threads.
//! - **`backend`** – The daemon RPC capability and the readiness gate.
//! - **`resolve_paths`** – Ordered, cached, cancellable search for the
//!   derivation paths of known addresses.
//! - **`verify_collateral`** – UTXO-index check of the claimed collateral.
//! - **`sign_broadcast`** – Produces the announce and ping signatures.
//! - **`submit_broadcast`** – Decode dry-run, relay, reply interpretation.
//! - **`start_masternode`** – The full start flow, with operator advisories.
//! - **`manage_identities`** – `masternode.conf` import, key generation and
//!   path/address conversions applied back onto identities.

pub mod backend;
pub mod hardware;
pub mod manage_identities;
pub mod resolve_paths;
pub mod sign_broadcast;
pub mod start_masternode;
pub mod submit_broadcast;
pub mod verify_collateral;
