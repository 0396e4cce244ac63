//! Network infrastructure: the backend daemon's JSON-RPC interface.
//!
//! # Sub-modules
//!
//! - **`rpc_client`** – `HttpRpcClient`, the reqwest-based implementation of
//!   `BackendRpc`.  Maps RPC error bodies onto `RpcError`, singling out a
//!   missing address index.
//!
//! - **`connection_manager`** – The connection/sync state machine.  Checks
//!   the backend, monitors synchronization every 5 seconds, and serves as the
//!   `ConnectionGate` for every backend-dependent action.

pub mod connection_manager;
pub mod rpc_client;
