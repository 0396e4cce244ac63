//! Infrastructure layer for the operator toolkit.
//!
//! Contains the adapters behind the application layer's traits: HTTP
//! JSON-RPC to the backend, file persistence, and hardware wallet support.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `mnode_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`network`** – `HttpRpcClient` and the `ConnectionManager` that tracks
//!   whether the backend is reachable and fully synchronized.
//!
//! - **`storage`** – The TOML configuration file and the per-partition JSON
//!   derivation cache.
//!
//! - **`hardware`** – The channel-based PIN/passphrase prompt and the seeded
//!   software wallet used in tests.

pub mod hardware;
pub mod network;
pub mod storage;
