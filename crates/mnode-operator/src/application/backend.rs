//! The backend daemon's RPC surface and the readiness gate in front of it.

use async_trait::async_trait;
use mnode_core::{BroadcastReply, MasternodeEntry, Utxo};
use thiserror::Error;

/// Errors returned by backend RPC adapters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("backend returned HTTP {status}")]
    Http { status: u16 },
    #[error("backend error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// The daemon runs without the address index (`-addressindex`).
    #[error("address index unavailable: {0}")]
    IndexUnavailable(String),
    #[error("unexpected backend reply: {0}")]
    Decode(String),
}

/// Subset of `getinfo` the toolkit uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub protocol_version: u32,
    pub blocks: u64,
}

/// `mnsync status` progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub asset_id: i64,
    pub asset_name: String,
}

/// Mode argument of `masternodebroadcast`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastMode {
    /// Dry run: the daemon only parses and validates the payload.
    Decode,
    Relay,
}

impl BroadcastMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BroadcastMode::Decode => "decode",
            BroadcastMode::Relay => "relay",
        }
    }
}

/// Request/response capability of a running backend daemon.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackendRpc: Send + Sync {
    async fn get_info(&self) -> Result<NodeInfo, RpcError>;

    async fn is_synchronized(&self) -> Result<bool, RpcError>;

    async fn get_sync_status(&self) -> Result<SyncStatus, RpcError>;

    async fn get_block_count(&self) -> Result<u64, RpcError>;

    async fn get_block_hash(&self, height: u64) -> Result<String, RpcError>;

    /// Unspent outputs of `address`.  Fails with
    /// [`RpcError::IndexUnavailable`] when the daemon has no address index.
    async fn get_address_utxos(&self, address: &str) -> Result<Vec<Utxo>, RpcError>;

    /// `masternode list <mode> <filter>`.
    async fn get_masternode_list(
        &self,
        mode: &str,
        filter: &str,
    ) -> Result<Vec<MasternodeEntry>, RpcError>;

    async fn masternode_broadcast(
        &self,
        mode: BroadcastMode,
        payload_hex: &str,
    ) -> Result<BroadcastReply, RpcError>;
}

/// Why gated actions are currently unavailable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("backend connection is not configured")]
    NotConfigured,
    #[error("backend is still synchronizing; wait until it has finished")]
    Syncing,
    #[error("backend connection failed: {0}")]
    Failed(String),
}

/// Decides whether backend-dependent actions may run right now.
#[async_trait]
pub trait ConnectionGate: Send + Sync {
    /// Checks the connection if needed and succeeds only when the backend is
    /// connected and synchronized.
    async fn ensure_ready(&self) -> Result<(), GateError>;
}
