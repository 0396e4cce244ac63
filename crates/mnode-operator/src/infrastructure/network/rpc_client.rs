//! JSON-RPC over HTTP adapter for the backend daemon.
//!
//! Requests are JSON-RPC 1.0 envelopes posted with basic authentication.
//! The daemon reports RPC-level failures in the body even on HTTP 500, so
//! the body is parsed first and the status code only matters when the body
//! is not a JSON-RPC reply.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mnode_core::protocol::replies::ReplyEntry;
use mnode_core::{BroadcastReply, MasternodeEntry, Utxo};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::application::backend::{BackendRpc, BroadcastMode, NodeInfo, RpcError, SyncStatus};
use crate::infrastructure::storage::config::BackendConfig;

/// `AssetName` the daemon reports once every sync stage has completed.
const SYNC_FINISHED: &str = "MASTERNODE_SYNC_FINISHED";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: i64,
    message: String,
}

pub struct HttpRpcClient {
    http: reqwest::Client,
    url: String,
    username: String,
    password: String,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    /// Builds a client for `config`.
    ///
    /// # Errors
    ///
    /// [`RpcError::Transport`] when the HTTP client cannot be constructed.
    pub fn new(config: &BackendConfig) -> Result<Self, RpcError> {
        let scheme = if config.use_tls { "https" } else { "http" };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: format!("{scheme}://{}:{}/", config.host, config.port),
            username: config.username.clone(),
            password: config.password.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(%method, id, "rpc request");

        let response = self
            .http
            .post(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        parse_response(status, &text).map_err(|e| {
            warn!(%method, error = %e, "rpc call failed");
            e
        })
    }
}

#[async_trait]
impl BackendRpc for HttpRpcClient {
    async fn get_info(&self) -> Result<NodeInfo, RpcError> {
        parse_info(&self.call("getinfo", json!([])).await?)
    }

    async fn is_synchronized(&self) -> Result<bool, RpcError> {
        let status = self.call("mnsync", json!(["status"])).await?;
        Ok(parse_is_synced(&status))
    }

    async fn get_sync_status(&self) -> Result<SyncStatus, RpcError> {
        parse_sync_status(&self.call("mnsync", json!(["status"])).await?)
    }

    async fn get_block_count(&self) -> Result<u64, RpcError> {
        let count = self.call("getblockcount", json!([])).await?;
        count
            .as_u64()
            .ok_or_else(|| RpcError::Decode(format!("getblockcount: {count}")))
    }

    async fn get_block_hash(&self, height: u64) -> Result<String, RpcError> {
        let hash = self.call("getblockhash", json!([height])).await?;
        hash.as_str()
            .map(str::to_string)
            .ok_or_else(|| RpcError::Decode(format!("getblockhash: {hash}")))
    }

    async fn get_address_utxos(&self, address: &str) -> Result<Vec<Utxo>, RpcError> {
        let utxos = self
            .call("getaddressutxos", json!([{ "addresses": [address] }]))
            .await?;
        serde_json::from_value(utxos).map_err(|e| RpcError::Decode(format!("getaddressutxos: {e}")))
    }

    async fn get_masternode_list(
        &self,
        mode: &str,
        filter: &str,
    ) -> Result<Vec<MasternodeEntry>, RpcError> {
        parse_masternode_list(&self.call("masternode", json!(["list", mode, filter])).await?)
    }

    async fn masternode_broadcast(
        &self,
        mode: BroadcastMode,
        payload_hex: &str,
    ) -> Result<BroadcastReply, RpcError> {
        let reply = self
            .call("masternodebroadcast", json!([mode.as_str(), payload_hex]))
            .await?;
        parse_broadcast_reply(&reply)
    }
}

// ── Reply parsing ─────────────────────────────────────────────────────────────

fn parse_response(status: u16, body: &str) -> Result<Value, RpcError> {
    let envelope: Envelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(_) if !(200..300).contains(&status) => return Err(RpcError::Http { status }),
        Err(e) => return Err(RpcError::Decode(e.to_string())),
    };
    match envelope.error {
        Some(err) => Err(map_rpc_error(err.code, err.message)),
        None => Ok(envelope.result),
    }
}

/// Address-index failures get their own variant so the collateral check
/// can report them as an advisory.
fn map_rpc_error(code: i64, message: String) -> RpcError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("address index") || lower.contains("addressindex") {
        RpcError::IndexUnavailable(message)
    } else {
        RpcError::Rpc { code, message }
    }
}

fn parse_info(value: &Value) -> Result<NodeInfo, RpcError> {
    let protocol_version = value
        .get("protocolversion")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| RpcError::Decode("getinfo: missing protocolversion".to_string()))?;
    Ok(NodeInfo {
        protocol_version,
        blocks: value.get("blocks").and_then(Value::as_u64).unwrap_or_default(),
    })
}

fn parse_is_synced(value: &Value) -> bool {
    match value.get("IsSynced").and_then(Value::as_bool) {
        Some(synced) => synced,
        None => value.get("AssetName").and_then(Value::as_str) == Some(SYNC_FINISHED),
    }
}

fn parse_sync_status(value: &Value) -> Result<SyncStatus, RpcError> {
    let asset_id = value
        .get("AssetID")
        .and_then(Value::as_i64)
        .ok_or_else(|| RpcError::Decode("mnsync status: missing AssetID".to_string()))?;
    let asset_name = value
        .get("AssetName")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(SyncStatus { asset_id, asset_name })
}

fn parse_masternode_list(value: &Value) -> Result<Vec<MasternodeEntry>, RpcError> {
    let map = value
        .as_object()
        .ok_or_else(|| RpcError::Decode("masternode list: expected an object".to_string()))?;
    map.iter()
        .map(|(ident, row)| {
            let row = row
                .as_str()
                .ok_or_else(|| RpcError::Decode(format!("masternode list: {ident}")))?;
            MasternodeEntry::parse(ident, row).map_err(|e| RpcError::Decode(e.to_string()))
        })
        .collect()
}

fn parse_broadcast_reply(value: &Value) -> Result<BroadcastReply, RpcError> {
    let map = value
        .as_object()
        .ok_or_else(|| RpcError::Decode("masternodebroadcast: expected an object".to_string()))?;
    let overall = map
        .get("overall")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let entries = map
        .iter()
        .filter(|(key, _)| key.as_str() != "overall")
        .map(|(key, entry)| ReplyEntry {
            key: key.clone(),
            error_message: entry
                .get("errorMessage")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
        .collect();
    Ok(BroadcastReply { overall, entries })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
