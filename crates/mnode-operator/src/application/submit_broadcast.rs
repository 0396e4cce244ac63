//! SubmitBroadcastUseCase: two-phase hand-off of a payload to the backend.
//!
//! The payload is first sent in `decode` mode, which only parses it.  A
//! payload the backend cannot decode never reaches the network.  Only then is
//! it sent in `relay` mode, and the relay summary decides success.

use std::sync::Arc;

use mnode_core::{BroadcastPayload, DashdRelaySummary, RelaySummaryParser};
use thiserror::Error;
use tracing::{debug, error, info};

use super::backend::{BackendRpc, BroadcastMode, RpcError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The backend could not parse the payload; carries its message verbatim.
    #[error("backend rejected the broadcast: {0}")]
    DecodeRejected(String),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Result of the relay phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResult {
    pub success: bool,
    /// The backend's `overall` text.
    pub overall: String,
    /// First per-key error message of a failed relay.
    pub error_message: Option<String>,
}

pub struct BroadcastSubmitter {
    backend: Arc<dyn BackendRpc>,
    summary: Box<dyn RelaySummaryParser>,
}

impl BroadcastSubmitter {
    pub fn new(backend: Arc<dyn BackendRpc>) -> Self {
        Self::with_parser(backend, Box::new(DashdRelaySummary))
    }

    pub fn with_parser(backend: Arc<dyn BackendRpc>, summary: Box<dyn RelaySummaryParser>) -> Self {
        Self { backend, summary }
    }

    pub async fn submit(&self, payload: &BroadcastPayload) -> Result<SubmitResult, SubmitError> {
        let hex = payload.to_hex();

        let decoded = self
            .backend
            .masternode_broadcast(BroadcastMode::Decode, &hex)
            .await?;
        if !decoded.is_decode_success() {
            let message = decoded
                .first_error_message()
                .map(str::to_string)
                .unwrap_or(decoded.overall);
            error!(%message, "broadcast rejected while decoding");
            return Err(SubmitError::DecodeRejected(message));
        }
        debug!(bytes = payload.len(), "broadcast decoded by backend");

        let relayed = self
            .backend
            .masternode_broadcast(BroadcastMode::Relay, &hex)
            .await?;
        let summary = self.summary.parse(&relayed.overall);
        if summary.is_success() {
            info!(relayed = summary.relayed, "broadcast relayed");
            return Ok(SubmitResult {
                success: true,
                overall: relayed.overall,
                error_message: None,
            });
        }

        let error_message = relayed.first_error_message().map(str::to_string);
        error!(
            failed = summary.failed,
            message = error_message.as_deref().unwrap_or(""),
            "broadcast relay failed"
        );
        Ok(SubmitResult {
            success: false,
            overall: relayed.overall,
            error_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::backend::MockBackendRpc;
    use mnode_core::protocol::broadcast::CollateralInput;
    use mnode_core::protocol::replies::ReplyEntry;
    use mnode_core::{build_broadcast, BroadcastReply, BroadcastRequest};
    use std::net::Ipv4Addr;

    const DECODED: &str = "Successfully decoded broadcast messages for 1 masternodes, failed to decode 0, total 1";

    fn reply(overall: &str, error_message: Option<&str>) -> BroadcastReply {
        BroadcastReply {
            overall: overall.to_string(),
            entries: vec![ReplyEntry {
                key: "a1b2".to_string(),
                error_message: error_message.map(str::to_string),
            }],
        }
    }

    fn payload() -> BroadcastPayload {
        build_broadcast(&BroadcastRequest {
            collateral: CollateralInput::from_hex(&"ab".repeat(32), 1).unwrap(),
            ip: Ipv4Addr::new(203, 0, 113, 5),
            port: 9999,
            collateral_pubkey: vec![2; 33],
            operator_pubkey: vec![4; 65],
            announce_signature: vec![0x1f; 65],
            sig_time: 1_700_000_000,
            protocol_version: 70208,
            ping_block_hash: [0x11; 32],
            ping_signature: vec![0x1b; 65],
        })
    }

    fn backend(decode: BroadcastReply, relay: Option<BroadcastReply>) -> MockBackendRpc {
        let mut backend = MockBackendRpc::new();
        backend
            .expect_masternode_broadcast()
            .withf(|mode, _| *mode == BroadcastMode::Decode)
            .times(1)
            .return_const(Ok(decode));
        match relay {
            Some(r) => {
                backend
                    .expect_masternode_broadcast()
                    .withf(|mode, _| *mode == BroadcastMode::Relay)
                    .times(1)
                    .return_const(Ok(r));
            }
            None => {
                backend
                    .expect_masternode_broadcast()
                    .withf(|mode, _| *mode == BroadcastMode::Relay)
                    .never();
            }
        }
        backend
    }

    #[tokio::test]
    async fn test_relayed_with_no_failures_is_success() {
        let relay = reply(
            "Successfully relayed broadcast messages for 1 masternodes, failed to relay 0, total 1",
            None,
        );
        let submitter =
            BroadcastSubmitter::new(Arc::new(backend(reply(DECODED, None), Some(relay))));

        let result = submitter.submit(&payload()).await.unwrap();

        assert!(result.success);
        assert_eq!(result.error_message, None);
    }

    #[tokio::test]
    async fn test_failed_relay_surfaces_per_key_message() {
        let relay = reply(
            "Successfully relayed broadcast messages for 0 masternodes, failed to relay 1, total 1",
            Some("Masternode is not in the list"),
        );
        let submitter =
            BroadcastSubmitter::new(Arc::new(backend(reply(DECODED, None), Some(relay))));

        let result = submitter.submit(&payload()).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("Masternode is not in the list"));
    }

    #[tokio::test]
    async fn test_decode_rejection_stops_before_relay() {
        let decode = reply(
            "Successfully decoded broadcast messages for 0 masternodes, failed to decode 1, total 1",
            Some("Invalid signature"),
        );
        let submitter = BroadcastSubmitter::new(Arc::new(backend(decode, None)));

        let err = submitter.submit(&payload()).await.unwrap_err();

        assert_eq!(err, SubmitError::DecodeRejected("Invalid signature".to_string()));
    }

    #[tokio::test]
    async fn test_unrecognised_relay_text_reads_as_success() {
        let submitter = BroadcastSubmitter::new(Arc::new(backend(
            reply(DECODED, None),
            Some(reply("something else entirely", None)),
        )));

        let result = submitter.submit(&payload()).await.unwrap();

        assert!(result.success);
    }

    #[tokio::test]
    async fn test_rpc_failure_propagates() {
        let mut backend = MockBackendRpc::new();
        backend
            .expect_masternode_broadcast()
            .times(1)
            .return_const(Err(RpcError::Transport("refused".to_string())));
        let submitter = BroadcastSubmitter::new(Arc::new(backend));

        let err = submitter.submit(&payload()).await.unwrap_err();

        assert!(matches!(err, SubmitError::Rpc(RpcError::Transport(_))));
    }
}
