//! StartMasternodeUseCase: the whole start flow for one identity.
//!
//! 1. The connection gate must report a ready backend.
//! 2. The network's masternode list is consulted; a running entry is an
//!    advisory.
//! 3. The collateral is checked against the address index; findings are
//!    advisories.
//! 4. The ping is anchored to the block 12 below the tip.
//! 5. Both signatures are produced and the payload built.
//! 6. After a last confirmation the payload is submitted.
//!
//! Advisories go to [`OperatorConfirm`]; a declined advisory ends the flow
//! with [`StartOutcome::Aborted`], which is not an error.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use mnode_core::protocol::broadcast::BuildError;
use mnode_core::{
    build_broadcast, Advisory, AnnounceContext, BroadcastPayload, BroadcastRequest, IdentityError,
    MasternodeIdentity, Network,
};
use thiserror::Error;
use tracing::{error, info, warn};

use super::backend::{BackendRpc, ConnectionGate, GateError, RpcError};
use super::hardware::DeviceGate;
use super::sign_broadcast::{SignOutcome, SignedBroadcast, SigningCoordinator, SigningError};
use super::submit_broadcast::{BroadcastSubmitter, SubmitError, SubmitResult};
use super::verify_collateral::{CollateralCheck, CollateralVerifier};

/// Blocks between the tip and the block the ping refers to.
pub const PING_BLOCK_DEPTH: u64 = 12;

/// Operator decisions the flow cannot make on its own.
#[async_trait]
pub trait OperatorConfirm: Send + Sync {
    /// `true` to continue despite `advisory`.
    async fn confirm_advisory(&self, identity: &MasternodeIdentity, advisory: &Advisory) -> bool;

    /// Last chance to stop before the payload is relayed.
    async fn confirm_broadcast(&self, identity: &MasternodeIdentity, payload: &BroadcastPayload)
        -> bool;
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    /// The backend decoded the payload but did not relay it.
    #[error("broadcast was not relayed: {0}")]
    RelayFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartReport {
    pub result: SubmitResult,
    /// Collateral address the device confirmed; callers persist it when the
    /// identity had none configured.
    pub collateral_address: String,
    pub ping_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started(StartReport),
    /// The operator declined an advisory or the final confirmation.
    Aborted,
    /// The operator cancelled on the device.
    Cancelled,
}

type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

pub struct StartMasternode {
    network: Network,
    gate: Arc<dyn ConnectionGate>,
    backend: Arc<dyn BackendRpc>,
    verifier: CollateralVerifier,
    signer: SigningCoordinator,
    submitter: BroadcastSubmitter,
    confirm: Arc<dyn OperatorConfirm>,
    clock: Clock,
}

impl StartMasternode {
    pub fn new(
        network: Network,
        gate: Arc<dyn ConnectionGate>,
        backend: Arc<dyn BackendRpc>,
        device: DeviceGate,
        confirm: Arc<dyn OperatorConfirm>,
    ) -> Self {
        Self {
            network,
            gate,
            verifier: CollateralVerifier::new(Arc::clone(&backend)),
            submitter: BroadcastSubmitter::new(Arc::clone(&backend)),
            signer: SigningCoordinator::new(device, network),
            backend,
            confirm,
            clock: Box::new(unix_now),
        }
    }

    /// Replaces the system clock used for the signature time.
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub async fn start(
        &self,
        identity: &MasternodeIdentity,
    ) -> Result<StartOutcome, BroadcastError> {
        self.gate.ensure_ready().await?;
        identity.validate_for_broadcast(self.network)?;

        if let Some(advisory) = self.running_status(identity).await {
            if !self.confirm.confirm_advisory(identity, &advisory).await {
                return Ok(StartOutcome::Aborted);
            }
        }

        let configured = identity.collateral_address.trim();
        if !configured.is_empty() && !self.collateral_confirmed(identity, configured).await {
            return Ok(StartOutcome::Aborted);
        }

        let context = self.anchor().await?;
        let signed: SignedBroadcast = match self.signer.sign(identity, &context).await? {
            SignOutcome::Signed(signed) => signed,
            SignOutcome::Cancelled => return Ok(StartOutcome::Cancelled),
        };

        if configured.is_empty()
            && !self.collateral_confirmed(identity, &signed.collateral_address).await
        {
            return Ok(StartOutcome::Aborted);
        }

        let request = BroadcastRequest::from_identity(
            identity,
            &context,
            signed.collateral_pubkey,
            signed.operator_pubkey,
            signed.signatures,
        )?;
        let payload = build_broadcast(&request);

        if !self.confirm.confirm_broadcast(identity, &payload).await {
            return Ok(StartOutcome::Aborted);
        }

        let result = self.submitter.submit(&payload).await.map_err(|e| {
            error!(name = %identity.name, error = %e, "broadcast rejected");
            e
        })?;
        if !result.success {
            let message = result
                .error_message
                .clone()
                .unwrap_or_else(|| result.overall.clone());
            error!(name = %identity.name, %message, "broadcast rejected");
            return Err(BroadcastError::RelayFailed(message));
        }

        info!(name = %identity.name, height = context.block_height, "masternode broadcast relayed");
        Ok(StartOutcome::Started(StartReport {
            result,
            collateral_address: signed.collateral_address,
            ping_height: context.block_height,
        }))
    }

    /// An advisory when the network already lists the collateral as running.
    async fn running_status(&self, identity: &MasternodeIdentity) -> Option<Advisory> {
        let outpoint = identity.collateral_outpoint();
        match self.backend.get_masternode_list("full", &outpoint).await {
            Ok(entries) => entries
                .into_iter()
                .find(|e| e.is_active())
                .map(|e| Advisory::AlreadyActive { status: e.status }),
            Err(e) => {
                warn!(%outpoint, error = %e, "masternode status unavailable");
                None
            }
        }
    }

    /// `false` when a collateral finding was put to the operator and declined.
    async fn collateral_confirmed(&self, identity: &MasternodeIdentity, address: &str) -> bool {
        let advisory = match self
            .verifier
            .verify(address, &identity.collateral_txid, identity.collateral_index)
            .await
        {
            Ok(CollateralCheck::Verified(proof)) => proof.advisory(address),
            Ok(CollateralCheck::IndexUnavailable(reason)) => {
                Some(Advisory::IndexUnavailable { reason })
            }
            Err(e) => Some(Advisory::VerificationFailed {
                reason: e.to_string(),
            }),
        };
        match advisory {
            Some(advisory) => self.confirm.confirm_advisory(identity, &advisory).await,
            None => true,
        }
    }

    async fn anchor(&self) -> Result<AnnounceContext, RpcError> {
        let tip = self.backend.get_block_count().await?;
        let block_height = tip.saturating_sub(PING_BLOCK_DEPTH);
        let block_hash = self.backend.get_block_hash(block_height).await?;
        let info = self.backend.get_info().await?;
        Ok(AnnounceContext {
            block_height,
            block_hash,
            sig_time: (self.clock)(),
            protocol_version: info.protocol_version,
        })
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::backend::{BroadcastMode, MockBackendRpc, NodeInfo};
    use crate::infrastructure::hardware::mock::SeededWallet;
    use mnode_core::protocol::replies::ReplyEntry;
    use mnode_core::{
        Bip32Path, BroadcastReply, MasternodeEntry, OperatorKey, Utxo, REQUIRED_COLLATERAL_SATOSHIS,
    };
    use std::sync::Mutex;

    const TXID: &str = "abcdabcdabcdabcdabcdabcdabcdabcdabcdabcdabcdabcdabcdabcdabcdabcd";
    const BLOCK: &str = "000000000000001111111111111111111111111111111111111111111111111f";

    struct ReadyGate(Result<(), GateError>);

    #[async_trait]
    impl ConnectionGate for ReadyGate {
        async fn ensure_ready(&self) -> Result<(), GateError> {
            self.0.clone()
        }
    }

    /// Answers every advisory with `answer` and records what it was shown.
    struct ScriptedConfirm {
        answer: bool,
        shown: Mutex<Vec<Advisory>>,
    }

    impl ScriptedConfirm {
        fn new(answer: bool) -> Arc<Self> {
            Arc::new(Self {
                answer,
                shown: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl OperatorConfirm for ScriptedConfirm {
        async fn confirm_advisory(&self, _: &MasternodeIdentity, advisory: &Advisory) -> bool {
            self.shown.lock().unwrap().push(advisory.clone());
            self.answer
        }
        async fn confirm_broadcast(&self, _: &MasternodeIdentity, _: &BroadcastPayload) -> bool {
            true
        }
    }

    fn identity(address: String) -> MasternodeIdentity {
        let operator = OperatorKey::from_secret_bytes([5; 32]).unwrap();
        MasternodeIdentity {
            name: "MN1".into(),
            ip: "203.0.113.5".into(),
            port: 9999,
            operator_key: operator.to_wif(Network::Mainnet),
            collateral_address: address,
            collateral_path: "44'/5'/0'/0/3".into(),
            collateral_txid: TXID.into(),
            collateral_index: 1,
        }
    }

    fn reply(overall: &str) -> BroadcastReply {
        BroadcastReply {
            overall: overall.to_string(),
            entries: vec![ReplyEntry {
                key: "k".into(),
                error_message: None,
            }],
        }
    }

    fn chain_backend(utxo_satoshis: u64, status: &str) -> MockBackendRpc {
        let mut backend = MockBackendRpc::new();
        let entries = if status.is_empty() {
            vec![]
        } else {
            vec![MasternodeEntry::parse(
                &format!("{TXID}-1"),
                &format!("{status} 70208 Xpayee 1700000000 100 0 0 203.0.113.5:9999"),
            )
            .unwrap()]
        };
        backend.expect_get_masternode_list().return_const(Ok(entries));
        backend.expect_get_address_utxos().return_const(Ok(vec![Utxo {
            txid: TXID.into(),
            output_index: 1,
            satoshis: utxo_satoshis,
        }]));
        backend.expect_get_block_count().return_const(Ok(1012u64));
        backend
            .expect_get_block_hash()
            .withf(|h| *h == 1000)
            .return_const(Ok(BLOCK.to_string()));
        backend.expect_get_info().return_const(Ok(NodeInfo {
            protocol_version: 70208,
            blocks: 1012,
        }));
        backend
            .expect_masternode_broadcast()
            .withf(|m, _| *m == BroadcastMode::Decode)
            .return_const(Ok(reply(
                "Successfully decoded broadcast messages for 1 masternodes, failed to decode 0, total 1",
            )));
        backend
            .expect_masternode_broadcast()
            .withf(|m, _| *m == BroadcastMode::Relay)
            .return_const(Ok(reply(
                "Successfully relayed broadcast messages for 1 masternodes, failed to relay 0, total 1",
            )));
        backend
    }

    fn use_case(
        backend: MockBackendRpc,
        confirm: Arc<ScriptedConfirm>,
    ) -> (StartMasternode, String) {
        let wallet = SeededWallet::new([8; 32], Network::Mainnet);
        let address = wallet.address_for(&"44'/5'/0'/0/3".parse::<Bip32Path>().unwrap());
        let start = StartMasternode::new(
            Network::Mainnet,
            Arc::new(ReadyGate(Ok(()))),
            Arc::new(backend),
            DeviceGate::new(Box::new(wallet)),
            confirm,
        )
        .with_clock(|| 1_700_000_000);
        (start, address)
    }

    #[tokio::test]
    async fn test_clean_start_relays_without_advisories() {
        let confirm = ScriptedConfirm::new(true);
        let (start, address) = use_case(
            chain_backend(REQUIRED_COLLATERAL_SATOSHIS, ""),
            Arc::clone(&confirm),
        );

        let outcome = start.start(&identity(address.clone())).await.unwrap();

        let StartOutcome::Started(report) = outcome else {
            panic!("expected a started masternode");
        };
        assert!(report.result.success);
        assert_eq!(report.collateral_address, address);
        assert_eq!(report.ping_height, 1000);
        assert!(confirm.shown.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_running_masternode_asks_before_restart() {
        let confirm = ScriptedConfirm::new(false);
        let (start, address) = use_case(
            chain_backend(REQUIRED_COLLATERAL_SATOSHIS, "ENABLED"),
            Arc::clone(&confirm),
        );

        let outcome = start.start(&identity(address)).await.unwrap();

        assert_eq!(outcome, StartOutcome::Aborted);
        assert_eq!(
            confirm.shown.lock().unwrap().as_slice(),
            &[Advisory::AlreadyActive {
                status: "ENABLED".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_amount_mismatch_is_advisory_and_may_be_accepted() {
        let confirm = ScriptedConfirm::new(true);
        let (start, address) = use_case(chain_backend(42, ""), Arc::clone(&confirm));

        let outcome = start.start(&identity(address)).await.unwrap();

        assert!(matches!(outcome, StartOutcome::Started(_)));
        assert_eq!(
            confirm.shown.lock().unwrap().as_slice(),
            &[Advisory::AmountMismatch { actual: 42 }]
        );
    }

    #[tokio::test]
    async fn test_empty_address_is_verified_after_device_confirms_it() {
        let confirm = ScriptedConfirm::new(true);
        let (start, address) = use_case(
            chain_backend(REQUIRED_COLLATERAL_SATOSHIS, ""),
            Arc::clone(&confirm),
        );

        let outcome = start.start(&identity(String::new())).await.unwrap();

        assert!(matches!(outcome, StartOutcome::Started(r) if r.collateral_address == address));
    }

    #[tokio::test]
    async fn test_gate_failure_stops_before_any_rpc() {
        let start = StartMasternode::new(
            Network::Mainnet,
            Arc::new(ReadyGate(Err(GateError::Syncing))),
            Arc::new(MockBackendRpc::new()),
            DeviceGate::new(Box::new(SeededWallet::new([8; 32], Network::Mainnet))),
            ScriptedConfirm::new(true),
        );

        let err = start.start(&identity(String::new())).await.unwrap_err();

        assert!(matches!(err, BroadcastError::Gate(GateError::Syncing)));
    }
}
