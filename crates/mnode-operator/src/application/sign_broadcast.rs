//! SignBroadcastUseCase: produces the two signatures of a broadcast.
//!
//! - The **announce** signature proves custody of the collateral key.  That
//!   key never leaves the hardware device, so the device signs, possibly
//!   after waiting for the operator to confirm on its screen.
//! - The **ping** signature proves custody of the operator key, which lives
//!   in the configuration.  It is made locally and checked by public-key
//!   recovery before use.
//!
//! Before anything is signed, the address the device derives for the stored
//! path must equal the configured collateral address.  A mismatch is a hard
//! stop; an empty configured address adopts the derived one.

use std::net::Ipv4Addr;

use mnode_core::crypto::message::{sign_message, verify_message};
use mnode_core::protocol::broadcast::{
    announce_message, parse_hash, ping_message, BuildError, CollateralInput,
};
use mnode_core::{AnnounceContext, IdentityError, MasternodeIdentity, Network, Signatures};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::hardware::{DeviceGate, HardwareError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SigningError {
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("device derives {derived} for the path; the collateral address is {configured}")]
    AddressMismatch { configured: String, derived: String },
    #[error("the device signed with {signer} instead of {expected}")]
    SignerMismatch { expected: String, signer: String },
    #[error("local ping signature failed verification")]
    PingSignatureInvalid,
    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

/// Everything the payload needs besides the chain anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedBroadcast {
    /// Address the device confirmed for the collateral path.
    pub collateral_address: String,
    pub collateral_pubkey: Vec<u8>,
    pub operator_pubkey: Vec<u8>,
    pub signatures: Signatures,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignOutcome {
    Signed(SignedBroadcast),
    /// The operator declined on the device; the device has been reset.
    Cancelled,
}

pub struct SigningCoordinator {
    device: DeviceGate,
    network: Network,
}

impl SigningCoordinator {
    pub fn new(device: DeviceGate, network: Network) -> Self {
        Self { device, network }
    }

    pub async fn sign(
        &self,
        identity: &MasternodeIdentity,
        context: &AnnounceContext,
    ) -> Result<SignOutcome, SigningError> {
        identity.validate_for_broadcast(self.network)?;
        let path = identity.path()?;
        let ip: Ipv4Addr = identity.ipv4()?;
        let operator = identity.operator(self.network)?;
        let operator_pubkey = operator.public_key_bytes();

        let (derived, collateral_pubkey) =
            match self.device.derive_address_and_public_key(&path).await {
                Ok(pair) => pair,
                Err(e) => return self.device_failure(e).await,
            };

        let configured = identity.collateral_address.trim();
        if configured.is_empty() {
            info!(address = %derived, "adopting device address as collateral address");
        } else if configured != derived {
            return Err(SigningError::AddressMismatch {
                configured: configured.to_string(),
                derived,
            });
        }

        // sig1: collateral key, on the device.
        let announce = announce_message(
            ip,
            identity.port,
            context.sig_time,
            &collateral_pubkey,
            &operator_pubkey,
            context.protocol_version,
        );
        debug!(%path, "requesting announce signature from device");
        let signed = match self.device.sign_message(&path, announce).await {
            Ok(signed) => signed,
            Err(e) => return self.device_failure(e).await,
        };
        if signed.address != derived {
            return Err(SigningError::SignerMismatch {
                expected: derived,
                signer: signed.address,
            });
        }

        // sig2: operator key, locally.
        let collateral =
            CollateralInput::from_hex(&identity.collateral_txid, identity.collateral_index)?;
        let block_hash = parse_hash(&context.block_hash, "ping block hash")?;
        let ping = ping_message(&collateral, &block_hash, context.sig_time);
        let ping_signature = sign_message(&operator, ping.as_bytes());
        let verified = verify_message(
            &operator.address(self.network),
            ping.as_bytes(),
            &ping_signature,
            self.network,
        )
        .unwrap_or(false);
        if !verified {
            return Err(SigningError::PingSignatureInvalid);
        }

        Ok(SignOutcome::Signed(SignedBroadcast {
            collateral_address: derived,
            collateral_pubkey,
            operator_pubkey,
            signatures: Signatures {
                announce: signed.signature,
                ping: ping_signature.to_vec(),
            },
        }))
    }

    async fn device_failure(&self, err: HardwareError) -> Result<SignOutcome, SigningError> {
        self.device.recover(&err).await;
        if err == HardwareError::Cancelled {
            info!("signing cancelled on the device");
            return Ok(SignOutcome::Cancelled);
        }
        warn!(error = %err, "device failure while signing");
        Err(SigningError::Hardware(err))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
