//! Collateral verdicts and operator advisories.
//!
//! Collateral checks never fail a broadcast on their own.  A wrong amount or
//! a missing output becomes an [`Advisory`] that the orchestration layer puts
//! in front of the operator, who may continue anyway.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Exact value a collateral output must carry (1000 coins at 8 decimals).
pub const REQUIRED_COLLATERAL_SATOSHIS: u64 = 100_000_000_000;

/// One unspent output reported by the backend's address index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utxo {
    pub txid: String,
    pub output_index: u32,
    pub satoshis: u64,
}

/// Result of matching a claimed collateral against an address's UTXO set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollateralProof {
    /// The address holds at least one unspent output.
    pub present: bool,
    /// One of those outputs is the claimed `txid:index`.
    pub matched: bool,
    /// Value of the matched output, if any.
    pub satoshis: Option<u64>,
    /// The matched output carries exactly [`REQUIRED_COLLATERAL_SATOSHIS`].
    pub amount_ok: bool,
}

impl CollateralProof {
    /// Looks for `claimed_txid:claimed_index` in `utxos`.
    ///
    /// Txids are compared case-insensitively.
    pub fn evaluate(utxos: &[Utxo], claimed_txid: &str, claimed_index: u32) -> Self {
        let claimed_txid = claimed_txid.trim();
        let hit = utxos.iter().find(|u| {
            u.output_index == claimed_index && u.txid.eq_ignore_ascii_case(claimed_txid)
        });
        match hit {
            Some(utxo) => Self {
                present: true,
                matched: true,
                satoshis: Some(utxo.satoshis),
                amount_ok: utxo.satoshis == REQUIRED_COLLATERAL_SATOSHIS,
            },
            None => Self {
                present: !utxos.is_empty(),
                matched: false,
                satoshis: None,
                amount_ok: false,
            },
        }
    }

    /// The advisory the operator must confirm, if any.
    pub fn advisory(&self, address: &str) -> Option<Advisory> {
        match (self.matched, self.satoshis) {
            (false, _) => Some(Advisory::CollateralNotFound {
                address: address.to_string(),
            }),
            (true, Some(actual)) if !self.amount_ok => Some(Advisory::AmountMismatch { actual }),
            _ => None,
        }
    }
}

/// A finding that needs operator confirmation before the broadcast goes on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    /// The backend has no address index, so the collateral went unverified.
    IndexUnavailable { reason: String },
    /// The UTXO lookup itself failed for another reason.
    VerificationFailed { reason: String },
    /// The claimed `txid:index` is not an unspent output of the address.
    CollateralNotFound { address: String },
    /// The output exists but does not carry the required amount.
    AmountMismatch { actual: u64 },
    /// The network already lists this masternode as running.
    AlreadyActive { status: String },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::IndexUnavailable { reason } => write!(
                f,
                "collateral could not be verified ({reason}); continue only if the txid and index are correct"
            ),
            Advisory::VerificationFailed { reason } => write!(
                f,
                "collateral verification error ({reason}); continue only if the txid and index are correct"
            ),
            Advisory::CollateralNotFound { address } => write!(
                f,
                "the collateral txid/index is not an unspent output of {address}"
            ),
            Advisory::AmountMismatch { actual } => write!(
                f,
                "collateral output should equal {REQUIRED_COLLATERAL_SATOSHIS} satoshis but holds {actual}"
            ),
            Advisory::AlreadyActive { status } => {
                write!(f, "masternode state is {status}; starting it again resets its queue position")
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
