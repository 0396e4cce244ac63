//! Entries of the backend's `masternode list full` output.
//!
//! The backend answers with a JSON object keyed by `txid-index`, each value a
//! whitespace-separated row:
//!
//! ```text
//! "  ENABLED 70208 XpayeeAddress 1508350000 86400 1508340000 760000 203.0.113.5:9999"
//! ```
//!
//! columns: status, protocol, payee, last seen, active seconds, last paid
//! time, last paid block, ip:port.

use thiserror::Error;

/// Statuses for which starting the masternode again needs confirmation.
pub const ACTIVE_STATUSES: [&str; 2] = ["ENABLED", "PRE_ENABLED"];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed masternode list row {row:?}")]
pub struct StatusParseError {
    pub row: String,
}

/// One masternode as the network currently sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasternodeEntry {
    /// `txid-index` of the collateral.
    pub ident: String,
    pub status: String,
    pub protocol: u32,
    pub payee: String,
    pub last_seen: u64,
    pub active_seconds: u64,
    pub last_paid_time: u64,
    pub last_paid_block: u64,
    pub address: String,
}

impl MasternodeEntry {
    /// Parses one row of `masternode list full`.
    pub fn parse(ident: &str, row: &str) -> Result<Self, StatusParseError> {
        let err = || StatusParseError {
            row: row.to_string(),
        };
        let cols: Vec<&str> = row.split_whitespace().collect();
        if cols.len() < 8 {
            return Err(err());
        }
        let num = |s: &str| s.parse::<u64>().map_err(|_| err());
        Ok(Self {
            ident: ident.to_string(),
            status: cols[0].to_string(),
            protocol: cols[1].parse().map_err(|_| err())?,
            payee: cols[2].to_string(),
            last_seen: num(cols[3])?,
            active_seconds: num(cols[4])?,
            last_paid_time: num(cols[5])?,
            last_paid_block: num(cols[6])?,
            address: cols[7].to_string(),
        })
    }

    /// Whether the network already treats this masternode as running.
    pub fn is_active(&self) -> bool {
        ACTIVE_STATUSES.contains(&self.status.as_str())
    }
}
