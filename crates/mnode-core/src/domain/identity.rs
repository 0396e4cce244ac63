//! Masternode identity and `masternode.conf` import.
//!
//! A [`MasternodeIdentity`] is a plain value object.  The configuration owns
//! a `Vec` of them and the caller passes the "current" one explicitly into
//! every operation; nothing in this crate keeps a global selection.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::keys::{self, Network, OperatorKey};
use crate::domain::path::{Bip32Path, PathError};

/// Port used when a `masternode.conf` line gives a bare IP.
pub const DEFAULT_MASTERNODE_PORT: u16 = 9999;

/// Highest number tried by [`propose_name`].
const MAX_PROPOSED_NAME: u32 = 99;

/// Reasons an identity cannot be used for a broadcast.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("masternode field '{0}' is empty")]
    MissingField(&'static str),
    #[error("invalid IPv4 address {0:?}")]
    InvalidIp(String),
    #[error("port must be in 1..=65535")]
    InvalidPort,
    #[error("operator private key is not a valid WIF key: {0}")]
    InvalidOperatorKey(String),
    #[error("invalid collateral address {0:?}")]
    InvalidCollateralAddress(String),
    #[error("invalid collateral path: {0}")]
    InvalidPath(#[from] PathError),
    #[error("collateral txid must be 64 hex characters, got {0:?}")]
    InvalidTxid(String),
}

/// Everything needed to announce one masternode.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasternodeIdentity {
    pub name: String,
    pub ip: String,
    pub port: u16,
    /// Operator private key, WIF encoded.
    pub operator_key: String,
    /// May be empty until the collateral path has been resolved.
    #[serde(default)]
    pub collateral_address: String,
    /// May be empty until the collateral address has been resolved.
    #[serde(default)]
    pub collateral_path: String,
    pub collateral_txid: String,
    pub collateral_index: u32,
}

// The operator key must never reach a log line.
impl fmt::Debug for MasternodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasternodeIdentity")
            .field("name", &self.name)
            .field("ip", &self.ip)
            .field("port", &self.port)
            .field("operator_key", &"<redacted>")
            .field("collateral_address", &self.collateral_address)
            .field("collateral_path", &self.collateral_path)
            .field("collateral_txid", &self.collateral_txid)
            .field("collateral_index", &self.collateral_index)
            .finish()
    }
}

impl MasternodeIdentity {
    /// Creates an identity with every field except the name left empty.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip: String::new(),
            port: DEFAULT_MASTERNODE_PORT,
            operator_key: String::new(),
            collateral_address: String::new(),
            collateral_path: String::new(),
            collateral_txid: String::new(),
            collateral_index: 0,
        }
    }

    /// Parsed IPv4 address.
    pub fn ipv4(&self) -> Result<Ipv4Addr, IdentityError> {
        self.ip
            .trim()
            .parse()
            .map_err(|_| IdentityError::InvalidIp(self.ip.clone()))
    }

    /// Parsed collateral derivation path.
    pub fn path(&self) -> Result<Bip32Path, IdentityError> {
        if self.collateral_path.trim().is_empty() {
            return Err(IdentityError::MissingField("collateral_path"));
        }
        Ok(self.collateral_path.parse()?)
    }

    /// Decoded operator key.
    pub fn operator(&self, network: Network) -> Result<OperatorKey, IdentityError> {
        OperatorKey::from_wif(&self.operator_key, network)
            .map_err(|e| IdentityError::InvalidOperatorKey(e.to_string()))
    }

    /// `txid-index`, the filter form the backend's masternode list accepts.
    pub fn collateral_outpoint(&self) -> String {
        format!("{}-{}", self.collateral_txid, self.collateral_index)
    }

    /// Checks that every field needed to build and sign a broadcast is
    /// present and well formed.
    ///
    /// The collateral address may still be empty: signing adopts the address
    /// the device derives for the path.  When present it must be a valid
    /// address for `network`.
    pub fn validate_for_broadcast(&self, network: Network) -> Result<(), IdentityError> {
        require(&self.name, "name")?;
        require(&self.ip, "ip")?;
        require(&self.operator_key, "operator_key")?;
        require(&self.collateral_txid, "collateral_txid")?;

        self.ipv4()?;
        if self.port == 0 {
            return Err(IdentityError::InvalidPort);
        }
        self.operator(network)?;
        self.path()?;

        let txid = self.collateral_txid.trim();
        if txid.len() != 64 || !txid.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(IdentityError::InvalidTxid(self.collateral_txid.clone()));
        }

        let address = self.collateral_address.trim();
        if !address.is_empty() && !keys::is_valid_address(address, network) {
            return Err(IdentityError::InvalidCollateralAddress(
                self.collateral_address.clone(),
            ));
        }
        Ok(())
    }
}

fn require(value: &str, field: &'static str) -> Result<(), IdentityError> {
    if value.trim().is_empty() {
        Err(IdentityError::MissingField(field))
    } else {
        Ok(())
    }
}

/// First unused name of the form `MN1` .. `MN99`.
pub fn propose_name(existing: &[MasternodeIdentity]) -> Option<String> {
    (1..=MAX_PROPOSED_NAME)
        .map(|n| format!("MN{n}"))
        .find(|candidate| !existing.iter().any(|mn| &mn.name == candidate))
}

// ── masternode.conf import ────────────────────────────────────────────────────

/// Result of parsing a `masternode.conf` file.
#[derive(Debug, Default)]
pub struct ParsedConf {
    pub entries: Vec<MasternodeIdentity>,
    /// Non-blank lines that were comments, too short, or unparseable.
    pub skipped: usize,
}

/// Parses `masternode.conf` content.
///
/// Each line is `name ip[:port] wif txid index [address]`.  Blank lines are
/// ignored; `#` comments and lines with fewer than five tokens count as
/// skipped.  Imported entries never carry a derivation path.
pub fn parse_masternode_conf(text: &str) -> ParsedConf {
    let mut parsed = ParsedConf::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_conf_line(line) {
            Some(entry) => parsed.entries.push(entry),
            None => parsed.skipped += 1,
        }
    }
    parsed
}

fn parse_conf_line(line: &str) -> Option<MasternodeIdentity> {
    if line.starts_with('#') {
        return None;
    }
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 5 {
        return None;
    }

    let (ip, port) = match tokens[1].split_once(':') {
        Some((ip, port)) => (ip, port.parse().ok()?),
        None => (tokens[1], DEFAULT_MASTERNODE_PORT),
    };
    let collateral_index = tokens[4].parse().ok()?;

    Some(MasternodeIdentity {
        name: tokens[0].to_string(),
        ip: ip.to_string(),
        port,
        operator_key: tokens[2].to_string(),
        collateral_address: tokens.get(5).map(|s| s.to_string()).unwrap_or_default(),
        collateral_path: String::new(),
        collateral_txid: tokens[3].to_string(),
        collateral_index,
    })
}

/// Counts reported after merging an import into the configuration.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    /// Names of the entries that were added or overwritten.
    pub names: Vec<String>,
}

/// Merges parsed entries into `existing`.
///
/// An entry whose name already exists replaces it only when
/// `approve_overwrite(name)` returns `true`; otherwise it is skipped.
pub fn merge_import<F>(
    existing: &mut Vec<MasternodeIdentity>,
    parsed: ParsedConf,
    mut approve_overwrite: F,
) -> ImportSummary
where
    F: FnMut(&str) -> bool,
{
    let mut summary = ImportSummary {
        skipped: parsed.skipped,
        ..Default::default()
    };
    for entry in parsed.entries {
        match existing.iter_mut().find(|mn| mn.name == entry.name) {
            Some(slot) => {
                if !approve_overwrite(&entry.name) {
                    summary.skipped += 1;
                    continue;
                }
                summary.names.push(entry.name.clone());
                *slot = entry;
            }
            None => {
                summary.names.push(entry.name.clone());
                existing.push(entry);
            }
        }
        summary.imported += 1;
    }
    summary
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::OperatorKey;

    const TXID: &str = "5b8e1f0e3c1a2d4f6a7b8c9d0e1f2a3b4c5d6e7f8091a2b3c4d5e6f708192a3b";

    fn valid_identity() -> MasternodeIdentity {
        let key = OperatorKey::from_secret_bytes([7u8; 32]).unwrap();
        MasternodeIdentity {
            name: "MN1".to_string(),
            ip: "203.0.113.5".to_string(),
            port: 9999,
            operator_key: key.to_wif(Network::Mainnet),
            collateral_address: String::new(),
            collateral_path: "44'/5'/0'/0/0".to_string(),
            collateral_txid: TXID.to_string(),
            collateral_index: 1,
        }
    }

    // ── Validation ────────────────────────────────────────────────────────────

    #[test]
    fn test_valid_identity_passes_validation() {
        assert_eq!(valid_identity().validate_for_broadcast(Network::Mainnet), Ok(()));
    }

    #[test]
    fn test_missing_path_is_reported_by_field_name() {
        let mut mn = valid_identity();
        mn.collateral_path.clear();
        assert_eq!(
            mn.validate_for_broadcast(Network::Mainnet),
            Err(IdentityError::MissingField("collateral_path"))
        );
    }

    #[test]
    fn test_bad_ip_port_and_txid_are_rejected() {
        let mut mn = valid_identity();
        mn.ip = "300.1.1.1".to_string();
        assert!(matches!(
            mn.validate_for_broadcast(Network::Mainnet),
            Err(IdentityError::InvalidIp(_))
        ));

        let mut mn = valid_identity();
        mn.port = 0;
        assert_eq!(
            mn.validate_for_broadcast(Network::Mainnet),
            Err(IdentityError::InvalidPort)
        );

        let mut mn = valid_identity();
        mn.collateral_txid = "abcd".to_string();
        assert!(matches!(
            mn.validate_for_broadcast(Network::Mainnet),
            Err(IdentityError::InvalidTxid(_))
        ));
    }

    #[test]
    fn test_testnet_key_rejected_on_mainnet() {
        let mut mn = valid_identity();
        let key = OperatorKey::from_secret_bytes([7u8; 32]).unwrap();
        mn.operator_key = key.to_wif(Network::Testnet);
        assert!(matches!(
            mn.validate_for_broadcast(Network::Mainnet),
            Err(IdentityError::InvalidOperatorKey(_))
        ));
    }

    #[test]
    fn test_debug_output_redacts_operator_key() {
        let mn = valid_identity();
        let rendered = format!("{mn:?}");
        assert!(!rendered.contains(&mn.operator_key));
        assert!(rendered.contains("<redacted>"));
    }

    // ── Name proposal ─────────────────────────────────────────────────────────

    #[test]
    fn test_propose_name_skips_used_names() {
        let existing = vec![MasternodeIdentity::named("MN1"), MasternodeIdentity::named("MN2")];
        assert_eq!(propose_name(&existing).as_deref(), Some("MN3"));
    }

    #[test]
    fn test_propose_name_exhausted() {
        let existing: Vec<_> = (1..=99)
            .map(|n| MasternodeIdentity::named(format!("MN{n}")))
            .collect();
        assert_eq!(propose_name(&existing), None);
    }

    // ── Import ────────────────────────────────────────────────────────────────

    #[test]
    fn test_parse_conf_handles_ports_comments_and_short_lines() {
        let text = format!(
            "# comment line that is long enough to split into tokens\n\
             \n\
             mn-a 203.0.113.5:19999 wifkey {TXID} 0 XaddrA\n\
             mn-b 203.0.113.6 wifkey {TXID} 1\n\
             too short line\n"
        );

        let parsed = parse_masternode_conf(&text);

        assert_eq!(parsed.entries.len(), 2);
        assert_eq!(parsed.skipped, 2);
        assert_eq!(parsed.entries[0].port, 19999);
        assert_eq!(parsed.entries[0].collateral_address, "XaddrA");
        assert_eq!(parsed.entries[1].port, DEFAULT_MASTERNODE_PORT);
        assert!(parsed.entries[1].collateral_address.is_empty());
        assert!(parsed.entries.iter().all(|e| e.collateral_path.is_empty()));
    }

    #[test]
    fn test_merge_overwrites_only_when_approved() {
        let mut existing = vec![
            MasternodeIdentity::named("mn-a"),
            MasternodeIdentity::named("mn-b"),
        ];
        let text = format!(
            "mn-a 10.0.0.1 k {TXID} 0\nmn-b 10.0.0.2 k {TXID} 0\nmn-c 10.0.0.3 k {TXID} 0\n"
        );
        let parsed = parse_masternode_conf(&text);

        let summary = merge_import(&mut existing, parsed, |name| name == "mn-a");

        assert_eq!(summary.imported, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.names, vec!["mn-a".to_string(), "mn-c".to_string()]);
        assert_eq!(existing.len(), 3);
        assert_eq!(existing[0].ip, "10.0.0.1");
        assert!(existing[1].ip.is_empty(), "declined overwrite must keep old data");
    }
}
