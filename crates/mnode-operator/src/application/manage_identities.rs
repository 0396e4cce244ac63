//! ManageIdentitiesUseCase: edits to the configured identity collection.

use std::collections::{HashMap, HashSet};

use mnode_core::domain::identity::{merge_import, parse_masternode_conf, ImportSummary};
use mnode_core::{Bip32Path, MasternodeIdentity, Network, OperatorKey};
use tracing::info;

/// Imports `masternode.conf` text into `identities`.
///
/// `approve_overwrite` is asked once per name that already exists.
pub fn import_masternode_conf<F>(
    identities: &mut Vec<MasternodeIdentity>,
    text: &str,
    approve_overwrite: F,
) -> ImportSummary
where
    F: FnMut(&str) -> bool,
{
    let parsed = parse_masternode_conf(text);
    let summary = merge_import(identities, parsed, approve_overwrite);
    info!(
        imported = summary.imported,
        skipped = summary.skipped,
        "masternode.conf imported"
    );
    summary
}

/// A fresh operator key as WIF.
pub fn generate_operator_key(network: Network) -> String {
    OperatorKey::generate().to_wif(network)
}

/// Collateral addresses whose derivation path is still unknown.
pub fn addresses_missing_paths(identities: &[MasternodeIdentity]) -> HashSet<String> {
    identities
        .iter()
        .filter(|mn| mn.collateral_path.trim().is_empty())
        .map(|mn| mn.collateral_address.trim())
        .filter(|address| !address.is_empty())
        .map(str::to_string)
        .collect()
}

/// Writes resolved paths onto the identities whose address was found.
/// Returns the names of the identities that changed.
pub fn apply_found_paths(
    identities: &mut [MasternodeIdentity],
    found: &HashMap<String, Bip32Path>,
) -> Vec<String> {
    let mut changed = Vec::new();
    for mn in identities.iter_mut() {
        let Some(path) = found.get(mn.collateral_address.trim()) else {
            continue;
        };
        let path = path.to_string();
        if mn.collateral_path != path {
            mn.collateral_path = path;
            changed.push(mn.name.clone());
        }
    }
    changed
}
