//! ResolvePathsUseCase: finds the derivation paths of known addresses.
//!
//! # How the search works (for beginners)
//!
//! A hardware wallet never reveals which of its keys funded a collateral, so
//! the only way to learn the path of an address is to derive candidate
//! addresses one by one and compare.  Each derivation is a USB round trip,
//! so the resolver:
//!
//! 1. Derives the *partition root* (the address at `44'/5'`).  It changes
//!    with the device passphrase, so it keys a separate cache per passphrase.
//! 2. Walks [`SearchOrder`] and, for each candidate path, asks the
//!    [`PathCache`] first.  Only a miss reaches the device, and the derived
//!    address is written back.
//! 3. Records any derived address that is one of the remaining targets, then
//!    stops as soon as every target is found.
//!
//! Cancellation is checked before every candidate.  Whatever happens, a
//! partition that gained new entries is flushed before returning.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use mnode_core::{Bip32Path, SearchOrder};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::hardware::{DeviceGate, HardwareError};

/// Persistent `path → address` memo, partitioned by root address.
pub trait PathCache: Send {
    fn get(&mut self, partition_root: &str, path: &Bip32Path) -> Option<String>;

    /// Buffers an entry in memory.
    fn put(&mut self, partition_root: &str, path: &Bip32Path, address: &str);

    /// Persists the whole partition, best effort.
    fn flush(&mut self, partition_root: &str);
}

/// Reported before each candidate is examined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveProgress {
    pub paths_checked: usize,
    pub paths_found: usize,
    pub current_path: Bip32Path,
}

/// Addresses located so far, and whether the search was cut short.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub found: HashMap<String, Bip32Path>,
    pub cancelled: bool,
    /// Candidates examined, from cache or device.
    pub paths_checked: usize,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("device error after {} of the targets were found: {source}", .partial.found.len())]
    Device {
        #[source]
        source: HardwareError,
        /// Results gathered before the failure.
        partial: ResolveOutcome,
    },
}

/// The BIP32 address resolver.
pub struct Bip32AddressResolver {
    device: DeviceGate,
    cache: Arc<Mutex<Box<dyn PathCache>>>,
}

impl Bip32AddressResolver {
    pub fn new(device: DeviceGate, cache: Box<dyn PathCache>) -> Self {
        Self {
            device,
            cache: Arc::new(Mutex::new(cache)),
        }
    }

    /// Address at the fixed partition path `44'/5'`.
    pub async fn partition_root(&self) -> Result<String, HardwareError> {
        self.device
            .derive_address(&Bip32Path::partition_root())
            .await
    }

    /// Searches the collateral grid for `targets`.
    pub async fn resolve<F>(
        &self,
        targets: &HashSet<String>,
        cancel: &CancellationToken,
        mut progress: F,
    ) -> Result<ResolveOutcome, ResolveError>
    where
        F: FnMut(&ResolveProgress) + Send,
    {
        let mut outcome = ResolveOutcome::default();
        if targets.is_empty() {
            return Ok(outcome);
        }
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            return Ok(outcome);
        }

        let root = match self.partition_root().await {
            Ok(root) => root,
            Err(source) => {
                return Err(ResolveError::Device {
                    source,
                    partial: outcome,
                })
            }
        };
        debug!(partition = %root, targets = targets.len(), "scanning derivation tree");

        let mut remaining = targets.clone();
        let mut modified = false;
        let mut failure = None;

        for slot in SearchOrder::new() {
            if remaining.is_empty() {
                break;
            }
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            let path = slot.path();
            progress(&ResolveProgress {
                paths_checked: outcome.paths_checked,
                paths_found: outcome.found.len(),
                current_path: path.clone(),
            });

            let address = match self.cached(&root, &path) {
                Some(address) => address,
                None => match self.device.derive_address(&path).await {
                    Ok(address) => {
                        self.store(&root, &path, &address);
                        modified = true;
                        address
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                },
            };
            outcome.paths_checked += 1;

            if remaining.remove(&address) {
                debug!(%address, %path, "collateral path found");
                outcome.found.insert(address, path);
            }
        }

        if modified {
            self.flush(&root);
        }

        match failure {
            Some(source) => Err(ResolveError::Device {
                source,
                partial: outcome,
            }),
            None => {
                info!(
                    found = outcome.found.len(),
                    checked = outcome.paths_checked,
                    cancelled = outcome.cancelled,
                    "derivation scan finished"
                );
                Ok(outcome)
            }
        }
    }

    /// Address of a single path, through the same cache.
    pub async fn lookup_address(&self, path: &Bip32Path) -> Result<String, HardwareError> {
        let root = self.partition_root().await?;
        if let Some(address) = self.cached(&root, path) {
            return Ok(address);
        }
        let address = self.device.derive_address(path).await?;
        self.store(&root, path, &address);
        self.flush(&root);
        Ok(address)
    }

    fn cached(&self, root: &str, path: &Bip32Path) -> Option<String> {
        self.cache.lock().ok()?.get(root, path)
    }

    fn store(&self, root: &str, path: &Bip32Path, address: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(root, path, address);
        }
    }

    fn flush(&self, root: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.flush(root);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::hardware::{HardwareWallet, SignedMessage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Device whose address for a path is just its display form.
    struct EchoDevice {
        derivations: Arc<AtomicUsize>,
        fail_at: Option<usize>,
    }

    impl HardwareWallet for EchoDevice {
        fn derive_address(&mut self, path: &Bip32Path) -> Result<String, HardwareError> {
            let n = self.derivations.fetch_add(1, Ordering::SeqCst);
            if Some(n) == self.fail_at {
                return Err(HardwareError::Transport("unplugged".to_string()));
            }
            Ok(format!("addr:{path}"))
        }
        fn derive_address_and_public_key(
            &mut self,
            path: &Bip32Path,
        ) -> Result<(String, Vec<u8>), HardwareError> {
            Ok((self.derive_address(path)?, Vec::new()))
        }
        fn sign_message(&mut self, _: &Bip32Path, _: &str) -> Result<SignedMessage, HardwareError> {
            Err(HardwareError::Cancelled)
        }
        fn label(&mut self) -> Result<String, HardwareError> {
            Ok("echo".to_string())
        }
        fn init_device(&mut self) -> Result<(), HardwareError> {
            Ok(())
        }
        fn clear_session(&mut self) -> Result<(), HardwareError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryCache {
        entries: HashMap<(String, String), String>,
        flushes: Arc<AtomicUsize>,
    }

    impl PathCache for MemoryCache {
        fn get(&mut self, root: &str, path: &Bip32Path) -> Option<String> {
            self.entries.get(&(root.to_string(), path.to_string())).cloned()
        }
        fn put(&mut self, root: &str, path: &Bip32Path, address: &str) {
            self.entries
                .insert((root.to_string(), path.to_string()), address.to_string());
        }
        fn flush(&mut self, _root: &str) {
            self.flushes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn make_resolver(
        fail_at: Option<usize>,
    ) -> (Bip32AddressResolver, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let derivations = Arc::new(AtomicUsize::new(0));
        let flushes = Arc::new(AtomicUsize::new(0));
        let device = EchoDevice {
            derivations: Arc::clone(&derivations),
            fail_at,
        };
        let cache = MemoryCache {
            flushes: Arc::clone(&flushes),
            ..Default::default()
        };
        let resolver =
            Bip32AddressResolver::new(DeviceGate::new(Box::new(device)), Box::new(cache));
        (resolver, derivations, flushes)
    }

    fn targets(paths: &[&str]) -> HashSet<String> {
        paths.iter().map(|p| format!("addr:{p}")).collect()
    }

    #[tokio::test]
    async fn test_resolve_finds_multiple_targets_in_one_pass() {
        let (resolver, _, flushes) = make_resolver(None);
        // Requested out of visiting order.
        let wanted = targets(&["44'/5'/2'/0/3", "44'/5'/0'/0/1"]);

        let outcome = resolver
            .resolve(&wanted, &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert!(!outcome.cancelled);
        assert_eq!(outcome.found.len(), 2);
        assert_eq!(
            outcome.found["addr:44'/5'/2'/0/3"].to_string(),
            "44'/5'/2'/0/3"
        );
        // Stops right after 44'/5'/2'/0/3, the 24th candidate.
        assert_eq!(outcome.paths_checked, 24);
        assert_eq!(flushes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_progress_reports_every_step() {
        let (resolver, _, _) = make_resolver(None);
        let mut seen = Vec::new();

        resolver
            .resolve(&targets(&["44'/5'/0'/0/4"]), &CancellationToken::new(), |p| {
                seen.push(p.clone())
            })
            .await
            .unwrap();

        assert_eq!(seen.len(), 5);
        assert_eq!(seen[0].paths_checked, 0);
        assert_eq!(seen[4].current_path.to_string(), "44'/5'/0'/0/4");
        assert_eq!(seen[4].paths_found, 0);
    }

    #[tokio::test]
    async fn test_second_resolve_is_served_from_cache() {
        let (resolver, derivations, _) = make_resolver(None);
        let wanted = targets(&["44'/5'/1'/0/0"]);
        resolver
            .resolve(&wanted, &CancellationToken::new(), |_| {})
            .await
            .unwrap();
        let after_first = derivations.load(Ordering::SeqCst);

        let outcome = resolver
            .resolve(&wanted, &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert_eq!(outcome.found.len(), 1);
        // Only the partition root touches the device the second time.
        assert_eq!(derivations.load(Ordering::SeqCst), after_first + 1);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_does_no_work() {
        let (resolver, derivations, _) = make_resolver(None);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = resolver
            .resolve(&targets(&["44'/5'/0'/0/0"]), &cancel, |_| {})
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert!(outcome.found.is_empty());
        assert_eq!(derivations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelling_the_parent_stops_a_child_search() {
        // Arrange
        let (resolver, derivations, _) = make_resolver(None);
        let parent = CancellationToken::new();
        let child = parent.child_token();

        // Act
        parent.cancel();
        let outcome = resolver
            .resolve(&targets(&["44'/5'/0'/0/0"]), &child, |_| {})
            .await
            .unwrap();

        // Assert
        assert!(outcome.cancelled);
        assert_eq!(outcome.paths_checked, 0);
        assert_eq!(derivations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_device_error_returns_partial_result_and_flushes() {
        // Root is derivation 0; fail on the 6th candidate.
        let (resolver, _, flushes) = make_resolver(Some(6));

        let err = resolver
            .resolve(
                &targets(&["44'/5'/0'/0/2", "44'/5'/9'/0/99"]),
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap_err();

        let ResolveError::Device { source, partial } = err;
        assert!(matches!(source, HardwareError::Transport(_)));
        assert_eq!(partial.found.len(), 1);
        assert_eq!(partial.paths_checked, 5);
        assert_eq!(flushes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_target_set_skips_the_device() {
        let (resolver, derivations, _) = make_resolver(None);
        let outcome = resolver
            .resolve(&HashSet::new(), &CancellationToken::new(), |_| {})
            .await
            .unwrap();
        assert_eq!(outcome, ResolveOutcome::default());
        assert_eq!(derivations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lookup_address_uses_cache() {
        let (resolver, derivations, _) = make_resolver(None);
        let path: Bip32Path = "44'/5'/0'/0/7".parse().unwrap();

        let first = resolver.lookup_address(&path).await.unwrap();
        let second = resolver.lookup_address(&path).await.unwrap();

        assert_eq!(first, second);
        // root + path, then root only
        assert_eq!(derivations.load(Ordering::SeqCst), 3);
    }
}
