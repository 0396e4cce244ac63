//! Software stand-in for a hardware wallet.
//!
//! # Why a seeded wallet?
//!
//! Real devices need a USB connection and a human to press buttons.  The
//! `SeededWallet` derives a deterministic key for every path from a seed
//! (`sha256d(seed || path)`), so tests can:
//!
//! - compute the address any path will produce before running the code
//!   under test;
//! - check signatures the same way the backend would, by public-key
//!   recovery;
//! - observe every call through the shared [`WalletRecord`].
//!
//! The keys are not BIP32 children of anything; only the mapping from path
//! to address has to be stable.
//!
//! # Usage in tests
//!
//! ```ignore
//! let wallet = SeededWallet::new([1; 32], Network::Mainnet);
//! let expected = wallet.address_for(&Bip32Path::collateral(0, 0));
//! let record = wallet.record();
//! let gate = DeviceGate::new(Box::new(wallet));
//!
//! // ... run the use case ...
//!
//! assert_eq!(record.derived.lock().unwrap().len(), 2);
//! ```
//!
//! # Failure switches
//!
//! - `cancel_signing` makes `sign_message` report an operator cancel.
//! - `sign_as` reports a different signing address.
//! - [`SeededWallet::fail_after`] fails derivations with a transport error.
//! - [`SeededWallet::cancel_after`] trips a cancellation token mid-scan.
//! - [`SeededWallet::with_pin`] locks the wallet behind a PIN prompt.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mnode_core::crypto::hash::sha256d;
use mnode_core::crypto::message::sign_message;
use mnode_core::{Bip32Path, Network, OperatorKey};
use tokio_util::sync::CancellationToken;

use crate::application::hardware::{
    DevicePrompt, HardwareError, HardwareWallet, PromptKind, SignedMessage,
};

/// Depth of a `44'/5'/a'/0/i` collateral path.
const COLLATERAL_DEPTH: usize = 5;

/// Calls observed by a [`SeededWallet`], shared with the test.
#[derive(Debug, Default)]
pub struct WalletRecord {
    /// Every path passed to a derive call, in order.
    pub derived: Mutex<Vec<Bip32Path>>,
    /// `(path, message)` of every signing request that was not refused.
    pub signed: Mutex<Vec<(Bip32Path, String)>>,
    pub inits: AtomicUsize,
    pub clears: AtomicUsize,
}

struct PinLock {
    prompt: Arc<dyn DevicePrompt>,
    pin: String,
    unlocked: bool,
}

pub struct SeededWallet {
    seed: [u8; 32],
    network: Network,
    record: Arc<WalletRecord>,
    /// When `true`, signing reports [`HardwareError::Cancelled`].
    pub cancel_signing: bool,
    /// Address reported for signatures instead of the path's own.
    pub sign_as: Option<String>,
    collateral_derivations: usize,
    fail_after: Option<usize>,
    cancel_after: Option<(usize, CancellationToken)>,
    pin: Option<PinLock>,
}

impl SeededWallet {
    pub fn new(seed: [u8; 32], network: Network) -> Self {
        Self {
            seed,
            network,
            record: Arc::new(WalletRecord::default()),
            cancel_signing: false,
            sign_as: None,
            collateral_derivations: 0,
            fail_after: None,
            cancel_after: None,
            pin: None,
        }
    }

    pub fn record(&self) -> Arc<WalletRecord> {
        Arc::clone(&self.record)
    }

    /// Collateral-path derivations after which every derive fails.
    pub fn fail_after(mut self, derivations: usize) -> Self {
        self.fail_after = Some(derivations);
        self
    }

    /// Cancels `token` once `derivations` collateral paths have been derived.
    pub fn cancel_after(mut self, derivations: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((derivations, token));
        self
    }

    /// Requires `pin`, asked through `prompt`, before the first operation
    /// of each session.
    pub fn with_pin(mut self, prompt: Arc<dyn DevicePrompt>, pin: impl Into<String>) -> Self {
        self.pin = Some(PinLock {
            prompt,
            pin: pin.into(),
            unlocked: false,
        });
        self
    }

    pub fn key_for(&self, path: &Bip32Path) -> Result<OperatorKey, HardwareError> {
        let mut material = self.seed.to_vec();
        material.extend_from_slice(path.to_string().as_bytes());
        OperatorKey::from_secret_bytes(sha256d(&material))
            .map(|key| key.with_compression(true))
            .map_err(|e| HardwareError::Transport(e.to_string()))
    }

    /// The address [`HardwareWallet::derive_address`] returns for `path`.
    pub fn address_for(&self, path: &Bip32Path) -> String {
        self.key_for(path)
            .map(|key| key.address(self.network))
            .unwrap_or_default()
    }

    fn unlock(&mut self) -> Result<(), HardwareError> {
        let Some(lock) = self.pin.as_mut() else {
            return Ok(());
        };
        if lock.unlocked {
            return Ok(());
        }
        match lock.prompt.ask(PromptKind::Pin, "Enter the device PIN") {
            None => Err(HardwareError::Cancelled),
            Some(pin) if pin == lock.pin => {
                lock.unlocked = true;
                Ok(())
            }
            Some(_) => Err(HardwareError::Pin("invalid PIN".to_string())),
        }
    }

    fn lock(&mut self) {
        if let Some(lock) = self.pin.as_mut() {
            lock.unlocked = false;
        }
    }

    fn derive(&mut self, path: &Bip32Path) -> Result<OperatorKey, HardwareError> {
        self.unlock()?;
        self.record
            .derived
            .lock()
            .map_err(|_| HardwareError::Transport("record poisoned".to_string()))?
            .push(path.clone());

        if path.depth() == COLLATERAL_DEPTH {
            if self.fail_after.is_some_and(|n| self.collateral_derivations >= n) {
                return Err(HardwareError::Transport("device disconnected".to_string()));
            }
            self.collateral_derivations += 1;
            if let Some((n, token)) = &self.cancel_after {
                if self.collateral_derivations >= *n {
                    token.cancel();
                }
            }
        }
        self.key_for(path)
    }
}

impl HardwareWallet for SeededWallet {
    fn derive_address(&mut self, path: &Bip32Path) -> Result<String, HardwareError> {
        Ok(self.derive(path)?.address(self.network))
    }

    fn derive_address_and_public_key(
        &mut self,
        path: &Bip32Path,
    ) -> Result<(String, Vec<u8>), HardwareError> {
        let key = self.derive(path)?;
        Ok((key.address(self.network), key.public_key_bytes()))
    }

    fn sign_message(
        &mut self,
        path: &Bip32Path,
        message: &str,
    ) -> Result<SignedMessage, HardwareError> {
        self.unlock()?;
        if self.cancel_signing {
            return Err(HardwareError::Cancelled);
        }
        let key = self.key_for(path)?;
        self.record
            .signed
            .lock()
            .map_err(|_| HardwareError::Transport("record poisoned".to_string()))?
            .push((path.clone(), message.to_string()));
        Ok(SignedMessage {
            address: self
                .sign_as
                .clone()
                .unwrap_or_else(|| key.address(self.network)),
            signature: sign_message(&key, message.as_bytes()).to_vec(),
        })
    }

    fn label(&mut self) -> Result<String, HardwareError> {
        Ok("seeded wallet".to_string())
    }

    fn init_device(&mut self) -> Result<(), HardwareError> {
        self.record.inits.fetch_add(1, Ordering::SeqCst);
        self.lock();
        Ok(())
    }

    fn clear_session(&mut self) -> Result<(), HardwareError> {
        self.record.clears.fetch_add(1, Ordering::SeqCst);
        self.lock();
        Ok(())
    }
}
