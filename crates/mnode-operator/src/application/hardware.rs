//! The hardware signing device, as seen by the use cases.
//!
//! Vendor drivers are synchronous and may block for as long as the operator
//! takes to press a button, so every call goes through [`DeviceGate`].  The
//! gate runs the call on Tokio's blocking pool and holds the device behind a
//! `Mutex`, which makes device access exclusive without ever parking a
//! runtime worker thread.

use std::sync::{Arc, Mutex};

use mnode_core::Bip32Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure modes a device driver reports.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HardwareError {
    /// The operator declined on the device or dismissed a prompt.
    #[error("operation cancelled by the operator")]
    Cancelled,
    /// Wrong PIN or passphrase, or the device is locked.
    #[error("PIN/passphrase error: {0}")]
    Pin(String),
    #[error("hardware wallet not found")]
    NotFound,
    #[error("device transport error: {0}")]
    Transport(String),
}

/// Result of signing a message on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessage {
    /// Address of the key that signed.
    pub address: String,
    /// 65-byte compact recoverable signature.
    pub signature: Vec<u8>,
}

/// Capability interface of a hardware wallet.
pub trait HardwareWallet: Send {
    fn derive_address(&mut self, path: &Bip32Path) -> Result<String, HardwareError>;

    /// Address and serialized public key for `path`.
    fn derive_address_and_public_key(
        &mut self,
        path: &Bip32Path,
    ) -> Result<(String, Vec<u8>), HardwareError>;

    /// Signs `message` with the key at `path`.  May wait indefinitely for the
    /// operator to confirm on the device.
    fn sign_message(&mut self, path: &Bip32Path, message: &str)
        -> Result<SignedMessage, HardwareError>;

    fn label(&mut self) -> Result<String, HardwareError>;

    fn init_device(&mut self) -> Result<(), HardwareError>;

    fn clear_session(&mut self) -> Result<(), HardwareError>;
}

/// What a driver may need to ask the operator mid-operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Pin,
    Passphrase,
}

/// Front-end service that answers device prompts.
///
/// Called from the device's blocking task; implementations block until the
/// operator answers.  `None` means the operator dismissed the prompt.
pub trait DevicePrompt: Send + Sync {
    fn ask(&self, kind: PromptKind, message: &str) -> Option<String>;
}

/// Serializes device calls and keeps them off the async worker threads.
#[derive(Clone)]
pub struct DeviceGate {
    device: Arc<Mutex<Box<dyn HardwareWallet>>>,
}

impl DeviceGate {
    pub fn new(device: Box<dyn HardwareWallet>) -> Self {
        Self {
            device: Arc::new(Mutex::new(device)),
        }
    }

    /// Runs `op` against the device on the blocking pool.
    pub async fn run<T, F>(&self, op: F) -> Result<T, HardwareError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn HardwareWallet) -> Result<T, HardwareError> + Send + 'static,
    {
        let device = Arc::clone(&self.device);
        tokio::task::spawn_blocking(move || {
            let mut guard = device
                .lock()
                .map_err(|_| HardwareError::Transport("device lock poisoned".to_string()))?;
            op(guard.as_mut())
        })
        .await
        .map_err(|e| HardwareError::Transport(format!("device task failed: {e}")))?
    }

    pub async fn derive_address(&self, path: &Bip32Path) -> Result<String, HardwareError> {
        let path = path.clone();
        self.run(move |d| d.derive_address(&path)).await
    }

    pub async fn derive_address_and_public_key(
        &self,
        path: &Bip32Path,
    ) -> Result<(String, Vec<u8>), HardwareError> {
        let path = path.clone();
        self.run(move |d| d.derive_address_and_public_key(&path)).await
    }

    pub async fn sign_message(
        &self,
        path: &Bip32Path,
        message: String,
    ) -> Result<SignedMessage, HardwareError> {
        let path = path.clone();
        self.run(move |d| d.sign_message(&path, &message)).await
    }

    pub async fn label(&self) -> Result<String, HardwareError> {
        self.run(|d| d.label()).await
    }

    pub async fn init_device(&self) -> Result<(), HardwareError> {
        self.run(|d| d.init_device()).await
    }

    pub async fn clear_session(&self) -> Result<(), HardwareError> {
        self.run(|d| d.clear_session()).await
    }

    /// Puts the device back in a usable state after `err`.
    ///
    /// A cancellation re-initialises the device; PIN and transport failures
    /// drop the session so the next call prompts again.  Errors raised while
    /// recovering are only logged.
    pub async fn recover(&self, err: &HardwareError) {
        let result = match err {
            HardwareError::Cancelled => self.init_device().await,
            HardwareError::Pin(_) | HardwareError::Transport(_) => self.clear_session().await,
            HardwareError::NotFound => return,
        };
        match result {
            Ok(()) => debug!(error = %err, "device session reset"),
            Err(e) => warn!(error = %e, "device reset failed"),
        }
    }
}
