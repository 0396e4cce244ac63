//! ConnectionManager: the backend connection and synchronization state machine.
//!
//! ```text
//!   Disconnected ──check──▶ Connecting ──synced──▶ Connected
//!                              │  └────failure──▶ Failed
//!                              └──not synced──▶ Syncing ──synced──▶ Connected
//!                                                  ├──failure──▶ Failed
//!                                                  └──cancel───▶ Disconnected
//! ```
//!
//! At most one check and one sync monitor run at a time.  A check requested
//! while another is in flight attaches to that check's result; a check
//! requested while the monitor runs is answered when the monitor ends.
//!
//! State changes are never dropped: they wait for room in the event channel.
//! Sync progress is dropped when the channel is full.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use mnode_core::ConnectionState;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::backend::{BackendRpc, ConnectionGate, GateError, RpcError};

/// Interval between sync-status polls while the backend synchronizes.
pub const SYNC_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Why the last check did not end in [`ConnectionState::Connected`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("backend connection settings are incomplete")]
    ConfigIncomplete,
    #[error(transparent)]
    Backend(#[from] RpcError),
}

/// Events emitted to the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    SyncProgress {
        asset_id: i64,
        asset_name: String,
    },
}

/// Called once with the state a check settled on.
pub type CheckCallback = Box<dyn FnOnce(ConnectionState) + Send>;

#[derive(Default)]
struct Inner {
    state: ConnectionState,
    last_error: Option<CheckError>,
    checking: bool,
    monitor: Option<CancellationToken>,
    waiters: Vec<CheckCallback>,
}

struct Shared {
    inner: Mutex<Inner>,
    events: mpsc::Sender<ConnectionEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit_progress(&self, event: ConnectionEvent) {
        if self.events.try_send(event).is_err() {
            debug!("sync progress dropped; receiver full or closed");
        }
    }

    /// Moves to `to`, applies `update`, and hands back the queued callbacks
    /// once neither a check nor a monitor is left running.
    async fn transition(
        &self,
        to: ConnectionState,
        error: Option<CheckError>,
        update: impl FnOnce(&mut Inner),
    ) -> Vec<CheckCallback> {
        let (from, waiters) = {
            let mut inner = self.lock();
            let from = inner.state;
            inner.state = to;
            if to == ConnectionState::Connected {
                inner.last_error = None;
            }
            if error.is_some() {
                inner.last_error = error.clone();
            }
            update(&mut inner);
            let waiters = if inner.checking || inner.monitor.is_some() {
                Vec::new()
            } else {
                std::mem::take(&mut inner.waiters)
            };
            (from, waiters)
        };
        if from != to {
            match &error {
                Some(e) => warn!(%from, %to, error = %e, "backend connection state changed"),
                None => info!(%from, %to, "backend connection state changed"),
            }
            let event = ConnectionEvent::StateChanged { from, to };
            if self.events.send(event).await.is_err() {
                debug!("connection event receiver closed");
            }
        }
        waiters
    }

    async fn settle(
        &self,
        to: ConnectionState,
        error: Option<CheckError>,
        update: impl FnOnce(&mut Inner),
    ) {
        for waiter in self.transition(to, error, update).await {
            waiter(to);
        }
    }
}

pub struct ConnectionManager {
    shared: Arc<Shared>,
    backend: Option<Arc<dyn BackendRpc>>,
    poll_interval: Duration,
}

impl ConnectionManager {
    /// `backend` is `None` when the connection settings are incomplete.
    ///
    /// Drain the receiver or drop it: a full channel holds back checks
    /// until a state change fits.
    pub fn new(backend: Option<Arc<dyn BackendRpc>>) -> (Self, mpsc::Receiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let mgr = Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                events: tx,
            }),
            backend,
            poll_interval: SYNC_POLL_INTERVAL,
        };
        (mgr, rx)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    pub fn last_error(&self) -> Option<CheckError> {
        self.shared.lock().last_error.clone()
    }

    /// Starts a connection check unless one is already running.
    ///
    /// With `wait_for_result` the call returns once the check settles,
    /// otherwise it returns the current state right away.  `on_finished`
    /// fires with the settled state; it is dropped without being called when
    /// the configuration is incomplete.
    pub async fn begin_connection_check(
        &self,
        wait_for_result: bool,
        on_finished: Option<CheckCallback>,
    ) -> ConnectionState {
        let Some(backend) = self.backend.clone() else {
            self.shared
                .settle(ConnectionState::Failed, Some(CheckError::ConfigIncomplete), |_| {})
                .await;
            return ConnectionState::Failed;
        };

        let (reply, settled) = if wait_for_result {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let start_check = {
            let mut inner = self.shared.lock();
            inner.waiters.extend(on_finished);
            if let Some(tx) = reply {
                inner.waiters.push(Box::new(move |state| {
                    let _ = tx.send(state);
                }));
            }
            let idle = !inner.checking && inner.monitor.is_none();
            if idle {
                inner.checking = true;
            }
            idle
        };

        if start_check {
            self.shared
                .transition(ConnectionState::Connecting, None, |_| {})
                .await;
            let shared = Arc::clone(&self.shared);
            let interval = self.poll_interval;
            tokio::spawn(run_check(shared, backend, interval));
        } else {
            debug!("connection check already running; waiting for its result");
        }

        match settled {
            Some(rx) => rx.await.unwrap_or_else(|_| self.state()),
            None => self.state(),
        }
    }

    /// Stops the sync monitor, if one runs.  Queued checks settle as
    /// [`ConnectionState::Disconnected`].
    pub fn cancel_sync_monitor(&self) {
        if let Some(token) = self.shared.lock().monitor.as_ref() {
            token.cancel();
        }
    }
}

#[async_trait]
impl ConnectionGate for ConnectionManager {
    async fn ensure_ready(&self) -> Result<(), GateError> {
        if self.backend.is_none() {
            self.begin_connection_check(false, None).await;
            return Err(GateError::NotConfigured);
        }
        if self.state() == ConnectionState::Syncing {
            return Err(GateError::Syncing);
        }
        match self.begin_connection_check(true, None).await {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Syncing => Err(GateError::Syncing),
            _ => Err(GateError::Failed(
                self.last_error()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "backend not connected".to_string()),
            )),
        }
    }
}

async fn run_check(shared: Arc<Shared>, backend: Arc<dyn BackendRpc>, interval: Duration) {
    let result = match backend.is_synchronized().await {
        Ok(synced) => backend.get_info().await.map(|info| (synced, info)),
        Err(e) => Err(e),
    };

    match result {
        Ok((true, info)) => {
            debug!(protocol = info.protocol_version, blocks = info.blocks, "backend ready");
            shared
                .settle(ConnectionState::Connected, None, |inner| inner.checking = false)
                .await;
        }
        Ok((false, _)) => {
            let token = CancellationToken::new();
            // Checks that attached to this one learn it is syncing; later
            // ones wait for the monitor.
            let mut attached = Vec::new();
            shared
                .transition(ConnectionState::Syncing, None, |inner| {
                    inner.checking = false;
                    inner.monitor = Some(token.clone());
                    attached = std::mem::take(&mut inner.waiters);
                })
                .await;
            for waiter in attached {
                waiter(ConnectionState::Syncing);
            }
            monitor(shared, backend, interval, token).await;
        }
        Err(e) => {
            shared
                .settle(
                    ConnectionState::Failed,
                    Some(CheckError::Backend(e)),
                    |inner| inner.checking = false,
                )
                .await;
        }
    }
}

async fn monitor(
    shared: Arc<Shared>,
    backend: Arc<dyn BackendRpc>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        match backend.get_sync_status().await {
            Ok(status) => {
                debug!(
                    asset_id = status.asset_id,
                    asset = %status.asset_name,
                    "backend sync progress"
                );
                shared.emit_progress(ConnectionEvent::SyncProgress {
                    asset_id: status.asset_id,
                    asset_name: status.asset_name,
                });
            }
            Err(e) => debug!(error = %e, "sync status unavailable"),
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                shared
                    .settle(ConnectionState::Disconnected, None, |inner| inner.monitor = None)
                    .await;
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        match backend.is_synchronized().await {
            Ok(true) => {
                shared
                    .settle(ConnectionState::Connected, None, |inner| inner.monitor = None)
                    .await;
                return;
            }
            Ok(false) => {}
            Err(e) => {
                shared
                    .settle(
                        ConnectionState::Failed,
                        Some(CheckError::Backend(e)),
                        |inner| inner.monitor = None,
                    )
                    .await;
                return;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
