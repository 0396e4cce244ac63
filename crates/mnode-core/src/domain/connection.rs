//! Backend connection states.

use std::fmt;

/// Lifecycle of the connection to the backend daemon.
///
/// Owned exclusively by the connection manager.  Everyone else observes
/// transitions through events and never sets the state directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No check has run yet, or the last sync monitor was cancelled.
    #[default]
    Disconnected,
    /// A connectivity check is in flight.
    Connecting,
    /// The backend answered and reports itself synchronized.
    Connected,
    /// The backend answered but is still catching up; a monitor is polling.
    Syncing,
    /// The configuration is incomplete or the last check failed.
    Failed,
}

impl ConnectionState {
    /// Whether broadcast and status refresh are allowed.
    pub fn is_usable(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Syncing => "syncing",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}
