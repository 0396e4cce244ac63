//! TOML-based configuration persistence for the operator toolkit.
//!
//! `config.toml` lives in the per-user config directory:
//! - Windows:  `%APPDATA%\MnodeOperator\config.toml`
//! - Linux:    `~/.config/mnode-operator/config.toml`
//! - macOS:    `~/Library/Application Support/MnodeOperator/config.toml`
//!
//! Example:
//!
//! ```toml
//! [general]
//! log_level = "info"
//! network = "mainnet"
//!
//! [backend]
//! host = "127.0.0.1"
//! port = 9998
//! username = "rpcuser"
//! password = "rpcpassword"
//!
//! [[masternodes]]
//! name = "MN1"
//! ip = "203.0.113.5"
//! port = 9999
//! operator_key = "7r..."
//! collateral_address = "Xq..."
//! collateral_path = "44'/5'/0'/0/0"
//! collateral_txid = "5b8e..."
//! collateral_index = 1
//! ```
//!
//! Fields annotated with `#[serde(default = "some_fn")]` take the value of
//! `some_fn()` when absent, so older or hand-written files keep loading.

use std::path::{Path, PathBuf};

use mnode_core::{MasternodeIdentity, Network};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to locate, read, parse or write the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither the platform variable nor `HOME` is set.
    #[error("no per-user config directory on this system")]
    NoPlatformConfigDir,

    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot encode config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Everything `config.toml` holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub masternodes: Vec<MasternodeIdentity>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// Default `EnvFilter` directive, e.g. `"info"` or `"mnode_operator=debug"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_network")]
    pub network: Network,
    /// Directory for the derivation cache files.  Defaults to the config
    /// directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

/// Connection settings of the backend daemon's JSON-RPC interface.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_rpc_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("use_tls", &self.use_tls)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_network() -> Network {
    Network::Mainnet
}
fn default_true() -> bool {
    true
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_rpc_port() -> u16 {
    9998
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            network: default_network(),
            cache_dir: None,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            host: default_host(),
            port: default_rpc_port(),
            username: String::new(),
            password: String::new(),
            use_tls: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Whether enough backend settings are present to attempt a connection.
    pub fn is_backend_complete(&self) -> bool {
        let b = &self.backend;
        b.enabled
            && !b.host.trim().is_empty()
            && b.port != 0
            && !b.username.trim().is_empty()
            && !b.password.is_empty()
    }

    pub fn masternode(&self, name: &str) -> Option<&MasternodeIdentity> {
        self.masternodes.iter().find(|mn| mn.name == name)
    }

    /// Configured cache directory, or the config directory.
    pub fn cache_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.general.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => config_dir(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Per-user directory holding `config.toml` and the address caches.
///
/// # Errors
///
/// [`ConfigError::NoPlatformConfigDir`] when the environment names no base
/// directory.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not yet exist.
///
/// # Errors
///
/// A missing file is not an error.  Other read failures give
/// [`ConfigError::Io`]; malformed TOML gives [`ConfigError::Parse`].
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to `path`, creating the parent directory if needed.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("MnodeOperator"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("mnode-operator"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("MnodeOperator")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
