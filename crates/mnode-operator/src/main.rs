//! mnode-operator command-line entry point.
//!
//! Backend-only actions of the toolkit.  Starting a masternode needs a
//! hardware wallet driver and is driven by the front end through the library.
//!
//! # Usage
//!
//! ```text
//! mnode-operator [--config <PATH>] <COMMAND>
//!
//! Commands:
//!   check            Check the backend; --wait follows synchronization
//!   list             Show the configured masternodes
//!   status <NAME>    Ask the network how it sees a masternode
//!   verify <NAME>    Check a masternode's collateral against the address index
//!   genkey           Print a fresh operator key (WIF)
//!   import <FILE>    Merge a masternode.conf into the configuration
//! ```
//!
//! The log level comes from `[general] log_level` and is overridden by
//! `RUST_LOG`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use mnode_core::ConnectionState;
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mnode_operator::application::backend::{BackendRpc, ConnectionGate};
use mnode_operator::application::manage_identities::{
    generate_operator_key, import_masternode_conf,
};
use mnode_operator::application::verify_collateral::{CollateralCheck, CollateralVerifier};
use mnode_operator::infrastructure::network::connection_manager::{
    ConnectionEvent, ConnectionManager,
};
use mnode_operator::infrastructure::network::rpc_client::HttpRpcClient;
use mnode_operator::infrastructure::storage::config::{
    config_file_path, load_config_from, save_config_to, AppConfig,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Masternode operator toolkit.
#[derive(Debug, Parser)]
#[command(name = "mnode-operator", about = "Masternode operator toolkit", version)]
struct Cli {
    /// Configuration file.  Defaults to `config.toml` in the platform config
    /// directory.
    #[arg(long, global = true, env = "MNODE_OPERATOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check the backend connection.
    Check {
        /// Keep following a synchronizing backend until it is ready.
        #[arg(long)]
        wait: bool,
    },
    /// Show the configured masternodes.
    List,
    /// Show the network's entry for a masternode.
    Status { name: String },
    /// Check a masternode's collateral output.
    Verify { name: String },
    /// Generate a new operator private key.
    Genkey,
    /// Import entries from a masternode.conf file.
    Import {
        file: PathBuf,
        /// Replace entries whose name already exists.
        #[arg(long)]
        overwrite: bool,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => config_file_path().context("locating the configuration file")?,
    };
    let mut config = load_config_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
        )
        .init();

    match cli.command {
        Command::Check { wait } => check(&config, wait).await,
        Command::List => {
            list(&config);
            Ok(())
        }
        Command::Status { name } => status(&config, &name).await,
        Command::Verify { name } => verify(&config, &name).await,
        Command::Genkey => {
            println!("{}", generate_operator_key(config.general.network));
            Ok(())
        }
        Command::Import { file, overwrite } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let summary = import_masternode_conf(&mut config.masternodes, &text, |_| overwrite);
            save_config_to(&config, &config_path)
                .with_context(|| format!("saving {}", config_path.display()))?;
            println!(
                "imported {} masternode(s), skipped {}",
                summary.imported, summary.skipped
            );
            Ok(())
        }
    }
}

fn backend(config: &AppConfig) -> anyhow::Result<Option<Arc<dyn BackendRpc>>> {
    if !config.is_backend_complete() {
        return Ok(None);
    }
    let client = HttpRpcClient::new(&config.backend).context("creating the RPC client")?;
    info!(url = client.url(), "using backend");
    Ok(Some(Arc::new(client)))
}

/// The backend, once the connection gate reports it ready.
async fn ready_backend(config: &AppConfig) -> anyhow::Result<Arc<dyn BackendRpc>> {
    let rpc = backend(config)?;
    // Nothing reads the events here; dropping the receiver discards them.
    let (manager, _) = ConnectionManager::new(rpc.clone());
    manager.ensure_ready().await.context("backend not ready")?;
    rpc.context("backend connection is not configured")
}

async fn check(config: &AppConfig, wait: bool) -> anyhow::Result<()> {
    let (manager, mut events) = ConnectionManager::new(backend(config)?);

    let mut state = manager.begin_connection_check(true, None).await;
    if state == ConnectionState::Syncing && wait {
        let (tx, mut rx) = oneshot::channel();
        manager
            .begin_connection_check(
                false,
                Some(Box::new(move |settled| {
                    let _ = tx.send(settled);
                })),
            )
            .await;
        state = loop {
            tokio::select! {
                settled = &mut rx => break settled.unwrap_or(ConnectionState::Failed),
                Some(event) = events.recv() => {
                    if let ConnectionEvent::SyncProgress { asset_id, asset_name } = event {
                        println!("syncing: {asset_name} ({asset_id})");
                    }
                }
            }
        };
    }

    println!("backend: {state}");
    if let Some(err) = manager.last_error() {
        if state != ConnectionState::Connected {
            bail!(err);
        }
    }
    Ok(())
}

fn list(config: &AppConfig) {
    if config.masternodes.is_empty() {
        println!("no masternodes configured");
        return;
    }
    for mn in &config.masternodes {
        let address = or_dash(&mn.collateral_address);
        let path = or_dash(&mn.collateral_path);
        println!(
            "{:<12} {}:{:<6} {:<36} {}",
            mn.name, mn.ip, mn.port, address, path
        );
    }
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

async fn status(config: &AppConfig, name: &str) -> anyhow::Result<()> {
    let mn = config
        .masternode(name)
        .with_context(|| format!("no masternode named {name:?}"))?;
    let rpc = ready_backend(config).await?;
    let entries = rpc
        .get_masternode_list("full", &mn.collateral_outpoint())
        .await
        .context("querying the masternode list")?;
    match entries.first() {
        Some(entry) => println!(
            "{}: {} (protocol {}, last seen {}, active {}s, payee {})",
            mn.name,
            entry.status,
            entry.protocol,
            entry.last_seen,
            entry.active_seconds,
            entry.payee
        ),
        None => println!("{}: not in the masternode list", mn.name),
    }
    Ok(())
}

async fn verify(config: &AppConfig, name: &str) -> anyhow::Result<()> {
    let mn = config
        .masternode(name)
        .with_context(|| format!("no masternode named {name:?}"))?;
    if mn.collateral_address.trim().is_empty() {
        bail!("{name} has no collateral address configured");
    }
    let verifier = CollateralVerifier::new(ready_backend(config).await?);
    let check = verifier
        .verify(&mn.collateral_address, &mn.collateral_txid, mn.collateral_index)
        .await
        .context("looking up the collateral")?;
    match check {
        CollateralCheck::Verified(proof) => match proof.advisory(&mn.collateral_address) {
            Some(advisory) => println!("{}: {advisory}", mn.name),
            None => println!("{}: collateral verified", mn.name),
        },
        CollateralCheck::IndexUnavailable(reason) => {
            println!("{}: cannot verify collateral ({reason})", mn.name)
        }
    }
    Ok(())
}
