// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Selo Node
//!
//! Entry point for the `selo-node` binary. Parses CLI arguments, loads the
//! peer file, opens the chain store, wires the P2P transport to the node
//! runtime, and serves the HTTP API and metrics endpoints.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — start the node
//! - `keygen`  — generate a peer-file entry for a new node
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use selo_protocol::config as protocol_config;
use selo_protocol::ledger::{Chain, ChainStore};
use selo_protocol::network::node::Node;
use selo_protocol::network::peers::{PeerDirectory, PeerFileEntry};
use selo_protocol::network::service::P2pService;

use cli::{Commands, SeloNodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = SeloNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Keygen(args) => keygen(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the full node: chain, P2P transport, node runtime, HTTP API and
/// metrics listener.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "selo_node=info,selo_protocol=info,tower_http=info",
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        peers_file = %args.peers_file.display(),
        node_index = args.node_index,
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        "starting selo-node"
    );

    // --- Identity and static peer set ---
    let entries = load_peers(&args.peers_file)?;
    if args.node_index >= entries.len() {
        bail!(
            "node index {} out of range: peers file lists {} entries",
            args.node_index,
            entries.len()
        );
    }
    let local_entry = &entries[args.node_index];
    let identity = local_entry
        .to_identity()
        .with_context(|| format!("invalid identity entry {}", args.node_index))?;
    tracing::info!(id = %local_entry.id, address = %local_entry.address, "local identity loaded");

    let static_peers = entries
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != args.node_index)
        .map(|(idx, entry)| {
            entry
                .to_record()
                .with_context(|| format!("invalid peer entry {idx}"))
        })
        .collect::<Result<Vec<_>>>()?;

    // --- Chain store ---
    // An unreadable store is fatal here, and only here: there is nothing
    // useful to run without it.
    let data_dir = args.data_dir.join(format!("node-{}", args.node_index));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
    let store = ChainStore::open(&data_dir)
        .with_context(|| format!("failed to open chain store at {}", data_dir.display()))?;
    let chain = Chain::open(store).context("failed to open chain")?;

    // --- Wiring ---
    let node_metrics = Arc::new(NodeMetrics::new());
    let directory = Arc::new(PeerDirectory::new());
    let cancel = CancellationToken::new();
    let (inbound_tx, inbound_rx) = mpsc::channel(protocol_config::CHANNEL_CAPACITY);
    let (outbound_tx, outbound_rx) = mpsc::channel(protocol_config::CHANNEL_CAPACITY);

    let service = P2pService::spawn(
        identity.keypair,
        identity.listen_addr.clone(),
        Arc::clone(&directory),
        inbound_tx,
        outbound_rx,
        cancel.clone(),
    )
    .context("failed to start p2p service")?;

    for record in static_peers {
        service.connect(record).await;
    }

    let (node, handle) = Node::new(
        chain,
        local_entry.id.clone(),
        Arc::clone(&directory),
        inbound_rx,
        outbound_tx,
        cancel.clone(),
    );
    let node_task = tokio::spawn(node.run());

    // --- Metrics sampler ---
    let sampler_handle = handle.clone();
    let sampler_metrics = Arc::clone(&node_metrics);
    let sampler_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            tokio::select! {
                _ = sampler_cancel.cancelled() => return,
                _ = interval.tick() => {
                    if let Ok(status) = sampler_handle.status().await {
                        sampler_metrics.chain_height.set(status.height as i64);
                        sampler_metrics.connected_peers.set(status.connected_peers as i64);
                        sampler_metrics.known_peers.set(status.known_peers as i64);
                    }
                }
            }
        }
    });

    // --- HTTP API ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_owned(),
        node: handle,
        metrics: Arc::clone(&node_metrics),
    };
    let api_router = api::create_router(app_state);
    let api_addr = format!("{}:{}", args.api_host, args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {api_addr}"))?;
    tracing::info!("API server listening on {api_addr}");

    // --- Metrics endpoint ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("{}:{}", args.api_host, args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {metrics_addr}"))?;
    tracing::info!("Metrics server listening on {metrics_addr}");

    // --- Serve until shutdown ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(err) = res {
                tracing::error!("API server error: {err}");
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(err) = res {
                tracing::error!("Metrics server error: {err}");
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, stopping");
        }
    }

    cancel.cancel();
    let _ = node_task.await;
    tracing::info!("selo-node stopped");
    Ok(())
}

/// Reads and parses the peer configuration file.
fn load_peers(path: &Path) -> Result<Vec<PeerFileEntry>> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read peers file {}", path.display()))?;
    let entries: Vec<PeerFileEntry> = serde_json::from_slice(&data)
        .with_context(|| format!("malformed peers file {}", path.display()))?;
    if entries.is_empty() {
        bail!("peers file {} lists no entries", path.display());
    }
    Ok(entries)
}

/// Generates a fresh peer-file entry and prints it as JSON.
fn keygen(args: cli::KeygenArgs) -> Result<()> {
    args.address
        .parse::<libp2p::Multiaddr>()
        .context("invalid multiaddress")?;

    let keypair = libp2p::identity::Keypair::generate_ed25519();
    let entry = PeerFileEntry {
        id: libp2p::PeerId::from(keypair.public()).to_string(),
        priv_key: BASE64.encode(
            keypair
                .to_protobuf_encoding()
                .context("failed to encode keypair")?,
        ),
        address: args.address,
    };

    println!("{}", serde_json::to_string_pretty(&entry)?);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("selo-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol  {}", protocol_config::PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
