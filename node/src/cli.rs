//! # CLI Interface
//!
//! Command-line argument structure for `selo-node`, via `clap` derive.
//! Three subcommands: `run`, `keygen`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Selo notarization node.
///
/// A peer-to-peer node that maintains a proof-of-work chain of document
/// notarization records, gossips new blocks to its peers, and serves the
/// HTTP API for submitting and verifying document hashes.
#[derive(Parser, Debug)]
#[command(
    name = "selo-node",
    about = "Selo notarization node",
    version,
    propagate_version = true
)]
pub struct SeloNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the Selo node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Generate a fresh peer-file entry (keypair, peer id, address).
    Keygen(KeygenArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the peer configuration file: a JSON array of
    /// `{id, privKey, address}` entries.
    #[arg(long, env = "SELO_PEERS_FILE", default_value = "peers.json")]
    pub peers_file: PathBuf,

    /// Index of this node's own entry in the peers file. Every other entry
    /// becomes the initial static peer set.
    #[arg(long, short = 'n', env = "SELO_NODE_INDEX", default_value_t = 0)]
    pub node_index: usize,

    /// Host the HTTP listeners bind to.
    #[arg(long, env = "SELO_API_HOST", default_value = "0.0.0.0")]
    pub api_host: String,

    /// Port for the HTTP API.
    #[arg(long, env = "SELO_API_PORT", default_value_t = selo_protocol::config::DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "SELO_METRICS_PORT", default_value_t = selo_protocol::config::DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Directory for the block store. Each node index gets its own
    /// subdirectory, so several local nodes can share the default.
    #[arg(long, short = 'd', env = "SELO_DATA_DIR", default_value = "./tmp/blocks")]
    pub data_dir: PathBuf,

    /// Log output format: pretty or json.
    #[arg(long, env = "SELO_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `keygen` subcommand.
#[derive(Parser, Debug)]
pub struct KeygenArgs {
    /// Listen multiaddress to embed in the generated entry.
    #[arg(long, default_value = "/ip4/127.0.0.1/tcp/4001")]
    pub address: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        SeloNodeCli::command().debug_assert();
    }
}
