//! # Node Runtime
//!
//! The single decision point of a Selo node. One loop consumes the inbound
//! message queue and the API command queue, applies the chain's acceptance
//! policy, mutates the chain, and decides what to re-broadcast.
//!
//! Because every write — gossiped block or local submission — funnels
//! through this one consumer, the chain needs no locking: the loop is the
//! serialization point. Inbound messages are processed strictly in arrival
//! order; no ordering is guaranteed between peers, and two peers racing to
//! extend the same tip will have the loser silently dropped by the
//! strict-tip rule. That is a deliberate trade-off, not a bug.
//!
//! ## Acceptance policy
//!
//! Applied uniformly to GOSSIP and BLOCK payloads:
//!
//! 1. drop blocks that fail proof-of-work validation;
//! 2. drop blocks whose `prev_hash` is not exactly the current tip —
//!    no forks, no reorgs, no catch-up;
//! 3. otherwise insert and enqueue exactly one GOSSIP re-broadcast.
//!
//! Re-delivery of an accepted block is harmless: the tip has moved, so the
//! duplicate dies at step 2.

use std::sync::Arc;

use libp2p::PeerId;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config;
use crate::ledger::{pow, Block, BlockRecord, Chain, ChainError};
use crate::network::peers::PeerDirectory;
use crate::network::protocol::ProtocolMessage;
use crate::network::service::{Envelope, Outbound};

// ---------------------------------------------------------------------------
// Errors & status
// ---------------------------------------------------------------------------

/// Errors surfaced through the node API.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Proof-of-work or storage failure underneath an API call. Storage
    /// errors indicate local corruption and are not retried.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The runtime has stopped; no further commands are served.
    #[error("node runtime is shut down")]
    Shutdown,
}

/// Snapshot of runtime state, served by the status endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct NodeStatus {
    pub height: u64,
    pub known_peers: usize,
    pub connected_peers: usize,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

enum NodeCommand {
    AddBlock {
        record: BlockRecord,
        reply: oneshot::Sender<Result<Block, NodeError>>,
    },
    ListBlocks {
        reply: oneshot::Sender<Result<Vec<Block>, NodeError>>,
    },
    ContainsBlock {
        hash: [u8; 32],
        reply: oneshot::Sender<Result<bool, NodeError>>,
    },
    ContainsRecord {
        content_hash: Vec<u8>,
        reply: oneshot::Sender<Result<bool, NodeError>>,
    },
    Status {
        reply: oneshot::Sender<NodeStatus>,
    },
}

// ---------------------------------------------------------------------------
// NodeHandle
// ---------------------------------------------------------------------------

/// The narrow API the HTTP layer is allowed to call. Clonable; every call
/// is a command posted into the decision loop with a oneshot reply, so
/// concurrent callers serialize through the single consumer.
#[derive(Clone)]
pub struct NodeHandle {
    commands: mpsc::Sender<NodeCommand>,
}

impl NodeHandle {
    /// Notarizes `record`: builds a proof-of-work block on the current
    /// tip, inserts it, and announces it to the network exactly once.
    pub async fn add_block(&self, record: BlockRecord) -> Result<Block, NodeError> {
        self.request(|reply| NodeCommand::AddBlock { record, reply })
            .await?
    }

    /// Every block, tip first, genesis last.
    pub async fn list_blocks(&self) -> Result<Vec<Block>, NodeError> {
        self.request(|reply| NodeCommand::ListBlocks { reply })
            .await?
    }

    /// Whether a block with this hash is on the chain.
    pub async fn contains_block(&self, hash: [u8; 32]) -> Result<bool, NodeError> {
        self.request(|reply| NodeCommand::ContainsBlock { hash, reply })
            .await?
    }

    /// Whether this content hash has been notarized on the chain.
    pub async fn contains_record(&self, content_hash: Vec<u8>) -> Result<bool, NodeError> {
        self.request(|reply| NodeCommand::ContainsRecord {
            content_hash,
            reply,
        })
        .await?
    }

    /// Current height and peer counts.
    pub async fn status(&self) -> Result<NodeStatus, NodeError> {
        self.request(|reply| NodeCommand::Status { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> NodeCommand,
    ) -> Result<T, NodeError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| NodeError::Shutdown)?;
        rx.await.map_err(|_| NodeError::Shutdown)
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// The runtime that owns the chain.
pub struct Node {
    chain: Chain,
    id: String,
    version: String,
    directory: Arc<PeerDirectory>,
    inbound: mpsc::Receiver<Envelope>,
    outbound: mpsc::Sender<Outbound>,
    commands: mpsc::Receiver<NodeCommand>,
    cancel: CancellationToken,
}

impl Node {
    /// Wires a runtime around `chain`. The returned handle is the only way
    /// to reach the chain from other tasks.
    pub fn new(
        chain: Chain,
        id: String,
        directory: Arc<PeerDirectory>,
        inbound: mpsc::Receiver<Envelope>,
        outbound: mpsc::Sender<Outbound>,
        cancel: CancellationToken,
    ) -> (Self, NodeHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(config::CHANNEL_CAPACITY);
        let node = Self {
            chain,
            id,
            version: config::PROTOCOL_VERSION.to_owned(),
            directory,
            inbound,
            outbound,
            commands: cmd_rx,
            cancel,
        };
        (node, NodeHandle { commands: cmd_tx })
    }

    /// Announces a HELLO, then drives the decision loop until cancellation
    /// or queue closure. The loop blocks only on its queues; stream I/O
    /// runs on the transport's own tasks.
    pub async fn run(mut self) {
        let hello = ProtocolMessage::hello(
            self.id.clone(),
            self.chain.height(),
            self.version.clone(),
            self.directory.advertised_addrs(),
        );
        if self.outbound.send(Outbound::Broadcast(hello)).await.is_err() {
            warn!("outbound queue closed before startup");
        }
        info!(id = %self.id, height = self.chain.height(), "node runtime started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("node runtime stopping");
                    return;
                }
                envelope = self.inbound.recv() => {
                    let Some(envelope) = envelope else { return };
                    self.handle_message(envelope).await;
                }
                command = self.commands.recv() => {
                    let Some(command) = command else { return };
                    self.handle_command(command).await;
                }
            }
        }
    }

    async fn handle_message(&mut self, envelope: Envelope) {
        let Envelope { from, msg } = envelope;
        match msg {
            ProtocolMessage::Gossip { block, .. } => self.accept_block(block).await,
            ProtocolMessage::Block { block: Some(block) } => self.accept_block(block).await,
            ProtocolMessage::Block { block: None } => {
                debug!(peer = %from, "peer had no block for us");
            }
            ProtocolMessage::GetBlock { block_hash } => {
                self.serve_block(from, &block_hash).await;
            }
            // HELLO is absorbed by the transport layer's peer merge.
            ProtocolMessage::Hello { .. } => {}
        }
    }

    /// The uniform acceptance policy for gossiped and fetched blocks.
    /// Rejections are silent — this protocol has no NACK.
    async fn accept_block(&mut self, block: Block) {
        if !pow::validate(&block) {
            debug!(hash = %block.hash_hex(), "rejecting block with invalid proof-of-work");
            return;
        }
        if block.prev_hash != self.chain.tip() {
            debug!(
                hash = %block.hash_hex(),
                prev = %block.prev_hash_hex(),
                "rejecting block that does not extend the tip"
            );
            return;
        }

        match self.chain.insert_block(block.clone()) {
            Ok(()) => {
                info!(
                    hash = %block.hash_hex(),
                    height = self.chain.height(),
                    "block accepted from network"
                );
                self.gossip(block).await;
            }
            Err(err) => warn!(%err, "failed to store accepted block"),
        }
    }

    /// Replies to a GETBLOCK with the block, or with an empty BLOCK when
    /// we do not hold the hash. Addressed to the requester only.
    async fn serve_block(&mut self, from: PeerId, block_hash: &str) {
        let Some(hash) = decode_hash(block_hash) else {
            debug!(peer = %from, "ignoring GETBLOCK with malformed hash");
            return;
        };

        let block = match self.chain.get_block(&hash) {
            Ok(block) => block,
            Err(err) => {
                warn!(%err, "block lookup failed");
                None
            }
        };

        let reply = Outbound::Direct {
            to: from,
            msg: ProtocolMessage::block(block),
        };
        if self.outbound.send(reply).await.is_err() {
            warn!("outbound queue closed, dropping GETBLOCK reply");
        }
    }

    async fn handle_command(&mut self, command: NodeCommand) {
        match command {
            NodeCommand::AddBlock { record, reply } => {
                let _ = reply.send(self.add_block(record).await);
            }
            NodeCommand::ListBlocks { reply } => {
                let _ = reply.send(self.chain.list_blocks().map_err(NodeError::from));
            }
            NodeCommand::ContainsBlock { hash, reply } => {
                let _ = reply.send(self.chain.contains_block(&hash).map_err(NodeError::from));
            }
            NodeCommand::ContainsRecord { content_hash, reply } => {
                let _ = reply.send(
                    self.chain
                        .contains_record(&content_hash)
                        .map_err(NodeError::from),
                );
            }
            NodeCommand::Status { reply } => {
                let _ = reply.send(NodeStatus {
                    height: self.chain.height(),
                    known_peers: self.directory.known_count(),
                    connected_peers: self.directory.connected_count(),
                });
            }
        }
    }

    /// The locally-originated write path: solve, insert, announce once.
    async fn add_block(&mut self, record: BlockRecord) -> Result<Block, NodeError> {
        let block = self.chain.create_block(record)?;
        self.chain.insert_block(block.clone())?;
        info!(
            hash = %block.hash_hex(),
            height = self.chain.height(),
            "block notarized"
        );
        self.gossip(block.clone()).await;
        Ok(block)
    }

    async fn gossip(&self, block: Block) {
        let msg = ProtocolMessage::gossip(block, self.chain.height());
        if self.outbound.send(Outbound::Broadcast(msg)).await.is_err() {
            warn!("outbound queue closed, block not announced");
        }
    }
}

fn decode_hash(hex_str: &str) -> Option<[u8; 32]> {
    let bytes = hex::decode(hex_str).ok()?;
    bytes.try_into().ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
