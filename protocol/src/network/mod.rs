//! # Network Module
//!
//! The peer messaging layer: message vocabulary, wire codec, peer
//! directory, encrypted transport, and the node runtime that ties them to
//! the chain.
//!
//! ```text
//! protocol.rs — HELLO / GOSSIP / GETBLOCK / BLOCK message definitions
//! codec.rs    — length-prefixed JSON framing for protocol streams
//! peers.rs    — peer records, peer-file parsing, known/connected registry
//! service.rs  — libp2p transport: one encrypted one-shot stream per message
//! node.rs     — the decision loop: validates, mutates the chain, gossips
//! ```
//!
//! ## Design Decisions
//!
//! - Sessions are one-shot: every message travels on a fresh stream that
//!   closes right after the frame. There is no per-peer duplex channel to
//!   keep alive, back off, or reconcile — delivery is fire-and-forget and
//!   the chain's acceptance rules absorb duplicates.
//! - The peer directory is an explicit value behind one `RwLock`, owned by
//!   the transport service and shared by handle. No globals.
//! - Inbound and outbound traffic move through bounded queues (capacity
//!   32). A slow peer stalls its own stream task, never the decision loop.

pub mod codec;
pub mod node;
pub mod peers;
pub mod protocol;
pub mod service;

pub use codec::{CodecError, MessageCodec};
pub use node::{Node, NodeError, NodeHandle, NodeStatus};
pub use peers::{LocalIdentity, PeerDirectory, PeerError, PeerFileEntry, PeerRecord};
pub use protocol::ProtocolMessage;
pub use service::{Envelope, Outbound, P2pService, ServiceError};
