//! # Peer Records & Directory
//!
//! Peer identity handling: parsing the operator-provided peer file,
//! splitting `/p2p`-suffixed multiaddresses from HELLO messages, and the
//! thread-safe registry of known and connected peers.
//!
//! Two disjoint peer sets exist. "Known" holds every peer the node has
//! ever heard of — static configuration, HELLO merges, explicit connects.
//! "Connected" is the subset with a live transport session. Connected
//! implies known, never the reverse. Entries are not expired in this
//! design.

use std::collections::{HashMap, HashSet};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use libp2p::identity::Keypair;
use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while parsing peer configuration.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("invalid peer id {id}: {reason}")]
    InvalidPeerId { id: String, reason: String },

    #[error("invalid multiaddress {addr}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("invalid private key for peer {id}: {reason}")]
    InvalidKey { id: String, reason: String },
}

// ---------------------------------------------------------------------------
// Peer file entries
// ---------------------------------------------------------------------------

/// One entry of the peer configuration file: a JSON array of these,
/// produced once by an operator. The node's own identity is selected by
/// index; every other entry becomes the initial static peer set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerFileEntry {
    /// Peer id string (derived from the public key).
    pub id: String,
    /// Base64-encoded protobuf keypair. Only meaningful for the entry that
    /// is selected as the local node.
    #[serde(rename = "privKey")]
    pub priv_key: String,
    /// Listen multiaddress, without the `/p2p` suffix.
    pub address: String,
}

impl PeerFileEntry {
    /// Parses this entry as a remote peer: id + dial address.
    pub fn to_record(&self) -> Result<PeerRecord, PeerError> {
        let id = self.id.parse::<PeerId>().map_err(|e| PeerError::InvalidPeerId {
            id: self.id.clone(),
            reason: e.to_string(),
        })?;
        let addr = self.parse_addr()?;
        Ok(PeerRecord { id, addr })
    }

    /// Parses this entry as the local node: decodes the private key and
    /// returns the keypair together with the listen address.
    pub fn to_identity(&self) -> Result<LocalIdentity, PeerError> {
        let raw = BASE64
            .decode(&self.priv_key)
            .map_err(|e| PeerError::InvalidKey {
                id: self.id.clone(),
                reason: e.to_string(),
            })?;
        let keypair =
            Keypair::from_protobuf_encoding(&raw).map_err(|e| PeerError::InvalidKey {
                id: self.id.clone(),
                reason: e.to_string(),
            })?;
        let listen_addr = self.parse_addr()?;
        Ok(LocalIdentity {
            keypair,
            listen_addr,
        })
    }

    fn parse_addr(&self) -> Result<Multiaddr, PeerError> {
        self.address
            .parse::<Multiaddr>()
            .map_err(|e| PeerError::InvalidAddress {
                addr: self.address.clone(),
                reason: e.to_string(),
            })
    }
}

/// Identity and reachable address of a remote peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerRecord {
    pub id: PeerId,
    pub addr: Multiaddr,
}

impl PeerRecord {
    /// The full dialable address including the `/p2p` peer-id suffix, as
    /// advertised in HELLO messages.
    pub fn p2p_addr(&self) -> Multiaddr {
        self.addr.clone().with(Protocol::P2p(self.id))
    }
}

/// The local node's keypair and listen address.
pub struct LocalIdentity {
    pub keypair: Keypair,
    pub listen_addr: Multiaddr,
}

/// Splits a `/p2p`-suffixed multiaddress string into peer id and dial
/// address. HELLO peer lists arrive in this form.
pub fn split_p2p_addr(addr: &str) -> Result<PeerRecord, PeerError> {
    let mut parsed: Multiaddr = addr.parse().map_err(|e: libp2p::multiaddr::Error| {
        PeerError::InvalidAddress {
            addr: addr.to_owned(),
            reason: e.to_string(),
        }
    })?;

    match parsed.pop() {
        Some(Protocol::P2p(id)) => Ok(PeerRecord { id, addr: parsed }),
        _ => Err(PeerError::InvalidAddress {
            addr: addr.to_owned(),
            reason: "missing /p2p peer id suffix".to_owned(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Peer Directory
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DirectoryInner {
    /// Every peer ever heard of, with its dial address when one is known.
    /// Inbound-only peers may have no address.
    known: HashMap<PeerId, Option<Multiaddr>>,
    /// Peers with a live session. Always a subset of `known`.
    connected: HashSet<PeerId>,
}

/// Thread-safe registry of peer endpoints, owned by the transport service
/// and shared by handle.
///
/// Mutated from many concurrent tasks (dial callbacks, HELLO merges) and
/// read on every broadcast, hence the reader/writer lock.
#[derive(Default)]
pub struct PeerDirectory {
    inner: RwLock<DirectoryInner>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a peer as known. Returns `false` if it already was; a
    /// previously address-less entry gains the address.
    pub fn add_known(&self, id: PeerId, addr: Option<Multiaddr>) -> bool {
        let mut inner = self.inner.write();
        match inner.known.entry(id) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                if entry.get().is_none() {
                    *entry.get_mut() = addr;
                }
                false
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(addr);
                true
            }
        }
    }

    /// Moves a peer into the connected set, registering it as known first
    /// if necessary.
    pub fn mark_connected(&self, id: PeerId) {
        let mut inner = self.inner.write();
        inner.known.entry(id).or_insert(None);
        inner.connected.insert(id);
    }

    /// Removes a peer from the connected set. It stays known.
    pub fn mark_disconnected(&self, id: &PeerId) {
        self.inner.write().connected.remove(id);
    }

    pub fn is_known(&self, id: &PeerId) -> bool {
        self.inner.read().known.contains_key(id)
    }

    pub fn is_connected(&self, id: &PeerId) -> bool {
        self.inner.read().connected.contains(id)
    }

    /// Snapshot of the connected peer ids — the broadcast fan-out set.
    pub fn connected(&self) -> Vec<PeerId> {
        self.inner.read().connected.iter().copied().collect()
    }

    pub fn known_count(&self) -> usize {
        self.inner.read().known.len()
    }

    pub fn connected_count(&self) -> usize {
        self.inner.read().connected.len()
    }

    /// `/p2p`-suffixed addresses of every known peer with a dial address —
    /// the peer list advertised in HELLO messages.
    pub fn advertised_addrs(&self) -> Vec<String> {
        self.inner
            .read()
            .known
            .iter()
            .filter_map(|(id, addr)| {
                addr.as_ref()
                    .map(|addr| addr.clone().with(Protocol::P2p(*id)).to_string())
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
