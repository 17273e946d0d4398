//! # Gossip Protocol Messages
//!
//! The message vocabulary spoken between nodes. Four tags:
//!
//! - **HELLO** — sender identity, chain height, protocol version, and the
//!   sender's known peer addresses. Receipt merges the advertised peers
//!   into the local directory.
//! - **GOSSIP** — a block announcement carrying the full block. This
//!   protocol does not separate "announce" from "fetch": it always pushes
//!   the whole block.
//! - **GETBLOCK** — a fetch request by block hash.
//! - **BLOCK** — a full block, used both as the GETBLOCK reply and as a
//!   gossip payload. The block field may be absent when the responder does
//!   not hold the requested hash; receivers must tolerate that.
//!
//! On the wire each message is a UTF-8 JSON object with a `type` tag and
//! only the fields relevant to that tag, framed by a u32 big-endian length
//! prefix (see [`super::codec`]). Messages are transient — they are never
//! persisted.

use serde::{Deserialize, Serialize};

use crate::ledger::Block;

/// The tagged union of all wire messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProtocolMessage {
    /// Introduction: who the sender is and which peers it knows.
    #[serde(rename = "HELLO")]
    Hello {
        /// Sender node id (its peer id string).
        #[serde(default)]
        id: String,
        /// Sender chain height.
        #[serde(default)]
        height: u64,
        /// Protocol version the sender speaks.
        #[serde(default)]
        version: String,
        /// Known peers, as `/p2p`-suffixed multiaddresses. Omitted when
        /// empty.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        peers: Vec<String>,
    },

    /// Push-style block announcement.
    #[serde(rename = "GOSSIP")]
    Gossip {
        /// Sender chain height after accepting the block.
        #[serde(default)]
        height: u64,
        /// The announced block, in full.
        block: Block,
    },

    /// Request for a block by hash.
    #[serde(rename = "GETBLOCK")]
    GetBlock {
        /// Hex-encoded hash of the wanted block.
        #[serde(rename = "blockHash", default)]
        block_hash: String,
    },

    /// A full block, as a GETBLOCK reply or gossip payload.
    #[serde(rename = "BLOCK")]
    Block {
        /// The block, absent when the responder does not hold it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        block: Option<Block>,
    },
}

impl ProtocolMessage {
    /// Builds a HELLO announcing `id` at `height`.
    pub fn hello(id: String, height: u64, version: String, peers: Vec<String>) -> Self {
        Self::Hello {
            id,
            height,
            version,
            peers,
        }
    }

    /// Builds a GOSSIP announcement for `block`.
    pub fn gossip(block: Block, height: u64) -> Self {
        Self::Gossip { height, block }
    }

    /// Builds a GETBLOCK request for `hash`.
    pub fn get_block(hash: &[u8; 32]) -> Self {
        Self::GetBlock {
            block_hash: hex::encode(hash),
        }
    }

    /// Builds a BLOCK reply; `None` means "not found".
    pub fn block(block: Option<Block>) -> Self {
        Self::Block { block }
    }

    /// The wire tag, for logs.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "HELLO",
            Self::Gossip { .. } => "GOSSIP",
            Self::GetBlock { .. } => "GETBLOCK",
            Self::Block { .. } => "BLOCK",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(msg: &ProtocolMessage) -> ProtocolMessage {
        let json = serde_json::to_string(msg).expect("serialize");
        serde_json::from_str(&json).expect("deserialize")
    }

    #[test]
    fn hello_roundtrip() {
        let msg = ProtocolMessage::hello(
            "12D3KooWExample".to_owned(),
            7,
            "1.0.0".to_owned(),
            vec!["/ip4/127.0.0.1/tcp/4001/p2p/12D3KooWPeer".to_owned()],
        );
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn hello_with_empty_peer_list_roundtrips_and_omits_the_field() {
        let msg =
            ProtocolMessage::hello("node-a".to_owned(), 1, "1.0.0".to_owned(), Vec::new());
        assert_eq!(roundtrip(&msg), msg);

        let json = serde_json::to_value(&msg).expect("serialize");
        assert!(json.get("peers").is_none());
    }

    #[test]
    fn gossip_roundtrip() {
        let msg = ProtocolMessage::gossip(Block::genesis(), 1);
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn getblock_roundtrip_uses_hex_hash() {
        let hash = [0xCD; 32];
        let msg = ProtocolMessage::get_block(&hash);
        assert_eq!(roundtrip(&msg), msg);

        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json["blockHash"], serde_json::json!("cd".repeat(32)));
    }

    #[test]
    fn block_reply_roundtrip() {
        let msg = ProtocolMessage::block(Some(Block::genesis()));
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn absent_block_roundtrips_and_omits_the_field() {
        let msg = ProtocolMessage::block(None);
        assert_eq!(roundtrip(&msg), msg);

        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json, serde_json::json!({ "type": "BLOCK" }));
    }

    #[test]
    fn omitted_scalar_fields_decode_to_defaults() {
        // Remote encoders drop empty fields; decoding must tolerate that.
        let msg: ProtocolMessage =
            serde_json::from_str(r#"{"type":"HELLO","id":"node-a"}"#).expect("deserialize");
        match msg {
            ProtocolMessage::Hello {
                id,
                height,
                version,
                peers,
            } => {
                assert_eq!(id, "node-a");
                assert_eq!(height, 0);
                assert!(version.is_empty());
                assert!(peers.is_empty());
            }
            other => panic!("expected HELLO, got {other:?}"),
        }
    }

    #[test]
    fn type_tag_is_spelled_out_on_the_wire() {
        let json =
            serde_json::to_value(ProtocolMessage::get_block(&[0u8; 32])).expect("serialize");
        assert_eq!(json["type"], serde_json::json!("GETBLOCK"));
    }
}
