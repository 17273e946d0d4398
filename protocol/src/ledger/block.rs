//! # Block Structure
//!
//! A block is one notarization event plus the chain linkage that makes it
//! tamper-evident. Blocks are immutable once created: the hash is the
//! output of the proof-of-work search over the other fields, so any
//! mutation is detectable by re-running [`pow::validate`].
//!
//! ## Block Layout
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │  hash: [u8; 32]      (PoW digest)          │
//! │  prev_hash: [u8; 32] (all zeros = genesis) │
//! │  nonce: u64          (PoW witness)         │
//! │  timestamp: i64      (ms since epoch)      │
//! ├────────────────────────────────────────────┤
//! │  data: BlockRecord                         │
//! │  ├── content_hash: Vec<u8>                 │
//! │  ├── document_id / notary_id / user_id     │
//! │  └── cnpj                                  │
//! └────────────────────────────────────────────┘
//! ```
//!
//! The timestamp is informational only — it is not part of the puzzle
//! input, so clock skew between nodes cannot invalidate a block.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config;
use crate::ledger::pow::{self, PowError};

/// The all-zeros predecessor hash that marks the genesis block.
pub const GENESIS_PREV_HASH: [u8; 32] = [0u8; 32];

// ---------------------------------------------------------------------------
// BlockRecord
// ---------------------------------------------------------------------------

/// The notarization payload: a document digest and the identifiers of the
/// parties that registered it.
///
/// The content hash is opaque bytes supplied by the caller — Selo never
/// interprets it, it only proves the bytes were registered. JSON field
/// names are part of the wire and API contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Digest of the notarized document, as provided by the submitter.
    #[serde(rename = "hash", with = "hex::serde")]
    pub content_hash: Vec<u8>,
    /// Identifier of the notarized document.
    #[serde(rename = "documentId")]
    pub document_id: String,
    /// Identifier of the notary that attested the document.
    #[serde(rename = "notaryId")]
    pub notary_id: String,
    /// Identifier of the user that submitted the document.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Tenant/organization identifier (CNPJ company registry number).
    pub cnpj: String,
}

impl BlockRecord {
    /// Deterministic byte encoding of the record, used as the payload
    /// component of the proof-of-work preimage. bincode is stable for a
    /// fixed struct definition, which is all the puzzle needs.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("record encoding is infallible")
    }

    /// The placeholder record embedded in the genesis block.
    pub fn genesis() -> Self {
        Self {
            content_hash: Vec::new(),
            document_id: config::GENESIS_LABEL.to_owned(),
            notary_id: config::GENESIS_LABEL.to_owned(),
            user_id: config::GENESIS_LABEL.to_owned(),
            cnpj: config::GENESIS_LABEL.to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// One link of the notarization chain.
///
/// `hash` is content-derived: it is the SHA-256 digest found by the
/// proof-of-work search over `prev_hash`, the record and the nonce, so the
/// block is self-authenticating. Hashes serialize as hex strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Proof-of-work digest of this block.
    #[serde(with = "hex::serde")]
    pub hash: [u8; 32],
    /// Hash of the predecessor block. All zeros only for genesis.
    #[serde(rename = "prev_hash", with = "hex::serde")]
    pub prev_hash: [u8; 32],
    /// Nonce found by the proof-of-work search.
    pub nonce: u64,
    /// Creation instant, milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// The notarization payload.
    pub data: BlockRecord,
}

impl Block {
    /// Creates a block over `record` linked to `prev_hash`, running the
    /// proof-of-work search to completion.
    pub fn create(record: BlockRecord, prev_hash: [u8; 32]) -> Result<Self, PowError> {
        let timestamp = Utc::now().timestamp_millis();
        let (nonce, hash) = pow::solve(&prev_hash, &record)?;
        Ok(Self {
            hash,
            prev_hash,
            nonce,
            timestamp,
            data: record,
        })
    }

    /// Constructs the genesis block: placeholder record, zeroed
    /// predecessor, timestamp 0.
    ///
    /// The fixed timestamp makes the genesis hash identical on every node
    /// running the same difficulty, so freshly bootstrapped peers share a
    /// tip and can gossip from block one.
    pub fn genesis() -> Self {
        let record = BlockRecord::genesis();
        let (nonce, hash) = pow::solve(&GENESIS_PREV_HASH, &record)
            .expect("genesis proof-of-work cannot exhaust the nonce space");
        Self {
            hash,
            prev_hash: GENESIS_PREV_HASH,
            nonce,
            timestamp: 0,
            data: record,
        }
    }

    /// True iff this is the genesis block (zeroed predecessor hash).
    pub fn is_genesis(&self) -> bool {
        self.prev_hash == GENESIS_PREV_HASH
    }

    /// The block hash as a hex string.
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// The predecessor hash as a hex string.
    pub fn prev_hash_hex(&self) -> String {
        hex::encode(self.prev_hash)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(doc: &str) -> BlockRecord {
        BlockRecord {
            content_hash: vec![0xab, 0x12],
            document_id: doc.to_owned(),
            notary_id: "N1".to_owned(),
            user_id: "U1".to_owned(),
            cnpj: "C1".to_owned(),
        }
    }

    #[test]
    fn genesis_is_deterministic() {
        let g1 = Block::genesis();
        let g2 = Block::genesis();
        assert_eq!(g1.hash, g2.hash);
        assert_eq!(g1.nonce, g2.nonce);
        assert_eq!(g1.timestamp, 0);
        assert!(g1.is_genesis());
    }

    #[test]
    fn genesis_satisfies_proof_of_work() {
        let genesis = Block::genesis();
        assert!(pow::validate(&genesis));
    }

    #[test]
    fn created_block_links_to_predecessor() {
        let genesis = Block::genesis();
        let block = Block::create(make_record("D1"), genesis.hash).expect("solve");

        assert_eq!(block.prev_hash, genesis.hash);
        assert!(!block.is_genesis());
        assert!(pow::validate(&block));
    }

    #[test]
    fn canonical_bytes_are_deterministic() {
        let a = make_record("D1").canonical_bytes();
        let b = make_record("D1").canonical_bytes();
        assert_eq!(a, b);

        let c = make_record("D2").canonical_bytes();
        assert_ne!(a, c);
    }

    #[test]
    fn json_uses_hex_hashes_and_wire_field_names() {
        let genesis = Block::genesis();
        let json = serde_json::to_value(&genesis).expect("serialize");

        assert_eq!(json["hash"], serde_json::json!(genesis.hash_hex()));
        assert_eq!(json["prev_hash"], serde_json::json!("0".repeat(64)));
        assert_eq!(json["data"]["documentId"], serde_json::json!("Genesis"));
        assert_eq!(json["data"]["cnpj"], serde_json::json!("Genesis"));
    }

    #[test]
    fn block_serialization_roundtrip() {
        let block = Block::create(make_record("D1"), Block::genesis().hash).expect("solve");
        let json = serde_json::to_string(&block).expect("serialize");
        let recovered: Block = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(block, recovered);
    }
}
