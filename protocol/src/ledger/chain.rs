//! # Chain
//!
//! The owner of chain state: one [`ChainStore`] handle, the in-memory tip
//! hash and the height counter. Created once at node startup, closed at
//! shutdown.
//!
//! The tip and height are mutated only by [`Chain::insert_block`]. That
//! method is the exclusive writer of chain state — all callers serialize
//! through the node runtime's decision loop, so the struct itself needs no
//! locking.

use tracing::info;

use crate::ledger::block::{Block, BlockRecord};
use crate::ledger::pow::PowError;
use crate::ledger::store::{ChainStore, StoreError};

/// Errors surfaced by chain operations.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Pow(#[from] PowError),

    /// A backward walk hit a `prev_hash` the store does not hold. Indicates
    /// local corruption — the tip/block transaction should make this
    /// impossible.
    #[error("missing predecessor {0} while walking the chain")]
    MissingPredecessor(String),
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// The hash-linked notarization chain.
pub struct Chain {
    store: ChainStore,
    tip: [u8; 32],
    height: u64,
}

impl Chain {
    /// Opens the chain over `store`.
    ///
    /// For an empty store this mines and inserts the genesis block. For an
    /// existing store it loads the tip and recomputes the height by walking
    /// back to genesis, so the walk-length invariant holds across restarts.
    ///
    /// This is the one place where an unreadable store is fatal to the
    /// process — there is nothing useful to run without it.
    pub fn open(store: ChainStore) -> Result<Self, ChainError> {
        match store.tip_hash()? {
            Some(tip) => {
                let height = walk_height(&store, tip)?;
                info!(height, tip = %hex::encode(tip), "existing chain loaded");
                Ok(Self { store, tip, height })
            }
            None => {
                info!("no existing chain found, creating genesis block");
                let genesis = Block::genesis();
                store.insert(&genesis)?;
                info!(tip = %genesis.hash_hex(), "genesis block created");
                Ok(Self {
                    tip: genesis.hash,
                    height: 1,
                    store,
                })
            }
        }
    }

    /// The hash of the most recently accepted block.
    pub fn tip(&self) -> [u8; 32] {
        self.tip
    }

    /// Number of blocks from tip to genesis, inclusive.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Appends `block` to the chain: durable store insert, then tip and
    /// height update.
    ///
    /// This is the chain's only mutator and it validates nothing — the
    /// node runtime checks proof of work and linkage before calling it.
    pub fn insert_block(&mut self, block: Block) -> Result<(), ChainError> {
        self.store.insert(&block)?;
        self.tip = block.hash;
        self.height += 1;
        Ok(())
    }

    /// Builds a proof-of-work-solved block over `record` linked to the
    /// current tip. Does not insert it.
    pub fn create_block(&self, record: BlockRecord) -> Result<Block, ChainError> {
        Ok(Block::create(record, self.tip)?)
    }

    /// Direct store lookup by block hash.
    pub fn get_block(&self, hash: &[u8; 32]) -> Result<Option<Block>, ChainError> {
        Ok(self.store.get(hash)?)
    }

    /// True iff walking backward from the tip reaches a block with this
    /// hash before genesis. One store read per hop, O(height).
    pub fn contains_block(&self, hash: &[u8; 32]) -> Result<bool, ChainError> {
        for block in self.iter() {
            if block?.hash == *hash {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// True iff some block on the chain notarizes this content hash. The
    /// query behind document verification.
    pub fn contains_record(&self, content_hash: &[u8]) -> Result<bool, ChainError> {
        for block in self.iter() {
            if block?.data.content_hash == content_hash {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Every block, tip first, terminating at genesis inclusive. Read-side
    /// listing only — not for the hot path.
    pub fn list_blocks(&self) -> Result<Vec<Block>, ChainError> {
        self.iter().collect()
    }

    /// Backward iterator from the tip to genesis.
    pub fn iter(&self) -> ChainIter<'_> {
        ChainIter {
            store: &self.store,
            cursor: Some(self.tip),
        }
    }
}

// ---------------------------------------------------------------------------
// Iteration
// ---------------------------------------------------------------------------

/// Walks the chain backward via `prev_hash`, one store lookup per step.
pub struct ChainIter<'a> {
    store: &'a ChainStore,
    cursor: Option<[u8; 32]>,
}

impl Iterator for ChainIter<'_> {
    type Item = Result<Block, ChainError>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor?;
        match self.store.get(&cursor) {
            Ok(Some(block)) => {
                self.cursor = if block.is_genesis() {
                    None
                } else {
                    Some(block.prev_hash)
                };
                Some(Ok(block))
            }
            Ok(None) => {
                self.cursor = None;
                Some(Err(ChainError::MissingPredecessor(hex::encode(cursor))))
            }
            Err(err) => {
                self.cursor = None;
                Some(Err(err.into()))
            }
        }
    }
}

fn walk_height(store: &ChainStore, tip: [u8; 32]) -> Result<u64, ChainError> {
    let mut height = 0u64;
    let mut cursor = tip;
    loop {
        let block = store
            .get(&cursor)?
            .ok_or_else(|| ChainError::MissingPredecessor(hex::encode(cursor)))?;
        height += 1;
        if block.is_genesis() {
            return Ok(height);
        }
        cursor = block.prev_hash;
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
            content_hash: doc.as_bytes().to_vec(),
            document_id: doc.to_owned(),
            notary_id: "N1".to_owned(),
            user_id: "U1".to_owned(),
            cnpj: "C1".to_owned(),
        }
    }

    fn open_chain() -> Chain {
        Chain::open(ChainStore::open_temporary().unwrap()).unwrap()
    }

    #[test]
    fn open_on_empty_store_creates_genesis() {
        let chain = open_chain();
        assert_eq!(chain.height(), 1);

        let tip = chain.get_block(&chain.tip()).unwrap().expect("tip block");
        assert!(tip.is_genesis());
    }

    #[test]
    fn insert_advances_tip_and_height() {
        let mut chain = open_chain();
        let block = chain.create_block(make_record("D1")).unwrap();
        chain.insert_block(block.clone()).unwrap();

        assert_eq!(chain.tip(), block.hash);
        assert_eq!(chain.height(), 2);
    }

    #[test]
    fn linkage_walk_terminates_at_genesis_in_height_steps() {
        let mut chain = open_chain();
        for i in 0..4 {
            let block = chain.create_block(make_record(&format!("D{i}"))).unwrap();
            chain.insert_block(block).unwrap();
        }
        assert_eq!(chain.height(), 5);

        let blocks = chain.list_blocks().unwrap();
        assert_eq!(blocks.len() as u64, chain.height());
        assert!(blocks.last().unwrap().is_genesis());

        // Every non-genesis block's predecessor resolves and is the next
        // element of the tip-first listing.
        for pair in blocks.windows(2) {
            assert_eq!(pair[0].prev_hash, pair[1].hash);
            assert!(chain.get_block(&pair[0].prev_hash).unwrap().is_some());
        }
    }

    #[test]
    fn height_is_recomputed_on_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tip;
        {
            let mut chain = Chain::open(ChainStore::open(dir.path()).unwrap()).unwrap();
            for i in 0..3 {
                let block = chain.create_block(make_record(&format!("D{i}"))).unwrap();
                chain.insert_block(block).unwrap();
            }
            tip = chain.tip();
        }

        let chain = Chain::open(ChainStore::open(dir.path()).unwrap()).unwrap();
        assert_eq!(chain.height(), 4);
        assert_eq!(chain.tip(), tip);
    }

    #[test]
    fn contains_block_walks_from_tip() {
        let mut chain = open_chain();
        let genesis_hash = chain.tip();
        let block = chain.create_block(make_record("D1")).unwrap();
        chain.insert_block(block.clone()).unwrap();

        assert!(chain.contains_block(&block.hash).unwrap());
        assert!(chain.contains_block(&genesis_hash).unwrap());
        assert!(!chain.contains_block(&[0xAB; 32]).unwrap());
    }

    #[test]
    fn contains_record_matches_content_hashes() {
        let mut chain = open_chain();
        assert!(!chain.contains_record(b"D1").unwrap());

        let block = chain.create_block(make_record("D1")).unwrap();
        chain.insert_block(block).unwrap();
        assert!(chain.contains_record(b"D1").unwrap());
        assert!(!chain.contains_record(b"D2").unwrap());
    }

    #[test]
    fn list_blocks_is_tip_first() {
        let mut chain = open_chain();
        let block = chain.create_block(make_record("D1")).unwrap();
        chain.insert_block(block.clone()).unwrap();

        let blocks = chain.list_blocks().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].hash, block.hash);
        assert!(blocks[1].is_genesis());
    }
}
