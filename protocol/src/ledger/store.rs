//! # Chain Store
//!
//! The persistence layer for the notarization chain, built on sled's
//! embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree     | Key              | Value            |
//! |----------|------------------|------------------|
//! | `blocks` | block hash (32B) | `bincode(Block)` |
//! | `meta`   | `"tip"`          | block hash (32B) |
//!
//! The store is content-addressed: blocks are keyed by their own hash and
//! linked only through `prev_hash`, so lookups are O(1) and chain walks
//! pay one read per hop.
//!
//! ## Atomicity
//!
//! [`ChainStore::insert`] writes the block and moves the tip pointer in a
//! single cross-tree sled transaction. Either both land on disk or
//! neither does — a crash can never leave the store believing it has a tip
//! that does not resolve to a stored block.

use std::path::Path;

use sled::transaction::TransactionError;
use sled::{Db, Transactional, Tree};

use crate::ledger::block::Block;

/// Well-known key in the `meta` tree holding the current tip hash.
const TIP_KEY: &[u8] = b"tip";

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors produced by the persistent store.
///
/// Storage errors indicate local corruption or disk failure: callers must
/// treat them as unrecoverable for the current operation and must not
/// retry — retries cannot fix a corrupt store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Sled(#[from] sled::Error),

    #[error("corrupt chain store: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// ChainStore
// ---------------------------------------------------------------------------

/// Crash-durable block storage: block hash → serialized block, plus the
/// single `tip` pointer.
///
/// sled trees support lock-free concurrent reads and serialized writes, so
/// a `ChainStore` can be shared freely; in practice all writes arrive from
/// the node runtime's decision loop anyway.
#[derive(Debug, Clone)]
pub struct ChainStore {
    db: Db,
    blocks: Tree,
    meta: Tree,
}

impl ChainStore {
    /// Opens or creates a store at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Creates a temporary store that is discarded on drop. For tests.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let blocks = db.open_tree("blocks")?;
        let meta = db.open_tree("meta")?;
        Ok(Self { db, blocks, meta })
    }

    /// Durably persists `block` keyed by its hash and moves the tip pointer
    /// to it, atomically.
    ///
    /// This is the store's only mutator. It performs no validation — the
    /// node runtime is responsible for checking proof of work and linkage
    /// before calling it.
    pub fn insert(&self, block: &Block) -> StoreResult<()> {
        let encoded = bincode::serialize(block)
            .map_err(|e| StoreError::Corrupt(format!("block encode failed: {e}")))?;

        (&self.blocks, &self.meta)
            .transaction(|(blocks, meta)| {
                blocks.insert(&block.hash[..], encoded.as_slice())?;
                meta.insert(TIP_KEY, &block.hash[..])?;
                Ok::<_, sled::transaction::ConflictableTransactionError<()>>(())
            })
            .map_err(|err| match err {
                TransactionError::Abort(()) => {
                    StoreError::Corrupt("chain store transaction aborted".to_owned())
                }
                TransactionError::Storage(e) => StoreError::Sled(e),
            })?;

        self.db.flush()?;
        Ok(())
    }

    /// Looks up a block by its hash.
    pub fn get(&self, hash: &[u8; 32]) -> StoreResult<Option<Block>> {
        match self.blocks.get(hash)? {
            Some(bytes) => {
                let block = bincode::deserialize(&bytes)
                    .map_err(|e| StoreError::Corrupt(format!("block decode failed: {e}")))?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    /// The current tip hash, or `None` for an empty store.
    pub fn tip_hash(&self) -> StoreResult<Option<[u8; 32]>> {
        match self.meta.get(TIP_KEY)? {
            Some(bytes) => {
                let hash: [u8; 32] = bytes.as_ref().try_into().map_err(|_| {
                    StoreError::Corrupt(format!("tip pointer has {} bytes, want 32", bytes.len()))
                })?;
                Ok(Some(hash))
            }
            None => Ok(None),
        }
    }

    /// Number of blocks stored.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
