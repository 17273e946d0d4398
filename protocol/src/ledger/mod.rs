//! # Ledger Module
//!
//! The chain storage engine: blocks, the proof-of-work gate, and the
//! persistent hash-linked store.
//!
//! ```text
//! block.rs — Block and BlockRecord structures, genesis, PoW-backed creation
//! pow.rs   — SHA-256 difficulty puzzle: solve() and validate()
//! store.rs — sled-backed content-addressed block store + tip pointer
//! chain.rs — Chain: the tip/height owner and its single insertion path
//! ```
//!
//! ## Design Decisions
//!
//! - Blocks are keyed by their own hash — the store is content-addressed,
//!   and backward iteration follows `prev_hash` one store read at a time.
//!   That makes every walk O(height). Fine for a notarization log, wrong
//!   for a high-throughput ledger; choose accordingly.
//! - The block write and the tip-pointer write commit in one sled
//!   transaction. A crash can never leave the store pointing at a tip it
//!   does not hold.
//! - Nothing in this module validates proof of work or linkage. Validation
//!   belongs to the node runtime, which is the only caller of the mutating
//!   path.

pub mod block;
pub mod chain;
pub mod pow;
pub mod store;

pub use block::{Block, BlockRecord};
pub use chain::{Chain, ChainError};
pub use pow::PowError;
pub use store::{ChainStore, StoreError};
