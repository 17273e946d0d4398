//! # Proof-of-Work Engine
//!
//! The difficulty puzzle that gates block creation. The puzzle input is the
//! concatenation of the predecessor hash, the deterministically encoded
//! record, the big-endian nonce and the big-endian difficulty; a candidate
//! passes when its SHA-256 digest, read as an unsigned 256-bit big-endian
//! integer, is strictly below `2^(256 - DIFFICULTY)`.
//!
//! Both entry points are pure functions of block content — no state, no
//! side effects, safe to call from any number of tasks concurrently.

use sha2::{Digest, Sha256};

use crate::config::DIFFICULTY;
use crate::ledger::block::{Block, BlockRecord};

/// Errors produced by the proof-of-work search.
#[derive(Debug, thiserror::Error)]
pub enum PowError {
    /// The entire u64 nonce space was searched without finding a digest
    /// below the target. Practically unreachable at any difficulty below
    /// ~64; treated as fatal by callers.
    #[error("proof-of-work nonce space exhausted at difficulty {0}")]
    NonceExhausted(u32),
}

/// The 32-byte big-endian encoding of `2^(256 - difficulty)`.
///
/// Comparing 32-byte arrays lexicographically is exactly the big-endian
/// integer comparison, so the target is precomputed once and digests are
/// compared against it byte-wise.
fn target(difficulty: u32) -> [u8; 32] {
    debug_assert!((1..=255).contains(&difficulty));
    let bit = 256 - difficulty as usize;
    let mut out = [0u8; 32];
    out[31 - bit / 8] = 1 << (bit % 8);
    out
}

/// SHA-256 of `prev_hash || record || nonce_be || difficulty_be`.
fn digest(prev_hash: &[u8; 32], record_bytes: &[u8], nonce: u64, difficulty: u32) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash);
    hasher.update(record_bytes);
    hasher.update(nonce.to_be_bytes());
    hasher.update(u64::from(difficulty).to_be_bytes());
    hasher.finalize().into()
}

/// Searches the nonce space from 0 upward and returns the first
/// `(nonce, digest)` pair whose digest is below the difficulty target.
pub fn solve(prev_hash: &[u8; 32], record: &BlockRecord) -> Result<(u64, [u8; 32]), PowError> {
    let record_bytes = record.canonical_bytes();
    let target = target(DIFFICULTY);

    for nonce in 0..u64::MAX {
        let hash = digest(prev_hash, &record_bytes, nonce, DIFFICULTY);
        if hash < target {
            return Ok((nonce, hash));
        }
    }

    Err(PowError::NonceExhausted(DIFFICULTY))
}

/// Recomputes the digest for the block's stored nonce and checks that it
/// both meets the difficulty target and equals the stored block hash.
///
/// The hash-equality check matters: a block carrying someone else's valid
/// digest but a forged `hash` field must not pass.
pub fn validate(block: &Block) -> bool {
    let record_bytes = block.data.canonical_bytes();
    let hash = digest(&block.prev_hash, &record_bytes, block.nonce, DIFFICULTY);
    hash == block.hash && hash < target(DIFFICULTY)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
