// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Selo — Core Protocol Library
//!
//! Selo is a small peer-to-peer notarization ledger: an append-only,
//! proof-of-work hash chain of document attestations, replicated between
//! nodes by pushing full blocks over encrypted libp2p streams.
//!
//! It is deliberately not a cryptocurrency. There are no balances, no
//! transactions, no fork-choice rule and no committee votes — the chain
//! exists so that "this document hash was registered by this notary at this
//! time" becomes tamper-evident without a central database. The proof of
//! work is a rate limit on block creation, not a lottery between miners.
//!
//! ## Architecture
//!
//! The library is split into the three concerns a notarization node
//! actually has:
//!
//! - **ledger** — Blocks, the SHA-256 proof-of-work gate, and the
//!   sled-backed chain store with its single mutable tip pointer.
//! - **network** — The gossip vocabulary (HELLO / GOSSIP / GETBLOCK /
//!   BLOCK), the length-prefixed JSON wire codec, the peer directory, and
//!   the libp2p transport that opens one encrypted stream per message.
//! - **config** — Protocol constants. One place, no magic numbers elsewhere.
//!
//! The node runtime in [`network::node`] is the only writer of chain state:
//! every inbound block and every API submission funnels through its single
//! decision loop, which keeps the acceptance rules free of locks.
//!
//! ## Design Philosophy
//!
//! 1. Availability over delivery guarantees — network failures are logged
//!    and dropped, never propagated.
//! 2. The wire format is the contract. Everything else may change.
//! 3. If it mutates the chain, it goes through the decision loop. No
//!    exceptions, including the HTTP layer.

pub mod config;
pub mod ledger;
pub mod network;
