//! # Protocol Configuration & Constants
//!
//! Every magic number in Selo lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong and you owe the team coffee.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Proof of Work
// ---------------------------------------------------------------------------

/// Fixed proof-of-work difficulty: accepted digests must be strictly below
/// `2^(256 - DIFFICULTY)`. There is no retargeting — Selo is a notarization
/// log, not a currency with competing miners, so the puzzle only has to
/// rate-limit block creation.
pub const DIFFICULTY: u32 = 12;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Protocol version string advertised in HELLO messages.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// libp2p stream protocol spoken between nodes. Every session negotiates
/// this id, carries exactly one framed message, and closes.
pub const STREAM_PROTOCOL: &str = "/selo/1.0.0";

// ---------------------------------------------------------------------------
// Networking
// ---------------------------------------------------------------------------

/// Capacity of the inbound and outbound message queues. Producers block
/// when a queue is full — this is the backpressure policy.
pub const CHANNEL_CAPACITY: usize = 32;

/// Idle timeout after which an unused transport connection is closed.
pub const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default port for the HTTP API.
pub const DEFAULT_API_PORT: u16 = 3100;

/// Default port for the Prometheus metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 3101;

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Placeholder identifier stamped into every field of the genesis record.
pub const GENESIS_LABEL: &str = "Genesis";
