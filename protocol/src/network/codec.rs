//! # Wire Framing
//!
//! The one contract shared with remote nodes: each frame is a u32
//! big-endian byte count followed by exactly that many bytes of UTF-8 JSON
//! encoding one [`ProtocolMessage`]. Every session carries exactly one
//! frame in one direction.
//!
//! The length prefix comes from `LengthDelimitedCodec` with its defaults
//! (4-byte big-endian field); this codec layers JSON encoding on top so
//! `Framed` streams yield typed messages directly.

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use super::protocol::ProtocolMessage;

/// Errors raised while framing or parsing wire messages.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed message body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Length-prefixed JSON codec for [`ProtocolMessage`] frames.
#[derive(Debug)]
pub struct MessageCodec {
    length_codec: LengthDelimitedCodec,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self {
            length_codec: LengthDelimitedCodec::new(),
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = ProtocolMessage;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(frame) = self.length_codec.decode(src)? else {
            return Ok(None);
        };

        Ok(Some(serde_json::from_slice(&frame)?))
    }
}

impl Encoder<ProtocolMessage> for MessageCodec {
    type Error = CodecError;

    fn encode(&mut self, item: ProtocolMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item)?;
        self.length_codec
            .encode(Bytes::from(json), dst)
            .map_err(CodecError::Io)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
