use bytes::BytesMut;
use tracing::warn;

use crate::codec::FrameConfig;
use crate::error::Result;
use crate::json::{decode_message, Decoded};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Stateful decoder for an arbitrarily chunked frame stream.
///
/// This is the push-style API for callers that read the pipe themselves
/// (blocking I/O, another event loop) and hand over raw chunks. Async code
/// on tokio uses `JsonFrameCodec` (feature `async`) with `FramedRead`
/// instead; both share the same frame logic.
///
/// Bytes that do not yet form a complete frame are kept in a pending buffer
/// across calls to [`FrameDecoder::decode`].
#[derive(Debug)]
pub struct FrameDecoder {
    pending: BytesMut,
    config: FrameConfig,
}

impl FrameDecoder {
    /// Create a new decoder with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a new decoder with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            pending: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Feed one chunk and return every frame it completes, in stream order.
    ///
    /// On `Err` the stream is out of sync: the pending buffer is discarded
    /// and the caller should reset the underlying stream.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Vec<Decoded>> {
        self.pending.extend_from_slice(chunk);

        let mut decoded = Vec::new();
        loop {
            match decode_message(&mut self.pending, self.config.max_payload_size) {
                Ok(Some(item)) => decoded.push(item),
                Ok(None) => return Ok(decoded),
                Err(err) => {
                    warn!(
                        error = %err,
                        discarded = self.pending.len(),
                        "frame stream corrupt; dropping pending bytes"
                    );
                    self.pending.clear();
                    return Err(err);
                }
            }
        }
    }

    /// Number of buffered bytes not yet part of a complete frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop any partially received frame.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// Current decoder configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
