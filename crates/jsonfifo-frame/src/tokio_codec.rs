use bytes::BytesMut;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{FrameConfig, DEFAULT_MAX_PAYLOAD};
use crate::error::FrameError;
use crate::json::{decode_message, encode_message, Decoded};

/// `tokio_util` codec for length-prefixed JSON frames.
///
/// Endpoints decode their in-pipe through it with `FramedRead` and encode
/// outgoing messages with its [`Encoder`] impls.
///
/// Decode errors from this codec are always stream-fatal; a frame with bad
/// JSON is yielded as [`Decoded::Malformed`] so `FramedRead` keeps going.
#[derive(Debug, Clone)]
pub struct JsonFrameCodec {
    max_payload_size: usize,
}

impl JsonFrameCodec {
    pub fn new() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }

    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            max_payload_size: config.max_payload_size,
        }
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }
}

impl Default for JsonFrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for JsonFrameCodec {
    type Item = Decoded;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_message(src, self.max_payload_size)
    }
}

impl Encoder<&Value> for JsonFrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &Value, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_message(item, self.max_payload_size, dst)
    }
}

impl Encoder<Value> for JsonFrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_message(&item, self.max_payload_size, dst)
    }
}
