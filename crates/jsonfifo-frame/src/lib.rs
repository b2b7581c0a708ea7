//! Length-prefixed JSON message framing for FIFO byte streams.
//!
//! A pipe is a plain byte stream: two quick writes can arrive as one chunk
//! and one write can arrive split across several. Every message is therefore
//! framed with:
//! - A 4-byte big-endian payload length
//! - The UTF-8 JSON payload itself
//!
//! Decoders buffer until a full frame is present and never hand out partial
//! messages.

pub mod codec;
pub mod decoder;
pub mod error;
pub mod json;

#[cfg(feature = "async")]
pub mod tokio_codec;

pub use codec::{decode_frame, encode_frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use decoder::FrameDecoder;
pub use error::{FrameError, Result};
pub use json::{decode_message, encode_message, Decoded};

#[cfg(feature = "async")]
pub use tokio_codec::JsonFrameCodec;
