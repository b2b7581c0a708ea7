use bytes::BytesMut;
use serde_json::Value;

use crate::codec::{decode_frame, encode_frame};
use crate::error::{FrameError, Result};

/// Outcome of decoding one complete frame.
#[derive(Debug)]
pub enum Decoded {
    /// The payload parsed as JSON.
    Message(Value),
    /// The frame was intact but its payload was not valid JSON. Only this
    /// frame is lost; the stream stays in sync.
    Malformed(FrameError),
}

impl Decoded {
    pub fn into_message(self) -> Option<Value> {
        match self {
            Decoded::Message(value) => Some(value),
            Decoded::Malformed(_) => None,
        }
    }
}

/// Serialize `value` and append it to `dst` as one frame.
pub fn encode_message(value: &Value, max_payload: usize, dst: &mut BytesMut) -> Result<()> {
    let payload = serde_json::to_vec(value)?;
    if payload.len() > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: max_payload,
        });
    }
    encode_frame(&payload, dst)
}

/// Take the next complete frame out of `src` and parse it.
///
/// `Ok(None)` means more bytes are needed. `Err` means the length prefix is
/// unusable and the rest of `src` cannot be trusted.
pub fn decode_message(src: &mut BytesMut, max_payload: usize) -> Result<Option<Decoded>> {
    let Some(payload) = decode_frame(src, max_payload)? else {
        return Ok(None);
    };

    match serde_json::from_slice::<Value>(&payload) {
        Ok(value) => Ok(Some(Decoded::Message(value))),
        Err(err) => Ok(Some(Decoded::Malformed(FrameError::Json(err)))),
    }
}
