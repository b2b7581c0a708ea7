//! Handshake control messages.
//!
//! `{"ipc":"start"}` and `{"ipc":"end"}` are reserved on the wire. They are
//! ordinary JSON frames, so a user payload of exactly that shape would be
//! taken as a control message; any other shape (extra keys, other values) is
//! delivered as data.

use bytes::{Bytes, BytesMut};
use jsonfifo_frame::encode_message;
use serde_json::{Map, Value};

/// Key of the control field.
pub const CONTROL_KEY: &str = "ipc";
/// Sent right after the writer end is (re)opened.
pub const CONTROL_START: &str = "start";
/// Sent right before a deliberate close.
pub const CONTROL_END: &str = "end";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    Start,
    End,
}

impl ControlMessage {
    /// Recognize a reserved control frame.
    pub fn parse(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if object.len() != 1 {
            return None;
        }
        match object.get(CONTROL_KEY)?.as_str()? {
            CONTROL_START => Some(ControlMessage::Start),
            CONTROL_END => Some(ControlMessage::End),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ControlMessage::Start => CONTROL_START,
            ControlMessage::End => CONTROL_END,
        }
    }

    pub fn to_value(self) -> Value {
        let mut object = Map::with_capacity(1);
        object.insert(CONTROL_KEY.to_string(), Value::from(self.as_str()));
        Value::Object(object)
    }

    /// The complete wire frame for this message.
    pub fn frame(self) -> jsonfifo_frame::Result<Bytes> {
        let mut frame = BytesMut::new();
        encode_message(&self.to_value(), usize::MAX, &mut frame)?;
        Ok(frame.freeze())
    }
}
