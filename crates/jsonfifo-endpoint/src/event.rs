use std::fmt;

use serde_json::Value;

/// Something an endpoint reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum IpcEvent {
    /// A non-control JSON value from the peer.
    Data(Value),
    /// The peer became reachable.
    Connected,
    /// The peer went away (write failure, `end`, or local restart/close).
    Disconnected,
    /// A diagnostic; the endpoint keeps running unless the kind is
    /// [`ErrorKind::Provision`].
    Error(ErrorEvent),
}

/// Failure category carried by [`IpcEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Directory or FIFO creation failed; the endpoint has stopped.
    Provision,
    /// The reader end failed and is being reopened.
    StreamRead,
    /// The writer end failed; the whole channel is being restarted.
    StreamWrite,
    /// A frame could not be decoded.
    Decode,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Provision => "provision",
            ErrorKind::StreamRead => "stream_read",
            ErrorKind::StreamWrite => "stream_write",
            ErrorKind::Decode => "decode",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorEvent {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}
