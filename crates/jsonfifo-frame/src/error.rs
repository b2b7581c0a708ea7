/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    ///
    /// On the decode side this means the length prefix cannot be trusted and
    /// the stream is out of sync.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A well-bounded frame did not contain valid JSON.
    #[error("malformed json payload: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// True when the byte stream can no longer be decoded from its current
    /// position.
    pub fn is_stream_corrupt(&self) -> bool {
        matches!(self, FrameError::PayloadTooLarge { .. })
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
