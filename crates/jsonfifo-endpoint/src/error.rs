/// Errors that can occur in endpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// Transport-level error (provisioning, opening a FIFO end).
    #[error("transport error: {0}")]
    Transport(#[from] jsonfifo_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] jsonfifo_frame::FrameError),

    /// The value handed to `send` could not be serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The endpoint driver is no longer running.
    #[error("endpoint closed")]
    Closed,
}

impl From<jsonfifo_transport::ProvisionError> for EndpointError {
    fn from(err: jsonfifo_transport::ProvisionError) -> Self {
        EndpointError::Transport(err.into())
    }
}

pub type Result<T> = std::result::Result<T, EndpointError>;
