//! Non-blocking FIFO ends on top of `tokio::net::unix::pipe`.
//!
//! Must be called from within a tokio runtime.

use std::path::Path;

use tokio::net::unix::pipe;
use tracing::debug;

use crate::error::{Result, TransportError};

/// Reading end of a FIFO.
pub type PipeReader = pipe::Receiver;
/// Writing end of a FIFO.
pub type PipeWriter = pipe::Sender;

/// Open the reading end of the FIFO at `path`.
///
/// Opening never waits for a writer. On Linux the FIFO is opened read-write,
/// so the reader does not see end-of-file every time the peer's writer goes
/// away; it simply waits for the next writer.
pub fn open_reader(path: impl AsRef<Path>) -> Result<PipeReader> {
    let path = path.as_ref();
    let mut options = pipe::OpenOptions::new();
    #[cfg(target_os = "linux")]
    options.read_write(true);

    let reader = options
        .open_receiver(path)
        .map_err(|source| TransportError::OpenReader {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(?path, "opened fifo reader");
    Ok(reader)
}

/// Open the writing end of the FIFO at `path`.
///
/// Fails with `ENXIO` (see [`TransportError::is_peer_absent`]) while nobody
/// has the FIFO open for reading.
pub fn open_writer(path: impl AsRef<Path>) -> Result<PipeWriter> {
    let path = path.as_ref();
    let writer = pipe::OpenOptions::new()
        .open_sender(path)
        .map_err(|source| TransportError::OpenWriter {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(?path, "opened fifo writer");
    Ok(writer)
}
