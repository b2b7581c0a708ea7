use std::path::PathBuf;

/// Errors raised while preparing the pipe directory or FIFO files.
///
/// These are not retried automatically; they usually mean the environment
/// (permissions, filesystem type) needs operator attention.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// The base directory could not be created.
    #[error("failed to create pipe directory {path}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// `mkfifo` failed for the given path.
    #[error("failed to create fifo {path}: {source}")]
    CreateFifo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Something other than a FIFO already occupies the path.
    #[error("existing path is not a fifo: {path}")]
    NotAFifo { path: PathBuf },

    /// The path cannot be handed to the OS (interior NUL byte).
    #[error("invalid fifo path: {path}")]
    InvalidPath { path: PathBuf },
}

/// Errors that can occur in FIFO transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Directory or FIFO provisioning failed.
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    /// The channel name cannot be turned into pipe file names.
    #[error("invalid channel name {0:?}")]
    InvalidChannelName(String),

    /// Failed to open the reading end of a FIFO.
    #[error("failed to open fifo {path} for reading: {source}")]
    OpenReader {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to open the writing end of a FIFO.
    #[error("failed to open fifo {path} for writing: {source}")]
    OpenWriter {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on an open FIFO stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// True when a writer open failed only because nobody has the FIFO open
    /// for reading yet (`ENXIO`), i.e. the peer is not there.
    pub fn is_peer_absent(&self) -> bool {
        match self {
            #[cfg(unix)]
            TransportError::OpenWriter { source, .. } => source.raw_os_error() == Some(libc::ENXIO),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
