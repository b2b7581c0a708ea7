//! Named-pipe transport for jsonfifo.
//!
//! Provides the filesystem side of a duplex FIFO channel:
//! - Role-mirrored path resolution (`<dir>/<name>.in`, `<dir>/<name>.out`)
//! - Idempotent directory and FIFO provisioning via `mkfifo(2)`
//! - Non-blocking reader/writer ends on top of tokio (behind `async`)
//!
//! This is the lowest layer of jsonfifo. Framing and connection state live
//! in `jsonfifo-frame` and `jsonfifo-endpoint`.

pub mod error;
pub mod paths;

#[cfg(unix)]
pub mod fifo;

#[cfg(all(unix, feature = "async"))]
pub mod pipe;

pub use error::{ProvisionError, Result, TransportError};
pub use paths::{ChannelPaths, Role};

#[cfg(unix)]
pub use fifo::{ensure_directory, ensure_fifo, ensure_fifo_with_mode, provision, DEFAULT_FIFO_MODE};
