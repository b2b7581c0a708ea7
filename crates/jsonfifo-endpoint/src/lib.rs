//! Host/client JSON message endpoints over a duplex pair of named pipes.
//!
//! This is the "just works" layer. Create an [`IpcEndpoint`] for a role and
//! channel name, [`send`](IpcEndpoint::send) JSON values, and consume
//! [`IpcEvent`]s for incoming data and peer presence changes. Pipe
//! provisioning, stream recovery and framing happen underneath.

pub mod config;
pub mod control;
pub mod duplex;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod state;

pub use config::{
    default_base_directory, EndpointConfig, DEFAULT_REOPEN_DELAY, DEFAULT_STALE_FRAME_TIMEOUT,
};
pub use control::{ControlMessage, CONTROL_END, CONTROL_KEY, CONTROL_START};
pub use duplex::StreamOptions;
pub use endpoint::IpcEndpoint;
pub use error::{EndpointError, Result};
pub use event::{ErrorEvent, ErrorKind, IpcEvent};
pub use state::{ConnectionState, ConnectionStateMachine, Transition};

pub use jsonfifo_transport::{ChannelPaths, Role};
