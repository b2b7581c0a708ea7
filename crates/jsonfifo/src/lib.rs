//! JSON message exchange between two local processes over named pipes.
//!
//! A host and a client share a directory holding two FIFOs per channel name.
//! Each side reads one and writes the other; messages are length-prefixed
//! JSON documents, and a small `start`/`end` handshake tells each side when
//! its peer comes and goes.
//!
//! # Crate Structure
//!
//! - [`transport`]: FIFO provisioning, path layout and stream opening
//! - [`frame`]: length-prefixed JSON framing
//! - [`endpoint`]: host/client endpoints with automatic recovery (behind the
//!   `endpoint` feature, on by default)
//!
//! ```no_run
//! # #[cfg(feature = "endpoint")]
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use jsonfifo::endpoint::{EndpointConfig, IpcEndpoint, IpcEvent, Role};
//!
//! let mut host = IpcEndpoint::new(EndpointConfig::new(Role::Host, "chat"))?;
//! host.send(&serde_json::json!({"fromHost": "blub"}))?;
//! while let Some(event) = host.next_event().await {
//!     if let IpcEvent::Data(value) = event {
//!         println!("{value}");
//!         break;
//!     }
//! }
//! host.close().await?;
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use jsonfifo_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use jsonfifo_frame::*;
}

/// Re-export endpoint types (requires `endpoint` feature).
#[cfg(feature = "endpoint")]
pub mod endpoint {
    pub use jsonfifo_endpoint::*;
}
