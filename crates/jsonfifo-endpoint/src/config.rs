use std::path::{Path, PathBuf};
use std::time::Duration;

use jsonfifo_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};
use jsonfifo_transport::{ChannelPaths, Role};

use crate::duplex::StreamOptions;
use crate::error::Result;

/// Directory name used under the home directory when no base directory is
/// configured.
pub const DEFAULT_PIPE_DIR_NAME: &str = ".pipes";

/// Pause between attempts to reopen a failed reader or to open the writer
/// while the peer is absent.
pub const DEFAULT_REOPEN_DELAY: Duration = Duration::from_millis(100);

/// How long an incomplete frame may sit in the read buffer with no new bytes
/// before it is treated as the remains of a peer that died mid-write.
pub const DEFAULT_STALE_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

/// `$HOME/.pipes`, or `<tmp>/.pipes` when no home directory is known.
pub fn default_base_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(DEFAULT_PIPE_DIR_NAME)
}

/// Configuration for one [`IpcEndpoint`](crate::IpcEndpoint).
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Which side of the channel this endpoint is.
    pub role: Role,
    /// Channel name shared by both peers.
    pub channel_name: String,
    /// Directory holding the FIFO files.
    pub base_directory: PathBuf,
    /// Retry pause for stream reopen attempts.
    pub reopen_delay: Duration,
    /// Largest JSON payload accepted in either direction.
    pub max_payload_size: usize,
    /// Silence after which a partial inbound frame is discarded.
    pub stale_frame_timeout: Duration,
}

impl EndpointConfig {
    /// Config for `role` on `channel_name` with default directory and limits.
    pub fn new(role: Role, channel_name: impl Into<String>) -> Self {
        Self {
            role,
            channel_name: channel_name.into(),
            base_directory: default_base_directory(),
            reopen_delay: DEFAULT_REOPEN_DELAY,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            stale_frame_timeout: DEFAULT_STALE_FRAME_TIMEOUT,
        }
    }

    /// Override the FIFO directory.
    pub fn with_base_directory(mut self, dir: impl AsRef<Path>) -> Self {
        self.base_directory = dir.as_ref().to_path_buf();
        self
    }

    /// Override the reopen/retry pause.
    pub fn with_reopen_delay(mut self, delay: Duration) -> Self {
        self.reopen_delay = delay;
        self
    }

    /// Override the payload size limit.
    pub fn with_max_payload_size(mut self, max: usize) -> Self {
        self.max_payload_size = max;
        self
    }

    pub fn with_stale_frame_timeout(mut self, timeout: Duration) -> Self {
        self.stale_frame_timeout = timeout;
        self
    }

    /// Resolve the in/out FIFO paths for this config.
    pub fn paths(&self) -> Result<ChannelPaths> {
        Ok(ChannelPaths::new(
            &self.base_directory,
            &self.channel_name,
            self.role,
        )?)
    }

    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
        }
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            frame: self.frame_config(),
            reopen_delay: self.reopen_delay,
            stale_frame_timeout: self.stale_frame_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_pipes_directory() {
        let config = EndpointConfig::new(Role::Host, "test");
        assert!(config.base_directory.ends_with(DEFAULT_PIPE_DIR_NAME));
        assert_eq!(config.reopen_delay, DEFAULT_REOPEN_DELAY);
        assert_eq!(config.max_payload_size, DEFAULT_MAX_PAYLOAD);
        assert_eq!(config.stale_frame_timeout, DEFAULT_STALE_FRAME_TIMEOUT);
    }

    #[test]
    fn builder_overrides_and_paths() {
        let config = EndpointConfig::new(Role::Client, "chat")
            .with_base_directory("/tmp/jsonfifo-config")
            .with_reopen_delay(Duration::from_millis(5))
            .with_max_payload_size(1024)
            .with_stale_frame_timeout(Duration::from_millis(250));

        let paths = config.paths().unwrap();
        assert_eq!(paths.in_path(), Path::new("/tmp/jsonfifo-config/chat.out"));
        assert_eq!(paths.out_path(), Path::new("/tmp/jsonfifo-config/chat.in"));
        let options = config.stream_options();
        assert_eq!(options.frame.max_payload_size, 1024);
        assert_eq!(options.reopen_delay, Duration::from_millis(5));
        assert_eq!(options.stale_frame_timeout, Duration::from_millis(250));
    }

    #[test]
    fn invalid_name_surfaces_as_transport_error() {
        let err = EndpointConfig::new(Role::Host, "../escape")
            .paths()
            .unwrap_err();
        assert!(matches!(
            err,
            crate::EndpointError::Transport(jsonfifo_transport::TransportError::InvalidChannelName(_))
        ));
    }
}
