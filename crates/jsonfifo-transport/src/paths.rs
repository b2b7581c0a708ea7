use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, TransportError};

/// File suffix of the pipe the host reads from (and the client writes to).
pub const HOST_IN_SUFFIX: &str = "in";
/// File suffix of the pipe the host writes to (and the client reads from).
pub const HOST_OUT_SUFFIX: &str = "out";

/// Which side of the duplex channel an endpoint plays.
///
/// The two roles see the same pair of files mirrored: the host's in-pipe is
/// the client's out-pipe and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Host,
    Client,
}

impl Role {
    /// The role on the other end of the channel.
    pub fn peer(self) -> Self {
        match self {
            Role::Host => Role::Client,
            Role::Client => Role::Host,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" => Ok(Role::Host),
            "client" => Ok(Role::Client),
            other => Err(format!("unknown role {other:?} (expected host or client)")),
        }
    }
}

/// Resolved in/out FIFO paths for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPaths {
    role: Role,
    name: String,
    directory: PathBuf,
    in_path: PathBuf,
    out_path: PathBuf,
}

impl ChannelPaths {
    /// Resolve `<dir>/<name>.in` and `<dir>/<name>.out` for `role`.
    pub fn new(directory: impl AsRef<Path>, name: &str, role: Role) -> Result<Self> {
        validate_channel_name(name)?;
        let directory = directory.as_ref().to_path_buf();
        let host_in = directory.join(format!("{name}.{HOST_IN_SUFFIX}"));
        let host_out = directory.join(format!("{name}.{HOST_OUT_SUFFIX}"));

        let (in_path, out_path) = match role {
            Role::Host => (host_in, host_out),
            Role::Client => (host_out, host_in),
        };

        Ok(Self {
            role,
            name: name.to_string(),
            directory,
            in_path,
            out_path,
        })
    }

    /// Path this endpoint reads from.
    pub fn in_path(&self) -> &Path {
        &self.in_path
    }

    /// Path this endpoint writes to.
    pub fn out_path(&self) -> &Path {
        &self.out_path
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// The same channel as seen from the other role.
    pub fn mirrored(&self) -> Self {
        Self {
            role: self.role.peer(),
            name: self.name.clone(),
            directory: self.directory.clone(),
            in_path: self.out_path.clone(),
            out_path: self.in_path.clone(),
        }
    }
}

fn validate_channel_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(TransportError::InvalidChannelName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_and_client_paths_are_mirrored() {
        let host = ChannelPaths::new("/tmp/pipes", "test", Role::Host).unwrap();
        let client = ChannelPaths::new("/tmp/pipes", "test", Role::Client).unwrap();

        assert_eq!(host.in_path(), Path::new("/tmp/pipes/test.in"));
        assert_eq!(host.out_path(), Path::new("/tmp/pipes/test.out"));
        assert_eq!(host.in_path(), client.out_path());
        assert_eq!(host.out_path(), client.in_path());
        assert_eq!(host.mirrored(), client);
    }

    #[test]
    fn rejects_names_that_escape_directory() {
        for name in ["", ".", "..", "a/b", "a\\b", "nul\0"] {
            let result = ChannelPaths::new("/tmp/pipes", name, Role::Host);
            assert!(
                matches!(result, Err(TransportError::InvalidChannelName(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Host".parse::<Role>().unwrap(), Role::Host);
        assert_eq!(" client ".parse::<Role>().unwrap(), Role::Client);
        assert!("server".parse::<Role>().is_err());
        assert_eq!(Role::Host.peer(), Role::Client);
        assert_eq!(Role::Client.to_string(), "client");
    }
}
