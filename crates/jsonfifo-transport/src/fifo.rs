use std::ffi::{CStr, CString};
use std::io::ErrorKind;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use tracing::{debug, info};

use crate::error::ProvisionError;
use crate::paths::ChannelPaths;

/// Default permission mode for created FIFO files (subject to umask).
pub const DEFAULT_FIFO_MODE: u32 = 0o600;

/// Create the pipe directory (and parents) if it does not exist yet.
pub fn ensure_directory(path: impl AsRef<Path>) -> Result<(), ProvisionError> {
    let path = path.as_ref();
    if path.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(path).map_err(|source| ProvisionError::Directory {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(?path, "created pipe directory");
    Ok(())
}

/// Make sure a FIFO exists at `path`, creating it if absent.
///
/// Calling this on an existing FIFO is a no-op. An existing file of any
/// other type is never replaced.
pub fn ensure_fifo(path: impl AsRef<Path>) -> Result<(), ProvisionError> {
    ensure_fifo_with_mode(path, DEFAULT_FIFO_MODE)
}

/// Like [`ensure_fifo`] with an explicit creation mode.
pub fn ensure_fifo_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<(), ProvisionError> {
    let path = path.as_ref();

    match std::fs::symlink_metadata(path) {
        Ok(metadata) => return check_is_fifo(path, &metadata),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(source) => {
            return Err(ProvisionError::CreateFifo {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    let c_path =
        CString::new(path.as_os_str().as_bytes()).map_err(|_| ProvisionError::InvalidPath {
            path: path.to_path_buf(),
        })?;

    match mkfifo(&c_path, mode) {
        Ok(()) => {
            info!(?path, "created fifo");
            Ok(())
        }
        // Lost a creation race with the peer; fine as long as it made a FIFO.
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            let metadata =
                std::fs::symlink_metadata(path).map_err(|source| ProvisionError::CreateFifo {
                    path: path.to_path_buf(),
                    source,
                })?;
            check_is_fifo(path, &metadata)
        }
        Err(source) => Err(ProvisionError::CreateFifo {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Provision the directory and both FIFOs of a channel.
pub fn provision(paths: &ChannelPaths) -> Result<(), ProvisionError> {
    ensure_directory(paths.directory())?;
    ensure_fifo(paths.in_path())?;
    ensure_fifo(paths.out_path())?;
    Ok(())
}

fn check_is_fifo(path: &Path, metadata: &std::fs::Metadata) -> Result<(), ProvisionError> {
    if metadata.file_type().is_fifo() {
        debug!(?path, "fifo already present");
        Ok(())
    } else {
        Err(ProvisionError::NotAFifo {
            path: path.to_path_buf(),
        })
    }
}

fn mkfifo(c_path: &CStr, mode: u32) -> std::io::Result<()> {
    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), mode as libc::mode_t) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}
