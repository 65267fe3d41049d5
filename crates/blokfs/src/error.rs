//! Errors returned by filesystem operations.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a filesystem operation. Every variant maps to one errno.
#[derive(Debug, Error)]
pub enum FsError {
    /// Error reported by the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Root plus virtual path does not fit in `PATH_MAX`.
    #[error("Path too long: {len} bytes, limit {limit}")]
    PathTooLong {
        /// Combined length in bytes.
        len: usize,
        /// Largest accepted length.
        limit: usize,
    },

    /// Malformed argument from the caller.
    #[error("Invalid argument: {msg}")]
    InvalidArgument {
        /// What was wrong.
        msg: String,
    },

    /// Node number the kernel no longer holds.
    #[error("Unknown inode: {ino}")]
    UnknownInode {
        /// The node number.
        ino: u64,
    },

    /// Handle value not currently open.
    #[error("Bad handle: {fh:#x}")]
    BadHandle {
        /// Raw handle value.
        fh: u64,
    },

    /// File handle used where a directory handle is needed, or the reverse.
    #[error("Handle {fh:#x} is not a {expected} handle")]
    WrongHandleKind {
        /// Raw handle value.
        fh: u64,
        /// Kind the operation needed.
        expected: &'static str,
    },

    /// Reply buffer could not take a single directory entry.
    #[error("Reply buffer exhausted while listing {}", .path.display())]
    OutOfMemory {
        /// Directory being listed.
        path: PathBuf,
    },

    /// Extended attributes are switched off for this mount.
    #[error("Extended attributes are not supported")]
    XattrUnsupported,
}

/// Result of a filesystem operation.
pub type Result<T> = std::result::Result<T, FsError>;

impl FsError {
    /// Shorthand for [`FsError::InvalidArgument`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        FsError::InvalidArgument { msg: msg.into() }
    }

    /// The errno sent back to the kernel.
    pub fn to_errno(&self) -> i32 {
        use libc::*;
        match self {
            FsError::Io(e) => e.raw_os_error().unwrap_or(EIO),
            FsError::PathTooLong { .. } => ENAMETOOLONG,
            FsError::InvalidArgument { .. } => EINVAL,
            FsError::UnknownInode { .. } => ENOENT,
            FsError::BadHandle { .. } => EBADF,
            FsError::WrongHandleKind { .. } => EBADF,
            FsError::OutOfMemory { .. } => ENOMEM,
            FsError::XattrUnsupported => ENOTSUP,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_keeps_raw_errno() {
        let err = FsError::Io(std::io::Error::from_raw_os_error(libc::ENOSPC));
        assert_eq!(err.to_errno(), libc::ENOSPC);
    }

    #[test]
    fn test_io_error_without_errno_is_eio() {
        let err = FsError::Io(std::io::Error::new(std::io::ErrorKind::Other, "synthetic"));
        assert_eq!(err.to_errno(), libc::EIO);
    }

    #[test]
    fn test_path_too_long_errno() {
        let err = FsError::PathTooLong {
            len: 5000,
            limit: 4096,
        };
        assert_eq!(err.to_errno(), libc::ENAMETOOLONG);
    }

    #[test]
    fn test_handle_errors_are_ebadf() {
        assert_eq!(FsError::BadHandle { fh: 3 }.to_errno(), libc::EBADF);
        let err = FsError::WrongHandleKind {
            fh: 3,
            expected: "file",
        };
        assert_eq!(err.to_errno(), libc::EBADF);
    }

    #[test]
    fn test_out_of_memory_errno() {
        let err = FsError::OutOfMemory {
            path: PathBuf::from("/dir"),
        };
        assert_eq!(err.to_errno(), libc::ENOMEM);
    }

    #[test]
    fn test_unknown_inode_is_enoent() {
        assert_eq!(FsError::UnknownInode { ino: 42 }.to_errno(), libc::ENOENT);
    }

    #[test]
    fn test_display_messages_non_empty() {
        let errors = [
            FsError::invalid("bad"),
            FsError::UnknownInode { ino: 1 },
            FsError::BadHandle { fh: 0 },
            FsError::XattrUnsupported,
        ];
        for err in errors {
            assert!(!err.to_string().is_empty(), "Error display should be non-empty");
        }
    }
}
