//! Virtual path to real path translation.
//!
//! A virtual path is whatever the kernel names relative to the mount point,
//! always starting with `/`. The real path is the root directory's bytes
//! followed by the virtual path's bytes. Nothing is normalized here: `.`,
//! `..` and symlinks are left for the underlying filesystem to resolve when
//! the real path is used.

use std::ffi::OsString;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

use crate::error::{FsError, Result};

/// Longest real path accepted, including the terminating NUL.
pub const MAX_PATH_LEN: usize = libc::PATH_MAX as usize;

/// Maps virtual paths to real paths under a fixed root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    /// Root prefix with no trailing slash; empty when the root is `/`.
    root: Vec<u8>,
    limit: usize,
}

impl PathResolver {
    /// Creates a resolver for an absolute root directory.
    pub fn new(root: &Path) -> Result<Self> {
        Self::with_limit(root, MAX_PATH_LEN)
    }

    /// Same as [`PathResolver::new`] with a custom length limit.
    pub fn with_limit(root: &Path, limit: usize) -> Result<Self> {
        if !root.is_absolute() {
            return Err(FsError::invalid(format!(
                "root directory must be absolute: {}",
                root.display()
            )));
        }
        let mut bytes = root.as_os_str().as_bytes().to_vec();
        while bytes.last() == Some(&b'/') {
            bytes.pop();
        }
        Ok(Self { root: bytes, limit })
    }

    /// The root directory this resolver prefixes.
    pub fn root(&self) -> PathBuf {
        if self.root.is_empty() {
            PathBuf::from("/")
        } else {
            PathBuf::from(OsString::from_vec(self.root.clone()))
        }
    }

    /// Concatenates the root and `virtual_path`.
    pub fn resolve(&self, virtual_path: &Path) -> Result<PathBuf> {
        let tail = virtual_path.as_os_str().as_bytes();
        if tail.first() != Some(&b'/') {
            return Err(FsError::invalid(format!(
                "virtual path must start with '/': {}",
                virtual_path.display()
            )));
        }

        let len = self.root.len() + tail.len();
        // Room for the NUL the syscall layer appends.
        if len >= self.limit {
            return Err(FsError::PathTooLong {
                len,
                limit: self.limit,
            });
        }

        let mut real = Vec::with_capacity(len);
        real.extend_from_slice(&self.root);
        real.extend_from_slice(tail);
        Ok(PathBuf::from(OsString::from_vec(real)))
    }
}
