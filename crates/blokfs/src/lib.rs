#![warn(missing_docs)]

//! BlokFS: a pass-through FUSE filesystem.
//!
//! Mirrors a root directory at a mount point, forwarding every operation to
//! the underlying tree and recording each read in an access log.

pub mod attr;
pub mod cli;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod handle;
pub mod mount;
pub mod node;
pub mod normalize;
pub mod operations;
pub mod passthrough;
pub mod path_resolver;
pub mod session;
pub mod telemetry;
#[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
pub mod xattr;

pub use error::{FsError, Result};
pub use filesystem::BlokFs;
pub use operations::{Operations, XattrOperations};
pub use passthrough::Passthrough;
pub use session::MountSession;
