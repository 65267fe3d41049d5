//! Mount session state and the mount lifecycle.
//!
//! [`MountSession`] is the per-mount context every operation receives: the
//! root directory and the enabled capabilities. It is built once before the
//! transport starts and never changes afterwards.
//!
//! The rest of the module mounts a session, waits until it ends or a
//! shutdown is requested, and unmounts it.

use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::info;

use crate::error::{FsError, Result};
use crate::filesystem::BlokFs;
use crate::mount::{options_to_fuser, validate_mountpoint, MountError, MountOptions};
use crate::passthrough::Passthrough;
use crate::path_resolver::PathResolver;

/// Root directory and capabilities of one mount.
#[derive(Debug, Clone)]
pub struct MountSession {
    resolver: PathResolver,
    xattr: bool,
}

impl MountSession {
    /// Creates the session for `root`, which is made absolute and must be
    /// an existing directory.
    pub fn new(root: &Path) -> Result<Self> {
        let root = fs::canonicalize(root)?;
        if !root.is_dir() {
            return Err(FsError::Io(io::Error::from_raw_os_error(libc::ENOTDIR)));
        }
        Ok(Self {
            resolver: PathResolver::new(&root)?,
            xattr: true,
        })
    }

    /// Turns the extended attribute capability on or off.
    pub fn with_xattr(mut self, enabled: bool) -> Self {
        self.xattr = enabled;
        self
    }

    /// The canonical root directory.
    pub fn root(&self) -> PathBuf {
        self.resolver.root()
    }

    /// Real path of a virtual path.
    pub fn resolve(&self, virtual_path: &Path) -> Result<PathBuf> {
        self.resolver.resolve(virtual_path)
    }

    /// Whether extended attributes are offered.
    pub fn xattr_enabled(&self) -> bool {
        self.xattr
    }
}

/// Configuration for a FUSE session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Mount point path
    pub mountpoint: PathBuf,
    /// Context for the operations
    pub session: MountSession,
    /// Mount options
    pub mount_options: MountOptions,
}

/// Validates a session config
pub fn validate_session_config(config: &SessionConfig) -> std::result::Result<(), MountError> {
    if config.mountpoint.as_os_str().is_empty() {
        return Err(MountError::InvalidOption("mountpoint cannot be empty".into()));
    }
    validate_mountpoint(&config.mountpoint)
}

/// Handle for a running FUSE session. Dropping it unmounts.
pub struct SessionHandle {
    mountpoint: PathBuf,
    background: Option<fuser::BackgroundSession>,
    destroyed: Option<oneshot::Receiver<()>>,
}

impl SessionHandle {
    /// Get the mount point path.
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// Unmounts now; later calls do nothing.
    pub fn unmount(&mut self) {
        if let Some(background) = self.background.take() {
            info!("Unmounting {}", self.mountpoint.display());
            drop(background);
        }
    }

    /// Waits until the filesystem is unmounted from outside or `shutdown`
    /// resolves, then unmounts.
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let destroyed = self.destroyed.take();
        let ended = async move {
            match destroyed {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = ended => {
                info!("Filesystem at {} was unmounted", self.mountpoint.display());
            }
            _ = shutdown => {
                info!("Shutdown requested");
            }
        }
        self.unmount();
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Mounts the session and starts serving requests on a background thread.
pub fn mount(config: SessionConfig) -> std::result::Result<SessionHandle, MountError> {
    validate_session_config(&config)?;

    // Modes passed by callers are applied as given.
    unsafe { libc::umask(0) };

    let (tx, rx) = oneshot::channel();
    let root = config.session.root();
    let fs = BlokFs::new(Arc::new(config.session), Passthrough::new()).with_destroy_notify(tx);
    let options = options_to_fuser(&config.mount_options);

    let background = fuser::spawn_mount2(fs, &config.mountpoint, &options).map_err(|source| {
        MountError::MountFailed {
            mountpoint: config.mountpoint.display().to_string(),
            source,
        }
    })?;

    info!(
        "Mounted {} at {}",
        root.display(),
        config.mountpoint.display()
    );
    Ok(SessionHandle {
        mountpoint: config.mountpoint,
        background: Some(background),
        destroyed: Some(rx),
    })
}
