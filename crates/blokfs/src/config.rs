//! Daemon configuration.
//!
//! A `BlokConfig` can come from a TOML or JSON file; command-line flags are
//! layered on top of it by the CLI.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::mount::{parse_mount_options_into, MountOptions};

/// Access log location, relative to the working directory.
pub const DEFAULT_LOG_FILE: &str = "blok.log";

/// Everything needed to start a mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlokConfig {
    /// Directory mirrored by the mount.
    pub root: PathBuf,
    /// Where the filesystem is mounted.
    pub mountpoint: PathBuf,
    /// Entries in `-o` syntax, each possibly comma separated.
    pub mount_options: Vec<String>,
    /// Access log written with one line per read.
    pub log_file: PathBuf,
    /// Offer extended attributes.
    pub xattr: bool,
}

impl Default for BlokConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            mountpoint: PathBuf::new(),
            mount_options: Vec::new(),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            xattr: true,
        }
    }
}

impl BlokConfig {
    /// Loads a config file, picking the format from its extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => {
                let config: BlokConfig = toml::from_str(&contents)?;
                Ok(config)
            }
            "json" => {
                let config: BlokConfig = serde_json::from_str(&contents)?;
                Ok(config)
            }
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }

    /// Folds every `mount_options` entry into one `MountOptions`.
    pub fn parsed_mount_options(&self) -> anyhow::Result<MountOptions> {
        let mut options = MountOptions::default();
        for entry in &self.mount_options {
            parse_mount_options_into(&mut options, entry)?;
        }
        Ok(options)
    }

    /// Checks that both the root and the mount point are set.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.root.as_os_str().is_empty() {
            anyhow::bail!("root directory is required");
        }
        if self.mountpoint.as_os_str().is_empty() {
            anyhow::bail!("mount point is required");
        }
        Ok(())
    }
}
