//! Command-line interface.
//!
//! `blokfs [-o OPTIONS] ROOT MOUNTPOINT`, optionally backed by a config
//! file. Anything missing after both are merged is reported as a usage
//! error.

use std::path::PathBuf;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use crate::config::BlokConfig;

/// Arguments of the `blokfs` binary.
#[derive(Parser, Debug)]
#[command(name = "blokfs")]
#[command(about = "Mirror a directory through FUSE and log every read", long_about = None)]
pub struct Cli {
    /// Directory whose contents the mount exposes.
    #[arg(required_unless_present = "config")]
    pub root: Option<PathBuf>,

    /// Where to mount.
    #[arg(required_unless_present = "config")]
    pub mountpoint: Option<PathBuf>,

    /// Mount options, comma separated. May be repeated.
    #[arg(short = 'o', value_name = "OPTIONS")]
    pub options: Vec<String>,

    /// Config file (.toml or .json) read before the flags are applied.
    #[arg(short, long, env = "BLOKFS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Access log location (default: blok.log in the working directory).
    #[arg(long, env = "BLOKFS_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Report extended attributes as unsupported.
    #[arg(long)]
    pub no_xattr: bool,

    /// Debug output on stderr.
    #[arg(short, long)]
    pub debug: bool,
}

impl Cli {
    /// Merges the config file, if any, with command-line arguments, which
    /// take precedence. A result without a root or mount point fails with
    /// a `clap::Error` carrying the usage text.
    pub fn into_config(self) -> Result<BlokConfig> {
        let mut config = match &self.config {
            Some(path) => BlokConfig::from_file(path)?,
            None => BlokConfig::default(),
        };

        if let Some(root) = self.root {
            config.root = root;
        }
        if let Some(mountpoint) = self.mountpoint {
            config.mountpoint = mountpoint;
        }
        if let Some(log_file) = self.log_file {
            config.log_file = log_file;
        }
        if self.no_xattr {
            config.xattr = false;
        }
        config.mount_options.extend(self.options);

        if let Err(e) = config.validate() {
            return Err(Cli::command()
                .error(ErrorKind::MissingRequiredArgument, e)
                .into());
        }
        Ok(config)
    }
}
