//! Mount point and mount option handling.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name the mount shows up under in the mount table.
pub const FS_NAME: &str = "blokfs";

/// Mount options understood by the driver. Anything else given with `-o`
/// is kept verbatim in `custom` and handed to the kernel untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountOptions {
    /// `allow_other`
    pub allow_other: bool,
    /// `allow_root`
    pub allow_root: bool,
    /// `default_permissions`
    pub default_permissions: bool,
    /// `auto_unmount`
    pub auto_unmount: bool,
    /// `ro`; a later `rw` clears it.
    pub ro: bool,
    /// Every other option, in order.
    pub custom: Vec<String>,
}

/// Failure to set up a mount.
#[derive(Debug, Error)]
pub enum MountError {
    /// Mount point does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(String),

    /// Mount point is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// Malformed `-o` entry or session setting.
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// The kernel refused the mount.
    #[error("Mount at {mountpoint} failed: {source}")]
    MountFailed {
        /// Where the mount was attempted.
        mountpoint: String,
        /// Error from the transport.
        #[source]
        source: std::io::Error,
    },

    /// Other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Validate a mountpoint path.
pub fn validate_mountpoint(path: &Path) -> Result<(), MountError> {
    if !path.exists() {
        return Err(MountError::PathNotFound(path.display().to_string()));
    }

    if !path.is_dir() {
        return Err(MountError::NotADirectory(path.display().to_string()));
    }

    Ok(())
}

/// Parse mount options from a comma-separated string, merging them into
/// `options`.
pub fn parse_mount_options_into(
    options: &mut MountOptions,
    opts_str: &str,
) -> Result<(), MountError> {
    for opt in opts_str.split(',') {
        let opt = opt.trim();
        match opt {
            "allow_other" => options.allow_other = true,
            "allow_root" => options.allow_root = true,
            "default_permissions" => options.default_permissions = true,
            "auto_unmount" => options.auto_unmount = true,
            "ro" => options.ro = true,
            "rw" => options.ro = false,
            "" => {}
            _ if opt.starts_with('=') || opt.ends_with('=') => {
                return Err(MountError::InvalidOption(opt.to_string()));
            }
            _ => options.custom.push(opt.to_string()),
        }
    }
    Ok(())
}

/// Parses one comma-separated option string.
pub fn parse_mount_options(opts_str: &str) -> Result<MountOptions, MountError> {
    let mut options = MountOptions::default();
    parse_mount_options_into(&mut options, opts_str)?;
    Ok(options)
}

/// Convert MountOptions to fuser::MountOption vec.
pub fn options_to_fuser(opts: &MountOptions) -> Vec<fuser::MountOption> {
    let mut fuser_opts = vec![
        fuser::MountOption::FSName(FS_NAME.to_string()),
        fuser::MountOption::Subtype(FS_NAME.to_string()),
    ];

    if opts.allow_other {
        fuser_opts.push(fuser::MountOption::AllowOther);
    }

    if opts.allow_root {
        fuser_opts.push(fuser::MountOption::AllowRoot);
    }

    if opts.default_permissions {
        fuser_opts.push(fuser::MountOption::DefaultPermissions);
    }

    if opts.auto_unmount {
        fuser_opts.push(fuser::MountOption::AutoUnmount);
    }

    if opts.ro {
        fuser_opts.push(fuser::MountOption::RO);
    }

    for custom in &opts.custom {
        fuser_opts.push(fuser::MountOption::CUSTOM(custom.clone()));
    }

    fuser_opts
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_options_have_expected_values() {
        let opts = MountOptions::default();
        assert!(!opts.allow_other);
        assert!(!opts.allow_root);
        assert!(!opts.default_permissions);
        assert!(!opts.auto_unmount);
        assert!(!opts.ro);
        assert!(opts.custom.is_empty());
    }

    #[test]
    fn test_parse_mount_options_allow_other_and_ro() {
        let opts = parse_mount_options("allow_other,ro").unwrap();
        assert!(opts.allow_other);
        assert!(opts.ro);
        assert!(opts.custom.is_empty());
    }

    #[test]
    fn test_parse_mount_options_unknown_is_passed_through() {
        let opts = parse_mount_options("direct_io,max_read=65536").unwrap();
        assert_eq!(opts.custom, vec!["direct_io", "max_read=65536"]);
    }

    #[test]
    fn test_parse_mount_options_malformed_returns_error() {
        let result = parse_mount_options("max_read=");
        assert!(matches!(result, Err(MountError::InvalidOption(_))));
    }

    #[test]
    fn test_parse_mount_options_empty_returns_default() {
        let opts = parse_mount_options("").unwrap();
        assert_eq!(opts, MountOptions::default());
    }

    #[test]
    fn test_parse_mount_options_ro_rw() {
        let opts = parse_mount_options("ro").unwrap();
        assert!(opts.ro);

        let opts = parse_mount_options("ro,rw").unwrap();
        assert!(!opts.ro);
    }

    #[test]
    fn test_parse_mount_options_with_spaces() {
        let opts = parse_mount_options("allow_other, ro ").unwrap();
        assert!(opts.allow_other);
        assert!(opts.ro);
    }

    #[test]
    fn test_parse_into_merges_repeated_flags() {
        let mut opts = parse_mount_options("allow_other").unwrap();
        parse_mount_options_into(&mut opts, "default_permissions,noatime").unwrap();
        assert!(opts.allow_other);
        assert!(opts.default_permissions);
        assert_eq!(opts.custom, vec!["noatime"]);
    }

    #[test]
    fn test_validate_mountpoint_with_nonexistent_path() {
        let result = validate_mountpoint(Path::new("/nonexistent_path_12345"));
        assert!(matches!(result, Err(MountError::PathNotFound(_))));
    }

    #[test]
    fn test_validate_mountpoint_with_file_not_dir() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("blokfs_test_file.txt");
        fs::write(&file, "test").unwrap();

        let result = validate_mountpoint(&file);
        assert!(matches!(result, Err(MountError::NotADirectory(_))));
    }

    #[test]
    fn test_validate_mountpoint_with_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_mountpoint(dir.path()).is_ok());
    }

    #[test]
    fn test_options_to_fuser_names_the_filesystem() {
        let fuser_opts = options_to_fuser(&MountOptions::default());
        assert!(fuser_opts
            .iter()
            .any(|o| matches!(o, fuser::MountOption::FSName(s) if s == "blokfs")));
        assert!(fuser_opts
            .iter()
            .any(|o| matches!(o, fuser::MountOption::Subtype(s) if s == "blokfs")));
    }

    #[test]
    fn test_options_to_fuser_includes_all() {
        let opts = MountOptions {
            allow_other: true,
            allow_root: false,
            default_permissions: true,
            auto_unmount: true,
            ro: true,
            custom: vec!["noatime".into()],
        };

        let fuser_opts = options_to_fuser(&opts);

        assert!(fuser_opts
            .iter()
            .any(|o| matches!(o, fuser::MountOption::AllowOther)));
        assert!(!fuser_opts
            .iter()
            .any(|o| matches!(o, fuser::MountOption::AllowRoot)));
        assert!(fuser_opts
            .iter()
            .any(|o| matches!(o, fuser::MountOption::DefaultPermissions)));
        assert!(fuser_opts
            .iter()
            .any(|o| matches!(o, fuser::MountOption::AutoUnmount)));
        assert!(fuser_opts
            .iter()
            .any(|o| matches!(o, fuser::MountOption::RO)));
        assert!(fuser_opts
            .iter()
            .any(|o| matches!(o, fuser::MountOption::CUSTOM(s) if s == "noatime")));
    }
}
