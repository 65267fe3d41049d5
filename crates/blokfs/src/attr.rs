//! Conversions from underlying metadata into the attribute shapes the
//! transport replies with.

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::time::{Duration, SystemTime};

/// Type of a filesystem object, independent of the transport's own enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Regular file, also used for unknown types.
    RegularFile,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Block device.
    BlockDevice,
    /// Character device.
    CharDevice,
    /// FIFO.
    NamedPipe,
    /// Unix domain socket.
    Socket,
}

impl FileKind {
    /// Kind from the `S_IFMT` bits of a mode. Unknown bits map to a regular
    /// file.
    pub fn from_mode(mode: u32) -> Self {
        match mode & libc::S_IFMT as u32 {
            m if m == libc::S_IFDIR as u32 => FileKind::Directory,
            m if m == libc::S_IFLNK as u32 => FileKind::Symlink,
            m if m == libc::S_IFBLK as u32 => FileKind::BlockDevice,
            m if m == libc::S_IFCHR as u32 => FileKind::CharDevice,
            m if m == libc::S_IFIFO as u32 => FileKind::NamedPipe,
            m if m == libc::S_IFSOCK as u32 => FileKind::Socket,
            _ => FileKind::RegularFile,
        }
    }

    /// Kind from a `dirent::d_type` value. `DT_UNKNOWN` maps to a regular
    /// file; the kernel only uses it as a hint and looks the entry up anyway.
    pub fn from_dirent_type(d_type: u8) -> Self {
        match d_type {
            libc::DT_DIR => FileKind::Directory,
            libc::DT_LNK => FileKind::Symlink,
            libc::DT_BLK => FileKind::BlockDevice,
            libc::DT_CHR => FileKind::CharDevice,
            libc::DT_FIFO => FileKind::NamedPipe,
            libc::DT_SOCK => FileKind::Socket,
            _ => FileKind::RegularFile,
        }
    }
}

impl From<FileKind> for fuser::FileType {
    fn from(kind: FileKind) -> Self {
        match kind {
            FileKind::RegularFile => fuser::FileType::RegularFile,
            FileKind::Directory => fuser::FileType::Directory,
            FileKind::Symlink => fuser::FileType::Symlink,
            FileKind::BlockDevice => fuser::FileType::BlockDevice,
            FileKind::CharDevice => fuser::FileType::CharDevice,
            FileKind::NamedPipe => fuser::FileType::NamedPipe,
            FileKind::Socket => fuser::FileType::Socket,
        }
    }
}

fn system_time(secs: i64, nsecs: i64) -> SystemTime {
    let nanos = Duration::from_nanos(nsecs.clamp(0, 999_999_999) as u64);
    if secs >= 0 {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs as u64) + nanos
    } else {
        SystemTime::UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + nanos
    }
}

/// Builds the reply attributes for `ino` from `lstat`/`fstat` metadata.
pub fn metadata_to_fuser(ino: u64, meta: &Metadata) -> fuser::FileAttr {
    fuser::FileAttr {
        ino,
        size: meta.size(),
        blocks: meta.blocks(),
        atime: system_time(meta.atime(), meta.atime_nsec()),
        mtime: system_time(meta.mtime(), meta.mtime_nsec()),
        ctime: system_time(meta.ctime(), meta.ctime_nsec()),
        crtime: SystemTime::UNIX_EPOCH,
        kind: FileKind::from_mode(meta.mode()).into(),
        perm: (meta.mode() & 0o7777) as u16,
        nlink: meta.nlink() as u32,
        uid: meta.uid(),
        gid: meta.gid(),
        rdev: meta.rdev() as u32,
        blksize: meta.blksize() as u32,
        flags: 0,
    }
}

/// Filesystem statistics as reported by `statvfs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    /// Total data blocks, in `frsize` units.
    pub blocks: u64,
    /// Free blocks.
    pub bfree: u64,
    /// Free blocks available to unprivileged users.
    pub bavail: u64,
    /// Total inodes.
    pub files: u64,
    /// Free inodes.
    pub ffree: u64,
    /// Preferred I/O block size.
    pub bsize: u32,
    /// Longest file name.
    pub namelen: u32,
    /// Fragment size.
    pub frsize: u32,
}

impl From<&libc::statvfs> for StatFs {
    #[allow(clippy::unnecessary_cast)]
    fn from(st: &libc::statvfs) -> Self {
        StatFs {
            blocks: st.f_blocks as u64,
            bfree: st.f_bfree as u64,
            bavail: st.f_bavail as u64,
            files: st.f_files as u64,
            ffree: st.f_ffree as u64,
            bsize: st.f_bsize as u32,
            namelen: st.f_namemax as u32,
            frsize: st.f_frsize as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_mode_all_kinds() {
        assert_eq!(FileKind::from_mode(libc::S_IFREG as u32 | 0o644), FileKind::RegularFile);
        assert_eq!(FileKind::from_mode(libc::S_IFDIR as u32 | 0o755), FileKind::Directory);
        assert_eq!(FileKind::from_mode(libc::S_IFLNK as u32 | 0o777), FileKind::Symlink);
        assert_eq!(FileKind::from_mode(libc::S_IFBLK as u32), FileKind::BlockDevice);
        assert_eq!(FileKind::from_mode(libc::S_IFCHR as u32), FileKind::CharDevice);
        assert_eq!(FileKind::from_mode(libc::S_IFIFO as u32), FileKind::NamedPipe);
        assert_eq!(FileKind::from_mode(libc::S_IFSOCK as u32), FileKind::Socket);
    }

    #[test]
    fn test_from_dirent_type_unknown_is_regular() {
        assert_eq!(FileKind::from_dirent_type(libc::DT_UNKNOWN), FileKind::RegularFile);
        assert_eq!(FileKind::from_dirent_type(libc::DT_DIR), FileKind::Directory);
        assert_eq!(FileKind::from_dirent_type(libc::DT_FIFO), FileKind::NamedPipe);
    }

    #[test]
    fn test_fuser_type_conversion() {
        assert_eq!(
            fuser::FileType::from(FileKind::NamedPipe),
            fuser::FileType::NamedPipe
        );
        assert_eq!(
            fuser::FileType::from(FileKind::Directory),
            fuser::FileType::Directory
        );
    }

    #[test]
    fn test_system_time_before_epoch() {
        let t = system_time(-10, 500);
        assert!(t < SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn test_metadata_to_fuser_uses_given_ino() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"hello").unwrap();
        let meta = std::fs::symlink_metadata(&file).unwrap();

        let attr = metadata_to_fuser(77, &meta);
        assert_eq!(attr.ino, 77);
        assert_eq!(attr.size, 5);
        assert_eq!(attr.kind, fuser::FileType::RegularFile);
        assert_eq!(u32::from(attr.perm), meta.mode() & 0o7777);
    }
}
