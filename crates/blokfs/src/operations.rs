//! The operation table.
//!
//! Every filesystem call the transport can deliver is a method on
//! [`Operations`]. Handlers receive the mount session explicitly and the
//! virtual path of the object they act on; handle-based calls additionally
//! receive the typed handle that the matching open call produced.
//! Extended attributes are a separate, optional capability.

use std::ffi::OsStr;
use std::fmt;
use std::fs::Metadata;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::attr::StatFs;
use crate::error::Result;
use crate::handle::{DirEntry, DirHandle, FileHandle};
use crate::session::MountSession;

/// Operation names used in log lines. Each variant is the operation of the
/// same name.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Init,
    Destroy,
    Lookup,
    GetAttr,
    SetAttr,
    ReadLink,
    MkNod,
    MkDir,
    Unlink,
    RmDir,
    Symlink,
    Rename,
    Link,
    Chmod,
    Chown,
    Truncate,
    Utimens,
    Open,
    Create,
    Read,
    Write,
    StatFs,
    Flush,
    Release,
    Fsync,
    SetXAttr,
    GetXAttr,
    ListXAttr,
    RemoveXAttr,
    OpenDir,
    ReadDir,
    ReleaseDir,
    FsyncDir,
    Access,
    FTruncate,
}

impl OpKind {
    /// Lower-case name, as in the operation table.
    pub fn name(self) -> &'static str {
        match self {
            OpKind::Init => "init",
            OpKind::Destroy => "destroy",
            OpKind::Lookup => "lookup",
            OpKind::GetAttr => "getattr",
            OpKind::SetAttr => "setattr",
            OpKind::ReadLink => "readlink",
            OpKind::MkNod => "mknod",
            OpKind::MkDir => "mkdir",
            OpKind::Unlink => "unlink",
            OpKind::RmDir => "rmdir",
            OpKind::Symlink => "symlink",
            OpKind::Rename => "rename",
            OpKind::Link => "link",
            OpKind::Chmod => "chmod",
            OpKind::Chown => "chown",
            OpKind::Truncate => "truncate",
            OpKind::Utimens => "utimens",
            OpKind::Open => "open",
            OpKind::Create => "create",
            OpKind::Read => "read",
            OpKind::Write => "write",
            OpKind::StatFs => "statfs",
            OpKind::Flush => "flush",
            OpKind::Release => "release",
            OpKind::Fsync => "fsync",
            OpKind::SetXAttr => "setxattr",
            OpKind::GetXAttr => "getxattr",
            OpKind::ListXAttr => "listxattr",
            OpKind::RemoveXAttr => "removexattr",
            OpKind::OpenDir => "opendir",
            OpKind::ReadDir => "readdir",
            OpKind::ReleaseDir => "releasedir",
            OpKind::FsyncDir => "fsyncdir",
            OpKind::Access => "access",
            OpKind::FTruncate => "ftruncate",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A timestamp argument to `utimens`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSpec {
    /// The current time.
    Now,
    /// Leave the timestamp unchanged.
    Omit,
    /// An explicit time.
    Set(SystemTime),
}

impl TimeSpec {
    /// Form taken by `utimensat(2)`.
    pub fn to_timespec(self) -> libc::timespec {
        match self {
            TimeSpec::Now => libc::timespec {
                tv_sec: 0,
                tv_nsec: libc::UTIME_NOW,
            },
            TimeSpec::Omit => libc::timespec {
                tv_sec: 0,
                tv_nsec: libc::UTIME_OMIT,
            },
            TimeSpec::Set(t) => {
                let (secs, nanos) = match t.duration_since(UNIX_EPOCH) {
                    Ok(d) => (d.as_secs() as i64, d.subsec_nanos() as i64),
                    Err(e) => {
                        let d = e.duration();
                        let mut secs = -(d.as_secs() as i64);
                        let mut nanos = d.subsec_nanos() as i64;
                        if nanos > 0 {
                            secs -= 1;
                            nanos = 1_000_000_000 - nanos;
                        }
                        (secs, nanos)
                    }
                };
                libc::timespec {
                    tv_sec: secs as libc::time_t,
                    tv_nsec: nanos as _,
                }
            }
        }
    }
}

/// Reply to `getxattr`/`listxattr`: the required buffer size when the
/// caller asked with size 0, otherwise the data itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XattrReply {
    /// Bytes needed to hold the value or list.
    Size(u32),
    /// The value or list.
    Data(Vec<u8>),
}

/// Handlers for every filesystem operation.
pub trait Operations: Send + Sync {
    /// Called once when the transport starts. The returned session is the
    /// context handed to every later call.
    fn init(&self, cx: Arc<MountSession>) -> Result<Arc<MountSession>> {
        Ok(cx)
    }

    /// Called once when the transport shuts down.
    fn destroy(&self, _cx: &MountSession) {}

    /// Attributes of the object itself; symlinks are not followed.
    fn getattr(&self, cx: &MountSession, path: &Path) -> Result<Metadata>;

    /// Attributes through an open handle.
    fn fgetattr(&self, cx: &MountSession, path: &Path, fh: &FileHandle) -> Result<Metadata>;

    /// Writes the link target into `buf`, NUL terminated, truncating it to
    /// `buf.len() - 1` bytes.
    fn readlink(&self, cx: &MountSession, path: &Path, buf: &mut [u8]) -> Result<()>;

    /// Creates a file, FIFO or device node.
    fn mknod(&self, cx: &MountSession, path: &Path, mode: u32, rdev: u64) -> Result<()>;

    /// Creates a directory.
    fn mkdir(&self, cx: &MountSession, path: &Path, mode: u32) -> Result<()>;

    /// Removes a non-directory.
    fn unlink(&self, cx: &MountSession, path: &Path) -> Result<()>;

    /// Removes an empty directory.
    fn rmdir(&self, cx: &MountSession, path: &Path) -> Result<()>;

    /// `target` is link content, not a virtual path.
    fn symlink(&self, cx: &MountSession, target: &Path, link: &Path) -> Result<()>;

    /// Renames `from` to `to`, replacing `to` if it exists.
    fn rename(&self, cx: &MountSession, from: &Path, to: &Path) -> Result<()>;

    /// Creates a hard link `to` naming `from`.
    fn link(&self, cx: &MountSession, from: &Path, to: &Path) -> Result<()>;

    /// Sets permission bits.
    fn chmod(&self, cx: &MountSession, path: &Path, mode: u32) -> Result<()>;

    /// Changes owner and/or group; `None` leaves that id alone.
    fn chown(&self, cx: &MountSession, path: &Path, uid: Option<u32>, gid: Option<u32>)
        -> Result<()>;

    /// Sets the length of a file by path.
    fn truncate(&self, cx: &MountSession, path: &Path, size: u64) -> Result<()>;

    /// Sets access and modification times.
    fn utimens(&self, cx: &MountSession, path: &Path, atime: TimeSpec, mtime: TimeSpec)
        -> Result<()>;

    /// Sets both times explicitly.
    fn utime(&self, cx: &MountSession, path: &Path, atime: SystemTime, mtime: SystemTime)
        -> Result<()> {
        self.utimens(cx, path, TimeSpec::Set(atime), TimeSpec::Set(mtime))
    }

    /// Opens an existing file.
    fn open(&self, cx: &MountSession, path: &Path, flags: i32) -> Result<FileHandle>;

    /// Creates and opens a file in one step.
    fn create(&self, cx: &MountSession, path: &Path, mode: u32, flags: i32) -> Result<FileHandle>;

    /// Reads up to `size` bytes at `offset`.
    fn read(
        &self,
        cx: &MountSession,
        path: &Path,
        fh: &FileHandle,
        offset: u64,
        size: u32,
    ) -> Result<Vec<u8>>;

    /// Writes `data` at `offset`, returning the bytes written.
    fn write(
        &self,
        cx: &MountSession,
        path: &Path,
        fh: &FileHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<u32>;

    /// Statistics of the filesystem holding `path`.
    fn statfs(&self, cx: &MountSession, path: &Path) -> Result<StatFs>;

    /// Called on every `close(2)` of a descriptor for this handle.
    fn flush(&self, cx: &MountSession, path: &Path, fh: &FileHandle) -> Result<()>;

    /// Closes a file handle once the kernel drops its last reference.
    fn release(&self, cx: &MountSession, path: &Path, fh: FileHandle) -> Result<()>;

    /// Flushes file data, and metadata unless `datasync` is set.
    fn fsync(&self, cx: &MountSession, path: &Path, fh: &FileHandle, datasync: bool)
        -> Result<()>;

    /// Opens a directory stream.
    fn opendir(&self, cx: &MountSession, path: &Path) -> Result<DirHandle>;

    /// Reports entries from `offset` on until the stream ends or `filler`
    /// returns `true` (reply buffer full). Returns how many were accepted.
    fn readdir(
        &self,
        cx: &MountSession,
        path: &Path,
        dh: &DirHandle,
        offset: i64,
        filler: &mut dyn FnMut(&DirEntry) -> bool,
    ) -> Result<usize>;

    /// Closes a directory stream.
    fn releasedir(&self, cx: &MountSession, path: &Path, dh: DirHandle) -> Result<()>;

    /// Flushes a directory.
    fn fsyncdir(&self, cx: &MountSession, path: &Path, dh: &DirHandle, datasync: bool)
        -> Result<()>;

    /// Checks `mask` against the caller permissions.
    fn access(&self, cx: &MountSession, path: &Path, mask: i32) -> Result<()>;

    /// Sets the length of a file through its handle.
    fn ftruncate(&self, cx: &MountSession, path: &Path, fh: &FileHandle, size: u64)
        -> Result<()>;

    /// The extended attribute capability, if this mount offers it.
    fn xattr(&self, _cx: &MountSession) -> Option<&dyn XattrOperations> {
        None
    }
}

/// Extended attribute handlers, offered through [`Operations::xattr`].
pub trait XattrOperations: Send + Sync {
    /// Sets an attribute.
    fn setxattr(
        &self,
        cx: &MountSession,
        path: &Path,
        name: &OsStr,
        value: &[u8],
        flags: i32,
    ) -> Result<()>;

    /// Reads an attribute, or its size when `size` is 0.
    fn getxattr(&self, cx: &MountSession, path: &Path, name: &OsStr, size: u32)
        -> Result<XattrReply>;

    /// Lists attribute names, or the list size when `size` is 0.
    fn listxattr(&self, cx: &MountSession, path: &Path, size: u32) -> Result<XattrReply>;

    /// Removes an attribute.
    fn removexattr(&self, cx: &MountSession, path: &Path, name: &OsStr) -> Result<()>;
}
