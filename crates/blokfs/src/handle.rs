//! Open file and directory handles.
//!
//! A handle's number is the descriptor the underlying `open(2)` or
//! `opendir(3)` handed out, tagged with its kind so that a directory stream
//! can never be read as a file descriptor or the other way round. The raw
//! `u64` form is what the kernel round-trips between calls.

use std::ffi::{CStr, OsStr, OsString};
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, IntoRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use tracing::debug;

use crate::attr::FileKind;
use crate::error::{FsError, Result};
use crate::normalize::{clear_errno, cstring, cvt};

/// Bit set in the raw form of directory handles.
pub const DIR_TAG: u64 = 1 << 63;

/// A handle value with its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleId {
    /// Descriptor of an open file.
    File(RawFd),
    /// Descriptor behind an open directory stream.
    Dir(RawFd),
}

impl HandleId {
    /// Value handed to the kernel.
    pub fn into_raw(self) -> u64 {
        match self {
            HandleId::File(fd) => fd as u32 as u64,
            HandleId::Dir(fd) => DIR_TAG | fd as u32 as u64,
        }
    }

    /// Decodes a value the kernel sent back.
    pub fn from_raw(raw: u64) -> Result<Self> {
        let fd = raw & !DIR_TAG;
        if fd > i32::MAX as u64 {
            return Err(FsError::BadHandle { fh: raw });
        }
        if raw & DIR_TAG != 0 {
            Ok(HandleId::Dir(fd as RawFd))
        } else {
            Ok(HandleId::File(fd as RawFd))
        }
    }

    /// The descriptor, if this is a file handle.
    pub fn file_fd(self) -> Result<RawFd> {
        match self {
            HandleId::File(fd) => Ok(fd),
            HandleId::Dir(_) => Err(FsError::WrongHandleKind {
                fh: self.into_raw(),
                expected: "file",
            }),
        }
    }

    /// The descriptor, if this is a directory handle.
    pub fn dir_fd(self) -> Result<RawFd> {
        match self {
            HandleId::Dir(fd) => Ok(fd),
            HandleId::File(_) => Err(FsError::WrongHandleKind {
                fh: self.into_raw(),
                expected: "directory",
            }),
        }
    }
}

/// An open regular file. Dropping it closes the descriptor; [`close`]
/// does the same but reports the result of `close(2)`.
///
/// [`close`]: FileHandle::close
#[derive(Debug)]
pub struct FileHandle {
    file: File,
}

impl FileHandle {
    /// Wraps an already open file.
    pub fn new(file: File) -> Self {
        Self { file }
    }

    /// Tagged id of this handle.
    pub fn id(&self) -> HandleId {
        HandleId::File(self.file.as_raw_fd())
    }

    /// The open file, for positioned I/O.
    pub fn file(&self) -> &File {
        &self.file
    }

    /// Closes the descriptor and reports any error from `close(2)`.
    pub fn close(self) -> io::Result<()> {
        let fd = self.file.into_raw_fd();
        cvt(unsafe { libc::close(fd) }).map(drop)
    }
}

/// One entry produced by a directory stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Inode number on the underlying filesystem.
    pub ino: u64,
    /// Type hint from `d_type`.
    pub kind: FileKind,
    /// Entry name.
    pub name: OsString,
    /// Stream position just past this entry.
    pub next_offset: i64,
}

struct DirStream {
    dir: Option<NonNull<libc::DIR>>,
    /// Entry read from the stream but rejected by a full reply buffer.
    pending: Option<DirEntry>,
    offset: i64,
}

// The stream is only touched while holding the handle's mutex.
unsafe impl Send for DirStream {}

impl DirStream {
    fn ptr(&self) -> io::Result<*mut libc::DIR> {
        self.dir
            .map(NonNull::as_ptr)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EBADF))
    }

    fn seek(&mut self, offset: i64) -> io::Result<()> {
        let dir = self.ptr()?;
        if offset == 0 {
            unsafe { libc::rewinddir(dir) };
        } else {
            unsafe { libc::seekdir(dir, offset as libc::c_long) };
        }
        self.pending = None;
        self.offset = offset;
        Ok(())
    }

    fn next_entry(&mut self) -> io::Result<Option<DirEntry>> {
        if let Some(entry) = self.pending.take() {
            return Ok(Some(entry));
        }
        let dir = self.ptr()?;

        clear_errno();
        let ent = unsafe { libc::readdir(dir) };
        if ent.is_null() {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(0) | None => Ok(None),
                Some(_) => Err(err),
            };
        }

        let ent = unsafe { &*ent };
        let name = unsafe { CStr::from_ptr(ent.d_name.as_ptr()) };
        let next_offset = unsafe { libc::telldir(dir) } as i64;
        Ok(Some(DirEntry {
            ino: ent.d_ino as u64,
            kind: FileKind::from_dirent_type(ent.d_type),
            name: OsStr::from_bytes(name.to_bytes()).to_owned(),
            next_offset,
        }))
    }
}

impl Drop for DirStream {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            unsafe { libc::closedir(dir.as_ptr()) };
        }
    }
}

/// An open directory stream. The stream keeps its own position; callers
/// pass the offset the kernel last saw and the stream seeks only when the
/// two disagree.
pub struct DirHandle {
    fd: RawFd,
    path: PathBuf,
    stream: Mutex<DirStream>,
}

impl std::fmt::Debug for DirHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirHandle")
            .field("fd", &self.fd)
            .field("path", &self.path)
            .finish()
    }
}

impl DirHandle {
    /// Opens a stream on a real directory path.
    pub fn open(real_path: &Path) -> Result<Self> {
        let c_path = cstring(real_path)?;
        let dir = NonNull::new(unsafe { libc::opendir(c_path.as_ptr()) })
            .ok_or_else(io::Error::last_os_error)?;
        let fd = unsafe { libc::dirfd(dir.as_ptr()) };
        Ok(Self {
            fd,
            path: real_path.to_path_buf(),
            stream: Mutex::new(DirStream {
                dir: Some(dir),
                pending: None,
                offset: 0,
            }),
        })
    }

    /// Tagged id of this handle.
    pub fn id(&self) -> HandleId {
        HandleId::Dir(self.fd)
    }

    fn lock(&self) -> MutexGuard<'_, DirStream> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feeds entries starting at `offset` to `full`, which returns `true`
    /// once the reply buffer had no room for the entry it was given. That
    /// entry is kept and handed out first on the next call. Returns the
    /// number of entries accepted; a buffer that cannot take even the first
    /// entry fails the call with [`FsError::OutOfMemory`].
    pub fn fill<F>(&self, offset: i64, mut full: F) -> Result<usize>
    where
        F: FnMut(&DirEntry) -> bool,
    {
        let mut stream = self.lock();
        if offset != stream.offset {
            stream.seek(offset)?;
        }

        let mut added = 0;
        while let Some(entry) = stream.next_entry()? {
            if full(&entry) {
                stream.pending = Some(entry);
                if added == 0 {
                    return Err(FsError::OutOfMemory {
                        path: self.path.clone(),
                    });
                }
                break;
            }
            stream.offset = entry.next_offset;
            added += 1;
        }
        Ok(added)
    }

    /// Closes the stream and reports any error from `closedir(3)`.
    pub fn close(self) -> io::Result<()> {
        let mut stream = self.stream.into_inner().unwrap_or_else(PoisonError::into_inner);
        match stream.dir.take() {
            Some(dir) => cvt(unsafe { libc::closedir(dir.as_ptr()) }).map(drop),
            None => Ok(()),
        }
    }
}

/// Live handles for the transport, which only carries raw `u64` values.
#[derive(Default)]
pub struct HandleTable {
    files: DashMap<RawFd, Arc<FileHandle>>,
    dirs: DashMap<RawFd, Arc<DirHandle>>,
}

impl HandleTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an open file and returns its id.
    pub fn insert_file(&self, handle: FileHandle) -> HandleId {
        let id = handle.id();
        debug!("Registered file handle: fh={:#x}", id.into_raw());
        self.files.insert(handle.file.as_raw_fd(), Arc::new(handle));
        id
    }

    /// Registers an open directory stream and returns its id.
    pub fn insert_dir(&self, handle: DirHandle) -> HandleId {
        let id = handle.id();
        debug!("Registered dir handle: fh={:#x}", id.into_raw());
        self.dirs.insert(handle.fd, Arc::new(handle));
        id
    }

    /// Looks up an open file.
    pub fn file(&self, id: HandleId) -> Result<Arc<FileHandle>> {
        let fd = id.file_fd()?;
        self.files
            .get(&fd)
            .map(|h| Arc::clone(h.value()))
            .ok_or(FsError::BadHandle { fh: id.into_raw() })
    }

    /// Looks up an open directory stream.
    pub fn dir(&self, id: HandleId) -> Result<Arc<DirHandle>> {
        let fd = id.dir_fd()?;
        self.dirs
            .get(&fd)
            .map(|h| Arc::clone(h.value()))
            .ok_or(FsError::BadHandle { fh: id.into_raw() })
    }

    /// Unregisters a file handle. Returns the handle itself when no other
    /// call still holds it; otherwise the last holder closes it on drop.
    pub fn remove_file(&self, id: HandleId) -> Result<Option<FileHandle>> {
        let fd = id.file_fd()?;
        let (_, handle) = self
            .files
            .remove(&fd)
            .ok_or(FsError::BadHandle { fh: id.into_raw() })?;
        debug!("Unregistered file handle: fh={:#x}", id.into_raw());
        Ok(Arc::try_unwrap(handle).ok())
    }

    /// Unregisters a directory handle, like [`HandleTable::remove_file`].
    pub fn remove_dir(&self, id: HandleId) -> Result<Option<DirHandle>> {
        let fd = id.dir_fd()?;
        let (_, handle) = self
            .dirs
            .remove(&fd)
            .ok_or(FsError::BadHandle { fh: id.into_raw() })?;
        debug!("Unregistered dir handle: fh={:#x}", id.into_raw());
        Ok(Arc::try_unwrap(handle).ok())
    }

    /// Number of open files.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Number of open directory streams.
    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }
}
