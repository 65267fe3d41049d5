//! Pass-through handlers: every call is forwarded to the same call on the
//! resolved real path or on the open descriptor.

use std::fs::{self, File, Metadata, OpenOptions, Permissions};
use std::mem::MaybeUninit;
use std::os::fd::FromRawFd;
use std::os::unix::fs::{DirBuilderExt, FileExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

use tracing::{debug, info};

use crate::attr::StatFs;
use crate::error::{FsError, Result};
use crate::handle::{DirEntry, DirHandle, FileHandle};
use crate::normalize::{cstring, cvt};
#[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
use crate::operations::XattrOperations;
use crate::operations::{Operations, TimeSpec};
use crate::session::MountSession;
use crate::telemetry::ACCESS_TARGET;

/// Forwards every operation to the directory tree under the session root.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Passthrough {
    /// The forwarder. It holds no state.
    pub fn new() -> Self {
        Self
    }
}

/// Access mode and remaining open flags mapped onto `OpenOptions`.
fn open_options(flags: i32) -> OpenOptions {
    let mut opts = OpenOptions::new();
    match flags & libc::O_ACCMODE {
        libc::O_WRONLY => opts.write(true),
        libc::O_RDWR => opts.read(true).write(true),
        _ => opts.read(true),
    };
    opts.custom_flags(flags & !libc::O_ACCMODE & !libc::O_CREAT);
    opts
}

fn to_off_t(size: u64) -> Result<libc::off_t> {
    libc::off_t::try_from(size)
        .map_err(|_| FsError::invalid(format!("offset out of range: {}", size)))
}

impl Operations for Passthrough {
    fn getattr(&self, cx: &MountSession, path: &Path) -> Result<Metadata> {
        let real = cx.resolve(path)?;
        Ok(fs::symlink_metadata(real)?)
    }

    fn fgetattr(&self, cx: &MountSession, path: &Path, fh: &FileHandle) -> Result<Metadata> {
        if path == Path::new("/") {
            return self.getattr(cx, path);
        }
        Ok(fh.file().metadata()?)
    }

    fn readlink(&self, cx: &MountSession, path: &Path, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Err(FsError::invalid("readlink buffer has no room for a terminator"));
        }
        let c_path = cstring(&cx.resolve(path)?)?;
        let n = cvt(unsafe {
            libc::readlink(c_path.as_ptr(), buf.as_mut_ptr().cast(), buf.len() - 1)
        })?;
        buf[n as usize] = 0;
        Ok(())
    }

    fn mknod(&self, cx: &MountSession, path: &Path, mode: u32, rdev: u64) -> Result<()> {
        let real = cx.resolve(path)?;
        let fmt = mode & libc::S_IFMT as u32;

        if fmt == libc::S_IFREG as u32 {
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(mode & 0o7777)
                .open(&real)?;
            FileHandle::new(file).close()?;
        } else if fmt == libc::S_IFIFO as u32 {
            let c_path = cstring(&real)?;
            cvt(unsafe { libc::mkfifo(c_path.as_ptr(), (mode & 0o7777) as libc::mode_t) })?;
        } else {
            let c_path = cstring(&real)?;
            cvt(unsafe {
                libc::mknod(c_path.as_ptr(), mode as libc::mode_t, rdev as libc::dev_t)
            })?;
        }
        Ok(())
    }

    fn mkdir(&self, cx: &MountSession, path: &Path, mode: u32) -> Result<()> {
        let real = cx.resolve(path)?;
        fs::DirBuilder::new().mode(mode & 0o7777).create(real)?;
        Ok(())
    }

    fn unlink(&self, cx: &MountSession, path: &Path) -> Result<()> {
        fs::remove_file(cx.resolve(path)?)?;
        Ok(())
    }

    fn rmdir(&self, cx: &MountSession, path: &Path) -> Result<()> {
        fs::remove_dir(cx.resolve(path)?)?;
        Ok(())
    }

    fn symlink(&self, cx: &MountSession, target: &Path, link: &Path) -> Result<()> {
        std::os::unix::fs::symlink(target, cx.resolve(link)?)?;
        Ok(())
    }

    fn rename(&self, cx: &MountSession, from: &Path, to: &Path) -> Result<()> {
        fs::rename(cx.resolve(from)?, cx.resolve(to)?)?;
        Ok(())
    }

    fn link(&self, cx: &MountSession, from: &Path, to: &Path) -> Result<()> {
        fs::hard_link(cx.resolve(from)?, cx.resolve(to)?)?;
        Ok(())
    }

    fn chmod(&self, cx: &MountSession, path: &Path, mode: u32) -> Result<()> {
        fs::set_permissions(cx.resolve(path)?, Permissions::from_mode(mode & 0o7777))?;
        Ok(())
    }

    fn chown(
        &self,
        cx: &MountSession,
        path: &Path,
        uid: Option<u32>,
        gid: Option<u32>,
    ) -> Result<()> {
        std::os::unix::fs::chown(cx.resolve(path)?, uid, gid)?;
        Ok(())
    }

    fn truncate(&self, cx: &MountSession, path: &Path, size: u64) -> Result<()> {
        let c_path = cstring(&cx.resolve(path)?)?;
        cvt(unsafe { libc::truncate(c_path.as_ptr(), to_off_t(size)?) })?;
        Ok(())
    }

    fn utimens(
        &self,
        cx: &MountSession,
        path: &Path,
        atime: TimeSpec,
        mtime: TimeSpec,
    ) -> Result<()> {
        let c_path = cstring(&cx.resolve(path)?)?;
        let times = [atime.to_timespec(), mtime.to_timespec()];
        cvt(unsafe { libc::utimensat(libc::AT_FDCWD, c_path.as_ptr(), times.as_ptr(), 0) })?;
        Ok(())
    }

    fn open(&self, cx: &MountSession, path: &Path, flags: i32) -> Result<FileHandle> {
        let real = cx.resolve(path)?;
        let file = open_options(flags).open(&real)?;
        debug!("Opened {} flags={:#o}", real.display(), flags);
        Ok(FileHandle::new(file))
    }

    fn create(&self, cx: &MountSession, path: &Path, mode: u32, flags: i32) -> Result<FileHandle> {
        let real = cx.resolve(path)?;
        let c_path = cstring(&real)?;
        // OpenOptions refuses O_CREAT with a read-only access mode.
        let fd = cvt(unsafe {
            libc::open(
                c_path.as_ptr(),
                flags | libc::O_CREAT | libc::O_CLOEXEC,
                (mode & 0o7777) as libc::c_uint,
            )
        })?;
        let file = unsafe { File::from_raw_fd(fd) };
        debug!("Created {} mode={:#o} flags={:#o}", real.display(), mode, flags);
        Ok(FileHandle::new(file))
    }

    fn read(
        &self,
        _cx: &MountSession,
        path: &Path,
        fh: &FileHandle,
        offset: u64,
        size: u32,
    ) -> Result<Vec<u8>> {
        info!(
            target: ACCESS_TARGET,
            filename = %path.display(),
            offset,
            size,
            "read"
        );
        let mut buf = vec![0u8; size as usize];
        let n = fh.file().read_at(&mut buf, offset)?;
        buf.truncate(n);
        Ok(buf)
    }

    fn write(
        &self,
        _cx: &MountSession,
        _path: &Path,
        fh: &FileHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<u32> {
        let n = fh.file().write_at(data, offset)?;
        Ok(n as u32)
    }

    fn statfs(&self, cx: &MountSession, path: &Path) -> Result<StatFs> {
        let c_path = cstring(&cx.resolve(path)?)?;
        let mut st = MaybeUninit::<libc::statvfs>::uninit();
        cvt(unsafe { libc::statvfs(c_path.as_ptr(), st.as_mut_ptr()) })?;
        let st = unsafe { st.assume_init() };
        Ok(StatFs::from(&st))
    }

    fn flush(&self, _cx: &MountSession, _path: &Path, _fh: &FileHandle) -> Result<()> {
        Ok(())
    }

    fn release(&self, _cx: &MountSession, _path: &Path, fh: FileHandle) -> Result<()> {
        fh.close()?;
        Ok(())
    }

    fn fsync(
        &self,
        _cx: &MountSession,
        _path: &Path,
        fh: &FileHandle,
        datasync: bool,
    ) -> Result<()> {
        if datasync {
            fh.file().sync_data()?;
        } else {
            fh.file().sync_all()?;
        }
        Ok(())
    }

    fn opendir(&self, cx: &MountSession, path: &Path) -> Result<DirHandle> {
        DirHandle::open(&cx.resolve(path)?)
    }

    fn readdir(
        &self,
        _cx: &MountSession,
        _path: &Path,
        dh: &DirHandle,
        offset: i64,
        filler: &mut dyn FnMut(&DirEntry) -> bool,
    ) -> Result<usize> {
        dh.fill(offset, |entry| filler(entry))
    }

    fn releasedir(&self, _cx: &MountSession, _path: &Path, dh: DirHandle) -> Result<()> {
        dh.close()?;
        Ok(())
    }

    fn fsyncdir(
        &self,
        _cx: &MountSession,
        _path: &Path,
        _dh: &DirHandle,
        _datasync: bool,
    ) -> Result<()> {
        Ok(())
    }

    fn access(&self, cx: &MountSession, path: &Path, mask: i32) -> Result<()> {
        let c_path = cstring(&cx.resolve(path)?)?;
        cvt(unsafe { libc::access(c_path.as_ptr(), mask) })?;
        Ok(())
    }

    fn ftruncate(
        &self,
        _cx: &MountSession,
        _path: &Path,
        fh: &FileHandle,
        size: u64,
    ) -> Result<()> {
        to_off_t(size)?;
        fh.file().set_len(size)?;
        Ok(())
    }

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
    fn xattr(&self, cx: &MountSession) -> Option<&dyn XattrOperations> {
        if cx.xattr_enabled() {
            Some(self)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn setup() -> (TempDir, MountSession) {
        let dir = tempfile::tempdir().unwrap();
        let cx = MountSession::new(dir.path()).unwrap();
        (dir, cx)
    }

    #[test]
    fn test_open_options_access_modes() {
        let (dir, cx) = setup();
        std::fs::write(dir.path().join("f"), b"abc").unwrap();
        let fs = Passthrough::new();

        let ro = fs.open(&cx, Path::new("/f"), libc::O_RDONLY).unwrap();
        assert!(fs.write(&cx, Path::new("/f"), &ro, 0, b"x").is_err());

        let rw = fs.open(&cx, Path::new("/f"), libc::O_RDWR).unwrap();
        assert_eq!(fs.write(&cx, Path::new("/f"), &rw, 0, b"x").unwrap(), 1);
        assert_eq!(fs.read(&cx, Path::new("/f"), &rw, 0, 8).unwrap(), b"xbc");
    }

    #[test]
    fn test_open_with_trunc_flag() {
        let (dir, cx) = setup();
        std::fs::write(dir.path().join("f"), b"abcdef").unwrap();
        let fs = Passthrough::new();

        let fh = fs
            .open(&cx, Path::new("/f"), libc::O_WRONLY | libc::O_TRUNC)
            .unwrap();
        fs.release(&cx, Path::new("/f"), fh).unwrap();
        assert_eq!(std::fs::metadata(dir.path().join("f")).unwrap().len(), 0);
    }

    #[test]
    fn test_create_exclusive_fails_on_existing() {
        let (dir, cx) = setup();
        std::fs::write(dir.path().join("f"), b"").unwrap();
        let err = Passthrough
            .create(&cx, Path::new("/f"), 0o644, libc::O_WRONLY | libc::O_EXCL)
            .unwrap_err();
        assert_eq!(err.to_errno(), libc::EEXIST);
    }

    #[test]
    fn test_create_read_only_access_mode() {
        let (dir, cx) = setup();
        let fh = Passthrough
            .create(&cx, Path::new("/r"), 0o600, libc::O_RDONLY)
            .unwrap();
        assert!(dir.path().join("r").is_file());
        Passthrough.release(&cx, Path::new("/r"), fh).unwrap();
    }

    #[test]
    fn test_read_past_end_is_short() {
        let (dir, cx) = setup();
        std::fs::write(dir.path().join("f"), b"0123456789").unwrap();
        let fh = Passthrough.open(&cx, Path::new("/f"), libc::O_RDONLY).unwrap();

        assert_eq!(Passthrough.read(&cx, Path::new("/f"), &fh, 8, 100).unwrap(), b"89");
        assert!(Passthrough
            .read(&cx, Path::new("/f"), &fh, 50, 100)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_readlink_truncates_and_terminates() {
        let (dir, cx) = setup();
        std::os::unix::fs::symlink("target-name", dir.path().join("l")).unwrap();

        let mut buf = [0xffu8; 7];
        Passthrough.readlink(&cx, Path::new("/l"), &mut buf).unwrap();
        assert_eq!(&buf, b"target\0");

        let mut big = [0xffu8; 64];
        Passthrough.readlink(&cx, Path::new("/l"), &mut big).unwrap();
        assert_eq!(&big[..12], b"target-name\0");
    }

    #[test]
    fn test_readlink_empty_buffer_is_einval() {
        let (dir, cx) = setup();
        std::os::unix::fs::symlink("t", dir.path().join("l")).unwrap();
        let err = Passthrough.readlink(&cx, Path::new("/l"), &mut []).unwrap_err();
        assert_eq!(err.to_errno(), libc::EINVAL);
    }

    #[test]
    fn test_mknod_regular_then_exists() {
        let (dir, cx) = setup();
        let mode = libc::S_IFREG as u32 | 0o640;
        Passthrough.mknod(&cx, Path::new("/n"), mode, 0).unwrap();
        assert!(dir.path().join("n").is_file());

        let err = Passthrough.mknod(&cx, Path::new("/n"), mode, 0).unwrap_err();
        assert_eq!(err.to_errno(), libc::EEXIST);
    }

    #[test]
    fn test_mknod_fifo() {
        use std::os::unix::fs::FileTypeExt;
        let (dir, cx) = setup();
        Passthrough
            .mknod(&cx, Path::new("/p"), libc::S_IFIFO as u32 | 0o600, 0)
            .unwrap();
        let meta = std::fs::symlink_metadata(dir.path().join("p")).unwrap();
        assert!(meta.file_type().is_fifo());
    }

    #[test]
    fn test_truncate_and_ftruncate() {
        let (dir, cx) = setup();
        let real: PathBuf = dir.path().join("f");
        std::fs::write(&real, b"0123456789").unwrap();

        Passthrough.truncate(&cx, Path::new("/f"), 4).unwrap();
        assert_eq!(std::fs::read(&real).unwrap(), b"0123");

        let fh = Passthrough.open(&cx, Path::new("/f"), libc::O_RDWR).unwrap();
        Passthrough.ftruncate(&cx, Path::new("/f"), &fh, 1).unwrap();
        assert_eq!(std::fs::read(&real).unwrap(), b"0");
    }

    #[test]
    fn test_utimens_sets_mtime() {
        use std::os::unix::fs::MetadataExt;
        use std::time::{Duration, UNIX_EPOCH};
        let (dir, cx) = setup();
        std::fs::write(dir.path().join("f"), b"").unwrap();

        let when = UNIX_EPOCH + Duration::from_secs(1_000_000);
        Passthrough
            .utimens(&cx, Path::new("/f"), TimeSpec::Omit, TimeSpec::Set(when))
            .unwrap();
        let meta = std::fs::metadata(dir.path().join("f")).unwrap();
        assert_eq!(meta.mtime(), 1_000_000);
    }

    #[test]
    fn test_access_missing_is_enoent() {
        let (_dir, cx) = setup();
        let err = Passthrough
            .access(&cx, Path::new("/missing"), libc::F_OK)
            .unwrap_err();
        assert_eq!(err.to_errno(), libc::ENOENT);
    }

    #[test]
    fn test_statfs_reports_blocks() {
        let (_dir, cx) = setup();
        let st = Passthrough.statfs(&cx, Path::new("/")).unwrap();
        assert!(st.bsize > 0);
        assert!(st.namelen > 0);
    }

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
    #[test]
    fn test_xattr_capability_follows_session_flag() {
        let (dir, _) = setup();
        let on = MountSession::new(dir.path()).unwrap();
        let off = MountSession::new(dir.path()).unwrap().with_xattr(false);
        assert!(Passthrough.xattr(&on).is_some());
        assert!(Passthrough.xattr(&off).is_none());
    }

    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
    #[test]
    fn test_xattr_capability_absent_without_platform_support() {
        let (_dir, cx) = setup();
        assert!(cx.xattr_enabled());
        assert!(Passthrough.xattr(&cx).is_none());
    }
}
