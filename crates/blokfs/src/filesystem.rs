//! Binding of the operation table to the kernel transport.
//!
//! Implements `fuser::Filesystem` on top of any [`Operations`] table. The
//! kernel speaks in node numbers and raw handle values; this layer turns
//! them back into virtual paths and typed handles, calls the table, and
//! translates results into replies. Nothing is cached: attribute and entry
//! timeouts are zero, so every access reaches the underlying tree.

use std::ffi::OsStr;
use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::attr::metadata_to_fuser;
use crate::error::{FsError, Result};
use crate::handle::{DirEntry, DirHandle, FileHandle, HandleId, HandleTable};
use crate::node::{NodeId, NodeTable};
use crate::operations::{OpKind, Operations, TimeSpec, XattrOperations, XattrReply};
use crate::path_resolver::MAX_PATH_LEN;
use crate::session::MountSession;

const TTL: Duration = Duration::ZERO;

/// Replies with the errno of a failed result and returns from the callback.
macro_rules! try_reply {
    ($reply:expr, $op:expr, $result:expr) => {
        match $result {
            Ok(v) => v,
            Err(e) => {
                let e: FsError = e;
                debug!("{} failed: {}", $op, e);
                $reply.error(e.to_errno());
                return;
            }
        }
    };
}

fn time_spec(t: Option<TimeOrNow>) -> TimeSpec {
    match t {
        None => TimeSpec::Omit,
        Some(TimeOrNow::Now) => TimeSpec::Now,
        Some(TimeOrNow::SpecificTime(t)) => TimeSpec::Set(t),
    }
}

fn offset_u64(offset: i64) -> Result<u64> {
    u64::try_from(offset).map_err(|_| FsError::invalid(format!("negative offset: {}", offset)))
}

/// `fuser::Filesystem` over an operation table.
pub struct BlokFs<O: Operations> {
    session: Arc<MountSession>,
    ops: O,
    nodes: NodeTable,
    handles: HandleTable,
    on_destroy: Option<oneshot::Sender<()>>,
}

impl<O: Operations> BlokFs<O> {
    /// Binds `ops` to `session` with empty node and handle tables.
    pub fn new(session: Arc<MountSession>, ops: O) -> Self {
        Self {
            session,
            ops,
            nodes: NodeTable::new(),
            handles: HandleTable::new(),
            on_destroy: None,
        }
    }

    /// Signals `tx` once the transport tears the filesystem down.
    pub fn with_destroy_notify(mut self, tx: oneshot::Sender<()>) -> Self {
        self.on_destroy = Some(tx);
        self
    }

    /// The context passed to every operation.
    pub fn session(&self) -> &MountSession {
        &self.session
    }

    /// Files and directories currently open through this filesystem.
    pub fn open_handles(&self) -> usize {
        self.handles.file_count() + self.handles.dir_count()
    }

    fn path(&self, ino: NodeId) -> Result<PathBuf> {
        self.nodes.path(ino)
    }

    /// Path for calls that must go through even after the node was
    /// forgotten, so the handle still gets closed.
    fn path_or_root(&self, ino: NodeId) -> PathBuf {
        self.nodes.path(ino).unwrap_or_else(|_| PathBuf::from("/"))
    }

    fn file(&self, fh: u64) -> Result<Arc<FileHandle>> {
        self.handles.file(HandleId::from_raw(fh)?)
    }

    fn dir(&self, fh: u64) -> Result<Arc<DirHandle>> {
        self.handles.dir(HandleId::from_raw(fh)?)
    }

    fn xattr_ops(&self) -> Result<&dyn XattrOperations> {
        self.ops.xattr(&self.session).ok_or(FsError::XattrUnsupported)
    }

    /// Reads the attributes of `path` and counts a kernel reference to it.
    fn entry(&mut self, path: &Path) -> Result<FileAttr> {
        let meta = self.ops.getattr(&self.session, path)?;
        let ino = self.nodes.lookup(path);
        Ok(metadata_to_fuser(ino, &meta))
    }

    fn attr(&self, ino: NodeId, path: &Path, fh: Option<u64>) -> Result<FileAttr> {
        let handle = match fh.map(HandleId::from_raw).transpose()? {
            Some(id @ HandleId::File(_)) => Some(self.handles.file(id)?),
            _ => None,
        };
        let meta = match handle {
            Some(h) => self.ops.fgetattr(&self.session, path, &h)?,
            None => self.ops.getattr(&self.session, path)?,
        };
        Ok(metadata_to_fuser(ino, &meta))
    }

    fn release_file(&self, path: &Path, fh: u64) -> Result<()> {
        match self.handles.remove_file(HandleId::from_raw(fh)?)? {
            Some(handle) => self.ops.release(&self.session, path, handle),
            None => {
                debug!("release fh={:#x} deferred to last user", fh);
                Ok(())
            }
        }
    }

    fn release_dir(&self, path: &Path, fh: u64) -> Result<()> {
        match self.handles.remove_dir(HandleId::from_raw(fh)?)? {
            Some(handle) => self.ops.releasedir(&self.session, path, handle),
            None => Ok(()),
        }
    }
}

impl<O: Operations> Filesystem for BlokFs<O> {
    fn init(
        &mut self,
        _req: &Request<'_>,
        _config: &mut KernelConfig,
    ) -> std::result::Result<(), c_int> {
        debug!("blokfs init root={}", self.session.root().display());
        match self.ops.init(Arc::clone(&self.session)) {
            Ok(session) => {
                self.session = session;
                Ok(())
            }
            Err(e) => {
                warn!("{} failed: {}", OpKind::Init, e);
                Err(e.to_errno())
            }
        }
    }

    fn destroy(&mut self) {
        debug!("blokfs destroy");
        self.ops.destroy(&self.session);
        if let Some(tx) = self.on_destroy.take() {
            let _ = tx.send(());
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!("lookup parent={} name={:?}", parent, name);
        let path = try_reply!(reply, OpKind::Lookup, self.nodes.child_path(parent, name));
        let attr = try_reply!(reply, OpKind::Lookup, self.entry(&path));
        reply.entry(&TTL, &attr, 0);
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        debug!("forget ino={} nlookup={}", ino, nlookup);
        self.nodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, fh: Option<u64>, reply: ReplyAttr) {
        debug!("getattr ino={} fh={:?}", ino, fh);
        let path = try_reply!(reply, OpKind::GetAttr, self.path(ino));
        let attr = try_reply!(reply, OpKind::GetAttr, self.attr(ino, &path, fh));
        reply.attr(&TTL, &attr);
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!(
            "setattr ino={} size={:?} mode={:?} uid={:?} gid={:?}",
            ino, size, mode, uid, gid
        );
        let path = try_reply!(reply, OpKind::SetAttr, self.path(ino));
        let cx = &self.session;

        if let Some(mode) = mode {
            try_reply!(reply, OpKind::Chmod, self.ops.chmod(cx, &path, mode));
        }
        if uid.is_some() || gid.is_some() {
            try_reply!(reply, OpKind::Chown, self.ops.chown(cx, &path, uid, gid));
        }
        if let Some(size) = size {
            let file = match fh.map(HandleId::from_raw).transpose() {
                Ok(Some(id @ HandleId::File(_))) => self.handles.file(id).ok(),
                _ => None,
            };
            match file {
                Some(h) => try_reply!(
                    reply,
                    OpKind::FTruncate,
                    self.ops.ftruncate(cx, &path, &h, size)
                ),
                None => try_reply!(reply, OpKind::Truncate, self.ops.truncate(cx, &path, size)),
            }
        }
        if atime.is_some() || mtime.is_some() {
            try_reply!(
                reply,
                OpKind::Utimens,
                self.ops
                    .utimens(cx, &path, time_spec(atime), time_spec(mtime))
            );
        }

        let attr = try_reply!(reply, OpKind::SetAttr, self.attr(ino, &path, fh));
        reply.attr(&TTL, &attr);
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        debug!("readlink ino={}", ino);
        let path = try_reply!(reply, OpKind::ReadLink, self.path(ino));
        let mut buf = vec![0u8; MAX_PATH_LEN + 1];
        try_reply!(
            reply,
            OpKind::ReadLink,
            self.ops.readlink(&self.session, &path, &mut buf)
        );
        let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        reply.data(&buf[..len]);
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        debug!("mknod parent={} name={:?} mode={:o}", parent, name, mode);
        let path = try_reply!(reply, OpKind::MkNod, self.nodes.child_path(parent, name));
        try_reply!(
            reply,
            OpKind::MkNod,
            self.ops.mknod(&self.session, &path, mode, u64::from(rdev))
        );
        let attr = try_reply!(reply, OpKind::MkNod, self.entry(&path));
        reply.entry(&TTL, &attr, 0);
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        debug!("mkdir parent={} name={:?} mode={:o}", parent, name, mode);
        let path = try_reply!(reply, OpKind::MkDir, self.nodes.child_path(parent, name));
        try_reply!(reply, OpKind::MkDir, self.ops.mkdir(&self.session, &path, mode));
        let attr = try_reply!(reply, OpKind::MkDir, self.entry(&path));
        reply.entry(&TTL, &attr, 0);
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("unlink parent={} name={:?}", parent, name);
        let path = try_reply!(reply, OpKind::Unlink, self.nodes.child_path(parent, name));
        try_reply!(reply, OpKind::Unlink, self.ops.unlink(&self.session, &path));
        self.nodes.unlink(&path);
        reply.ok();
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("rmdir parent={} name={:?}", parent, name);
        let path = try_reply!(reply, OpKind::RmDir, self.nodes.child_path(parent, name));
        try_reply!(reply, OpKind::RmDir, self.ops.rmdir(&self.session, &path));
        self.nodes.unlink(&path);
        reply.ok();
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        debug!(
            "symlink parent={} name={:?} target={}",
            parent,
            link_name,
            target.display()
        );
        let path = try_reply!(reply, OpKind::Symlink, self.nodes.child_path(parent, link_name));
        try_reply!(
            reply,
            OpKind::Symlink,
            self.ops.symlink(&self.session, target, &path)
        );
        let attr = try_reply!(reply, OpKind::Symlink, self.entry(&path));
        reply.entry(&TTL, &attr, 0);
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        debug!(
            "rename parent={} name={:?} newparent={} newname={:?}",
            parent, name, newparent, newname
        );
        if flags != 0 {
            reply.error(libc::EINVAL);
            return;
        }
        let from = try_reply!(reply, OpKind::Rename, self.nodes.child_path(parent, name));
        let to = try_reply!(reply, OpKind::Rename, self.nodes.child_path(newparent, newname));
        try_reply!(reply, OpKind::Rename, self.ops.rename(&self.session, &from, &to));
        self.nodes.rename(&from, &to);
        reply.ok();
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        debug!("link ino={} newparent={} newname={:?}", ino, newparent, newname);
        let from = try_reply!(reply, OpKind::Link, self.path(ino));
        let to = try_reply!(reply, OpKind::Link, self.nodes.child_path(newparent, newname));
        try_reply!(reply, OpKind::Link, self.ops.link(&self.session, &from, &to));
        let attr = try_reply!(reply, OpKind::Link, self.entry(&to));
        reply.entry(&TTL, &attr, 0);
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!("open ino={} flags={:#o}", ino, flags);
        let path = try_reply!(reply, OpKind::Open, self.path(ino));
        let handle = try_reply!(reply, OpKind::Open, self.ops.open(&self.session, &path, flags));
        let id = self.handles.insert_file(handle);
        reply.opened(id.into_raw(), 0);
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        debug!("create parent={} name={:?} mode={:o}", parent, name, mode);
        let path = try_reply!(reply, OpKind::Create, self.nodes.child_path(parent, name));
        let handle = try_reply!(
            reply,
            OpKind::Create,
            self.ops.create(&self.session, &path, mode, flags)
        );
        let meta = match self.ops.fgetattr(&self.session, &path, &handle) {
            Ok(meta) => meta,
            Err(e) => {
                debug!("{} failed: {}", OpKind::Create, e);
                let _ = self.ops.release(&self.session, &path, handle);
                reply.error(e.to_errno());
                return;
            }
        };
        let ino = self.nodes.lookup(&path);
        let attr = metadata_to_fuser(ino, &meta);
        let id = self.handles.insert_file(handle);
        reply.created(&TTL, &attr, 0, id.into_raw(), 0);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!("read ino={} fh={:#x} offset={} size={}", ino, fh, offset, size);
        let path = self.path_or_root(ino);
        let handle = try_reply!(reply, OpKind::Read, self.file(fh));
        let offset = try_reply!(reply, OpKind::Read, offset_u64(offset));
        let data = try_reply!(
            reply,
            OpKind::Read,
            self.ops.read(&self.session, &path, &handle, offset, size)
        );
        reply.data(&data);
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        debug!("write ino={} fh={:#x} offset={} len={}", ino, fh, offset, data.len());
        let path = self.path_or_root(ino);
        let handle = try_reply!(reply, OpKind::Write, self.file(fh));
        let offset = try_reply!(reply, OpKind::Write, offset_u64(offset));
        let written = try_reply!(
            reply,
            OpKind::Write,
            self.ops.write(&self.session, &path, &handle, offset, data)
        );
        reply.written(written);
    }

    fn flush(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _lock_owner: u64,
        reply: ReplyEmpty,
    ) {
        let path = self.path_or_root(ino);
        let handle = try_reply!(reply, OpKind::Flush, self.file(fh));
        try_reply!(reply, OpKind::Flush, self.ops.flush(&self.session, &path, &handle));
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        debug!("release ino={} fh={:#x}", ino, fh);
        let path = self.path_or_root(ino);
        try_reply!(reply, OpKind::Release, self.release_file(&path, fh));
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request<'_>, ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        debug!("fsync ino={} fh={:#x} datasync={}", ino, fh, datasync);
        let path = self.path_or_root(ino);
        let handle = try_reply!(reply, OpKind::Fsync, self.file(fh));
        try_reply!(
            reply,
            OpKind::Fsync,
            self.ops.fsync(&self.session, &path, &handle, datasync)
        );
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        debug!("opendir ino={}", ino);
        let path = try_reply!(reply, OpKind::OpenDir, self.path(ino));
        let handle = try_reply!(reply, OpKind::OpenDir, self.ops.opendir(&self.session, &path));
        let id = self.handles.insert_dir(handle);
        reply.opened(id.into_raw(), 0);
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir ino={} fh={:#x} offset={}", ino, fh, offset);
        let path = self.path_or_root(ino);
        let handle = try_reply!(reply, OpKind::ReadDir, self.dir(fh));
        let mut filler = |entry: &DirEntry| {
            reply.add(entry.ino, entry.next_offset, entry.kind.into(), &entry.name)
        };
        let result = self
            .ops
            .readdir(&self.session, &path, &handle, offset, &mut filler);
        let added = try_reply!(reply, OpKind::ReadDir, result);
        debug!("readdir ino={} returned {} entries", ino, added);
        reply.ok();
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        debug!("releasedir ino={} fh={:#x}", ino, fh);
        let path = self.path_or_root(ino);
        try_reply!(reply, OpKind::ReleaseDir, self.release_dir(&path, fh));
        reply.ok();
    }

    fn fsyncdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        datasync: bool,
        reply: ReplyEmpty,
    ) {
        let path = self.path_or_root(ino);
        let handle = try_reply!(reply, OpKind::FsyncDir, self.dir(fh));
        try_reply!(
            reply,
            OpKind::FsyncDir,
            self.ops.fsyncdir(&self.session, &path, &handle, datasync)
        );
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        let path = self.path_or_root(ino);
        let st = try_reply!(reply, OpKind::StatFs, self.ops.statfs(&self.session, &path));
        reply.statfs(
            st.blocks, st.bfree, st.bavail, st.files, st.ffree, st.bsize, st.namelen, st.frsize,
        );
    }

    fn setxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        debug!("setxattr ino={} name={:?}", ino, name);
        let path = try_reply!(reply, OpKind::SetXAttr, self.path(ino));
        let xattr = try_reply!(reply, OpKind::SetXAttr, self.xattr_ops());
        try_reply!(
            reply,
            OpKind::SetXAttr,
            xattr.setxattr(&self.session, &path, name, value, flags)
        );
        reply.ok();
    }

    fn getxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        size: u32,
        reply: ReplyXattr,
    ) {
        debug!("getxattr ino={} name={:?} size={}", ino, name, size);
        let path = try_reply!(reply, OpKind::GetXAttr, self.path(ino));
        let xattr = try_reply!(reply, OpKind::GetXAttr, self.xattr_ops());
        match try_reply!(
            reply,
            OpKind::GetXAttr,
            xattr.getxattr(&self.session, &path, name, size)
        ) {
            XattrReply::Size(n) => reply.size(n),
            XattrReply::Data(data) => reply.data(&data),
        }
    }

    fn listxattr(&mut self, _req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        debug!("listxattr ino={} size={}", ino, size);
        let path = try_reply!(reply, OpKind::ListXAttr, self.path(ino));
        let xattr = try_reply!(reply, OpKind::ListXAttr, self.xattr_ops());
        match try_reply!(
            reply,
            OpKind::ListXAttr,
            xattr.listxattr(&self.session, &path, size)
        ) {
            XattrReply::Size(n) => reply.size(n),
            XattrReply::Data(data) => reply.data(&data),
        }
    }

    fn removexattr(&mut self, _req: &Request<'_>, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("removexattr ino={} name={:?}", ino, name);
        let path = try_reply!(reply, OpKind::RemoveXAttr, self.path(ino));
        let xattr = try_reply!(reply, OpKind::RemoveXAttr, self.xattr_ops());
        try_reply!(
            reply,
            OpKind::RemoveXAttr,
            xattr.removexattr(&self.session, &path, name)
        );
        reply.ok();
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        debug!("access ino={} mask={:#o}", ino, mask);
        let path = try_reply!(reply, OpKind::Access, self.path(ino));
        try_reply!(reply, OpKind::Access, self.ops.access(&self.session, &path, mask));
        reply.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passthrough::Passthrough;

    fn make_fs() -> (tempfile::TempDir, BlokFs<Passthrough>) {
        let dir = tempfile::tempdir().unwrap();
        let session = MountSession::new(dir.path()).unwrap();
        (dir, BlokFs::new(Arc::new(session), Passthrough))
    }

    #[test]
    fn test_new_filesystem_has_no_handles() {
        let (_dir, fs) = make_fs();
        assert_eq!(fs.open_handles(), 0);
        assert!(fs.session().xattr_enabled());
    }

    #[test]
    fn test_time_spec_mapping() {
        assert_eq!(time_spec(None), TimeSpec::Omit);
        assert_eq!(time_spec(Some(TimeOrNow::Now)), TimeSpec::Now);
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(5);
        assert_eq!(time_spec(Some(TimeOrNow::SpecificTime(t))), TimeSpec::Set(t));
    }

    #[test]
    fn test_negative_offset_rejected() {
        assert!(matches!(offset_u64(-1), Err(FsError::InvalidArgument { .. })));
        assert_eq!(offset_u64(4096).unwrap(), 4096);
    }

    #[test]
    fn test_entry_registers_node() {
        let (dir, mut fs) = make_fs();
        std::fs::write(dir.path().join("f"), b"abc").unwrap();

        let attr = fs.entry(Path::new("/f")).unwrap();
        assert_eq!(attr.size, 3);
        assert_eq!(fs.path(attr.ino).unwrap(), PathBuf::from("/f"));
    }

    #[test]
    fn test_attr_with_file_handle_uses_fgetattr() {
        let (dir, mut fs) = make_fs();
        std::fs::write(dir.path().join("f"), b"abcd").unwrap();
        let ino = fs.entry(Path::new("/f")).unwrap().ino;

        let handle = fs.ops.open(&fs.session, Path::new("/f"), libc::O_RDONLY).unwrap();
        let id = fs.handles.insert_file(handle);
        let attr = fs.attr(ino, Path::new("/f"), Some(id.into_raw())).unwrap();
        assert_eq!(attr.size, 4);
        assert_eq!(attr.ino, ino);

        fs.release_file(Path::new("/f"), id.into_raw()).unwrap();
        assert_eq!(fs.open_handles(), 0);
    }

    #[test]
    fn test_release_of_dir_handle_as_file_is_ebadf() {
        let (_dir, fs) = make_fs();
        let handle = fs.ops.opendir(&fs.session, Path::new("/")).unwrap();
        let id = fs.handles.insert_dir(handle);

        let err = fs.release_file(Path::new("/"), id.into_raw()).unwrap_err();
        assert_eq!(err.to_errno(), libc::EBADF);
        assert_eq!(fs.open_handles(), 1);

        fs.release_dir(Path::new("/"), id.into_raw()).unwrap();
        assert_eq!(fs.open_handles(), 0);
    }

    #[test]
    fn test_xattr_ops_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let session = MountSession::new(dir.path()).unwrap().with_xattr(false);
        let fs = BlokFs::new(Arc::new(session), Passthrough);
        assert!(matches!(fs.xattr_ops(), Err(FsError::XattrUnsupported)));
    }

    #[test]
    fn test_destroy_notifies() {
        let (_dir, fs) = make_fs();
        let (tx, mut rx) = oneshot::channel();
        let mut fs = fs.with_destroy_notify(tx);
        fs.destroy();
        assert!(rx.try_recv().is_ok());
    }
}
