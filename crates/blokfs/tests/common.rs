//! Common fixtures for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use blokfs::handle::{DirEntry, DirHandle, FileHandle};
use blokfs::{MountSession, Operations, Passthrough};
use tempfile::TempDir;

/// A scratch root directory with a session over it.
pub struct Fixture {
    dir: TempDir,
    pub cx: MountSession,
    pub fs: Passthrough,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp root");
        let cx = MountSession::new(dir.path()).expect("session over temp root");
        Self {
            dir,
            cx,
            fs: Passthrough::new(),
        }
    }

    /// Real path of a virtual path.
    pub fn real(&self, virt: &str) -> PathBuf {
        self.cx.resolve(Path::new(virt)).expect("resolve")
    }

    pub fn write_real(&self, virt: &str, data: &[u8]) {
        std::fs::write(self.real(virt), data).expect("seed file");
    }

    pub fn create(&self, virt: &str) -> FileHandle {
        self.fs
            .create(&self.cx, Path::new(virt), 0o644, libc::O_RDWR)
            .expect("create")
    }

    pub fn open(&self, virt: &str, flags: i32) -> FileHandle {
        self.fs
            .open(&self.cx, Path::new(virt), flags)
            .expect("open")
    }

    /// Lists a directory in calls that each accept at most `per_call`
    /// entries, resuming from the last accepted offset.
    pub fn list_in_chunks(&self, virt: &str, per_call: usize) -> Vec<DirEntry> {
        let dh: DirHandle = self.fs.opendir(&self.cx, Path::new(virt)).expect("opendir");
        let mut all = Vec::new();
        let mut offset = 0;
        loop {
            let mut batch = Vec::new();
            let added = self
                .fs
                .readdir(&self.cx, Path::new(virt), &dh, offset, &mut |e: &DirEntry| {
                    if batch.len() == per_call {
                        return true;
                    }
                    batch.push(e.clone());
                    false
                })
                .expect("readdir");
            assert_eq!(added, batch.len());
            if added == 0 {
                break;
            }
            offset = batch.last().map(|e| e.next_offset).unwrap_or(offset);
            all.extend(batch);
        }
        self.fs
            .releasedir(&self.cx, Path::new(virt), dh)
            .expect("releasedir");
        all
    }
}
