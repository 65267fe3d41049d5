//! Node numbers for the transport.
//!
//! The kernel addresses objects by node number; every operation here works
//! on virtual paths. The table hands out a number per path on lookup, keeps
//! the kernel's lookup count for it, and follows renames so that a number
//! keeps naming the same object.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{FsError, Result};

/// Node number as used by the kernel.
pub type NodeId = u64;
/// Node number of the mount root.
pub const ROOT_NODE: NodeId = 1;

#[derive(Debug, Clone)]
struct NodeEntry {
    path: PathBuf,
    lookup_count: u64,
    /// False once the path was unlinked or replaced; the number stays valid
    /// until the kernel forgets it.
    linked: bool,
}

/// Node numbers currently known to the kernel.
#[derive(Debug)]
pub struct NodeTable {
    entries: HashMap<NodeId, NodeEntry>,
    by_path: HashMap<PathBuf, NodeId>,
    next_ino: NodeId,
}

impl Default for NodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeTable {
    /// A table holding only the root.
    pub fn new() -> Self {
        let mut table = NodeTable {
            entries: HashMap::new(),
            by_path: HashMap::new(),
            next_ino: ROOT_NODE + 1,
        };
        let root = PathBuf::from("/");
        table.entries.insert(
            ROOT_NODE,
            NodeEntry {
                path: root.clone(),
                lookup_count: 1,
                linked: true,
            },
        );
        table.by_path.insert(root, ROOT_NODE);
        table
    }

    /// Virtual path of a node.
    pub fn path(&self, ino: NodeId) -> Result<PathBuf> {
        self.entries
            .get(&ino)
            .map(|e| e.path.clone())
            .ok_or(FsError::UnknownInode { ino })
    }

    /// Virtual path of `name` inside directory `parent`.
    pub fn child_path(&self, parent: NodeId, name: &OsStr) -> Result<PathBuf> {
        Ok(self.path(parent)?.join(name))
    }

    /// Number for `path`, counting one more kernel reference to it.
    pub fn lookup(&mut self, path: &Path) -> NodeId {
        if let Some(&ino) = self.by_path.get(path) {
            if let Some(entry) = self.entries.get_mut(&ino) {
                entry.lookup_count += 1;
            }
            return ino;
        }

        let ino = self.next_ino;
        self.next_ino += 1;
        self.entries.insert(
            ino,
            NodeEntry {
                path: path.to_path_buf(),
                lookup_count: 1,
                linked: true,
            },
        );
        self.by_path.insert(path.to_path_buf(), ino);
        ino
    }

    /// Drops `n` kernel references; the node goes away at zero.
    pub fn forget(&mut self, ino: NodeId, n: u64) {
        if ino == ROOT_NODE {
            return;
        }
        let should_remove = match self.entries.get_mut(&ino) {
            Some(entry) => {
                entry.lookup_count = entry.lookup_count.saturating_sub(n);
                entry.lookup_count == 0
            }
            None => false,
        };
        if should_remove {
            if let Some(entry) = self.entries.remove(&ino) {
                if entry.linked {
                    self.by_path.remove(&entry.path);
                }
            }
        }
    }

    /// Detaches `path` from its number after an unlink or rmdir.
    pub fn unlink(&mut self, path: &Path) {
        if let Some(ino) = self.by_path.remove(path) {
            if let Some(entry) = self.entries.get_mut(&ino) {
                entry.linked = false;
            }
        }
    }

    /// Moves `from` and everything below it to `to`. Whatever `to` named
    /// before is detached.
    pub fn rename(&mut self, from: &Path, to: &Path) {
        if from == to {
            return;
        }
        self.unlink(to);

        let moved: Vec<(PathBuf, NodeId)> = self
            .by_path
            .iter()
            .filter(|(p, _)| p.starts_with(from))
            .map(|(p, &ino)| (p.clone(), ino))
            .collect();

        for (old, ino) in moved {
            let new = match old.strip_prefix(from) {
                Ok(rest) if rest.as_os_str().is_empty() => to.to_path_buf(),
                Ok(rest) => to.join(rest),
                Err(_) => continue,
            };
            self.by_path.remove(&old);
            self.by_path.insert(new.clone(), ino);
            if let Some(entry) = self.entries.get_mut(&ino) {
                debug!("node {} moved {} -> {}", ino, old.display(), new.display());
                entry.path = new;
            }
        }
    }

    /// Outstanding kernel references to a node.
    pub fn lookup_count(&self, ino: NodeId) -> Option<u64> {
        self.entries.get(&ino).map(|e| e.lookup_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_table_has_root() {
        let table = NodeTable::new();
        assert_eq!(table.path(ROOT_NODE).unwrap(), PathBuf::from("/"));
        assert_eq!(table.lookup_count(ROOT_NODE), Some(1));
    }

    #[test]
    fn test_child_path_of_root() {
        let table = NodeTable::new();
        assert_eq!(
            table.child_path(ROOT_NODE, OsStr::new("a.txt")).unwrap(),
            PathBuf::from("/a.txt")
        );
    }

    #[test]
    fn test_unknown_inode() {
        let table = NodeTable::new();
        assert!(matches!(table.path(42), Err(FsError::UnknownInode { ino: 42 })));
    }

    #[test]
    fn test_lookup_reuses_number_and_counts() {
        let mut table = NodeTable::new();
        let a = table.lookup(Path::new("/a"));
        let again = table.lookup(Path::new("/a"));
        assert_eq!(a, again);
        assert_eq!(table.lookup_count(a), Some(2));

        let b = table.lookup(Path::new("/b"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_forget_removes_at_zero() {
        let mut table = NodeTable::new();
        let a = table.lookup(Path::new("/a"));
        table.lookup(Path::new("/a"));

        table.forget(a, 1);
        assert!(table.path(a).is_ok());
        table.forget(a, 1);
        assert!(table.path(a).is_err());

        let fresh = table.lookup(Path::new("/a"));
        assert_ne!(fresh, a);
    }

    #[test]
    fn test_root_is_never_forgotten() {
        let mut table = NodeTable::new();
        table.forget(ROOT_NODE, 100);
        assert!(table.path(ROOT_NODE).is_ok());
    }

    #[test]
    fn test_rename_moves_subtree() {
        let mut table = NodeTable::new();
        let dir = table.lookup(Path::new("/d"));
        let file = table.lookup(Path::new("/d/f"));
        let sibling = table.lookup(Path::new("/dd"));

        table.rename(Path::new("/d"), Path::new("/e"));

        assert_eq!(table.path(dir).unwrap(), PathBuf::from("/e"));
        assert_eq!(table.path(file).unwrap(), PathBuf::from("/e/f"));
        assert_eq!(table.path(sibling).unwrap(), PathBuf::from("/dd"));
        assert_eq!(table.lookup(Path::new("/e/f")), file);
    }

    #[test]
    fn test_rename_over_existing_detaches_target() {
        let mut table = NodeTable::new();
        let src = table.lookup(Path::new("/src"));
        let dst = table.lookup(Path::new("/dst"));

        table.rename(Path::new("/src"), Path::new("/dst"));
        assert_eq!(table.lookup(Path::new("/dst")), src);

        // The replaced node lives on until forgotten, without a path binding.
        assert!(table.path(dst).is_ok());
        table.forget(dst, 1);
        assert!(table.path(dst).is_err());
        assert_eq!(table.lookup(Path::new("/dst")), src);
    }

    #[test]
    fn test_unlink_then_lookup_gets_new_number() {
        let mut table = NodeTable::new();
        let a = table.lookup(Path::new("/a"));
        table.unlink(Path::new("/a"));
        let b = table.lookup(Path::new("/a"));
        assert_ne!(a, b);

        table.forget(a, 1);
        assert_eq!(table.path(b).unwrap(), PathBuf::from("/a"));
    }
}
