//! Handle allocation: maps opaque 8-byte file handles to paths.
//!
//! Handles are allocated sequentially and recycled through a free list once
//! released, the way a slot allocator over a `Vec` typically works; handle
//! `0` is never issued so it can serve as a reserved/sentinel value at
//! call sites that need one (e.g. a root handle computed independently).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Opaque handle identifying a path known to a [`crate::fs::BackingFs`].
pub type Handle = u64;

struct Inner {
    paths: Vec<Option<PathBuf>>,
    by_path: HashMap<PathBuf, Handle>,
    free_list: Vec<Handle>,
}

/// Bidirectional path <-> handle table.
///
/// A path already present keeps its existing handle (`allocate` is
/// idempotent per-path), so repeated lookups of the same file don't churn
/// through the handle space.
pub struct HandleTable {
    inner: RwLock<Inner>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                // index 0 is reserved and never handed out.
                paths: vec![None],
                by_path: HashMap::new(),
                free_list: Vec::new(),
            }),
        }
    }

    /// Returns the handle for `path`, allocating a fresh one if this is the
    /// first time the path has been seen.
    pub fn allocate(&self, path: &Path) -> Handle {
        {
            let inner = self.inner.read().unwrap();
            if let Some(h) = inner.by_path.get(path) {
                return *h;
            }
        }
        let mut inner = self.inner.write().unwrap();
        if let Some(h) = inner.by_path.get(path) {
            return *h;
        }
        let handle = if let Some(h) = inner.free_list.pop() {
            inner.paths[h as usize] = Some(path.to_path_buf());
            h
        } else {
            let h = inner.paths.len() as Handle;
            inner.paths.push(Some(path.to_path_buf()));
            h
        };
        inner.by_path.insert(path.to_path_buf(), handle);
        handle
    }

    /// Resolves a handle back to its path, if still live.
    pub fn get(&self, handle: Handle) -> Option<PathBuf> {
        let inner = self.inner.read().unwrap();
        inner.paths.get(handle as usize).and_then(|p| p.clone())
    }

    /// Looks up the handle already allocated for `path`, if any, without
    /// allocating a new one.
    pub fn find(&self, path: &Path) -> Option<Handle> {
        let inner = self.inner.read().unwrap();
        inner.by_path.get(path).copied()
    }

    /// Releases a handle, freeing its slot for reuse.
    pub fn release(&self, handle: Handle) {
        if handle == 0 {
            return;
        }
        let mut inner = self.inner.write().unwrap();
        if let Some(slot) = inner.paths.get_mut(handle as usize) {
            if let Some(path) = slot.take() {
                inner.by_path.remove(&path);
                inner.free_list.push(handle);
            }
        }
    }

    /// Re-keys an existing handle to a new path, for rename operations.
    ///
    /// Children of a renamed directory are the caller's responsibility —
    /// this only updates the single entry named by `handle`.
    pub fn rekey(&self, handle: Handle, new_path: &Path) {
        let mut inner = self.inner.write().unwrap();
        if let Some(slot) = inner.paths.get_mut(handle as usize) {
            if let Some(old_path) = slot.take() {
                inner.by_path.remove(&old_path);
            }
            *slot = Some(new_path.to_path_buf());
            inner.by_path.insert(new_path.to_path_buf(), handle);
        }
    }

    /// Number of handles currently live (excludes the reserved slot 0 and
    /// freed slots).
    pub fn count(&self) -> usize {
        let inner = self.inner.read().unwrap();
        inner.paths.iter().filter(|p| p.is_some()).count()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_is_idempotent_per_path() {
        let table = HandleTable::new();
        let h1 = table.allocate(Path::new("/a"));
        let h2 = table.allocate(Path::new("/a"));
        assert_eq!(h1, h2);
        assert_ne!(h1, 0);
    }

    #[test]
    fn release_recycles_slot() {
        let table = HandleTable::new();
        let h1 = table.allocate(Path::new("/a"));
        table.release(h1);
        assert!(table.get(h1).is_none());
        let h2 = table.allocate(Path::new("/b"));
        assert_eq!(h1, h2);
    }

    #[test]
    fn rekey_updates_path_lookup() {
        let table = HandleTable::new();
        let h = table.allocate(Path::new("/a"));
        table.rekey(h, Path::new("/b"));
        assert_eq!(table.get(h).unwrap(), Path::new("/b"));
        assert_eq!(table.allocate(Path::new("/b")), h);
    }
}
