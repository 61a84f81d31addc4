//! Read-ahead buffer: speculative prefetch of file contents.
//!
//! Purely advisory — a miss here never produces a wrong answer, only a
//! slower one, so on any doubt the entry is dropped rather than served.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use std::time::Instant;

use moka::sync::Cache;

#[derive(Clone)]
struct Entry {
    data: std::sync::Arc<Vec<u8>>,
    start_offset: u64,
    last_access: Instant,
}

impl Entry {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Caches recently-read byte ranges per file, weighted by byte size so the
/// aggregate held across all entries stays under `max_bytes`.
///
/// The separate file-count cap (`max_files`) is enforced alongside moka's
/// byte-weighted eviction: inserts beyond the file cap evict the
/// least-recently-touched entry first.
pub struct ReadAheadBuffer {
    cache: RwLock<Cache<PathBuf, Entry>>,
    max_files: Mutex<u64>,
    min_fill: usize,
    order: Mutex<Vec<PathBuf>>,
}

impl ReadAheadBuffer {
    pub fn new(max_files: u64, max_bytes: u64, min_fill: usize) -> Self {
        Self {
            cache: RwLock::new(build_cache(max_bytes)),
            max_files: Mutex::new(max_files),
            min_fill,
            order: Mutex::new(Vec::new()),
        }
    }

    /// Serves `[offset, offset+count)` from the buffer if a cached entry
    /// fully covers it.
    pub fn read(&self, path: &Path, offset: u64, count: u32) -> Option<Vec<u8>> {
        let entry = self.cache.read().unwrap().get(path)?;
        let start = entry.start_offset;
        let end = start + entry.len();
        let want_end = offset + count as u64;
        if offset < start || want_end > end {
            return None;
        }
        self.touch(path);
        let lo = (offset - start) as usize;
        let hi = (want_end - start) as usize;
        Some(entry.data[lo..hi].to_vec())
    }

    /// Populates the buffer with `data` read starting at `offset`, honoring
    /// the file-count cap with least-recently-touched eviction.
    pub fn fill(&self, path: &Path, offset: u64, data: Vec<u8>) {
        if data.is_empty() {
            return;
        }
        self.evict_if_over_file_cap(path);
        self.cache.read().unwrap().insert(
            path.to_path_buf(),
            Entry { data: std::sync::Arc::new(data), start_offset: offset, last_access: Instant::now() },
        );
        self.touch(path);
    }

    /// Minimum number of bytes a fill should fetch, per `ReadAheadSize`.
    pub fn min_fill(&self) -> usize {
        self.min_fill
    }

    pub fn clear_path(&self, path: &Path) {
        self.cache.read().unwrap().invalidate(path);
        self.order.lock().unwrap().retain(|p| p != path);
    }

    /// Applies new caps, rebuilding the underlying cache and dropping
    /// everything currently held (moka's `Cache` has no in-place capacity
    /// change). Matches [`ReadAheadBuffer::resize`] — both enforce the same
    /// two caps, kept as separate names for the two call sites the governing
    /// design distinguishes (initial tuning vs. a later runtime change).
    pub fn configure(&self, max_files: u64, max_bytes: u64) {
        *self.cache.write().unwrap() = build_cache(max_bytes);
        *self.max_files.lock().unwrap() = max_files;
        self.order.lock().unwrap().clear();
    }

    /// Alias of [`ReadAheadBuffer::configure`] for a runtime cap change.
    pub fn resize(&self, max_files: u64, max_bytes: u64) {
        self.configure(max_files, max_bytes);
    }

    pub fn max_files(&self) -> u64 {
        *self.max_files.lock().unwrap()
    }

    fn touch(&self, path: &Path) {
        let mut order = self.order.lock().unwrap();
        order.retain(|p| p != path);
        order.push(path.to_path_buf());
    }

    fn evict_if_over_file_cap(&self, incoming: &Path) {
        let mut order = self.order.lock().unwrap();
        let max_files = *self.max_files.lock().unwrap();
        if !order.iter().any(|p| p == incoming) && order.len() as u64 >= max_files {
            if let Some(oldest) = order.first().cloned() {
                self.cache.read().unwrap().invalidate(&oldest);
                order.retain(|p| p != &oldest);
            }
        }
    }
}

fn build_cache(max_bytes: u64) -> Cache<PathBuf, Entry> {
    Cache::builder()
        .max_capacity(max_bytes.max(1))
        .weigher(|_k: &PathBuf, v: &Entry| v.len().clamp(1, u32::MAX as u64) as u32)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_then_read_hits() {
        let buf = ReadAheadBuffer::new(10, 1024 * 1024, 0);
        let path = Path::new("/a");
        buf.fill(path, 0, vec![1, 2, 3, 4, 5]);
        assert_eq!(buf.read(path, 1, 2), Some(vec![2, 3]));
        assert_eq!(buf.read(path, 4, 2), None);
    }

    #[test]
    fn clear_path_drops_entry() {
        let buf = ReadAheadBuffer::new(10, 1024 * 1024, 0);
        let path = Path::new("/a");
        buf.fill(path, 0, vec![1, 2, 3]);
        buf.clear_path(path);
        assert_eq!(buf.read(path, 0, 1), None);
    }

    #[test]
    fn resize_drops_existing_entries_and_changes_caps() {
        let buf = ReadAheadBuffer::new(10, 1024 * 1024, 0);
        let path = Path::new("/a");
        buf.fill(path, 0, vec![1, 2, 3]);
        buf.resize(1, 1024);
        assert_eq!(buf.read(path, 0, 1), None);
        assert_eq!(buf.max_files(), 1);
    }
}
