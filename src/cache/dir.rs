//! Directory listing cache: directory path -> entry snapshot.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use moka::sync::Cache;

use crate::fs::DirEntry;

#[derive(Clone)]
struct Entry {
    entries: Arc<Vec<DirEntry>>,
    expires_at: Instant,
}

struct Inner {
    cache: Cache<PathBuf, Entry>,
    ttl: Duration,
}

/// Caches directory listings; directories larger than `max_dir_size` are
/// never cached since a single giant listing would dominate the cache.
pub struct DirCache {
    inner: RwLock<Inner>,
    max_entries: u64,
    max_dir_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DirCache {
    pub fn new(max_entries: u64, ttl: Duration, max_dir_size: usize) -> Self {
        Self {
            inner: RwLock::new(Inner { cache: Cache::new(max_entries), ttl }),
            max_entries,
            max_dir_size,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, path: &Path) -> Option<Arc<Vec<DirEntry>>> {
        let inner = self.inner.read().unwrap();
        match inner.cache.get(path) {
            Some(entry) if entry.expires_at > Instant::now() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.entries)
            }
            Some(_) => {
                inner.cache.invalidate(path);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, path: &Path, entries: Vec<DirEntry>) {
        if entries.len() > self.max_dir_size {
            return;
        }
        let inner = self.inner.read().unwrap();
        inner.cache.insert(
            path.to_path_buf(),
            Entry { entries: Arc::new(entries), expires_at: Instant::now() + inner.ttl },
        );
    }

    pub fn invalidate(&self, path: &Path) {
        self.inner.read().unwrap().cache.invalidate(path);
    }

    /// Rebuilds the cache with a new maximum entry count.
    pub fn resize(&self, max_entries: u64) {
        let mut inner = self.inner.write().unwrap();
        inner.cache = Cache::new(max_entries);
    }

    pub fn update_ttl(&self, ttl: Duration) {
        self.inner.write().unwrap().ttl = ttl;
    }

    pub fn max_entries(&self) -> u64 {
        self.max_entries
    }

    /// `(size, hits, misses)`.
    pub fn stats(&self) -> (u64, u64, u64) {
        let size = self.inner.read().unwrap().cache.entry_count();
        (size, self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_directory_is_not_cached() {
        let cache = DirCache::new(10, Duration::from_secs(5), 2);
        let path = Path::new("/big");
        cache.put(path, vec![DirEntry::default(), DirEntry::default(), DirEntry::default()]);
        assert!(cache.get(path).is_none());
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let cache = DirCache::new(10, Duration::from_secs(5), 10);
        let path = Path::new("/a");
        assert!(cache.get(path).is_none());
        cache.put(path, vec![DirEntry::default()]);
        assert!(cache.get(path).is_some());

        let (size, hits, misses) = cache.stats();
        assert_eq!(size, 1);
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);
    }

    #[test]
    fn resize_clears_entries() {
        let cache = DirCache::new(10, Duration::from_secs(5), 10);
        let path = Path::new("/a");
        cache.put(path, vec![DirEntry::default()]);
        cache.resize(10);
        assert!(cache.get(path).is_none());
    }
}
