//! Attribute cache: path -> attributes, with negative-lookup support.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use moka::sync::Cache;

use crate::protocol::xdr::nfs3;

#[derive(Clone)]
struct Entry {
    attrs: Option<nfs3::fattr3>,
    expires_at: Instant,
}

/// Outcome of a single [`AttrCache::get`] call.
pub enum CacheLookup {
    Hit(nfs3::fattr3),
    /// A cached negative entry — the caller should short-circuit with `NFS3ERR_NOENT`.
    Negative,
    Miss,
}

struct Inner {
    cache: Cache<PathBuf, Entry>,
    ttl: Duration,
    negative_ttl: Duration,
}

/// Readers-writer-locked map from canonical path to attributes, shared
/// across lookups on the same adapter.
pub struct AttrCache {
    inner: RwLock<Inner>,
    max_capacity: u64,
    cache_negative: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    negative_hits: AtomicU64,
    negative_misses: AtomicU64,
}

impl AttrCache {
    pub fn new(max_capacity: u64, ttl: Duration, negative_ttl: Duration, cache_negative: bool) -> Self {
        Self {
            inner: RwLock::new(Inner { cache: Cache::new(max_capacity), ttl, negative_ttl }),
            max_capacity,
            cache_negative,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            negative_hits: AtomicU64::new(0),
            negative_misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, path: &Path) -> CacheLookup {
        let inner = self.inner.read().unwrap();
        if let Some(entry) = inner.cache.get(path) {
            if entry.expires_at > Instant::now() {
                return match entry.attrs {
                    Some(attrs) => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        CacheLookup::Hit(attrs)
                    }
                    None => {
                        self.negative_hits.fetch_add(1, Ordering::Relaxed);
                        CacheLookup::Negative
                    }
                };
            }
            inner.cache.invalidate(path);
        }
        match inner.cache.contains_key(path) {
            true => self.negative_misses.fetch_add(1, Ordering::Relaxed),
            false => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        CacheLookup::Miss
    }

    pub fn put(&self, path: &Path, attrs: nfs3::fattr3) {
        let inner = self.inner.read().unwrap();
        inner.cache.insert(
            path.to_path_buf(),
            Entry { attrs: Some(attrs), expires_at: Instant::now() + inner.ttl },
        );
    }

    pub fn put_negative(&self, path: &Path) {
        if !self.cache_negative {
            return;
        }
        let inner = self.inner.read().unwrap();
        inner.cache.insert(
            path.to_path_buf(),
            Entry { attrs: None, expires_at: Instant::now() + inner.negative_ttl },
        );
    }

    pub fn invalidate(&self, path: &Path) {
        self.inner.read().unwrap().cache.invalidate(path);
    }

    /// Drops every negative entry directly inside `dir` (not recursive).
    pub fn invalidate_negative_in_dir(&self, dir: &Path) {
        let inner = self.inner.read().unwrap();
        for (path, entry) in inner.cache.iter() {
            if entry.attrs.is_none() && path.parent() == Some(dir) {
                inner.cache.invalidate(&*path);
            }
        }
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.inner.read().unwrap().cache.invalidate_all();
    }

    /// Rebuilds the cache with a new maximum entry count, dropping everything
    /// currently held (moka's `Cache` has no in-place capacity change).
    pub fn resize(&self, new_capacity: u64) {
        let mut inner = self.inner.write().unwrap();
        inner.cache = Cache::new(new_capacity);
    }

    /// Changes the positive-entry TTL; only affects entries inserted after
    /// the call.
    pub fn update_ttl(&self, ttl: Duration) {
        self.inner.write().unwrap().ttl = ttl;
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn negative_hits(&self) -> u64 {
        self.negative_hits.load(Ordering::Relaxed)
    }

    pub fn negative_misses(&self) -> u64 {
        self.negative_misses.load(Ordering::Relaxed)
    }

    /// `(size, hits, misses)`, counting positive and negative lookups together.
    pub fn stats(&self) -> (u64, u64, u64) {
        let size = self.inner.read().unwrap().cache.entry_count();
        (size, self.hits() + self.negative_hits(), self.misses() + self.negative_misses())
    }

    pub fn max_capacity(&self) -> u64 {
        self.max_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs() -> nfs3::fattr3 {
        nfs3::fattr3::default()
    }

    #[test]
    fn hit_then_resize_clears() {
        let cache = AttrCache::new(10, Duration::from_secs(5), Duration::from_secs(5), true);
        let path = Path::new("/a");
        cache.put(path, attrs());
        assert!(matches!(cache.get(path), CacheLookup::Hit(_)));

        cache.resize(10);
        assert!(matches!(cache.get(path), CacheLookup::Miss));
    }

    #[test]
    fn update_ttl_applies_to_new_entries() {
        let cache = AttrCache::new(10, Duration::from_secs(5), Duration::from_secs(5), true);
        cache.update_ttl(Duration::from_millis(1));
        let path = Path::new("/a");
        cache.put(path, attrs());
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(cache.get(path), CacheLookup::Miss));
    }

    #[test]
    fn negative_lookup_short_circuits() {
        let cache = AttrCache::new(10, Duration::from_secs(5), Duration::from_secs(5), true);
        let path = Path::new("/missing");
        cache.put_negative(path);
        assert!(matches!(cache.get(path), CacheLookup::Negative));
    }
}
