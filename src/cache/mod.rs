//! Caching layer consulted by [`crate::fs::adapter::FilesystemAdapter`].
//!
//! All three caches are built on [`moka::sync::Cache`] for LRU-ish eviction
//! and concurrent access, with per-entry expiry tracked manually in the
//! stored value rather than through moka's built-in TTL policy — this is
//! what lets positive and negative attribute entries carry different TTLs
//! in the same cache.

pub mod attr;
pub mod dir;
pub mod readahead;

pub use attr::{AttrCache, CacheLookup};
pub use dir::DirCache;
pub use readahead::ReadAheadBuffer;
