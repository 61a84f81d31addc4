//! Per-client token-bucket rate limiting.
//!
//! Grounded on the same mutex-guarded-map-plus-lazy-housekeeping shape as
//! `protocol::rpc::transaction_tracker::TransactionTracker`: a single
//! `Mutex<HashMap<..>>` holds one bucket per (client IP, operation class),
//! refilled lazily on access rather than by a background ticker.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

/// Coarse grouping of NFS/MOUNT procedures sharing one bucket per client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpClass {
    /// Read-only operations: GETATTR, LOOKUP, READ, READDIR, READLINK, ACCESS.
    Read,
    /// Mutating operations: WRITE, CREATE, REMOVE, RENAME, MKDIR, RMDIR, SETATTR, SYMLINK, LINK.
    Write,
    /// MOUNT/UMOUNT/PORTMAP/RPCBIND calls.
    Control,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

/// A token-bucket rate limiter keyed by (client IP, [`OpClass`]).
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<(IpAddr, OpClass), Bucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config, buckets: Mutex::new(HashMap::new()) }
    }

    /// Attempts to consume one token for `(ip, class)`. Returns `false` when
    /// the bucket is exhausted and the caller should reject the operation.
    pub fn allow(&self, ip: IpAddr, class: OpClass) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap();
        self.housekeeping(&mut buckets, now);

        let bucket = buckets.entry((ip, class)).or_insert_with(|| Bucket {
            tokens: self.config.capacity,
            last_refill: now,
            last_seen: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.config.refill_per_sec).min(self.config.capacity);
        bucket.last_refill = now;
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Evicts buckets that have been idle past `config.idle_eviction`.
    fn housekeeping(&self, buckets: &mut HashMap<(IpAddr, OpClass), Bucket>, now: Instant) {
        buckets.retain(|_, b| now.saturating_duration_since(b.last_seen) < self.config.idle_eviction);
    }

    /// Number of buckets currently tracked, for diagnostics/tests.
    pub fn tracked_count(&self) -> usize {
        self.buckets.lock().unwrap().len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_then_refills() {
        let limiter = RateLimiter::new(RateLimitConfig {
            capacity: 2.0,
            refill_per_sec: 1000.0,
            idle_eviction: Duration::from_secs(60),
        });
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.allow(ip, OpClass::Read));
        assert!(limiter.allow(ip, OpClass::Read));
        assert!(!limiter.allow(ip, OpClass::Read));

        std::thread::sleep(Duration::from_millis(5));
        assert!(limiter.allow(ip, OpClass::Read));
    }

    #[test]
    fn tokens_never_exceed_capacity_after_long_idle() {
        let limiter = RateLimiter::new(RateLimitConfig {
            capacity: 5.0,
            refill_per_sec: 1000.0,
            idle_eviction: Duration::from_secs(60),
        });
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.allow(ip, OpClass::Read));
        std::thread::sleep(Duration::from_millis(50));
        // A long idle period refills past capacity arithmetically; `allow`
        // must clamp to `capacity` rather than letting tokens accumulate
        // unbounded, or a client could bank up an effectively unlimited
        // burst just by waiting.
        for _ in 0..5 {
            assert!(limiter.allow(ip, OpClass::Read));
        }
        assert!(!limiter.allow(ip, OpClass::Read));
    }

    #[test]
    fn classes_are_independent() {
        let limiter = RateLimiter::new(RateLimitConfig {
            capacity: 1.0,
            refill_per_sec: 0.0,
            idle_eviction: Duration::from_secs(60),
        });
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.allow(ip, OpClass::Read));
        assert!(!limiter.allow(ip, OpClass::Read));
        assert!(limiter.allow(ip, OpClass::Write));
    }
}
