//! Runtime metrics: request counters and a bounded latency sample ring per
//! operation class.
//!
//! Grounded on `write_counter.rs`'s plain-struct-of-atomics style: no
//! external metrics crate, just `AtomicU64` counters plus a mutex-guarded
//! ring buffer for latency percentiles, sized the way a single connection's
//! worth of history is cheap to keep in memory.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Samples retained for percentile computation, per class.
const LATENCY_RING_SIZE: usize = 1000;

/// A call is unhealthy-flagged once its error rate or read/write p95 crosses
/// these thresholds.
const UNHEALTHY_ERROR_RATE: f64 = 0.5;
const UNHEALTHY_LATENCY: Duration = Duration::from_secs(5);

/// Broad categories a failed call is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    Auth,
    Access,
    RateLimited,
    Io,
    Protocol,
}

/// Which latency ring a call's timing is recorded into. Mirrors
/// [`crate::rate_limit::OpClass`] but collapses `Control` into `Other` since
/// spec-level health only looks at read/write p95.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    Read,
    Write,
    Other,
}

struct LatencyRing {
    samples: Vec<u64>,
    next: usize,
    filled: usize,
}

impl LatencyRing {
    fn new() -> Self {
        Self { samples: vec![0; LATENCY_RING_SIZE], next: 0, filled: 0 }
    }

    fn push(&mut self, micros: u64) {
        self.samples[self.next] = micros;
        self.next = (self.next + 1) % LATENCY_RING_SIZE;
        self.filled = (self.filled + 1).min(LATENCY_RING_SIZE);
    }

    fn snapshot(&self) -> LatencyStats {
        if self.filled == 0 {
            return LatencyStats { avg_micros: 0, p95_micros: 0, max_micros: 0 };
        }
        let mut sorted: Vec<u64> = self.samples[..self.filled].to_vec();
        sorted.sort_unstable();
        let sum: u64 = sorted.iter().sum();
        let avg = sum / sorted.len() as u64;
        let idx = ((sorted.len() as f64) * 0.95) as usize;
        let p95 = sorted[idx.min(sorted.len() - 1)];
        let max = *sorted.last().unwrap();
        LatencyStats { avg_micros: avg, p95_micros: p95, max_micros: max }
    }
}

/// A point-in-time latency summary.
#[derive(Clone, Copy, Debug, Default)]
pub struct LatencyStats {
    pub avg_micros: u64,
    pub p95_micros: u64,
    pub max_micros: u64,
}

struct Rings {
    read: LatencyRing,
    write: LatencyRing,
    other: LatencyRing,
}

impl Rings {
    fn new() -> Self {
        Self { read: LatencyRing::new(), write: LatencyRing::new(), other: LatencyRing::new() }
    }

    fn ring_mut(&mut self, kind: OpKind) -> &mut LatencyRing {
        match kind {
            OpKind::Read => &mut self.read,
            OpKind::Write => &mut self.write,
            OpKind::Other => &mut self.other,
        }
    }
}

/// Deep-copy snapshot returned by [`Metrics::snapshot`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_ok: u64,
    pub auth_failures: u64,
    pub access_failures: u64,
    pub rate_limited: u64,
    pub io_errors: u64,
    pub protocol_errors: u64,
    pub active_connections: u64,
    pub rejected_connections: u64,
    pub attr_cache_hits: u64,
    pub attr_cache_misses: u64,
    pub dir_cache_hits: u64,
    pub dir_cache_misses: u64,
    pub read_latency: LatencyStats,
    pub write_latency: LatencyStats,
    pub other_latency: LatencyStats,
    pub healthy: bool,
}

/// Server-wide counters, updated from the connection and handler layers.
#[derive(Default)]
pub struct Metrics {
    requests_total: AtomicU64,
    requests_ok: AtomicU64,
    auth_failures: AtomicU64,
    access_failures: AtomicU64,
    rate_limited: AtomicU64,
    io_errors: AtomicU64,
    protocol_errors: AtomicU64,
    active_connections: AtomicU64,
    rejected_connections: AtomicU64,
    attr_cache_hits: AtomicU64,
    attr_cache_misses: AtomicU64,
    dir_cache_hits: AtomicU64,
    dir_cache_misses: AtomicU64,
    latency: Mutex<Option<Rings>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self { latency: Mutex::new(Some(Rings::new())), ..Default::default() }
    }

    pub fn record_success(&self, kind: OpKind, elapsed: Duration) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.requests_ok.fetch_add(1, Ordering::Relaxed);
        self.push_latency(kind, elapsed);
    }

    pub fn record_failure(&self, class: FailureClass, kind: OpKind, elapsed: Duration) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        match class {
            FailureClass::Auth => self.auth_failures.fetch_add(1, Ordering::Relaxed),
            FailureClass::Access => self.access_failures.fetch_add(1, Ordering::Relaxed),
            FailureClass::RateLimited => self.rate_limited.fetch_add(1, Ordering::Relaxed),
            FailureClass::Io => self.io_errors.fetch_add(1, Ordering::Relaxed),
            FailureClass::Protocol => self.protocol_errors.fetch_add(1, Ordering::Relaxed),
        };
        self.push_latency(kind, elapsed);
    }

    fn push_latency(&self, kind: OpKind, elapsed: Duration) {
        let mut guard = self.latency.lock().unwrap();
        let rings = guard.get_or_insert_with(Rings::new);
        rings.ring_mut(kind).push(elapsed.as_micros() as u64);
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// A connection was refused outright because `MaxConnections` was
    /// already in use.
    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attr_cache(&self, hit: bool) {
        if hit {
            self.attr_cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.attr_cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_dir_cache(&self, hit: bool) {
        if hit {
            self.dir_cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dir_cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn rejected_connections(&self) -> u64 {
        self.rejected_connections.load(Ordering::Relaxed)
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Aggregate latency across all op classes, kept for callers that don't
    /// care about the read/write split.
    pub fn latency_stats(&self) -> LatencyStats {
        let guard = self.latency.lock().unwrap();
        let Some(rings) = guard.as_ref() else { return LatencyStats::default() };
        let mut combined: Vec<u64> = Vec::new();
        for ring in [&rings.read, &rings.write, &rings.other] {
            combined.extend_from_slice(&ring.samples[..ring.filled]);
        }
        if combined.is_empty() {
            return LatencyStats::default();
        }
        combined.sort_unstable();
        let sum: u64 = combined.iter().sum();
        let avg = sum / combined.len() as u64;
        let idx = ((combined.len() as f64) * 0.95) as usize;
        let p95 = combined[idx.min(combined.len() - 1)];
        let max = *combined.last().unwrap();
        LatencyStats { avg_micros: avg, p95_micros: p95, max_micros: max }
    }

    pub fn latency_stats_for(&self, kind: OpKind) -> LatencyStats {
        let guard = self.latency.lock().unwrap();
        match guard.as_ref() {
            Some(rings) => match kind {
                OpKind::Read => rings.read.snapshot(),
                OpKind::Write => rings.write.snapshot(),
                OpKind::Other => rings.other.snapshot(),
            },
            None => LatencyStats::default(),
        }
    }

    /// Unhealthy when more than half of all recorded calls failed, or the
    /// read or write p95 latency exceeds 5 seconds.
    pub fn is_healthy(&self) -> bool {
        let total = self.requests_total();
        if total > 0 {
            let ok = self.requests_ok.load(Ordering::Relaxed);
            let error_rate = 1.0 - (ok as f64 / total as f64);
            if error_rate > UNHEALTHY_ERROR_RATE {
                return false;
            }
        }
        let read_p95 = Duration::from_micros(self.latency_stats_for(OpKind::Read).p95_micros);
        let write_p95 = Duration::from_micros(self.latency_stats_for(OpKind::Write).p95_micros);
        read_p95 <= UNHEALTHY_LATENCY && write_p95 <= UNHEALTHY_LATENCY
    }

    /// A deep-copy point-in-time view of every counter and latency ring.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total(),
            requests_ok: self.requests_ok.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            access_failures: self.access_failures.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            io_errors: self.io_errors.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            active_connections: self.active_connections(),
            rejected_connections: self.rejected_connections(),
            attr_cache_hits: self.attr_cache_hits.load(Ordering::Relaxed),
            attr_cache_misses: self.attr_cache_misses.load(Ordering::Relaxed),
            dir_cache_hits: self.dir_cache_hits.load(Ordering::Relaxed),
            dir_cache_misses: self.dir_cache_misses.load(Ordering::Relaxed),
            read_latency: self.latency_stats_for(OpKind::Read),
            write_latency: self.latency_stats_for(OpKind::Write),
            other_latency: self.latency_stats_for(OpKind::Other),
            healthy: self.is_healthy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_counts() {
        let m = Metrics::new();
        m.record_success(OpKind::Read, Duration::from_millis(1));
        m.record_failure(FailureClass::Auth, OpKind::Other, Duration::from_millis(1));
        assert_eq!(m.requests_total(), 2);
        assert_eq!(m.auth_failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn latency_percentiles_are_sane() {
        let m = Metrics::new();
        for i in 1..=100u64 {
            m.record_success(OpKind::Read, Duration::from_micros(i));
        }
        let stats = m.latency_stats_for(OpKind::Read);
        assert!(stats.p95_micros >= 90 && stats.p95_micros <= 100);
        assert_eq!(stats.max_micros, 100);
    }

    #[test]
    fn unhealthy_on_high_error_rate() {
        let m = Metrics::new();
        for _ in 0..1 {
            m.record_success(OpKind::Read, Duration::from_millis(1));
        }
        for _ in 0..2 {
            m.record_failure(FailureClass::Io, OpKind::Read, Duration::from_millis(1));
        }
        assert!(!m.is_healthy());
    }

    #[test]
    fn unhealthy_on_slow_write_p95() {
        let m = Metrics::new();
        for _ in 0..10 {
            m.record_success(OpKind::Write, Duration::from_secs(6));
        }
        assert!(!m.is_healthy());
    }

    #[test]
    fn healthy_by_default() {
        let m = Metrics::new();
        assert!(m.is_healthy());
        m.record_success(OpKind::Read, Duration::from_millis(1));
        assert!(m.is_healthy());
    }

    #[test]
    fn cache_counters_round_trip() {
        let m = Metrics::new();
        m.record_attr_cache(true);
        m.record_attr_cache(false);
        m.record_dir_cache(true);
        let snap = m.snapshot();
        assert_eq!(snap.attr_cache_hits, 1);
        assert_eq!(snap.attr_cache_misses, 1);
        assert_eq!(snap.dir_cache_hits, 1);
    }
}
