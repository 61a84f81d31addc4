//! Server configuration accepted at construction time.
//!
//! There is no file or CLI parsing in the core — callers build an
//! [`ExportOptions`] in code and hand it to `server::Server::bind`. This
//! mirrors the teacher's approach of taking plain constructor parameters
//! (see `vfs::Capabilities`): configuration is a value, not a side-loaded
//! file.

use std::net::IpAddr;
use std::time::Duration;

/// How client-supplied uid/gid are remapped before being handed to the
/// backing filesystem.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SquashPolicy {
    /// No remapping.
    #[default]
    None,
    /// Remap uid 0 / gid 0 to the configured anonymous ids.
    Root,
    /// Remap every caller to the configured anonymous ids.
    All,
}

/// Certificate/key paths for an optional TLS-terminating listener.
///
/// Inert: nothing in this crate reads `ExportOptions::tls` to wrap the
/// accept loop. Certificate loading and TLS handshake machinery are an
/// external collaborator surface (spec.md §6) the core never implements;
/// this field exists so a caller-supplied wrapper around
/// `server::Server::serve`'s accepted socket has somewhere to read its
/// paths from without inventing its own configuration struct.
#[derive(Clone, Debug, Default)]
pub struct TlsConfig {
    /// PEM certificate chain path.
    pub cert_path: std::path::PathBuf,
    /// PEM private key path.
    pub key_path: std::path::PathBuf,
}

/// A single entry in an IP allow-list: either an exact address or a CIDR block.
#[derive(Clone, Copy, Debug)]
pub enum AllowedIp {
    /// Match this address exactly.
    Single(IpAddr),
    /// Match any address within this network.
    Cidr(IpAddr, u8),
}

impl AllowedIp {
    /// Parses a singleton address or a `addr/prefix` CIDR string.
    ///
    /// Returns `None` on malformed input; callers should skip invalid
    /// entries rather than treat the whole configuration as fatal (this is
    /// what §4.D of the governing design asks for).
    pub fn parse(s: &str) -> Option<Self> {
        if let Some((addr, prefix)) = s.split_once('/') {
            let addr: IpAddr = addr.trim().parse().ok()?;
            let prefix: u8 = prefix.trim().parse().ok()?;
            let max_prefix = if addr.is_ipv4() { 32 } else { 128 };
            if prefix > max_prefix {
                return None;
            }
            Some(AllowedIp::Cidr(addr, prefix))
        } else {
            Some(AllowedIp::Single(s.trim().parse().ok()?))
        }
    }

    /// Returns true if `ip` falls within this entry.
    pub fn matches(&self, ip: &IpAddr) -> bool {
        match self {
            AllowedIp::Single(a) => a == ip,
            AllowedIp::Cidr(net, prefix) => match (net, ip) {
                (IpAddr::V4(net), IpAddr::V4(ip)) => {
                    let mask = if *prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
                    (u32::from_be_bytes(net.octets()) & mask)
                        == (u32::from_be_bytes(ip.octets()) & mask)
                }
                (IpAddr::V6(net), IpAddr::V6(ip)) => {
                    let mask = if *prefix == 0 { 0 } else { u128::MAX << (128 - prefix) };
                    (u128::from_be_bytes(net.octets()) & mask)
                        == (u128::from_be_bytes(ip.octets()) & mask)
                }
                _ => false,
            },
        }
    }
}

/// Rate-limiter tuning, applied uniformly across op classes unless overridden.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    /// Bucket capacity (max burst).
    pub capacity: f64,
    /// Tokens refilled per second.
    pub refill_per_sec: f64,
    /// A bucket is evicted once its IP has been silent this long.
    pub idle_eviction: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { capacity: 100.0, refill_per_sec: 50.0, idle_eviction: Duration::from_secs(300) }
    }
}

/// Full configuration for a single NFS export, covering access control,
/// caching, read-ahead, rate limiting, and connection limits.
///
/// This is the crate's single configuration surface (spec §3, §6): no file
/// or environment parsing happens here, that belongs to the caller.
#[derive(Clone)]
pub struct ExportOptions {
    /// Reject all mutating operations with `NFS3ERR_ROFS`/`ACCESS_DENIED`.
    pub read_only: bool,
    /// Require the client's source port to be a privileged port (<1024).
    pub secure: bool,
    /// Uid/gid remapping policy.
    pub squash: SquashPolicy,
    /// Uid substituted for squashed callers.
    pub anon_uid: u32,
    /// Gid substituted for squashed callers.
    pub anon_gid: u32,
    /// Non-empty to restrict mounts to the listed addresses/networks.
    pub allowed_ips: Vec<AllowedIp>,

    /// TTL for positive and negative attribute-cache entries.
    pub attr_cache_timeout: Duration,
    /// Maximum number of attribute-cache entries (positive + negative).
    pub attr_cache_size: u64,
    /// Whether failed lookups populate the negative cache.
    pub cache_negative_lookups: bool,
    /// TTL for negative attribute-cache entries.
    pub negative_cache_timeout: Duration,

    /// Whether directory listings are cached at all.
    pub enable_dir_cache: bool,
    /// TTL for directory-cache entries.
    pub dir_cache_timeout: Duration,
    /// Maximum number of cached directories.
    pub dir_cache_max_entries: u64,
    /// A directory with more entries than this is never cached.
    pub dir_cache_max_dir_size: usize,

    /// Whether read-ahead is enabled at all.
    pub enable_read_ahead: bool,
    /// Minimum number of bytes fetched per read-ahead fill.
    pub read_ahead_size: usize,
    /// Maximum number of files tracked by the read-ahead buffer.
    pub read_ahead_max_files: u64,
    /// Maximum aggregate bytes held by the read-ahead buffer.
    pub read_ahead_max_memory: u64,

    /// Maximum bytes moved per READ/WRITE call.
    pub transfer_size: u32,

    /// Whether the rate limiter gates operations at all.
    pub enable_rate_limiting: bool,
    /// Rate-limiter tuning (ignored when `enable_rate_limiting` is false).
    pub rate_limit: RateLimitConfig,

    /// Maximum number of simultaneously open connections.
    pub max_connections: usize,
    /// A connection idle for longer than this is closed by the sweeper.
    pub idle_timeout: Duration,
    /// Whether to set `SO_KEEPALIVE` on accepted sockets.
    pub tcp_keepalive: bool,
    /// Whether to set `TCP_NODELAY` on accepted sockets.
    pub tcp_nodelay: bool,
    /// `SO_SNDBUF` override, if any.
    pub send_buffer_size: Option<u32>,
    /// `SO_RCVBUF` override, if any.
    pub receive_buffer_size: Option<u32>,

    /// Number of workers in the optional worker pool; `0` disables it and
    /// runs all handlers inline on the connection task.
    pub max_workers: usize,
    /// How long `submit_wait` waits for a free worker before running inline.
    pub worker_queue_timeout: Duration,

    /// Whether the adapter coalesces small sequential operations.
    pub batch_operations: bool,
    /// Upper bound on operations coalesced into one batch.
    pub max_batch_size: usize,

    /// Certificate/key paths for a caller-supplied TLS wrapper around the
    /// accept loop. `None` by default; this crate never reads it itself.
    pub tls: Option<TlsConfig>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            secure: false,
            squash: SquashPolicy::None,
            anon_uid: 65534,
            anon_gid: 65534,
            allowed_ips: Vec::new(),

            attr_cache_timeout: Duration::from_secs(5),
            attr_cache_size: 10_000,
            cache_negative_lookups: true,
            negative_cache_timeout: Duration::from_secs(5),

            enable_dir_cache: true,
            dir_cache_timeout: Duration::from_secs(5),
            dir_cache_max_entries: 1_000,
            dir_cache_max_dir_size: 10_000,

            enable_read_ahead: true,
            read_ahead_size: 256 * 1024,
            read_ahead_max_files: 256,
            read_ahead_max_memory: 64 * 1024 * 1024,

            transfer_size: 64 * 1024,

            enable_rate_limiting: false,
            rate_limit: RateLimitConfig::default(),

            max_connections: 1024,
            idle_timeout: Duration::from_secs(300),
            tcp_keepalive: true,
            tcp_nodelay: true,
            send_buffer_size: None,
            receive_buffer_size: None,

            max_workers: 0,
            worker_queue_timeout: Duration::from_millis(50),

            batch_operations: false,
            max_batch_size: 32,

            tls: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_singleton_and_cidr() {
        let single = AllowedIp::parse("127.0.0.1").unwrap();
        assert!(single.matches(&"127.0.0.1".parse().unwrap()));
        assert!(!single.matches(&"127.0.0.2".parse().unwrap()));

        let cidr = AllowedIp::parse("10.0.0.0/24").unwrap();
        assert!(cidr.matches(&"10.0.0.42".parse().unwrap()));
        assert!(!cidr.matches(&"10.0.1.1".parse().unwrap()));
    }

    #[test]
    fn rejects_garbage() {
        assert!(AllowedIp::parse("not-an-ip").is_none());
        assert!(AllowedIp::parse("10.0.0.0/99").is_none());
    }
}
