//! NFS Mamont - A Network File System (NFS) server implementation in Rust
//!
//! This library provides a complete implementation of the NFS version 3 protocol
//! as defined in RFC 1813, allowing any Rust application to expose file systems
//! over the network to NFS clients.
//!
//! ## Supported Features
//!
//! - Full NFSv3 protocol implementation (all 21 procedures defined in RFC 1813)
//! - MOUNT protocol for filesystem exports
//! - PORTMAP protocol for service discovery
//! - TCP transport with record-marking framing
//! - Asynchronous operation with Tokio runtime
//! - Virtual File System abstraction for implementing custom backends
//!
//! ## Main Components
//!
//! - `vfs`: The Virtual File System API that must be implemented to create a custom NFS-exportable
//!   file system. This abstracts the underlying storage from the NFS protocol details.
//!
//! - `server`: Connection server that accepts client connections, applies connection-level
//!   limits and idle timeouts, and dispatches NFS protocol requests to the appropriate handlers.
//!
//! - `fs`: A path-keyed `BackingFs` trait plus `FilesystemAdapter`, bridging it to `vfs`
//!   with file-handle allocation, attribute/directory caching, and read-ahead.
//!
//! - `protocol`: Internal module that implements the NFS, MOUNT, and PORTMAP protocols,
//!   including XDR (External Data Representation) encoding/decoding.
//!
//! ## Standards Compliance
//!
//! This implementation follows these RFCs:
//! - RFC 1813: NFS Version 3 Protocol Specification
//! - RFC 5531: RPC: Remote Procedure Call Protocol Specification Version 2 (obsoletes RFC 1831)
//! - RFC 1832: XDR: External Data Representation Standard (obsoletes RFC 1014)
//! - RFC 1833: Binding Protocols for ONC RPC Version 2
//!
//! ## Usage
//!
//! To create an NFS server, implement the `NFSFileSystem` trait (or wrap a `BackingFs`
//! in `fs::adapter::FilesystemAdapter`) and pass it to `server::Server::bind`.

pub mod protocol;
mod write_counter;

pub mod cache;
pub mod config;
pub mod fs;
pub mod handle_table;
pub mod metrics;
pub mod rate_limit;
pub mod server;
pub mod vfs;
pub mod worker_pool;

pub use protocol::xdr;
