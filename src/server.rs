//! Connection server: accepts TCP connections, applies the connection-level
//! gate (IP allow-list, secure-port requirement), enforces a connection
//! cap, sweeps idle connections, and shuts down gracefully.
//!
//! Accepts connections, gates them with a [`tokio::sync::Semaphore`]
//! bounding concurrency, enforces a per-connection idle timeout inline in
//! each connection's own read loop, and shuts down gracefully via a
//! [`tokio::sync::Notify`] with a fixed grace period.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::ExportOptions;
use crate::metrics::Metrics;
use crate::protocol::nfs::portmap::PortmapTable;
use crate::protocol::rpc::auth::DenyReason;
use crate::protocol::{rpc, xdr};
use crate::rate_limit::RateLimiter;
use crate::vfs::NFSFileSystem;
use crate::worker_pool::WorkerPool;

/// Deadline given to in-flight connections to finish once shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A running NFS server: owns the listening socket and the shared state
/// every accepted connection's [`rpc::Context`] is built from.
pub struct Server<T: NFSFileSystem + Send + Sync + 'static> {
    listener: TcpListener,
    port: u16,
    fs: Arc<T>,
    export_name: Arc<String>,
    config: Arc<ExportOptions>,
    rate_limiter: Arc<RateLimiter>,
    metrics: Arc<Metrics>,
    worker_pool: Arc<WorkerPool>,
    transaction_tracker: Arc<rpc::TransactionTracker>,
    portmap_table: Arc<RwLock<PortmapTable>>,
    mount_signal: Option<mpsc::Sender<bool>>,
    connection_slots: Arc<Semaphore>,
    shutdown: Arc<Notify>,
    last_activity: Arc<AtomicU64>,
}

impl<T: NFSFileSystem + Send + Sync + 'static> Server<T> {
    pub async fn bind(addr: &str, fs: T, config: ExportOptions) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Listening on {:?}", addr);
        let port = match listener.local_addr()? {
            SocketAddr::V4(s) => s.port(),
            SocketAddr::V6(s) => s.port(),
        };
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit));
        let worker_pool = Arc::new(WorkerPool::new(config.max_workers));
        Ok(Self {
            listener,
            port,
            fs: Arc::new(fs),
            export_name: Arc::new("/".to_string()),
            connection_slots: Arc::new(Semaphore::new(config.max_connections)),
            config: Arc::new(config),
            rate_limiter,
            metrics: Arc::new(Metrics::new()),
            worker_pool,
            transaction_tracker: Arc::new(rpc::TransactionTracker::new(Duration::from_secs(60))),
            portmap_table: Arc::new(RwLock::new(PortmapTable::default())),
            mount_signal: None,
            shutdown: Arc::new(Notify::new()),
            last_activity: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn with_export_name<S: AsRef<str>>(mut self, export_name: S) -> Self {
        self.export_name =
            Arc::new(format!("/{}", export_name.as_ref().trim_matches('/')));
        self
    }

    pub fn set_mount_listener(&mut self, signal: mpsc::Sender<bool>) {
        self.mount_signal = Some(signal);
    }

    pub fn local_port(&self) -> u16 {
        self.port
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// A handle that, when notified, begins graceful shutdown: new
    /// connections stop being accepted and existing ones get
    /// [`SHUTDOWN_GRACE`] to finish before the accept loop returns.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Accepts connections until shutdown is signaled.
    ///
    /// A connection idle for longer than `config.idle_timeout` is dropped by
    /// its own `process_socket` read loop, which wraps each read in a
    /// `tokio::time::timeout`; there is no central registry of sockets to
    /// sweep centrally.
    pub async fn serve(&self) -> io::Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("Shutdown requested, draining connections (grace={:?})", SHUTDOWN_GRACE);
                    tokio::time::sleep(SHUTDOWN_GRACE).await;
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (socket, peer) = accepted?;
                    self.accept_one(socket, peer);
                }
            }
        }
    }

    fn accept_one(&self, socket: TcpStream, peer: SocketAddr) {
        let Ok(permit) = self.connection_slots.clone().try_acquire_owned() else {
            warn!("Connection limit ({}) reached, rejecting {}", self.config.max_connections, peer);
            self.metrics.connection_rejected();
            return;
        };

        if self.config.secure && peer.port() >= 1024 {
            debug!("Rejecting insecure-port connection from {}", peer);
            return;
        }
        if !self.config.allowed_ips.is_empty()
            && !self.config.allowed_ips.iter().any(|a| a.matches(&peer.ip()))
        {
            debug!(reason = ?DenyReason::NotAllowed, "Rejecting connection from {}", peer);
            return;
        }

        let context = rpc::Context {
            local_port: self.port,
            client_addr: peer.to_string(),
            auth: xdr::rpc::auth_unix::default(),
            vfs: self.fs.clone(),
            mount_signal: self.mount_signal.clone(),
            export_name: self.export_name.clone(),
            transaction_tracker: self.transaction_tracker.clone(),
            portmap_table: self.portmap_table.clone(),
            config: self.config.clone(),
            rate_limiter: self.rate_limiter.clone(),
            metrics: self.metrics.clone(),
            worker_pool: self.worker_pool.clone(),
        };

        if self.config.tcp_nodelay {
            let _ = socket.set_nodelay(true);
        }

        self.metrics.connection_opened();
        let metrics = self.metrics.clone();
        info!("Accepting connection from {}", context.client_addr);
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = process_socket(socket, context).await {
                debug!("Connection closed: {:?}", e);
            }
            metrics.connection_closed();
        });
    }
}

/// Reads and replies on one accepted connection until the peer disconnects
/// or stays silent past the configured idle timeout.
async fn process_socket(mut socket: TcpStream, context: rpc::Context) -> Result<(), anyhow::Error> {
    let idle_timeout = context.config.idle_timeout;
    let (mut message_handler, mut socksend, mut msgrecvchan) = rpc::SocketMessageHandler::new(&context);

    tokio::spawn(async move {
        loop {
            if let Err(e) = message_handler.read().await {
                debug!("Message loop broken due to {:?}", e);
                break;
            }
        }
    });

    loop {
        let readable = tokio::time::timeout(idle_timeout, socket.readable());
        tokio::select! {
            result = readable => {
                result.map_err(|_| anyhow::anyhow!("connection idle for longer than {:?}", idle_timeout))??;
                let mut buf = [0; 128_000];
                match socket.try_read(&mut buf) {
                    Ok(0) => return Ok(()),
                    Ok(n) => {
                        let _ = socksend.write_all(&buf[..n]).await;
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e.into()),
                }
            }
            reply = msgrecvchan.recv() => {
                match reply {
                    Some(Err(e)) => return Err(e),
                    Some(Ok(msg)) => {
                        if let Err(e) = rpc::write_fragment(&mut socket, &msg).await {
                            error!("Write error {:?}", e);
                        }
                    }
                    None => return Err(anyhow::anyhow!("Unexpected socket context termination")),
                }
            }
        }
    }
}
