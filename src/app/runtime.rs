//! Runtime - listener setup and connection intake
//!
//! The runtime resolves both endpoints, binds one listener per resolved
//! source address, and runs an accept loop per listener. Every accepted
//! connection is handed to a new [`Bridge`] on its own task; a connection
//! that fails to bridge never disturbs the listener it came from.

use std::io;
use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::bridge::Bridge;
use crate::config::Config;
use crate::error::Result;

/// Listener backlog.
const BACKLOG: u32 = 1000;

/// Runtime manages the bridge system lifecycle
pub struct Runtime {
    listeners: Vec<TcpListener>,
    destination: SocketAddr,
    journal_dir: Arc<PathBuf>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Runtime {
    /// Resolve both endpoints and bind a listener per source address.
    ///
    /// A listener that cannot be set up is skipped with a diagnostic; the
    /// others proceed. Resolution failure of either endpoint is fatal.
    pub async fn from_config(config: Config) -> Result<Self> {
        let destination = config.resolve_destination().await?;
        let source_addrs = config.resolve_source().await?;

        let (shutdown_tx, _) = broadcast::channel(1);

        let mut listeners = Vec::new();
        for addr in source_addrs {
            match bind_listener(addr) {
                Ok(listener) => {
                    let local = listener.local_addr()?;
                    println!("Listener {} listening on {}", listener.as_raw_fd(), local);
                    listeners.push(listener);
                }
                Err(e) => error!("unable to start listener on {}: {}", addr, e),
            }
        }

        Ok(Self {
            listeners,
            destination,
            journal_dir: Arc::new(config.journal_dir),
            shutdown_tx,
        })
    }

    /// Bound listener addresses, in bind order.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|l| l.local_addr().ok())
            .collect()
    }

    /// Accept connections on every listener until shutdown.
    ///
    /// Returns cleanly once every accept loop has stopped; with no
    /// listeners there is nothing to do and this returns immediately.
    pub async fn run(self) -> Result<()> {
        let mut handles = Vec::new();

        for listener in self.listeners {
            let destination = self.destination;
            let journal_dir = self.journal_dir.clone();
            let mut shutdown_rx = self.shutdown_tx.subscribe();

            handles.push(tokio::spawn(async move {
                run_listener(listener, destination, journal_dir, &mut shutdown_rx).await;
            }));
        }

        info!("runtime started with {} listeners -> {}", handles.len(), self.destination);

        if !handles.is_empty() {
            tokio::signal::ctrl_c().await?;
            info!("shutting down");
            let _ = self.shutdown_tx.send(());
        }

        for handle in handles {
            let _ = handle.await;
        }

        info!("no more listeners");
        Ok(())
    }
}

/// Bind a listening socket with address reuse and a deep backlog.
fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(BACKLOG)
}

/// Run a single listener's accept loop.
///
/// An accept error ends only the current accept; the listener stays up.
async fn run_listener(
    listener: TcpListener,
    destination: SocketAddr,
    journal_dir: Arc<PathBuf>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) {
    let local = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "?".to_string());
    let mut conn_count: u64 = 0;

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        conn_count += 1;
                        debug!("[{}] new connection #{} from {}", local, conn_count, peer);

                        let journal_dir = journal_dir.clone();
                        tokio::spawn(async move {
                            if let Err(e) =
                                Bridge::start(stream, peer, destination, &journal_dir).await
                            {
                                warn!("bridge for {} failed: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("[{}] accept error: {}", local, e);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("[{}] shutting down ({} connections)", local, conn_count);
                break;
            }
        }
    }
}
