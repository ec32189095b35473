//! Server network layer: accepts WebSocket connections and hands each one to
//! the connection protocol loop.

use crate::config::ServerConfig;
use crate::connection;
use crate::registry::Registry;
use crate::store::Storer;
use log::{error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Accept loop owning the listener, the session registry and every
/// connection task.
pub struct Server {
    listener: TcpListener,
    registry: Arc<Registry>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Server {
    pub async fn bind(config: ServerConfig, store: Arc<dyn Storer>) -> io::Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(&config.addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let config = Arc::new(config);
        let shutdown = CancellationToken::new();
        let registry = Arc::new(Registry::new(store, Arc::clone(&config), shutdown.clone()));

        Ok(Server {
            listener,
            registry,
            config,
            shutdown,
            tracker: TaskTracker::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Cancelling this token stops the server, its sessions and connections.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accepts connections until shutdown, then waits for every connection
    /// to close.
    pub async fn run(self) -> io::Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
            }
        }

        info!("Server shutting down, closing {} connections", self.tracker.len());
        self.tracker.close();
        self.tracker.wait().await;
        info!("Server stopped");
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let registry = Arc::clone(&self.registry);
        let config = Arc::clone(&self.config);
        let shutdown = self.shutdown.clone();

        self.tracker.spawn(async move {
            let ws = match tokio::time::timeout(config.control_timeout, accept_async(stream)).await {
                Ok(Ok(ws)) => ws,
                Ok(Err(e)) => {
                    warn!("WebSocket handshake with {} failed: {}", peer, e);
                    return;
                }
                Err(_) => {
                    warn!("WebSocket handshake with {} timed out", peer);
                    return;
                }
            };

            connection::serve(ws, peer, registry, config, shutdown).await;
        });
    }
}
