use crate::session::{DEFAULT_CONNECT_TIMEOUT, Session, SessionConfig};
use anyhow::{Result, anyhow, bail};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    task::JoinSet,
};
use tracing::{Instrument, debug, error, info, info_span, warn};

// Pause after a failed accept so fd exhaustion doesn't spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Socks5Server represents a SOCKS5 server and houses related
/// configuration data
pub struct Socks5Server {
    pub listen_addr: String,
    pub connect_timeout: Duration,
    listener: Option<TcpListener>,
}

impl Socks5Server {
    /// new is a constructor for the Socks5Server type
    pub fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            listener: None,
        }
    }

    /// with_timeout sets the budget for binding the listener and for
    /// each upstream dial
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// bind to the listen address; fails when called twice
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        if self.listener.is_some() {
            bail!("listener already bound to {}", self.listen_addr);
        }

        // Instantiate tokio listener
        let listener = tokio::time::timeout(self.connect_timeout, TcpListener::bind(&self.listen_addr))
            .await
            .map_err(|_| anyhow!("timed out binding {}", self.listen_addr))?
            .map_err(|e| anyhow!("failed to bind {}: {e}", self.listen_addr))?;
        let addr = listener.local_addr()?;

        info!("SOCKS5 proxy listening on {addr}");
        info!("Timeout: {} seconds", self.connect_timeout.as_secs());

        self.listener = Some(listener);
        Ok(addr)
    }

    /// run serves clients until Ctrl-C is received
    pub async fn run(&mut self) -> Result<()> {
        self.serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// serve_with_shutdown accepts clients until `shutdown` resolves, then
    /// aborts every live session, which closes both of its sockets
    pub async fn serve_with_shutdown<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if self.listener.is_none() {
            self.bind().await?;
        }
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow!("listener not bound"))?;

        let config = SessionConfig {
            connect_timeout: self.connect_timeout,
        };
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("shutting down, closing {} sessions", sessions.len());
                    break;
                }

                // Accept incoming connection
                accepted = listener.accept() => match accepted {
                    Ok((inbound, peer_addr)) => {
                        let span = info_span!("session", peer = %peer_addr);
                        sessions.spawn(handle_connection(inbound, peer_addr, config).instrument(span));
                    }
                    Err(e) => {
                        warn!("accept error: {e}");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },

                // Reap finished sessions
                Some(joined) = sessions.join_next() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!("session task panicked: {e}");
                        }
                    }
                }
            }
        }

        sessions.shutdown().await;
        Ok(())
    }
}

/// handle_connection runs one session and logs how it ended
async fn handle_connection(inbound: TcpStream, peer_addr: SocketAddr, config: SessionConfig) {
    info!("new client: {peer_addr}");

    if let Err(e) = inbound.set_nodelay(true) {
        debug!("failed to set TCP_NODELAY: {e}");
    }

    match Session::new(inbound, config).run().await {
        Ok(stats) => info!(
            "connection closed: {} bytes from client, {} bytes from server ({:?} closed first)",
            stats.from_client, stats.from_upstream, stats.closed_by
        ),
        Err(e) => warn!("connection error: {e}"),
    }
}
