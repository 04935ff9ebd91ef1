use crate::address::{TargetEndpoint, encode_reply};
use crate::connector::{self, Upstream};
use crate::error::{ConnectError, SessionError};
use crate::negotiate::{Event, Negotiator, State};
use crate::protocol::ReplyCode;
use crate::relay::{self, RelayStats};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Default budget for resolving and dialing the target
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// Greeting + request never exceed 2 + 255 and 4 + 1 + 255 + 2 bytes
const NEGOTIATION_CHUNK: usize = 512;

/// SessionConfig holds the per-session settings handed down by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Session owns one client connection and, once relaying, its upstream.
/// `upstream` is `Some` exactly when the negotiator is in `Relaying`.
pub struct Session<S = TcpStream> {
    client: S,
    upstream: Option<TcpStream>,
    negotiator: Negotiator,
    config: SessionConfig,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(client: S, config: SessionConfig) -> Self {
        Self {
            client,
            upstream: None,
            negotiator: Negotiator::new(),
            config,
        }
    }

    pub fn state(&self) -> State {
        self.negotiator.state()
    }

    /// run drives the session to completion. Whatever the outcome, the
    /// client and upstream connections are shut down before returning.
    pub async fn run(self) -> Result<RelayStats, SessionError> {
        self.run_with(connector::connect).await
    }

    /// run_with is `run` with the upstream dial supplied by the caller
    pub(crate) async fn run_with<D, F>(mut self, dial: D) -> Result<RelayStats, SessionError>
    where
        D: FnOnce(TargetEndpoint, Duration) -> F,
        F: Future<Output = Result<Upstream, ConnectError>>,
    {
        let result = self.drive(dial).await;

        if let Err(e) = &result {
            if let Some(reply) = e.reply(self.state()) {
                // Best effort; the client may already be gone
                if let Err(write_err) = self.client.write_all(&reply).await {
                    debug!("failed to send failure reply: {write_err}");
                }
            }
        }

        self.close().await;
        result
    }

    async fn drive<D, F>(&mut self, dial: D) -> Result<RelayStats, SessionError>
    where
        D: FnOnce(TargetEndpoint, Duration) -> F,
        F: Future<Output = Result<Upstream, ConnectError>>,
    {
        let endpoint = self.negotiate().await?;
        debug!("CONNECT {endpoint}");

        let Upstream { stream, local_addr } = dial(endpoint, self.config.connect_timeout).await?;

        // Success is only reported once the upstream connection exists
        self.client
            .write_all(&encode_reply(ReplyCode::Succeeded, local_addr))
            .await?;

        let early = self.negotiator.connected()?;
        let upstream = self.upstream.insert(stream);

        if !early.is_empty() {
            debug!("flushing {} early bytes to upstream", early.len());
            upstream
                .write_all(&early)
                .await
                .map_err(SessionError::RelayIo)?;
        }

        let mut stats = relay::relay(&mut self.client, upstream)
            .await
            .map_err(SessionError::RelayIo)?;

        stats.from_client += early.len() as u64;
        Ok(stats)
    }

    /// negotiate reads from the client until a CONNECT request is decoded
    async fn negotiate(&mut self) -> Result<TargetEndpoint, SessionError> {
        let mut chunk = [0u8; NEGOTIATION_CHUNK];

        loop {
            while let Some(event) = self.negotiator.next_event()? {
                match event {
                    Event::Greeted(reply) => {
                        self.client.write_all(&reply).await?;
                        debug!("greeting accepted, no authentication");
                    }
                    Event::Connect(endpoint) => return Ok(endpoint),
                }
            }

            let n = self.client.read(&mut chunk).await?;
            if n == 0 {
                return Err(self.negotiator.closed());
            }

            self.negotiator.feed(&chunk[..n])?;
        }
    }

    /// close shuts down both ends; consuming self means it runs once
    async fn close(mut self) {
        if let Some(mut upstream) = self.upstream.take() {
            if let Err(e) = upstream.shutdown().await {
                debug!("upstream shutdown: {e}");
            }
        }

        if let Err(e) = self.client.shutdown().await {
            debug!("client shutdown: {e}");
        }
    }
}
