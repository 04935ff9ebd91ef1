use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, split};
use tokio::select;

/// Size of the per-direction copy buffer
pub const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Side names one end of a relayed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Upstream,
}

/// RelayStats summarizes a finished relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes copied client -> upstream
    pub from_client: u64,
    /// Bytes copied upstream -> client
    pub from_upstream: u64,
    /// The side whose read ended first
    pub closed_by: Side,
}

/// relay copies bytes between client and upstream in both directions at
/// once. The first direction to finish, by EOF or error, stops the other;
/// the caller then closes both connections.
pub async fn relay<C, U>(client: &mut C, upstream: &mut U) -> io::Result<RelayStats>
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_rd, mut client_wr) = split(client);
    let (mut upstream_rd, mut upstream_wr) = split(upstream);

    let mut from_client = 0u64;
    let mut from_upstream = 0u64;

    let closed_by = select! {
        // Client -> upstream
        res = pump(&mut client_rd, &mut upstream_wr, &mut from_client) => {
            res?;
            Side::Client
        }
        // Upstream -> client
        res = pump(&mut upstream_rd, &mut client_wr, &mut from_upstream) => {
            res?;
            Side::Upstream
        }
    };

    Ok(RelayStats {
        from_client,
        from_upstream,
        closed_by,
    })
}

/// pump forwards chunks from reader to writer as they arrive until the
/// reader hits EOF, then shuts the writer down
async fn pump<R, W>(reader: &mut R, writer: &mut W, transferred: &mut u64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            // Peer has already gone if this fails
            let _ = writer.shutdown().await;
            return Ok(());
        }

        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        *transferred += n as u64;
    }
}
