use crate::address::{Host, TargetEndpoint};
use crate::error::ConnectError;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpStream, lookup_host};
use tracing::{debug, warn};

/// Upstream is an established connection to the target together with the
/// local address the proxy used for it (BND.ADDR/BND.PORT)
#[derive(Debug)]
pub struct Upstream {
    pub stream: TcpStream,
    pub local_addr: SocketAddr,
}

/// connect resolves the endpoint and opens a TCP connection to it. The
/// whole resolve + connect sequence must finish within `budget`.
pub async fn connect(endpoint: TargetEndpoint, budget: Duration) -> Result<Upstream, ConnectError> {
    let target = endpoint.to_string();

    let stream = bounded(budget, target.clone(), async {
        let addrs = resolve(&endpoint)
            .await
            .map_err(|source| ConnectError::Unreachable {
                target: target.clone(),
                source,
            })?;

        dial_any(&addrs)
            .await
            .map_err(|source| ConnectError::Unreachable {
                target: target.clone(),
                source,
            })
    })
    .await?;

    let local_addr = stream
        .local_addr()
        .map_err(|source| ConnectError::Unreachable {
            target: target.clone(),
            source,
        })?;

    // Best effort; the connection works without it
    if let Err(e) = stream.set_nodelay(true) {
        warn!("failed to set TCP_NODELAY towards {target}: {e}");
    }

    debug!("connected to {target} via {local_addr}");

    Ok(Upstream { stream, local_addr })
}

/// bounded runs a dial future under the timeout budget
pub(crate) async fn bounded<T, F>(budget: Duration, target: String, dial: F) -> Result<T, ConnectError>
where
    F: Future<Output = Result<T, ConnectError>>,
{
    match tokio::time::timeout(budget, dial).await {
        Ok(result) => result,
        Err(_) => Err(ConnectError::Timeout { target, budget }),
    }
}

/// resolve turns the endpoint into candidate socket addresses. IP literals
/// are used as is; domain names go through the system resolver.
async fn resolve(endpoint: &TargetEndpoint) -> io::Result<Vec<SocketAddr>> {
    match &endpoint.host {
        Host::Ipv4(ip) => Ok(vec![SocketAddr::from((*ip, endpoint.port))]),
        Host::Ipv6(ip) => Ok(vec![SocketAddr::from((*ip, endpoint.port))]),
        Host::Domain(raw) => {
            let name = std::str::from_utf8(raw).map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidInput, format!("domain is not UTF-8: {e}"))
            })?;
            let addrs: Vec<SocketAddr> = lookup_host((name, endpoint.port)).await?.collect();

            if addrs.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no addresses found for {name}"),
                ));
            }

            Ok(addrs)
        }
    }
}

/// dial_any tries each address in turn and returns the first connection,
/// or the last error if none succeed
async fn dial_any(addrs: &[SocketAddr]) -> io::Result<TcpStream> {
    let mut last_err = None;

    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("connect to {addr} failed: {e}");
                last_err = Some(e);
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses to connect to")))
}
