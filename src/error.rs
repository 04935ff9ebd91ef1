//! Error types for a proxied session.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;

use crate::address::encode_reply;
use crate::negotiate::State;
use crate::protocol::{AuthMethod, ReplyCode, Version};

/// Failure to reach the requested target.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Resolve + connect did not finish within the timeout budget
    #[error("connect to {target} timed out after {budget:?}")]
    Timeout { target: String, budget: Duration },

    /// Resolution or the OS-level connect failed
    #[error("failed to connect to {target}: {source}")]
    Unreachable {
        target: String,
        #[source]
        source: io::Error,
    },
}

impl ConnectError {
    /// reply_code maps the failure onto the REP field sent to the client
    pub fn reply_code(&self) -> ReplyCode {
        match self {
            ConnectError::Timeout { .. } => ReplyCode::TtlExpired,
            ConnectError::Unreachable { source, .. } => match source.kind() {
                io::ErrorKind::ConnectionRefused => ReplyCode::ConnectionRefused,
                io::ErrorKind::NetworkUnreachable => ReplyCode::NetworkUnreachable,
                io::ErrorKind::PermissionDenied => ReplyCode::ConnectionNotAllowed,
                _ => ReplyCode::HostUnreachable,
            },
        }
    }
}

/// Errors that end a session before or during relaying.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Malformed, truncated or out-of-state bytes from the client
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// VER field other than 0x05
    #[error("unsupported SOCKS version {0:#04x}")]
    UnsupportedVersion(u8),

    /// CMD field other than CONNECT
    #[error("unsupported command {0:#04x}")]
    UnsupportedCommand(u8),

    /// Unknown ATYP or undecodable address bytes
    #[error("malformed address: {0}")]
    MalformedAddress(String),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Read or write failure once relaying has begun
    #[error("relay i/o error: {0}")]
    RelayIo(#[source] io::Error),

    /// Read or write failure on the client socket during negotiation
    #[error("client i/o error: {0}")]
    ClientIo(#[from] io::Error),
}

impl SessionError {
    /// reply returns the bytes owed to the client before the connection is
    /// closed, given the negotiation state the error was raised in. `None`
    /// means the connection is closed silently.
    pub fn reply(&self, state: State) -> Option<Vec<u8>> {
        let code = match self {
            SessionError::UnsupportedVersion(_) if state == State::AwaitingGreeting => {
                return Some(vec![Version::SOCKS5 as u8, AuthMethod::NoAcceptable as u8]);
            }
            SessionError::UnsupportedCommand(_) => ReplyCode::CommandNotSupported,
            SessionError::MalformedAddress(_) => ReplyCode::AddrTypeUnsupported,
            SessionError::Connect(e) => e.reply_code(),
            SessionError::UnsupportedVersion(_)
            | SessionError::ProtocolViolation(_)
            | SessionError::RelayIo(_)
            | SessionError::ClientIo(_) => return None,
        };

        Some(encode_reply(code, SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))))
    }
}
