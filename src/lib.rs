//! A lightweight SOCKS5 proxy library
//!
//! ## SOCKS5 Implementation
//!
//! - Features:
//!     - CONNECT
//!     - No Authentication
//!     - Failure replies for unsupported commands, address types and failed dials
//!     - Bounded upstream dial timeout
//!     - One tokio task per client, relay torn down when either side closes
//! - [SOCKS5 (RFC 1928)](https://datatracker.ietf.org/doc/html/rfc1928)
//!
//! # Example
//! ```no_run
//! use socksrelay::Socks5Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut server = Socks5Server::new("127.0.0.1:1080").with_timeout(Duration::from_secs(30));
//!     server.run().await
//! }
//! ```

pub mod address;
pub mod connector;
pub mod error;
pub mod negotiate;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod session;

// Re-export main types at crate root for convenience
pub use address::{Host, TargetEndpoint};
pub use error::{ConnectError, SessionError};
pub use protocol::{AddressType, AuthMethod, Command, ReplyCode, Version};
pub use relay::RelayStats;
pub use server::Socks5Server;
pub use session::{Session, SessionConfig};
