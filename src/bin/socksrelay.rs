use anyhow::Result;
use clap::Parser;
use socksrelay::Socks5Server;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "A lightweight SOCKS5 proxy", long_about = None)]
struct Args {
    /// Listening address
    #[arg(short, long, default_value = "0.0.0.0")]
    address: String,

    /// Listening port
    #[arg(short, long, default_value_t = 1080)]
    port: u16,

    /// Timeout in seconds for binding and for each upstream connect
    #[arg(short, long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    /// listen_addr joins address and port, bracketing IPv6 literals
    fn listen_addr(&self) -> String {
        match self.address.parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.port).to_string(),
            Err(_) => format!("{}:{}", self.address, self.port),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse args
    let args = Args::parse();

    // Initialize tracing subscriber
    let level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    // Instantiate server
    let mut server =
        Socks5Server::new(args.listen_addr()).with_timeout(Duration::from_secs(args.timeout));

    // Run it
    info!("Starting SOCKS5 proxy: {}", server.listen_addr);
    server.run().await
}
