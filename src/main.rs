use anyhow::Result;
use authsocks::{Config, Socks5Server};
use clap::Parser;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "A SOCKS5 proxy with username/password authentication", long_about = None)]
struct Args {
    /// Listener host
    #[arg(long, env = "SOCKS5_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Listener port
    #[arg(long, env = "SOCKS5_PORT", default_value_t = 1080)]
    port: u16,

    /// Username clients must authenticate with
    #[arg(short, long, env = "SOCKS5_USERNAME")]
    username: String,

    /// Password clients must authenticate with
    #[arg(short, long, env = "SOCKS5_PASSWORD", hide_env_values = true)]
    password: String,

    /// Seconds allowed for greeting, auth and request (no limit if unset)
    #[arg(long, env = "SOCKS5_HANDSHAKE_TIMEOUT")]
    handshake_timeout: Option<u64>,

    /// Seconds allowed for the outbound connect (no limit if unset)
    #[arg(long, env = "SOCKS5_CONNECT_TIMEOUT")]
    connect_timeout: Option<u64>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse args
    let args = Args::parse();

    // Initialize tracing subscriber
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    let config = Config::new(args.host, args.port, args.username, args.password)
        .with_handshake_timeout(args.handshake_timeout.map(Duration::from_secs))
        .with_connect_timeout(args.connect_timeout.map(Duration::from_secs));

    // Instantiate server
    let server = Socks5Server::new(config);

    // Run it
    info!("Starting SOCKS5 proxy: {}", server.config().listen_addr());
    server.run().await
}
