//! SOCKS5 server that bounds the handshake and the outbound connect

use authsocks::{Config, Socks5Server};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::new("::1", 1080, "<user>", "<pass>")
        .with_handshake_timeout(Some(Duration::from_secs(10)))
        .with_connect_timeout(Some(Duration::from_secs(5)));

    let mut server = Socks5Server::new(config);
    let addr = server.bind().await?;
    println!("Starting SOCKS5 server on {addr}");

    server.run().await?;
    Ok(())
}
