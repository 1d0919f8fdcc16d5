//! SOCKS5 server with username/password authentication

use authsocks::{Config, Socks5Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::new("127.0.0.1", 1080, "<user>", "<pass>");
    let server = Socks5Server::new(config);
    println!("Starting SOCKS5 server on 127.0.0.1:1080");

    server.run().await?;
    Ok(())
}
