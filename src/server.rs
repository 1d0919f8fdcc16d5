use crate::{config::Config, connection::handle_connection};
use anyhow::{Result, anyhow, bail};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, time};
use tracing::{error, info};

/// Pause after a failed accept so persistent errors such as EMFILE do not
/// spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Socks5Server accepts client connections and runs one session per
/// connection
pub struct Socks5Server {
    config: Arc<Config>,
    listener: Option<TcpListener>,
}

/// Socks5Server implementation block
impl Socks5Server {
    /// new is a constructor for the Socks5Server type
    pub fn new(config: Config) -> Self {
        Self {
            // Arc allows every session to share the one Config
            config: Arc::new(config),
            listener: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// bind to the configured listen address. Binding twice is an error
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        if self.listener.is_some() {
            bail!("[ERR] listener is already bound");
        }

        // Instantiate tokio listener
        let listener = TcpListener::bind(self.config.listen_addr()).await?;
        let addr = listener.local_addr()?;

        info!("SOCKS5 proxy listening on {addr}");

        self.listener = Some(listener);
        Ok(addr)
    }

    /// run listens for incoming connections, binding first if needed.
    /// Failures of individual connections are logged and never stop the
    /// accept loop
    pub async fn run(mut self) -> Result<()> {
        if self.listener.is_none() {
            self.bind().await?;
        }
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow!("[ERR] listener missing after bind"))?;

        loop {
            // Accept incoming connection
            let (inbound, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("accept error: {e}");
                    time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            // Clone for this connection
            let config = Arc::clone(&self.config);

            tokio::spawn(async move {
                info!("new client: {peer_addr}");

                if let Err(e) = handle_connection(inbound, config).await {
                    error!("connection error from {peer_addr}: {e}");
                } else {
                    info!("client {peer_addr} disconnected");
                }
            });
        }
    }
}
