use anyhow::Result;
use tokio::{io, net::TcpStream, select};
use tracing::{debug, info};

/// Relay holds both ends of an established CONNECT tunnel
pub struct Relay {
    pub inbound: TcpStream,
    pub outbound: TcpStream,
}

/// Relay implementation block
impl Relay {
    /// run copies bytes in both directions until either direction finishes.
    /// The first side to close or fail ends the relay and both sockets are
    /// dropped with it
    pub async fn run(mut self) -> Result<()> {
        let (mut client_read, mut client_write) = self.inbound.split();
        let (mut target_read, mut target_write) = self.outbound.split();

        let client_to_target = io::copy(&mut client_read, &mut target_write);
        let target_to_client = io::copy(&mut target_read, &mut client_write);

        select! {
            sent = client_to_target => {
                let sent = sent?;
                info!("client closed the tunnel after sending {sent} bytes");
            }
            received = target_to_client => {
                let received = received?;
                info!("destination closed the tunnel after sending {received} bytes");
            }
        }

        debug!("relay finished, closing both sockets");
        Ok(())
    }
}
