//! A SOCKS5 CONNECT proxy with static username/password authentication
//!
//! ## SOCKS5 Implementation
//!
//! - Features:
//!     - CONNECT over IPv4, IPv6 and domain name targets
//!     - Username/Password Authentication, one attempt per connection
//!     - Sans-IO session state machine tolerant of arbitrary fragmentation
//!     - Pipelined client bytes forwarded once the tunnel is up
//!     - Optional handshake and connect timeouts
//! - [SOCKS5 (RFC 1928)](https://datatracker.ietf.org/doc/html/rfc1928)
//! - [Username/Password Authentication (RFC 1929)](https://datatracker.ietf.org/doc/html/rfc1929)
//!
//! # Example
//! ```no_run
//! use authsocks::{Config, Socks5Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::new("127.0.0.1", 1080, "alice", "secret");
//!     Socks5Server::new(config).run().await
//! }
//! ```

pub mod address;
pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod session;

// Re-export main types at crate root for convenience
pub use address::{Address, DomainName, Reply, TargetAddr};
pub use config::Config;
pub use error::SessionError;
pub use protocol::{AddressType, AuthMethod, AuthStatus, Command, ReplyCode, Version};
pub use server::Socks5Server;
pub use session::{Action, ProtocolState, Session};
