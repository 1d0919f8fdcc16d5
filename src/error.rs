use thiserror::Error;

/// Represents the ways a single proxied connection can fail.
///
/// Every variant ends the affected session; none of them affect other
/// connections or the listener.
#[derive(Debug, Error)]
pub enum SessionError {
    // ===== Version / Method Selection =====
    /// The greeting or request carried a version byte other than `0x05`.
    #[error("unsupported SOCKS version: {0:#04x}")]
    UnsupportedVersion(u8),

    /// The client did not offer username/password authentication.
    #[error("no acceptable authentication method offered")]
    NoAcceptableMethod,

    // ===== Authentication =====
    /// The credential frame carried a version byte other than `0x01`.
    #[error("unsupported authentication version: {0:#04x}")]
    UnsupportedAuthVersion(u8),

    /// The supplied username/password did not match the configured pair.
    #[error("authentication failed")]
    AuthenticationFailed,

    // ===== Request =====
    /// The client requested BIND, UDP ASSOCIATE or an unknown command.
    #[error("unsupported command: {0:#04x}")]
    UnsupportedCommand(u8),

    /// The request carried an unknown ATYP byte.
    #[error("unsupported address type: {0:#04x}")]
    UnsupportedAddressType(u8),

    /// A domain name longer than a SOCKS5 length byte can describe.
    #[error("domain name too long: {0} bytes (max 255)")]
    DomainTooLong(usize),

    // ===== Connect / Transport =====
    /// The outbound connection to the destination could not be opened.
    #[error("failed to connect to {target}: {source}")]
    ConnectFailed {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// The outbound connection did not complete within the configured limit.
    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),

    /// The handshake did not complete within the configured limit.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// The client hung up before the handshake finished.
    #[error("client closed the connection during the handshake")]
    ClientClosed,

    /// Socket-level error on either side.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
