use std::time::Duration;

/// Config holds the proxy settings. It is built once at startup and
/// shared read-only by every session
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_host: String,
    pub listen_port: u16,
    pub username: String,
    pub password: String,

    /// Upper bound on greeting, authentication and request combined.
    /// `None` waits forever
    pub handshake_timeout: Option<Duration>,

    /// Upper bound on the outbound connect. `None` leaves it to the OS
    pub connect_timeout: Option<Duration>,
}

/// Config implementation block
impl Config {
    /// new is a Config constructor with no timeouts
    pub fn new(
        listen_host: impl Into<String>,
        listen_port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            listen_host: listen_host.into(),
            listen_port,
            username: username.into(),
            password: password.into(),
            handshake_timeout: None,
            connect_timeout: None,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// listen_addr joins host and port for binding
    pub fn listen_addr(&self) -> String {
        if self.listen_host.contains(':') && !self.listen_host.starts_with('[') {
            format!("[{}]:{}", self.listen_host, self.listen_port)
        } else {
            format!("{}:{}", self.listen_host, self.listen_port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_addr_brackets_ipv6_hosts() {
        assert_eq!(Config::new("127.0.0.1", 1080, "u", "p").listen_addr(), "127.0.0.1:1080");
        assert_eq!(Config::new("::1", 1080, "u", "p").listen_addr(), "[::1]:1080");
        assert_eq!(Config::new("[::]", 9050, "u", "p").listen_addr(), "[::]:9050");
    }

    #[test]
    fn timeouts_default_to_none() {
        let config = Config::new("localhost", 1080, "u", "p");
        assert!(config.handshake_timeout.is_none());
        assert!(config.connect_timeout.is_none());

        let config = config.with_connect_timeout(Some(Duration::from_secs(5)));
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(5)));
    }
}
