use crate::config::Config;
use crate::error::SessionError;
use crate::protocol::{AuthMethod, AuthStatus, USERPASS_VERSION, Version};

/// Greeting is the client's method negotiation frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub methods: Vec<u8>,
}

impl Greeting {
    /// decode parses a greeting from the start of `data`, returning it with
    /// the number of bytes consumed, or None while incomplete
    pub fn decode(data: &[u8]) -> Result<Option<(Self, usize)>, SessionError> {
        // ClientHello format
        // +----+----------+----------+
        // |VER | NMETHODS | METHODS  |
        // +----+----------+----------+
        // | 1  |    1     | 1 to 255 |
        // +----+----------+----------+
        let [version, n_methods, ..] = *data else {
            return Ok(None);
        };

        // Ensure version is 0x05 -> SOCKS5
        if version != Version::SOCKS5 as u8 {
            return Err(SessionError::UnsupportedVersion(version));
        }

        let end = 2 + n_methods as usize;
        match data.get(2..end) {
            Some(methods) => Ok(Some((
                Self {
                    methods: methods.to_vec(),
                },
                end,
            ))),
            None => Ok(None),
        }
    }

    /// selected_method returns the method the server answers with
    pub fn selected_method(&self) -> AuthMethod {
        select_auth_method(&self.methods)
    }
}

/// select_auth_method takes the auth methods offered by the socks client
/// and returns the one this server will use
fn select_auth_method(client_methods: &[u8]) -> AuthMethod {
    // Preferred auth method order. Username/password is mandatory here
    const PREFERRED_METHODS: &[AuthMethod] = &[AuthMethod::UserPass];

    for &preferred in PREFERRED_METHODS {
        if client_methods.contains(&(preferred as u8)) {
            return preferred;
        }
    }

    AuthMethod::NoAcceptable
}

/// UserPassRequest is a decoded RFC 1929 credential frame. Fields are raw
/// bytes since the RFC does not mandate an encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPassRequest {
    pub username: Vec<u8>,
    pub password: Vec<u8>,
}

impl UserPassRequest {
    /// decode parses a credential frame from the start of `data`
    pub fn decode(data: &[u8]) -> Result<Option<(Self, usize)>, SessionError> {
        // Client Username/Password Request
        // +----+------+----------+------+----------+
        // |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
        // +----+------+----------+------+----------+
        // | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
        // +----+------+----------+------+----------+
        let [version, username_len, ..] = *data else {
            return Ok(None);
        };

        if version != USERPASS_VERSION {
            return Err(SessionError::UnsupportedAuthVersion(version));
        }

        let plen_at = 2 + username_len as usize;
        let Some(&password_len) = data.get(plen_at) else {
            return Ok(None);
        };

        let end = plen_at + 1 + password_len as usize;
        if data.len() < end {
            return Ok(None);
        }

        let request = Self {
            username: data[2..plen_at].to_vec(),
            password: data[plen_at + 1..end].to_vec(),
        };
        Ok(Some((request, end)))
    }

    /// verify compares the credentials byte for byte against the config
    pub fn verify(&self, config: &Config) -> AuthStatus {
        if self.username == config.username.as_bytes() && self.password == config.password.as_bytes()
        {
            AuthStatus::Success
        } else {
            AuthStatus::Failure
        }
    }
}

/// auth_reply encodes the RFC 1929 server response
pub fn auth_reply(status: AuthStatus) -> [u8; 2] {
    // +----+--------+
    // |VER | STATUS |
    // +----+--------+
    // | 1  |   1    |
    // +----+--------+
    [USERPASS_VERSION, status as u8]
}
