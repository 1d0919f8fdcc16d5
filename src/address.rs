//! Address codec for the SOCKS5 wire formats.
//!
//! ```text
//! +------+----------+----------+
//! | ATYP | DST.ADDR | DST.PORT |
//! +------+----------+----------+
//! |  1   | Variable |    2     |
//! +------+----------+----------+
//! ```
//!
//! Decoding never consumes a partial frame: each decoder returns `Ok(None)`
//! until every byte of the address and port is available.

use crate::error::SessionError;
use crate::protocol::{AddressType, RSV, ReplyCode, Version};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

/// Maximum length of a domain name, bounded by its one-byte length prefix
pub const MAX_DOMAIN_LEN: usize = u8::MAX as usize;

/// DomainName is a host name that fits a SOCKS5 length prefix. The wire
/// bytes are kept as received since RFC 1928 mandates no encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainName(Vec<u8>);

impl DomainName {
    /// new validates the length of the name
    pub fn new(name: impl Into<Vec<u8>>) -> Result<Self, SessionError> {
        let name = name.into();
        if name.len() > MAX_DOMAIN_LEN {
            return Err(SessionError::DomainTooLong(name.len()));
        }
        Ok(Self(name))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// to_string_lossy renders the name as text, replacing invalid UTF-8
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

/// Address represents a network address or domain to be used as the
/// SOCKS5 target or bound address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    IPv4([u8; 4]),
    Domain(DomainName),
    IPv6([u8; 16]),
}

impl Address {
    /// address_type returns the ATYP byte this address is encoded with
    pub fn address_type(&self) -> AddressType {
        match self {
            Address::IPv4(_) => AddressType::IPv4,
            Address::Domain(_) => AddressType::DomainName,
            Address::IPv6(_) => AddressType::IPv6,
        }
    }

    /// host renders the address as text suitable for dialling.
    ///
    /// IPv6 is written as eight lowercase hex groups with no zero
    /// compression, e.g. `2001:db8:0:0:0:0:0:1`.
    pub fn host(&self) -> String {
        match self {
            Address::IPv4(octets) => Ipv4Addr::from(*octets).to_string(),
            Address::Domain(name) => name.to_string_lossy(),
            Address::IPv6(octets) => octets
                .chunks_exact(2)
                .map(|pair| format!("{:x}", u16::from_be_bytes([pair[0], pair[1]])))
                .collect::<Vec<_>>()
                .join(":"),
        }
    }
}

/// TargetAddr is an address together with its port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAddr {
    pub address: Address,
    pub port: u16,
}

impl TargetAddr {
    pub fn new(address: Address, port: u16) -> Self {
        Self { address, port }
    }

    /// host is the textual form of the address, see [`Address::host`]
    pub fn host(&self) -> String {
        self.address.host()
    }

    /// decode parses ATYP, DST.ADDR and DST.PORT from the start of `data`.
    ///
    /// Returns the address and the number of bytes it occupied, or `None`
    /// when more bytes are needed.
    pub fn decode(data: &[u8]) -> Result<Option<(Self, usize)>, SessionError> {
        let Some(&atyp) = data.first() else {
            return Ok(None);
        };

        // Offset starts after ATYP
        let mut offset = 1;

        let address = match AddressType::from_byte(atyp) {
            Some(AddressType::IPv4) => match take::<4>(data, &mut offset) {
                Some(octets) => Address::IPv4(octets),
                None => return Ok(None),
            },
            Some(AddressType::DomainName) => match parse_domain(data, &mut offset)? {
                Some(name) => Address::Domain(name),
                None => return Ok(None),
            },
            Some(AddressType::IPv6) => match take::<16>(data, &mut offset) {
                Some(octets) => Address::IPv6(octets),
                None => return Ok(None),
            },
            None => return Err(SessionError::UnsupportedAddressType(atyp)),
        };

        // Port in BE -> 2 bytes
        let Some(port) = take::<2>(data, &mut offset) else {
            return Ok(None);
        };

        Ok(Some((Self::new(address, u16::from_be_bytes(port)), offset)))
    }

    /// encode appends ATYP, the address bytes and the BE port to `buf`
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.address.address_type() as u8);

        match &self.address {
            Address::IPv4(octets) => buf.extend_from_slice(octets),
            Address::IPv6(octets) => buf.extend_from_slice(octets),
            Address::Domain(name) => {
                // Length is bounded by DomainName::new
                buf.push(name.as_bytes().len() as u8);
                buf.extend_from_slice(name.as_bytes());
            }
        }

        buf.extend_from_slice(&self.port.to_be_bytes());
    }
}

impl From<SocketAddr> for TargetAddr {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Self::new(Address::IPv4(v4.ip().octets()), v4.port()),
            SocketAddr::V6(v6) => {
                // Mapped addresses are still reported in IPv6 form
                Self::new(Address::IPv6(v6.ip().octets()), v6.port())
            }
        }
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.address {
            Address::IPv6(_) => write!(f, "[{}]:{}", self.host(), self.port),
            _ => write!(f, "{}:{}", self.host(), self.port),
        }
    }
}

/// Reply is a server reply to a SOCKS5 request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: ReplyCode,
    pub bound: TargetAddr,
}

impl Reply {
    pub fn new(code: ReplyCode, bound: TargetAddr) -> Self {
        Self { code, bound }
    }

    /// failure builds a reply with an unspecified IPv4 bound address
    pub fn failure(code: ReplyCode) -> Self {
        Self::new(code, TargetAddr::new(Address::IPv4(Ipv4Addr::UNSPECIFIED.octets()), 0))
    }

    /// to_bytes encodes the reply in wire format
    pub fn to_bytes(&self) -> Vec<u8> {
        // SOCKS5 reply format
        // +----+-----+-------+------+----------+----------+
        // |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
        // +----+-----+-------+------+----------+----------+
        // | 1  |  1  | X'00' |  1   | Variable |    2     |
        // +----+-----+-------+------+----------+----------+
        let mut reply = vec![Version::SOCKS5 as u8, self.code as u8, RSV];
        self.bound.encode(&mut reply);
        reply
    }
}

/// take copies the next N bytes at `offset` and advances it,
/// or returns None without moving when fewer than N remain
fn take<const N: usize>(data: &[u8], offset: &mut usize) -> Option<[u8; N]> {
    let bytes: [u8; N] = data.get(*offset..*offset + N)?.try_into().ok()?;
    *offset += N;
    Some(bytes)
}

/// parse_domain reads a length-prefixed domain name
fn parse_domain(data: &[u8], offset: &mut usize) -> Result<Option<DomainName>, SessionError> {
    // First octet contains the number of octets to follow
    let Some(&len) = data.get(*offset) else {
        return Ok(None);
    };
    let Some(raw) = data.get(*offset + 1..*offset + 1 + len as usize) else {
        return Ok(None);
    };

    let name = DomainName::new(raw)?;
    *offset += 1 + raw.len();
    Ok(Some(name))
}
