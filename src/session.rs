//! Per-connection SOCKS5 state machine.
//!
//! [`Session`] does no I/O. Bytes read from the client are handed to
//! [`Session::receive`], which returns the [`Action`]s the caller must carry
//! out in order. Whatever drives the socket only has to perform those
//! actions, so parsing depends on nothing but the current state and the
//! bytes accumulated so far.

use crate::address::{Reply, TargetAddr};
use crate::auth::{Greeting, UserPassRequest, auth_reply};
use crate::config::Config;
use crate::error::SessionError;
use crate::protocol::{AuthMethod, AuthStatus, Command, ReplyCode, Version};
use std::net::SocketAddr;
use std::sync::Arc;

/// Length of the fixed VER, CMD, RSV, ATYP request header
const REQUEST_HEADER_LEN: usize = 4;

/// ProtocolState is where a session is in the SOCKS5 exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Greeting,
    Auth,
    Request,
    Relay,
    Closed,
}

/// Action is something the connection driver has to do on the session's
/// behalf
#[derive(Debug)]
pub enum Action {
    /// Write these bytes to the client
    Send(Vec<u8>),
    /// Open an outbound connection and report back through
    /// [`Session::connect_succeeded`] or [`Session::connect_failed`]
    Connect(TargetAddr),
    /// Tear the connection down. Any Send before it is flushed first
    Close(SessionError),
}

/// Step is the outcome of evaluating one frame
enum Step {
    NeedMore,
    Continue,
    Stop,
}

/// Session holds the protocol state for one client connection
#[derive(Debug)]
pub struct Session {
    config: Arc<Config>,
    state: ProtocolState,
    buffer: Vec<u8>,
    // Start of the unconsumed bytes in `buffer`
    cursor: usize,
    awaiting_connect: bool,
}

/// Session implementation block
impl Session {
    /// new is a Session constructor. Sessions start in the greeting state
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            state: ProtocolState::Greeting,
            buffer: Vec::new(),
            cursor: 0,
            awaiting_connect: false,
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// pending returns the received bytes not yet consumed by a frame
    pub fn pending(&self) -> &[u8] {
        &self.buffer[self.cursor..]
    }

    /// receive appends a chunk from the client and evaluates every complete
    /// frame now available
    pub fn receive(&mut self, chunk: &[u8]) -> Vec<Action> {
        let mut actions = Vec::new();

        match self.state {
            ProtocolState::Relay | ProtocolState::Closed => return actions,
            _ => self.buffer.extend_from_slice(chunk),
        }

        // A parsed request is waiting on the outbound connect. Later bytes
        // belong to the destination
        if self.awaiting_connect {
            return actions;
        }

        loop {
            let step = match self.state {
                ProtocolState::Greeting => self.on_greeting(&mut actions),
                ProtocolState::Auth => self.on_auth(&mut actions),
                ProtocolState::Request => self.on_request(&mut actions),
                ProtocolState::Relay | ProtocolState::Closed => Ok(Step::Stop),
            };

            match step {
                Ok(Step::Continue) => continue,
                Ok(Step::NeedMore) | Ok(Step::Stop) => break,
                Err(e) => {
                    self.close();
                    actions.push(Action::Close(e));
                    break;
                }
            }
        }

        self.compact();
        actions
    }

    /// connect_succeeded moves the session into relay mode. It returns the
    /// success reply for the client and any bytes the client pipelined
    /// after its request, which belong to the destination
    pub fn connect_succeeded(&mut self, bound: SocketAddr) -> (Vec<u8>, Vec<u8>) {
        let reply = Reply::new(ReplyCode::Succeeded, TargetAddr::from(bound)).to_bytes();
        let leftover = self.buffer.split_off(self.cursor);

        self.buffer = Vec::new();
        self.cursor = 0;
        self.awaiting_connect = false;
        self.state = ProtocolState::Relay;

        (reply, leftover)
    }

    /// connect_failed closes the session and returns the general failure
    /// reply for the client
    pub fn connect_failed(&mut self) -> Vec<u8> {
        self.close();
        Reply::failure(ReplyCode::ServerFailure).to_bytes()
    }

    /// close marks the session closed. Calling it again is a no-op
    pub fn close(&mut self) {
        self.state = ProtocolState::Closed;
        self.awaiting_connect = false;
        self.buffer = Vec::new();
        self.cursor = 0;
    }

    // ==========
    // GREETING
    // ==========

    fn on_greeting(&mut self, actions: &mut Vec<Action>) -> Result<Step, SessionError> {
        let Some((greeting, used)) = Greeting::decode(self.pending())? else {
            return Ok(Step::NeedMore);
        };
        self.cursor += used;

        // ServerChoice method selection reply format
        // +----+--------+
        // |VER | METHOD |
        // +----+--------+
        // | 1  |   1    |
        // +----+--------+
        let method = greeting.selected_method();
        actions.push(Action::Send(vec![Version::SOCKS5 as u8, method as u8]));

        match method {
            AuthMethod::UserPass => {
                self.state = ProtocolState::Auth;
                Ok(Step::Continue)
            }
            AuthMethod::NoAcceptable => Err(SessionError::NoAcceptableMethod),
        }
    }

    // ======
    // AUTH
    // ======

    fn on_auth(&mut self, actions: &mut Vec<Action>) -> Result<Step, SessionError> {
        let Some((request, used)) = UserPassRequest::decode(self.pending())? else {
            return Ok(Step::NeedMore);
        };
        self.cursor += used;

        let status = request.verify(&self.config);
        actions.push(Action::Send(auth_reply(status).to_vec()));

        // No second attempt on failure
        match status {
            AuthStatus::Success => {
                self.state = ProtocolState::Request;
                Ok(Step::Continue)
            }
            AuthStatus::Failure => Err(SessionError::AuthenticationFailed),
        }
    }

    // =========
    // REQUEST
    // =========

    fn on_request(&mut self, actions: &mut Vec<Action>) -> Result<Step, SessionError> {
        // SOCKS5 request format
        // +----+-----+-------+------+----------+----------+
        // |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
        // +----+-----+-------+------+----------+----------+
        // | 1  |  1  | X'00' |  1   | Variable |    2     |
        // +----+-----+-------+------+----------+----------+
        let pending = self.pending();
        let [version, command, _rsv, _atyp, ..] = *pending else {
            return Ok(Step::NeedMore);
        };

        // Ensure version is 0x05 -> SOCKS5
        if version != Version::SOCKS5 as u8 {
            return Err(SessionError::UnsupportedVersion(version));
        }

        if Command::from_byte(command) != Some(Command::Connect) {
            actions.push(Action::Send(
                Reply::failure(ReplyCode::CommandNotSupported).to_bytes(),
            ));
            return Err(SessionError::UnsupportedCommand(command));
        }

        // Address decoding starts at ATYP
        let decoded = match TargetAddr::decode(&pending[REQUEST_HEADER_LEN - 1..]) {
            Ok(decoded) => decoded,
            Err(e) => {
                actions.push(Action::Send(
                    Reply::failure(ReplyCode::AddrTypeUnsupported).to_bytes(),
                ));
                return Err(e);
            }
        };
        let Some((target, used)) = decoded else {
            return Ok(Step::NeedMore);
        };

        self.cursor += REQUEST_HEADER_LEN - 1 + used;
        self.awaiting_connect = true;
        actions.push(Action::Connect(target));

        Ok(Step::Stop)
    }

    /// compact drops consumed bytes so the buffer only holds what is
    /// still unparsed
    fn compact(&mut self) {
        if self.cursor > 0 {
            self.buffer.drain(..self.cursor);
            self.cursor = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    const GREETING: &[u8] = &[0x05, 0x01, 0x02];
    const AUTH_OK: &[u8] = &[
        0x01, 0x05, b'a', b'l', b'i', b'c', b'e', 0x06, b's', b'e', b'c', b'r', b'e', b't',
    ];
    const AUTH_BAD: &[u8] = &[
        0x01, 0x05, b'a', b'l', b'i', b'c', b'e', 0x06, b's', b'e', b'c', b'r', b'e', b'x',
    ];
    const CONNECT_V4: &[u8] = &[0x05, 0x01, 0x00, 0x01, 0x5d, 0xb8, 0xd8, 0x22, 0x00, 0x50];

    fn session() -> Session {
        Session::new(Arc::new(Config::new("127.0.0.1", 1080, "alice", "secret")))
    }

    /// Outcome flattens actions into something comparable
    #[derive(Debug, PartialEq)]
    enum Outcome {
        Sent(Vec<u8>),
        Connect(TargetAddr),
        Closed,
    }

    fn outcomes(actions: Vec<Action>) -> Vec<Outcome> {
        actions
            .into_iter()
            .map(|action| match action {
                Action::Send(bytes) => Outcome::Sent(bytes),
                Action::Connect(target) => Outcome::Connect(target),
                Action::Close(_) => Outcome::Closed,
            })
            .collect()
    }

    fn feed_in_chunks(session: &mut Session, data: &[u8], size: usize) -> Vec<Outcome> {
        data.chunks(size)
            .flat_map(|chunk| outcomes(session.receive(chunk)))
            .collect()
    }

    fn handshake() -> Vec<u8> {
        [GREETING, AUTH_OK, CONNECT_V4].concat()
    }

    #[test]
    fn greeting_with_userpass_moves_to_auth() {
        let mut session = session();
        let out = outcomes(session.receive(&[0x05, 0x02, 0x00, 0x02]));
        assert_eq!(out, vec![Outcome::Sent(vec![0x05, 0x02])]);
        assert_eq!(session.state(), ProtocolState::Auth);
    }

    #[test]
    fn greeting_without_userpass_is_refused() {
        let mut session = session();
        let out = outcomes(session.receive(&[0x05, 0x01, 0x00]));
        assert_eq!(out, vec![Outcome::Sent(vec![0x05, 0xff]), Outcome::Closed]);
        assert_eq!(session.state(), ProtocolState::Closed);
    }

    #[test]
    fn wrong_greeting_version_closes_without_reply() {
        let mut session = session();
        let out = outcomes(session.receive(&[0x04, 0x01, 0x02]));
        assert_eq!(out, vec![Outcome::Closed]);
    }

    #[test]
    fn matching_credentials_move_to_request() {
        let mut session = session();
        session.receive(GREETING);
        let out = outcomes(session.receive(AUTH_OK));
        assert_eq!(out, vec![Outcome::Sent(vec![0x01, 0x00])]);
        assert_eq!(session.state(), ProtocolState::Request);
    }

    #[test]
    fn wrong_password_closes_and_ignores_request() {
        let mut session = session();
        let out = outcomes(session.receive(&[GREETING, AUTH_BAD, CONNECT_V4].concat()));
        assert_eq!(
            out,
            vec![
                Outcome::Sent(vec![0x05, 0x02]),
                Outcome::Sent(vec![0x01, 0x01]),
                Outcome::Closed,
            ]
        );
        assert!(session.receive(CONNECT_V4).is_empty());
        assert_eq!(session.state(), ProtocolState::Closed);
    }

    #[test]
    fn wrong_auth_version_closes_without_reply() {
        let mut session = session();
        session.receive(GREETING);
        let out = outcomes(session.receive(&[0x02, 0x05]));
        assert_eq!(out, vec![Outcome::Closed]);
    }

    #[test]
    fn connect_request_is_emitted() {
        let mut session = session();
        let out = outcomes(session.receive(&handshake()));
        assert_eq!(
            out.last(),
            Some(&Outcome::Connect(TargetAddr::new(
                Address::IPv4([93, 184, 216, 34]),
                80
            )))
        );
        assert_eq!(session.state(), ProtocolState::Request);
    }

    #[test]
    fn bind_is_not_supported() {
        let mut session = session();
        session.receive(&[GREETING, AUTH_OK].concat());
        let out = outcomes(session.receive(&[0x05, 0x02, 0x00, 0x01]));
        assert_eq!(
            out,
            vec![
                Outcome::Sent(vec![0x05, 0x07, 0x00, 0x01, 0, 0, 0, 0, 0, 0]),
                Outcome::Closed,
            ]
        );
    }

    #[test]
    fn unknown_address_type_is_not_supported() {
        let mut session = session();
        session.receive(&[GREETING, AUTH_OK].concat());
        let out = outcomes(session.receive(&[0x05, 0x01, 0x00, 0x05, 1, 2, 3]));
        assert_eq!(
            out,
            vec![
                Outcome::Sent(vec![0x05, 0x08, 0x00, 0x01, 0, 0, 0, 0, 0, 0]),
                Outcome::Closed,
            ]
        );
    }

    #[test]
    fn wrong_request_version_closes_without_reply() {
        let mut session = session();
        session.receive(&[GREETING, AUTH_OK].concat());
        let out = outcomes(session.receive(&[0x04, 0x01, 0x00, 0x01]));
        assert_eq!(out, vec![Outcome::Closed]);
    }

    #[test]
    fn fragmentation_does_not_change_outcome() {
        let data = handshake();

        let mut whole = session();
        let expected = feed_in_chunks(&mut whole, &data, data.len());

        for size in 1..data.len() {
            let mut split = session();
            assert_eq!(feed_in_chunks(&mut split, &data, size), expected, "chunk size {size}");
            assert_eq!(split.state(), whole.state());
        }
    }

    #[test]
    fn domain_and_ipv6_requests_survive_byte_by_byte() {
        let mut domain = vec![0x05, 0x01, 0x00, 0x03, 11];
        domain.extend_from_slice(b"example.com");
        domain.extend_from_slice(&443u16.to_be_bytes());

        let mut ipv6 = vec![0x05, 0x01, 0x00, 0x04];
        ipv6.extend_from_slice(&[0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        ipv6.extend_from_slice(&22u16.to_be_bytes());

        for (request, host, port) in [
            (domain, "example.com", 443),
            (ipv6, "fe80:0:0:0:0:0:0:1", 22),
        ] {
            let mut session = session();
            session.receive(&[GREETING, AUTH_OK].concat());
            let out = feed_in_chunks(&mut session, &request, 1);
            match out.as_slice() {
                [Outcome::Connect(target)] => {
                    assert_eq!(target.host(), host);
                    assert_eq!(target.port, port);
                }
                other => panic!("unexpected outcome {other:?}"),
            }
        }
    }

    #[test]
    fn pipelined_bytes_are_handed_over_on_connect() {
        let mut session = session();
        let mut data = handshake();
        data.extend_from_slice(b"GET / HTTP/1.1\r\n");
        session.receive(&data);
        // Bytes arriving while the connect is pending are kept, not parsed
        assert!(session.receive(b"\r\n").is_empty());

        let bound: SocketAddr = "10.1.2.3:5555".parse().unwrap();
        let (reply, leftover) = session.connect_succeeded(bound);
        assert_eq!(reply, vec![0x05, 0x00, 0x00, 0x01, 10, 1, 2, 3, 0x15, 0xb3]);
        assert_eq!(leftover, b"GET / HTTP/1.1\r\n\r\n");
        assert_eq!(session.state(), ProtocolState::Relay);
        assert!(session.receive(b"more").is_empty());
    }

    #[test]
    fn failed_connect_replies_general_failure() {
        let mut session = session();
        session.receive(&handshake());
        assert_eq!(
            session.connect_failed(),
            vec![0x05, 0x01, 0x00, 0x01, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(session.state(), ProtocolState::Closed);
    }

    #[test]
    fn consumed_bytes_are_dropped_from_buffer() {
        let mut session = session();
        session.receive(&[0x05, 0x01, 0x02, 0x01, 0x05]);
        assert_eq!(session.pending(), &[0x01, 0x05]);
    }

    #[test]
    fn close_is_idempotent() {
        let mut session = session();
        session.close();
        session.close();
        assert_eq!(session.state(), ProtocolState::Closed);
        assert!(session.receive(GREETING).is_empty());
    }
}
