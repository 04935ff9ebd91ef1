//! SOCKS5 negotiation as an explicit state machine.
//!
//! The [`Negotiator`] does no I/O. Bytes read from the client are handed to
//! [`Negotiator::feed`] and [`Negotiator::next_event`] is polled until it
//! returns `None`, at which point more bytes are needed. This keeps a single
//! dispatch point per state and lets a client pipeline the greeting, the
//! request and its first payload in one segment.

use crate::address::{self, TargetEndpoint};
use crate::error::SessionError;
use crate::protocol::{AuthMethod, Command, RSV, Version};

/// Where a session is in the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    AwaitingGreeting,
    AwaitingRequest,
    /// Request parsed, upstream dial in flight. No bytes are parsed here.
    Connecting,
    /// Opaque relay; the negotiator accepts no further input
    Relaying,
}

/// Event is what the negotiator asks the session to act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Greeting accepted, the method selection reply must be sent
    Greeted([u8; 2]),
    /// CONNECT request decoded, the upstream must be dialed
    Connect(TargetEndpoint),
}

/// Negotiator buffers client bytes and turns them into [`Event`]s
#[derive(Debug)]
pub struct Negotiator {
    state: State,
    buf: Vec<u8>,
}

impl Default for Negotiator {
    fn default() -> Self {
        Self::new()
    }
}

impl Negotiator {
    pub fn new() -> Self {
        Self {
            state: State::AwaitingGreeting,
            buf: Vec::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// feed appends bytes received from the client. Bytes fed while
    /// connecting are queued for the upstream; once relaying has started
    /// the negotiator refuses input.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), SessionError> {
        match self.state {
            State::AwaitingGreeting | State::AwaitingRequest | State::Connecting => {
                self.buf.extend_from_slice(chunk);
                Ok(())
            }
            State::Relaying => Err(SessionError::ProtocolViolation(format!(
                "{} bytes received by the negotiator after relaying began",
                chunk.len()
            ))),
        }
    }

    /// next_event parses as much of the buffer as the current state allows
    pub fn next_event(&mut self) -> Result<Option<Event>, SessionError> {
        match self.state {
            State::AwaitingGreeting => self.parse_greeting(),
            State::AwaitingRequest => self.parse_request(),
            State::Connecting | State::Relaying => Ok(None),
        }
    }

    /// connected moves a connecting session to relaying and hands back any
    /// bytes the client sent past the end of its request
    pub fn connected(&mut self) -> Result<Vec<u8>, SessionError> {
        if self.state != State::Connecting {
            return Err(SessionError::ProtocolViolation(format!(
                "upstream connected while in {:?}",
                self.state
            )));
        }

        self.state = State::Relaying;
        Ok(std::mem::take(&mut self.buf))
    }

    /// closed reports why negotiation cannot finish once the client has
    /// stopped sending. A request cut off inside its address field is a
    /// `MalformedAddress`; any other truncation is a protocol violation.
    pub fn closed(&self) -> SessionError {
        if self.state == State::AwaitingRequest && self.buf.len() > 3 {
            if let Err(e) = address::decode(&self.buf[3..]) {
                return e;
            }
        }

        SessionError::ProtocolViolation(format!("client closed while in {:?}", self.state))
    }

    fn parse_greeting(&mut self) -> Result<Option<Event>, SessionError> {
        // +----+----------+----------+
        // |VER | NMETHODS | METHODS  |
        // +----+----------+----------+
        let Some(&version) = self.buf.first() else {
            return Ok(None);
        };

        // Ensure version is 0x05 -> SOCKS5
        if version != Version::SOCKS5 as u8 {
            return Err(SessionError::UnsupportedVersion(version));
        }

        let Some(&n_methods) = self.buf.get(1) else {
            return Ok(None);
        };

        // The offered methods only have to be present; no-auth is always chosen
        let len = 2 + n_methods as usize;
        if self.buf.len() < len {
            return Ok(None);
        }
        self.buf.drain(..len);

        self.state = State::AwaitingRequest;
        Ok(Some(Event::Greeted([
            Version::SOCKS5 as u8,
            AuthMethod::NoAuth as u8,
        ])))
    }

    fn parse_request(&mut self) -> Result<Option<Event>, SessionError> {
        // +----+-----+-------+------+----------+----------+
        // |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
        // +----+-----+-------+------+----------+----------+
        let Some(&version) = self.buf.first() else {
            return Ok(None);
        };

        if version != Version::SOCKS5 as u8 {
            return Err(SessionError::UnsupportedVersion(version));
        }

        let Some(&command) = self.buf.get(1) else {
            return Ok(None);
        };

        if Command::from_byte(command) != Some(Command::Connect) {
            return Err(SessionError::UnsupportedCommand(command));
        }

        let Some(&reserved) = self.buf.get(2) else {
            return Ok(None);
        };

        if reserved != RSV {
            return Err(SessionError::ProtocolViolation(format!(
                "reserved byte is {reserved:#04x}"
            )));
        }

        let Some((_, addr_len)) = address::encoded_len(&self.buf[3..])? else {
            return Ok(None);
        };

        if self.buf.len() < 3 + addr_len {
            return Ok(None);
        }

        let (endpoint, consumed) = address::decode(&self.buf[3..])?;
        self.buf.drain(..3 + consumed);

        self.state = State::Connecting;
        Ok(Some(Event::Connect(endpoint)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Host;
    use std::net::Ipv4Addr;

    const CONNECT_LOCALHOST_80: [u8; 10] = [0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50];

    fn greeted() -> Negotiator {
        let mut negotiator = Negotiator::new();
        negotiator.feed(&[0x05, 0x01, 0x00]).unwrap();
        assert!(matches!(
            negotiator.next_event().unwrap(),
            Some(Event::Greeted(_))
        ));
        negotiator
    }

    #[test]
    fn test_greeting_always_selects_no_auth() {
        for methods in [&[][..], &[0x00][..], &[0x02][..], &[0x01, 0x02, 0x80][..]] {
            let mut negotiator = Negotiator::new();
            let mut greeting = vec![0x05, methods.len() as u8];
            greeting.extend_from_slice(methods);
            negotiator.feed(&greeting).unwrap();

            assert_eq!(
                negotiator.next_event().unwrap(),
                Some(Event::Greeted([0x05, 0x00]))
            );
            assert_eq!(negotiator.state(), State::AwaitingRequest);
        }
    }

    #[test]
    fn test_greeting_arrives_in_pieces() {
        let mut negotiator = Negotiator::new();

        for byte in [0x05, 0x02, 0x00] {
            negotiator.feed(&[byte]).unwrap();
            assert_eq!(negotiator.next_event().unwrap(), None);
            assert_eq!(negotiator.state(), State::AwaitingGreeting);
        }

        negotiator.feed(&[0x02]).unwrap();
        assert_eq!(
            negotiator.next_event().unwrap(),
            Some(Event::Greeted([0x05, 0x00]))
        );
    }

    #[test]
    fn test_greeting_wrong_version() {
        let mut negotiator = Negotiator::new();
        negotiator.feed(&[0x04, 0x01, 0x00]).unwrap();

        let err = negotiator.next_event().unwrap_err();
        assert!(matches!(err, SessionError::UnsupportedVersion(0x04)));
        assert_eq!(negotiator.state(), State::AwaitingGreeting);
    }

    #[test]
    fn test_connect_request() {
        let mut negotiator = greeted();
        negotiator.feed(&CONNECT_LOCALHOST_80).unwrap();

        let event = negotiator.next_event().unwrap();
        let Some(Event::Connect(endpoint)) = event else {
            panic!("expected connect event, got {event:?}");
        };
        assert_eq!(endpoint.host, Host::Ipv4(Ipv4Addr::LOCALHOST));
        assert_eq!(endpoint.port, 80);
        assert_eq!(negotiator.state(), State::Connecting);

        // Nothing is parsed while the dial is in flight
        assert_eq!(negotiator.next_event().unwrap(), None);
    }

    #[test]
    fn test_domain_request_in_pieces() {
        let mut negotiator = greeted();
        let mut request = vec![0x05, 0x01, 0x00, 0x03, 9];
        request.extend_from_slice(b"localhost");
        request.extend_from_slice(&[0x1F, 0x90]);

        let (head, tail) = request.split_at(6);
        negotiator.feed(head).unwrap();
        assert_eq!(negotiator.next_event().unwrap(), None);
        negotiator.feed(tail).unwrap();

        let Some(Event::Connect(endpoint)) = negotiator.next_event().unwrap() else {
            panic!("expected connect event");
        };
        assert_eq!(endpoint.host, Host::Domain(b"localhost".to_vec()));
        assert_eq!(endpoint.port, 8080);
    }

    #[test]
    fn test_pipelined_bytes_are_queued_for_upstream() {
        let mut negotiator = Negotiator::new();
        let mut segment = vec![0x05, 0x01, 0x00];
        segment.extend_from_slice(&CONNECT_LOCALHOST_80);
        segment.extend_from_slice(b"GET / HTTP/1.0\r\n");
        negotiator.feed(&segment).unwrap();

        assert!(matches!(
            negotiator.next_event().unwrap(),
            Some(Event::Greeted(_))
        ));
        assert!(matches!(
            negotiator.next_event().unwrap(),
            Some(Event::Connect(_))
        ));

        negotiator.feed(b"\r\n").unwrap();
        assert_eq!(negotiator.connected().unwrap(), b"GET / HTTP/1.0\r\n\r\n");
        assert_eq!(negotiator.state(), State::Relaying);
    }

    #[test]
    fn test_unsupported_commands() {
        for command in [0x02, 0x03, 0x00, 0x7F] {
            let mut negotiator = greeted();
            negotiator
                .feed(&[0x05, command, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50])
                .unwrap();

            let err = negotiator.next_event().unwrap_err();
            assert!(
                matches!(err, SessionError::UnsupportedCommand(c) if c == command),
                "{err:?}"
            );
        }
    }

    #[test]
    fn test_request_wrong_version() {
        let mut negotiator = greeted();
        negotiator.feed(&[0x04, 0x01, 0x00, 0x01]).unwrap();
        assert!(matches!(
            negotiator.next_event().unwrap_err(),
            SessionError::UnsupportedVersion(0x04)
        ));
    }

    #[test]
    fn test_nonzero_reserved_byte() {
        let mut negotiator = greeted();
        negotiator.feed(&[0x05, 0x01, 0x01, 0x01]).unwrap();
        assert!(matches!(
            negotiator.next_event().unwrap_err(),
            SessionError::ProtocolViolation(_)
        ));
    }

    #[test]
    fn test_unknown_address_type() {
        let mut negotiator = greeted();
        negotiator.feed(&[0x05, 0x01, 0x00, 0x09]).unwrap();
        assert!(matches!(
            negotiator.next_event().unwrap_err(),
            SessionError::MalformedAddress(_)
        ));
    }

    #[test]
    fn test_input_rejected_after_relaying() {
        let mut negotiator = greeted();
        negotiator.feed(&CONNECT_LOCALHOST_80).unwrap();
        negotiator.next_event().unwrap();
        assert!(negotiator.connected().unwrap().is_empty());

        assert!(matches!(
            negotiator.feed(&[0x05, 0x01, 0x00]),
            Err(SessionError::ProtocolViolation(_))
        ));
        assert_eq!(negotiator.next_event().unwrap(), None);
    }

    #[test]
    fn test_closed_inside_address_is_malformed() {
        let mut negotiator = greeted();
        negotiator.feed(&[0x05, 0x01, 0x00, 0x01, 0x7f, 0x00]).unwrap();
        assert_eq!(negotiator.next_event().unwrap(), None);

        assert!(matches!(
            negotiator.closed(),
            SessionError::MalformedAddress(_)
        ));
    }

    #[test]
    fn test_closed_before_address_is_violation() {
        let mut negotiator = Negotiator::new();
        negotiator.feed(&[0x05, 0x02, 0x00]).unwrap();
        assert_eq!(negotiator.next_event().unwrap(), None);
        assert!(matches!(
            negotiator.closed(),
            SessionError::ProtocolViolation(_)
        ));

        let mut negotiator = greeted();
        negotiator.feed(&[0x05, 0x01, 0x00]).unwrap();
        assert_eq!(negotiator.next_event().unwrap(), None);
        assert!(matches!(
            negotiator.closed(),
            SessionError::ProtocolViolation(_)
        ));
    }

    #[test]
    fn test_connected_outside_connecting() {
        let mut negotiator = Negotiator::new();
        assert!(negotiator.connected().is_err());
        assert_eq!(negotiator.state(), State::AwaitingGreeting);
    }
}
