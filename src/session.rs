//! The RNDC handshake, expressed as a pure state machine driven entirely by
//! caller-supplied I/O.
//!
//! A [`Session`] never touches a socket. It produces [`Event`]s describing
//! what the caller should do next (`WantWrite`, `WantRead`) and, once the
//! handshake concludes, a terminal event (`WantFinish`, `WantError`). This
//! lets the exact same state machine drive a blocking client (see
//! [`crate::Client`]), an async client, or the `named`-side of the protocol,
//! without this module knowing anything about how bytes actually move.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::codec;
use crate::logging::{debug, trace, warn};
use crate::packet::{self, Packet};
use crate::value::{Table, Value};
use crate::Error;

/// Seconds of validity given to `_ctrl._exp` on outgoing packets.
const EXPIRY_SECS: u64 = 60;

/// A function that produces the response text for a command string,
/// invoked by server-role sessions once a response has been authenticated.
///
/// This is the caller-supplied handler that produces a response for
/// `command`; the core never interprets the command string itself, it only
/// routes it to this closure.
pub type CommandHandler = Box<dyn FnMut(&str) -> String + Send>;

/// An I/O intent emitted by a [`Session`]. The caller must act on it (write
/// the bytes, read more bytes, or record the outcome) and then call
/// [`Session::next`] to advance.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Write these bytes to the peer, then call `next(None)`.
    WantWrite(Vec<u8>),
    /// Read a complete packet from the peer, then call `next(Some(buf))`.
    WantRead,
    /// The handshake completed successfully with this result text. Terminal.
    WantFinish(String),
    /// The handshake failed with this message. Terminal.
    WantError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    ClientSentOpening,
    ClientAwaitingChallenge,
    ClientSentResponse,
    ClientAwaitingResult,
    ServerAwaitingOpening,
    ServerSentChallenge,
    ServerAwaitingResponse,
    ServerSentResult,
    Done,
    Failed,
}

/// Construction parameters for a [`Session`].
///
/// Validated eagerly at construction rather than lazily at first use.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Base64-encoded HMAC-MD5 secret. Required.
    pub key: Option<String>,
    /// The command to issue. Required for client-role sessions; ignored for
    /// server-role sessions (which learn the command from the peer).
    pub command: Option<String>,
    /// A fixed nonce to use instead of generating one randomly. Only
    /// meaningful for server-role sessions; intended for tests.
    pub nonce: Option<u32>,
}

/// A single-use RNDC handshake, either initiating (`client`) or responding
/// to (`server`) a request.
///
/// Call [`Session::start`] to begin, then call [`Session::next`] once per
/// emitted [`Event::WantWrite`] or [`Event::WantRead`] until a terminal
/// event ([`Event::WantFinish`] or [`Event::WantError`]) is produced.
pub struct Session {
    role: Role,
    key: Vec<u8>,
    command: Option<String>,
    command_handler: Option<CommandHandler>,
    nonce: Option<u32>,
    state: State,
    terminal: Option<Event>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("nonce", &self.nonce)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Construct a client-role session that will issue `config.command`.
    pub fn client(config: SessionConfig) -> Result<Self, Error> {
        let key = decode_configured_key(&config)?;
        let command = config.command.ok_or(Error::MissingCommand)?;

        Ok(Self {
            role: Role::Client,
            key,
            command: Some(command),
            command_handler: None,
            nonce: None,
            state: State::Start,
            terminal: None,
        })
    }

    /// Construct a server-role session that will answer a single request
    /// using `command_handler` to produce the response text.
    ///
    /// When `config.nonce` is `Some`, it is used instead of generating one
    /// randomly - intended for deterministic tests.
    pub fn server(config: SessionConfig, command_handler: CommandHandler) -> Result<Self, Error> {
        let key = decode_configured_key(&config)?;

        Ok(Self {
            role: Role::Server,
            key,
            command: None,
            command_handler: Some(command_handler),
            nonce: config.nonce,
            state: State::Start,
            terminal: None,
        })
    }

    /// Enter the state machine, producing the first event.
    pub fn start(&mut self) -> Event {
        debug!(role = ?self.role, "starting rndc session");
        match self.role {
            Role::Client => {
                let command = self
                    .command
                    .clone()
                    .expect("client sessions always carry a command");
                self.send_packet(State::ClientSentOpening, None, |data| {
                    data.ensure_table_mut("_data")?.insert("type", Value::from_str(&command));
                    Ok(())
                })
            }
            Role::Server => {
                self.state = State::ServerAwaitingOpening;
                Event::WantRead
            }
        }
    }

    /// Advance the state machine. Pass `None` after a [`Event::WantWrite`];
    /// pass `Some(buf)`, the bytes read from the peer, after an
    /// [`Event::WantRead`].
    ///
    /// Calling this after a terminal event has already been produced simply
    /// returns that same terminal event again.
    pub fn next(&mut self, buf: Option<&[u8]>) -> Event {
        match self.state {
            State::Start => {
                warn!("next() called before start()");
                self.fail(Error::MissingField("start() not called"))
            }
            State::ClientSentOpening => {
                self.state = State::ClientAwaitingChallenge;
                Event::WantRead
            }
            State::ClientAwaitingChallenge => self.on_client_challenge(buf),
            State::ClientSentResponse => {
                self.state = State::ClientAwaitingResult;
                Event::WantRead
            }
            State::ClientAwaitingResult => self.on_client_result(buf),
            State::ServerAwaitingOpening => self.on_server_opening(buf),
            State::ServerSentChallenge => {
                self.state = State::ServerAwaitingResponse;
                Event::WantRead
            }
            State::ServerAwaitingResponse => self.on_server_response(buf),
            State::ServerSentResult => {
                let command = self
                    .command
                    .clone()
                    .expect("command is known by the time the result is sent");
                self.finish(command)
            }
            State::Done | State::Failed => self
                .terminal
                .clone()
                .expect("Done/Failed states always have a recorded terminal event"),
        }
    }

    fn on_client_challenge(&mut self, buf: Option<&[u8]>) -> Event {
        let buf = match require_buf(buf) {
            Ok(b) => b,
            Err(e) => return self.fail(e),
        };

        let challenge = match packet::decode_raw(&self.key, buf) {
            Ok(p) => p,
            Err(e) => return self.fail(e),
        };

        let nonce = match challenge.nonce() {
            Some(n) => n,
            None => return self.fail(Error::MissingField("_ctrl._nonce")),
        };
        self.nonce = Some(nonce);
        trace!(nonce, "client received challenge");

        let command = self
            .command
            .clone()
            .expect("client sessions always carry a command");
        self.send_packet(State::ClientSentResponse, Some(nonce), |data| {
            data.ensure_table_mut("_data")?.insert("type", Value::from_str(&command));
            Ok(())
        })
    }

    fn on_client_result(&mut self, buf: Option<&[u8]>) -> Event {
        let buf = match require_buf(buf) {
            Ok(b) => b,
            Err(e) => return self.fail(e),
        };

        let result = match packet::decode_raw(&self.key, buf) {
            Ok(p) => p,
            Err(e) => return self.fail(e),
        };

        match result.text().or_else(|| result.err()) {
            Some(text) => self.finish(text.to_owned()),
            None => self.fail(Error::MissingField("_data.text")),
        }
    }

    fn on_server_opening(&mut self, buf: Option<&[u8]>) -> Event {
        let buf = match require_buf(buf) {
            Ok(b) => b,
            Err(e) => return self.fail(e),
        };

        let opening = match packet::decode_raw(&self.key, buf) {
            Ok(p) => p,
            Err(e) => return self.fail(e),
        };

        let command = match opening.body().and_then(|d| d.get("type")).and_then(Value::as_str) {
            Some(c) => c.to_owned(),
            None => return self.fail(Error::MissingField("_data.type")),
        };
        self.command = Some(command);

        let nonce = self.nonce.unwrap_or_else(rand::random);
        self.nonce = Some(nonce);
        debug!(nonce, "server issuing challenge");

        self.send_packet(State::ServerSentChallenge, Some(nonce), |_| Ok(()))
    }

    fn on_server_response(&mut self, buf: Option<&[u8]>) -> Event {
        let buf = match require_buf(buf) {
            Ok(b) => b,
            Err(e) => return self.fail(e),
        };

        let response = match packet::decode_raw(&self.key, buf) {
            Ok(p) => p,
            Err(e) => return self.fail(e),
        };

        let echoed = match response.nonce() {
            Some(n) => n,
            None => return self.fail(Error::MissingField("_ctrl._nonce")),
        };
        if Some(echoed) != self.nonce {
            warn!(expected = ?self.nonce, got = echoed, "nonce mismatch");
            return self.fail(Error::NonceMismatch);
        }

        let command = match response.body().and_then(|d| d.get("type")).and_then(Value::as_str) {
            Some(c) => c.to_owned(),
            None => return self.fail(Error::MissingField("_data.type")),
        };
        self.command = Some(command.clone());

        let text = self
            .command_handler
            .as_mut()
            .expect("server sessions always carry a command handler")(&command);

        let nonce = self.nonce;
        self.send_packet(State::ServerSentResult, nonce, move |data| {
            data.ensure_table_mut("_data")?.insert("text", Value::from_str(&text));
            Ok(())
        })
    }

    /// Build, sign, and emit an outgoing packet, transitioning to `next_state`
    /// on success or `Failed` on any codec error.
    ///
    /// `populate` is handed the packet's `data` table to fill in before
    /// encoding; `_ctrl._tim`/`_ctrl._exp` and the nonce (if any) are set
    /// automatically.
    fn send_packet(
        &mut self,
        next_state: State,
        nonce: Option<u32>,
        populate: impl FnOnce(&mut Table) -> Result<(), Error>,
    ) -> Event {
        let mut data = Table::new();
        if let Err(e) = populate(&mut data) {
            return self.fail(e);
        }

        let packet = match Packet::new(nonce, data) {
            Ok(p) => p,
            Err(e) => return self.fail(e),
        };

        let mut packet = packet;
        populate_timestamps(&mut packet);

        match packet::encode_raw(&self.key, &packet) {
            Ok(bytes) => {
                self.state = next_state;
                Event::WantWrite(bytes)
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, err: Error) -> Event {
        warn!(error = %err, "session failed");
        self.state = State::Failed;
        let event = Event::WantError(err.to_string());
        self.terminal = Some(event.clone());
        event
    }

    fn finish(&mut self, text: String) -> Event {
        trace!("session finished");
        self.state = State::Done;
        let event = Event::WantFinish(text);
        self.terminal = Some(event.clone());
        event
    }
}

fn decode_configured_key(config: &SessionConfig) -> Result<Vec<u8>, Error> {
    let key = config.key.as_deref().ok_or(Error::MissingKey)?;
    codec::decode_key(key)
}

fn require_buf(buf: Option<&[u8]>) -> Result<&[u8], Error> {
    buf.ok_or(Error::ShortRead { actual: 0, expected: 4 })
}

fn populate_timestamps(packet: &mut Packet) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    if let Ok(ctrl) = packet.data_mut().ensure_table_mut("_ctrl") {
        ctrl.insert("_tim", Value::from_int(now));
        ctrl.insert("_exp", Value::from_int(now + EXPIRY_SECS));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "aabc";

    fn config(command: Option<&str>, nonce: Option<u32>) -> SessionConfig {
        SessionConfig {
            key: Some(KEY.to_owned()),
            command: command.map(str::to_owned),
            nonce,
        }
    }

    #[test]
    fn test_client_requires_key() {
        let err = Session::client(SessionConfig {
            key: None,
            command: Some("status".into()),
            nonce: None,
        })
        .unwrap_err();
        assert_eq!(err, Error::MissingKey);
    }

    #[test]
    fn test_client_requires_command() {
        let err = Session::client(config(None, None)).unwrap_err();
        assert_eq!(err, Error::MissingCommand);
    }

    #[test]
    fn test_bad_key_rejected() {
        let err = Session::client(SessionConfig {
            key: Some("not valid base64!!".into()),
            command: Some("status".into()),
            nonce: None,
        })
        .unwrap_err();
        assert_eq!(err, Error::BadKey);
    }

    /// Drive a client and a server session against each other in-process,
    /// with no sockets involved, asserting the full handshake completes on
    /// both sides.
    #[test]
    fn test_full_client_server_handshake() {
        let mut client = Session::client(config(Some("status"), None)).unwrap();
        let mut server = Session::server(
            config(None, Some(7)),
            Box::new(|cmd| format!("ran: {cmd}")),
        )
        .unwrap();

        let server_ev = server.start();
        assert!(matches!(server_ev, Event::WantRead));

        let client_ev = client.start();
        let opening = match client_ev {
            Event::WantWrite(bytes) => bytes,
            other => panic!("expected want_write, got {other:?}"),
        };

        let server_ev = server.next(Some(&opening));
        let challenge = match server_ev {
            Event::WantWrite(bytes) => bytes,
            other => panic!("expected want_write, got {other:?}"),
        };

        assert!(matches!(client.next(None), Event::WantRead));
        let client_ev = client.next(Some(&challenge));
        let response = match client_ev {
            Event::WantWrite(bytes) => bytes,
            other => panic!("expected want_write, got {other:?}"),
        };

        assert!(matches!(server.next(None), Event::WantRead));
        let server_ev = server.next(Some(&response));
        let result = match server_ev {
            Event::WantWrite(bytes) => bytes,
            other => panic!("expected want_write, got {other:?}"),
        };

        let server_finish = server.next(None);
        assert_eq!(server_finish, Event::WantFinish("status".into()));

        assert!(matches!(client.next(None), Event::WantRead));
        let client_finish = client.next(Some(&result));
        assert_eq!(client_finish, Event::WantFinish("ran: status".into()));
    }

    #[test]
    fn test_nonce_mismatch_fails_server() {
        let mut server = Session::server(config(None, Some(1)), Box::new(|c| c.to_owned())).unwrap();
        server.start();

        let mut data = Table::new();
        data.ensure_table_mut("_data").unwrap().insert("type", Value::from_str("status"));
        let opening = Packet::new(None, data).unwrap();
        let wire = packet::encode_raw(&codec::decode_key(KEY).unwrap(), &opening).unwrap();
        server.next(Some(&wire));

        let mut resp_data = Table::new();
        resp_data.ensure_table_mut("_data").unwrap().insert("type", Value::from_str("status"));
        let wrong_nonce_response = Packet::new(Some(999), resp_data).unwrap();
        let wire = packet::encode_raw(&codec::decode_key(KEY).unwrap(), &wrong_nonce_response).unwrap();

        let ev = server.next(Some(&wire));
        assert_eq!(ev, Event::WantError(Error::NonceMismatch.to_string()));
    }

    #[test]
    fn test_client_signature_tampering_fails() {
        let mut server = Session::server(config(None, Some(1)), Box::new(|c| c.to_owned())).unwrap();
        server.start();

        let mut client = Session::client(config(Some("status"), None)).unwrap();
        let opening = match client.start() {
            Event::WantWrite(b) => b,
            other => panic!("{other:?}"),
        };

        let challenge = match server.next(Some(&opening)) {
            Event::WantWrite(b) => b,
            other => panic!("{other:?}"),
        };

        client.next(None);
        let mut tampered = challenge;
        *tampered.last_mut().unwrap() ^= 0xFF;

        let ev = client.next(Some(&tampered));
        assert_eq!(ev, Event::WantError(Error::BadSignature.to_string()));
    }
}
