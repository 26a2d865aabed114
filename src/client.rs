//! A blocking TCP convenience wrapper around [`Session`].
//!
//! This is the only piece of the crate that touches a socket; everything
//! else (the codec, the state machine) is pure and knows nothing about I/O.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::logging::trace;
use crate::session::{Event, Session, SessionConfig};
use crate::Error;

/// Size of the read buffer used for each `want_read` fill. RNDC packets are
/// small administrative messages; a single 4 KiB read is expected to
/// capture a complete packet in the common case, matching the synchronous
/// wrapper's specified behaviour of a single read per `want_read` with no
/// reassembly loop.
const READ_BUF_SIZE: usize = 4096;

/// A synchronous RNDC client: opens a TCP connection, drives a
/// [`Session`](crate::Session) to completion, and returns the result.
#[derive(Debug, Clone)]
pub struct Client {
    host: String,
    port: u16,
    key: String,
    timeout: Option<Duration>,
}

impl Client {
    /// The RNDC control port `named` listens on by default.
    pub const DEFAULT_PORT: u16 = 953;

    /// Construct a client targeting `host` on the default port, using
    /// `key` (a Base64-encoded HMAC-MD5 secret) to authenticate.
    pub fn new(host: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: Self::DEFAULT_PORT,
            key: key.into(),
            timeout: None,
        }
    }

    /// Override the port to connect to.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set a read/write timeout on the underlying socket. Unset by default,
    /// meaning calls may block indefinitely; the session itself has no
    /// notion of a timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Issue `command` and block until the response (or an error) arrives.
    pub fn call(&self, command: impl Into<String>) -> Result<String, Error> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::Io(format!("could not resolve {}:{}", self.host, self.port)))?;

        let mut stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(self.timeout)?;
        stream.set_write_timeout(self.timeout)?;

        let config = SessionConfig {
            key: Some(self.key.clone()),
            command: Some(command.into()),
            nonce: None,
        };
        let mut session = Session::client(config)?;

        self.pump(&mut stream, session.start(), &mut session)
    }

    fn pump(
        &self,
        stream: &mut TcpStream,
        mut event: Event,
        session: &mut Session,
    ) -> Result<String, Error> {
        loop {
            event = match event {
                Event::WantWrite(bytes) => {
                    trace!(len = bytes.len(), "writing rndc packet");
                    stream.write_all(&bytes)?;
                    session.next(None)
                }
                Event::WantRead => {
                    let mut buf = [0u8; READ_BUF_SIZE];
                    let n = stream.read(&mut buf)?;
                    if n == 0 {
                        return Err(Error::Io("connection closed by peer".into()));
                    }
                    session.next(Some(&buf[..n]))
                }
                Event::WantFinish(text) => return Ok(text),
                Event::WantError(msg) => return Err(Error::Protocol(msg)),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    use crate::session::{CommandHandler, Session as ServerSession, SessionConfig as ServerConfig};

    /// Spin up a one-shot RNDC server on a loopback socket and issue a
    /// single command against it with the real `Client`, exercising both
    /// ends of the handshake over an actual TCP connection.
    #[test]
    fn test_client_against_in_process_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handler: CommandHandler = Box::new(|cmd| format!("handled {cmd}"));
        let server_thread = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut session = ServerSession::server(
                ServerConfig {
                    key: Some("aabc".into()),
                    command: None,
                    nonce: Some(5),
                },
                handler,
            )
            .unwrap();

            let mut event = session.start();
            loop {
                event = match event {
                    Event::WantWrite(bytes) => {
                        stream.write_all(&bytes).unwrap();
                        session.next(None)
                    }
                    Event::WantRead => {
                        let mut buf = [0u8; READ_BUF_SIZE];
                        let n = stream.read(&mut buf).unwrap();
                        session.next(Some(&buf[..n]))
                    }
                    Event::WantFinish(_) | Event::WantError(_) => break,
                };
            }
        });

        let client = Client::new(addr.ip().to_string(), "aabc").with_port(addr.port());
        let response = client.call("status").unwrap();
        assert_eq!(response, "handled status");

        server_thread.join().unwrap();
    }

    #[test]
    fn test_bad_key_surfaces_immediately() {
        let client = Client::new("127.0.0.1", "not valid base64!!");
        let err = client.call("status").unwrap_err();
        assert_eq!(err, Error::BadKey);
    }
}
