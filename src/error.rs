use thiserror::Error;

/// Error types returned by this crate.
#[non_exhaustive]
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// No key was supplied when one is required (packet construction, or
    /// a client-role session).
    #[error("missing required argument: key")]
    MissingKey,

    /// The supplied key is not valid base64.
    #[error("key is not valid base64")]
    BadKey,

    /// A client-role session was constructed without a command.
    #[error("missing required argument: command")]
    MissingCommand,

    /// An argument was supplied with the wrong shape, e.g. `data` was not a
    /// table, or `version`/`nonce` was not numeric.
    #[error("bad argument: {0}")]
    BadArgumentType(String),

    /// A table key exceeds the 255 byte limit imposed by the one-byte
    /// length prefix used on the wire.
    #[error("table key {0:?} is longer than 255 bytes")]
    KeyTooLong(String),

    /// A table contained the same key twice.
    #[error("duplicate table key: {0}")]
    DuplicateKey(String),

    /// Attempted to encode a [`Value`](crate::Value) variant the wire format
    /// has no representation for, or encountered an unrecognised type byte
    /// while decoding.
    #[error("Unknown data type: {0}")]
    UnknownDataType(String),

    /// The buffer ended before a complete entry, table, or packet could be
    /// read.
    #[error("short read (got {actual} bytes, needed at least {expected})")]
    ShortRead {
        /// The number of bytes actually available.
        actual: usize,
        /// The number of bytes required to proceed.
        expected: usize,
    },

    /// The packet's version field was not `1`. This crate implements RNDC
    /// protocol version 1 only.
    #[error("bad magic: unsupported protocol version {0}")]
    BadMagic(u32),

    /// The computed HMAC-MD5 digest did not match the digest embedded in the
    /// packet.
    #[error("bad signature")]
    BadSignature,

    /// A required field was absent from a decoded packet (e.g. the first
    /// table entry was not `_auth`, or a response carried neither `text` nor
    /// `err`).
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// The nonce echoed back by the peer did not match the one issued for
    /// this session.
    #[error("nonce mismatch")]
    NonceMismatch,

    /// An I/O error occurred while the synchronous client pumped bytes over
    /// the network.
    #[error("i/o error: {0}")]
    Io(String),

    /// A [`Session`](crate::Session) reached `Failed` and emitted
    /// `want_error`; the message is the session's own description of the
    /// failure (itself derived from one of this enum's other variants).
    #[error("rndc session failed: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for Error {
    fn from(v: std::io::Error) -> Self {
        Self::Io(v.to_string())
    }
}
