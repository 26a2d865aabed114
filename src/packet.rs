//! The well-known `_auth`/`_ctrl`/`_data` envelope that every RNDC packet on
//! the wire is built from, layered on top of the generic codec in
//! [`crate::codec`].

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::codec::{self, decode_entry, decode_table_body, encode_entry, encode_table_body, SIGNATURE_PAYLOAD_LEN};
use crate::value::{Table, Value};
use crate::Error;

/// A decoded (or not-yet-signed) RNDC packet: a protocol version and a data
/// table, minus the `_auth` wrapper which is added/stripped at the wire
/// boundary.
///
/// The `data` table always contains `_ctrl` (protocol bookkeeping: the
/// nonce, and on responses the serial/timestamp/expiry) and `_data`
/// (the command text, or the response text/error) sub-tables.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    version: u32,
    data: Table,
}

impl Packet {
    /// Build a new packet carrying the given `data` table, ensuring the
    /// `_ctrl` and `_data` sub-tables are present. When `nonce` is `Some`,
    /// it is written to `_ctrl._nonce`; the opening packet of a handshake
    /// carries no nonce at all.
    pub fn new(nonce: Option<u32>, mut data: Table) -> Result<Self, Error> {
        let ctrl = data.ensure_table_mut("_ctrl")?;
        if let Some(nonce) = nonce {
            ctrl.insert("_nonce", Value::from_int(nonce as u64));
        }
        data.ensure_table_mut("_data")?;

        Ok(Self {
            version: codec::PROTOCOL_VERSION,
            data,
        })
    }

    /// Construct a packet from an already-assembled data table, without
    /// touching `_ctrl`/`_data` - used when decoding, where the wire bytes
    /// dictate the table's shape.
    pub(crate) fn from_parts(version: u32, data: Table) -> Self {
        Self { version, data }
    }

    /// The protocol version this packet declares. Always `1` for packets
    /// this crate produces.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The full data table (everything other than `_auth`).
    pub fn data(&self) -> &Table {
        &self.data
    }

    /// A mutable reference to the full data table.
    pub fn data_mut(&mut self) -> &mut Table {
        &mut self.data
    }

    /// The `_ctrl` sub-table, if present.
    pub fn ctrl(&self) -> Option<&Table> {
        self.data.get_table("_ctrl")
    }

    /// The `_data` sub-table, if present.
    pub fn body(&self) -> Option<&Table> {
        self.data.get_table("_data")
    }

    /// The nonce carried in `_ctrl._nonce`, if present and numeric.
    pub fn nonce(&self) -> Option<u32> {
        self.ctrl()
            .and_then(|c| c.get("_nonce"))
            .and_then(Value::as_int)
            .map(|n| n as u32)
    }

    /// The response text in `_data.text`, if present.
    pub fn text(&self) -> Option<&str> {
        self.body().and_then(|d| d.get("text")).and_then(Value::as_str)
    }

    /// The error text in `_data.err`, if present.
    pub fn err(&self) -> Option<&str> {
        self.body().and_then(|d| d.get("err")).and_then(Value::as_str)
    }
}

/// Sign and serialise `packet` into its full wire representation, keyed by
/// `key` (a Base64-encoded HMAC-MD5 secret). This is the `encode` operation
/// of the packet codec.
pub fn encode(key: &str, packet: &Packet) -> Result<Vec<u8>, Error> {
    encode_raw(&codec::decode_key(key)?, packet)
}

/// Parse and verify a full wire packet keyed by `key` (a Base64-encoded
/// HMAC-MD5 secret). This is the `decode` operation of the packet codec.
pub fn decode(key: &str, raw: &[u8]) -> Result<Packet, Error> {
    decode_raw(&codec::decode_key(key)?, raw)
}

/// Sign and serialise `packet` into its full wire representation (length
/// prefix, version, `_auth` entry, and the rest of the data table), keyed
/// by the raw (already base64-decoded) `key` bytes.
pub(crate) fn encode_raw(key: &[u8], packet: &Packet) -> Result<Vec<u8>, Error> {
    let mut after_auth = Vec::new();
    encode_table_body(&packet.data, &mut after_auth)?;

    let signature = codec::sign_body(key, &after_auth);

    let mut auth_table = Table::new();
    auth_table.insert("hmd5", Value::Binary(signature.to_vec()));

    let mut body = Vec::new();
    body.write_u32::<BigEndian>(packet.version)?;
    encode_entry("_auth", &Value::Table(auth_table), &mut body)?;
    body.extend_from_slice(&after_auth);

    let mut out = Vec::with_capacity(4 + body.len());
    out.write_u32::<BigEndian>(body.len() as u32)?;
    out.extend_from_slice(&body);
    Ok(out)
}

/// Parse and verify a full wire packet (length prefix included) keyed by
/// the raw `key` bytes.
pub(crate) fn decode_raw(key: &[u8], raw: &[u8]) -> Result<Packet, Error> {
    let mut header = Cursor::new(raw);
    let length = header.read_u32::<BigEndian>().map_err(|_| Error::ShortRead {
        actual: raw.len(),
        expected: 4,
    })? as usize;

    let body = raw.get(4..4 + length).ok_or(Error::ShortRead {
        actual: raw.len().saturating_sub(4),
        expected: length,
    })?;

    let mut body_cursor = Cursor::new(body);
    let version = body_cursor.read_u32::<BigEndian>().map_err(|_| Error::ShortRead {
        actual: body.len(),
        expected: 4,
    })?;
    if version != codec::PROTOCOL_VERSION {
        return Err(Error::BadMagic(version));
    }

    let remainder = &body[4..];
    let mut entry_cursor = Cursor::new(remainder);
    let (first_key, first_value) = decode_entry(&mut entry_cursor)?;
    if first_key != "_auth" {
        return Err(Error::MissingField("_auth"));
    }

    let auth_table = first_value
        .as_table()
        .ok_or_else(|| Error::BadArgumentType("_auth must be a table".into()))?;
    let signature_bytes = auth_table
        .get("hmd5")
        .and_then(Value::as_bytes)
        .ok_or(Error::MissingField("_auth.hmd5"))?;
    let signature: [u8; SIGNATURE_PAYLOAD_LEN] = signature_bytes
        .try_into()
        .map_err(|_| Error::BadArgumentType("_auth.hmd5 has the wrong length".into()))?;

    let after_auth_start = entry_cursor.position() as usize;
    let after_auth = &remainder[after_auth_start..];

    codec::verify_body(key, after_auth, &signature)?;

    let data = decode_table_body(after_auth)?;
    Ok(Packet::from_parts(version, data))
}
