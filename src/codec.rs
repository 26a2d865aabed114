//! The RNDC wire format: a length-prefixed, recursively typed "table of
//! named values".
//!
//! ```text
//! packet      := length:u32_be body:byte[length]
//! body        := version:u32_be table_body
//! table_body  := entry*                      (until end of enclosing scope)
//! entry       := klen:u8 key:byte[klen] value
//! value       := type:u8 vlen:u32_be payload:byte[vlen]
//! type 1      := Binary string      (payload is raw bytes)
//! type 2      := Table              (payload is table_body)
//! type 3      := List               (payload is value*; decode-only)
//! ```
//!
//! All multi-byte integers are big-endian. This module only knows how to
//! turn a [`Table`] into bytes and back, plus compute/verify the HMAC-MD5
//! signature slot; [`crate::Packet`] builds the well-known `_auth`/`_ctrl`/
//! `_data` structure on top of it.

use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use hmac::{Hmac, Mac};
use md5::Md5;
use subtle::ConstantTimeEq;

use crate::value::{Table, Value};
use crate::Error;

pub(crate) const PROTOCOL_VERSION: u32 = 1;

const TYPE_BINARY: u8 = 1;
const TYPE_TABLE: u8 = 2;
const TYPE_LIST: u8 = 3;

const SIG_ALGO_TAG: u8 = b'A';
const SIG_DIGEST_B64_LEN: usize = 22;
const SIG_PAD_LEN: usize = 65;
/// Total length of the `_auth.hmd5` payload: a one-byte algorithm tag, the
/// base64-encoded MD5 digest, and zero padding out to a fixed size.
pub(crate) const SIGNATURE_PAYLOAD_LEN: usize = 1 + SIG_DIGEST_B64_LEN + SIG_PAD_LEN;

type HmacMd5 = Hmac<Md5>;

/// Decode a base64-encoded key, accepting both padded and unpadded input
/// since BIND's `rndc-confgen` and hand-written `rndc.conf` secrets are seen
/// in both forms in the wild.
pub(crate) fn decode_key(key: &str) -> Result<Vec<u8>, Error> {
    general_purpose::STANDARD
        .decode(key)
        .or_else(|_| general_purpose::STANDARD_NO_PAD.decode(key))
        .map_err(|_| Error::BadKey)
}

/// Compute the HMAC-MD5 digest of `data` under `key` and return it as the
/// fixed-size, zero-padded signature payload described in the module
/// documentation.
fn sign(key: &[u8], data: &[u8]) -> [u8; SIGNATURE_PAYLOAD_LEN] {
    let mut mac = <HmacMd5 as Mac>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    let digest = mac.finalize().into_bytes();

    let encoded = general_purpose::STANDARD_NO_PAD.encode(digest);
    debug_assert_eq!(encoded.len(), SIG_DIGEST_B64_LEN);

    let mut payload = [0u8; SIGNATURE_PAYLOAD_LEN];
    payload[0] = SIG_ALGO_TAG;
    payload[1..1 + SIG_DIGEST_B64_LEN].copy_from_slice(encoded.as_bytes());
    payload
}

/// Verify that `sig_payload` (the bytes that were in the signature slot) is
/// the correct signature of `data` under `key`, in constant time.
fn verify(key: &[u8], data: &[u8], sig_payload: &[u8; SIGNATURE_PAYLOAD_LEN]) -> Result<(), Error> {
    let expected = sign(key, data);
    if expected.ct_eq(sig_payload).into() {
        Ok(())
    } else {
        Err(Error::BadSignature)
    }
}

/// Serialise a single `key => value` table entry into `buf`.
pub(crate) fn encode_entry(key: &str, value: &Value, buf: &mut Vec<u8>) -> Result<(), Error> {
    let key_bytes = key.as_bytes();
    if key_bytes.len() > crate::value::MAX_KEY_LEN {
        return Err(Error::KeyTooLong(key.to_owned()));
    }

    buf.push(key_bytes.len() as u8);
    buf.extend_from_slice(key_bytes);
    encode_value(value, buf)
}

/// Serialise a single value (its type tag, length prefix, and payload) into
/// `buf`.
pub(crate) fn encode_value(value: &Value, buf: &mut Vec<u8>) -> Result<(), Error> {
    match value {
        Value::Binary(data) => {
            buf.push(TYPE_BINARY);
            buf.write_u32::<BigEndian>(data.len() as u32)?;
            buf.extend_from_slice(data);
        }
        Value::Table(table) => {
            let mut inner = Vec::new();
            encode_table_body(table, &mut inner)?;
            buf.push(TYPE_TABLE);
            buf.write_u32::<BigEndian>(inner.len() as u32)?;
            buf.extend_from_slice(&inner);
        }
        // Lists only ever arise from decoding; see Value::List's docs. The
        // encoder has no wire representation it is willing to emit for one.
        Value::List(_) => return Err(Error::UnknownDataType(value.variant_name().to_owned())),
    }

    Ok(())
}

/// Serialise every entry of `table`, in iteration order, into `buf`.
pub(crate) fn encode_table_body(table: &Table, buf: &mut Vec<u8>) -> Result<(), Error> {
    for (key, value) in table.iter() {
        encode_entry(key, value, buf)?;
    }
    Ok(())
}

/// Parse entries from `data` until it is fully consumed, erroring if any
/// entry is malformed, too short, or a duplicate key is seen.
pub(crate) fn decode_table_body(data: &[u8]) -> Result<Table, Error> {
    let mut cursor = Cursor::new(data);
    let mut table = Table::new();

    while (cursor.position() as usize) < data.len() {
        let (key, value) = decode_entry(&mut cursor)?;
        table.insert_unique(key, value)?;
    }

    Ok(table)
}

/// Parse a sequence of unkeyed values (a `type 3` list payload) until `data`
/// is fully consumed.
fn decode_list_body(data: &[u8]) -> Result<Vec<Value>, Error> {
    let mut cursor = Cursor::new(data);
    let mut items = Vec::new();

    while (cursor.position() as usize) < data.len() {
        items.push(decode_value(&mut cursor)?);
    }

    Ok(items)
}

/// Parse one `klen key value` entry, advancing `cursor` past it.
pub(crate) fn decode_entry(cursor: &mut Cursor<&[u8]>) -> Result<(String, Value), Error> {
    let key = decode_key_bytes(cursor)?;
    let value = decode_value(cursor)?;
    Ok((key, value))
}

/// Parse the `klen:u8 key:byte[klen]` prefix of an entry and return the key
/// as a `String`. RNDC keys are ASCII, but invalid UTF-8 is reported as a
/// short/malformed read rather than panicking.
fn decode_key_bytes(cursor: &mut Cursor<&[u8]>) -> Result<String, Error> {
    let remaining = remaining_len(cursor);
    let klen = cursor.read_u8().map_err(|_| Error::ShortRead {
        actual: remaining,
        expected: 1,
    })? as usize;

    let bytes = read_slice(cursor, klen)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| Error::BadArgumentType("table key is not valid UTF-8".into()))
}

/// Parse a `type:u8 vlen:u32_be payload:byte[vlen]` value, advancing `cursor`
/// past it.
fn decode_value(cursor: &mut Cursor<&[u8]>) -> Result<Value, Error> {
    let remaining = remaining_len(cursor);
    let type_byte = cursor.read_u8().map_err(|_| Error::ShortRead {
        actual: remaining,
        expected: 1,
    })?;

    let vlen = cursor.read_u32::<BigEndian>().map_err(|_| Error::ShortRead {
        actual: remaining_len(cursor),
        expected: 4,
    })? as usize;

    let payload = read_slice(cursor, vlen)?;

    match type_byte {
        TYPE_BINARY => Ok(Value::Binary(payload.to_vec())),
        TYPE_TABLE => Ok(Value::Table(decode_table_body(payload)?)),
        TYPE_LIST => Ok(Value::List(decode_list_body(payload)?)),
        other => Err(Error::UnknownDataType(format!("wire type byte {other}"))),
    }
}

/// Read exactly `len` bytes from `cursor`, or fail with [`Error::ShortRead`].
fn read_slice<'a>(cursor: &mut Cursor<&'a [u8]>, len: usize) -> Result<&'a [u8], Error> {
    let data = *cursor.get_ref();
    let start = cursor.position() as usize;
    let end = start.checked_add(len).ok_or(Error::ShortRead {
        actual: data.len().saturating_sub(start),
        expected: len,
    })?;

    if end > data.len() {
        return Err(Error::ShortRead {
            actual: data.len() - start,
            expected: len,
        });
    }

    cursor.set_position(end as u64);
    Ok(&data[start..end])
}

fn remaining_len(cursor: &Cursor<&[u8]>) -> usize {
    let data = *cursor.get_ref();
    data.len().saturating_sub(cursor.position() as usize)
}

/// Sign `after_auth` (everything in the packet body following the `_auth`
/// entry) under `key`, returning the 88-byte signature slot payload.
pub(crate) fn sign_body(key: &[u8], after_auth: &[u8]) -> [u8; SIGNATURE_PAYLOAD_LEN] {
    sign(key, after_auth)
}

/// Verify `after_auth` against the signature payload extracted from the
/// `_auth.hmd5` entry of a decoded packet.
pub(crate) fn verify_body(
    key: &[u8],
    after_auth: &[u8],
    sig_payload: &[u8; SIGNATURE_PAYLOAD_LEN],
) -> Result<(), Error> {
    verify(key, after_auth, sig_payload)
}
