//! Minimal CAR framing.
//!
//! An archive is a varint-prefixed header followed by frames of
//! `uvarint(|cid| + |payload|) ∥ cid ∥ payload`. The header is DAG-CBOR
//! `{roots: [tag42(identity ∥ cid)], version: 1}`. Only the pieces the
//! reconstructor needs are implemented here; full CAR reading stays an
//! external concern.

use carproof_core::{Error, Result};
use ciborium::value::Value;
use cid::Cid;

/// Encode `x` as an unsigned LEB128 varint.
#[must_use]
pub fn uvarint(mut x: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(uvarint_len(x));
    loop {
        let byte = (x & 0x7F) as u8;
        x >>= 7;
        if x == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

/// Encoded length of `uvarint(x)` in bytes.
#[must_use]
pub fn uvarint_len(x: u64) -> usize {
    if x == 0 {
        return 1;
    }
    (64 - x.leading_zeros() as usize).div_ceil(7)
}

/// Frame one block for the archive stream.
#[must_use]
pub fn frame_block(cid: &Cid, payload: &[u8]) -> Vec<u8> {
    let cid_bytes = cid.to_bytes();
    let body_len = (cid_bytes.len() + payload.len()) as u64;
    let mut out = Vec::with_capacity(uvarint_len(body_len) + body_len as usize);
    out.extend_from_slice(&uvarint(body_len));
    out.extend_from_slice(&cid_bytes);
    out.extend_from_slice(payload);
    out
}

/// Framed length of a block: varint header + cid + payload.
#[must_use]
pub fn framed_len(cid: &Cid, payload_len: u64) -> u64 {
    let body_len = cid.to_bytes().len() as u64 + payload_len;
    uvarint_len(body_len) as u64 + body_len
}

/// The varint-prefixed DAG-CBOR archive header for `data_root`.
pub fn header_bytes(data_root: &Cid) -> Result<Vec<u8>> {
    // CBOR tag 42 carries the identity multibase prefix before the cid.
    let mut tagged = Vec::with_capacity(data_root.encoded_len() + 1);
    tagged.push(0x00);
    tagged.extend_from_slice(&data_root.to_bytes());

    let header = Value::Map(vec![
        (
            Value::Text("roots".into()),
            Value::Array(vec![Value::Tag(42, Box::new(Value::Bytes(tagged)))]),
        ),
        (Value::Text("version".into()), Value::Integer(1u8.into())),
    ]);

    let mut body = Vec::new();
    ciborium::ser::into_writer(&header, &mut body).map_err(Error::codec)?;

    let mut out = Vec::with_capacity(uvarint_len(body.len() as u64) + body.len());
    out.extend_from_slice(&uvarint(body.len() as u64));
    out.extend_from_slice(&body);
    Ok(out)
}

/// Byte length of [`header_bytes`] without materializing it.
pub fn header_len(data_root: &Cid) -> Result<u64> {
    Ok(header_bytes(data_root)?.len() as u64)
}
