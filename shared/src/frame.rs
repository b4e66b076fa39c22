//! Datagram frame codec.
//!
//! Frame layout (all integers little-endian):
//! ```text
//! +--------+-----------+------+-------+-------+-----------+------+---------+
//! | magic  | account   | unk1 | seq   | flags | separator | type | payload |
//! | 0..2   | 2..10 i64 | 10   | 11..13| 15    | 24        | 25   | 26..    |
//! +--------+-----------+------+-------+-------+-----------+------+---------+
//! ```
//! Continuation fragments of a multi-fragment message omit the separator and
//! type bytes; their payload starts at offset 24.
//!
//! Outbound frames write separator `0x0D`; inbound parsing scans forward from
//! offset 12 for the first `0xFF` and reads the type from the byte after it.
//! Both behaviors are confirmed against real client traffic and must not be
//! unified.

use crate::{
    FLAG_CONTINUATION, FLAG_MULTI, HEADER_LEN, HEADER_LEN_CONT, MAGIC, SEPARATOR_IN, SEPARATOR_OUT,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("datagram too short ({0} bytes)")]
    Truncated(usize),
    #[error("bad magic")]
    BadMagic,
    #[error("no message type marker in header")]
    MissingTypeMarker,
}

/// Fixed header fields of a decoded inbound frame. The payload is
/// `buf[payload_offset..]`; length validation is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHead {
    pub account_id: i64,
    pub unk1: u8,
    pub seq: u16,
    pub multi_fragment: bool,
    pub continuation: bool,
    pub msg_type: u8,
    pub payload_offset: usize,
}

pub fn has_magic(buf: &[u8]) -> bool {
    buf.len() >= 2 && buf[0..2] == MAGIC
}

/// Encodes a server -> client frame. Payloads must already fit the datagram
/// budget; oversized messages are chunked by the caller before encoding.
pub fn encode_frame(
    msg_type: u8,
    account_id: i64,
    payload: &[u8],
    unk1: u8,
    seq: u16,
    multi_fragment: bool,
    continuation: bool,
) -> Vec<u8> {
    let header_len = if continuation { HEADER_LEN_CONT } else { HEADER_LEN };
    let mut buf = vec![0u8; header_len + payload.len()];

    buf[0..2].copy_from_slice(&MAGIC);
    buf[2..10].copy_from_slice(&account_id.to_le_bytes());
    buf[10] = unk1;
    buf[11..13].copy_from_slice(&seq.to_le_bytes());
    buf[15] = continuation as u8 | (FLAG_MULTI * multi_fragment as u8);

    if !continuation {
        buf[24] = SEPARATOR_OUT;
        buf[25] = msg_type;
    }

    buf[header_len..].copy_from_slice(payload);
    buf
}

/// Encodes a client -> server frame: same fixed fields, but the type marker
/// is the inbound separator so the server's header scan finds it.
pub fn encode_request_frame(
    msg_type: u8,
    account_id: i64,
    payload: &[u8],
    unk1: u8,
    seq: u16,
) -> Vec<u8> {
    let mut buf = encode_frame(msg_type, account_id, payload, unk1, seq, false, false);
    buf[24] = SEPARATOR_IN;
    buf
}

/// Decodes the fixed header fields of an inbound frame.
pub fn decode_frame(buf: &[u8]) -> Result<FrameHead, FrameError> {
    if !has_magic(buf) {
        if buf.len() < 2 {
            return Err(FrameError::Truncated(buf.len()));
        }
        return Err(FrameError::BadMagic);
    }
    if buf.len() < 16 {
        return Err(FrameError::Truncated(buf.len()));
    }

    let mut id_bytes = [0u8; 8];
    id_bytes.copy_from_slice(&buf[2..10]);
    let account_id = i64::from_le_bytes(id_bytes);
    let unk1 = buf[10];
    let seq = u16::from_le_bytes([buf[11], buf[12]]);
    let flags = buf[15];

    // First 0xFF past the sequence field marks the type byte.
    let marker = buf[12..]
        .iter()
        .position(|&b| b == SEPARATOR_IN)
        .map(|i| i + 12)
        .ok_or(FrameError::MissingTypeMarker)?;
    if marker + 1 >= buf.len() {
        return Err(FrameError::MissingTypeMarker);
    }

    Ok(FrameHead {
        account_id,
        unk1,
        seq,
        multi_fragment: flags & FLAG_MULTI != 0,
        continuation: flags & FLAG_CONTINUATION != 0,
        msg_type: buf[marker + 1],
        payload_offset: marker + 2,
    })
}
