//! Serializes a room's member list into roster frames.
//!
//! Each entry on the wire:
//! ```text
//! u16  entry index
//! str  account id, decimal, length-prefixed
//! u8   0x02 marker
//! str  display name, length-prefixed
//! u8   rank (0 owner, 1 admin, 2 member)
//! u16  1 (reserved)
//! u16  0 (reserved)
//! ```
//! The requesting account is listed first, everyone else alphabetically by
//! name, capped at the broadcast limit. Entries that do not fit one datagram
//! are split across a multi-fragment message; every fragment starts with a
//! 5-byte reserved prefix and only the last carries the terminator. All
//! fragments of one broadcast share one sequence number.

use crate::rooms::{Room, RoomMember};
use shared::buffer::put_u16;
use shared::{
    enc_string, encode_frame, MsgType, HEADER_LEN, HEADER_LEN_CONT, ROSTER_TERMINATOR,
};
use std::cmp::Ordering;

const RESERVED_PREFIX: [u8; 5] = [0; 5];

fn encode_entry(index: u16, member: &RoomMember) -> Vec<u8> {
    let id_string = member.id.to_string();
    let mut buf = Vec::with_capacity(2 + 3 + id_string.len() + 1 + 3 + member.name.len() + 5);
    put_u16(&mut buf, index);
    buf.extend_from_slice(&enc_string(&id_string));
    buf.push(0x02);
    buf.extend_from_slice(&enc_string(&member.name));
    buf.push(member.rank.wire_code());
    put_u16(&mut buf, 1);
    put_u16(&mut buf, 0);
    buf
}

/// Builds the datagrams of one roster broadcast for `requester_id`. Fragments
/// are returned in send order.
pub fn build_roster_frames(
    room: &Room,
    requester_id: i64,
    seq: u16,
    max_datagram: usize,
    max_entries: usize,
) -> Vec<Vec<u8>> {
    let mut members: Vec<&RoomMember> = room.members.values().collect();
    members.sort_by(|a, b| {
        if a.id == requester_id {
            Ordering::Less
        } else if b.id == requester_id {
            Ordering::Greater
        } else {
            a.name.cmp(&b.name)
        }
    });

    let mut combined = Vec::new();
    for (index, member) in members.iter().take(max_entries).enumerate() {
        combined.extend_from_slice(&encode_entry(index as u16, member));
    }

    let roster_code = MsgType::S2cRoster.code();

    if combined.len() < max_datagram - HEADER_LEN - ROSTER_TERMINATOR.len() {
        let mut payload = Vec::with_capacity(RESERVED_PREFIX.len() + combined.len() + 3);
        payload.extend_from_slice(&RESERVED_PREFIX);
        payload.extend_from_slice(&combined);
        payload.extend_from_slice(&ROSTER_TERMINATOR);
        return vec![encode_frame(roster_code, requester_id, &payload, 1, seq, false, false)];
    }

    let mut frames = Vec::new();
    let mut idx = 0;
    let mut first = true;
    while idx < combined.len() {
        let budget = max_datagram - if first { HEADER_LEN } else { HEADER_LEN_CONT };
        let end = (idx + budget).min(combined.len());

        let mut payload = Vec::with_capacity(RESERVED_PREFIX.len() + (end - idx) + 3);
        payload.extend_from_slice(&RESERVED_PREFIX);
        payload.extend_from_slice(&combined[idx..end]);
        if end == combined.len() {
            payload.extend_from_slice(&ROSTER_TERMINATOR);
        }

        frames.push(encode_frame(roster_code, requester_id, &payload, 1, seq, true, !first));
        idx = end;
        first = false;
    }
    frames
}
