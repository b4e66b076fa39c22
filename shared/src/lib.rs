pub mod buffer;
pub mod frame;

pub use buffer::{enc_string, PayloadError, ReadCursor};
pub use frame::{decode_frame, encode_frame, encode_request_frame, has_magic, FrameError, FrameHead};

/// First two bytes of every datagram.
pub const MAGIC: [u8; 2] = [0x07, 0x02];

/// Largest datagram either side will emit.
pub const MAX_DATAGRAM_SIZE: usize = 1270;

/// Hard cap on entries in one roster broadcast, regardless of room size.
pub const MAX_ROSTER_ENTRIES: usize = 48;

/// Header length of a first/only fragment (payload starts here).
pub const HEADER_LEN: usize = 0x1A;

/// Header length of a continuation fragment (no separator/type bytes).
pub const HEADER_LEN_CONT: usize = 0x18;

/// Flags byte (offset 15): set on every fragment after the first.
pub const FLAG_CONTINUATION: u8 = 0x01;
/// Flags byte (offset 15): set on every fragment of a multi-fragment message.
pub const FLAG_MULTI: u8 = 0x10;

/// Separator written before the type byte on outbound (server -> client) frames.
pub const SEPARATOR_OUT: u8 = 0x0D;
/// Separator scanned for on inbound (client -> server) frames. The asymmetry
/// with [`SEPARATOR_OUT`] is a protocol quirk confirmed against client
/// traffic; unifying the two would break inbound parsing.
pub const SEPARATOR_IN: u8 = 0xFF;

/// Trailing bytes of the final fragment of a roster broadcast.
pub const ROSTER_TERMINATOR: [u8; 3] = [0x00, 0xFF, 0xFF];

/// Message type codes. 0x3? codes are client -> server, 0x7?/0x8? codes are
/// server -> client. Names follow what each code is observed to do; the
/// protocol has no official documentation.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    /// Client announces username + room name after connecting.
    C2sInit = 0x33,
    /// Unknown, sent occasionally by clients.
    C2sUnk1 = 0x34,
    /// Keep-alive, observed roughly once a second per client.
    C2sHeartbeat = 0x35,
    /// Unknown, carries no payload.
    C2sUnk3 = 0x37,
    /// Unknown.
    C2sUnk4 = 0x3C,

    /// Echoes the room name back after an init.
    S2cAckRoom = 0x7F,
    /// Roster broadcast, possibly fragmented.
    S2cRoster = 0x80,
    /// Alternate heartbeat ack seen in traffic captures; never emitted here
    /// (the dispatcher answers every heartbeat with [`MsgType::S2cHeartbeatAck`]).
    S2cHeartbeatAltAck = 0x85,
    /// Heartbeat ack, one zero byte of payload.
    S2cHeartbeatAck = 0x88,
}

impl MsgType {
    pub fn from_code(code: u8) -> Option<MsgType> {
        match code {
            0x33 => Some(MsgType::C2sInit),
            0x34 => Some(MsgType::C2sUnk1),
            0x35 => Some(MsgType::C2sHeartbeat),
            0x37 => Some(MsgType::C2sUnk3),
            0x3C => Some(MsgType::C2sUnk4),
            0x7F => Some(MsgType::S2cAckRoom),
            0x80 => Some(MsgType::S2cRoster),
            0x85 => Some(MsgType::S2cHeartbeatAltAck),
            0x88 => Some(MsgType::S2cHeartbeatAck),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}
