//! Inbound message handling.
//!
//! The dispatcher itself is stateless; everything it knows lives in the
//! session registry and the room directory, so each datagram is handled on
//! its own task and may suspend on a directory lookup without holding any
//! lock. Every frame runs the same gauntlet: magic check, rate limit,
//! header decode, then dispatch by type. Frames that fail any step are
//! dropped without a response.

use crate::config::ServerConfig;
use crate::directory::{AccountDirectory, MembershipDirectory};
use crate::rates::RateLimiter;
use crate::rooms::RoomDirectory;
use crate::roster::build_roster_frames;
use crate::session::SessionRegistry;
use log::{debug, warn};
use shared::{
    decode_frame, enc_string, encode_frame, has_magic, MsgType, PayloadError, ReadCursor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// A datagram queued for the socket sender task.
#[derive(Debug)]
pub struct Outgoing {
    pub bytes: Vec<u8>,
    pub addr: SocketAddr,
}

/// Routes decoded frames to their handlers and drives the registries.
pub struct Dispatcher<A, M> {
    accounts: A,
    memberships: M,
    sessions: Arc<RwLock<SessionRegistry>>,
    rooms: Arc<RwLock<RoomDirectory>>,
    rates: Arc<RwLock<RateLimiter>>,
    out_tx: mpsc::UnboundedSender<Outgoing>,
    max_datagram_size: usize,
    max_roster_entries: usize,
}

impl<A, M> Dispatcher<A, M>
where
    A: AccountDirectory,
    M: MembershipDirectory,
{
    pub fn new(
        config: &ServerConfig,
        accounts: A,
        memberships: M,
        sessions: Arc<RwLock<SessionRegistry>>,
        rooms: Arc<RwLock<RoomDirectory>>,
        rates: Arc<RwLock<RateLimiter>>,
        out_tx: mpsc::UnboundedSender<Outgoing>,
    ) -> Self {
        Self {
            accounts,
            memberships,
            sessions,
            rooms,
            rates,
            out_tx,
            max_datagram_size: config.max_datagram_size,
            max_roster_entries: config.max_roster_entries,
        }
    }

    /// Entry point for one inbound datagram.
    pub async fn handle_datagram(&self, buf: &[u8], addr: SocketAddr) {
        if !has_magic(buf) {
            return;
        }
        if !self.rates.write().await.allow(addr) {
            return;
        }

        let head = match decode_frame(buf) {
            Ok(head) => head,
            Err(e) => {
                debug!("dropping frame from {}: {}", addr, e);
                return;
            }
        };

        debug!(
            "frame from {} (account {}): unk1 {:#04x}, seq {}, multi {}, type {:#04x}",
            addr, head.account_id, head.unk1, head.seq, head.multi_fragment, head.msg_type
        );

        let payload = &buf[head.payload_offset..];
        match MsgType::from_code(head.msg_type) {
            Some(MsgType::C2sInit) => {
                self.handle_init(head.account_id, head.seq, payload, addr).await;
            }
            Some(MsgType::C2sHeartbeat) => {
                self.handle_heartbeat(head.account_id, head.seq, addr).await;
            }
            // Recognized but not understood; accepted for compatibility.
            Some(MsgType::C2sUnk1) | Some(MsgType::C2sUnk3) | Some(MsgType::C2sUnk4) => {}
            Some(other) => {
                debug!("ignoring server-bound frame of outbound type {:?}", other);
            }
            None => {
                debug!("unknown message type {:#04x} from {}", head.msg_type, addr);
            }
        }
    }

    /// Init: client announces its username and desired room. The room name is
    /// echoed back no matter what; joining and session linking happen only if
    /// the announced identity matches the account store.
    async fn handle_init(&self, account_id: i64, _seq: u16, payload: &[u8], addr: SocketAddr) {
        let (username, room_name) = match parse_init_payload(payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("malformed init payload from {}: {}", addr, e);
                return;
            }
        };

        let ack_seq = self.sessions.write().await.next_sequence(addr);
        self.send(
            encode_frame(
                MsgType::S2cAckRoom.code(),
                account_id,
                &enc_string(&room_name),
                1,
                ack_seq,
                false,
                false,
            ),
            addr,
        );

        let Some(account) = self.accounts.account_by_id(account_id).await else {
            debug!("init from unknown account {}", account_id);
            return;
        };
        if account.name != username {
            warn!(
                "init identity mismatch for account {}: announced {:?}",
                account_id, username
            );
            return;
        }

        let community_id = self.rooms.read().await.room(&room_name).map(|r| r.community_id);
        if let Some(community_id) = community_id {
            if let Some(membership) = self.memberships.membership(account.id, community_id).await {
                self.rooms
                    .write()
                    .await
                    .join(account.id, &account.name, &room_name, membership.rank);
            }
        }

        self.sessions.write().await.link(addr, account.id);
        self.broadcast_roster(account.id, addr).await;
    }

    /// Heartbeat: always acked; presence refresh and the periodic roster
    /// resync happen only for an endpoint whose session matches the frame's
    /// account id.
    async fn handle_heartbeat(&self, account_id: i64, seq: u16, addr: SocketAddr) {
        let ack_seq = self.sessions.write().await.next_sequence(addr);
        self.send(
            encode_frame(
                MsgType::S2cHeartbeatAck.code(),
                account_id,
                &[0u8],
                1,
                ack_seq,
                false,
                false,
            ),
            addr,
        );

        let resolved = self.sessions.read().await.resolve_account(addr);
        let Some(linked_id) = resolved else {
            debug!("heartbeat from unlinked endpoint {}", addr);
            return;
        };
        if linked_id != account_id {
            debug!(
                "heartbeat account mismatch from {}: frame says {}, session says {}",
                addr, account_id, linked_id
            );
            return;
        }
        let Some(account) = self.accounts.account_by_id(linked_id).await else {
            return;
        };

        self.rooms.write().await.ping(account.id, &account.name);

        // Heartbeats arrive about once a second; every third one doubles as a
        // roster resync so clients converge without join/leave events.
        if seq % 3 == 0 {
            self.broadcast_roster(account.id, addr).await;
        }
    }

    async fn broadcast_roster(&self, account_id: i64, addr: SocketAddr) {
        let seq = self.sessions.write().await.next_sequence(addr);

        let frames = {
            let rooms = self.rooms.read().await;
            let Some(key) = rooms.room_key_of(account_id) else {
                return;
            };
            let Some(room) = rooms.room(&key) else {
                return;
            };
            build_roster_frames(
                room,
                account_id,
                seq,
                self.max_datagram_size,
                self.max_roster_entries,
            )
        };

        for frame in frames {
            self.send(frame, addr);
        }
    }

    fn send(&self, bytes: Vec<u8>, addr: SocketAddr) {
        if self.out_tx.send(Outgoing { bytes, addr }).is_err() {
            warn!("outgoing queue closed, dropping datagram for {}", addr);
        }
    }
}

/// Init payload: two unknown bytes, then username and room name as
/// length-prefixed strings.
fn parse_init_payload(payload: &[u8]) -> Result<(String, String), PayloadError> {
    let mut cur = ReadCursor::new(payload);
    cur.skip(2)?;
    let username = cur.read_string()?;
    let room_name = cur.read_string()?;
    Ok((username, room_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{MemoryDirectory, MembershipRank};
    use shared::{encode_request_frame, FrameHead, HEADER_LEN};
    use std::time::Duration;

    struct Harness {
        dispatcher: Dispatcher<MemoryDirectory, MemoryDirectory>,
        directory: MemoryDirectory,
        rooms: Arc<RwLock<RoomDirectory>>,
        sessions: Arc<RwLock<SessionRegistry>>,
        out_rx: mpsc::UnboundedReceiver<Outgoing>,
    }

    fn harness() -> Harness {
        let config = ServerConfig::default();
        let directory = MemoryDirectory::new();
        let sessions = Arc::new(RwLock::new(SessionRegistry::new()));
        let rooms = Arc::new(RwLock::new(RoomDirectory::new(
            config.member_timeout,
            config.ghost_timeout,
        )));
        let rates = Arc::new(RwLock::new(RateLimiter::new(
            config.rate_capacity,
            config.rate_window,
        )));
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(
            &config,
            directory.clone(),
            directory.clone(),
            Arc::clone(&sessions),
            Arc::clone(&rooms),
            rates,
            out_tx,
        );
        Harness {
            dispatcher,
            directory,
            rooms,
            sessions,
            out_rx,
        }
    }

    fn endpoint(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    fn init_payload(username: &str, room: &str) -> Vec<u8> {
        let mut payload = vec![0u8, 0u8];
        payload.extend_from_slice(&enc_string(username));
        payload.extend_from_slice(&enc_string(room));
        payload
    }

    fn decode_outgoing(out: &Outgoing) -> FrameHead {
        // Outbound frames carry the 0x0D separator; decode scans for 0xFF,
        // so read the fixed offsets directly.
        FrameHead {
            account_id: i64::from_le_bytes(out.bytes[2..10].try_into().unwrap()),
            unk1: out.bytes[10],
            seq: u16::from_le_bytes([out.bytes[11], out.bytes[12]]),
            multi_fragment: out.bytes[15] & shared::FLAG_MULTI != 0,
            continuation: out.bytes[15] & shared::FLAG_CONTINUATION != 0,
            msg_type: out.bytes[25],
            payload_offset: HEADER_LEN,
        }
    }

    async fn seed_room(h: &Harness, community_id: i64) -> String {
        h.rooms.write().await.room_for_community(community_id)
    }

    #[tokio::test]
    async fn init_happy_path_links_and_joins() {
        let mut h = harness();
        h.directory.insert_account(42, "Rook").await;
        h.directory.insert_membership(42, 1, MembershipRank::Member).await;
        let room_key = seed_room(&h, 1).await;

        let frame = encode_request_frame(
            MsgType::C2sInit.code(),
            42,
            &init_payload("Rook", &room_key),
            1,
            1,
        );
        h.dispatcher.handle_datagram(&frame, endpoint(5000)).await;

        // Room ack echoes the room name.
        let ack = h.out_rx.try_recv().unwrap();
        let head = decode_outgoing(&ack);
        assert_eq!(head.msg_type, MsgType::S2cAckRoom.code());
        assert_eq!(head.account_id, 42);
        assert_eq!(head.unk1, 1);
        let mut cur = ReadCursor::new(&ack.bytes[HEADER_LEN..]);
        assert_eq!(cur.read_string().unwrap(), room_key);

        // Roster follows, listing the joiner.
        let roster = h.out_rx.try_recv().unwrap();
        assert_eq!(decode_outgoing(&roster).msg_type, MsgType::S2cRoster.code());

        assert_eq!(h.sessions.read().await.resolve_account(endpoint(5000)), Some(42));
        assert_eq!(h.rooms.read().await.population(&room_key), 1);
    }

    #[tokio::test]
    async fn init_unknown_account_acks_without_linking() {
        let mut h = harness();
        let room_key = seed_room(&h, 1).await;

        let frame = encode_request_frame(
            MsgType::C2sInit.code(),
            42,
            &init_payload("Rook", &room_key),
            1,
            1,
        );
        h.dispatcher.handle_datagram(&frame, endpoint(5000)).await;

        let ack = h.out_rx.try_recv().unwrap();
        assert_eq!(decode_outgoing(&ack).msg_type, MsgType::S2cAckRoom.code());
        assert!(h.out_rx.try_recv().is_err());
        assert_eq!(h.sessions.read().await.resolve_account(endpoint(5000)), None);
        assert_eq!(h.rooms.read().await.population(&room_key), 0);
    }

    #[tokio::test]
    async fn init_name_mismatch_acks_without_linking() {
        let mut h = harness();
        h.directory.insert_account(42, "Rook").await;
        let room_key = seed_room(&h, 1).await;

        let frame = encode_request_frame(
            MsgType::C2sInit.code(),
            42,
            &init_payload("Imposter", &room_key),
            1,
            1,
        );
        h.dispatcher.handle_datagram(&frame, endpoint(5000)).await;

        assert_eq!(
            decode_outgoing(&h.out_rx.try_recv().unwrap()).msg_type,
            MsgType::S2cAckRoom.code()
        );
        assert!(h.out_rx.try_recv().is_err());
        assert_eq!(h.sessions.read().await.resolve_account(endpoint(5000)), None);
    }

    #[tokio::test]
    async fn init_without_membership_links_but_skips_join() {
        let mut h = harness();
        h.directory.insert_account(42, "Rook").await;
        let room_key = seed_room(&h, 1).await;

        let frame = encode_request_frame(
            MsgType::C2sInit.code(),
            42,
            &init_payload("Rook", &room_key),
            1,
            1,
        );
        h.dispatcher.handle_datagram(&frame, endpoint(5000)).await;

        let _ack = h.out_rx.try_recv().unwrap();
        // Linked, but not a member and no roster (no room occupied).
        assert_eq!(h.sessions.read().await.resolve_account(endpoint(5000)), Some(42));
        assert_eq!(h.rooms.read().await.population(&room_key), 0);
        assert!(h.out_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn init_unknown_room_still_links() {
        let mut h = harness();
        h.directory.insert_account(42, "Rook").await;

        let frame = encode_request_frame(
            MsgType::C2sInit.code(),
            42,
            &init_payload("Rook", "c_9_nowhere"),
            1,
            1,
        );
        h.dispatcher.handle_datagram(&frame, endpoint(5000)).await;

        let _ack = h.out_rx.try_recv().unwrap();
        assert_eq!(h.sessions.read().await.resolve_account(endpoint(5000)), Some(42));
    }

    #[tokio::test]
    async fn heartbeat_always_acked() {
        let mut h = harness();

        let frame = encode_request_frame(MsgType::C2sHeartbeat.code(), 42, &[], 1, 7);
        h.dispatcher.handle_datagram(&frame, endpoint(5000)).await;

        let ack = h.out_rx.try_recv().unwrap();
        let head = decode_outgoing(&ack);
        assert_eq!(head.msg_type, MsgType::S2cHeartbeatAck.code());
        assert_eq!(head.account_id, 42);
        // One zero byte of payload.
        assert_eq!(&ack.bytes[HEADER_LEN..], &[0u8]);
    }

    #[tokio::test]
    async fn heartbeat_refreshes_presence_and_resyncs_roster() {
        let mut h = harness();
        h.directory.insert_account(42, "Rook").await;
        h.directory.insert_membership(42, 1, MembershipRank::Member).await;
        let room_key = seed_room(&h, 1).await;
        h.rooms
            .write()
            .await
            .join(42, "Rook", &room_key, MembershipRank::Member);
        h.sessions.write().await.link(endpoint(5000), 42);

        // seq 3: divisible by three, so ack + roster.
        let frame = encode_request_frame(MsgType::C2sHeartbeat.code(), 42, &[], 3, 3);
        h.dispatcher.handle_datagram(&frame, endpoint(5000)).await;

        assert_eq!(
            decode_outgoing(&h.out_rx.try_recv().unwrap()).msg_type,
            MsgType::S2cHeartbeatAck.code()
        );
        assert_eq!(
            decode_outgoing(&h.out_rx.try_recv().unwrap()).msg_type,
            MsgType::S2cRoster.code()
        );

        // seq 4: ack only.
        let frame = encode_request_frame(MsgType::C2sHeartbeat.code(), 42, &[], 3, 4);
        h.dispatcher.handle_datagram(&frame, endpoint(5000)).await;
        assert_eq!(
            decode_outgoing(&h.out_rx.try_recv().unwrap()).msg_type,
            MsgType::S2cHeartbeatAck.code()
        );
        assert!(h.out_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn heartbeat_account_mismatch_skips_presence() {
        let mut h = harness();
        h.directory.insert_account(42, "Rook").await;
        let room_key = seed_room(&h, 1).await;
        h.rooms
            .write()
            .await
            .join(42, "Rook", &room_key, MembershipRank::Member);
        h.sessions.write().await.link(endpoint(5000), 42);

        // Frame claims account 43 from 42's endpoint: acked, nothing else.
        let frame = encode_request_frame(MsgType::C2sHeartbeat.code(), 43, &[], 3, 3);
        h.dispatcher.handle_datagram(&frame, endpoint(5000)).await;

        assert_eq!(
            decode_outgoing(&h.out_rx.try_recv().unwrap()).msg_type,
            MsgType::S2cHeartbeatAck.code()
        );
        assert!(h.out_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn foreign_and_malformed_frames_dropped_silently() {
        let mut h = harness();

        // Wrong magic.
        h.dispatcher.handle_datagram(&[0xDE, 0xAD, 0xBE, 0xEF], endpoint(5000)).await;
        // Too short to carry a header.
        h.dispatcher
            .handle_datagram(&[0x07, 0x02, 0x01], endpoint(5000))
            .await;
        // Valid header, unknown type.
        let frame = encode_request_frame(0x5A, 1, &[], 1, 1);
        h.dispatcher.handle_datagram(&frame, endpoint(5000)).await;
        // Init with truncated payload.
        let frame = encode_request_frame(MsgType::C2sInit.code(), 1, &[0u8, 0u8, 9, 0], 1, 1);
        h.dispatcher.handle_datagram(&frame, endpoint(5000)).await;

        assert!(h.out_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rate_limited_frames_dropped() {
        let mut h = harness();
        let config = ServerConfig::default();

        let frame = encode_request_frame(MsgType::C2sHeartbeat.code(), 1, &[], 1, 1);
        for _ in 0..config.rate_capacity {
            h.dispatcher.handle_datagram(&frame, endpoint(5000)).await;
        }
        // Drain the acks for the admitted frames.
        let mut acked = 0;
        while h.out_rx.try_recv().is_ok() {
            acked += 1;
        }
        assert_eq!(acked, config.rate_capacity as usize);

        // Over capacity: silence.
        h.dispatcher.handle_datagram(&frame, endpoint(5000)).await;
        assert!(h.out_rx.try_recv().is_err());
    }

    #[test]
    fn init_payload_parsing() {
        let payload = init_payload("Rook", "c_1_abcd");
        assert_eq!(
            parse_init_payload(&payload).unwrap(),
            ("Rook".to_string(), "c_1_abcd".to_string())
        );
        assert!(parse_init_payload(&[0u8]).is_err());
        assert!(parse_init_payload(&[0u8, 0u8, 0u8, 0u8]).is_err());
    }
}
