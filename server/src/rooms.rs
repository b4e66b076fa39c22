//! Room and presence tracking for the social layer.
//!
//! Rooms are created lazily, one per community, and hold the members that are
//! actively heartbeating. Presence is deliberately forgiving: a member who
//! goes quiet is removed from their room after a short timeout, but is
//! remembered as a "ghost" for a longer window so a client that recovers from
//! a network hiccup resumes its place without re-running the init handshake.
//!
//! Each account is in exactly one presence state at a time: offline (no
//! entry), active in exactly one room, or a ghost eligible for silent rejoin.

use crate::directory::MembershipRank;
use log::{debug, info};
use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A member currently present in a room.
#[derive(Debug, Clone)]
pub struct RoomMember {
    pub id: i64,
    pub name: String,
    pub rank: MembershipRank,
    pub last_ping: Instant,
}

/// A room full of members, owned by one community.
#[derive(Debug)]
pub struct Room {
    pub community_id: i64,
    pub members: HashMap<i64, RoomMember>,
}

enum Presence {
    Active {
        room: String,
    },
    /// Recently removed from a room; rank is retained so a silent rejoin
    /// restores it.
    Ghost {
        room: String,
        rank: MembershipRank,
        last_ping: Instant,
    },
}

/// All rooms plus the per-account presence index.
pub struct RoomDirectory {
    rooms: HashMap<String, Room>,
    presence: HashMap<i64, Presence>,
    member_timeout: Duration,
    ghost_timeout: Duration,
}

impl RoomDirectory {
    pub fn new(member_timeout: Duration, ghost_timeout: Duration) -> Self {
        Self {
            rooms: HashMap::new(),
            presence: HashMap::new(),
            member_timeout,
            ghost_timeout,
        }
    }

    /// Returns the key of the community's room, creating an empty room if the
    /// community has none. Used by the community-browse surface to hand out
    /// room ids.
    pub fn room_for_community(&mut self, community_id: i64) -> String {
        if let Some(key) = self
            .rooms
            .iter()
            .find(|(_, room)| room.community_id == community_id)
            .map(|(key, _)| key.clone())
        {
            return key;
        }

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let mut suffix = millis;
        let mut key = format!("c_{}_{:x}", community_id, suffix);
        while self.rooms.contains_key(&key) {
            suffix += 1;
            key = format!("c_{}_{:x}", community_id, suffix);
        }

        info!("created room {} for community {}", key, community_id);
        self.rooms.insert(
            key.clone(),
            Room {
                community_id,
                members: HashMap::new(),
            },
        );
        key
    }

    pub fn room(&self, key: &str) -> Option<&Room> {
        self.rooms.get(key)
    }

    /// Key of the room the account is actively in, if any.
    pub fn room_key_of(&self, account_id: i64) -> Option<String> {
        match self.presence.get(&account_id) {
            Some(Presence::Active { room }) => Some(room.clone()),
            _ => None,
        }
    }

    pub fn population(&self, key: &str) -> usize {
        self.rooms.get(key).map(|room| room.members.len()).unwrap_or(0)
    }

    /// Total members across every room belonging to a community.
    pub fn online_count(&self, community_id: i64) -> usize {
        self.rooms
            .values()
            .filter(|room| room.community_id == community_id)
            .map(|room| room.members.len())
            .sum()
    }

    /// Puts the account into a room with a fresh ping, replacing any previous
    /// membership or ghost state. No-op if the room does not exist.
    pub fn join(&mut self, account_id: i64, name: &str, room_key: &str, rank: MembershipRank) {
        if !self.rooms.contains_key(room_key) {
            return;
        }

        // A member lives in exactly one room; pull them out of the old one.
        if let Some(Presence::Active { room }) = self.presence.get(&account_id) {
            if room != room_key {
                let old = room.clone();
                if let Some(old_room) = self.rooms.get_mut(&old) {
                    old_room.members.remove(&account_id);
                }
            }
        }

        if let Some(room) = self.rooms.get_mut(room_key) {
            room.members.insert(
                account_id,
                RoomMember {
                    id: account_id,
                    name: name.to_string(),
                    rank,
                    last_ping: Instant::now(),
                },
            );
            self.presence.insert(
                account_id,
                Presence::Active {
                    room: room_key.to_string(),
                },
            );
            info!("account {} ({}) joined room {}", account_id, name, room_key);
        }
    }

    /// Removes an active member from their room. Ghosts are left to expire on
    /// their own; offline accounts are a no-op.
    pub fn leave(&mut self, account_id: i64) {
        let Some(Presence::Active { room }) = self.presence.get(&account_id) else {
            return;
        };
        let key = room.clone();
        if let Some(room) = self.rooms.get_mut(&key) {
            room.members.remove(&account_id);
        }
        self.presence.remove(&account_id);
        info!("account {} left room {}", account_id, key);
    }

    /// Heartbeat from an account. Active members get their ping refreshed in
    /// place; a ghost silently rejoins its remembered room (with its
    /// remembered rank) if that room still exists. Anything else is ignored.
    pub fn ping(&mut self, account_id: i64, name: &str) {
        match self.presence.get(&account_id) {
            Some(Presence::Active { room }) => {
                let key = room.clone();
                if let Some(room) = self.rooms.get_mut(&key) {
                    if let Some(member) = room.members.get_mut(&account_id) {
                        member.last_ping = Instant::now();
                    }
                }
            }
            Some(Presence::Ghost { room, rank, .. }) => {
                let (key, rank) = (room.clone(), *rank);
                if self.rooms.contains_key(&key) {
                    debug!("account {} rejoined room {} from ghost state", account_id, key);
                    self.join(account_id, name, &key, rank);
                }
                // A vanished room leaves the ghost to expire in cull().
            }
            None => {}
        }
    }

    /// Periodic sweep. Members silent past the member timeout are dropped
    /// from their rooms; the ones still inside the ghost window are kept as
    /// ghosts (stale ping preserved, so the ghost window counts from their
    /// last real heartbeat). Rooms emptied by the sweep are deleted. Ghosts
    /// past the ghost window are purged.
    pub fn cull(&mut self) {
        let now = Instant::now();
        let member_timeout = self.member_timeout;
        let ghost_timeout = self.ghost_timeout;
        let mut emptied = Vec::new();

        for (key, room) in self.rooms.iter_mut() {
            let had_members = !room.members.is_empty();

            let stale: Vec<i64> = room
                .members
                .values()
                .filter(|member| now.duration_since(member.last_ping) >= member_timeout)
                .map(|member| member.id)
                .collect();

            for account_id in stale {
                if let Some(member) = room.members.remove(&account_id) {
                    if now.duration_since(member.last_ping) < ghost_timeout {
                        debug!("account {} ghosted out of room {}", account_id, key);
                        self.presence.insert(
                            account_id,
                            Presence::Ghost {
                                room: key.clone(),
                                rank: member.rank,
                                last_ping: member.last_ping,
                            },
                        );
                    } else {
                        info!("account {} timed out of room {}", account_id, key);
                        self.presence.remove(&account_id);
                    }
                }
            }

            if had_members && room.members.is_empty() {
                emptied.push(key.clone());
            }
        }

        for key in emptied {
            info!("room {} emptied, deleting", key);
            self.rooms.remove(&key);
        }

        self.presence.retain(|_, presence| match presence {
            Presence::Ghost { last_ping, .. } => now.duration_since(*last_ping) < ghost_timeout,
            _ => true,
        });
    }
}
