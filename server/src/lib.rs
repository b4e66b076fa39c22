//! # Social Presence Server
//!
//! UDP backend for a multiplayer game's social layer: community rooms,
//! realtime presence, and roster broadcasting over a custom binary protocol.
//!
//! ## Core Responsibilities
//!
//! ### Presence Tracking
//! Clients heartbeat roughly once a second. Members that go quiet are culled
//! from their rooms after a short timeout but kept as "ghosts" for a longer
//! grace window, so a transient disconnect resumes silently instead of
//! forcing a full init handshake.
//!
//! ### Roster Broadcasting
//! Room member lists are serialized into the game's wire format and pushed to
//! clients on join and periodically on heartbeats, fragmented across multiple
//! datagrams when they outgrow the maximum datagram size.
//!
//! ### Flood Protection
//! A per-endpoint sliding-window rate limiter sits directly behind the
//! socket, ahead of any parsing beyond the magic check.
//!
//! ## Module Organization
//!
//! - `config`: tunables for the socket, protocol limits, and timeouts
//! - `session`: endpoint <-> account registry and outgoing sequence numbers
//! - `rates`: sliding-window admission control
//! - `rooms`: rooms, members, ghosts, and the periodic cull
//! - `roster`: member-list serialization and fragmentation
//! - `directory`: seams to the external account and membership stores
//! - `dispatcher`: per-datagram protocol state machine
//! - `network`: socket loop, outgoing queue, background timers
//!
//! ## Concurrency Model
//!
//! One task receives datagrams and spawns a handler per message; handlers may
//! suspend on directory lookups while later datagrams are processed. Every
//! shared structure sits behind its own `RwLock` with short guard scopes, so
//! each registry mutation is atomic from any handler's point of view, and the
//! cull/rotation timers run on their own tasks without being starved by
//! inbound bursts. No handler failure ever terminates the socket loop; the
//! only fatal condition is failing to bind at startup.

pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod network;
pub mod rates;
pub mod rooms;
pub mod roster;
pub mod session;
