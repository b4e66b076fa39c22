//! Rate limiting for inbound datagrams.
//!
//! Sliding-window estimation rather than a fixed window: a fixed window lets
//! an attacker send a full window's capacity in a burst at every reset. The
//! estimate blends the previous window's count, weighted by how much of the
//! current window remains, with the current count. Source-address spoofing
//! can still defeat this; accepted limitation.

use log::debug;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

#[derive(Default)]
struct WindowTrack {
    prev: u32,
    curr: u32,
}

/// Per-endpoint sliding-window admission counter.
pub struct RateLimiter {
    capacity: u32,
    window: Duration,
    last_rotation: Instant,
    tracker: HashMap<SocketAddr, WindowTrack>,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            last_rotation: Instant::now(),
            tracker: HashMap::new(),
        }
    }

    /// Counts one inbound datagram against the endpoint and reports whether
    /// it is admitted.
    pub fn allow(&mut self, endpoint: SocketAddr) -> bool {
        let track = self.tracker.entry(endpoint).or_default();
        track.curr += 1;

        let elapsed_fraction =
            self.last_rotation.elapsed().as_secs_f64() / self.window.as_secs_f64();
        let estimate = track.prev as f64 * (1.0 - elapsed_fraction) + track.curr as f64;

        let admitted = estimate <= self.capacity as f64;
        if !admitted {
            debug!("rate limited {} (estimate {:.1})", endpoint, estimate);
        }
        admitted
    }

    /// Starts a new window epoch: current counts become previous counts, and
    /// endpoints that went a full window without traffic are forgotten.
    pub fn rotate(&mut self) {
        self.last_rotation = Instant::now();
        self.tracker.retain(|_, track| {
            if track.prev == 0 && track.curr == 0 {
                return false;
            }
            track.prev = track.curr;
            track.curr = 0;
            true
        });
    }

    pub fn tracked_endpoints(&self) -> usize {
        self.tracker.len()
    }
}
