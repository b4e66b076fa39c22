//! Peer session tracking: which endpoint speaks for which account, and the
//! per-endpoint sequence numbers stamped on outgoing frames.
//!
//! Both maps are mutated together so they always agree: an account maps to at
//! most one endpoint, an endpoint to at most one account. Clients reconnect
//! from new ports constantly, so [`SessionRegistry::link`] quietly evicts
//! whatever stale pairing either side of the new pair had.

use log::{debug, info};
use std::collections::HashMap;
use std::net::SocketAddr;

const SEQ_ROLLOVER: u16 = 0xFFFF;

/// Bidirectional endpoint <-> account map plus outgoing sequence counters.
#[derive(Default)]
pub struct SessionRegistry {
    accounts_by_endpoint: HashMap<SocketAddr, i64>,
    endpoints_by_account: HashMap<i64, SocketAddr>,
    sequences: HashMap<SocketAddr, u16>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates an endpoint with an account, evicting any stale pairing
    /// either of them had.
    pub fn link(&mut self, endpoint: SocketAddr, account_id: i64) {
        if let Some(old_endpoint) = self.endpoints_by_account.get(&account_id) {
            if *old_endpoint != endpoint {
                debug!(
                    "account {} moved from {} to {}",
                    account_id, old_endpoint, endpoint
                );
                self.accounts_by_endpoint.remove(old_endpoint);
            }
        }
        if let Some(old_account) = self.accounts_by_endpoint.insert(endpoint, account_id) {
            if old_account != account_id {
                self.endpoints_by_account.remove(&old_account);
            }
        }
        self.endpoints_by_account.insert(account_id, endpoint);
        info!("session linked: {} -> account {}", endpoint, account_id);
    }

    pub fn resolve_account(&self, endpoint: SocketAddr) -> Option<i64> {
        self.accounts_by_endpoint.get(&endpoint).copied()
    }

    /// Next outgoing sequence number for an endpoint: starts at 1, wraps back
    /// to 1 when it would reach the rollover value. 0 is never emitted.
    pub fn next_sequence(&mut self, endpoint: SocketAddr) -> u16 {
        let current = self.sequences.get(&endpoint).copied().unwrap_or(0);
        let mut next = current + 1;
        if next >= SEQ_ROLLOVER {
            next = 1;
        }
        self.sequences.insert(endpoint, next);
        next
    }

    pub fn len(&self) -> usize {
        self.accounts_by_endpoint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts_by_endpoint.is_empty()
    }
}
