//! Discovered network peers.
//!
//! A Mirror device accumulates one [`NetworkPeer`] per distinct address as
//! `hostDiscovered` events arrive.  The set only grows until it is cleared
//! explicitly; there is no staleness eviction.

use std::collections::HashMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// A device that announced itself on the local network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPeer {
    pub address: String,
    pub discovered_at: SystemTime,
    pub connected: bool,
}

/// Peers keyed by address.  Iteration order is unspecified.
#[derive(Debug, Default, Clone)]
pub struct PeerSet {
    peers: HashMap<String, NetworkPeer>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a discovery.  Returns `true` if the address was not known yet;
    /// re-discovering a known address keeps its original timestamp and
    /// connection flag.
    pub fn insert_discovered(&mut self, address: &str, at: SystemTime) -> bool {
        if self.peers.contains_key(address) {
            return false;
        }
        self.peers.insert(
            address.to_string(),
            NetworkPeer {
                address: address.to_string(),
                discovered_at: at,
                connected: false,
            },
        );
        true
    }

    pub fn contains(&self, address: &str) -> bool {
        self.peers.contains_key(address)
    }

    pub fn get(&self, address: &str) -> Option<&NetworkPeer> {
        self.peers.get(address)
    }

    /// Marks `address` as the one connected peer; every other peer is
    /// marked disconnected.  Returns `false` if the address is unknown.
    pub fn mark_connected(&mut self, address: &str) -> bool {
        if !self.peers.contains_key(address) {
            return false;
        }
        for (addr, peer) in self.peers.iter_mut() {
            peer.connected = addr == address;
        }
        true
    }

    /// Marks every peer disconnected, keeping the entries.
    pub fn disconnect_all(&mut self) {
        for peer in self.peers.values_mut() {
            peer.connected = false;
        }
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Snapshot of all peers.
    pub fn all(&self) -> Vec<NetworkPeer> {
        self.peers.values().cloned().collect()
    }

    /// Snapshot of all peer addresses.
    pub fn addresses(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }
}
