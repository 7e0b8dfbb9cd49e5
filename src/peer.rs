//! Peer lease registry
//!
//! Maps an opaque peer identity to one address per configured pool. A join
//! either gets an address from every pool or from none of them: addresses
//! already taken are handed back when a later pool fails.

use crate::error::{Error, Result};
use crate::network::AddressPool;
use log::{debug, error, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;
use std::ops::ControlFlow;
use std::sync::Arc;

/// A registered tunnel peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Identity supplied by the protocol layer (public key, UUID, ...)
    pub id: String,
    /// One address per pool, in pool order
    pub addrs: Vec<IpAddr>,
}

impl Peer {
    pub fn key(&self) -> &str {
        &self.id
    }
}

/// Registry of peers and the addresses they lease
///
/// Mutations are serialized by a write lock; lookups and iteration share a
/// read lock. Pools keep their own locks, there is no lock spanning pools.
#[derive(Debug)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<String, Peer>>,
    pools: Vec<Arc<AddressPool>>,
}

impl PeerRegistry {
    /// Create a registry over an ordered, non-empty list of pools
    pub fn new<I>(pools: I) -> Result<Self>
    where
        I: IntoIterator<Item = Arc<AddressPool>>,
    {
        let pools: Vec<_> = pools.into_iter().collect();
        if pools.is_empty() {
            return Err(Error::NoPools);
        }

        Ok(Self {
            peers: RwLock::new(HashMap::new()),
            pools,
        })
    }

    pub fn pools(&self) -> &[Arc<AddressPool>] {
        &self.pools
    }

    /// Register a peer and lease one address from every pool
    pub fn acquire(&self, id: &str) -> Result<Vec<IpAddr>> {
        if id.is_empty() {
            return Err(Error::InvalidKey);
        }

        let mut peers = self.peers.write();
        if peers.contains_key(id) {
            return Err(Error::AlreadyExists(id.to_string()));
        }

        let mut addrs = Vec::with_capacity(self.pools.len());
        for (index, pool) in self.pools.iter().enumerate() {
            match pool.get() {
                Ok(addr) => addrs.push(addr),
                Err(e) => {
                    warn!(
                        "Peer {}: pool #{} ({}) failed, rolling back {} address(es): {}",
                        id,
                        index,
                        pool.prefix(),
                        addrs.len(),
                        e
                    );
                    self.give_back(id, &addrs);
                    return Err(e);
                }
            }
        }

        debug!("Peer {} acquired {:?}", id, addrs);
        peers.insert(
            id.to_string(),
            Peer {
                id: id.to_string(),
                addrs: addrs.clone(),
            },
        );

        Ok(addrs)
    }

    /// Unregister a peer and return its addresses; unknown ids are ignored
    pub fn release(&self, id: &str) {
        let mut peers = self.peers.write();

        let Some(peer) = peers.remove(id) else {
            return;
        };

        self.give_back(id, &peer.addrs);
        debug!("Peer {} released {:?}", id, peer.addrs);
    }

    /// Hand addresses back to their pools by position
    ///
    /// # Panics
    ///
    /// If a pool refuses an address. The registry only holds addresses the
    /// pools leased to it, so a refusal means the bookkeeping is corrupt.
    fn give_back(&self, id: &str, addrs: &[IpAddr]) {
        for (index, (pool, addr)) in self.pools.iter().zip(addrs).enumerate() {
            if let Err(e) = pool.put(*addr) {
                error!(
                    "Invariant violation: peer {} pool #{} ({}) rejected {}: {}",
                    id,
                    index,
                    pool.prefix(),
                    addr,
                    e
                );
                panic!(
                    "failed to put addr {} to pool #{} for peer {}: {}",
                    addr, index, id, e
                );
            }
        }
    }

    /// Snapshot of a single peer
    pub fn lookup(&self, id: &str) -> Option<Peer> {
        self.peers.read().get(id).cloned()
    }

    pub fn count(&self) -> usize {
        self.peers.read().len()
    }

    /// Visit every peer under the read lock, in no particular order
    ///
    /// The callback stops the walk early with `ControlFlow::Break`, or
    /// aborts it with an error that is passed through to the caller.
    pub fn for_each<F, E>(&self, mut f: F) -> std::result::Result<(), E>
    where
        F: FnMut(&str, &Peer) -> std::result::Result<ControlFlow<()>, E>,
    {
        let peers = self.peers.read();
        for (id, peer) in peers.iter() {
            if f(id.as_str(), peer)?.is_break() {
                break;
            }
        }
        Ok(())
    }

    /// All peers, sorted by id
    pub fn peers(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.peers.read().values().cloned().collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        peers
    }
}
