//! IP address pools for tunnel peers
//!
//! Provides:
//! - Lazy allocation from a single prefix (cursor walks forward on demand)
//! - FIFO reuse of released addresses
//! - Permanent reservations (network, broadcast, base address, extras)
//! - Support for IPv4 and IPv6

use crate::error::{Error, Result};
use crate::network::prefix::{AddrFamily, PrefixBlock};
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Mutable bookkeeping, guarded as one unit
#[derive(Debug, Default)]
struct PoolState {
    /// Addresses currently leased
    assigned: HashSet<IpAddr>,
    /// Addresses that are never leased
    reserved: HashSet<IpAddr>,
    /// Released addresses, reused before the cursor moves on
    recycled: VecDeque<IpAddr>,
    /// Next never-visited address; `None` once the address space wrapped
    cursor: Option<IpAddr>,
}

/// IP address pool over one prefix
///
/// All methods take `&self`; share the pool between threads with an `Arc`.
#[derive(Debug)]
pub struct AddressPool {
    prefix: PrefixBlock,
    state: Mutex<PoolState>,
}

impl AddressPool {
    /// Create a pool from a CIDR string
    ///
    /// `""` gives an unconfigured pool whose `get()` always fails.
    pub fn from_prefix(s: &str) -> Result<Self> {
        Self::new(PrefixBlock::parse(s)?)
    }

    /// Create a pool over a parsed prefix
    ///
    /// The base address, the network address and, for IPv4, the broadcast
    /// address are reserved up front.
    pub fn new(prefix: PrefixBlock) -> Result<Self> {
        let mut state = PoolState {
            cursor: prefix.network_addr(),
            ..Default::default()
        };

        if let Some(addr) = prefix.addr() {
            state.reserved.insert(addr);
        }
        if let Some(network) = prefix.network_addr() {
            state.reserved.insert(network);
        }
        if prefix.family() == Some(AddrFamily::V4) {
            state.reserved.insert(prefix.broadcast_addr()?);
        }

        debug!(
            "Created pool {} ({} addresses, {} reserved)",
            prefix,
            prefix.len(),
            state.reserved.len()
        );

        Ok(Self {
            prefix,
            state: Mutex::new(state),
        })
    }

    pub fn prefix(&self) -> &PrefixBlock {
        &self.prefix
    }

    /// Mark an address as never leasable
    pub fn reserve(&self, addr: IpAddr) -> Result<()> {
        let mut state = self.state.lock();

        if !self.prefix.contains(&addr) {
            return Err(Error::OutOfRange {
                addr,
                prefix: self.prefix.to_string(),
            });
        }
        if state.assigned.contains(&addr) || state.reserved.contains(&addr) {
            return Err(Error::AlreadyInUse(addr));
        }

        // A released address waiting in the queue must not come back out
        state.recycled.retain(|a| *a != addr);
        state.reserved.insert(addr);

        debug!("Reserved {} in pool {}", addr, self.prefix);
        Ok(())
    }

    /// Lease one address
    ///
    /// Released addresses are handed out first, oldest first. Otherwise the
    /// cursor advances past reserved addresses. Never blocks.
    pub fn get(&self) -> Result<IpAddr> {
        let mut state = self.state.lock();

        let addr = match state.recycled.pop_front() {
            Some(addr) => addr,
            None => self.advance(&mut state)?,
        };

        state.assigned.insert(addr);
        debug!(
            "Leased {} from pool {} ({} in use)",
            addr,
            self.prefix,
            state.assigned.len()
        );
        Ok(addr)
    }

    fn advance(&self, state: &mut PoolState) -> Result<IpAddr> {
        loop {
            let addr = match state.cursor {
                Some(addr) if self.prefix.contains(&addr) => addr,
                _ => {
                    warn!(
                        "Pool {} exhausted ({} addresses in use)",
                        self.prefix,
                        state.assigned.len()
                    );
                    return Err(Error::PoolExhausted(self.prefix.to_string()));
                }
            };

            state.cursor = next_addr(addr);
            if !state.reserved.contains(&addr) {
                return Ok(addr);
            }
        }
    }

    /// Return a leased address to the pool
    pub fn put(&self, addr: IpAddr) -> Result<()> {
        let mut state = self.state.lock();

        if !state.assigned.remove(&addr) {
            warn!("Attempted to release unassigned {} to pool {}", addr, self.prefix);
            return Err(Error::NotAssigned(addr));
        }

        state.recycled.push_back(addr);
        debug!(
            "Released {} to pool {} ({} in use)",
            addr,
            self.prefix,
            state.assigned.len()
        );
        Ok(())
    }

    pub fn assigned_count(&self) -> usize {
        self.state.lock().assigned.len()
    }

    pub fn reserved_count(&self) -> usize {
        self.state.lock().reserved.len()
    }

    pub fn is_assigned(&self, addr: &IpAddr) -> bool {
        self.state.lock().assigned.contains(addr)
    }

    pub fn is_reserved(&self, addr: &IpAddr) -> bool {
        self.state.lock().reserved.contains(addr)
    }
}

/// The numerically next address, `None` past the end of the address space
fn next_addr(addr: IpAddr) -> Option<IpAddr> {
    match addr {
        IpAddr::V4(a) => u32::from(a)
            .checked_add(1)
            .map(|n| IpAddr::V4(Ipv4Addr::from(n))),
        IpAddr::V6(a) => u128::from(a)
            .checked_add(1)
            .map(|n| IpAddr::V6(Ipv6Addr::from(n))),
    }
}
