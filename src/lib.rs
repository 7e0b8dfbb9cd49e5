//! Tunnelpool - IP address pools and peer leases for VPN nodes
//!
//! Carves configured prefixes into leasable addresses and hands one address
//! per address family to each joining tunnel peer. A join either leases from
//! every pool or rolls back what it took.
//!
//! ```
//! use std::sync::Arc;
//! use tunnelpool::{AddressPool, PeerRegistry};
//!
//! let v4 = Arc::new(AddressPool::from_prefix("10.8.0.1/24")?);
//! let v6 = Arc::new(AddressPool::from_prefix("fd00:8::1/112")?);
//! let registry = PeerRegistry::new([v4, v6])?;
//!
//! let addrs = registry.acquire("peer-public-key")?;
//! assert_eq!(addrs[0].to_string(), "10.8.0.2");
//! registry.release("peer-public-key");
//! # Ok::<(), tunnelpool::Error>(())
//! ```

pub mod error;
pub mod manifest;
pub mod network;
pub mod peer;
pub mod port;

pub use error::{Error, Result};
pub use network::{AddrFamily, AddressPool, PrefixBlock};
pub use peer::{Peer, PeerRegistry};
pub use port::Port;
