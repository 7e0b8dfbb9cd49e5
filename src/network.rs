//! Address management for tunnel peers
//!
//! Provides:
//! - Prefix parsing, sizing and enumeration
//! - Per-family IP pools with reservations and address reuse

pub mod pool;
pub mod prefix;

pub use pool::AddressPool;
pub use prefix::{AddrFamily, DEFAULT_MAX_ENUMERABLE, PrefixBlock};
