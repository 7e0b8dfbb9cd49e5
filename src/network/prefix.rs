//! Network prefix blocks
//!
//! A `PrefixBlock` wraps an [`IpNet`] and keeps the base address exactly as
//! written (`10.8.0.1/24` keeps `10.8.0.1`), since pools reserve it.
//! An empty string parses into an unconfigured block: it contains nothing
//! and every pool built on it is exhausted from the start.

use crate::error::{Error, Result};
use ipnet::{IpNet, Ipv4AddrRange, Ipv6AddrRange};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Default cap on how many addresses `addrs()` will materialize
pub const DEFAULT_MAX_ENUMERABLE: u128 = 1 << 16;

/// Address family of a prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrFamily {
    V4,
    V6,
}

impl fmt::Display for AddrFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddrFamily::V4 => write!(f, "ipv4"),
            AddrFamily::V6 => write!(f, "ipv6"),
        }
    }
}

/// Validated network prefix (base address + mask length)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixBlock {
    /// `None` when the address family is not configured
    net: Option<IpNet>,
    /// Enumeration cap checked by `validate()` and `addrs()`
    max_len: u128,
}

impl PrefixBlock {
    /// Parse a CIDR string such as `10.8.0.1/24`
    ///
    /// The empty string yields an unconfigured block. The enumeration cap is
    /// not enforced here; call [`PrefixBlock::validate`] when the whole block
    /// is going to be materialized.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Self::unconfigured());
        }

        let net: IpNet = s.parse().map_err(|source| Error::Parse {
            input: s.to_string(),
            source,
        })?;

        Ok(Self::from_net(net))
    }

    /// Build a block from an already parsed network
    pub fn from_net(net: IpNet) -> Self {
        Self {
            net: Some(net),
            max_len: DEFAULT_MAX_ENUMERABLE,
        }
    }

    /// Block standing for an address family that is not configured
    pub fn unconfigured() -> Self {
        Self {
            net: None,
            max_len: DEFAULT_MAX_ENUMERABLE,
        }
    }

    /// Override the enumeration cap
    pub fn with_max_len(mut self, max_len: u128) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn max_len(&self) -> u128 {
        self.max_len
    }

    /// Whether this block holds an actual prefix
    pub fn is_configured(&self) -> bool {
        self.net.is_some()
    }

    pub fn net(&self) -> Option<IpNet> {
        self.net
    }

    pub fn family(&self) -> Option<AddrFamily> {
        self.net.map(|net| match net {
            IpNet::V4(_) => AddrFamily::V4,
            IpNet::V6(_) => AddrFamily::V6,
        })
    }

    /// Base address as written, host bits included
    pub fn addr(&self) -> Option<IpAddr> {
        self.net.map(|net| net.addr())
    }

    pub fn prefix_len(&self) -> Option<u8> {
        self.net.map(|net| net.prefix_len())
    }

    /// Number of addresses in the block: `2^(address bits - prefix bits)`
    ///
    /// Saturates at `u128::MAX` for `::/0`.
    pub fn len(&self) -> u128 {
        let Some(net) = self.net else {
            return 0;
        };

        match net.max_prefix_len().checked_sub(net.prefix_len()) {
            Some(host_bits) => 1u128.checked_shl(u32::from(host_bits)).unwrap_or(u128::MAX),
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Membership test; always false for an unconfigured block
    pub fn contains(&self, addr: &IpAddr) -> bool {
        self.net.is_some_and(|net| net.contains(addr))
    }

    /// Base address with all host bits cleared
    pub fn network_addr(&self) -> Option<IpAddr> {
        self.net.map(|net| net.network())
    }

    /// Base address with all host bits set (IPv4 only)
    pub fn broadcast_addr(&self) -> Result<IpAddr> {
        match self.net {
            Some(IpNet::V4(net)) => Ok(IpAddr::V4(net.broadcast())),
            Some(IpNet::V6(net)) => Err(Error::Unsupported(net.to_string())),
            None => Err(Error::Unsupported("unconfigured prefix".to_string())),
        }
    }

    /// Check the block against the enumeration cap
    pub fn validate(&self) -> Result<()> {
        let len = self.len();
        if len > self.max_len {
            return Err(Error::TooLarge {
                len,
                max: self.max_len,
            });
        }
        Ok(())
    }

    /// Every address in the block, ascending, network address first
    ///
    /// Recomputed on every call.
    pub fn addrs(&self) -> Result<Vec<IpAddr>> {
        self.validate()?;

        let addrs = match self.net {
            Some(IpNet::V4(net)) => Ipv4AddrRange::new(net.network(), net.broadcast())
                .map(IpAddr::V4)
                .collect(),
            Some(IpNet::V6(net)) => Ipv6AddrRange::new(net.network(), net.broadcast())
                .map(IpAddr::V6)
                .collect(),
            None => Vec::new(),
        };

        Ok(addrs)
    }
}

impl FromStr for PrefixBlock {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<IpNet> for PrefixBlock {
    fn from(net: IpNet) -> Self {
        Self::from_net(net)
    }
}

impl fmt::Display for PrefixBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.net {
            Some(net) => write!(f, "{}", net),
            None => write!(f, "<unconfigured>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn test_parse_keeps_base_address() {
        let block = PrefixBlock::parse("10.8.0.1/24").unwrap();

        assert_eq!(block.addr(), Some(v4(10, 8, 0, 1)));
        assert_eq!(block.prefix_len(), Some(24));
        assert_eq!(block.family(), Some(AddrFamily::V4));
        assert_eq!(block.to_string(), "10.8.0.1/24");
    }

    #[test]
    fn test_parse_empty_is_unconfigured() {
        let block = PrefixBlock::parse("").unwrap();

        assert!(!block.is_configured());
        assert!(block.is_empty());
        assert_eq!(block.network_addr(), None);
        assert!(!block.contains(&v4(10, 8, 0, 1)));
        assert!(block.addrs().unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed() {
        for input in ["10.8.0.1", "10.8.0.1/33", "not-a-prefix", "fd00::/129"] {
            let err = PrefixBlock::parse(input).unwrap_err();
            assert!(matches!(err, Error::Parse { .. }), "{input}: {err}");
        }
    }

    #[test]
    fn test_len() {
        let cases = [
            ("10.8.0.1/24", 256u128),
            ("10.8.0.1/32", 1),
            ("10.0.0.0/8", 1 << 24),
            ("0.0.0.0/0", 1 << 32),
            ("fd00::1/112", 1 << 16),
            ("fd00::/64", 1 << 64),
            ("::/0", u128::MAX),
        ];

        for (input, expected) in cases {
            assert_eq!(PrefixBlock::parse(input).unwrap().len(), expected, "{input}");
        }
    }

    #[test]
    fn test_network_and_broadcast() {
        let block = PrefixBlock::parse("10.8.0.1/24").unwrap();
        assert_eq!(block.network_addr(), Some(v4(10, 8, 0, 0)));
        assert_eq!(block.broadcast_addr().unwrap(), v4(10, 8, 0, 255));

        let block = PrefixBlock::parse("172.16.5.77/20").unwrap();
        assert_eq!(block.network_addr(), Some(v4(172, 16, 0, 0)));
        assert_eq!(block.broadcast_addr().unwrap(), v4(172, 16, 15, 255));

        let block = PrefixBlock::parse("192.168.1.9/32").unwrap();
        assert_eq!(block.broadcast_addr().unwrap(), v4(192, 168, 1, 9));
    }

    #[test]
    fn test_broadcast_unsupported_for_ipv6() {
        let block = PrefixBlock::parse("fd00:8::1/112").unwrap();
        assert_eq!(
            block.network_addr(),
            Some(IpAddr::V6("fd00:8::".parse::<Ipv6Addr>().unwrap()))
        );
        assert!(matches!(block.broadcast_addr(), Err(Error::Unsupported(_))));

        let block = PrefixBlock::unconfigured();
        assert!(matches!(block.broadcast_addr(), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_contains() {
        let block = PrefixBlock::parse("10.8.0.1/24").unwrap();

        assert!(block.contains(&v4(10, 8, 0, 0)));
        assert!(block.contains(&v4(10, 8, 0, 255)));
        assert!(!block.contains(&v4(10, 8, 1, 0)));
        assert!(!block.contains(&IpAddr::V6(Ipv6Addr::LOCALHOST)));
    }

    #[test]
    fn test_addrs_ascending_and_restartable() {
        let block = PrefixBlock::parse("10.8.0.6/30").unwrap();

        let first = block.addrs().unwrap();
        assert_eq!(
            first,
            vec![v4(10, 8, 0, 4), v4(10, 8, 0, 5), v4(10, 8, 0, 6), v4(10, 8, 0, 7)]
        );
        assert_eq!(block.addrs().unwrap(), first);

        let v6 = PrefixBlock::parse("fd00::/126").unwrap().addrs().unwrap();
        assert_eq!(v6.len(), 4);
        assert_eq!(v6[3], IpAddr::V6("fd00::3".parse::<Ipv6Addr>().unwrap()));
    }

    #[test]
    fn test_addrs_too_large() {
        let block = PrefixBlock::parse("10.0.0.0/15").unwrap();
        assert!(matches!(
            block.addrs(),
            Err(Error::TooLarge { len, max }) if len == 1 << 17 && max == DEFAULT_MAX_ENUMERABLE
        ));

        // Exactly at the cap is allowed
        let block = PrefixBlock::parse("10.0.0.0/16").unwrap();
        assert!(block.validate().is_ok());
        assert_eq!(block.addrs().unwrap().len(), 1 << 16);

        let block = PrefixBlock::parse("fd00::/64").unwrap();
        assert!(matches!(block.validate(), Err(Error::TooLarge { .. })));
    }

    #[test]
    fn test_custom_cap() {
        let block = PrefixBlock::parse("10.8.0.0/24").unwrap().with_max_len(16);
        assert!(matches!(block.validate(), Err(Error::TooLarge { len: 256, max: 16 })));

        let block: PrefixBlock = "10.8.0.0/28".parse::<PrefixBlock>().unwrap().with_max_len(16);
        assert_eq!(block.addrs().unwrap().len(), 16);
    }

    #[test]
    fn test_from_net_skips_cap_check() {
        let net: IpNet = "10.0.0.0/8".parse().unwrap();
        let block = PrefixBlock::from(net);

        assert_eq!(block.len(), 1 << 24);
        assert!(block.validate().is_err());
    }
}
