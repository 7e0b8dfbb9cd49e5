//! Configuration file parsing for Tunnelpool
//!
//! Parses `tunnelpool.toml` configuration files using serde

use crate::error::{Error, Result};
use crate::network::{AddrFamily, AddressPool, DEFAULT_MAX_ENUMERABLE, PrefixBlock};
use crate::peer::PeerRegistry;
use crate::port::Port;
use log::debug;
use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

/// Load configuration from a file
pub fn load(path: &Path) -> Result<TunnelpoolConfig> {
    let content = fs::read_to_string(path).map_err(|e| Error::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config = parse(&content)?;
    debug!("Loaded configuration from {}", path.display());

    Ok(config)
}

/// Parse and validate configuration text
pub fn parse(content: &str) -> Result<TunnelpoolConfig> {
    let config: TunnelpoolConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Root configuration structure
#[derive(Debug, Deserialize)]
pub struct TunnelpoolConfig {
    /// Tunnel server settings
    pub server: ServerConfig,
}

impl TunnelpoolConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.server.validate()
    }
}

/// Tunnel server address and port settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// IPv4 interface address with prefix, e.g. `10.8.0.1/24`
    #[serde(default)]
    pub ipv4_addr: String,

    /// IPv6 interface address with prefix, e.g. `fd00:8::1/112`
    #[serde(default)]
    pub ipv6_addr: String,

    /// Listen port specification (`in[:out]`)
    #[serde(default)]
    pub port: String,

    /// Enumeration cap for prefix blocks
    #[serde(default = "default_max_enumerable")]
    pub max_enumerable: u64,

    /// Extra addresses never handed to peers
    #[serde(default)]
    pub reserved: Vec<String>,
}

fn default_max_enumerable() -> u64 {
    DEFAULT_MAX_ENUMERABLE as u64
}

fn check_family(field: &str, block: &PrefixBlock, expected: AddrFamily) -> Result<()> {
    match block.family() {
        Some(family) if family != expected => Err(Error::ConfigValidation(format!(
            "{} '{}' is not an {} prefix",
            field, block, expected
        ))),
        _ => Ok(()),
    }
}

impl ServerConfig {
    /// Validate the server section
    pub fn validate(&self) -> Result<()> {
        let ipv4 = self.ipv4_prefix()?;
        let ipv6 = self.ipv6_prefix()?;
        if !ipv4.is_configured() && !ipv6.is_configured() {
            return Err(Error::ConfigValidation(
                "At least one of ipv4_addr or ipv6_addr must be set".into(),
            ));
        }
        check_family("ipv4_addr", &ipv4, AddrFamily::V4)?;
        check_family("ipv6_addr", &ipv6, AddrFamily::V6)?;

        self.port()?;

        for addr in self.reserved_addrs()? {
            if !ipv4.contains(&addr) && !ipv6.contains(&addr) {
                return Err(Error::ConfigValidation(format!(
                    "Reserved address {} is outside every configured prefix",
                    addr
                )));
            }
        }

        Ok(())
    }

    pub fn ipv4_prefix(&self) -> Result<PrefixBlock> {
        Ok(PrefixBlock::parse(&self.ipv4_addr)?.with_max_len(u128::from(self.max_enumerable)))
    }

    pub fn ipv6_prefix(&self) -> Result<PrefixBlock> {
        Ok(PrefixBlock::parse(&self.ipv6_addr)?.with_max_len(u128::from(self.max_enumerable)))
    }

    /// Configured prefixes, IPv4 first
    pub fn prefixes(&self) -> Result<Vec<PrefixBlock>> {
        Ok([self.ipv4_prefix()?, self.ipv6_prefix()?]
            .into_iter()
            .filter(PrefixBlock::is_configured)
            .collect())
    }

    pub fn port(&self) -> Result<Port> {
        Port::parse(&self.port)
    }

    pub fn reserved_addrs(&self) -> Result<Vec<IpAddr>> {
        self.reserved
            .iter()
            .map(|s| {
                s.trim().parse().map_err(|source| Error::AddrParse {
                    input: s.clone(),
                    source,
                })
            })
            .collect()
    }

    /// Interface address line: configured prefixes joined with `", "`
    pub fn address(&self) -> String {
        [&self.ipv4_addr, &self.ipv6_addr]
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// One pool per configured family, with `reserved` applied
    pub fn build_pools(&self) -> Result<Vec<Arc<AddressPool>>> {
        let pools = self
            .prefixes()?
            .into_iter()
            .map(|prefix| AddressPool::new(prefix).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        for addr in self.reserved_addrs()? {
            let pool = pools
                .iter()
                .find(|p| p.prefix().contains(&addr))
                .ok_or_else(|| {
                    Error::ConfigValidation(format!(
                        "Reserved address {} is outside every configured prefix",
                        addr
                    ))
                })?;

            match pool.reserve(addr) {
                // Network/broadcast/base are reserved already
                Ok(()) | Err(Error::AlreadyInUse(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(pools)
    }

    /// Registry over the configured pools
    pub fn build_registry(&self) -> Result<PeerRegistry> {
        PeerRegistry::new(self.build_pools()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DUAL_STACK: &str = r#"
[server]
ipv4_addr = "10.8.0.1/24"
ipv6_addr = "fd00:8::1/112"
port = "51820"
reserved = ["10.8.0.5", "fd00:8::10"]
"#;

    #[test]
    fn test_parse_dual_stack() {
        let config = parse(DUAL_STACK).unwrap();
        let server = &config.server;

        assert_eq!(server.address(), "10.8.0.1/24, fd00:8::1/112");
        assert_eq!(server.port().unwrap().in_port(), 51820);
        assert_eq!(u128::from(server.max_enumerable), DEFAULT_MAX_ENUMERABLE);
        assert_eq!(server.prefixes().unwrap().len(), 2);
    }

    #[test]
    fn test_build_registry_applies_reservations() {
        let config = parse(DUAL_STACK).unwrap();
        let registry = config.server.build_registry().unwrap();

        let pools = registry.pools();
        assert_eq!(pools.len(), 2);
        assert!(pools[0].is_reserved(&"10.8.0.5".parse().unwrap()));
        assert!(pools[1].is_reserved(&"fd00:8::10".parse().unwrap()));

        let addrs = registry.acquire("peer").unwrap();
        assert!(addrs[0].is_ipv4());
        assert!(addrs[1].is_ipv6());
    }

    #[test]
    fn test_single_family_skips_unconfigured() {
        let config = parse(
            r#"
[server]
ipv4_addr = "10.8.0.1/24"
ipv6_addr = ""
"#,
        )
        .unwrap();

        assert_eq!(config.server.address(), "10.8.0.1/24");
        let pools = config.server.build_pools().unwrap();
        assert_eq!(pools.len(), 1);
        assert!(!config.server.port().unwrap().is_set());
    }

    #[test]
    fn test_reserving_structural_address_is_tolerated() {
        let config = parse(
            r#"
[server]
ipv4_addr = "10.8.0.1/24"
reserved = ["10.8.0.1"]
"#,
        )
        .unwrap();

        assert!(config.server.build_pools().is_ok());
    }

    #[test]
    fn test_max_enumerable_caps_prefixes() {
        let config = parse(
            r#"
[server]
ipv4_addr = "10.8.0.1/24"
ipv6_addr = "fd00:8::1/124"
max_enumerable = 16
"#,
        )
        .unwrap();
        let server = &config.server;

        assert!(matches!(
            server.ipv4_prefix().unwrap().validate(),
            Err(Error::TooLarge { len: 256, max: 16 })
        ));
        assert!(matches!(
            server.ipv4_prefix().unwrap().addrs(),
            Err(Error::TooLarge { max: 16, .. })
        ));
        assert_eq!(server.ipv6_prefix().unwrap().addrs().unwrap().len(), 16);

        // Pools stay lazy, the cap only limits listing
        let registry = server.build_registry().unwrap();
        assert_eq!(registry.pools()[0].prefix().max_len(), 16);
        assert!(registry.acquire("peer").is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            "[server]\n",
            "[server]\nipv4_addr = \"fd00::1/64\"\n",
            "[server]\nipv6_addr = \"10.8.0.1/24\"\n",
            "[server]\nipv4_addr = \"10.8.0.1/24\"\nreserved = [\"10.9.0.1\"]\n",
        ];

        for content in cases {
            assert!(
                matches!(parse(content), Err(Error::ConfigValidation(_))),
                "{content}"
            );
        }
    }

    #[test]
    fn test_field_errors() {
        assert!(matches!(
            parse("[server]\nipv4_addr = \"10.8.0.1\"\n"),
            Err(Error::Parse { .. })
        ));
        assert!(matches!(
            parse("[server]\nipv4_addr = \"10.8.0.1/24\"\nport = \"0\"\n"),
            Err(Error::InvalidPort { .. })
        ));
        assert!(matches!(
            parse("[server]\nipv4_addr = \"10.8.0.1/24\"\nreserved = [\"nope\"]\n"),
            Err(Error::AddrParse { .. })
        ));
        assert!(matches!(parse("[server"), Err(Error::ConfigParse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DUAL_STACK.as_bytes()).unwrap();

        let config = load(file.path()).unwrap();
        assert_eq!(config.server.prefixes().unwrap().len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        assert!(matches!(load(&path), Err(Error::ConfigRead { .. })));
    }
}
