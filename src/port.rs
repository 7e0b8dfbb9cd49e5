//! Listen port specification
//!
//! Format: `in[:out]`, each side `from[-to]`. `51820` listens and advertises
//! the same port; `51820:443` listens on 51820 and advertises 443.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Inbound and outbound port ranges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Port {
    pub in_from: u16,
    pub in_to: u16,
    pub out_from: u16,
    pub out_to: u16,
}

impl Port {
    /// Parse a port specification; an empty string gives an all-zero port
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }

        let invalid = |reason: String| Error::InvalidPort {
            input: s.to_string(),
            reason,
        };

        let mut parts = s.split(':');
        let in_range = parts.next().unwrap_or_default();
        let out_range = parts.next().unwrap_or(in_range);
        if parts.next().is_some() {
            return Err(invalid("invalid format".into()));
        }

        let (in_from, in_to) =
            parse_range(in_range).map_err(|e| invalid(format!("invalid in range: {}", e)))?;
        let (out_from, out_to) =
            parse_range(out_range).map_err(|e| invalid(format!("invalid out range: {}", e)))?;

        let port = Self {
            in_from,
            in_to,
            out_from,
            out_to,
        };
        port.check().map_err(invalid)?;

        Ok(port)
    }

    fn check(&self) -> std::result::Result<(), String> {
        if self.in_from < 1 || self.out_from < 1 {
            return Err("numbers must be between 1 and 65535".into());
        }
        if self.in_from > self.in_to {
            return Err("in_from cannot be greater than in_to".into());
        }
        if self.out_from > self.out_to {
            return Err("out_from cannot be greater than out_to".into());
        }
        if self.in_to - self.in_from != self.out_to - self.out_from {
            return Err("in and out ranges must match in size".into());
        }
        Ok(())
    }

    /// Port the server listens on
    pub fn in_port(&self) -> u16 {
        self.in_from
    }

    /// Port advertised to clients
    pub fn out_port(&self) -> u16 {
        self.out_from
    }

    pub fn is_set(&self) -> bool {
        *self != Self::default()
    }
}

/// `from[-to]`; an empty side parses to `(0, 0)`
fn parse_range(s: &str) -> std::result::Result<(u16, u16), String> {
    let s = s.trim();
    if s.is_empty() {
        return Ok((0, 0));
    }

    let mut parts = s.split('-');
    let from = parse_number(parts.next().unwrap_or_default())?;
    let to = match parts.next() {
        Some(to) => parse_number(to)?,
        None => from,
    };
    if parts.next().is_some() {
        return Err("invalid format".into());
    }
    if from > to {
        return Err("from cannot be greater than to".into());
    }

    Ok((from, to))
}

fn parse_number(s: &str) -> std::result::Result<u16, String> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(0);
    }

    let n: u32 = s.parse().map_err(|e| format!("'{}': {}", s, e))?;
    if !(1..=65535).contains(&n) {
        return Err("number must be between 1 and 65535".into());
    }

    Ok(n as u16)
}

impl FromStr for Port {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Ranges always match in size, so one side being a range means both are
        if self.in_from != self.in_to {
            return write!(
                f,
                "{}-{}:{}-{}",
                self.in_from, self.in_to, self.out_from, self.out_to
            );
        }

        if self.in_from == self.out_from {
            write!(f, "{}", self.in_from)
        } else {
            write!(f, "{}:{}", self.in_from, self.out_from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_port() {
        let port = Port::parse("51820").unwrap();

        assert_eq!(port.in_port(), 51820);
        assert_eq!(port.out_port(), 51820);
        assert_eq!(port.to_string(), "51820");
    }

    #[test]
    fn test_in_out_ports() {
        let port: Port = "51820:443".parse().unwrap();

        assert_eq!(port.in_port(), 51820);
        assert_eq!(port.out_port(), 443);
        assert_eq!(port.to_string(), "51820:443");
    }

    #[test]
    fn test_ranges_display_shortest_form() {
        for input in ["1000-1005:2000-2005", "1-5:6-10", "7000-7000:8000"] {
            let port = Port::parse(input).unwrap();
            assert_eq!(Port::parse(&port.to_string()).unwrap(), port, "{input}");
        }

        assert_eq!(Port::parse("7000-7000:8000").unwrap().to_string(), "7000:8000");
        assert_eq!(Port::parse("1-5:6-10").unwrap().to_string(), "1-5:6-10");
    }

    #[test]
    fn test_empty() {
        let port = Port::parse("").unwrap();
        assert!(!port.is_set());
        assert_eq!(port, Port::default());
    }

    #[test]
    fn test_invalid() {
        for input in [
            "1:2:3",
            "1-2-3",
            "0",
            "65536",
            "abc",
            "10-5",
            "1-5:6-7",
            "1000:2000-2005",
            "1000-1005:2000",
            "51820:",
        ] {
            assert!(
                matches!(Port::parse(input), Err(Error::InvalidPort { .. })),
                "{input}"
            );
        }
    }
}
