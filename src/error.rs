//! Unified error types for Tunnelpool

use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Tunnelpool operations
#[derive(Error, Debug)]
pub enum Error {
    // Config errors
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config validation failed: {0}")]
    ConfigValidation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid port specification '{input}': {reason}")]
    InvalidPort { input: String, reason: String },

    #[error("Invalid address '{input}': {source}")]
    AddrParse {
        input: String,
        source: std::net::AddrParseError,
    },

    // Prefix errors
    #[error("Failed to parse net prefix '{input}': {source}")]
    Parse {
        input: String,
        source: ipnet::AddrParseError,
    },

    #[error("Prefix block size {len} exceeds maximum of {max}")]
    TooLarge { len: u128, max: u128 },

    #[error("Broadcast address is not applicable to {0}")]
    Unsupported(String),

    // Pool errors
    #[error("Address {addr} is outside of prefix {prefix}")]
    OutOfRange { addr: IpAddr, prefix: String },

    #[error("Address {0} is already assigned or reserved")]
    AlreadyInUse(IpAddr),

    #[error("Pool {0} is exhausted")]
    PoolExhausted(String),

    #[error("Address {0} is not assigned")]
    NotAssigned(IpAddr),

    // Peer errors
    #[error("Peer id is empty")]
    InvalidKey,

    #[error("Peer '{0}' already exists")]
    AlreadyExists(String),

    #[error("Peer registry requires at least one address pool")]
    NoPools,
}

/// Result type alias for Tunnelpool operations
pub type Result<T> = std::result::Result<T, Error>;
