//! Command-line interface for Tunnelpool
//!
//! Uses clap with derive for type-safe CLI parsing

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Tunnelpool - address pools and peer leases for VPN nodes
#[derive(Parser)]
#[command(name = "tunnelpool")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "tunnelpool.toml")]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Validate configuration and describe the configured pools
    Check,

    /// Describe a single prefix
    Inspect {
        /// Prefix in CIDR notation (e.g., 10.8.0.1/24)
        prefix: String,

        /// List every address in the prefix
        #[arg(short, long)]
        list: bool,

        /// Enumeration cap for --list
        #[arg(long, default_value_t = tunnelpool::network::DEFAULT_MAX_ENUMERABLE as u64)]
        max: u64,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Join peers concurrently against the configured pools
    Simulate {
        /// Number of peers to join
        #[arg(short, long, default_value = "8")]
        peers: usize,

        /// Number of joined peers to release afterwards
        #[arg(short, long, default_value = "0")]
        release: usize,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Generate shell completion scripts
    pub fn generate_completion(shell: Shell) {
        let mut cmd = Self::command();
        clap_complete::generate(shell, &mut cmd, "tunnelpool", &mut std::io::stdout());
    }
}
