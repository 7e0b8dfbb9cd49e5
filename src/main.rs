//! Tunnelpool - address pools and peer leases for VPN nodes
//!
//! Checks pool configuration and drives the peer registry the way a tunnel
//! server would.

mod cli;

use cli::{Cli, Commands};
use env_logger::Env;
use log::{info, warn};
use rand::Rng;
use std::net::IpAddr;
use std::num::NonZeroUsize;
use tunnelpool::manifest::{self, TunnelpoolConfig};
use tunnelpool::{PeerRegistry, PrefixBlock, Result};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    match cli.command {
        // Commands that don't require config
        Commands::Completion { shell } => {
            Cli::generate_completion(shell);
        }
        Commands::Inspect {
            prefix,
            list,
            max,
            json,
        } => {
            let block = PrefixBlock::parse(&prefix)?.with_max_len(u128::from(max));
            inspect(&block, list, json)?;
        }

        // Commands that require config
        Commands::Check => {
            let config = manifest::load(&cli.config)?;
            check(&config)?;
        }
        Commands::Simulate {
            peers,
            release,
            json,
        } => {
            let config = manifest::load(&cli.config)?;
            info!("Simulating {} peer joins from {}", peers, cli.config.display());
            simulate(&config, peers, release, json)?;
        }
    }

    Ok(())
}

fn broadcast_display(block: &PrefixBlock) -> String {
    block
        .broadcast_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "n/a".to_string())
}

fn inspect(block: &PrefixBlock, list: bool, json: bool) -> Result<()> {
    let addrs = if list { Some(block.addrs()?) } else { None };

    if json {
        let data = serde_json::json!({
            "prefix": block.to_string(),
            "family": block.family().map(|f| f.to_string()),
            "size": block.len().to_string(),
            "network": block.network_addr(),
            "broadcast": block.broadcast_addr().ok(),
            "addrs": addrs,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("Prefix:    {}", block);
    if let Some(family) = block.family() {
        println!("Family:    {}", family);
    }
    println!("Size:      {}", block.len());
    if let Some(network) = block.network_addr() {
        println!("Network:   {}", network);
    }
    println!("Broadcast: {}", broadcast_display(block));

    if let Some(addrs) = addrs {
        println!("\nAddresses:");
        for addr in addrs {
            println!("  {}", addr);
        }
    }

    Ok(())
}

fn check(config: &TunnelpoolConfig) -> Result<()> {
    // Configuration was already validated on load
    println!("Configuration is valid.");

    let server = &config.server;
    println!("\nAddress: {}", server.address());

    let port = server.port()?;
    if port.is_set() {
        println!("Port:    {} (listen {}, advertise {})", port, port.in_port(), port.out_port());
    } else {
        println!("Port:    not set");
    }

    println!("\nPools (max enumerable {}):", server.max_enumerable);
    for (i, pool) in server.build_pools()?.iter().enumerate() {
        let block = pool.prefix();
        println!("  {}. {}", i + 1, block);
        if let Some(family) = block.family() {
            println!("     family:    {}", family);
        }
        println!("     size:      {}", block.len());
        if let Some(network) = block.network_addr() {
            println!("     network:   {}", network);
        }
        println!("     broadcast: {}", broadcast_display(block));
        println!("     reserved:  {}", pool.reserved_count());
        match block.validate() {
            Ok(()) => println!("     listable:  yes"),
            Err(e) => println!("     listable:  no ({})", e),
        }
    }

    Ok(())
}

/// Random 32-byte peer identity, hex encoded like a public key
fn random_peer_id() -> String {
    let key: [u8; 32] = rand::rng().random();
    hex::encode(key)
}

fn simulate(config: &TunnelpoolConfig, peers: usize, release: usize, json: bool) -> Result<()> {
    let registry = config.server.build_registry()?;
    let ids: Vec<String> = (0..peers).map(|_| random_peer_id()).collect();

    let workers = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .min(ids.len());
    let outcomes = join_peers(&registry, &ids, workers);

    let mut failures = Vec::new();
    for (id, outcome) in &outcomes {
        if let Err(e) = outcome {
            warn!("Peer {} rejected: {}", id, e);
            failures.push(serde_json::json!({ "id": id, "error": e.to_string() }));
        }
    }

    let released = release_peers(&registry, release);

    let peers = registry.peers();
    if json {
        let data = serde_json::json!({
            "pools": registry.pools().iter().map(|p| serde_json::json!({
                "prefix": p.prefix().to_string(),
                "assigned": p.assigned_count(),
                "reserved": p.reserved_count(),
            })).collect::<Vec<_>>(),
            "peers": peers.iter().map(|p| serde_json::json!({
                "id": p.id,
                "addrs": p.addrs,
            })).collect::<Vec<_>>(),
            "released": released,
            "rejected": failures,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("{:<66} {}", "PEER", "ADDRESSES");
    println!("{}", "-".repeat(100));
    for peer in &peers {
        let addrs: Vec<String> = peer.addrs.iter().map(IpAddr::to_string).collect();
        println!("{:<66} {}", peer.id, addrs.join(", "));
    }

    println!(
        "\nJoined: {}  Released: {}  Rejected: {}",
        outcomes.len() - failures.len(),
        released.len(),
        failures.len()
    );
    for pool in registry.pools() {
        println!(
            "  {}: {} assigned, {} reserved",
            pool.prefix(),
            pool.assigned_count(),
            pool.reserved_count()
        );
    }

    Ok(())
}

/// Join every id through a fixed set of worker threads
fn join_peers<'a>(
    registry: &PeerRegistry,
    ids: &'a [String],
    workers: usize,
) -> Vec<(&'a str, Result<Vec<IpAddr>>)> {
    let (tx, rx) = crossbeam::channel::unbounded::<&'a str>();
    for id in ids {
        // The receiver is alive until this function returns
        let _ = tx.send(id.as_str());
    }
    drop(tx);

    // A panicking worker means pool bookkeeping broke; keep it fatal
    crossbeam::thread::scope(|s| {
        let handles: Vec<_> = (0..workers.max(1))
            .map(|_| {
                let rx = rx.clone();
                s.spawn(move |_| {
                    rx.iter()
                        .map(|id| (id, registry.acquire(id)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect::<Vec<_>>()
    })
    .unwrap_or_else(|e| std::panic::resume_unwind(e))
}

/// Release up to `count` peers, lowest ids first
fn release_peers(registry: &PeerRegistry, count: usize) -> Vec<String> {
    let ids: Vec<String> = registry
        .peers()
        .into_iter()
        .take(count)
        .map(|p| p.id)
        .collect();

    for id in &ids {
        registry.release(id);
        info!("Released peer {}", id);
    }

    ids
}
