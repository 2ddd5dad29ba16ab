use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use peers::{port_open, Peer};

#[derive(Clone, Debug, Args)]
pub struct ProbeArgs {
    /// Endpoint to probe, host:port.
    pub endpoint: String,

    /// Connect timeout in milliseconds.
    #[arg(long, default_value_t = 400)]
    pub timeout_ms: u64,
}

pub fn run(args: ProbeArgs) -> Result<()> {
    let peer = Peer::parse(&args.endpoint).with_context(|| format!("parse {}", args.endpoint))?;
    let open = port_open(&peer.host, peer.port, Duration::from_millis(args.timeout_ms));
    println!("{}={}", peer.address(), if open { "open" } else { "closed" });
    Ok(())
}
