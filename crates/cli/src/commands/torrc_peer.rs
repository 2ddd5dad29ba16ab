use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use peers::NetProbe;
use tor_service::peer_from_config;

#[derive(Clone, Debug, Args)]
pub struct TorrcPeerArgs {
    /// torrc-style configuration file to read the SocksPort line from.
    #[arg(long)]
    pub config: PathBuf,
}

pub fn run(args: TorrcPeerArgs) -> Result<()> {
    let peer = peer_from_config(&args.config, &NetProbe);
    println!("socks={}", peer.address());
    println!("reachable={}", peer.is_reachable);
    Ok(())
}
