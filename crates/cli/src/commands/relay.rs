use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use peers::PeerBook;
use wallet_session::{DaemonRelay, TxRelay};

#[derive(Clone, Debug, Args)]
pub struct RelayArgs {
    /// Daemon endpoint host:port; repeat for redundant broadcast.
    #[arg(long = "node", required = true)]
    pub nodes: Vec<String>,

    /// Raw signed transaction hex.
    #[arg(long, conflicts_with = "file")]
    pub hex: Option<String>,

    /// File holding the raw signed transaction hex.
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// SOCKS proxy for daemon traffic, e.g. socks5h://127.0.0.1:9050.
    #[arg(long)]
    pub proxy: Option<String>,
}

pub fn run(args: RelayArgs) -> Result<()> {
    let payload = read_payload(&args)?;
    let tx_hex = payload.trim();
    hex::decode(tx_hex).context("payload is not valid hex")?;

    let book = PeerBook::from_addresses(args.nodes.iter().map(String::as_str))?;
    let mut relay = DaemonRelay::new(args.proxy.as_deref()).context("build relay client")?;

    println!(
        "[*] relaying {} bytes to {} node(s)",
        tx_hex.len() / 2,
        book.len()
    );
    let mut delivered = 0usize;
    for peer in &book {
        let url = peer.to_url();
        match relay.send_raw(&url, tx_hex) {
            Ok(()) => {
                delivered += 1;
                println!("[OK] accepted by {url}");
            }
            Err(err) => eprintln!("[WARN] {url}: {err}"),
        }
    }
    if delivered == 0 {
        bail!("no node accepted the transaction");
    }
    println!("[OK] delivered to {delivered}/{} node(s)", book.len());
    Ok(())
}

fn read_payload(args: &RelayArgs) -> Result<String> {
    match (&args.hex, &args.file) {
        (Some(hex), _) => Ok(hex.clone()),
        (None, Some(path)) => {
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
        }
        (None, None) => bail!("either --hex or --file is required"),
    }
}
