use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use tor_service::{tor_version, SystemEnv, TorConfig, TorEvent, TorMode, TorService};

#[derive(Clone, Debug, Args)]
pub struct TorCli {
    #[command(subcommand)]
    pub command: TorCommands,
}

#[derive(Clone, Debug, Subcommand)]
pub enum TorCommands {
    /// Supervise a proxy in the foreground, streaming lifecycle events.
    Run(RunArgs),
    /// Print the version string a proxy binary reports.
    Version(VersionArgs),
}

#[derive(Clone, Debug, Args)]
pub struct RunArgs {
    /// Working directory for the proxy (materialized binary, state, pidfile).
    #[arg(long)]
    pub data_dir: PathBuf,

    /// Treat this SOCKS port as externally managed; never spawn.
    #[arg(long)]
    pub tor_port: Option<u16>,

    /// Prefer an already running proxy on the default port.
    #[arg(long, default_value_t = false)]
    pub use_local: bool,

    /// Proxy binary to spawn instead of the bundled one.
    #[arg(long)]
    pub binary: Option<PathBuf>,
}

#[derive(Clone, Debug, Args)]
pub struct VersionArgs {
    /// Proxy binary to query.
    #[arg(long)]
    pub binary: PathBuf,
}

pub fn run(args: TorCli) -> Result<()> {
    match args.command {
        TorCommands::Run(args) => run_foreground(args),
        TorCommands::Version(args) => run_version(args),
    }
}

/// Supervises until the proxy is gone for good or the user interrupts.
fn run_foreground(args: RunArgs) -> Result<()> {
    let config = TorConfig {
        data_dir: args.data_dir,
        override_port: args.tor_port,
        prefer_external: args.use_local,
        binary: args.binary,
        ..TorConfig::default()
    };
    let (service, events) = TorService::new(config, SystemEnv::detect());

    println!("[*] mode={:?} socks={}", service.mode(), service.address());
    if let Some(version) = service.version() {
        println!("[*] {version}");
    }
    service.start()?;
    if service.mode() == TorMode::External {
        println!("[OK] tracking externally managed proxy at {}", service.address());
    }

    for event in events {
        match event {
            TorEvent::Started { pid } => println!("[OK] proxy running, pid={pid}"),
            TorEvent::ConnectionState { connected: true } => println!("[OK] proxy reachable"),
            TorEvent::ConnectionState { connected: false } => println!("[*] proxy not reachable"),
            TorEvent::Log(line) => println!("    {line}"),
            TorEvent::Stopped => println!("[*] proxy exited"),
            TorEvent::Error(message) => {
                eprintln!("[WARN] {message}");
                // Errors during the startup decision leave the service in
                // external mode and are advisory. In a spawn mode with no
                // live child the supervisor has given up.
                if service.mode() != TorMode::External && !service.is_running() {
                    return Err(anyhow!("proxy supervision ended: {message}"));
                }
            }
        }
    }
    Ok(())
}

fn run_version(args: VersionArgs) -> Result<()> {
    let version = tor_version(&args.binary)
        .ok_or_else(|| anyhow!("{} did not report a version", args.binary.display()))?;
    println!("{version}");
    Ok(())
}
