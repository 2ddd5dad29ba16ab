mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "plume", about = "Plume wallet proxy and relay tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Proxy supervision (foreground run, binary version query).
    Tor(commands::tor::TorCli),
    /// Resolve the SOCKS endpoint a torrc file configures and probe it.
    TorrcPeer(commands::torrc_peer::TorrcPeerArgs),
    /// TCP-probe a host:port endpoint.
    Probe(commands::probe::ProbeArgs),
    /// Push a raw signed transaction to one or more daemon endpoints.
    Relay(commands::relay::RelayArgs),
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Tor(args) => commands::tor::run(args),
        Commands::TorrcPeer(args) => commands::torrc_peer::run(args),
        Commands::Probe(args) => commands::probe::run(args),
        Commands::Relay(args) => commands::relay::run(args),
    };
    if let Err(err) = result {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}
