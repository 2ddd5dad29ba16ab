//! Reading the SOCKS endpoint out of a system torrc, plus the binary
//! version query.

use std::path::Path;
use std::process::Command;

use once_cell::sync::Lazy;
use peers::{Peer, Probe};
use regex::Regex;

use crate::{DEFAULT_SOCKS_HOST, DEFAULT_SOCKS_PORT};

/// First line of `tor --version` output starts with this.
const VERSION_PREFIX: &str = "Tor version";

static SOCKS_PORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^SocksPort ([0-9.:]+)").expect("socks port pattern"));

/// Extracts the SOCKS endpoint from the torrc at `path`.
///
/// The first `SocksPort` directive wins: `host:port` yields both fields, a
/// bare port keeps the default host. Lines whose port fragment does not
/// parse are skipped and the scan continues. A missing or directive-less
/// file yields the compiled-in default endpoint. Reachability is always
/// established by a live probe, never assumed.
pub fn peer_from_config(path: &Path, probe: &dyn Probe) -> Peer {
    let mut peer = Peer::new(DEFAULT_SOCKS_HOST, DEFAULT_SOCKS_PORT);

    if let Ok(contents) = std::fs::read_to_string(path) {
        for line in contents.lines() {
            let Some(captures) = SOCKS_PORT_RE.captures(line) else {
                continue;
            };
            let value = &captures[1];
            if let Some((host, port)) = value.split_once(':') {
                if host.is_empty() {
                    continue;
                }
                let Ok(port) = port.parse::<u16>() else {
                    continue;
                };
                peer.host = host.to_string();
                peer.port = port;
                log::debug!("torrc SocksPort endpoint {}:{}", peer.host, peer.port);
                break;
            }
            if let Ok(port) = value.parse::<u16>() {
                peer.port = port;
                log::debug!("torrc SocksPort {port}");
                break;
            }
        }
    }

    peer.is_reachable = probe.port_open(&peer.host, peer.port);
    peer
}

/// Runs `binary --version` and returns the first output line, provided it
/// carries the expected prefix. Anything else is unparseable and yields
/// `None`.
pub fn tor_version(binary: &Path) -> Option<String> {
    let output = match Command::new(binary).arg("--version").output() {
        Ok(output) => output,
        Err(err) => {
            log::warn!("could not run {}: {err}", binary.display());
            return None;
        }
    };
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout.lines().next().unwrap_or("").trim();
    if first.starts_with(VERSION_PREFIX) {
        Some(first.to_string())
    } else {
        log::warn!("unrecognized proxy version output: {first:?}");
        None
    }
}
