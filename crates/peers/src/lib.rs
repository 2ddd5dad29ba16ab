//! Known daemon relay endpoints and reachability probing.
//!
//! A [`Peer`] is a transient host/port pair with a probed reachability flag;
//! nothing here is persisted. The [`PeerBook`] is the read-only directory the
//! broadcast path iterates, and [`Probe`] is the seam through which both the
//! proxy supervisor and the directory check whether a TCP endpoint accepts
//! connections.

use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on a single reachability check. Probes run on timers and at
/// interactive startup, so they must fail fast.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(400);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeerParseError {
    #[error("empty peer address")]
    Empty,
    #[error("invalid port in peer address `{0}`")]
    InvalidPort(String),
}

/// A single relay endpoint. Reachability is recomputed on every probe and
/// never trusted across probes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub host: String,
    pub port: u16,
    #[serde(skip)]
    pub is_reachable: bool,
}

impl Peer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Peer {
            host: host.into(),
            port,
            is_reachable: false,
        }
    }

    /// Parses a `host:port` string. The port is mandatory here; callers with
    /// a default port in hand (torrc parsing) split on their own.
    pub fn parse(s: &str) -> Result<Self, PeerParseError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PeerParseError::Empty);
        }
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| PeerParseError::InvalidPort(s.to_string()))?;
        if host.is_empty() {
            return Err(PeerParseError::Empty);
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| PeerParseError::InvalidPort(s.to_string()))?;
        Ok(Peer::new(host, port))
    }

    /// `host:port`, the form the SOCKS bind argument and log lines use.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Full HTTP URL for RPC clients targeting this peer.
    pub fn to_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Reachability check seam. The production implementation opens a real TCP
/// connection; tests substitute canned answers.
pub trait Probe: Send + Sync {
    fn port_open(&self, host: &str, port: u16) -> bool;
}

/// TCP connect probe with a short timeout.
#[derive(Clone, Copy, Debug, Default)]
pub struct NetProbe;

impl Probe for NetProbe {
    fn port_open(&self, host: &str, port: u16) -> bool {
        port_open(host, port, PROBE_TIMEOUT)
    }
}

/// True when a TCP connection to `host:port` succeeds within `timeout`.
/// Resolution failures count as unreachable.
pub fn port_open(host: &str, port: u16, timeout: Duration) -> bool {
    let addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(_) => return false,
    };
    for addr in addrs {
        if TcpStream::connect_timeout(&addr, timeout).is_ok() {
            return true;
        }
    }
    false
}

/// The set of known relay endpoints. Read-only for consumers; only
/// [`PeerBook::refresh`] rewrites reachability.
#[derive(Clone, Debug, Default)]
pub struct PeerBook {
    peers: Vec<Peer>,
}

impl PeerBook {
    pub fn new(peers: Vec<Peer>) -> Self {
        PeerBook { peers }
    }

    pub fn from_addresses<I, S>(addresses: I) -> Result<Self, PeerParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let peers = addresses
            .into_iter()
            .map(|a| Peer::parse(a.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PeerBook { peers })
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Re-probes every peer and rewrites its reachability flag.
    pub fn refresh(&mut self, probe: &dyn Probe) {
        for peer in &mut self.peers {
            peer.is_reachable = probe.port_open(&peer.host, peer.port);
            log::debug!("peer {} reachable={}", peer, peer.is_reachable);
        }
    }

    pub fn reachable(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter().filter(|p| p.is_reachable)
    }
}

impl<'a> IntoIterator for &'a PeerBook {
    type Item = &'a Peer;
    type IntoIter = std::slice::Iter<'a, Peer>;

    fn into_iter(self) -> Self::IntoIter {
        self.peers.iter()
    }
}
