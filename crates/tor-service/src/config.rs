use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_SOCKS_HOST, DEFAULT_SOCKS_PORT, EMBEDDED_SOCKS_PORT, PROBE_INTERVAL};

/// How the service relates to the proxy process after the startup decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TorMode {
    /// An instance run by someone else (system tor, torsocks wrapper,
    /// override port). Never spawned, never restarted; reachability is
    /// tracked by the prober only.
    External,
    /// Spawn an explicitly configured binary.
    SpawnLocal,
    /// Spawn the bundled binary after materializing it into the data
    /// directory.
    SpawnEmbedded,
}

/// Supervisor configuration. Injected at construction; the service keeps no
/// process-wide state.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TorConfig {
    /// Working directory for the proxy: the materialized binary lands here,
    /// its state under `data/`.
    pub data_dir: PathBuf,
    /// SOCKS bind host.
    pub host: String,
    /// SOCKS port an externally managed instance is expected on.
    pub port: u16,
    /// SOCKS port a self-spawned instance binds. Off the default so a
    /// user-run proxy on [`DEFAULT_SOCKS_PORT`] is never clobbered.
    pub spawn_port: u16,
    /// Treat the proxy as externally managed on exactly this port. The
    /// service will never spawn anything when set.
    pub override_port: Option<u16>,
    /// Prefer an already-running local instance over spawning one.
    pub prefer_external: bool,
    /// Explicit proxy binary, bypassing the bundled one.
    pub binary: Option<PathBuf>,
    /// Interval of the reachability probe loop `start` launches.
    pub probe_interval: Duration,
}

impl Default for TorConfig {
    fn default() -> Self {
        TorConfig {
            data_dir: PathBuf::from("tor"),
            host: DEFAULT_SOCKS_HOST.to_string(),
            port: DEFAULT_SOCKS_PORT,
            spawn_port: EMBEDDED_SOCKS_PORT,
            override_port: None,
            prefer_external: false,
            binary: None,
            probe_interval: PROBE_INTERVAL,
        }
    }
}

/// Host-environment facts that force the proxy decision one way or another.
/// Detected once at startup and injected, so tests can fabricate any
/// combination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemEnv {
    /// The process was launched under a torsocks-style wrapper; localhost
    /// probes are meaningless because all traffic is already proxied.
    pub torsocks: bool,
    /// Whonix workstation: the gateway anonymizes everything.
    pub whonix: bool,
    /// Tails: the system tor is managed by the OS and its bootstrap state is
    /// queried through systemd.
    pub tails: bool,
}

impl SystemEnv {
    pub fn detect() -> Self {
        let torsocks = env::var("LD_PRELOAD")
            .map(|v| v.contains("torsocks"))
            .unwrap_or(false);
        let whonix = Path::new("/usr/share/anon-ws-base-files/workstation").exists();
        let tails = fs::read_to_string("/etc/os-release")
            .map(|contents| contents.contains("TAILS_PRODUCT_NAME"))
            .unwrap_or(false);
        SystemEnv {
            torsocks,
            whonix,
            tails,
        }
    }

    /// True when any environment fact forces external mode.
    pub fn forces_external(&self) -> bool {
        self.torsocks || self.whonix || self.tails
    }
}
