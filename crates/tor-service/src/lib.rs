//! tor-service
//!
//! Supervises the local Tor SOCKS proxy a wallet routes its daemon traffic
//! through. The service decides once, at construction, how the proxy is
//! managed (an externally run instance, an explicitly configured binary, or
//! the bundled binary materialized on disk), then owns the full process
//! lifecycle for the spawn modes: merged output capture with bootstrap
//! detection, crash-triggered restarts with a hard retry bound, and a
//! deliberate-stop path that never restarts.
//!
//! Reachability is published as [`TorEvent::ConnectionState`] on a channel.
//! Publications are idempotent: the prober re-announces the current belief
//! every tick and consumers are expected to treat duplicates as no-ops.

mod binary;
mod config;
mod torrc;

pub use binary::{materialize_binary, BUNDLE_ENV};
pub use config::{SystemEnv, TorConfig, TorMode};
pub use torrc::{peer_from_config, tor_version};

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use peers::{NetProbe, Peer, Probe};
use thiserror::Error;

pub const DEFAULT_SOCKS_HOST: &str = "127.0.0.1";
pub const DEFAULT_SOCKS_PORT: u16 = 9050;
/// Port self-spawned instances bind, off the default so a user-run proxy on
/// 9050 is never clobbered.
pub const EMBEDDED_SOCKS_PORT: u16 = 19450;
/// Literal line fragment the proxy prints when its bootstrap completes.
pub const BOOTSTRAP_MARKER: &str = "Bootstrapped 100%";
/// Start attempts allowed before the supervisor gives up for good.
pub const MAX_RESTARTS: u32 = 4;
/// Pause between a detected crash and the automatic restart.
pub const RESTART_DELAY: Duration = Duration::from_secs(1);
/// Interval between reachability probes.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(5);

const LOG_TAIL: usize = 500;
const EXIT_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum TorError {
    #[error("proxy is already running or starting")]
    AlreadyRunning,
    #[error("cannot bind {0}: port already in use")]
    PortInUse(String),
    #[error("proxy failed to start: maximum retries exceeded")]
    RetriesExceeded,
    #[error("proxy binary {path} failed to start: {message}")]
    SpawnFailed { path: PathBuf, message: String },
    #[error("no proxy binary available: {0}")]
    NoBinary(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Everything the supervisor and prober publish.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TorEvent {
    /// Current reachability belief. Republished every probe tick and on
    /// bootstrap/exit; consecutive duplicates carry no extra side effects.
    ConnectionState { connected: bool },
    /// One captured line of proxy output, already appended to the log tail.
    Log(String),
    /// The proxy process came up.
    Started { pid: u32 },
    /// The proxy process is gone, whether deliberately stopped or crashed.
    Stopped,
    /// A lifecycle failure worth surfacing to the user.
    Error(String),
}

#[derive(Default)]
struct SupervisorState {
    child: Option<Child>,
    connected: bool,
    restarts: u32,
    last_error: Option<String>,
    /// The binary itself would not start; automatic restarts are pointless.
    start_failed: bool,
    /// Deliberate stop in progress; the exit monitor must not restart.
    shutdown: bool,
    /// A prober loop is alive; `start` must not spawn a second one.
    prober_started: bool,
    logs: VecDeque<String>,
}

/// Proxy supervisor handle. Cheap to clone; all clones share state, and the
/// output readers and exit monitor run on clones.
#[derive(Clone)]
pub struct TorService {
    mode: TorMode,
    binary: Option<PathBuf>,
    host: String,
    port: u16,
    data_dir: PathBuf,
    probe_interval: Duration,
    env: SystemEnv,
    probe: Arc<dyn Probe>,
    state: Arc<Mutex<SupervisorState>>,
    events: Sender<TorEvent>,
}

impl TorService {
    pub fn new(config: TorConfig, env: SystemEnv) -> (Self, Receiver<TorEvent>) {
        Self::with_probe(config, env, Arc::new(NetProbe))
    }

    pub fn with_probe(
        config: TorConfig,
        env: SystemEnv,
        probe: Arc<dyn Probe>,
    ) -> (Self, Receiver<TorEvent>) {
        let (events, receiver) = unbounded();
        let mut service = TorService {
            mode: TorMode::External,
            binary: None,
            host: config.host.clone(),
            port: config.port,
            data_dir: config.data_dir.clone(),
            probe_interval: config.probe_interval,
            env,
            probe,
            state: Arc::new(Mutex::new(SupervisorState::default())),
            events,
        };
        service.decide(&config);
        (service, receiver)
    }

    /// Startup decision: how the proxy will be managed. Evaluated once,
    /// first match wins.
    fn decide(&mut self, config: &TorConfig) {
        // An explicit override port is externally managed, always. Record an
        // error when nothing answers there, but never take over.
        if let Some(port) = config.override_port {
            self.port = port;
            log::info!("using external proxy on override port {port}");
            if !self.probe.port_open(&self.host, port) {
                self.record_error(format!(
                    "override port {port} was given but no running proxy was found on it"
                ));
            }
            return;
        }

        // An instance someone else runs: requested outright, implied by a
        // wrapper environment, or the default port already answers.
        if config.prefer_external && !self.probe.port_open(&self.host, self.port) {
            self.record_error("local proxy preferred but no running instance found".into());
        }
        if config.prefer_external
            || self.env.forces_external()
            || self.probe.port_open(&self.host, self.port)
        {
            log::info!("using external proxy on {}", self.address());
            return;
        }

        // Resolve something to spawn: an explicit binary, or the bundled one
        // materialized into the data directory.
        let resolved = match &config.binary {
            Some(path) if path.is_file() => Some((TorMode::SpawnLocal, path.clone())),
            Some(path) => {
                log::warn!("configured proxy binary {} not found", path.display());
                None
            }
            None => match binary::materialize_binary(&self.data_dir) {
                Ok(path) => Some((TorMode::SpawnEmbedded, path)),
                Err(err) => {
                    log::warn!("bundled proxy unavailable: {err}");
                    None
                }
            },
        };
        let Some((mode, path)) = resolved else {
            self.record_error("no usable proxy binary, assuming an external instance".into());
            return;
        };

        // Spawn off the default port. If something already listens there,
        // another instance of us owns it; track that one instead.
        self.port = config.spawn_port;
        if self.probe.port_open(&self.host, self.port) {
            log::info!("port {} already bound, using that instance", self.port);
            return;
        }

        self.mode = mode;
        self.binary = Some(path);
        log::info!("will spawn proxy on {}", self.address());
    }

    // ---- lifecycle ----

    /// Starts managing the proxy and begins periodic reachability probing.
    /// For external mode nothing is ever spawned; the first evaluation runs
    /// immediately. For the spawn modes this launches the process, subject
    /// to the retry bound. Only this entry point re-arms supervision after a
    /// [`TorService::stop`].
    pub fn start(&self) -> Result<(), TorError> {
        self.state.lock().shutdown = false;
        if self.mode == TorMode::External {
            self.probe_tick();
        } else {
            self.spawn_proxy()?;
        }
        self.ensure_prober();
        Ok(())
    }

    /// Deliberate shutdown. Sets the flag the exit monitor checks, so the
    /// process going away is not mistaken for a crash, then kills and reaps.
    pub fn stop(&self) {
        let child = {
            let mut state = self.state.lock();
            state.shutdown = true;
            state.child.take()
        };
        if let Some(mut child) = child {
            log::debug!("stopping proxy (pid {})", child.id());
            if let Err(err) = child.kill() {
                log::warn!("failed to kill proxy: {err}");
            }
            let _ = child.wait();
            self.set_connection_state(false);
            self.send(TorEvent::Stopped);
        }
    }

    fn spawn_proxy(&self) -> Result<(), TorError> {
        let Some(binary) = self.binary.clone() else {
            return Err(TorError::NoBinary("no binary resolved at startup".into()));
        };

        let mut state = self.state.lock();
        if state.shutdown {
            // A stop that landed while a restart was pending wins.
            return Ok(());
        }
        if state.child.is_some() {
            let err = TorError::AlreadyRunning;
            state.last_error = Some(err.to_string());
            return Err(err);
        }
        if self.probe.port_open(&self.host, self.port) {
            let err = TorError::PortInUse(self.address());
            state.last_error = Some(err.to_string());
            return Err(err);
        }
        if state.restarts >= MAX_RESTARTS {
            let err = TorError::RetriesExceeded;
            state.last_error = Some(err.to_string());
            drop(state);
            self.send(TorEvent::Error(TorError::RetriesExceeded.to_string()));
            return Err(err);
        }
        state.restarts += 1;

        let proc_dir = self.data_dir.join("data");
        std::fs::create_dir_all(&proc_dir)?;
        let mut command = Command::new(&binary);
        command
            .arg("--ignore-missing-torrc")
            .arg("--SocksPort")
            .arg(self.address())
            .arg("--TruncateLogFile")
            .arg("1")
            .arg("--DataDirectory")
            .arg(&proc_dir)
            .arg("--Log")
            .arg("notice")
            .arg("--pidfile")
            .arg(proc_dir.join("tor.pid"))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        arm_parent_death_signal(&mut command);

        log::debug!("starting proxy: {} (attempt {})", binary.display(), state.restarts);
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                state.start_failed = true;
                let err = TorError::SpawnFailed {
                    path: binary,
                    message: err.to_string(),
                };
                state.last_error = Some(err.to_string());
                drop(state);
                self.send(TorEvent::Error(err.to_string()));
                return Err(err);
            }
        };

        let pid = child.id();
        self.spawn_output_readers(&mut child);
        state.child = Some(child);
        drop(state);

        self.send(TorEvent::Started { pid });
        self.spawn_exit_monitor();
        Ok(())
    }

    fn spawn_output_readers(&self, child: &mut Child) {
        if let Some(stdout) = child.stdout.take() {
            self.spawn_reader(stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            self.spawn_reader(stderr);
        }
    }

    fn spawn_reader<R: Read + Send + 'static>(&self, stream: R) {
        let service = self.clone();
        thread::spawn(move || {
            let reader = BufReader::new(stream);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                service.append_log(line);
            }
        });
    }

    /// Appends one captured line to the log tail, notifies, and scans for
    /// the bootstrap marker.
    fn append_log(&self, line: String) {
        {
            let mut state = self.state.lock();
            state.logs.push_back(line.clone());
            if state.logs.len() > LOG_TAIL {
                state.logs.pop_front();
            }
        }
        let bootstrapped = line.contains(BOOTSTRAP_MARKER);
        self.send(TorEvent::Log(line));
        if bootstrapped {
            log::debug!("proxy bootstrap complete");
            self.set_connection_state(true);
        }
    }

    /// Polls the child until it exits, then runs the restart policy: nothing
    /// on deliberate shutdown or an unstartable binary, otherwise one
    /// delayed attempt (the retry bound lives in `spawn_proxy`).
    fn spawn_exit_monitor(&self) {
        let service = self.clone();
        thread::spawn(move || loop {
            thread::sleep(EXIT_POLL);
            let status = {
                let mut state = service.state.lock();
                if state.shutdown {
                    return;
                }
                let Some(child) = state.child.as_mut() else {
                    return;
                };
                match child.try_wait() {
                    Ok(None) => None,
                    Ok(Some(status)) => {
                        state.child = None;
                        Some(status)
                    }
                    Err(err) => {
                        log::warn!("proxy status poll failed: {err}");
                        return;
                    }
                }
            };
            let Some(status) = status else { continue };

            log::warn!("proxy exited unexpectedly: {status}");
            service.set_connection_state(false);
            service.send(TorEvent::Stopped);
            if service.state.lock().start_failed {
                return;
            }
            thread::sleep(RESTART_DELAY);
            // Shutdown may have been requested during the delay.
            if service.state.lock().shutdown {
                return;
            }
            if let Err(err) = service.spawn_proxy() {
                log::warn!("proxy restart failed: {err}");
            }
            return;
        });
    }

    // ---- reachability ----

    /// One prober evaluation, published idempotently. Wrapper environments
    /// trump everything: under torsocks or on Whonix the proxy is a given,
    /// on Tails systemd knows, and only otherwise is the port probed.
    pub fn probe_tick(&self) {
        let connected = if self.env.torsocks || self.env.whonix {
            true
        } else if self.env.tails {
            tails_bootstrap_complete()
        } else {
            self.probe.port_open(&self.host, self.port)
        };
        self.set_connection_state(connected);
    }

    /// Blocking prober loop; returns once [`TorService::stop`] has run.
    pub fn run_prober(&self, interval: Duration) {
        loop {
            if self.state.lock().shutdown {
                break;
            }
            self.probe_tick();
            thread::sleep(interval);
        }
        self.state.lock().prober_started = false;
    }

    /// Spawns the prober loop once; calls while one is alive are no-ops.
    fn ensure_prober(&self) {
        {
            let mut state = self.state.lock();
            if state.prober_started {
                return;
            }
            state.prober_started = true;
        }
        let service = self.clone();
        let interval = self.probe_interval;
        thread::spawn(move || service.run_prober(interval));
    }

    // ---- accessors ----

    pub fn mode(&self) -> TorMode {
        self.mode
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Whether a spawned proxy process is currently alive. Always false in
    /// external mode.
    pub fn is_running(&self) -> bool {
        self.state.lock().child.is_some()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    pub fn restart_count(&self) -> u32 {
        self.state.lock().restarts
    }

    pub fn log_tail(&self) -> Vec<String> {
        self.state.lock().logs.iter().cloned().collect()
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn socks_peer(&self) -> Peer {
        Peer::new(self.host.as_str(), self.port)
    }

    /// `socks5h` keeps hostname resolution on the proxy side, which onion
    /// endpoints require.
    pub fn proxy_url(&self) -> String {
        format!("socks5h://{}:{}", self.host, self.port)
    }

    /// Version line of the managed binary, when there is one to ask.
    pub fn version(&self) -> Option<String> {
        self.binary.as_deref().and_then(torrc::tor_version)
    }

    fn record_error(&self, message: String) {
        log::warn!("{message}");
        self.state.lock().last_error = Some(message.clone());
        self.send(TorEvent::Error(message));
    }

    fn set_connection_state(&self, connected: bool) {
        self.state.lock().connected = connected;
        self.send(TorEvent::ConnectionState { connected });
    }

    fn send(&self, event: TorEvent) {
        // Nobody listening is fine; supervision carries on regardless.
        let _ = self.events.send(event);
    }
}

fn tails_bootstrap_complete() -> bool {
    Command::new("/bin/systemctl")
        .args(["--quiet", "is-active", "tails-tor-has-bootstrapped.target"])
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(target_os = "linux")]
fn arm_parent_death_signal(command: &mut Command) {
    use std::os::unix::process::CommandExt;

    // The proxy must not outlive us if the wallet dies without cleanup.
    unsafe {
        command.pre_exec(|| {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(target_os = "linux"))]
fn arm_parent_death_signal(_command: &mut Command) {}
