//! Redundant raw-transaction push, one endpoint at a time.

use daemon_rpc::{DaemonRpc, RpcError};

/// Placeholder target the client is built against; retargeted before every
/// send.
const INITIAL_TARGET: &str = "http://127.0.0.1:18081";

/// Broadcast seam. The session treats every send as best-effort: failures
/// are logged by the caller and never abort the surrounding loop.
pub trait TxRelay {
    /// Re-points the relay at `url`, then submits one raw signed
    /// transaction hex.
    fn send_raw(&mut self, url: &str, tx_hex: &str) -> Result<(), RpcError>;
}

/// [`TxRelay`] over the blocking daemon RPC client.
pub struct DaemonRelay {
    rpc: DaemonRpc,
}

impl DaemonRelay {
    /// `proxy` is a SOCKS URL (`socks5h://host:port`) when the push should
    /// ride the supervised proxy.
    pub fn new(proxy: Option<&str>) -> Result<Self, RpcError> {
        let rpc = match proxy {
            Some(proxy) => DaemonRpc::with_proxy(INITIAL_TARGET, None, proxy)?,
            None => DaemonRpc::new(INITIAL_TARGET, None)?,
        };
        Ok(DaemonRelay { rpc })
    }
}

impl TxRelay for DaemonRelay {
    fn send_raw(&mut self, url: &str, tx_hex: &str) -> Result<(), RpcError> {
        self.rpc.set_daemon_address(url)?;
        self.rpc.send_raw_transaction(tx_hex, false)?;
        Ok(())
    }
}
