//! daemon-rpc
//!
//! Minimal, blocking HTTP client for the public endpoints of a Monero-style
//! daemon. Endpoints used:
//! - GET  /get_height
//! - POST /json_rpc              (method: "get_info")
//! - POST /sendrawtransaction
//!
//! The client is retargetable: [`DaemonRpc::set_daemon_address`] swaps the
//! base URL in place, which the multi-broadcast path uses to re-point the
//! same client at each known peer immediately before each submission. An
//! optional SOCKS5h proxy routes all daemon traffic through a local Tor
//! endpoint.

use base64::{engine::general_purpose, Engine as _};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("url parse: {0}")]
    Url(#[from] url::ParseError),
    #[error("daemon returned error: {0}")]
    Node(String),
    #[error("decode error: {0}")]
    Decode(String),
}

#[derive(Clone)]
pub struct DaemonRpc {
    base: Url,
    client: Client,
    auth_header: Option<HeaderValue>,
}

impl DaemonRpc {
    /// Create a new client. `base` like "http://127.0.0.1:18081".
    /// Optional basic auth via (user, pass); if None, no Authorization
    /// header is sent.
    pub fn new(base: &str, auth: Option<(String, String)>) -> Result<Self, RpcError> {
        Self::build(base, auth, None)
    }

    /// Like [`DaemonRpc::new`] but with every request routed through a SOCKS
    /// proxy, e.g. "socks5h://127.0.0.1:9050". The `socks5h` scheme keeps
    /// hostname resolution on the proxy side, which onion endpoints require.
    pub fn with_proxy(
        base: &str,
        auth: Option<(String, String)>,
        proxy: &str,
    ) -> Result<Self, RpcError> {
        Self::build(base, auth, Some(proxy))
    }

    fn build(
        base: &str,
        auth: Option<(String, String)>,
        proxy: Option<&str>,
    ) -> Result<Self, RpcError> {
        let base = Url::parse(base)?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(20))
            .default_headers(headers);
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        let client = builder.build()?;

        let auth_header = match auth {
            Some((user, pass)) => {
                let token = format!("{user}:{pass}");
                let enc = general_purpose::STANDARD.encode(token);
                let header_value = HeaderValue::from_str(&format!("Basic {}", enc))
                    .map_err(|e| RpcError::Decode(format!("auth header encode: {e}")))?;
                Some(header_value)
            }
            None => None,
        };

        Ok(Self {
            base,
            client,
            auth_header,
        })
    }

    /// Re-points the client at a different daemon. Connection pool, timeout,
    /// proxying, and auth are kept as configured.
    pub fn set_daemon_address(&mut self, base: &str) -> Result<(), RpcError> {
        self.base = Url::parse(base)?;
        Ok(())
    }

    pub fn daemon_address(&self) -> &str {
        self.base.as_str()
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut h = HeaderMap::new();
        if let Some(a) = &self.auth_header {
            h.insert(AUTHORIZATION, a.clone());
        }
        h
    }

    fn json_rpc<P, R>(&self, method: &str, params: Option<&P>) -> Result<R, RpcError>
    where
        P: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        #[derive(Serialize)]
        struct Request<'a, T> {
            jsonrpc: &'a str,
            id: &'a str,
            method: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            params: Option<&'a T>,
        }

        #[derive(Deserialize)]
        struct Envelope<T> {
            result: Option<T>,
            error: Option<RpcErrorDetail>,
        }

        #[derive(Deserialize)]
        struct RpcErrorDetail {
            code: i64,
            message: String,
        }

        let url = self.base.join("/json_rpc")?;
        let request = Request {
            jsonrpc: "2.0",
            id: "0",
            method,
            params,
        };

        let resp = self
            .client
            .post(url)
            .headers(self.auth_headers())
            .json(&request)
            .send()?;
        if !resp.status().is_success() {
            return Err(RpcError::Node(format!("{method} HTTP {}", resp.status())));
        }
        let envelope: Envelope<R> = resp.json()?;
        if let Some(err) = envelope.error {
            return Err(RpcError::Node(format!(
                "{method} error code={} message={}",
                err.code, err.message
            )));
        }
        envelope
            .result
            .ok_or_else(|| RpcError::Node(format!("{method} missing result")))
    }

    /// GET /get_height
    pub fn get_height(&self) -> Result<u64, RpcError> {
        let url = self.base.join("/get_height")?;
        #[derive(Deserialize)]
        struct R {
            height: u64,
        }
        let resp = self.client.get(url).headers(self.auth_headers()).send()?;
        if !resp.status().is_success() {
            return Err(RpcError::Node(format!("get_height HTTP {}", resp.status())));
        }
        let r: R = resp.json()?;
        Ok(r.height)
    }

    /// POST /json_rpc { method: "get_info" }
    pub fn get_info(&self) -> Result<GetInfo, RpcError> {
        self.json_rpc::<(), GetInfo>("get_info", None)
    }

    /// POST /sendrawtransaction
    ///
    /// `tx_hex` is an already hex-encoded signed transaction blob, submitted
    /// verbatim. Returns acceptance info; a status other than "OK"/"Accepted"
    /// maps to [`RpcError::Node`] with the daemon's rejection reason.
    pub fn send_raw_transaction(
        &self,
        tx_hex: &str,
        do_not_relay: bool,
    ) -> Result<SubmitResult, RpcError> {
        let url = self.base.join("/sendrawtransaction")?;
        #[derive(Serialize)]
        struct Req<'a> {
            tx_as_hex: &'a str,
            do_not_relay: bool,
        }
        let body = Req {
            tx_as_hex: tx_hex,
            do_not_relay,
        };
        let resp = self
            .client
            .post(url)
            .headers(self.auth_headers())
            .json(&body)
            .send()?;
        if !resp.status().is_success() {
            return Err(RpcError::Node(format!(
                "sendrawtransaction HTTP {}",
                resp.status()
            )));
        }
        // Parse the entire JSON response so the rejection flags survive for
        // logging even when fields are missing or unexpected.
        let val: Value = resp.json()?;
        let parsed: SubmitResult = serde_json::from_value(val.clone())
            .map_err(|e| RpcError::Decode(format!("sendrawtransaction decode: {e}")))?;
        if parsed.status != "OK" && parsed.status != "Accepted" {
            return Err(RpcError::Node(format!(
                "submit failed status={} reason={} raw={}",
                parsed.status,
                parsed.reason.clone().unwrap_or_default(),
                val
            )));
        }
        Ok(parsed)
    }
}

/// Partial `get_info` result (fields we commonly use).
#[derive(Debug, Deserialize)]
pub struct GetInfo {
    pub height: Option<u64>,
    pub target_height: Option<u64>,
    pub synchronized: Option<bool>,
    pub nettype: Option<String>,
}

/// `/sendrawtransaction` acceptance info, including the daemon's individual
/// rejection flags.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SubmitResult {
    pub status: String,
    pub reason: Option<String>,
    pub not_relayed: bool,
    pub double_spend: bool,
    pub fee_too_low: bool,
    pub invalid_input: bool,
    pub invalid_output: bool,
    pub too_big: bool,
    pub overspend: bool,
}
