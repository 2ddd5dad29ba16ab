//! Recording fakes for the session's three seams.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crossbeam_channel::Receiver;
use daemon_rpc::RpcError;
use peers::PeerBook;
use wallet_session::{
    PendingTransfer, SessionConfig, SessionEvent, Settings, TransferRequest, TxRelay,
    WalletBackend, WalletSession,
};

#[derive(Clone, Debug, PartialEq)]
pub enum BackendCall {
    Create(TransferRequest),
    Commit { txids: Vec<String>, description: String },
    Dispose(PendingTransfer),
    Store,
    RefreshHistory(u32),
    RefreshCoins(u32),
    RefreshUnlockedCoins,
    RefreshSubaddresses(u32),
}

/// Wallet-library fake. Flags live behind `Arc` so a test can flip them
/// after the session has taken ownership of its clone.
#[derive(Clone)]
pub struct MockBackend {
    pub balance: u64,
    pub unlocked: u64,
    pub primary: String,
    pub synchronized_once: Arc<Mutex<bool>>,
    pub is_synchronized: Arc<Mutex<bool>>,
    pub subaddresses_ok: Arc<Mutex<bool>>,
    pub cache: Arc<Mutex<HashMap<String, String>>>,
    pub calls: Arc<Mutex<Vec<BackendCall>>>,
}

#[allow(dead_code)]
impl MockBackend {
    pub fn new(balance: u64, unlocked: u64) -> Self {
        MockBackend {
            balance,
            unlocked,
            primary: "primary-address".to_string(),
            synchronized_once: Arc::new(Mutex::new(false)),
            is_synchronized: Arc::new(Mutex::new(false)),
            subaddresses_ok: Arc::new(Mutex::new(true)),
            cache: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_synchronized_once(&self, value: bool) {
        *self.synchronized_once.lock().unwrap() = value;
    }

    pub fn set_is_synchronized(&self, value: bool) {
        *self.is_synchronized.lock().unwrap() = value;
    }

    pub fn set_subaddresses_ok(&self, value: bool) {
        *self.subaddresses_ok.lock().unwrap() = value;
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn creates(&self) -> Vec<TransferRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Create(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn store_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, BackendCall::Store))
            .count()
    }

    pub fn cached(&self, key: &str) -> Option<String> {
        self.cache.lock().unwrap().get(key).cloned()
    }

    pub fn seed_cache(&self, key: &str, value: &str) {
        self.cache
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl WalletBackend for MockBackend {
    fn balance(&self) -> u64 {
        self.balance
    }

    fn unlocked_balance(&self) -> u64 {
        self.unlocked
    }

    fn primary_address(&self) -> String {
        self.primary.clone()
    }

    fn synchronized_once(&self) -> bool {
        *self.synchronized_once.lock().unwrap()
    }

    fn is_synchronized(&self) -> bool {
        *self.is_synchronized.lock().unwrap()
    }

    fn create_transaction(&self, request: TransferRequest) {
        self.record(BackendCall::Create(request));
    }

    fn commit_transaction(&self, tx: &PendingTransfer, description: &str) {
        self.record(BackendCall::Commit {
            txids: tx.txids.clone(),
            description: description.to_string(),
        });
    }

    fn dispose_transaction(&self, tx: PendingTransfer) {
        self.record(BackendCall::Dispose(tx));
    }

    fn store(&self) {
        self.record(BackendCall::Store);
    }

    fn set_cache_attribute(&self, key: &str, value: &str) -> bool {
        self.cache
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        true
    }

    fn cache_attribute(&self, key: &str) -> Option<String> {
        self.cached(key)
    }

    fn refresh_history(&self, account: u32) {
        self.record(BackendCall::RefreshHistory(account));
    }

    fn refresh_coins(&self, account: u32) {
        self.record(BackendCall::RefreshCoins(account));
    }

    fn refresh_unlocked_coins(&self) {
        self.record(BackendCall::RefreshUnlockedCoins);
    }

    fn refresh_subaddresses(&self, account: u32) -> bool {
        self.record(BackendCall::RefreshSubaddresses(account));
        *self.subaddresses_ok.lock().unwrap()
    }
}

/// Relay fake recording every (url, hex) pair, optionally refusing all of
/// them.
#[derive(Clone, Default)]
pub struct MockRelay {
    pub sent: Arc<Mutex<Vec<(String, String)>>>,
    pub fail: bool,
}

#[allow(dead_code)]
impl MockRelay {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl TxRelay for MockRelay {
    fn send_raw(&mut self, url: &str, tx_hex: &str) -> Result<(), RpcError> {
        self.sent
            .lock()
            .unwrap()
            .push((url.to_string(), tx_hex.to_string()));
        if self.fail {
            Err(RpcError::Node("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[derive(Clone)]
pub struct MockSettings {
    pub multi_broadcast: bool,
    pub reminder_disabled: Arc<Mutex<u32>>,
}

#[allow(dead_code)]
impl MockSettings {
    pub fn new(multi_broadcast: bool) -> Self {
        MockSettings {
            multi_broadcast,
            reminder_disabled: Arc::new(Mutex::new(0)),
        }
    }

    pub fn reminder_disabled_count(&self) -> u32 {
        *self.reminder_disabled.lock().unwrap()
    }
}

impl Settings for MockSettings {
    fn multi_broadcast(&self) -> bool {
        self.multi_broadcast
    }

    fn disable_donation_reminder(&self) {
        *self.reminder_disabled.lock().unwrap() += 1;
    }
}

pub type TestSession = WalletSession<MockBackend, MockSettings, MockRelay>;

pub struct Harness {
    pub backend: MockBackend,
    pub settings: MockSettings,
    pub relay: MockRelay,
    pub session: TestSession,
    pub events: Receiver<SessionEvent>,
}

/// Two-peer harness with multi-broadcast enabled and default config.
#[allow(dead_code)]
pub fn harness(balance: u64, unlocked: u64) -> Harness {
    harness_with(balance, unlocked, true, SessionConfig::default())
}

pub fn harness_with(
    balance: u64,
    unlocked: u64,
    multi_broadcast: bool,
    config: SessionConfig,
) -> Harness {
    harness_full(balance, unlocked, multi_broadcast, false, config)
}

/// Harness whose relay refuses every push.
#[allow(dead_code)]
pub fn harness_failing_relay(balance: u64, unlocked: u64) -> Harness {
    harness_full(balance, unlocked, true, true, SessionConfig::default())
}

fn harness_full(
    balance: u64,
    unlocked: u64,
    multi_broadcast: bool,
    relay_fails: bool,
    config: SessionConfig,
) -> Harness {
    let backend = MockBackend::new(balance, unlocked);
    let settings = MockSettings::new(multi_broadcast);
    let relay = MockRelay {
        fail: relay_fails,
        ..MockRelay::default()
    };
    let peers = PeerBook::from_addresses(["node1.example.org:18081", "node2.example.org:18089"])
        .expect("static peer list");
    let (session, events) = WalletSession::new(
        backend.clone(),
        settings.clone(),
        relay.clone(),
        peers,
        config,
    );
    Harness {
        backend,
        settings,
        relay,
        session,
        events,
    }
}

pub fn drain(events: &Receiver<SessionEvent>) -> Vec<SessionEvent> {
    events.try_iter().collect()
}

/// A two-piece pending transfer with fixed ids and blobs.
#[allow(dead_code)]
pub fn split_transfer() -> PendingTransfer {
    PendingTransfer {
        txids: vec!["txid-a".to_string(), "txid-b".to_string()],
        signed_hex: vec!["aa01".to_string(), "bb02".to_string()],
        amount: 7_000_000_000_000,
        fee: 61_000_000_000,
    }
}
