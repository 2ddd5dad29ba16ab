//! Seam to the external wallet library.
//!
//! Construction and commit are asynchronous on the library side: the methods
//! here only dispatch, and completion arrives later as a
//! [`WalletEvent`](crate::WalletEvent) on the session's inbound channel.
//! Balance reads, refreshes, and the attribute cache are synchronous.

/// One output of a multi-destination transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    pub address: String,
    pub amount: u64,
}

/// The construction variants the session can request. `inputs` carries the
/// UI's coin-control selection; empty means the library picks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferRequest {
    /// Exact amount to a single destination.
    Single {
        address: String,
        amount: u64,
        inputs: Vec<String>,
    },
    /// The entire unlocked balance to a single destination.
    SpendAll { address: String, inputs: Vec<String> },
    /// Several destinations paid in one transaction.
    MultiDest {
        destinations: Vec<Destination>,
        inputs: Vec<String>,
    },
    /// Sweep exactly the given outputs, identified by key image.
    Selected {
        key_images: Vec<String>,
        address: String,
        outputs: usize,
    },
}

/// A constructed, signed, not-yet-committed transaction. Large amounts get
/// split by the library; `txids` and `signed_hex` stay parallel, one entry
/// per piece.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingTransfer {
    pub txids: Vec<String>,
    pub signed_hex: Vec<String>,
    pub amount: u64,
    pub fee: u64,
}

impl PendingTransfer {
    /// Number of signed pieces the transfer was split into.
    pub fn tx_count(&self) -> usize {
        self.signed_hex.len()
    }
}

pub trait WalletBackend {
    fn balance(&self) -> u64;
    fn unlocked_balance(&self) -> u64;
    /// Primary address of the active account; churn sweeps pay this.
    fn primary_address(&self) -> String;
    /// True once the wallet has completed at least one full sync since open.
    /// Stays true afterwards even while catching up again.
    fn synchronized_once(&self) -> bool;
    /// True while the wallet is at the chain tip right now.
    fn is_synchronized(&self) -> bool;
    /// Dispatches asynchronous construction. Completion arrives as
    /// [`WalletEvent::TransactionCreated`](crate::WalletEvent::TransactionCreated)
    /// or `TransactionFailed`; this call itself never fails.
    fn create_transaction(&self, request: TransferRequest);
    /// Dispatches the asynchronous commit. Completion arrives as
    /// [`WalletEvent::TransactionCommitted`](crate::WalletEvent::TransactionCommitted).
    fn commit_transaction(&self, tx: &PendingTransfer, description: &str);
    /// Releases a constructed transaction that will not be sent.
    fn dispose_transaction(&self, tx: PendingTransfer);
    /// Persists wallet state. Callers own the not-while-synchronizing guard.
    fn store(&self);
    /// Writes one attribute into the wallet cache. False when the write was
    /// refused.
    fn set_cache_attribute(&self, key: &str, value: &str) -> bool;
    fn cache_attribute(&self, key: &str) -> Option<String>;
    fn refresh_history(&self, account: u32);
    fn refresh_coins(&self, account: u32);
    fn refresh_unlocked_coins(&self);
    /// Rebuilds the subaddress table. False means the stored keys no longer
    /// verify and the wallet file must be treated as corrupt.
    fn refresh_subaddresses(&self, account: u32) -> bool;
}
