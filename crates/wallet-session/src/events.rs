//! Tagged events into and out of the session.
//!
//! One enum per direction, delivered in order over a channel, replaces the
//! web of individual callbacks a UI toolkit would wire up. Consumers match
//! on the variant; unknown-to-them variants are simply skipped.

use crate::backend::PendingTransfer;

/// Notifications from the wallet library's worker threads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletEvent {
    /// An outgoing transaction was included in a block.
    MoneySpent { txid: String, amount: u64 },
    /// An incoming transaction was included in a block.
    MoneyReceived { txid: String, amount: u64 },
    /// An incoming transaction was observed in the pool.
    UnconfirmedMoneyReceived { txid: String, amount: u64 },
    /// A block was scanned.
    NewBlock { height: u64, target_height: u64 },
    /// Something about the wallet's contents changed.
    Updated,
    /// A refresh pass finished.
    Refreshed { success: bool, message: String },
    /// The daemon height query completed.
    HeightRefreshed {
        wallet_height: u64,
        daemon_height: u64,
        target_height: u64,
    },
    /// The daemon connection came up or went away.
    ConnectionChanged { connected: bool },
    /// Asynchronous construction finished; `addresses` are the destinations
    /// the library resolved.
    TransactionCreated {
        tx: PendingTransfer,
        addresses: Vec<String>,
    },
    /// Asynchronous construction failed.
    TransactionFailed { error: String },
    /// The asynchronous commit finished.
    TransactionCommitted {
        success: bool,
        tx: PendingTransfer,
        txids: Vec<String>,
    },
}

/// What the session publishes for the embedding UI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// A request was rejected or construction failed; show the message.
    TransactionError { message: String },
    /// Construction was delegated; show a waiting state.
    TransactionInitiated,
    /// The waiting state can be dismissed.
    TransactionEnded,
    /// Built and signed, awaiting the user's confirm or cancel.
    TransactionReady {
        tx: PendingTransfer,
        addresses: Vec<String>,
    },
    /// The user rejected a built transaction.
    TransactionCancelled { addresses: Vec<String>, amount: u64 },
    /// The commit finished; bookkeeping is already done.
    TransactionCommitted {
        success: bool,
        tx: PendingTransfer,
        txids: Vec<String>,
    },
    BalanceUpdated { total: u64, unlocked: u64 },
    /// Scan progress while behind the chain tip.
    SyncProgress { height: u64, target: u64 },
    /// Caught up with the chain tip.
    Synchronized,
    /// First successful refresh since the wallet was opened.
    FullyRefreshed,
    /// A pool payment arrived after the initial sync; worth a desktop
    /// notification.
    PaymentReceived { txid: String, amount: u64 },
    /// The subaddress table failed to rebuild; the wallet file is suspect.
    KeysCorrupted,
}
