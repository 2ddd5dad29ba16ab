//! wallet-session
//!
//! Transaction lifecycle orchestration between an embedding UI, the external
//! wallet library, and the daemon peer set. The session owns the transient
//! request state (pending description, selected inputs, donation flag),
//! validates spend requests against balances before any asynchronous work
//! starts, drives the best-effort multi-broadcast on commit, and turns
//! wallet-library notifications into UI-facing events.
//!
//! Everything runs on one logical thread: the wallet library's workers
//! deliver [`WalletEvent`]s over a channel, the embedder drains
//! [`SessionEvent`]s on the other side, and no session state is shared
//! across threads.

mod backend;
mod config;
mod events;
mod relay;

pub use backend::{Destination, PendingTransfer, TransferRequest, WalletBackend};
pub use config::{SessionConfig, Settings};
pub use events::{SessionEvent, WalletEvent};
pub use relay::{DaemonRelay, TxRelay};

use crossbeam_channel::{select, tick, unbounded, Receiver, Sender};
use peers::PeerBook;
use thiserror::Error;

/// Project donation address. A construction that pays it arms the
/// donation-in-flight flag; the reminder is silenced when that transfer
/// commits.
pub const DONATION_ADDRESS: &str =
    "47mbXKvHRKR1zmmiSXWMndAZ4wU18ZZa1sgNgJJgGCvZWDDPGBmWVq4nMupTprjSDCJ3DY4estMdJXtMA4DhPu1V3sVFnM9";

/// Cache-attribute key prefix under which raw signed blobs are stored.
const TX_CACHE_PREFIX: &str = "tx:";

const PICO_PER_COIN: u64 = 1_000_000_000_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no cached transaction for {0}")]
    NoCachedTransaction(String),
    #[error("cached transaction for {0} is not valid hex")]
    InvalidCachedTransaction(String),
}

/// Formats an atomic-unit amount as a fixed-point coin value, the way
/// balances appear in user-facing messages.
pub fn display_amount(amount: u64) -> String {
    format!("{}.{:012}", amount / PICO_PER_COIN, amount % PICO_PER_COIN)
}

/// The orchestrator. Generic over its three seams so tests can substitute
/// recording fakes for the wallet library, the preference store, and the
/// broadcast client.
pub struct WalletSession<B, S, R> {
    backend: B,
    settings: S,
    relay: R,
    peers: PeerBook,
    config: SessionConfig,
    events: Sender<SessionEvent>,
    pending_description: String,
    selected_inputs: Vec<String>,
    donation_in_flight: bool,
    fully_refreshed: bool,
    daemon_connected: bool,
    store_timer: bool,
}

impl<B, S, R> WalletSession<B, S, R>
where
    B: WalletBackend,
    S: Settings,
    R: TxRelay,
{
    pub fn new(
        backend: B,
        settings: S,
        relay: R,
        peers: PeerBook,
        config: SessionConfig,
    ) -> (Self, Receiver<SessionEvent>) {
        let (events, receiver) = unbounded();
        let session = WalletSession {
            backend,
            settings,
            relay,
            peers,
            config,
            events,
            pending_description: String::new(),
            selected_inputs: Vec::new(),
            donation_in_flight: false,
            fully_refreshed: false,
            daemon_connected: true,
            store_timer: true,
        };
        (session, receiver)
    }

    // ---- UI-facing requests ----

    /// Single-destination send. Validated against the unlocked balance
    /// before any asynchronous work starts; a rejected request emits
    /// [`SessionEvent::TransactionError`] and nothing reaches the library.
    pub fn create_transaction(
        &mut self,
        address: &str,
        amount: u64,
        description: &str,
        spend_all: bool,
    ) {
        self.pending_description = description.to_string();

        if !spend_all && amount == 0 {
            self.fail_transaction("Cannot send nothing".to_string());
            return;
        }

        let unlocked = self.backend.unlocked_balance();
        if !spend_all && amount > unlocked {
            self.fail_transaction(format!(
                "Not enough money to spend.\n\nSpendable balance: {}",
                display_amount(unlocked)
            ));
            return;
        } else if unlocked == 0 {
            self.fail_transaction("No money to spend".to_string());
            return;
        }

        log::info!("creating transaction");
        let request = if spend_all {
            TransferRequest::SpendAll {
                address: address.to_string(),
                inputs: self.selected_inputs.clone(),
            }
        } else {
            TransferRequest::Single {
                address: address.to_string(),
                amount,
                inputs: self.selected_inputs.clone(),
            }
        };
        self.backend.create_transaction(request);
        self.send(SessionEvent::TransactionInitiated);
    }

    /// Multi-destination send. An over-balance total signals an error, but
    /// construction is still delegated and the library gets the final say.
    pub fn create_transaction_multi_dest(
        &mut self,
        destinations: &[Destination],
        description: &str,
    ) {
        self.pending_description = description.to_string();

        let total = destinations
            .iter()
            .fold(0u64, |acc, d| acc.saturating_add(d.amount));
        if total > self.backend.unlocked_balance() {
            // TODO: decide whether an over-balance total should abort here
            // instead of falling through to construction (see DESIGN.md).
            self.fail_transaction("Not enough money to spend".to_string());
        }

        log::info!("creating transaction");
        self.backend.create_transaction(TransferRequest::MultiDest {
            destinations: destinations.to_vec(),
            inputs: self.selected_inputs.clone(),
        });
        self.send(SessionEvent::TransactionInitiated);
    }

    /// Sweep of specific outputs. A churn sweep redirects to the wallet's
    /// own primary address to merge the outputs.
    pub fn sweep_outputs(
        &mut self,
        key_images: Vec<String>,
        address: &str,
        churn: bool,
        outputs: usize,
    ) {
        let address = if churn {
            self.backend.primary_address()
        } else {
            address.to_string()
        };

        log::info!("creating transaction");
        self.backend.create_transaction(TransferRequest::Selected {
            key_images,
            address,
            outputs,
        });
        self.send(SessionEvent::TransactionInitiated);
    }

    /// User rejected the built transaction: report, then return it to the
    /// library for disposal.
    pub fn cancel_transaction(&mut self, tx: PendingTransfer, addresses: Vec<String>) {
        self.send(SessionEvent::TransactionCancelled {
            addresses,
            amount: tx.amount,
        });
        self.backend.dispose_transaction(tx);
    }

    /// User confirmed: optionally broadcast redundantly, then hand the
    /// transaction to the wallet library's own commit path.
    ///
    /// Selected inputs are cleared before anything else so a request racing
    /// this commit cannot reference outputs that are about to be spent.
    pub fn commit_transaction(&mut self, tx: PendingTransfer, description: &str) {
        self.selected_inputs.clear();

        if self.settings.multi_broadcast() {
            self.multi_broadcast(&tx);
        }

        self.backend.commit_transaction(&tx, description);
    }

    /// Re-pushes an already committed transaction to every peer from its
    /// cached signed blob.
    pub fn rebroadcast(&mut self, txid: &str) -> Result<(), SessionError> {
        let key = format!("{TX_CACHE_PREFIX}{txid}");
        let tx_hex = match self.backend.cache_attribute(&key) {
            Some(blob) if !blob.trim().is_empty() => blob,
            _ => return Err(SessionError::NoCachedTransaction(txid.to_string())),
        };
        if hex::decode(tx_hex.trim()).is_err() {
            return Err(SessionError::InvalidCachedTransaction(txid.to_string()));
        }

        for peer in &self.peers {
            let url = peer.to_url();
            log::debug!("rebroadcasting {txid} to {url}");
            if let Err(err) = self.relay.send_raw(&url, &tx_hex) {
                log::warn!("rebroadcast of {txid} to {url} failed: {err}");
            }
        }
        Ok(())
    }

    /// Replaces the UI's coin-control selection for the next construction.
    pub fn set_selected_inputs(&mut self, inputs: Vec<String>) {
        self.selected_inputs = inputs;
    }

    pub fn selected_inputs(&self) -> &[String] {
        &self.selected_inputs
    }

    pub fn pending_description(&self) -> &str {
        &self.pending_description
    }

    pub fn donation_in_flight(&self) -> bool {
        self.donation_in_flight
    }

    /// Disables the periodic store, the only timer this session runs.
    /// Shutdown calls this before the final unconditional store.
    pub fn stop_timers(&mut self) {
        self.store_timer = false;
    }

    // ---- event loop ----

    /// Drives the session until the wallet-event channel closes: library
    /// events in arrival order, interleaved with the periodic guarded store.
    pub fn run(&mut self, wallet_events: &Receiver<WalletEvent>) {
        let store_tick = tick(self.config.store_interval);
        loop {
            select! {
                recv(wallet_events) -> event => match event {
                    Ok(event) => self.handle_wallet_event(event),
                    Err(_) => return,
                },
                recv(store_tick) -> _ => {
                    if self.store_timer {
                        self.store_wallet();
                    }
                }
            }
        }
    }

    /// Applies one wallet-library notification.
    pub fn handle_wallet_event(&mut self, event: WalletEvent) {
        match event {
            WalletEvent::MoneySpent { txid, amount } => {
                log::debug!("spent {} in {txid}", display_amount(amount));
            }
            WalletEvent::MoneyReceived { txid, amount } => {
                log::debug!("received {} in {txid}", display_amount(amount));
            }
            WalletEvent::UnconfirmedMoneyReceived { txid, amount } => {
                log::debug!("pool payment {} in {txid}", display_amount(amount));
                if self.backend.synchronized_once() {
                    self.send(SessionEvent::PaymentReceived { txid, amount });
                }
            }
            WalletEvent::Updated => {
                if self.backend.synchronized_once() {
                    self.refresh_models();
                    self.store_wallet();
                }
                self.update_balance();
            }
            WalletEvent::Refreshed { success: false, message } => {
                // The library schedules its own retry; nothing to do here.
                log::error!("refresh failed: {message}");
            }
            WalletEvent::Refreshed { success: true, .. } => {
                if !self.fully_refreshed {
                    self.refresh_models();
                    self.fully_refreshed = true;
                    self.send(SessionEvent::FullyRefreshed);
                    self.store_wallet();
                }
            }
            WalletEvent::NewBlock { height, target_height } => {
                self.sync_status_updated(height, target_height);
                if self.backend.is_synchronized() {
                    self.backend.refresh_unlocked_coins();
                    self.backend.refresh_history(self.config.account_index);
                }
            }
            WalletEvent::HeightRefreshed {
                wallet_height,
                daemon_height,
                target_height,
            } => {
                if !self.daemon_connected {
                    return;
                }
                if daemon_height < target_height {
                    // The daemon itself is catching up; report its progress
                    // rather than ours.
                    self.send(SessionEvent::SyncProgress {
                        height: daemon_height,
                        target: target_height,
                    });
                } else {
                    self.sync_status_updated(wallet_height, daemon_height);
                }
            }
            WalletEvent::ConnectionChanged { connected } => {
                self.daemon_connected = connected;
            }
            WalletEvent::TransactionCreated { tx, addresses } => {
                if addresses.iter().any(|a| a == DONATION_ADDRESS) {
                    self.donation_in_flight = true;
                }
                self.send(SessionEvent::TransactionEnded);
                self.send(SessionEvent::TransactionReady { tx, addresses });
            }
            WalletEvent::TransactionFailed { error } => {
                self.fail_transaction(error);
            }
            WalletEvent::TransactionCommitted { success, tx, txids } => {
                // Persist first: a crash after this point must not lose the
                // spent key images.
                self.backend.store();
                self.backend.refresh_history(self.config.account_index);
                self.backend.refresh_coins(self.config.account_index);
                self.update_balance();
                for (txid, tx_hex) in txids.iter().zip(&tx.signed_hex) {
                    self.cache_transaction(txid, tx_hex);
                }
                if self.donation_in_flight {
                    self.donation_in_flight = false;
                    self.settings.disable_donation_reminder();
                }
                self.pending_description.clear();
                self.send(SessionEvent::TransactionCommitted { success, tx, txids });
            }
        }
    }

    /// Guarded persist: storing mid-synchronization is unsafe, so the live
    /// flag is re-checked immediately before every store.
    pub fn store_wallet(&mut self) {
        if !self.backend.is_synchronized() {
            return;
        }
        log::debug!("storing wallet");
        self.backend.store();
    }

    // ---- internals ----

    /// Pushes every signed piece to every known peer. Failures are logged
    /// and otherwise ignored; the wallet library's commit stays
    /// authoritative for what actually happened.
    fn multi_broadcast(&mut self, tx: &PendingTransfer) {
        for (index, tx_hex) in tx.signed_hex.iter().enumerate() {
            let txid = tx.txids.get(index).map(String::as_str).unwrap_or("?");
            for peer in &self.peers {
                let url = peer.to_url();
                log::debug!("relaying {txid} to {url}");
                if let Err(err) = self.relay.send_raw(&url, tx_hex) {
                    log::warn!("relay of {txid} to {url} failed: {err}");
                }
            }
        }
    }

    /// Error path shared by synchronous validation and asynchronous
    /// construction failures: surface the message, drop the pending
    /// description, and always clear the UI's waiting state.
    fn fail_transaction(&mut self, message: String) {
        self.send(SessionEvent::TransactionError { message });
        self.pending_description.clear();
        self.send(SessionEvent::TransactionEnded);
    }

    /// Writes one (txid, signed hex) pair into the wallet's attribute cache
    /// under the stable `tx:` key scheme; [`WalletSession::rebroadcast`]
    /// reads it back.
    fn cache_transaction(&mut self, txid: &str, tx_hex: &str) {
        let key = format!("{TX_CACHE_PREFIX}{txid}");
        if !self.backend.set_cache_attribute(&key, tx_hex) {
            log::warn!("failed to cache signed transaction {txid}");
        }
    }

    fn update_balance(&mut self) {
        let total = self.backend.balance();
        let unlocked = self.backend.unlocked_balance();
        self.send(SessionEvent::BalanceUpdated { total, unlocked });
    }

    /// Height-based sync evaluation. Within one block of the target counts
    /// as synchronized; the subtraction saturates so a zero target can never
    /// wrap.
    fn sync_status_updated(&mut self, height: u64, target: u64) {
        if height < target.saturating_sub(1) {
            self.send(SessionEvent::SyncProgress { height, target });
        } else {
            self.update_balance();
            self.send(SessionEvent::Synchronized);
        }
    }

    /// Rebuilds the history, coin, and subaddress views. A subaddress table
    /// that cannot be rebuilt means the stored keys no longer verify.
    fn refresh_models(&mut self) {
        self.backend.refresh_history(self.config.account_index);
        self.backend.refresh_coins(self.config.account_index);
        if !self.backend.refresh_subaddresses(self.config.account_index) {
            self.send(SessionEvent::KeysCorrupted);
        }
    }

    fn send(&self, event: SessionEvent) {
        // An embedder that stopped listening does not stop the session.
        let _ = self.events.send(event);
    }
}
