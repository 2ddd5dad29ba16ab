//! Request validation, confirm/cancel, commit bookkeeping, and the
//! redundant broadcast path.

mod common;

use common::*;
use wallet_session::{
    Destination, SessionError, SessionEvent, TransferRequest, WalletEvent, DONATION_ADDRESS,
};

const COIN: u64 = 1_000_000_000_000;
const ADDRESS: &str = "48recipient";

#[test]
fn zero_amount_is_rejected_before_construction() {
    let mut h = harness(5 * COIN, 5 * COIN);

    h.session.create_transaction(ADDRESS, 0, "coffee", false);

    assert_eq!(
        drain(&h.events),
        vec![
            SessionEvent::TransactionError {
                message: "Cannot send nothing".to_string()
            },
            SessionEvent::TransactionEnded,
        ]
    );
    assert!(h.backend.creates().is_empty());
    assert_eq!(h.session.pending_description(), "");
}

#[test]
fn over_balance_is_rejected_with_spendable_balance() {
    let mut h = harness(5 * COIN, COIN + COIN / 2);

    h.session.create_transaction(ADDRESS, 2 * COIN, "rent", false);

    let events = drain(&h.events);
    assert_eq!(
        events[0],
        SessionEvent::TransactionError {
            message: "Not enough money to spend.\n\nSpendable balance: 1.500000000000"
                .to_string()
        }
    );
    assert!(h.backend.creates().is_empty());
}

#[test]
fn empty_wallet_sweep_is_rejected() {
    let mut h = harness(0, 0);

    h.session.create_transaction(ADDRESS, 0, "", true);

    assert!(matches!(
        drain(&h.events).first(),
        Some(SessionEvent::TransactionError { message }) if message == "No money to spend"
    ));
    assert!(h.backend.creates().is_empty());
}

#[test]
fn valid_request_delegates_with_selected_inputs() {
    let mut h = harness(5 * COIN, 5 * COIN);
    h.session
        .set_selected_inputs(vec!["ki-1".to_string(), "ki-2".to_string()]);

    h.session.create_transaction(ADDRESS, COIN, "lunch", false);

    assert_eq!(
        h.backend.creates(),
        vec![TransferRequest::Single {
            address: ADDRESS.to_string(),
            amount: COIN,
            inputs: vec!["ki-1".to_string(), "ki-2".to_string()],
        }]
    );
    assert_eq!(drain(&h.events), vec![SessionEvent::TransactionInitiated]);
    assert_eq!(h.session.pending_description(), "lunch");
}

#[test]
fn spend_all_uses_the_sweep_variant() {
    let mut h = harness(5 * COIN, 5 * COIN);

    h.session.create_transaction(ADDRESS, 0, "all of it", true);

    assert_eq!(
        h.backend.creates(),
        vec![TransferRequest::SpendAll {
            address: ADDRESS.to_string(),
            inputs: Vec::new(),
        }]
    );
}

#[test]
fn multi_dest_error_does_not_abort_construction() {
    let mut h = harness(COIN, COIN);
    let destinations = vec![
        Destination {
            address: "48one".to_string(),
            amount: COIN,
        },
        Destination {
            address: "48two".to_string(),
            amount: COIN,
        },
    ];

    h.session
        .create_transaction_multi_dest(&destinations, "payroll");

    // The error is surfaced, yet the library still gets the request and has
    // the final say.
    assert_eq!(
        drain(&h.events),
        vec![
            SessionEvent::TransactionError {
                message: "Not enough money to spend".to_string()
            },
            SessionEvent::TransactionEnded,
            SessionEvent::TransactionInitiated,
        ]
    );
    assert_eq!(
        h.backend.creates(),
        vec![TransferRequest::MultiDest {
            destinations,
            inputs: Vec::new(),
        }]
    );
}

#[test]
fn churn_sweep_pays_the_primary_address() {
    let mut h = harness(5 * COIN, 5 * COIN);

    h.session
        .sweep_outputs(vec!["ki-1".to_string()], "48ignored", true, 1);

    assert_eq!(
        h.backend.creates(),
        vec![TransferRequest::Selected {
            key_images: vec!["ki-1".to_string()],
            address: "primary-address".to_string(),
            outputs: 1,
        }]
    );
}

#[test]
fn sweep_keeps_the_explicit_address_when_not_churning() {
    let mut h = harness(5 * COIN, 5 * COIN);

    h.session
        .sweep_outputs(vec!["ki-1".to_string()], "48explicit", false, 2);

    assert!(matches!(
        h.backend.creates().first(),
        Some(TransferRequest::Selected { address, outputs: 2, .. }) if address == "48explicit"
    ));
}

#[test]
fn construction_success_surfaces_the_built_transaction() {
    let mut h = harness(5 * COIN, 5 * COIN);
    let tx = split_transfer();

    h.session.handle_wallet_event(WalletEvent::TransactionCreated {
        tx: tx.clone(),
        addresses: vec![ADDRESS.to_string()],
    });

    assert_eq!(
        drain(&h.events),
        vec![
            SessionEvent::TransactionEnded,
            SessionEvent::TransactionReady {
                tx,
                addresses: vec![ADDRESS.to_string()],
            },
        ]
    );
    assert!(!h.session.donation_in_flight());
}

#[test]
fn construction_paying_the_donation_address_arms_the_flag() {
    let mut h = harness(5 * COIN, 5 * COIN);

    h.session.handle_wallet_event(WalletEvent::TransactionCreated {
        tx: split_transfer(),
        addresses: vec![ADDRESS.to_string(), DONATION_ADDRESS.to_string()],
    });

    assert!(h.session.donation_in_flight());
}

#[test]
fn construction_failure_clears_state_and_reports() {
    let mut h = harness(5 * COIN, 5 * COIN);
    h.session.create_transaction(ADDRESS, COIN, "lunch", false);
    drain(&h.events);

    h.session.handle_wallet_event(WalletEvent::TransactionFailed {
        error: "not enough outputs to mix".to_string(),
    });

    let events = drain(&h.events);
    assert_eq!(
        events,
        vec![
            SessionEvent::TransactionError {
                message: "not enough outputs to mix".to_string()
            },
            SessionEvent::TransactionEnded,
        ]
    );
    assert_eq!(h.session.pending_description(), "");
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::TransactionReady { .. })));
}

#[test]
fn cancel_reports_then_disposes() {
    let mut h = harness(5 * COIN, 5 * COIN);
    let tx = split_transfer();

    h.session
        .cancel_transaction(tx.clone(), vec![ADDRESS.to_string()]);

    assert_eq!(
        drain(&h.events),
        vec![SessionEvent::TransactionCancelled {
            addresses: vec![ADDRESS.to_string()],
            amount: tx.amount,
        }]
    );
    assert_eq!(h.backend.calls(), vec![BackendCall::Dispose(tx)]);
}

#[test]
fn commit_clears_selected_inputs_before_broadcasting() {
    let mut h = harness(5 * COIN, 5 * COIN);
    h.session.set_selected_inputs(vec!["ki-1".to_string()]);

    h.session.commit_transaction(split_transfer(), "lunch");

    assert!(h.session.selected_inputs().is_empty());
    assert!(h
        .backend
        .calls()
        .iter()
        .any(|call| matches!(call, BackendCall::Commit { description, .. } if description == "lunch")));
}

#[test]
fn commit_broadcasts_every_piece_to_every_peer() {
    let mut h = harness(5 * COIN, 5 * COIN);

    h.session.commit_transaction(split_transfer(), "");

    // Outer loop over pieces, inner loop over peers.
    assert_eq!(
        h.relay.sent(),
        vec![
            ("http://node1.example.org:18081".to_string(), "aa01".to_string()),
            ("http://node2.example.org:18089".to_string(), "aa01".to_string()),
            ("http://node1.example.org:18081".to_string(), "bb02".to_string()),
            ("http://node2.example.org:18089".to_string(), "bb02".to_string()),
        ]
    );
}

#[test]
fn commit_without_multi_broadcast_skips_the_relay() {
    let mut h = harness_with(5 * COIN, 5 * COIN, false, Default::default());

    h.session.commit_transaction(split_transfer(), "");

    assert!(h.relay.sent().is_empty());
    assert!(h
        .backend
        .calls()
        .iter()
        .any(|call| matches!(call, BackendCall::Commit { .. })));
}

#[test]
fn relay_failures_do_not_abort_the_commit() {
    let mut h = harness_failing_relay(5 * COIN, 5 * COIN);

    h.session.commit_transaction(split_transfer(), "");

    // Every push was still attempted, and the library commit still ran.
    assert_eq!(h.relay.sent().len(), 4);
    assert!(h
        .backend
        .calls()
        .iter()
        .any(|call| matches!(call, BackendCall::Commit { .. })));
}

#[test]
fn commit_complete_persists_refreshes_and_caches() {
    let mut h = harness(5 * COIN, 5 * COIN);
    let tx = split_transfer();

    h.session.handle_wallet_event(WalletEvent::TransactionCommitted {
        success: true,
        tx: tx.clone(),
        txids: tx.txids.clone(),
    });

    // The store is unconditional here, even though the wallet never reports
    // synchronized in this test.
    assert_eq!(h.backend.store_count(), 1);
    let calls = h.backend.calls();
    assert!(calls.contains(&BackendCall::RefreshHistory(0)));
    assert!(calls.contains(&BackendCall::RefreshCoins(0)));
    assert_eq!(h.backend.cached("tx:txid-a").as_deref(), Some("aa01"));
    assert_eq!(h.backend.cached("tx:txid-b").as_deref(), Some("bb02"));

    let events = drain(&h.events);
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::BalanceUpdated { .. })));
    assert_eq!(
        events.last(),
        Some(&SessionEvent::TransactionCommitted {
            success: true,
            tx: tx.clone(),
            txids: tx.txids,
        })
    );
}

#[test]
fn commit_complete_resets_the_pending_description() {
    let mut h = harness(5 * COIN, 5 * COIN);
    h.session.create_transaction(ADDRESS, COIN, "lunch", false);
    drain(&h.events);
    assert_eq!(h.session.pending_description(), "lunch");

    let tx = split_transfer();
    h.session.handle_wallet_event(WalletEvent::TransactionCommitted {
        success: true,
        tx: tx.clone(),
        txids: tx.txids,
    });

    assert_eq!(h.session.pending_description(), "");
}

#[test]
fn donation_commit_silences_the_reminder_once() {
    let mut h = harness(5 * COIN, 5 * COIN);
    let tx = split_transfer();

    h.session.handle_wallet_event(WalletEvent::TransactionCreated {
        tx: tx.clone(),
        addresses: vec![DONATION_ADDRESS.to_string()],
    });
    h.session.handle_wallet_event(WalletEvent::TransactionCommitted {
        success: true,
        tx: tx.clone(),
        txids: tx.txids.clone(),
    });
    assert_eq!(h.settings.reminder_disabled_count(), 1);
    assert!(!h.session.donation_in_flight());

    // A later ordinary commit must not touch the reminder again.
    h.session.handle_wallet_event(WalletEvent::TransactionCommitted {
        success: true,
        tx: tx.clone(),
        txids: tx.txids,
    });
    assert_eq!(h.settings.reminder_disabled_count(), 1);
}

#[test]
fn rebroadcast_pushes_the_cached_blob_to_every_peer() {
    let mut h = harness(5 * COIN, 5 * COIN);
    h.backend.seed_cache("tx:abc", "cafe01");

    h.session.rebroadcast("abc").unwrap();

    let sent = h.relay.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|(_, blob)| blob == "cafe01"));
}

#[test]
fn rebroadcast_without_a_cached_blob_is_an_error() {
    let mut h = harness(5 * COIN, 5 * COIN);

    assert_eq!(
        h.session.rebroadcast("abc"),
        Err(SessionError::NoCachedTransaction("abc".to_string()))
    );

    // An empty blob counts as missing, not as valid hex.
    h.backend.seed_cache("tx:abc", "");
    assert_eq!(
        h.session.rebroadcast("abc"),
        Err(SessionError::NoCachedTransaction("abc".to_string()))
    );
    assert!(h.relay.sent().is_empty());
}

#[test]
fn rebroadcast_rejects_a_corrupt_blob() {
    let mut h = harness(5 * COIN, 5 * COIN);
    h.backend.seed_cache("tx:abc", "not hex at all");

    assert_eq!(
        h.session.rebroadcast("abc"),
        Err(SessionError::InvalidCachedTransaction("abc".to_string()))
    );
    assert!(h.relay.sent().is_empty());
}
