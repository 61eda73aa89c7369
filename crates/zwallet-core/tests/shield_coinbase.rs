//! Integration tests for coinbase shielding

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use zwallet_core::selection::{
    LIMIT_OUT_OF_RANGE, NEGATIVE_LIMIT, NO_COINBASE_FUNDS, NO_PAYMENT_SOURCE,
};
use zwallet_core::test_helpers::{RejectingRelay, TestWallet};
use zwallet_core::{
    Error, OperationStatus, Pool, PoolBalances, ShieldCoinbaseRequest, TransparentAddress,
    WalletConfig, Zatoshis,
};
use zwallet_params::{NetworkType, COIN, MAX_MONEY};

const WAIT: Duration = Duration::from_secs(5);

fn coins(n: u64) -> Zatoshis {
    Zatoshis::from_u64(n * COIN).unwrap()
}

fn orchard_wallet() -> TestWallet {
    TestWallet::with_config(WalletConfig {
        orchard_activation_height: Some(1),
        ..WalletConfig::for_network(NetworkType::Regtest)
    })
}

// ============================================================================
// Synchronous validation
// ============================================================================

#[tokio::test]
async fn test_watch_only_source_has_no_payment_source() {
    let tw = TestWallet::regtest();
    let (_, derived, _) = tw.account_with_address();

    let watched = TransparentAddress::from_pubkey_hash([0x11; 20]).encode(tw.wallet.network());
    tw.ledger.watch_address(&watched);
    tw.fund_coinbase(&watched, 3, coins(1));

    let err = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new(&watched, &derived.encoded))
        .unwrap_err();
    assert_eq!(err.to_string(), NO_PAYMENT_SOURCE);

    // The wildcard never picks up watch-only outputs either.
    let err = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new("*", &derived.encoded))
        .unwrap_err();
    assert_eq!(err.to_string(), NO_COINBASE_FUNDS);
    assert_eq!(tw.wallet.locks().locked_count(), 0);
}

#[tokio::test]
async fn test_fee_out_of_range() {
    let tw = TestWallet::regtest();
    let (_, derived, taddr) = tw.account_with_address();
    tw.fund_coinbase(&taddr, 2, coins(1));

    for fee in [-1, MAX_MONEY as i64 + 1] {
        let err = tw
            .wallet
            .shield_coinbase(&ShieldCoinbaseRequest::new(&taddr, &derived.encoded).with_fee(fee))
            .unwrap_err();
        assert!(matches!(err, Error::AmountOutOfRange));
        assert_eq!(err.to_string(), "Amount out of range");
    }

    let request = ShieldCoinbaseRequest::new(&taddr, &derived.encoded)
        .with_fee_decimal("21000000.00000001")
        .unwrap();
    assert!(matches!(
        tw.wallet.shield_coinbase(&request),
        Err(Error::AmountOutOfRange)
    ));
    assert_eq!(tw.wallet.locks().locked_count(), 0);
    assert!(tw.wallet.list_operations(None).is_empty());
}

#[tokio::test]
async fn test_limit_out_of_range() {
    let tw = TestWallet::regtest();
    let (_, derived, taddr) = tw.account_with_address();
    tw.fund_coinbase(&taddr, 2, coins(1));

    let err = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new(&taddr, &derived.encoded).with_limit(-1))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidLimit(_)));
    assert_eq!(err.to_string(), NEGATIVE_LIMIT);

    let err = tw
        .wallet
        .shield_coinbase(
            &ShieldCoinbaseRequest::new(&taddr, &derived.encoded)
                .with_limit(i64::from(i32::MAX) + 1),
        )
        .unwrap_err();
    assert_eq!(err.to_string(), LIMIT_OUT_OF_RANGE);
    assert_eq!(tw.wallet.locks().locked_count(), 0);
}

#[tokio::test]
async fn test_rejects_bad_addresses() {
    let tw = TestWallet::regtest();
    let (_, derived, taddr) = tw.account_with_address();
    tw.fund_coinbase(&taddr, 1, coins(1));

    let err = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new(&derived.encoded, &derived.encoded))
        .unwrap_err();
    assert!(matches!(err, Error::MalformedAddress(_)));

    let err = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new(&taddr, &taddr))
        .unwrap_err();
    assert!(matches!(err, Error::MalformedAddress(_)));
}

#[tokio::test]
async fn test_fee_must_be_covered() {
    let tw = TestWallet::regtest();
    let (_, derived, taddr) = tw.account_with_address();
    tw.fund_coinbase(&taddr, 2, Zatoshis::from_u64(1_000).unwrap());

    let err = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new(&taddr, &derived.encoded))
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientFunds(_)));
    assert_eq!(tw.wallet.locks().locked_count(), 0);

    let result = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new(&taddr, &derived.encoded).with_fee(0))
        .unwrap();
    assert_eq!(result.shielding_utxos, 2);
}

#[tokio::test]
async fn test_fee_equal_to_value_is_rejected() {
    let tw = TestWallet::regtest();
    let (_, derived, taddr) = tw.account_with_address();
    tw.fund_coinbase(&taddr, 2, Zatoshis::from_u64(50_000).unwrap());

    let err = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new(&taddr, &derived.encoded).with_fee(100_000))
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientFunds(_)));
    assert_eq!(tw.wallet.locks().locked_count(), 0);

    let result = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new(&taddr, &derived.encoded).with_fee(99_999))
        .unwrap();
    assert_eq!(result.shielding_value, Zatoshis::from_u64(100_000).unwrap());
}

#[tokio::test]
async fn test_wildcard_exclusion_is_rejected() {
    let tw = TestWallet::regtest();
    let (_, derived, taddr) = tw.account_with_address();
    tw.fund_coinbase(&taddr, 2, coins(1));

    let err = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new("*", &derived.encoded).excluding("*"))
        .unwrap_err();
    assert!(matches!(err, Error::MalformedAddress(_)));

    let err = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new("*", &derived.encoded).excluding("nonsense"))
        .unwrap_err();
    assert!(matches!(err, Error::MalformedAddress(_)));
    assert_eq!(tw.wallet.locks().locked_count(), 0);
}

// ============================================================================
// Selection caps and locking
// ============================================================================

#[tokio::test]
async fn test_spent_inputs_stop_holding_locks() {
    let tw = TestWallet::regtest();
    let (_, derived, taddr) = tw.account_with_address();
    tw.fund_coinbase(&taddr, 6, coins(1));

    let first = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new(&taddr, &derived.encoded).with_limit(4))
        .unwrap();
    let state = tw
        .wallet
        .wait_for_operation(&first.operation_id, WAIT)
        .await
        .unwrap();
    assert_eq!(state.status, OperationStatus::Success);
    assert_eq!(tw.wallet.locks().locked_count(), 4);

    // The next selection sees the first operation's inputs spent.
    let second = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new(&taddr, &derived.encoded))
        .unwrap();
    assert_eq!(second.shielding_utxos, 2);
    assert_eq!(tw.wallet.locks().locked_count(), 2);
}

#[tokio::test]
async fn test_limits_partition_the_utxo_set() {
    let tw = TestWallet::regtest();
    let (_, derived, taddr) = tw.account_with_address();
    tw.fund_coinbase(&taddr, 100, coins(1));

    let first = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new(&taddr, &derived.encoded))
        .unwrap();
    assert_eq!(first.shielding_utxos, 50);
    assert_eq!(first.shielding_value, coins(50));
    assert_eq!(first.remaining_utxos, 50);
    assert_eq!(first.remaining_value, coins(50));

    let second = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new("*", &derived.encoded).with_limit(33))
        .unwrap();
    assert_eq!(second.shielding_utxos, 33);
    assert_eq!(second.remaining_utxos, 17);

    let third = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new(&taddr, &derived.encoded).with_limit(0))
        .unwrap();
    assert_eq!(third.shielding_utxos, 17);
    assert_eq!(third.remaining_utxos, 0);
    assert_eq!(tw.wallet.locks().locked_count(), 100);

    let err = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new(&taddr, &derived.encoded))
        .unwrap_err();
    assert_eq!(err.to_string(), NO_COINBASE_FUNDS);

    let ids = [first.operation_id, second.operation_id, third.operation_id];
    for id in &ids {
        let state = tw.wallet.wait_for_operation(id, WAIT).await.unwrap();
        assert_eq!(state.status, OperationStatus::Success, "{:?}", state.error);
    }
    assert_eq!(tw.wallet.list_operations(Some(OperationStatus::Success)).len(), 3);
}

#[tokio::test]
async fn test_excluded_address_is_left_alone() {
    let tw = TestWallet::regtest();
    let (_, derived, keep) = tw.account_with_address();
    let (_, _, other) = tw.account_with_address();
    tw.fund_coinbase(&keep, 4, coins(1));
    tw.fund_coinbase(&other, 3, coins(2));

    let result = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new("*", &derived.encoded).excluding(&keep))
        .unwrap();
    assert_eq!(result.shielding_utxos, 3);
    assert_eq!(result.shielding_value, coins(6));
    assert_eq!(result.remaining_utxos, 0);

    let state = tw
        .wallet
        .wait_for_operation(&result.operation_id, WAIT)
        .await
        .unwrap();
    assert_eq!(state.status, OperationStatus::Success);
    assert_eq!(
        tw.wallet.address_balance(&keep, Some(1)).unwrap(),
        PoolBalances::from([(Pool::Transparent, coins(4))])
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_never_share_utxos() {
    let tw = Arc::new(TestWallet::regtest());
    let (_, derived, taddr) = tw.account_with_address();
    let outpoints = tw.fund_coinbase(&taddr, 100, coins(1));

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let tw = tw.clone();
            let request = ShieldCoinbaseRequest::new("*", &derived.encoded).with_limit(25);
            tokio::spawn(async move { tw.wallet.shield_coinbase(&request) })
        })
        .collect();

    let mut selected = 0;
    let mut txids = HashSet::new();
    for task in tasks {
        let result = task.await.unwrap().unwrap();
        selected += result.shielding_utxos;
        let state = tw
            .wallet
            .wait_for_operation(&result.operation_id, WAIT)
            .await
            .unwrap();
        assert_eq!(state.status, OperationStatus::Success, "{:?}", state.error);
        txids.insert(state.txid.unwrap());
    }

    assert_eq!(selected, 100);
    assert_eq!(txids.len(), 4);
    for outpoint in &outpoints {
        let spender = tw.ledger.spent_by(outpoint).unwrap();
        assert!(txids.contains(&spender));
    }
}

// ============================================================================
// Asynchronous execution
// ============================================================================

#[tokio::test]
async fn test_rejected_broadcast_releases_locks() {
    let tw = TestWallet::with_relay(Arc::new(RejectingRelay("bad-txns-inputs-spent".into())));
    let (_, derived, taddr) = tw.account_with_address();
    tw.fund_coinbase(&taddr, 5, coins(1));

    let result = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new(&taddr, &derived.encoded))
        .unwrap();
    assert_eq!(tw.wallet.locks().locked_count(), 5);

    let state = tw
        .wallet
        .wait_for_operation(&result.operation_id, WAIT)
        .await
        .unwrap();
    assert_eq!(state.status, OperationStatus::Failed);
    assert_eq!(
        state.error.as_deref(),
        Some("Operation failed: bad-txns-inputs-spent")
    );
    assert_eq!(tw.wallet.locks().locked_count(), 0);

    // The same outputs are selectable again.
    let retry = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new(&taddr, &derived.encoded))
        .unwrap();
    assert_eq!(retry.shielding_utxos, 5);
}

#[tokio::test]
async fn test_shielded_funds_land_in_orchard() {
    let tw = orchard_wallet();
    let (account, derived, taddr) = tw.account_with_address();
    tw.fund_coinbase(&taddr, 10, coins(1));
    assert_eq!(
        tw.wallet.balance_for_account(account, Some(1)).unwrap(),
        PoolBalances::from([(Pool::Transparent, coins(10))])
    );

    let result = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new(&taddr, &derived.encoded))
        .unwrap();
    let state = tw
        .wallet
        .wait_for_operation(&result.operation_id, WAIT)
        .await
        .unwrap();
    assert_eq!(state.status, OperationStatus::Success);
    assert_eq!(state.method, "z_shieldcoinbase");
    assert!(state.execution_secs.is_some());

    // Ten inputs into Orchard: 10 transparent actions plus 2 padded actions.
    let shielded = coins(10).checked_sub(Zatoshis::from_u64(60_000).unwrap()).unwrap();
    assert!(tw.wallet.balance_for_account(account, Some(1)).unwrap().is_empty());
    assert_eq!(
        tw.wallet.balance_for_account(account, Some(0)).unwrap(),
        PoolBalances::from([(Pool::Orchard, shielded)])
    );

    tw.ledger.mine_blocks(1);
    assert_eq!(
        tw.wallet.balance_for_account(account, Some(1)).unwrap(),
        PoolBalances::from([(Pool::Orchard, shielded)])
    );

    assert_eq!(tw.wallet.prune_spent_locks().unwrap(), 10);
    let taken = tw
        .wallet
        .operation_result(&result.operation_id)
        .unwrap()
        .unwrap();
    assert_eq!(taken.txid, state.txid);
    assert!(matches!(
        tw.wallet.operation_status(&result.operation_id),
        Err(Error::UnknownOperation(_))
    ));
}

#[tokio::test]
async fn test_sapling_destination_before_orchard() {
    let tw = TestWallet::with_config(WalletConfig {
        orchard_activation_height: Some(1_000),
        ..WalletConfig::for_network(NetworkType::Regtest)
    });
    let (account, derived, taddr) = tw.account_with_address();
    tw.fund_coinbase(&taddr, 4, coins(1));

    let result = tw
        .wallet
        .shield_coinbase(&ShieldCoinbaseRequest::new(&taddr, &derived.encoded))
        .unwrap();
    let state = tw
        .wallet
        .wait_for_operation(&result.operation_id, WAIT)
        .await
        .unwrap();
    assert_eq!(state.status, OperationStatus::Success);

    // Four inputs into Sapling: 4 transparent actions plus one output.
    let shielded = coins(4).checked_sub(Zatoshis::from_u64(25_000).unwrap()).unwrap();
    assert_eq!(
        tw.wallet.balance_for_account(account, Some(0)).unwrap(),
        PoolBalances::from([(Pool::Sapling, shielded)])
    );
}
