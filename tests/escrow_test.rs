mod common;

use anyhow::Result;
use common::{amount, fund, store_counts, test_ledger};
use escrow_ledger::application::{
    ConfirmRequest, DepositRequest, ListTransactionsRequest, ReserveRequest, TransferRequest,
};
use escrow_ledger::domain::EntryType;
use escrow_ledger::{ErrorKind, LedgerError};

const BAD_AMOUNTS: [&str; 7] = ["0", "0.00", "-5", "abc", "", "   ", "0.004"];

#[tokio::test]
async fn test_invalid_amounts_change_nothing() -> Result<()> {
    let ledger = test_ledger().await?;
    let engine = &ledger.engine;
    fund(engine, 1, "100.00").await?;
    fund(engine, 2, "1.00").await?;
    engine.reserve(ReserveRequest::new(1, 5, 9, "10.00")).await?;

    let before = store_counts(engine).await?;

    for bad in BAD_AMOUNTS {
        let results = [
            engine.deposit(DepositRequest::new(3, bad)).await.err(),
            engine.reserve(ReserveRequest::new(1, 5, 10, bad)).await.err(),
            engine.confirm(ConfirmRequest::new(1, 5, 9, bad)).await.err(),
            engine.transfer(TransferRequest::new(1, 2, bad)).await.err(),
        ];
        for err in results {
            let err = err.expect("operation should have failed");
            assert_eq!(err.kind(), ErrorKind::InvalidAmount, "amount {:?}: {}", bad, err);
        }
    }

    // Missing amount entirely
    let missing = DepositRequest {
        user_id: 3,
        amount: None,
    };
    assert!(matches!(
        engine.deposit(missing).await,
        Err(LedgerError::InvalidAmount(_))
    ));

    assert_eq!(store_counts(engine).await?, before);
    assert_eq!(engine.get_balance(1).await?.balance, amount("90.00"));
    assert_eq!(engine.get_balance(2).await?.balance, amount("1.00"));

    Ok(())
}

#[tokio::test]
async fn test_first_deposit_opens_account() -> Result<()> {
    let ledger = test_ledger().await?;
    let engine = &ledger.engine;

    let outcome = engine.deposit(DepositRequest::new(42, "19.99")).await?;
    assert_eq!(outcome.balance, amount("19.99"));

    let page = engine.list_transactions(ListTransactionsRequest::new(42)).await?;
    assert_eq!(page.total, 1);
    let entry = &page.entries[0];
    assert_eq!(entry.id, outcome.entry_id);
    assert_eq!(entry.entry_type, EntryType::Deposit);
    assert_eq!(entry.amount, amount("19.99"));

    let counts = store_counts(engine).await?;
    assert_eq!(counts.accounts, 1);
    assert_eq!(counts.transactions, 1);

    Ok(())
}

#[tokio::test]
async fn test_deposits_accumulate_and_canonicalize() -> Result<()> {
    let ledger = test_ledger().await?;
    let engine = &ledger.engine;

    engine.deposit(DepositRequest::new(1, "10")).await?;
    engine.deposit(DepositRequest::new(1, "0.1")).await?;
    // Banker's rounding to two places
    let outcome = engine.deposit(DepositRequest::new(1, "0.205")).await?;

    assert_eq!(outcome.balance, amount("10.30"));
    assert_eq!(outcome.balance.to_string(), "10.30");
    assert_eq!(store_counts(engine).await?.accounts, 1);

    Ok(())
}

#[tokio::test]
async fn test_reserve_with_insufficient_funds_changes_nothing() -> Result<()> {
    let ledger = test_ledger().await?;
    let engine = &ledger.engine;
    fund(engine, 1, "30.00").await?;
    let before = store_counts(engine).await?;

    let err = engine
        .reserve(ReserveRequest::new(1, 5, 9, "30.01"))
        .await
        .unwrap_err();
    match err {
        LedgerError::InsufficientFunds {
            user_id,
            balance,
            required,
        } => {
            assert_eq!(user_id, 1);
            assert_eq!(balance, amount("30.00"));
            assert_eq!(required, amount("30.01"));
        }
        other => panic!("expected InsufficientFunds, got {other}"),
    }

    assert_eq!(store_counts(engine).await?, before);
    let view = engine.get_balance(1).await?;
    assert_eq!(view.balance, amount("30.00"));
    assert_eq!(view.reserved, amount("0.00"));

    Ok(())
}

#[tokio::test]
async fn test_reserve_whole_balance() -> Result<()> {
    let ledger = test_ledger().await?;
    let engine = &ledger.engine;
    fund(engine, 1, "30.00").await?;

    let outcome = engine.reserve(ReserveRequest::new(1, 5, 9, "30")).await?;
    assert_eq!(outcome.balance, amount("0.00"));

    let err = engine
        .reserve(ReserveRequest::new(1, 5, 10, "0.01"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);

    Ok(())
}

#[tokio::test]
async fn test_reserve_debits_and_records() -> Result<()> {
    let ledger = test_ledger().await?;
    let engine = &ledger.engine;
    fund(engine, 1, "100.00").await?;
    let before = store_counts(engine).await?;

    let outcome = engine.reserve(ReserveRequest::new(1, 5, 9, "40.00")).await?;
    assert_eq!(outcome.balance, amount("60.00"));
    assert_eq!(outcome.message, "funds reserved successfully");

    let after = store_counts(engine).await?;
    assert_eq!(after.reservations, before.reservations + 1);
    assert_eq!(after.transactions, before.transactions + 1);
    assert_eq!(after.revenue_records, before.revenue_records);

    let page = engine.list_transactions(ListTransactionsRequest::new(1)).await?;
    let entry = &page.entries[0];
    assert_eq!(entry.id, outcome.entry_id);
    assert_eq!(entry.entry_type, EntryType::Reserve);
    assert_eq!(entry.amount, amount("-40.00"));

    // A second reservation adds to the escrowed total
    let second = engine.reserve(ReserveRequest::new(1, 6, 1, "15.50")).await?;
    assert_eq!(second.reserved, amount("55.50"));
    assert_eq!(second.balance, amount("44.50"));

    Ok(())
}

#[tokio::test]
async fn test_reserve_for_unknown_user_is_not_found() -> Result<()> {
    let ledger = test_ledger().await?;

    let err = ledger
        .engine
        .reserve(ReserveRequest::new(9, 1, 1, "1.00"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(store_counts(&ledger.engine).await?.reservations, 0);

    Ok(())
}

#[tokio::test]
async fn test_confirm_without_reservation_writes_nothing() -> Result<()> {
    let ledger = test_ledger().await?;
    let engine = &ledger.engine;
    fund(engine, 1, "100.00").await?;
    engine.reserve(ReserveRequest::new(1, 5, 9, "40.00")).await?;
    let before = store_counts(engine).await?;

    // Every field of the key has to match
    for request in [
        ConfirmRequest::new(1, 5, 9, "39.99"),
        ConfirmRequest::new(1, 5, 8, "40.00"),
        ConfirmRequest::new(1, 4, 9, "40.00"),
        ConfirmRequest::new(2, 5, 9, "40.00"),
    ] {
        let err = engine.confirm(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReservationNotFound);
    }

    assert_eq!(store_counts(engine).await?, before);

    Ok(())
}

#[tokio::test]
async fn test_confirm_settles_without_touching_balance() -> Result<()> {
    let ledger = test_ledger().await?;
    let engine = &ledger.engine;
    fund(engine, 1, "100.00").await?;
    engine.reserve(ReserveRequest::new(1, 5, 9, "40.00")).await?;
    let before = store_counts(engine).await?;

    let outcome = engine.confirm(ConfirmRequest::new(1, 5, 9, "40")).await?;
    assert_eq!(outcome.message, "reservation confirmed successfully");

    let after = store_counts(engine).await?;
    assert_eq!(after.reservations, before.reservations - 1);
    assert_eq!(after.transactions, before.transactions + 1);
    assert_eq!(after.revenue_records, before.revenue_records + 1);

    let view = engine.get_balance(1).await?;
    assert_eq!(view.balance, amount("60.00"));
    assert_eq!(view.reserved, amount("0.00"));

    let page = engine.list_transactions(ListTransactionsRequest::new(1)).await?;
    let entry = &page.entries[0];
    assert_eq!(entry.id, outcome.entry_id);
    assert_eq!(entry.entry_type, EntryType::Confirm);
    assert_eq!(entry.amount, amount("-40.00"));

    Ok(())
}

#[tokio::test]
async fn test_confirm_is_not_idempotent() -> Result<()> {
    let ledger = test_ledger().await?;
    let engine = &ledger.engine;
    fund(engine, 1, "100.00").await?;
    engine.reserve(ReserveRequest::new(1, 5, 9, "40.00")).await?;

    engine.confirm(ConfirmRequest::new(1, 5, 9, "40.00")).await?;
    let before = store_counts(engine).await?;

    let err = engine
        .confirm(ConfirmRequest::new(1, 5, 9, "40.00"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReservationNotFound);
    assert_eq!(store_counts(engine).await?, before);

    Ok(())
}

#[tokio::test]
async fn test_duplicate_reservations_settle_one_at_a_time() -> Result<()> {
    let ledger = test_ledger().await?;
    let engine = &ledger.engine;
    fund(engine, 1, "100.00").await?;

    let first = engine.reserve(ReserveRequest::new(1, 5, 9, "10.00")).await?;
    ledger.clock.advance(chrono::Duration::seconds(1));
    let second = engine.reserve(ReserveRequest::new(1, 5, 9, "10.00")).await?;

    engine.confirm(ConfirmRequest::new(1, 5, 9, "10.00")).await?;
    let view = engine.get_balance(1).await?;
    assert_eq!(view.reserved, amount("10.00"));
    assert_eq!(view.reservations.len(), 1);
    assert_eq!(view.reservations[0].id, second.reservation_id);
    assert_ne!(view.reservations[0].id, first.reservation_id);

    engine.confirm(ConfirmRequest::new(1, 5, 9, "10.00")).await?;
    assert_eq!(engine.get_balance(1).await?.reserved, amount("0.00"));

    Ok(())
}

#[tokio::test]
async fn test_failed_debit_leaves_no_reservation() -> Result<()> {
    let ledger = test_ledger().await?;
    let engine = &ledger.engine;
    fund(engine, 1, "100.00").await?;
    let before = store_counts(engine).await?;

    let pool = engine.database().pool();
    sqlx::query(
        "CREATE TRIGGER reject_balance_update BEFORE UPDATE ON accounts \
         BEGIN SELECT RAISE(ABORT, 'balance update rejected'); END",
    )
    .execute(pool)
    .await?;

    let err = engine
        .reserve(ReserveRequest::new(1, 5, 9, "40.00"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert!(err.to_string().starts_with("reserve failed"), "{}", err);
    assert_eq!(store_counts(engine).await?, before);

    sqlx::query("DROP TRIGGER reject_balance_update")
        .execute(pool)
        .await?;
    let view = engine.get_balance(1).await?;
    assert_eq!(view.balance, amount("100.00"));
    assert_eq!(view.reserved, amount("0.00"));

    // The store is usable again once updates are accepted
    engine.reserve(ReserveRequest::new(1, 5, 9, "40.00")).await?;
    assert_eq!(engine.get_balance(1).await?.reserved, amount("40.00"));

    Ok(())
}

#[tokio::test]
async fn test_balance_overflow_is_rejected() -> Result<()> {
    let ledger = test_ledger().await?;
    let engine = &ledger.engine;
    fund(engine, 1, "10.00").await?;
    fund(engine, 2, "0.01").await?;

    sqlx::query("UPDATE accounts SET balance_cents = ? WHERE user_id = 2")
        .bind(i64::MAX - 50)
        .execute(engine.database().pool())
        .await?;
    let near_max = engine.get_balance(2).await?.balance;
    let before = store_counts(engine).await?;

    let err = engine
        .deposit(DepositRequest::new(2, "1.00"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAmount);

    let err = engine
        .transfer(TransferRequest::new(1, 2, "1.00"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAmount);

    assert_eq!(store_counts(engine).await?, before);
    assert_eq!(engine.get_balance(1).await?.balance, amount("10.00"));
    assert_eq!(engine.get_balance(2).await?.balance, near_max);

    // Headroom below the limit is still usable
    engine.deposit(DepositRequest::new(2, "0.50")).await?;

    Ok(())
}
