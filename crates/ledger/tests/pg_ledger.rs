use ledger::{HoldStatus, JournalKind, Ledger, NewHold, NewJournalEntry, PgLedger};
use rust_decimal_macros::dec;
use sqlx::PgPool;
use uuid::Uuid;

async fn seed_user(pool: &PgPool, id: Uuid, balance: rust_decimal::Decimal) {
    sqlx::query("INSERT INTO users (id, display_name, email, wallet_balance) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(format!("user-{id}"))
        .bind(format!("{id}@example.com"))
        .bind(balance)
        .execute(pool)
        .await
        .unwrap();
}

async fn seed_auction(pool: &PgPool, id: Uuid, seller: Uuid, high_bid: rust_decimal::Decimal) {
    sqlx::query(
        r#"
        INSERT INTO auctions
            (id, product_id, seller_id, start_price, current_high_bid, status, end_time)
        VALUES ($1, $2, $3, $4, $4, 'ACTIVE', now() + interval '1 hour')
        "#,
    )
    .bind(id)
    .bind(Uuid::new_v4())
    .bind(seller)
    .bind(high_bid)
    .execute(pool)
    .await
    .unwrap();
}

#[sqlx::test(migrations = "./migrations")]
async fn deposit_reference_is_idempotent(pool: PgPool) {
    let ledger = PgLedger::new(pool);
    let user_id = Uuid::new_v4();
    seed_user(ledger.pool(), user_id, dec!(0.00)).await;

    let mut txn = ledger.begin().await.unwrap();
    assert!(!ledger.deposit_reference_exists(&mut txn, "ref-1").await.unwrap());
    ledger.update_user_balance(&mut txn, user_id, dec!(100.00)).await.unwrap();
    ledger
        .insert_journal_entry(
            &mut txn,
            NewJournalEntry {
                user_id,
                amount: dec!(100.00),
                kind: JournalKind::Deposit,
                reference: Some("ref-1".to_string()),
                auction_id: None,
            },
        )
        .await
        .unwrap();
    ledger.commit(txn).await.unwrap();

    let mut txn = ledger.begin().await.unwrap();
    assert!(ledger.deposit_reference_exists(&mut txn, "ref-1").await.unwrap());
    ledger.rollback(txn).await.unwrap();

    assert_eq!(ledger.get_balance(user_id).await.unwrap(), dec!(100.00));
}

// Self-outbid accumulates a second open SOFT hold for the same (auction,
// user) pair by design (spec.md §4.2/§9, DESIGN.md Open Question: "accept
// the anomaly"); the schema must allow this against the real database, not
// just against `MemLedger`'s unconstrained `HashMap`.
#[sqlx::test(migrations = "./migrations")]
async fn self_outbid_soft_holds_accumulate_against_the_real_schema(pool: PgPool) {
    let ledger = PgLedger::new(pool);
    let user_id = Uuid::new_v4();
    let seller_id = Uuid::new_v4();
    seed_user(ledger.pool(), user_id, dec!(10000.00)).await;
    seed_user(ledger.pool(), seller_id, dec!(0.00)).await;
    let auction_id = Uuid::new_v4();
    seed_auction(ledger.pool(), auction_id, seller_id, dec!(1000.00)).await;

    let mut txn = ledger.begin().await.unwrap();
    ledger
        .insert_hold(
            &mut txn,
            NewHold {
                auction_id,
                user_id,
                amount: dec!(1500.00),
                status: HoldStatus::Soft,
            },
        )
        .await
        .unwrap();
    ledger.commit(txn).await.unwrap();

    // A second open SOFT hold for the same (auction, user) pair, as a
    // self-outbid produces, must succeed rather than violate a constraint.
    let mut txn = ledger.begin().await.unwrap();
    let second = ledger
        .insert_hold(
            &mut txn,
            NewHold {
                auction_id,
                user_id,
                amount: dec!(2000.00),
                status: HoldStatus::Soft,
            },
        )
        .await;
    assert!(second.is_ok());
    ledger.commit(txn).await.unwrap();

    let open_holds = {
        let mut txn = ledger.begin().await.unwrap();
        let holds = ledger.find_open_soft_holds(&mut txn, auction_id).await.unwrap();
        ledger.rollback(txn).await.unwrap();
        holds
    };
    assert_eq!(open_holds.len(), 2);
}

// A HARD hold, by contrast, must stay unique per (auction, user): it is the
// single winning hold the Finalizer promotes, never accumulated.
#[sqlx::test(migrations = "./migrations")]
async fn at_most_one_hard_hold_per_auction_user(pool: PgPool) {
    let ledger = PgLedger::new(pool);
    let user_id = Uuid::new_v4();
    let seller_id = Uuid::new_v4();
    seed_user(ledger.pool(), user_id, dec!(10000.00)).await;
    seed_user(ledger.pool(), seller_id, dec!(0.00)).await;
    let auction_id = Uuid::new_v4();
    seed_auction(ledger.pool(), auction_id, seller_id, dec!(1000.00)).await;

    let mut txn = ledger.begin().await.unwrap();
    ledger
        .insert_hold(
            &mut txn,
            NewHold {
                auction_id,
                user_id,
                amount: dec!(1500.00),
                status: HoldStatus::Hard,
            },
        )
        .await
        .unwrap();
    ledger.commit(txn).await.unwrap();

    let mut txn = ledger.begin().await.unwrap();
    let result = ledger
        .insert_hold(
            &mut txn,
            NewHold {
                auction_id,
                user_id,
                amount: dec!(1800.00),
                status: HoldStatus::Hard,
            },
        )
        .await;
    assert!(result.is_err());
    ledger.rollback(txn).await.unwrap();
}

#[sqlx::test(migrations = "./migrations")]
async fn settlement_insert_is_conditional_on_auction(pool: PgPool) {
    let ledger = PgLedger::new(pool);
    let winner = Uuid::new_v4();
    let seller = Uuid::new_v4();
    seed_user(ledger.pool(), winner, dec!(5000.00)).await;
    seed_user(ledger.pool(), seller, dec!(0.00)).await;
    let auction_id = Uuid::new_v4();
    seed_auction(ledger.pool(), auction_id, seller, dec!(2000.00)).await;
    sqlx::query("UPDATE auctions SET status = 'ENDED', highest_bidder = $2 WHERE id = $1")
        .bind(auction_id)
        .bind(winner)
        .execute(ledger.pool())
        .await
        .unwrap();

    let mut txn = ledger.begin().await.unwrap();
    let first = ledger
        .insert_settlement_if_absent(
            &mut txn,
            ledger::NewSettlement {
                auction_id,
                winner_id: winner,
                seller_id: seller,
                amount: dec!(2000.00),
            },
        )
        .await
        .unwrap();
    assert!(first.is_some());
    let second = ledger
        .insert_settlement_if_absent(
            &mut txn,
            ledger::NewSettlement {
                auction_id,
                winner_id: winner,
                seller_id: seller,
                amount: dec!(2000.00),
            },
        )
        .await
        .unwrap();
    assert!(second.is_none());
    ledger.commit(txn).await.unwrap();

    let settlement = ledger.get_settlement_for_auction(auction_id).await.unwrap();
    assert_eq!(settlement.unwrap().status, ledger::SettlementStatus::Pending);
}
