use chrono::Utc;
use uuid::Uuid;

use ledger::{AuctionStatus, HoldStatus, JournalKind, Ledger, NewJournalEntry, NewSettlement};

use crate::error::CoreError;

/// Outcome of a finalize attempt, useful for logging and tests; the caller
/// re-fetches the auction row afterward rather than trusting this as a
/// cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct FinalizeOutcome {
    pub transitioned: bool,
    pub settlement_created: bool,
}

/// `FinalizeIfExpired(auctionID)` (spec.md §4.3). Idempotent: safe to call
/// from any read path. Two concurrent calls serialize on the auction row
/// lock; the second observes `status = ENDED` and exits as a no-op.
pub async fn finalize_if_expired<L: Ledger>(
    ledger: &L,
    auction_id: Uuid,
) -> Result<FinalizeOutcome, CoreError> {
    let mut txn = ledger.begin().await?;
    let result = finalize_txn(ledger, &mut txn, auction_id).await;
    match result {
        Ok(outcome) => {
            ledger.commit(txn).await?;
            Ok(outcome)
        }
        Err(err) => {
            ledger.rollback(txn).await?;
            Err(err)
        }
    }
}

async fn finalize_txn<L: Ledger>(
    ledger: &L,
    txn: &mut L::Txn,
    auction_id: Uuid,
) -> Result<FinalizeOutcome, CoreError> {
    // 1. Lock auction.
    let auction = ledger.lock_auction(txn, auction_id).await?;

    // 2. No-op unless ACTIVE and past its end time.
    let now = Utc::now();
    if auction.status != AuctionStatus::Active || now < auction.end_time {
        return Ok(FinalizeOutcome::default());
    }

    // 3. Transition to ENDED.
    ledger
        .update_auction_status(txn, auction_id, AuctionStatus::Ended)
        .await?;

    let mut outcome = FinalizeOutcome {
        transitioned: true,
        settlement_created: false,
    };

    // 4. Resolve holds and materialize a settlement, if there was a winner.
    if let Some(winner) = auction.highest_bidder {
        let open_holds = ledger.find_open_soft_holds(txn, auction_id).await?;

        // The winner may hold more than one open SOFT hold if they
        // self-outbid (spec.md §9): promote the one matching the final
        // price to HARD and release every other open hold defensively,
        // including any extra holds of the winner's own.
        let mut promoted = false;
        for hold in &open_holds {
            if !promoted && hold.user_id == winner && hold.amount == auction.current_high_bid {
                ledger
                    .update_hold_status(txn, hold.id, HoldStatus::Hard)
                    .await?;
                promoted = true;
            } else {
                ledger
                    .update_hold_status(txn, hold.id, HoldStatus::Released)
                    .await?;
                ledger.update_user_balance(txn, hold.user_id, hold.amount).await?;
                ledger
                    .insert_journal_entry(
                        txn,
                        NewJournalEntry {
                            user_id: hold.user_id,
                            amount: hold.amount,
                            kind: JournalKind::Refund,
                            reference: None,
                            auction_id: Some(auction_id),
                        },
                    )
                    .await?;
            }
        }
        if !promoted {
            tracing::error!(%auction_id, %winner, "winner has no open hold at finalize time");
            return Err(CoreError::Internal);
        }

        let created = ledger
            .insert_settlement_if_absent(
                txn,
                NewSettlement {
                    auction_id,
                    winner_id: winner,
                    seller_id: auction.seller_id,
                    amount: auction.current_high_bid,
                },
            )
            .await?;
        outcome.settlement_created = created.is_some();
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use ledger::{Auction, AuctionStatus, MemLedger};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn expired_read_finalize_scenario_from_spec_8_3() {
        let ledger = MemLedger::new();
        let bob = Uuid::new_v4();
        let seller = Uuid::new_v4();
        ledger.seed_user(bob, "Bob", "bob@example.com", dec!(8000.00)).await;
        ledger.seed_user(seller, "Seller", "seller@example.com", dec!(0.00)).await;
        let auction_id = Uuid::new_v4();
        ledger
            .seed_auction(Auction {
                id: auction_id,
                product_id: Uuid::new_v4(),
                seller_id: seller,
                start_price: dec!(1000.00),
                current_high_bid: dec!(2000.00),
                highest_bidder: Some(bob),
                end_time: Utc::now() - ChronoDuration::seconds(1),
                status: AuctionStatus::Active,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await;
        // Seed the winner's open SOFT hold as place_bid would have left it.
        {
            let mut txn = ledger.begin().await.unwrap();
            ledger
                .insert_hold(
                    &mut txn,
                    ledger::NewHold {
                        auction_id,
                        user_id: bob,
                        amount: dec!(2000.00),
                        status: ledger::HoldStatus::Soft,
                    },
                )
                .await
                .unwrap();
            ledger.commit(txn).await.unwrap();
        }

        let outcome = finalize_if_expired(&ledger, auction_id).await.unwrap();
        assert!(outcome.transitioned);
        assert!(outcome.settlement_created);

        let auction = ledger.get_auction_by_id(auction_id).await.unwrap();
        assert_eq!(auction.status, AuctionStatus::Ended);

        let settlement = ledger
            .get_settlement_for_auction(auction_id)
            .await
            .unwrap()
            .expect("settlement must exist");
        assert_eq!(settlement.amount, dec!(2000.00));
    }

    #[tokio::test]
    async fn auction_with_no_bids_ends_without_a_settlement() {
        let ledger = MemLedger::new();
        let seller = Uuid::new_v4();
        ledger.seed_user(seller, "Seller", "seller@example.com", dec!(0.00)).await;
        let auction_id = Uuid::new_v4();
        ledger
            .seed_auction(Auction {
                id: auction_id,
                product_id: Uuid::new_v4(),
                seller_id: seller,
                start_price: dec!(1000.00),
                current_high_bid: dec!(1000.00),
                highest_bidder: None,
                end_time: Utc::now() - ChronoDuration::seconds(1),
                status: AuctionStatus::Active,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await;

        let outcome = finalize_if_expired(&ledger, auction_id).await.unwrap();
        assert!(outcome.transitioned);
        assert!(!outcome.settlement_created);
        assert!(ledger
            .get_settlement_for_auction(auction_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn second_finalize_call_is_a_no_op() {
        let ledger = MemLedger::new();
        let seller = Uuid::new_v4();
        ledger.seed_user(seller, "Seller", "seller@example.com", dec!(0.00)).await;
        let auction_id = Uuid::new_v4();
        ledger
            .seed_auction(Auction {
                id: auction_id,
                product_id: Uuid::new_v4(),
                seller_id: seller,
                start_price: dec!(1000.00),
                current_high_bid: dec!(1000.00),
                highest_bidder: None,
                end_time: Utc::now() - ChronoDuration::seconds(1),
                status: AuctionStatus::Active,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await;

        let first = finalize_if_expired(&ledger, auction_id).await.unwrap();
        assert!(first.transitioned);
        let second = finalize_if_expired(&ledger, auction_id).await.unwrap();
        assert!(!second.transitioned);
    }
}
