use chrono::Utc;
use uuid::Uuid;

use ledger::{HoldStatus, JournalKind, Ledger, NewJournalEntry, SettlementStatus};

use crate::error::CoreError;

/// Observable result of `Approve` (spec.md §4.4).
#[derive(Debug, Clone, Copy)]
pub struct ApproveOutcome {
    pub my_approval_recorded: bool,
    pub both_approved: bool,
    pub new_status: SettlementStatus,
}

/// `Approve(callerUserID, auctionID)` (spec.md §4.4). Dual-approval gate:
/// the winner and the seller each approve once; the second approval moves
/// funds from the winner's HARD hold to the seller's wallet.
pub async fn approve<L: Ledger>(
    ledger: &L,
    caller: Uuid,
    auction_id: Uuid,
) -> Result<ApproveOutcome, CoreError> {
    let mut txn = ledger.begin().await?;
    let result = approve_txn(ledger, &mut txn, caller, auction_id).await;
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

async fn approve_txn<L: Ledger>(
    ledger: &L,
    txn: &mut L::Txn,
    caller: Uuid,
    auction_id: Uuid,
) -> Result<ApproveOutcome, CoreError> {
    // 1. Lock the settlement row.
    let settlement = ledger.lock_settlement(txn, auction_id).await?;
    if settlement.status == SettlementStatus::Completed {
        return Err(CoreError::Conflict("settlement already completed".into()));
    }

    // 2. Record this caller's approval.
    let now = Utc::now();
    if caller == settlement.winner_id {
        if settlement.winner_approved_at.is_some() {
            return Err(CoreError::Conflict("already approved".into()));
        }
        ledger
            .record_settlement_approval(txn, settlement.id, Some(now), None)
            .await?;
    } else if caller == settlement.seller_id {
        if settlement.seller_approved_at.is_some() {
            return Err(CoreError::Conflict("already approved".into()));
        }
        ledger
            .record_settlement_approval(txn, settlement.id, None, Some(now))
            .await?;
    } else {
        return Err(CoreError::Forbidden);
    }

    let winner_approved = settlement.winner_approved_at.is_some() || caller == settlement.winner_id;
    let seller_approved = settlement.seller_approved_at.is_some() || caller == settlement.seller_id;
    let both_approved = winner_approved && seller_approved;

    // 3. On the second approval, execute the transfer.
    if both_approved {
        ledger.complete_settlement(txn, settlement.id).await?;

        let winner_hold = ledger
            .find_open_hold(txn, auction_id, settlement.winner_id)
            .await?
            .ok_or(CoreError::Internal)?;
        ledger
            .update_hold_status(txn, winner_hold.id, HoldStatus::Settled)
            .await?;

        ledger
            .update_user_balance(txn, settlement.seller_id, settlement.amount)
            .await?;

        ledger
            .insert_journal_entry(
                txn,
                NewJournalEntry {
                    user_id: settlement.winner_id,
                    amount: settlement.amount,
                    kind: JournalKind::Transfer,
                    reference: None,
                    auction_id: Some(auction_id),
                },
            )
            .await?;
        ledger
            .insert_journal_entry(
                txn,
                NewJournalEntry {
                    user_id: settlement.seller_id,
                    amount: settlement.amount,
                    kind: JournalKind::Transfer,
                    reference: None,
                    auction_id: Some(auction_id),
                },
            )
            .await?;
    }

    Ok(ApproveOutcome {
        my_approval_recorded: true,
        both_approved,
        new_status: if both_approved {
            SettlementStatus::Completed
        } else {
            SettlementStatus::Pending
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::{Auction, AuctionStatus, MemLedger, NewHold, NewSettlement};
    use rust_decimal_macros::dec;

    async fn fixture() -> (MemLedger, Uuid, Uuid, Uuid, Uuid) {
        let ledger = MemLedger::new();
        let winner = Uuid::new_v4();
        let seller = Uuid::new_v4();
        ledger.seed_user(winner, "Bob", "bob@example.com", dec!(8000.00)).await;
        ledger.seed_user(seller, "Dan", "dan@example.com", dec!(0.00)).await;
        let auction_id = Uuid::new_v4();
        ledger
            .seed_auction(Auction {
                id: auction_id,
                product_id: Uuid::new_v4(),
                seller_id: seller,
                start_price: dec!(1000.00),
                current_high_bid: dec!(2000.00),
                highest_bidder: Some(winner),
                end_time: Utc::now(),
                status: AuctionStatus::Ended,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await;

        let mut txn = ledger.begin().await.unwrap();
        ledger
            .insert_hold(
                &mut txn,
                NewHold {
                    auction_id,
                    user_id: winner,
                    amount: dec!(2000.00),
                    status: HoldStatus::Hard,
                },
            )
            .await
            .unwrap();
        ledger
            .insert_settlement_if_absent(
                &mut txn,
                NewSettlement {
                    auction_id,
                    winner_id: winner,
                    seller_id: seller,
                    amount: dec!(2000.00),
                },
            )
            .await
            .unwrap();
        ledger.commit(txn).await.unwrap();

        (ledger, auction_id, winner, seller, Uuid::new_v4())
    }

    #[tokio::test]
    async fn dual_settle_scenario_from_spec_8_4() {
        let (ledger, auction_id, winner, seller, _) = fixture().await;

        let first = approve(&ledger, winner, auction_id).await.unwrap();
        assert!(!first.both_approved);
        assert_eq!(first.new_status, SettlementStatus::Pending);

        let second = approve(&ledger, seller, auction_id).await.unwrap();
        assert!(second.both_approved);
        assert_eq!(second.new_status, SettlementStatus::Completed);
        assert_eq!(ledger.get_balance(seller).await.unwrap(), dec!(2000.00));
    }

    #[tokio::test]
    async fn second_settle_after_completion_is_conflict() {
        let (ledger, auction_id, winner, seller, _) = fixture().await;
        approve(&ledger, winner, auction_id).await.unwrap();
        approve(&ledger, seller, auction_id).await.unwrap();

        let err = approve(&ledger, seller, auction_id).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        // Seller's wallet is credited exactly once.
        assert_eq!(ledger.get_balance(seller).await.unwrap(), dec!(2000.00));
    }

    #[tokio::test]
    async fn non_party_is_forbidden() {
        let (ledger, auction_id, _winner, _seller, stranger) = fixture().await;
        let err = approve(&ledger, stranger, auction_id).await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden));
    }
}
