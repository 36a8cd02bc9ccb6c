use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use ledger::{AuctionStatus, HoldStatus, JournalKind, Ledger, NewBid, NewHold, NewJournalEntry};

use crate::error::{CoreError, NotFoundKind};

const BID_SETTLE_DEADLINE: Duration = Duration::from_secs(10);

/// Everything the caller needs to drive the Hub's post-commit fan-out
/// (spec.md §4.2: "after commit, and only after commit, the Bid Engine
/// hands two side-effect requests to the Hub"). Kept as plain data rather
/// than a direct `hub` dependency so `auction_core` stays decoupled from the
/// connection-registry crate; the HTTP handler wires this into `hub::Hub`.
#[derive(Debug, Clone)]
pub struct BidOutcome {
    pub auction_id: Uuid,
    pub bidder_id: Uuid,
    pub new_high_bid: Decimal,
    pub placed_at: DateTime<Utc>,
    pub displaced: Option<DisplacedBidder>,
}

#[derive(Debug, Clone)]
pub struct DisplacedBidder {
    pub user_id: Uuid,
    pub your_bid: Decimal,
    pub new_high_bid: Decimal,
    pub new_bidder: Uuid,
}

fn validate_amount(amount: Decimal) -> Result<(), CoreError> {
    if amount <= Decimal::ZERO {
        return Err(CoreError::InvalidInput("amount must be strictly positive".into()));
    }
    if amount.round_dp(2) != amount {
        return Err(CoreError::InvalidInput(
            "amount must have at most two fractional digits".into(),
        ));
    }
    Ok(())
}

/// `PlaceBid(callerUserID, auctionID, amount)` (spec.md §4.2). Runs the full
/// algorithm inside one Ledger transaction with the fixed lock order
/// auction → bidder → prior winner, bounded by a 10s deadline (spec.md §5).
pub async fn place_bid<L: Ledger>(
    ledger: &L,
    caller: Uuid,
    auction_id: Uuid,
    amount: Decimal,
) -> Result<BidOutcome, CoreError> {
    validate_amount(amount)?;

    match tokio::time::timeout(BID_SETTLE_DEADLINE, place_bid_inner(ledger, caller, auction_id, amount)).await {
        Ok(result) => result,
        Err(_) => Err(CoreError::Timeout),
    }
}

async fn place_bid_inner<L: Ledger>(
    ledger: &L,
    caller: Uuid,
    auction_id: Uuid,
    amount: Decimal,
) -> Result<BidOutcome, CoreError> {
    let mut txn = ledger.begin().await?;

    let result = place_bid_txn(ledger, &mut txn, caller, auction_id, amount).await;
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

async fn place_bid_txn<L: Ledger>(
    ledger: &L,
    txn: &mut L::Txn,
    caller: Uuid,
    auction_id: Uuid,
    amount: Decimal,
) -> Result<BidOutcome, CoreError> {
    // 1. Lock auction.
    let auction = ledger.lock_auction(txn, auction_id).await?;
    let now = Utc::now();
    if auction.status != AuctionStatus::Active || now >= auction.end_time {
        return Err(CoreError::Conflict("auction closed".into()));
    }

    // 2. Require amount > current_high_bid.
    if amount <= auction.current_high_bid {
        return Err(CoreError::Conflict("bid too low".into()));
    }

    // 3. Lock bidder's user row.
    let balance = ledger.lock_user(txn, caller).await?;
    if balance < amount {
        return Err(CoreError::InsufficientFunds);
    }

    // 4. Release the prior highest bidder's hold, unless it's the caller
    //    raising their own bid (self-outbid: see DESIGN.md Open Question).
    let mut displaced = None;
    if let Some(prior_bidder) = auction.highest_bidder {
        if prior_bidder != caller {
            let prior_hold = ledger
                .find_open_hold(txn, auction_id, prior_bidder)
                .await
                .map_err(|e| CoreError::not_found_as(NotFoundKind::DataIntegrity, e))?
                .ok_or(CoreError::Internal)?;
            ledger
                .update_hold_status(txn, prior_hold.id, HoldStatus::Released)
                .await?;
            ledger
                .update_user_balance(txn, prior_bidder, auction.current_high_bid)
                .await?;
            ledger
                .insert_journal_entry(
                    txn,
                    NewJournalEntry {
                        user_id: prior_bidder,
                        amount: auction.current_high_bid,
                        kind: JournalKind::Refund,
                        reference: None,
                        auction_id: Some(auction_id),
                    },
                )
                .await?;
            displaced = Some(DisplacedBidder {
                user_id: prior_bidder,
                your_bid: auction.current_high_bid,
                new_high_bid: amount,
                new_bidder: caller,
            });
        }
    }

    // 5. Debit the bidder.
    ledger.update_user_balance(txn, caller, -amount).await?;

    // 6. Journal the hold.
    ledger
        .insert_journal_entry(
            txn,
            NewJournalEntry {
                user_id: caller,
                amount,
                kind: JournalKind::BidHold,
                reference: None,
                auction_id: Some(auction_id),
            },
        )
        .await?;

    // 7. Insert the new SOFT hold.
    ledger
        .insert_hold(
            txn,
            NewHold {
                auction_id,
                user_id: caller,
                amount,
                status: HoldStatus::Soft,
            },
        )
        .await?;

    // 8. Advance the auction.
    ledger
        .update_auction_bid_state(txn, auction_id, amount, caller)
        .await?;

    // 9. Insert the immutable bid record.
    let bid = ledger
        .insert_bid(
            txn,
            NewBid {
                auction_id,
                user_id: caller,
                amount,
            },
        )
        .await?;

    Ok(BidOutcome {
        auction_id,
        bidder_id: caller,
        new_high_bid: amount,
        placed_at: bid.created_at,
        displaced,
    })
}

/// Masks a bidder's display name to a 4-char prefix plus `***` for the
/// public bid history (spec.md §6: `GET /api/auctions/{id}/bids`).
pub fn mask_bidder_tag(display_name: &str) -> String {
    let prefix: String = display_name.chars().take(4).collect();
    format!("{prefix}***")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use ledger::{Auction, AuctionStatus, MemLedger};
    use rust_decimal_macros::dec;

    async fn seeded_auction(ledger: &MemLedger, seller: Uuid, end_in_secs: i64) -> Uuid {
        let auction_id = Uuid::new_v4();
        ledger
            .seed_auction(Auction {
                id: auction_id,
                product_id: Uuid::new_v4(),
                seller_id: seller,
                start_price: dec!(1000.00),
                current_high_bid: dec!(1000.00),
                highest_bidder: None,
                end_time: Utc::now() + ChronoDuration::seconds(end_in_secs),
                status: AuctionStatus::Active,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await;
        auction_id
    }

    #[tokio::test]
    async fn happy_bid_scenario_from_spec_8_1() {
        let ledger = MemLedger::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let seller = Uuid::new_v4();
        ledger.seed_user(alice, "Alice", "alice@example.com", dec!(10000.00)).await;
        ledger.seed_user(bob, "Bob", "bob@example.com", dec!(10000.00)).await;
        ledger.seed_user(seller, "Seller", "seller@example.com", dec!(0.00)).await;
        let auction_id = seeded_auction(&ledger, seller, 3600).await;

        let outcome = place_bid(&ledger, alice, auction_id, dec!(1500.00)).await.unwrap();
        assert!(outcome.displaced.is_none());
        assert_eq!(ledger.get_balance(alice).await.unwrap(), dec!(8500.00));

        let outcome = place_bid(&ledger, bob, auction_id, dec!(2000.00)).await.unwrap();
        let displaced = outcome.displaced.expect("alice should be displaced");
        assert_eq!(displaced.user_id, alice);
        assert_eq!(ledger.get_balance(alice).await.unwrap(), dec!(10000.00));
        assert_eq!(ledger.get_balance(bob).await.unwrap(), dec!(8000.00));
    }

    #[tokio::test]
    async fn insufficient_funds_scenario_from_spec_8_2() {
        let ledger = MemLedger::new();
        let carol = Uuid::new_v4();
        let seller = Uuid::new_v4();
        ledger.seed_user(carol, "Carol", "carol@example.com", dec!(500.00)).await;
        ledger.seed_user(seller, "Seller", "seller@example.com", dec!(0.00)).await;
        let auction_id = seeded_auction(&ledger, seller, 3600).await;

        let err = place_bid(&ledger, carol, auction_id, dec!(1000.00)).await.unwrap_err();
        assert!(matches!(err, CoreError::InsufficientFunds));
        assert_eq!(ledger.get_balance(carol).await.unwrap(), dec!(500.00));
    }

    #[tokio::test]
    async fn bid_too_low_is_rejected_without_side_effects() {
        let ledger = MemLedger::new();
        let alice = Uuid::new_v4();
        let seller = Uuid::new_v4();
        ledger.seed_user(alice, "Alice", "alice@example.com", dec!(10000.00)).await;
        ledger.seed_user(seller, "Seller", "seller@example.com", dec!(0.00)).await;
        let auction_id = seeded_auction(&ledger, seller, 3600).await;

        let err = place_bid(&ledger, alice, auction_id, dec!(1000.00)).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        assert_eq!(ledger.get_balance(alice).await.unwrap(), dec!(10000.00));
    }

    #[tokio::test]
    async fn expired_auction_is_rejected_as_closed() {
        let ledger = MemLedger::new();
        let alice = Uuid::new_v4();
        let seller = Uuid::new_v4();
        ledger.seed_user(alice, "Alice", "alice@example.com", dec!(10000.00)).await;
        ledger.seed_user(seller, "Seller", "seller@example.com", dec!(0.00)).await;
        let auction_id = seeded_auction(&ledger, seller, -1).await;

        let err = place_bid(&ledger, alice, auction_id, dec!(1500.00)).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn self_outbid_accumulates_a_second_hold_per_design_decision() {
        let ledger = MemLedger::new();
        let alice = Uuid::new_v4();
        let seller = Uuid::new_v4();
        ledger.seed_user(alice, "Alice", "alice@example.com", dec!(10000.00)).await;
        ledger.seed_user(seller, "Seller", "seller@example.com", dec!(0.00)).await;
        let auction_id = seeded_auction(&ledger, seller, 3600).await;

        place_bid(&ledger, alice, auction_id, dec!(1500.00)).await.unwrap();
        let outcome = place_bid(&ledger, alice, auction_id, dec!(2000.00)).await.unwrap();

        assert!(outcome.displaced.is_none());
        // 10000 - 1500 - 2000, the first hold was never released.
        assert_eq!(ledger.get_balance(alice).await.unwrap(), dec!(6500.00));
    }

    #[test]
    fn mask_bidder_tag_keeps_a_four_char_prefix() {
        assert_eq!(mask_bidder_tag("Alexandria"), "Alex***");
        assert_eq!(mask_bidder_tag("Bo"), "Bo***");
    }
}
