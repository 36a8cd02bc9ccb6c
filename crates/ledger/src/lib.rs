pub mod error;
pub mod mem;
pub mod models;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

pub use error::StoreError;
pub use mem::MemLedger;
pub use models::*;
pub use pg::PgLedger;

/// Durable, transactional access to every entity in the data model
/// (spec.md §3), exposed as scoped transactions with serializable row-level
/// locking semantics (spec.md §4.1). Implementations must release all locks
/// held by a transaction on both `commit` and `rollback`, and on drop if
/// neither was called.
#[async_trait]
pub trait Ledger: Send + Sync {
    type Txn: Send;

    async fn begin(&self) -> Result<Self::Txn, StoreError>;
    async fn commit(&self, txn: Self::Txn) -> Result<(), StoreError>;
    async fn rollback(&self, txn: Self::Txn) -> Result<(), StoreError>;

    /// Returns (current high bid, highest bidder or absent, status, end
    /// time, seller id).
    async fn lock_auction(
        &self,
        txn: &mut Self::Txn,
        auction_id: Uuid,
    ) -> Result<AuctionLock, StoreError>;

    /// Returns the user's current wallet balance.
    async fn lock_user(&self, txn: &mut Self::Txn, user_id: Uuid) -> Result<Decimal, StoreError>;

    async fn insert_bid(&self, txn: &mut Self::Txn, bid: NewBid) -> Result<Bid, StoreError>;

    async fn insert_hold(&self, txn: &mut Self::Txn, hold: NewHold) -> Result<Hold, StoreError>;

    async fn insert_journal_entry(
        &self,
        txn: &mut Self::Txn,
        entry: NewJournalEntry,
    ) -> Result<JournalEntry, StoreError>;

    async fn update_auction_bid_state(
        &self,
        txn: &mut Self::Txn,
        auction_id: Uuid,
        new_high_bid: Decimal,
        highest_bidder: Uuid,
    ) -> Result<(), StoreError>;

    async fn update_auction_status(
        &self,
        txn: &mut Self::Txn,
        auction_id: Uuid,
        status: AuctionStatus,
    ) -> Result<(), StoreError>;

    /// The single open (SOFT or HARD) hold for (auction, user), if any.
    async fn find_open_hold(
        &self,
        txn: &mut Self::Txn,
        auction_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Hold>, StoreError>;

    /// Every SOFT hold still open on an auction, defensive against the
    /// self-outbid anomaly described in spec.md §9.
    async fn find_open_soft_holds(
        &self,
        txn: &mut Self::Txn,
        auction_id: Uuid,
    ) -> Result<Vec<Hold>, StoreError>;

    async fn update_hold_status(
        &self,
        txn: &mut Self::Txn,
        hold_id: Uuid,
        status: HoldStatus,
    ) -> Result<(), StoreError>;

    /// Applies a signed delta to a user's balance and returns the new
    /// balance. Callers are responsible for having already locked the row.
    async fn update_user_balance(
        &self,
        txn: &mut Self::Txn,
        user_id: Uuid,
        delta: Decimal,
    ) -> Result<Decimal, StoreError>;

    /// Conditional insert: returns `Some` for the newly created row, or
    /// `None` if a settlement already existed for this auction (idempotent).
    async fn insert_settlement_if_absent(
        &self,
        txn: &mut Self::Txn,
        settlement: NewSettlement,
    ) -> Result<Option<Settlement>, StoreError>;

    async fn lock_settlement(
        &self,
        txn: &mut Self::Txn,
        auction_id: Uuid,
    ) -> Result<Settlement, StoreError>;

    async fn record_settlement_approval(
        &self,
        txn: &mut Self::Txn,
        settlement_id: Uuid,
        winner_approved_at: Option<DateTime<Utc>>,
        seller_approved_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    async fn complete_settlement(
        &self,
        txn: &mut Self::Txn,
        settlement_id: Uuid,
    ) -> Result<(), StoreError>;

    /// True if a COMPLETED DEPOSIT with this reference already exists.
    async fn deposit_reference_exists(
        &self,
        txn: &mut Self::Txn,
        reference: &str,
    ) -> Result<bool, StoreError>;

    async fn get_auction(&self, txn: &mut Self::Txn, auction_id: Uuid)
        -> Result<Auction, StoreError>;

    async fn get_user_display_name(
        &self,
        txn: &mut Self::Txn,
        user_id: Uuid,
    ) -> Result<String, StoreError>;

    async fn insert_chat_message(
        &self,
        txn: &mut Self::Txn,
        msg: NewChatMessage,
    ) -> Result<ChatMessage, StoreError>;

    // Read paths outside a transaction scope: the Finalizer runs first
    // through a transaction, so these always observe a fresh status.
    async fn get_auction_by_id(&self, auction_id: Uuid) -> Result<Auction, StoreError>;
    async fn get_settlement_for_auction(
        &self,
        auction_id: Uuid,
    ) -> Result<Option<Settlement>, StoreError>;
    async fn list_recent_bids(&self, auction_id: Uuid, limit: i64) -> Result<Vec<Bid>, StoreError>;
    async fn list_recent_journal(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<JournalEntry>, StoreError>;
    async fn get_balance(&self, user_id: Uuid) -> Result<Decimal, StoreError>;
    async fn get_user_by_id(&self, user_id: Uuid) -> Result<User, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn canonical_room_id_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(canonical_room_id(a, b), canonical_room_id(b, a));
    }

    #[tokio::test]
    async fn mem_ledger_tracks_balance_through_a_transaction() {
        let ledger = MemLedger::new();
        let user_id = Uuid::new_v4();
        ledger
            .seed_user(user_id, "Alice", "alice@example.com", dec!(100.00))
            .await;

        let mut txn = ledger.begin().await.unwrap();
        let balance = ledger.lock_user(&mut txn, user_id).await.unwrap();
        assert_eq!(balance, dec!(100.00));
        let new_balance = ledger
            .update_user_balance(&mut txn, user_id, dec!(-40.00))
            .await
            .unwrap();
        assert_eq!(new_balance, dec!(60.00));
        ledger.commit(txn).await.unwrap();

        assert_eq!(ledger.get_balance(user_id).await.unwrap(), dec!(60.00));
    }

    #[tokio::test]
    async fn mem_ledger_rollback_reverts_balance_change() {
        let ledger = MemLedger::new();
        let user_id = Uuid::new_v4();
        ledger
            .seed_user(user_id, "Bob", "bob@example.com", dec!(100.00))
            .await;

        let mut txn = ledger.begin().await.unwrap();
        ledger
            .update_user_balance(&mut txn, user_id, dec!(-40.00))
            .await
            .unwrap();
        ledger.rollback(txn).await.unwrap();

        assert_eq!(ledger.get_balance(user_id).await.unwrap(), dec!(100.00));
    }
}
