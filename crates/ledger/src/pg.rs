use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::*;
use crate::Ledger;

/// Postgres-backed implementation of the Ledger Store. Every multi-step
/// operation runs inside one `sqlx::Transaction` with `SELECT ... FOR
/// UPDATE` locks taken in the fixed order spec.md §5 requires (auction →
/// bidder → prior-winner → settlement); callers are responsible for taking
/// the locks in that order by calling the lock_* methods in sequence.
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Ledger for PgLedger {
    type Txn = sqlx::Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Txn, StoreError> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, txn: Self::Txn) -> Result<(), StoreError> {
        Ok(txn.commit().await?)
    }

    async fn rollback(&self, txn: Self::Txn) -> Result<(), StoreError> {
        Ok(txn.rollback().await?)
    }

    async fn lock_auction(
        &self,
        txn: &mut Self::Txn,
        auction_id: Uuid,
    ) -> Result<AuctionLock, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, seller_id, current_high_bid, highest_bidder, status, end_time
            FROM auctions
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(auction_id)
        .fetch_optional(&mut **txn)
        .await?
        .ok_or(StoreError::NotFound)?;

        Ok(AuctionLock {
            id: row.try_get("id")?,
            seller_id: row.try_get("seller_id")?,
            current_high_bid: row.try_get("current_high_bid")?,
            highest_bidder: row.try_get("highest_bidder")?,
            status: row.try_get("status")?,
            end_time: row.try_get("end_time")?,
        })
    }

    async fn lock_user(&self, txn: &mut Self::Txn, user_id: Uuid) -> Result<Decimal, StoreError> {
        let row = sqlx::query(r#"SELECT wallet_balance FROM users WHERE id = $1 FOR UPDATE"#)
            .bind(user_id)
            .fetch_optional(&mut **txn)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(row.try_get("wallet_balance")?)
    }

    async fn insert_bid(&self, txn: &mut Self::Txn, bid: NewBid) -> Result<Bid, StoreError> {
        let row = sqlx::query_as::<_, Bid>(
            r#"
            INSERT INTO bids (id, auction_id, user_id, amount, created_at)
            VALUES ($1, $2, $3, $4, now())
            RETURNING id, auction_id, user_id, amount, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(bid.auction_id)
        .bind(bid.user_id)
        .bind(bid.amount)
        .fetch_one(&mut **txn)
        .await?;
        Ok(row)
    }

    async fn insert_hold(&self, txn: &mut Self::Txn, hold: NewHold) -> Result<Hold, StoreError> {
        let row = sqlx::query_as::<_, Hold>(
            r#"
            INSERT INTO holds (id, auction_id, user_id, amount, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, now(), now())
            RETURNING id, auction_id, user_id, amount, status, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(hold.auction_id)
        .bind(hold.user_id)
        .bind(hold.amount)
        .bind(hold.status)
        .fetch_one(&mut **txn)
        .await?;
        Ok(row)
    }

    async fn insert_journal_entry(
        &self,
        txn: &mut Self::Txn,
        entry: NewJournalEntry,
    ) -> Result<JournalEntry, StoreError> {
        let row = sqlx::query_as::<_, JournalEntry>(
            r#"
            INSERT INTO journal_entries
                (id, user_id, amount, kind, status, reference, auction_id, created_at)
            VALUES ($1, $2, $3, $4, 'COMPLETED', $5, $6, now())
            RETURNING id, user_id, amount, kind, status, reference, auction_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.user_id)
        .bind(entry.amount)
        .bind(entry.kind)
        .bind(entry.reference)
        .bind(entry.auction_id)
        .fetch_one(&mut **txn)
        .await?;
        Ok(row)
    }

    async fn update_auction_bid_state(
        &self,
        txn: &mut Self::Txn,
        auction_id: Uuid,
        new_high_bid: Decimal,
        highest_bidder: Uuid,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE auctions
            SET current_high_bid = $2, highest_bidder = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(auction_id)
        .bind(new_high_bid)
        .bind(highest_bidder)
        .execute(&mut **txn)
        .await?;
        Ok(())
    }

    async fn update_auction_status(
        &self,
        txn: &mut Self::Txn,
        auction_id: Uuid,
        status: AuctionStatus,
    ) -> Result<(), StoreError> {
        sqlx::query(r#"UPDATE auctions SET status = $2, updated_at = now() WHERE id = $1"#)
            .bind(auction_id)
            .bind(status)
            .execute(&mut **txn)
            .await?;
        Ok(())
    }

    async fn find_open_hold(
        &self,
        txn: &mut Self::Txn,
        auction_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Hold>, StoreError> {
        let row = sqlx::query_as::<_, Hold>(
            r#"
            SELECT id, auction_id, user_id, amount, status, created_at, updated_at
            FROM holds
            WHERE auction_id = $1 AND user_id = $2 AND status IN ('SOFT', 'HARD')
            FOR UPDATE
            "#,
        )
        .bind(auction_id)
        .bind(user_id)
        .fetch_optional(&mut **txn)
        .await?;
        Ok(row)
    }

    async fn find_open_soft_holds(
        &self,
        txn: &mut Self::Txn,
        auction_id: Uuid,
    ) -> Result<Vec<Hold>, StoreError> {
        let rows = sqlx::query_as::<_, Hold>(
            r#"
            SELECT id, auction_id, user_id, amount, status, created_at, updated_at
            FROM holds
            WHERE auction_id = $1 AND status = 'SOFT'
            FOR UPDATE
            "#,
        )
        .bind(auction_id)
        .fetch_all(&mut **txn)
        .await?;
        Ok(rows)
    }

    async fn update_hold_status(
        &self,
        txn: &mut Self::Txn,
        hold_id: Uuid,
        status: HoldStatus,
    ) -> Result<(), StoreError> {
        sqlx::query(r#"UPDATE holds SET status = $2, updated_at = now() WHERE id = $1"#)
            .bind(hold_id)
            .bind(status)
            .execute(&mut **txn)
            .await?;
        Ok(())
    }

    async fn update_user_balance(
        &self,
        txn: &mut Self::Txn,
        user_id: Uuid,
        delta: Decimal,
    ) -> Result<Decimal, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE users
            SET wallet_balance = wallet_balance + $2
            WHERE id = $1
            RETURNING wallet_balance
            "#,
        )
        .bind(user_id)
        .bind(delta)
        .fetch_optional(&mut **txn)
        .await?
        .ok_or(StoreError::NotFound)?;
        Ok(row.try_get("wallet_balance")?)
    }

    async fn insert_settlement_if_absent(
        &self,
        txn: &mut Self::Txn,
        settlement: NewSettlement,
    ) -> Result<Option<Settlement>, StoreError> {
        let row = sqlx::query_as::<_, Settlement>(
            r#"
            INSERT INTO settlements
                (id, auction_id, winner_id, seller_id, amount, status, created_at)
            VALUES ($1, $2, $3, $4, $5, 'PENDING', now())
            ON CONFLICT (auction_id) DO NOTHING
            RETURNING id, auction_id, winner_id, seller_id, amount,
                      winner_approved_at, seller_approved_at, status, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(settlement.auction_id)
        .bind(settlement.winner_id)
        .bind(settlement.seller_id)
        .bind(settlement.amount)
        .fetch_optional(&mut **txn)
        .await?;
        Ok(row)
    }

    async fn lock_settlement(
        &self,
        txn: &mut Self::Txn,
        auction_id: Uuid,
    ) -> Result<Settlement, StoreError> {
        let row = sqlx::query_as::<_, Settlement>(
            r#"
            SELECT id, auction_id, winner_id, seller_id, amount,
                   winner_approved_at, seller_approved_at, status, created_at
            FROM settlements
            WHERE auction_id = $1
            FOR UPDATE
            "#,
        )
        .bind(auction_id)
        .fetch_optional(&mut **txn)
        .await?
        .ok_or(StoreError::NotFound)?;
        Ok(row)
    }

    async fn record_settlement_approval(
        &self,
        txn: &mut Self::Txn,
        settlement_id: Uuid,
        winner_approved_at: Option<DateTime<Utc>>,
        seller_approved_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE settlements
            SET winner_approved_at = COALESCE($2, winner_approved_at),
                seller_approved_at = COALESCE($3, seller_approved_at)
            WHERE id = $1
            "#,
        )
        .bind(settlement_id)
        .bind(winner_approved_at)
        .bind(seller_approved_at)
        .execute(&mut **txn)
        .await?;
        Ok(())
    }

    async fn complete_settlement(
        &self,
        txn: &mut Self::Txn,
        settlement_id: Uuid,
    ) -> Result<(), StoreError> {
        sqlx::query(r#"UPDATE settlements SET status = 'COMPLETED' WHERE id = $1"#)
            .bind(settlement_id)
            .execute(&mut **txn)
            .await?;
        Ok(())
    }

    async fn deposit_reference_exists(
        &self,
        txn: &mut Self::Txn,
        reference: &str,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM journal_entries
                WHERE reference = $1 AND kind = 'DEPOSIT' AND status = 'COMPLETED'
            ) AS present
            "#,
        )
        .bind(reference)
        .fetch_one(&mut **txn)
        .await?;
        Ok(row.try_get("present")?)
    }

    async fn get_auction(
        &self,
        txn: &mut Self::Txn,
        auction_id: Uuid,
    ) -> Result<Auction, StoreError> {
        let row = sqlx::query_as::<_, Auction>(
            r#"
            SELECT id, product_id, seller_id, start_price, current_high_bid, highest_bidder,
                   end_time, status, created_at, updated_at
            FROM auctions
            WHERE id = $1
            "#,
        )
        .bind(auction_id)
        .fetch_optional(&mut **txn)
        .await?
        .ok_or(StoreError::NotFound)?;
        Ok(row)
    }

    async fn get_user_display_name(
        &self,
        txn: &mut Self::Txn,
        user_id: Uuid,
    ) -> Result<String, StoreError> {
        let row = sqlx::query(r#"SELECT display_name FROM users WHERE id = $1"#)
            .bind(user_id)
            .fetch_optional(&mut **txn)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(row.try_get("display_name")?)
    }

    async fn insert_chat_message(
        &self,
        txn: &mut Self::Txn,
        msg: NewChatMessage,
    ) -> Result<ChatMessage, StoreError> {
        let row = sqlx::query_as::<_, ChatMessage>(
            r#"
            INSERT INTO chat_messages (id, room_id, sender_id, body, image_url, created_at)
            VALUES ($1, $2, $3, $4, $5, now())
            RETURNING id, room_id, sender_id, body, image_url, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(msg.room_id)
        .bind(msg.sender_id)
        .bind(msg.body)
        .bind(msg.image_url)
        .fetch_one(&mut **txn)
        .await?;
        Ok(row)
    }

    async fn get_auction_by_id(&self, auction_id: Uuid) -> Result<Auction, StoreError> {
        let row = sqlx::query_as::<_, Auction>(
            r#"
            SELECT id, product_id, seller_id, start_price, current_high_bid, highest_bidder,
                   end_time, status, created_at, updated_at
            FROM auctions
            WHERE id = $1
            "#,
        )
        .bind(auction_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;
        Ok(row)
    }

    async fn get_settlement_for_auction(
        &self,
        auction_id: Uuid,
    ) -> Result<Option<Settlement>, StoreError> {
        let row = sqlx::query_as::<_, Settlement>(
            r#"
            SELECT id, auction_id, winner_id, seller_id, amount,
                   winner_approved_at, seller_approved_at, status, created_at
            FROM settlements
            WHERE auction_id = $1
            "#,
        )
        .bind(auction_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_recent_bids(&self, auction_id: Uuid, limit: i64) -> Result<Vec<Bid>, StoreError> {
        let rows = sqlx::query_as::<_, Bid>(
            r#"
            SELECT id, auction_id, user_id, amount, created_at
            FROM bids
            WHERE auction_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(auction_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_recent_journal(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<JournalEntry>, StoreError> {
        let rows = sqlx::query_as::<_, JournalEntry>(
            r#"
            SELECT id, user_id, amount, kind, status, reference, auction_id, created_at
            FROM journal_entries
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_balance(&self, user_id: Uuid) -> Result<Decimal, StoreError> {
        let row = sqlx::query(r#"SELECT wallet_balance FROM users WHERE id = $1"#)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(row.try_get("wallet_balance")?)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, User>(
            r#"
            SELECT id, display_name, email, wallet_balance, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;
        Ok(row)
    }
}
