use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum AuctionStatus {
    Active,
    Ended,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum HoldStatus {
    Soft,
    Hard,
    Released,
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalKind {
    Deposit,
    Withdraw,
    BidHold,
    Refund,
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum JournalStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SettlementStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub display_name: String,
    pub email: String,
    pub wallet_balance: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Auction {
    pub id: Uuid,
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub start_price: Decimal,
    pub current_high_bid: Decimal,
    pub highest_bidder: Option<Uuid>,
    pub end_time: DateTime<Utc>,
    pub status: AuctionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bid {
    pub id: Uuid,
    pub auction_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Hold {
    pub id: Uuid,
    pub auction_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub status: HoldStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JournalEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub kind: JournalKind,
    pub status: JournalStatus,
    pub reference: Option<String>,
    pub auction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Settlement {
    pub id: Uuid,
    pub auction_id: Uuid,
    pub winner_id: Uuid,
    pub seller_id: Uuid,
    pub amount: Decimal,
    pub winner_approved_at: Option<DateTime<Utc>>,
    pub seller_approved_at: Option<DateTime<Utc>>,
    pub status: SettlementStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: String,
    pub sender_id: Uuid,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of an auction row returned by a lock, trimmed to what callers
/// inside a transaction need without re-fetching the whole row.
#[derive(Debug, Clone)]
pub struct AuctionLock {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub current_high_bid: Decimal,
    pub highest_bidder: Option<Uuid>,
    pub status: AuctionStatus,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBid {
    pub auction_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewHold {
    pub auction_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub status: HoldStatus,
}

#[derive(Debug, Clone)]
pub struct NewJournalEntry {
    pub user_id: Uuid,
    pub amount: Decimal,
    pub kind: JournalKind,
    pub reference: Option<String>,
    pub auction_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewSettlement {
    pub auction_id: Uuid,
    pub winner_id: Uuid,
    pub seller_id: Uuid,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub room_id: String,
    pub sender_id: Uuid,
    pub body: Option<String>,
    pub image_url: Option<String>,
}

/// Room id is the lexicographic join of two participant ids (spec.md §6).
pub fn canonical_room_id(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a.to_string() <= b.to_string() {
        (a, b)
    } else {
        (b, a)
    };
    format!("{lo}_{hi}")
}
