use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::*;
use crate::Ledger;

/// In-memory test double for the Ledger Store, used by `auction_core`'s
/// unit tests so bid/finalize/settle logic can be exercised without a live
/// Postgres instance (no toolchain is available to run one here). Mirrors
/// the static-method storage-manager shape from the teacher's
/// `storage/*_store.rs` modules, adapted to a single `Mutex`-guarded state
/// and async methods.
#[derive(Clone)]
pub struct MemLedger {
    state: Arc<Mutex<MemState>>,
}

#[derive(Default, Clone)]
struct MemState {
    users: HashMap<Uuid, User>,
    auctions: HashMap<Uuid, Auction>,
    bids: Vec<Bid>,
    holds: HashMap<Uuid, Hold>,
    journal: Vec<JournalEntry>,
    settlements_by_auction: HashMap<Uuid, Settlement>,
    chat_messages: Vec<ChatMessage>,
}

/// The whole mock is serialized through one guard, taken at `begin` and
/// released at `commit`/`rollback`; this is coarser than Postgres's
/// per-row locks but preserves the same observable atomicity for a single
/// in-process test.
pub struct MemTxn {
    guard: OwnedMutexGuard<MemState>,
    snapshot: MemState,
}

impl Default for MemLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemLedger {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemState::default())),
        }
    }

    /// Test fixture helper: insert a user directly, bypassing the
    /// transaction machinery.
    pub async fn seed_user(&self, id: Uuid, display_name: &str, email: &str, balance: Decimal) {
        let mut state = self.state.lock().await;
        state.users.insert(
            id,
            User {
                id,
                display_name: display_name.to_string(),
                email: email.to_string(),
                wallet_balance: balance,
                created_at: Utc::now(),
            },
        );
    }

    /// Test fixture helper: insert an auction directly.
    pub async fn seed_auction(&self, auction: Auction) {
        let mut state = self.state.lock().await;
        state.auctions.insert(auction.id, auction);
    }
}

#[async_trait]
impl Ledger for MemLedger {
    type Txn = MemTxn;

    async fn begin(&self) -> Result<Self::Txn, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(MemTxn { guard, snapshot })
    }

    async fn commit(&self, _txn: Self::Txn) -> Result<(), StoreError> {
        Ok(())
    }

    async fn rollback(&self, mut txn: Self::Txn) -> Result<(), StoreError> {
        *txn.guard = txn.snapshot;
        Ok(())
    }

    async fn lock_auction(
        &self,
        txn: &mut Self::Txn,
        auction_id: Uuid,
    ) -> Result<AuctionLock, StoreError> {
        let a = txn
            .guard
            .auctions
            .get(&auction_id)
            .ok_or(StoreError::NotFound)?;
        Ok(AuctionLock {
            id: a.id,
            seller_id: a.seller_id,
            current_high_bid: a.current_high_bid,
            highest_bidder: a.highest_bidder,
            status: a.status,
            end_time: a.end_time,
        })
    }

    async fn lock_user(&self, txn: &mut Self::Txn, user_id: Uuid) -> Result<Decimal, StoreError> {
        txn.guard
            .users
            .get(&user_id)
            .map(|u| u.wallet_balance)
            .ok_or(StoreError::NotFound)
    }

    async fn insert_bid(&self, txn: &mut Self::Txn, bid: NewBid) -> Result<Bid, StoreError> {
        let row = Bid {
            id: Uuid::new_v4(),
            auction_id: bid.auction_id,
            user_id: bid.user_id,
            amount: bid.amount,
            created_at: Utc::now(),
        };
        txn.guard.bids.push(row.clone());
        Ok(row)
    }

    async fn insert_hold(&self, txn: &mut Self::Txn, hold: NewHold) -> Result<Hold, StoreError> {
        let now = Utc::now();
        let row = Hold {
            id: Uuid::new_v4(),
            auction_id: hold.auction_id,
            user_id: hold.user_id,
            amount: hold.amount,
            status: hold.status,
            created_at: now,
            updated_at: now,
        };
        txn.guard.holds.insert(row.id, row.clone());
        Ok(row)
    }

    async fn insert_journal_entry(
        &self,
        txn: &mut Self::Txn,
        entry: NewJournalEntry,
    ) -> Result<JournalEntry, StoreError> {
        let row = JournalEntry {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            amount: entry.amount,
            kind: entry.kind,
            status: JournalStatus::Completed,
            reference: entry.reference,
            auction_id: entry.auction_id,
            created_at: Utc::now(),
        };
        txn.guard.journal.push(row.clone());
        Ok(row)
    }

    async fn update_auction_bid_state(
        &self,
        txn: &mut Self::Txn,
        auction_id: Uuid,
        new_high_bid: Decimal,
        highest_bidder: Uuid,
    ) -> Result<(), StoreError> {
        let a = txn
            .guard
            .auctions
            .get_mut(&auction_id)
            .ok_or(StoreError::NotFound)?;
        a.current_high_bid = new_high_bid;
        a.highest_bidder = Some(highest_bidder);
        a.updated_at = Utc::now();
        Ok(())
    }

    async fn update_auction_status(
        &self,
        txn: &mut Self::Txn,
        auction_id: Uuid,
        status: AuctionStatus,
    ) -> Result<(), StoreError> {
        let a = txn
            .guard
            .auctions
            .get_mut(&auction_id)
            .ok_or(StoreError::NotFound)?;
        a.status = status;
        a.updated_at = Utc::now();
        Ok(())
    }

    async fn find_open_hold(
        &self,
        txn: &mut Self::Txn,
        auction_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Hold>, StoreError> {
        Ok(txn
            .guard
            .holds
            .values()
            .find(|h| {
                h.auction_id == auction_id
                    && h.user_id == user_id
                    && matches!(h.status, HoldStatus::Soft | HoldStatus::Hard)
            })
            .cloned())
    }

    async fn find_open_soft_holds(
        &self,
        txn: &mut Self::Txn,
        auction_id: Uuid,
    ) -> Result<Vec<Hold>, StoreError> {
        Ok(txn
            .guard
            .holds
            .values()
            .filter(|h| h.auction_id == auction_id && matches!(h.status, HoldStatus::Soft))
            .cloned()
            .collect())
    }

    async fn update_hold_status(
        &self,
        txn: &mut Self::Txn,
        hold_id: Uuid,
        status: HoldStatus,
    ) -> Result<(), StoreError> {
        let h = txn
            .guard
            .holds
            .get_mut(&hold_id)
            .ok_or(StoreError::NotFound)?;
        h.status = status;
        h.updated_at = Utc::now();
        Ok(())
    }

    async fn update_user_balance(
        &self,
        txn: &mut Self::Txn,
        user_id: Uuid,
        delta: Decimal,
    ) -> Result<Decimal, StoreError> {
        let u = txn
            .guard
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::NotFound)?;
        u.wallet_balance += delta;
        Ok(u.wallet_balance)
    }

    async fn insert_settlement_if_absent(
        &self,
        txn: &mut Self::Txn,
        settlement: NewSettlement,
    ) -> Result<Option<Settlement>, StoreError> {
        if txn
            .guard
            .settlements_by_auction
            .contains_key(&settlement.auction_id)
        {
            return Ok(None);
        }
        let row = Settlement {
            id: Uuid::new_v4(),
            auction_id: settlement.auction_id,
            winner_id: settlement.winner_id,
            seller_id: settlement.seller_id,
            amount: settlement.amount,
            winner_approved_at: None,
            seller_approved_at: None,
            status: SettlementStatus::Pending,
            created_at: Utc::now(),
        };
        txn.guard
            .settlements_by_auction
            .insert(row.auction_id, row.clone());
        Ok(Some(row))
    }

    async fn lock_settlement(
        &self,
        txn: &mut Self::Txn,
        auction_id: Uuid,
    ) -> Result<Settlement, StoreError> {
        txn.guard
            .settlements_by_auction
            .get(&auction_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn record_settlement_approval(
        &self,
        txn: &mut Self::Txn,
        settlement_id: Uuid,
        winner_approved_at: Option<DateTime<Utc>>,
        seller_approved_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let settlement = txn
            .guard
            .settlements_by_auction
            .values_mut()
            .find(|s| s.id == settlement_id)
            .ok_or(StoreError::NotFound)?;
        if winner_approved_at.is_some() {
            settlement.winner_approved_at = winner_approved_at;
        }
        if seller_approved_at.is_some() {
            settlement.seller_approved_at = seller_approved_at;
        }
        Ok(())
    }

    async fn complete_settlement(
        &self,
        txn: &mut Self::Txn,
        settlement_id: Uuid,
    ) -> Result<(), StoreError> {
        let settlement = txn
            .guard
            .settlements_by_auction
            .values_mut()
            .find(|s| s.id == settlement_id)
            .ok_or(StoreError::NotFound)?;
        settlement.status = SettlementStatus::Completed;
        Ok(())
    }

    async fn deposit_reference_exists(
        &self,
        txn: &mut Self::Txn,
        reference: &str,
    ) -> Result<bool, StoreError> {
        Ok(txn.guard.journal.iter().any(|j| {
            j.reference.as_deref() == Some(reference)
                && matches!(j.kind, JournalKind::Deposit)
                && matches!(j.status, JournalStatus::Completed)
        }))
    }

    async fn get_auction(
        &self,
        txn: &mut Self::Txn,
        auction_id: Uuid,
    ) -> Result<Auction, StoreError> {
        txn.guard
            .auctions
            .get(&auction_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_user_display_name(
        &self,
        txn: &mut Self::Txn,
        user_id: Uuid,
    ) -> Result<String, StoreError> {
        txn.guard
            .users
            .get(&user_id)
            .map(|u| u.display_name.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn insert_chat_message(
        &self,
        txn: &mut Self::Txn,
        msg: NewChatMessage,
    ) -> Result<ChatMessage, StoreError> {
        let row = ChatMessage {
            id: Uuid::new_v4(),
            room_id: msg.room_id,
            sender_id: msg.sender_id,
            body: msg.body,
            image_url: msg.image_url,
            created_at: Utc::now(),
        };
        txn.guard.chat_messages.push(row.clone());
        Ok(row)
    }

    async fn get_auction_by_id(&self, auction_id: Uuid) -> Result<Auction, StoreError> {
        let state = self.state.lock().await;
        state
            .auctions
            .get(&auction_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_settlement_for_auction(
        &self,
        auction_id: Uuid,
    ) -> Result<Option<Settlement>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.settlements_by_auction.get(&auction_id).cloned())
    }

    async fn list_recent_bids(&self, auction_id: Uuid, limit: i64) -> Result<Vec<Bid>, StoreError> {
        let state = self.state.lock().await;
        let mut bids: Vec<Bid> = state
            .bids
            .iter()
            .filter(|b| b.auction_id == auction_id)
            .cloned()
            .collect();
        bids.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        bids.truncate(limit.max(0) as usize);
        Ok(bids)
    }

    async fn list_recent_journal(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<JournalEntry>, StoreError> {
        let state = self.state.lock().await;
        let mut entries: Vec<JournalEntry> = state
            .journal
            .iter()
            .filter(|j| j.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }

    async fn get_balance(&self, user_id: Uuid) -> Result<Decimal, StoreError> {
        let state = self.state.lock().await;
        state
            .users
            .get(&user_id)
            .map(|u| u.wallet_balance)
            .ok_or(StoreError::NotFound)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> Result<User, StoreError> {
        let state = self.state.lock().await;
        state.users.get(&user_id).cloned().ok_or(StoreError::NotFound)
    }
}
