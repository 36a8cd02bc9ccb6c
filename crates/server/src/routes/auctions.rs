use axum::extract::{Path, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use auction_core::{bid_engine, finalizer, settlement};
use hub::frames::{BroadcastNewBid, OutbidAlert, ServerFrame};
use ledger::Ledger;

use crate::auth::CallerId;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PlaceBidRequest {
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PlaceBidResponse {
    pub success: bool,
    pub auction_id: Uuid,
    pub new_high_bid: Decimal,
}

/// `POST /api/auctions/{id}/bid` (spec.md §6).
pub async fn place_bid(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(auction_id): Path<Uuid>,
    Json(body): Json<PlaceBidRequest>,
) -> Result<Json<PlaceBidResponse>, ApiError> {
    let outcome = bid_engine::place_bid(state.ledger.as_ref(), caller, auction_id, body.amount)
        .await
        .map_err(ApiError)?;

    // Post-commit, best-effort fan-out (spec.md §4.2): failures here never
    // surface to the caller.
    state
        .hub
        .broadcast_to_auction(
            auction_id,
            &ServerFrame::BroadcastNewBid(BroadcastNewBid {
                auction_id,
                amount: outcome.new_high_bid,
                bidder_id: outcome.bidder_id,
                timestamp: outcome.placed_at,
            }),
        )
        .await;
    if let Some(displaced) = &outcome.displaced {
        state
            .hub
            .send_to_user(
                displaced.user_id,
                &ServerFrame::OutbidAlert(OutbidAlert {
                    auction_id,
                    your_bid: displaced.your_bid,
                    new_high_bid: displaced.new_high_bid,
                    new_bidder: displaced.new_bidder,
                }),
            )
            .await;
    }

    Ok(Json(PlaceBidResponse {
        success: true,
        auction_id,
        new_high_bid: outcome.new_high_bid,
    }))
}

#[derive(Debug, Serialize)]
pub struct AuctionResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub start_price: Decimal,
    pub current_high_bid: Decimal,
    pub highest_bidder: Option<Uuid>,
    pub end_time: chrono::DateTime<chrono::Utc>,
    pub status: ledger::AuctionStatus,
    pub settlement: Option<ledger::Settlement>,
}

/// `GET /api/auctions/{id}` (spec.md §6). Runs the Finalizer first so a
/// caller never observes a stale ACTIVE status past its end time.
pub async fn get_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<Uuid>,
) -> Result<Json<AuctionResponse>, ApiError> {
    finalizer::finalize_if_expired(state.ledger.as_ref(), auction_id)
        .await
        .map_err(ApiError)?;

    let auction = state
        .ledger
        .get_auction_by_id(auction_id)
        .await
        .map_err(|e| ApiError(e.into()))?;
    let settlement = state
        .ledger
        .get_settlement_for_auction(auction_id)
        .await
        .map_err(|e| ApiError(e.into()))?;

    Ok(Json(AuctionResponse {
        id: auction.id,
        product_id: auction.product_id,
        seller_id: auction.seller_id,
        start_price: auction.start_price,
        current_high_bid: auction.current_high_bid,
        highest_bidder: auction.highest_bidder,
        end_time: auction.end_time,
        status: auction.status,
        settlement,
    }))
}

#[derive(Debug, Serialize)]
pub struct BidHistoryEntry {
    pub amount: Decimal,
    pub placed_at: chrono::DateTime<chrono::Utc>,
    pub bidder_tag: String,
}

/// `GET /api/auctions/{id}/bids` (spec.md §6): last 20, bidder name masked
/// to a 4-char prefix plus `***`.
pub async fn list_bids(
    State(state): State<AppState>,
    Path(auction_id): Path<Uuid>,
) -> Result<Json<Vec<BidHistoryEntry>>, ApiError> {
    finalizer::finalize_if_expired(state.ledger.as_ref(), auction_id)
        .await
        .map_err(ApiError)?;

    let bids = state
        .ledger
        .list_recent_bids(auction_id, 20)
        .await
        .map_err(|e| ApiError(e.into()))?;

    let mut entries = Vec::with_capacity(bids.len());
    for bid in bids {
        let bidder = state
            .ledger
            .get_user_by_id(bid.user_id)
            .await
            .map_err(|e| ApiError(e.into()))?;
        entries.push(BidHistoryEntry {
            amount: bid.amount,
            placed_at: bid.created_at,
            bidder_tag: bid_engine::mask_bidder_tag(&bidder.display_name),
        });
    }
    Ok(Json(entries))
}

#[derive(Debug, Serialize)]
pub struct SettleResponse {
    pub success: bool,
    pub both_approved: bool,
    pub winner_approved: bool,
    pub seller_approved: bool,
    pub settlement_status: ledger::SettlementStatus,
}

/// `POST /api/auctions/{id}/settle` (spec.md §6).
pub async fn settle(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(auction_id): Path<Uuid>,
) -> Result<Json<SettleResponse>, ApiError> {
    let outcome = settlement::approve(state.ledger.as_ref(), caller, auction_id)
        .await
        .map_err(ApiError)?;

    let settlement = state
        .ledger
        .get_settlement_for_auction(auction_id)
        .await
        .map_err(|e| ApiError(e.into()))?
        .ok_or(ApiError(auction_core::CoreError::Internal))?;

    Ok(Json(SettleResponse {
        success: true,
        both_approved: outcome.both_approved,
        winner_approved: settlement.winner_approved_at.is_some(),
        seller_approved: settlement.seller_approved_at.is_some(),
        settlement_status: outcome.new_status,
    }))
}
