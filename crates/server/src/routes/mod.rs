pub mod auctions;
pub mod health;
pub mod wallet;
pub mod ws;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/api/auctions/:id/bid", post(auctions::place_bid))
        .route("/api/auctions/:id", get(auctions::get_auction))
        .route("/api/auctions/:id/bids", get(auctions::list_bids))
        .route("/api/auctions/:id/settle", post(auctions::settle))
        .route("/api/wallet/deposit", post(wallet::deposit))
        .route("/api/wallet/withdraw", post(wallet::withdraw))
        .route("/api/wallet", get(wallet::get_wallet))
        .route("/ws", get(ws::upgrade))
        .with_state(state)
}
