use axum::extract::State;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use auction_core::wallet;
use ledger::Ledger;

use crate::auth::CallerId;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: Decimal,
    pub upi_ref: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WalletMutationResponse {
    pub success: bool,
    pub new_balance: Decimal,
}

/// `POST /api/wallet/deposit` (spec.md §6). A client-supplied `upi_ref` is
/// used as the idempotency key; absent one, the server generates one so
/// the request is still safe to retry exactly once.
pub async fn deposit(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Json(body): Json<DepositRequest>,
) -> Result<Json<WalletMutationResponse>, ApiError> {
    let reference = body.upi_ref.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let new_balance = wallet::deposit(state.ledger.as_ref(), caller, body.amount, reference)
        .await
        .map_err(ApiError)?;
    Ok(Json(WalletMutationResponse {
        success: true,
        new_balance,
    }))
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub amount: Decimal,
    pub upi_id: String,
}

/// `POST /api/wallet/withdraw` (spec.md §6).
pub async fn withdraw(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Json(body): Json<WithdrawRequest>,
) -> Result<Json<WalletMutationResponse>, ApiError> {
    let new_balance = wallet::withdraw(state.ledger.as_ref(), caller, body.amount, body.upi_id)
        .await
        .map_err(ApiError)?;
    Ok(Json(WalletMutationResponse {
        success: true,
        new_balance,
    }))
}

#[derive(Debug, Serialize)]
pub struct WalletSnapshotResponse {
    pub balance: Decimal,
    pub transactions: Vec<ledger::JournalEntry>,
}

/// `GET /api/wallet` (spec.md §6): balance plus the last 50 journal entries.
pub async fn get_wallet(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
) -> Result<Json<WalletSnapshotResponse>, ApiError> {
    let balance = state
        .ledger
        .get_balance(caller)
        .await
        .map_err(|e| ApiError(e.into()))?;
    let transactions = state
        .ledger
        .list_recent_journal(caller, 50)
        .await
        .map_err(|e| ApiError(e.into()))?;
    Ok(Json(WalletSnapshotResponse {
        balance,
        transactions,
    }))
}
