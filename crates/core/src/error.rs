use thiserror::Error;

use ledger::StoreError;

/// Error kinds surfaced to callers (spec.md §7). Each maps 1:1 to an HTTP
/// status in the `server` crate; none leaks an internal identifier past
/// this boundary.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("timed out")]
    Timeout,
    #[error("internal error")]
    Internal,
}

impl CoreError {
    /// Maps a `StoreError` surfaced while operating on a specific entity
    /// into the right `CoreError` for that call site. A bare `From` impl
    /// can't make this distinction (spec.md §4.2 step 4a: the very same
    /// `StoreError::NotFound` means AuctionClosed-adjacent data corruption
    /// in one call and simple 404 in another), so call sites pick
    /// explicitly via this helper instead of `?`.
    pub fn not_found_as(self_kind: NotFoundKind, err: StoreError) -> CoreError {
        match err {
            StoreError::NotFound => match self_kind {
                NotFoundKind::Public => CoreError::NotFound,
                NotFoundKind::DataIntegrity => {
                    tracing::error!("data-integrity violation: expected row absent");
                    CoreError::Internal
                }
            },
            other => other.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum NotFoundKind {
    /// A `StoreError::NotFound` here is a legitimate 404 to return to the caller.
    Public,
    /// A `StoreError::NotFound` here means an invariant the system is
    /// supposed to maintain (e.g. "the prior highest bidder has exactly
    /// one open hold") was violated.
    DataIntegrity,
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => CoreError::NotFound,
            StoreError::Conflict => CoreError::Timeout,
            StoreError::Serialization => CoreError::Timeout,
            StoreError::Unique => CoreError::Conflict("duplicate reference".to_string()),
            StoreError::Internal(msg) => {
                tracing::error!(error = %msg, "ledger internal error");
                CoreError::Internal
            }
        }
    }
}
