use thiserror::Error;

/// Failure modes of the Ledger Store (spec.md §4.1). Kept distinct from
/// `auction_core::error::CoreError` so a single `StoreError::NotFound` can be
/// translated into different `CoreError` variants depending on what the
/// caller was looking up.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,
    #[error("lock could not be acquired within the deadline")]
    Conflict,
    #[error("transaction must be retried")]
    Serialization,
    #[error("duplicate reference string")]
    Unique,
    #[error("internal store error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some("23505") => StoreError::Unique,
                Some("40001") => StoreError::Serialization,
                Some("55P03") => StoreError::Conflict,
                _ => StoreError::Internal(db_err.to_string()),
            },
            _ => StoreError::Internal(err.to_string()),
        }
    }
}
