//! Store error types.

use std::time::Duration;
use thiserror::Error;

/// Uniqueness rule violated by a write
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Conflict {
    /// Request id already recorded
    #[error("request id {0} already recorded")]
    RequestId(String),

    /// Round already has an entry of the same kind for the wallet
    #[error("round {round_id} already recorded for wallet {wallet_id}")]
    Round { round_id: String, wallet_id: String },

    /// Player or wallet already provisioned
    #[error("account {0} already exists")]
    Account(String),
}

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store call did not finish in time
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Row lock could not be acquired in time
    #[error("Lock wait exceeded {0:?}")]
    LockTimeout(Duration),

    /// Unique constraint violation
    #[error("Unique constraint violated: {0}")]
    Conflict(Conflict),

    /// Row expected inside the unit of work is gone
    #[error("Row not found: {0}")]
    Missing(String),

    /// Value does not fit the column
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// Store cannot serve requests
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
