//! Wallet error types.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::db::{Conflict, StoreError};

/// Errors returned by the transaction processor and query facade
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Request id already recorded
    #[error("duplicate request id: {0}")]
    DuplicateRequest(String),

    /// No account for the player
    #[error("player not found: {0}")]
    AccountNotFound(String),

    /// Round already has an entry of this kind for the wallet
    #[error("duplicate round id: round {round_id}, wallet {wallet_id}")]
    DuplicateRound { round_id: String, wallet_id: String },

    /// Bet would take the balance below zero
    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance {
        available: Decimal,
        required: Decimal,
    },

    /// Result arrived for a round without a bet
    #[error("bet not found: round {round_id}, wallet {wallet_id}")]
    BetNotFound { round_id: String, wallet_id: String },

    /// Result game code differs from the bet
    #[error("game code mismatch: bet {expected}, result {got}")]
    GameCodeMismatch { expected: String, got: String },

    /// Result wallet differs from the bet
    #[error("wallet ID mismatch: bet {expected}, result {got}")]
    WalletMismatch { expected: String, got: String },

    /// Result player differs from the bet
    #[error("player ID mismatch: bet {expected}, result {got}")]
    PlayerMismatch { expected: String, got: String },

    /// Malformed event
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Store failure (lock timeout, connectivity, constraint violation)
    #[error("storage failure: {0}")]
    Storage(#[source] StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(Conflict::RequestId(request_id)) => {
                LedgerError::DuplicateRequest(request_id)
            }
            StoreError::Conflict(Conflict::Round {
                round_id,
                wallet_id,
            }) => LedgerError::DuplicateRound {
                round_id,
                wallet_id,
            },
            other => LedgerError::Storage(other),
        }
    }
}

impl LedgerError {
    /// Expected rule outcome as opposed to an infrastructure failure
    ///
    /// Business rejections are surfaced verbatim and never retried.
    pub fn is_business_rejection(&self) -> bool {
        !matches!(
            self,
            LedgerError::AccountNotFound(_) | LedgerError::Storage(_)
        )
    }

    /// Short label used for metrics and structured logs
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::DuplicateRequest(_) => "duplicate_request",
            LedgerError::AccountNotFound(_) => "account_not_found",
            LedgerError::DuplicateRound { .. } => "duplicate_round",
            LedgerError::InsufficientBalance { .. } => "insufficient_balance",
            LedgerError::BetNotFound { .. } => "bet_not_found",
            LedgerError::GameCodeMismatch { .. } => "game_code_mismatch",
            LedgerError::WalletMismatch { .. } => "wallet_mismatch",
            LedgerError::PlayerMismatch { .. } => "player_mismatch",
            LedgerError::InvalidRequest(_) => "invalid_request",
            LedgerError::Storage(_) => "storage_failure",
        }
    }

    /// Get a client-safe error message
    ///
    /// Store errors are sanitized so that SQL details and connection
    /// strings never reach the caller.
    pub fn client_message(&self) -> String {
        match self {
            LedgerError::DuplicateRequest(_) => "duplicate request id".to_string(),
            LedgerError::AccountNotFound(_) => "player not found".to_string(),
            LedgerError::DuplicateRound { .. } => "duplicate round id".to_string(),
            LedgerError::InsufficientBalance { .. } => "insufficient balance".to_string(),
            LedgerError::BetNotFound { .. } => "bet not found".to_string(),
            LedgerError::GameCodeMismatch { .. } => "game code mismatch".to_string(),
            LedgerError::WalletMismatch { .. } => "wallet ID mismatch".to_string(),
            LedgerError::PlayerMismatch { .. } => "player ID mismatch".to_string(),
            LedgerError::InvalidRequest(reason) => reason.clone(),
            LedgerError::Storage(_) => "internal server error".to_string(),
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
