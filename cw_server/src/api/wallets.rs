//! Balance and history API handlers.
//!
//! # Examples
//!
//! Get a player's balance:
//! ```bash
//! curl http://localhost:8080/wallet/player1
//! ```
//!
//! Get the latest ten ledger entries:
//! ```bash
//! curl "http://localhost:8080/wallet/player1/transactions?limit=10"
//! ```

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use casino_wallet::wallet::{Account, EntryKind, LedgerEntry, LedgerError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AppState, events::EventResponse};

/// Public view of an account
#[derive(Debug, Serialize, Deserialize)]
pub struct WalletResponse {
    pub id: String,
    pub wallet_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub currency: String,
}

impl From<Account> for WalletResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.player_id,
            wallet_id: account.wallet_id,
            balance: account.balance,
            currency: account.currency,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlayersResponse {
    pub players: Vec<WalletResponse>,
}

/// Public view of a ledger entry
#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub request_id: String,
    pub round_id: String,
    pub session_id: String,
    pub game_code: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for TransactionResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            request_id: entry.request_id,
            round_id: entry.round_id,
            session_id: entry.session_id,
            game_code: entry.game_code,
            kind: entry.kind,
            amount: entry.amount,
            currency: entry.currency,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<TransactionResponse>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

type ApiError = (StatusCode, Json<EventResponse>);

fn lookup_failure(player_id: &str, err: LedgerError) -> ApiError {
    tracing::error!(player_id = %player_id, error = %err, "Wallet lookup failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(EventResponse {
            success: false,
            error: Some(err.client_message()),
        }),
    )
}

/// Get the balance of a player.
///
/// # Response
///
/// Returns `200 OK` with:
/// ```json
/// {"id": "player1", "wallet_id": "wallet1", "balance": 99500.0, "currency": "INR"}
/// ```
///
/// # Errors
///
/// - `500 Internal Server Error`: Unknown player or store failure
pub async fn get_wallet(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
) -> Result<Json<WalletResponse>, ApiError> {
    match state.wallet.get_balance(&player_id).await {
        Ok(account) => Ok(Json(account.into())),
        Err(err) => Err(lookup_failure(&player_id, err)),
    }
}

/// List every player with its balance.
///
/// # Errors
///
/// - `500 Internal Server Error`: Store failure
pub async fn list_players(
    State(state): State<AppState>,
) -> Result<Json<PlayersResponse>, ApiError> {
    match state.wallet.list_accounts().await {
        Ok(accounts) => {
            tracing::debug!(count = accounts.len(), "Listed players");
            Ok(Json(PlayersResponse {
                players: accounts.into_iter().map(WalletResponse::from).collect(),
            }))
        }
        Err(err) => Err(lookup_failure("*", err)),
    }
}

/// Latest ledger entries of a player, newest first.
///
/// # Query Parameters
///
/// - `limit`: Page size, default 50, clamped to 1..=500
///
/// # Errors
///
/// - `500 Internal Server Error`: Unknown player or store failure
pub async fn list_transactions(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    match state.wallet.list_entries(&player_id, query.limit).await {
        Ok(entries) => Ok(Json(TransactionsResponse {
            transactions: entries.into_iter().map(TransactionResponse::from).collect(),
        })),
        Err(err) => Err(lookup_failure(&player_id, err)),
    }
}
