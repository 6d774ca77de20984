//! Wallet data models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::errors::{LedgerError, LedgerResult};

/// Player account holding a single-currency balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub player_id: String,
    pub wallet_id: String,
    pub balance: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a freshly provisioned account
    pub fn new(
        player_id: impl Into<String>,
        wallet_id: impl Into<String>,
        balance: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            player_id: player_id.into(),
            wallet_id: wallet_id.into(),
            balance,
            currency: currency.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Debit that opens a round
    Bet,
    /// Credit that settles a previously opened round
    Result,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Bet => "bet",
            EntryKind::Result => "result",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bet" => Ok(EntryKind::Bet),
            "result" => Ok(EntryKind::Result),
            _ => Err(LedgerError::InvalidRequest(
                "type in body should be one of [bet result]".to_string(),
            )),
        }
    }
}

/// Immutable ledger entry, one per accepted event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub request_id: String,
    pub player_id: String,
    pub wallet_id: String,
    pub round_id: String,
    pub session_id: String,
    pub game_code: String,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Build the entry recorded for an accepted event
    pub fn from_event(event: &LedgerEvent, created_at: DateTime<Utc>) -> Self {
        Self {
            request_id: event.request_id.clone(),
            player_id: event.player_id.clone(),
            wallet_id: event.wallet_id.clone(),
            round_id: event.round_id.clone(),
            session_id: event.session_id.clone(),
            game_code: event.game_code.clone(),
            kind: event.kind,
            amount: event.amount,
            currency: event.currency.clone(),
            created_at,
        }
    }
}

/// Lookup key for exclusive ledger reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKey<'a> {
    /// Idempotency key
    Request(&'a str),
    /// Round pairing key
    Round {
        round_id: &'a str,
        wallet_id: &'a str,
        kind: EntryKind,
    },
}

/// Structurally valid event accepted by the transaction processor
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEvent {
    pub request_id: String,
    pub player_id: String,
    pub wallet_id: String,
    pub round_id: String,
    pub session_id: String,
    pub game_code: String,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub currency: String,
}

impl LedgerEvent {
    /// Key of the bet that opened this event's round
    pub fn bet_key(&self) -> EntryKey<'_> {
        EntryKey::Round {
            round_id: &self.round_id,
            wallet_id: &self.wallet_id,
            kind: EntryKind::Bet,
        }
    }

    /// Key of the result that settled this event's round
    pub fn result_key(&self) -> EntryKey<'_> {
        EntryKey::Round {
            round_id: &self.round_id,
            wallet_id: &self.wallet_id,
            kind: EntryKind::Result,
        }
    }
}

/// Wire form of an event as posted by game providers
///
/// Every field is optional so that missing fields surface as validation
/// errors rather than opaque decode failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventRequest {
    #[serde(alias = "req_id")]
    pub request_id: Option<String>,
    pub player_id: Option<String>,
    pub wallet_id: Option<String>,
    pub round_id: Option<String>,
    pub session_id: Option<String>,
    pub game_code: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
}

impl EventRequest {
    /// Check required fields and convert into a processor event
    ///
    /// # Errors
    ///
    /// * `LedgerError::InvalidRequest` - A field is missing, empty or out of range
    pub fn validate(self) -> LedgerResult<LedgerEvent> {
        let request_id = required("request_id", self.request_id)?;
        let player_id = required("player_id", self.player_id)?;
        let wallet_id = required("wallet_id", self.wallet_id)?;
        let round_id = required("round_id", self.round_id)?;
        let session_id = required("session_id", self.session_id)?;
        let game_code = required("game_code", self.game_code)?;
        let kind: EntryKind = required("type", self.kind)?.parse()?;
        let currency = required("currency", self.currency)?;

        let amount = self.amount.ok_or_else(|| {
            LedgerError::InvalidRequest("amount in body is required".to_string())
        })?;
        if amount < Decimal::ZERO {
            return Err(LedgerError::InvalidRequest(
                "amount in body should be greater than or equal to 0".to_string(),
            ));
        }

        Ok(LedgerEvent {
            request_id,
            player_id,
            wallet_id,
            round_id,
            session_id,
            game_code,
            kind,
            amount,
            currency,
        })
    }
}

fn required(field: &str, value: Option<String>) -> LedgerResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(LedgerError::InvalidRequest(format!(
            "{field} in body is required"
        ))),
    }
}
