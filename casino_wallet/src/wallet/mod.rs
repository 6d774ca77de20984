//! Wallet module: player balances driven by bet and result events.
//!
//! This module implements:
//! - Idempotent event processing keyed by `request_id`
//! - Round pairing (one bet and at most one result per round and wallet)
//! - A balance floor of zero, enforced before any debit
//! - All-or-nothing persistence of the entry and its balance effect
//!
//! ## Example
//!
//! ```no_run
//! use casino_wallet::db::{Database, DatabaseConfig, PgLedgerStore};
//! use casino_wallet::wallet::{EventRequest, WalletManager, WalletService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::development();
//!     let db = Database::new(&config).await?;
//!     let store = PgLedgerStore::from_config(db.pool().clone(), &config);
//!     let wallet = WalletManager::new(Arc::new(store));
//!
//!     let request: EventRequest = serde_json::from_str(
//!         r#"{"request_id":"r1","player_id":"player1","wallet_id":"wallet1",
//!             "round_id":"round1","session_id":"s1","game_code":"slots",
//!             "type":"bet","amount":500,"currency":"INR"}"#,
//!     )?;
//!     wallet.process(&request.validate()?).await?;
//!
//!     let account = wallet.get_balance("player1").await?;
//!     println!("Balance after bet: {}", account.balance);
//!
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod manager;
pub mod models;
pub mod processor;
pub mod query;
pub mod seed;

pub use errors::{LedgerError, LedgerResult};
pub use manager::{WalletManager, WalletService};
pub use models::{Account, EntryKey, EntryKind, EventRequest, LedgerEntry, LedgerEvent};
pub use processor::TransactionProcessor;
pub use query::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT, WalletQuery};
pub use seed::{SeedOptions, seed_players};
