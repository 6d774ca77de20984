//! # Casino Wallet
//!
//! A wallet ledger for a gaming platform. Game providers post `bet` and
//! `result` events; the ledger decides whether each event is accepted and, if
//! so, records it together with its balance effect in one atomic unit of work.
//!
//! Concurrent, duplicated or out-of-order submissions never corrupt a
//! balance: every event carries a `request_id` idempotency key, rounds are
//! paired by `(round_id, wallet_id)`, and all checks run under exclusive
//! locks taken in a fixed order.
//!
//! ## Core Modules
//!
//! - [`wallet`]: Event model, transaction processor and query facade
//! - [`db`]: Store contracts with PostgreSQL and in-memory implementations
//!
//! ## Example
//!
//! ```
//! use casino_wallet::db::MemoryLedgerStore;
//! use casino_wallet::wallet::{Account, WalletManager};
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! let store = MemoryLedgerStore::new()
//!     .with_accounts([Account::new("player1", "wallet1", Decimal::from(100), "INR")]);
//! let wallet = WalletManager::new(Arc::new(store));
//! ```

/// Store contracts, connection pooling and schema.
pub mod db;

/// Event processing and balance queries.
pub mod wallet;

pub use wallet::{LedgerError, LedgerEvent, LedgerResult, WalletManager, WalletService};
