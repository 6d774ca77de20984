//! Store contracts consumed by the transaction processor.
//!
//! The processor never talks to a database directly. It threads an explicit
//! unit-of-work handle through the calls below, which lets the same rules run
//! against PostgreSQL in production and against [`MemoryLedgerStore`] in tests.
//!
//! [`MemoryLedgerStore`]: super::memory::MemoryLedgerStore

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use std::time::Duration;

use super::{
    config::DatabaseConfig,
    errors::{Conflict, StoreError, StoreResult},
    schema::{REQUEST_ID_CONSTRAINT, ROUND_CONSTRAINT},
    timeouts::with_timeout,
};
use crate::wallet::{Account, EntryKey, EntryKind, LedgerEntry};

/// Atomic unit-of-work boundaries
///
/// A unit that is dropped without `commit` must behave as rolled back.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Handle owning the locks and pending writes of one unit
    type Unit: Send;

    async fn begin_unit(&self) -> StoreResult<Self::Unit>;

    async fn commit(&self, unit: Self::Unit) -> StoreResult<()>;

    async fn rollback(&self, unit: Self::Unit) -> StoreResult<()>;

    /// Reachability probe
    async fn ping(&self) -> StoreResult<()>;
}

/// Trait for account storage
#[async_trait]
pub trait AccountStore: UnitOfWork {
    /// Read an account and hold its exclusive lock until the unit ends
    async fn get_account_for_update(
        &self,
        player_id: &str,
        unit: &mut Self::Unit,
    ) -> StoreResult<Option<Account>>;

    /// Apply `balance = balance + delta`, evaluated by the store
    async fn adjust_balance(
        &self,
        player_id: &str,
        delta: Decimal,
        unit: &mut Self::Unit,
    ) -> StoreResult<()>;

    async fn create_account(&self, account: &Account, unit: &mut Self::Unit) -> StoreResult<()>;

    /// Read the last committed account state without locking
    async fn get_account(&self, player_id: &str) -> StoreResult<Option<Account>>;

    async fn list_accounts(&self) -> StoreResult<Vec<Account>>;
}

/// Trait for ledger entry storage
#[async_trait]
pub trait LedgerStore: UnitOfWork {
    /// Look up an entry and hold the key's exclusive lock until the unit ends
    async fn get_entry_for_update(
        &self,
        key: EntryKey<'_>,
        unit: &mut Self::Unit,
    ) -> StoreResult<Option<LedgerEntry>>;

    async fn append_entry(&self, entry: &LedgerEntry, unit: &mut Self::Unit) -> StoreResult<()>;

    /// Committed entries for a player, newest first
    async fn list_entries(&self, player_id: &str, limit: i64) -> StoreResult<Vec<LedgerEntry>>;
}

/// Everything the wallet needs from a backing store
pub trait WalletStore: AccountStore + LedgerStore {}

impl<T: AccountStore + LedgerStore> WalletStore for T {}

const ACCOUNT_COLUMNS: &str = "player_id, wallet_id, balance, currency, created_at, updated_at";

const ENTRY_COLUMNS: &str = "request_id, player_id, wallet_id, round_id, session_id, game_code, \
                             kind, amount, currency, created_at";

/// SQLSTATE raised when `lock_timeout` expires
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// PostgreSQL implementation of the wallet store
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    query_timeout: Duration,
    lock_timeout: Duration,
}

impl PgLedgerStore {
    pub fn from_config(pool: PgPool, config: &DatabaseConfig) -> Self {
        Self {
            pool,
            query_timeout: config.query_timeout(),
            lock_timeout: config.lock_timeout(),
        }
    }

    async fn run<F, T>(&self, future: F) -> StoreResult<T>
    where
        F: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        with_timeout(self.query_timeout, future)
            .await
            .map_err(|err| self.classify(err))
    }

    fn classify(&self, err: StoreError) -> StoreError {
        match err {
            StoreError::Database(sqlx::Error::Database(ref db))
                if db.code().as_deref() == Some(LOCK_NOT_AVAILABLE) =>
            {
                StoreError::LockTimeout(self.lock_timeout)
            }
            other => other,
        }
    }
}

fn account_from_row(row: &PgRow) -> Result<Account, sqlx::Error> {
    Ok(Account {
        player_id: row.try_get("player_id")?,
        wallet_id: row.try_get("wallet_id")?,
        balance: row.try_get("balance")?,
        currency: row.try_get("currency")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<LedgerEntry, sqlx::Error> {
    let kind: String = row.try_get("kind")?;
    let kind = kind
        .parse::<EntryKind>()
        .map_err(|e| sqlx::Error::Decode(e.to_string().into()))?;

    Ok(LedgerEntry {
        request_id: row.try_get("request_id")?,
        player_id: row.try_get("player_id")?,
        wallet_id: row.try_get("wallet_id")?,
        round_id: row.try_get("round_id")?,
        session_id: row.try_get("session_id")?,
        game_code: row.try_get("game_code")?,
        kind,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Translate a unique violation raised by an entry insert
fn entry_conflict(entry: &LedgerEntry, err: &StoreError) -> Option<Conflict> {
    let StoreError::Database(sqlx::Error::Database(db)) = err else {
        return None;
    };
    if !db.is_unique_violation() {
        return None;
    }
    match db.constraint() {
        Some(REQUEST_ID_CONSTRAINT) => Some(Conflict::RequestId(entry.request_id.clone())),
        Some(ROUND_CONSTRAINT) => Some(Conflict::Round {
            round_id: entry.round_id.clone(),
            wallet_id: entry.wallet_id.clone(),
        }),
        _ => None,
    }
}

#[async_trait]
impl UnitOfWork for PgLedgerStore {
    type Unit = Transaction<'static, Postgres>;

    async fn begin_unit(&self) -> StoreResult<Self::Unit> {
        let mut tx = self.run(self.pool.begin()).await?;

        // Bound lock waits and statements inside the database as well, so a
        // stuck unit releases its connection even if the client side gives up.
        let lock_sql = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
        self.run(sqlx::query(&lock_sql).execute(&mut *tx)).await?;
        let statement_sql = format!(
            "SET LOCAL statement_timeout = '{}ms'",
            self.query_timeout.as_millis()
        );
        self.run(sqlx::query(&statement_sql).execute(&mut *tx)).await?;

        Ok(tx)
    }

    async fn commit(&self, unit: Self::Unit) -> StoreResult<()> {
        self.run(unit.commit()).await
    }

    async fn rollback(&self, unit: Self::Unit) -> StoreResult<()> {
        self.run(unit.rollback()).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.run(sqlx::query("SELECT 1").execute(&self.pool))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl AccountStore for PgLedgerStore {
    async fn get_account_for_update(
        &self,
        player_id: &str,
        unit: &mut Self::Unit,
    ) -> StoreResult<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE player_id = $1 FOR UPDATE");
        let row = self
            .run(sqlx::query(&sql).bind(player_id).fetch_optional(&mut **unit))
            .await?;
        Ok(row.as_ref().map(account_from_row).transpose()?)
    }

    async fn adjust_balance(
        &self,
        player_id: &str,
        delta: Decimal,
        unit: &mut Self::Unit,
    ) -> StoreResult<()> {
        let result = self
            .run(
                sqlx::query(
                    "UPDATE accounts
                     SET balance = balance + $1, updated_at = NOW()
                     WHERE player_id = $2",
                )
                .bind(delta)
                .bind(player_id)
                .execute(&mut **unit),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(format!("account {player_id}")));
        }
        Ok(())
    }

    async fn create_account(&self, account: &Account, unit: &mut Self::Unit) -> StoreResult<()> {
        self.run(
            sqlx::query(
                "INSERT INTO accounts (player_id, wallet_id, balance, currency, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&account.player_id)
            .bind(&account.wallet_id)
            .bind(account.balance)
            .bind(&account.currency)
            .bind(account.created_at)
            .bind(account.updated_at)
            .execute(&mut **unit),
        )
        .await
        .map_err(|err| match err {
            StoreError::Database(sqlx::Error::Database(ref db)) if db.is_unique_violation() => {
                StoreError::Conflict(Conflict::Account(account.player_id.clone()))
            }
            other => other,
        })?;
        Ok(())
    }

    async fn get_account(&self, player_id: &str) -> StoreResult<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE player_id = $1");
        let row = self
            .run(sqlx::query(&sql).bind(player_id).fetch_optional(&self.pool))
            .await?;
        Ok(row.as_ref().map(account_from_row).transpose()?)
    }

    async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at, player_id");
        let rows = self.run(sqlx::query(&sql).fetch_all(&self.pool)).await?;
        Ok(rows
            .iter()
            .map(account_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn get_entry_for_update(
        &self,
        key: EntryKey<'_>,
        unit: &mut Self::Unit,
    ) -> StoreResult<Option<LedgerEntry>> {
        let row = match key {
            EntryKey::Request(request_id) => {
                let sql = format!(
                    "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE request_id = $1 FOR UPDATE"
                );
                self.run(sqlx::query(&sql).bind(request_id).fetch_optional(&mut **unit))
                    .await?
            }
            EntryKey::Round {
                round_id,
                wallet_id,
                kind,
            } => {
                let sql = format!(
                    "SELECT {ENTRY_COLUMNS} FROM ledger_entries
                     WHERE round_id = $1 AND wallet_id = $2 AND kind = $3
                     FOR UPDATE"
                );
                self.run(
                    sqlx::query(&sql)
                        .bind(round_id)
                        .bind(wallet_id)
                        .bind(kind.as_str())
                        .fetch_optional(&mut **unit),
                )
                .await?
            }
        };
        Ok(row.as_ref().map(entry_from_row).transpose()?)
    }

    async fn append_entry(&self, entry: &LedgerEntry, unit: &mut Self::Unit) -> StoreResult<()> {
        self.run(
            sqlx::query(
                r#"
                INSERT INTO ledger_entries
                    (request_id, player_id, wallet_id, round_id, session_id, game_code, kind, amount, currency, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(&entry.request_id)
            .bind(&entry.player_id)
            .bind(&entry.wallet_id)
            .bind(&entry.round_id)
            .bind(&entry.session_id)
            .bind(&entry.game_code)
            .bind(entry.kind.as_str())
            .bind(entry.amount)
            .bind(&entry.currency)
            .bind(entry.created_at)
            .execute(&mut **unit),
        )
        .await
        .map_err(|err| match entry_conflict(entry, &err) {
            Some(conflict) => StoreError::Conflict(conflict),
            None => err,
        })?;
        Ok(())
    }

    async fn list_entries(&self, player_id: &str, limit: i64) -> StoreResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE player_id = $1 ORDER BY id DESC LIMIT $2"
        );
        let rows = self
            .run(
                sqlx::query(&sql)
                    .bind(player_id)
                    .bind(limit)
                    .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows
            .iter()
            .map(entry_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}
