//! Read-only access to balances and history.

use std::sync::Arc;

use super::{
    errors::{LedgerError, LedgerResult},
    models::{Account, LedgerEntry},
};
use crate::db::WalletStore;

/// Default number of entries returned by [`WalletQuery::list_entries`]
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;

/// Upper bound on the history page size
pub const MAX_HISTORY_LIMIT: i64 = 500;

/// Query facade over committed state
///
/// Takes no locks and opens no unit of work.
pub struct WalletQuery<S> {
    store: Arc<S>,
}

impl<S> Clone for WalletQuery<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: WalletStore> WalletQuery<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Get the account of a player
    ///
    /// # Errors
    ///
    /// * `LedgerError::AccountNotFound` - No account for `player_id`
    pub async fn get_balance(&self, player_id: &str) -> LedgerResult<Account> {
        self.store
            .get_account(player_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(player_id.to_string()))
    }

    pub async fn list_accounts(&self) -> LedgerResult<Vec<Account>> {
        Ok(self.store.list_accounts().await?)
    }

    /// Latest entries for a player, newest first
    ///
    /// `limit` is clamped to `1..=MAX_HISTORY_LIMIT`; `None` means
    /// [`DEFAULT_HISTORY_LIMIT`]. Unknown players yield
    /// `LedgerError::AccountNotFound` rather than an empty page.
    pub async fn list_entries(
        &self,
        player_id: &str,
        limit: Option<i64>,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);

        if self.store.get_account(player_id).await?.is_none() {
            return Err(LedgerError::AccountNotFound(player_id.to_string()));
        }
        Ok(self.store.list_entries(player_id, limit).await?)
    }

    /// Store reachability probe
    pub async fn ping(&self) -> LedgerResult<()> {
        Ok(self.store.ping().await?)
    }
}
