//! Wallet manager: the single entry point the HTTP layer talks to.

use async_trait::async_trait;
use std::sync::Arc;

use super::{
    errors::LedgerResult,
    models::{Account, LedgerEntry, LedgerEvent},
    processor::TransactionProcessor,
    query::WalletQuery,
};
use crate::db::WalletStore;

/// Object-safe wallet operations
///
/// Lets the server hold one `Arc<dyn WalletService>` regardless of which
/// store backs it.
#[async_trait]
pub trait WalletService: Send + Sync {
    /// Apply a validated event
    async fn process(&self, event: &LedgerEvent) -> LedgerResult<()>;

    async fn get_balance(&self, player_id: &str) -> LedgerResult<Account>;

    async fn list_accounts(&self) -> LedgerResult<Vec<Account>>;

    async fn list_entries(
        &self,
        player_id: &str,
        limit: Option<i64>,
    ) -> LedgerResult<Vec<LedgerEntry>>;

    /// Whether the backing store answers
    async fn health_check(&self) -> LedgerResult<()>;
}

/// Wallet manager
pub struct WalletManager<S> {
    processor: TransactionProcessor<S>,
    query: WalletQuery<S>,
}

impl<S> Clone for WalletManager<S> {
    fn clone(&self) -> Self {
        Self {
            processor: self.processor.clone(),
            query: self.query.clone(),
        }
    }
}

impl<S: WalletStore> WalletManager<S> {
    /// Create a new wallet manager
    ///
    /// # Arguments
    ///
    /// * `store` - Store shared by the processor and the query facade
    pub fn new(store: Arc<S>) -> Self {
        Self {
            processor: TransactionProcessor::new(Arc::clone(&store)),
            query: WalletQuery::new(store),
        }
    }
}

#[async_trait]
impl<S: WalletStore + 'static> WalletService for WalletManager<S> {
    async fn process(&self, event: &LedgerEvent) -> LedgerResult<()> {
        self.processor.process(event).await
    }

    async fn get_balance(&self, player_id: &str) -> LedgerResult<Account> {
        self.query.get_balance(player_id).await
    }

    async fn list_accounts(&self) -> LedgerResult<Vec<Account>> {
        self.query.list_accounts().await
    }

    async fn list_entries(
        &self,
        player_id: &str,
        limit: Option<i64>,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        self.query.list_entries(player_id, limit).await
    }

    async fn health_check(&self) -> LedgerResult<()> {
        self.query.ping().await
    }
}
