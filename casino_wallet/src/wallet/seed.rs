//! Sample account provisioning for fresh deployments.

use rust_decimal::Decimal;

use super::{errors::LedgerResult, models::Account};
use crate::db::WalletStore;

/// What [`seed_players`] creates
#[derive(Debug, Clone, PartialEq)]
pub struct SeedOptions {
    /// Number of players, named `player1..playerN`
    pub count: u32,
    /// Opening balance of each player
    pub balance: Decimal,
    pub currency: String,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            count: 30,
            balance: Decimal::from(100_000),
            currency: "INR".to_string(),
        }
    }
}

/// Create sample players unless the store already has accounts
///
/// Players `player{i}` get wallets `wallet{i}`. All accounts are created in
/// one unit of work. Returns the number of accounts created, which is zero
/// when seeding was skipped.
pub async fn seed_players<S: WalletStore>(store: &S, options: &SeedOptions) -> LedgerResult<usize> {
    let existing = store.list_accounts().await?;
    if !existing.is_empty() {
        tracing::info!(
            existing = existing.len(),
            "Accounts already present, skipping seeding"
        );
        return Ok(0);
    }

    let mut unit = store.begin_unit().await?;
    for i in 1..=options.count {
        let account = Account::new(
            format!("player{i}"),
            format!("wallet{i}"),
            options.balance,
            options.currency.clone(),
        );
        if let Err(err) = store.create_account(&account, &mut unit).await {
            store.rollback(unit).await?;
            return Err(err.into());
        }
    }
    store.commit(unit).await?;

    tracing::info!(
        count = options.count,
        balance = %options.balance,
        currency = %options.currency,
        "Seeded sample players"
    );
    Ok(options.count as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{AccountStore, MemoryLedgerStore};

    #[tokio::test]
    async fn test_seed_creates_players() {
        let store = MemoryLedgerStore::new();
        let created = seed_players(&store, &SeedOptions::default()).await.unwrap();
        assert_eq!(created, 30);

        let account = store.get_account("player7").await.unwrap().unwrap();
        assert_eq!(account.wallet_id, "wallet7");
        assert_eq!(account.balance, Decimal::from(100_000));
        assert_eq!(account.currency, "INR");
    }

    #[tokio::test]
    async fn test_seed_skipped_when_accounts_exist() {
        let store = MemoryLedgerStore::new()
            .with_accounts([Account::new("alice", "w-alice", Decimal::ONE, "EUR")]);
        let created = seed_players(&store, &SeedOptions::default()).await.unwrap();
        assert_eq!(created, 0);
        assert_eq!(store.list_accounts().await.unwrap().len(), 1);
    }
}
