//! Transaction processor: applies bet and result events to player balances.
//!
//! Each call to [`TransactionProcessor::process`] runs in a single unit of
//! work. Locks are always taken in the same order (request id, account,
//! round bet key, round result key) so concurrent units never wait on each
//! other in a cycle.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

use super::{
    errors::{LedgerError, LedgerResult},
    models::{Account, EntryKey, EntryKind, LedgerEntry, LedgerEvent},
};
use crate::db::WalletStore;

/// Transaction processor
pub struct TransactionProcessor<S> {
    store: Arc<S>,
}

impl<S> Clone for TransactionProcessor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: WalletStore> TransactionProcessor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Apply an event atomically
    ///
    /// On success the ledger entry and the balance change are committed
    /// together. On any error the unit of work is rolled back before
    /// returning, so the store is left exactly as it was.
    ///
    /// # Errors
    ///
    /// * `LedgerError::DuplicateRequest` - `request_id` already recorded
    /// * `LedgerError::AccountNotFound` - No account for `player_id`
    /// * `LedgerError::DuplicateRound` - Round already has a bet (or result)
    /// * `LedgerError::InsufficientBalance` - Bet exceeds the balance
    /// * `LedgerError::BetNotFound` - Result without a prior bet
    /// * `LedgerError::GameCodeMismatch` / `WalletMismatch` / `PlayerMismatch`
    /// * `LedgerError::InvalidRequest` - Zero amount
    /// * `LedgerError::Storage` - Lock timeout, connectivity loss and the like
    pub async fn process(&self, event: &LedgerEvent) -> LedgerResult<()> {
        tracing::debug!(
            request_id = %event.request_id,
            kind = %event.kind,
            player_id = %event.player_id,
            "Processing event"
        );

        let mut unit = self.store.begin_unit().await?;

        match self.apply(event, &mut unit).await {
            Ok(()) => {
                self.store.commit(unit).await?;
                tracing::info!(
                    request_id = %event.request_id,
                    kind = %event.kind,
                    player_id = %event.player_id,
                    round_id = %event.round_id,
                    amount = %event.amount,
                    "Event applied"
                );
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback(unit).await {
                    tracing::error!(
                        request_id = %event.request_id,
                        error = %rollback_err,
                        "Rollback failed"
                    );
                }
                log_rejection(event, &err);
                Err(err)
            }
        }
    }

    async fn apply(&self, event: &LedgerEvent, unit: &mut S::Unit) -> LedgerResult<()> {
        if self
            .store
            .get_entry_for_update(EntryKey::Request(&event.request_id), unit)
            .await?
            .is_some()
        {
            return Err(LedgerError::DuplicateRequest(event.request_id.clone()));
        }

        let account = self
            .store
            .get_account_for_update(&event.player_id, unit)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(event.player_id.clone()))?;

        let delta = match event.kind {
            EntryKind::Bet => self.check_bet(event, &account, unit).await?,
            EntryKind::Result => self.check_result(event, &account, unit).await?,
        };

        let entry = LedgerEntry::from_event(event, Utc::now());
        self.store.append_entry(&entry, unit).await?;
        self.store
            .adjust_balance(&event.player_id, delta, unit)
            .await?;

        Ok(())
    }

    /// Rules for a bet; returns the balance delta
    async fn check_bet(
        &self,
        event: &LedgerEvent,
        account: &Account,
        unit: &mut S::Unit,
    ) -> LedgerResult<Decimal> {
        if self
            .store
            .get_entry_for_update(event.bet_key(), unit)
            .await?
            .is_some()
        {
            return Err(round_taken(event));
        }

        if event.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidRequest(
                "bet amount must be greater than 0".to_string(),
            ));
        }

        if account.balance < event.amount {
            return Err(LedgerError::InsufficientBalance {
                available: account.balance,
                required: event.amount,
            });
        }

        Ok(-event.amount)
    }

    /// Rules for a result; returns the balance delta
    async fn check_result(
        &self,
        event: &LedgerEvent,
        account: &Account,
        unit: &mut S::Unit,
    ) -> LedgerResult<Decimal> {
        let bet = self
            .store
            .get_entry_for_update(event.bet_key(), unit)
            .await?
            .ok_or_else(|| LedgerError::BetNotFound {
                round_id: event.round_id.clone(),
                wallet_id: event.wallet_id.clone(),
            })?;

        if bet.game_code != event.game_code {
            return Err(LedgerError::GameCodeMismatch {
                expected: bet.game_code,
                got: event.game_code.clone(),
            });
        }
        // The bet was looked up by this wallet, so this only trips if the
        // store hands back a row from another wallet.
        if bet.wallet_id != event.wallet_id {
            return Err(LedgerError::WalletMismatch {
                expected: bet.wallet_id,
                got: event.wallet_id.clone(),
            });
        }
        if bet.player_id != event.player_id {
            return Err(LedgerError::PlayerMismatch {
                expected: bet.player_id,
                got: event.player_id.clone(),
            });
        }

        if self
            .store
            .get_entry_for_update(event.result_key(), unit)
            .await?
            .is_some()
        {
            return Err(round_taken(event));
        }

        // Zero results are rejected rather than recorded as a no-op payout
        if event.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidRequest(
                "result amount must be greater than 0".to_string(),
            ));
        }

        if account.balance.checked_add(event.amount).is_none() {
            return Err(LedgerError::InvalidRequest(
                "result amount exceeds the maximum balance".to_string(),
            ));
        }

        Ok(event.amount)
    }
}

fn round_taken(event: &LedgerEvent) -> LedgerError {
    LedgerError::DuplicateRound {
        round_id: event.round_id.clone(),
        wallet_id: event.wallet_id.clone(),
    }
}

fn log_rejection(event: &LedgerEvent, err: &LedgerError) {
    if err.is_business_rejection() {
        tracing::warn!(
            request_id = %event.request_id,
            kind = %event.kind,
            player_id = %event.player_id,
            wallet_id = %event.wallet_id,
            round_id = %event.round_id,
            amount = %event.amount,
            reason = err.code(),
            "Event rejected"
        );
    } else {
        tracing::error!(
            request_id = %event.request_id,
            kind = %event.kind,
            player_id = %event.player_id,
            wallet_id = %event.wallet_id,
            round_id = %event.round_id,
            amount = %event.amount,
            error = %err,
            "Event failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{FailPoint, MemoryLedgerStore, MemoryUnit, StoreError, StoreResult};
    use crate::db::{AccountStore, LedgerStore, UnitOfWork};
    use async_trait::async_trait;

    fn event(request_id: &str, kind: EntryKind, round_id: &str, amount: i64) -> LedgerEvent {
        LedgerEvent {
            request_id: request_id.to_string(),
            player_id: "player1".to_string(),
            wallet_id: "wallet1".to_string(),
            round_id: round_id.to_string(),
            session_id: "session1".to_string(),
            game_code: "slots".to_string(),
            kind,
            amount: Decimal::from(amount),
            currency: "INR".to_string(),
        }
    }

    fn processor(balance: i64) -> TransactionProcessor<MemoryLedgerStore> {
        let store = MemoryLedgerStore::new().with_accounts([
            Account::new("player1", "wallet1", Decimal::from(balance), "INR"),
            Account::new("player2", "wallet2", Decimal::from(balance), "INR"),
        ]);
        TransactionProcessor::new(Arc::new(store))
    }

    async fn balance(processor: &TransactionProcessor<MemoryLedgerStore>, player: &str) -> Decimal {
        processor
            .store()
            .get_account(player)
            .await
            .unwrap()
            .unwrap()
            .balance
    }

    #[tokio::test]
    async fn test_bet_debits_balance() {
        let processor = processor(1000);
        processor
            .process(&event("r1", EntryKind::Bet, "round1", 300))
            .await
            .unwrap();
        assert_eq!(balance(&processor, "player1").await, Decimal::from(700));
    }

    #[tokio::test]
    async fn test_bet_may_spend_entire_balance() {
        let processor = processor(300);
        processor
            .process(&event("r1", EntryKind::Bet, "round1", 300))
            .await
            .unwrap();
        assert_eq!(balance(&processor, "player1").await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_result_credits_balance() {
        let processor = processor(1000);
        processor
            .process(&event("r1", EntryKind::Bet, "round1", 300))
            .await
            .unwrap();
        processor
            .process(&event("r2", EntryKind::Result, "round1", 900))
            .await
            .unwrap();
        assert_eq!(balance(&processor, "player1").await, Decimal::from(1600));
    }

    #[tokio::test]
    async fn test_unknown_player() {
        let processor = processor(1000);
        let mut ghost = event("r1", EntryKind::Bet, "round1", 10);
        ghost.player_id = "ghost".to_string();
        let err = processor.process(&ghost).await.unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound(_)));
        assert!(!err.is_business_rejection());
    }

    #[tokio::test]
    async fn test_duplicate_request_wins_over_other_rules() {
        let processor = processor(1000);
        processor
            .process(&event("r1", EntryKind::Bet, "round1", 300))
            .await
            .unwrap();

        // Same request id with a body that would otherwise fail differently
        let replay = event("r1", EntryKind::Bet, "round2", 5000);
        assert!(matches!(
            processor.process(&replay).await,
            Err(LedgerError::DuplicateRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_second_bet_on_round() {
        let processor = processor(1000);
        processor
            .process(&event("r1", EntryKind::Bet, "round1", 100))
            .await
            .unwrap();
        let err = processor
            .process(&event("r2", EntryKind::Bet, "round1", 100))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateRound { .. }));
        assert_eq!(balance(&processor, "player1").await, Decimal::from(900));
    }

    #[tokio::test]
    async fn test_zero_bet_rejected() {
        let processor = processor(1000);
        let err = processor
            .process(&event("r1", EntryKind::Bet, "round1", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_zero_result_rejected() {
        let processor = processor(1000);
        processor
            .process(&event("r1", EntryKind::Bet, "round1", 100))
            .await
            .unwrap();
        let err = processor
            .process(&event("r2", EntryKind::Result, "round1", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRequest(_)));

        // The round stays open for a real settlement
        processor
            .process(&event("r3", EntryKind::Result, "round1", 50))
            .await
            .unwrap();
        assert_eq!(balance(&processor, "player1").await, Decimal::from(950));
    }

    #[tokio::test]
    async fn test_result_past_max_balance_rejected() {
        let processor = processor(1000);
        let huge = Decimal::from_i128_with_scale(5 * 10_i128.pow(28), 0);

        processor
            .process(&event("r1", EntryKind::Bet, "round1", 1))
            .await
            .unwrap();
        let mut payout = event("r2", EntryKind::Result, "round1", 0);
        payout.amount = huge;
        processor.process(&payout).await.unwrap();

        processor
            .process(&event("r3", EntryKind::Bet, "round2", 1))
            .await
            .unwrap();
        let mut overflow = event("r4", EntryKind::Result, "round2", 0);
        overflow.amount = huge;
        let err = processor.process(&overflow).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRequest(_)));

        // Nothing persisted for the rejected result
        assert_eq!(
            balance(&processor, "player1").await,
            huge + Decimal::from(998)
        );
        assert_eq!(processor.store().entries().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_result_mismatches_checked_in_order() {
        let processor = processor(1000);
        processor
            .process(&event("r1", EntryKind::Bet, "round1", 100))
            .await
            .unwrap();

        let mut wrong_game = event("r2", EntryKind::Result, "round1", 10);
        wrong_game.game_code = "roulette".to_string();
        wrong_game.player_id = "player2".to_string();
        assert!(matches!(
            processor.process(&wrong_game).await,
            Err(LedgerError::GameCodeMismatch { .. })
        ));

        let mut wrong_player = event("r3", EntryKind::Result, "round1", 10);
        wrong_player.player_id = "player2".to_string();
        assert!(matches!(
            processor.process(&wrong_player).await,
            Err(LedgerError::PlayerMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_result_for_other_wallet_has_no_bet() {
        let processor = processor(1000);
        processor
            .process(&event("r1", EntryKind::Bet, "round1", 100))
            .await
            .unwrap();

        let mut other_wallet = event("r2", EntryKind::Result, "round1", 10);
        other_wallet.wallet_id = "wallet2".to_string();
        assert!(matches!(
            processor.process(&other_wallet).await,
            Err(LedgerError::BetNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_balance_write_rolls_back_entry() {
        let processor = processor(1000);
        processor.store().fail_next(FailPoint::AdjustBalance);

        let err = processor
            .process(&event("r1", EntryKind::Bet, "round1", 100))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Storage(StoreError::Unavailable(_))
        ));
        assert!(processor.store().entries().unwrap().is_empty());
        assert_eq!(balance(&processor, "player1").await, Decimal::from(1000));

        // Retrying with the same request id is safe
        processor
            .process(&event("r1", EntryKind::Bet, "round1", 100))
            .await
            .unwrap();
        assert_eq!(balance(&processor, "player1").await, Decimal::from(900));
    }

    #[tokio::test]
    async fn test_rejected_event_leaves_no_entry() {
        let processor = processor(50);
        let _ = processor
            .process(&event("r1", EntryKind::Bet, "round1", 100))
            .await;
        assert!(
            processor
                .store()
                .list_entries("player1", 10)
                .await
                .unwrap()
                .is_empty()
        );
    }

    /// Store that hands back round bets as if booked on another wallet
    struct ForeignBetStore {
        inner: MemoryLedgerStore,
    }

    #[async_trait]
    impl UnitOfWork for ForeignBetStore {
        type Unit = MemoryUnit;

        async fn begin_unit(&self) -> StoreResult<MemoryUnit> {
            self.inner.begin_unit().await
        }

        async fn commit(&self, unit: MemoryUnit) -> StoreResult<()> {
            self.inner.commit(unit).await
        }

        async fn rollback(&self, unit: MemoryUnit) -> StoreResult<()> {
            self.inner.rollback(unit).await
        }

        async fn ping(&self) -> StoreResult<()> {
            self.inner.ping().await
        }
    }

    #[async_trait]
    impl AccountStore for ForeignBetStore {
        async fn get_account_for_update(
            &self,
            player_id: &str,
            unit: &mut MemoryUnit,
        ) -> StoreResult<Option<Account>> {
            self.inner.get_account_for_update(player_id, unit).await
        }

        async fn adjust_balance(
            &self,
            player_id: &str,
            delta: Decimal,
            unit: &mut MemoryUnit,
        ) -> StoreResult<()> {
            self.inner.adjust_balance(player_id, delta, unit).await
        }

        async fn create_account(&self, account: &Account, unit: &mut MemoryUnit) -> StoreResult<()> {
            self.inner.create_account(account, unit).await
        }

        async fn get_account(&self, player_id: &str) -> StoreResult<Option<Account>> {
            self.inner.get_account(player_id).await
        }

        async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
            self.inner.list_accounts().await
        }
    }

    #[async_trait]
    impl LedgerStore for ForeignBetStore {
        async fn get_entry_for_update(
            &self,
            key: EntryKey<'_>,
            unit: &mut MemoryUnit,
        ) -> StoreResult<Option<LedgerEntry>> {
            let entry = self.inner.get_entry_for_update(key, unit).await?;
            Ok(entry.map(|mut entry| {
                if matches!(key, EntryKey::Round { .. }) && entry.kind == EntryKind::Bet {
                    entry.wallet_id = "wallet-elsewhere".to_string();
                }
                entry
            }))
        }

        async fn append_entry(&self, entry: &LedgerEntry, unit: &mut MemoryUnit) -> StoreResult<()> {
            self.inner.append_entry(entry, unit).await
        }

        async fn list_entries(&self, player_id: &str, limit: i64) -> StoreResult<Vec<LedgerEntry>> {
            self.inner.list_entries(player_id, limit).await
        }
    }

    #[tokio::test]
    async fn test_wallet_mismatch_checked_after_game_code() {
        let store = ForeignBetStore {
            inner: MemoryLedgerStore::new().with_accounts([
                Account::new("player1", "wallet1", Decimal::from(1000), "INR"),
                Account::new("player2", "wallet2", Decimal::from(1000), "INR"),
            ]),
        };
        let processor = TransactionProcessor::new(Arc::new(store));
        processor
            .process(&event("r1", EntryKind::Bet, "round1", 100))
            .await
            .unwrap();

        // Game code is compared first
        let mut wrong_game = event("r2", EntryKind::Result, "round1", 10);
        wrong_game.game_code = "roulette".to_string();
        assert!(matches!(
            processor.process(&wrong_game).await,
            Err(LedgerError::GameCodeMismatch { .. })
        ));

        // Wallet before player
        let mut wrong_player = event("r3", EntryKind::Result, "round1", 10);
        wrong_player.player_id = "player2".to_string();
        let err = processor.process(&wrong_player).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::WalletMismatch { ref expected, ref got }
                if expected == "wallet-elsewhere" && got == "wallet1"
        ));
        assert_eq!(err.client_message(), "wallet ID mismatch");

        let account = processor.store().get_account("player1").await.unwrap().unwrap();
        assert_eq!(account.balance, Decimal::from(900));
    }
}
