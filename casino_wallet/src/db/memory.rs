//! In-process wallet store.
//!
//! Mirrors the PostgreSQL store's locking contract: every key read "for
//! update" is held exclusively by the reading unit until it commits or rolls
//! back, including keys that do not exist yet. Writes are staged on the unit
//! and applied in one step at commit, so dropping a unit discards them.
//!
//! Used by the test suites, the benchmarks and `STORE_BACKEND=memory`.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::{
    errors::{Conflict, StoreError, StoreResult},
    repository::{AccountStore, LedgerStore, UnitOfWork},
    timeouts::DEFAULT_LOCK_TIMEOUT,
};
use crate::wallet::{Account, EntryKey, EntryKind, LedgerEntry};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LockKey {
    Request(String),
    Account(String),
    Round(String, String, EntryKind),
}

impl From<EntryKey<'_>> for LockKey {
    fn from(key: EntryKey<'_>) -> Self {
        match key {
            EntryKey::Request(request_id) => LockKey::Request(request_id.to_string()),
            EntryKey::Round {
                round_id,
                wallet_id,
                kind,
            } => LockKey::Round(round_id.to_string(), wallet_id.to_string(), kind),
        }
    }
}

type RoundIndex = (String, String, EntryKind);

fn round_index(entry: &LedgerEntry) -> RoundIndex {
    (entry.round_id.clone(), entry.wallet_id.clone(), entry.kind)
}

/// Store call that can be made to fail once, for exercising rollback paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    AppendEntry,
    AdjustBalance,
    Commit,
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<String, Account>,
    entries: Vec<LedgerEntry>,
    by_request: HashMap<String, usize>,
    by_round: HashMap<RoundIndex, usize>,
}

impl State {
    fn push_entry(&mut self, entry: LedgerEntry) {
        let index = self.entries.len();
        self.by_request.insert(entry.request_id.clone(), index);
        self.by_round.insert(round_index(&entry), index);
        self.entries.push(entry);
    }

    fn find(&self, key: &LockKey) -> Option<&LedgerEntry> {
        let index = match key {
            LockKey::Request(request_id) => self.by_request.get(request_id),
            LockKey::Round(round_id, wallet_id, kind) => {
                self.by_round
                    .get(&(round_id.clone(), wallet_id.clone(), *kind))
            }
            LockKey::Account(_) => None,
        }?;
        self.entries.get(*index)
    }
}

/// Locks and staged writes of one in-memory unit of work
///
/// Dropping the unit releases its locks and discards its writes.
#[derive(Default)]
pub struct MemoryUnit {
    guards: HashMap<LockKey, OwnedMutexGuard<()>>,
    accounts: HashMap<String, Account>,
    entries: Vec<LedgerEntry>,
}

impl MemoryUnit {
    fn staged_entry(&self, key: &LockKey) -> Option<&LedgerEntry> {
        self.entries.iter().find(|entry| match key {
            LockKey::Request(request_id) => &entry.request_id == request_id,
            LockKey::Round(round_id, wallet_id, kind) => {
                &entry.round_id == round_id && &entry.wallet_id == wallet_id && entry.kind == *kind
            }
            LockKey::Account(_) => false,
        })
    }
}

/// In-memory implementation of the wallet store
pub struct MemoryLedgerStore {
    state: Mutex<State>,
    locks: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
    lock_timeout: Duration,
    offline: AtomicBool,
    fail_point: Mutex<Option<FailPoint>>,
}

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".to_string())
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            locks: Mutex::new(HashMap::new()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            offline: AtomicBool::new(false),
            fail_point: Mutex::new(None),
        }
    }

    /// Preload committed accounts
    pub fn with_accounts(self, accounts: impl IntoIterator<Item = Account>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            for account in accounts {
                state.accounts.insert(account.player_id.clone(), account);
            }
        }
        self
    }

    /// Override how long a unit waits for a held key
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Simulate losing the backing store
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make the next call at `point` fail
    pub fn fail_next(&self, point: FailPoint) {
        if let Ok(mut slot) = self.fail_point.lock() {
            *slot = Some(point);
        }
    }

    /// Committed entries in insertion order
    pub fn entries(&self) -> StoreResult<Vec<LedgerEntry>> {
        Ok(self.state.lock().map_err(poisoned)?.entries.clone())
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }

    fn check_fail_point(&self, point: FailPoint) -> StoreResult<()> {
        let mut slot = self.fail_point.lock().map_err(poisoned)?;
        if *slot == Some(point) {
            *slot = None;
            return Err(StoreError::Unavailable(format!("injected failure at {point:?}")));
        }
        Ok(())
    }

    async fn lock(&self, key: LockKey, unit: &mut MemoryUnit) -> StoreResult<()> {
        if unit.guards.contains_key(&key) {
            return Ok(());
        }

        let mutex = {
            let mut locks = self.locks.lock().map_err(poisoned)?;
            Arc::clone(locks.entry(key.clone()).or_default())
        };

        let guard = tokio::time::timeout(self.lock_timeout, mutex.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout(self.lock_timeout))?;

        unit.guards.insert(key, guard);
        Ok(())
    }

    fn release(&self, unit: MemoryUnit) -> StoreResult<()> {
        drop(unit);
        let mut locks = self.locks.lock().map_err(poisoned)?;
        locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        Ok(())
    }

    fn current_account(&self, player_id: &str, unit: &MemoryUnit) -> StoreResult<Option<Account>> {
        if let Some(account) = unit.accounts.get(player_id) {
            return Ok(Some(account.clone()));
        }
        let state = self.state.lock().map_err(poisoned)?;
        Ok(state.accounts.get(player_id).cloned())
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UnitOfWork for MemoryLedgerStore {
    type Unit = MemoryUnit;

    async fn begin_unit(&self) -> StoreResult<Self::Unit> {
        self.check_online()?;
        Ok(MemoryUnit::default())
    }

    async fn commit(&self, mut unit: Self::Unit) -> StoreResult<()> {
        self.check_online()?;
        if let Err(err) = self.check_fail_point(FailPoint::Commit) {
            self.release(unit)?;
            return Err(err);
        }

        {
            let mut state = self.state.lock().map_err(poisoned)?;
            for (player_id, account) in unit.accounts.drain() {
                state.accounts.insert(player_id, account);
            }
            for entry in unit.entries.drain(..) {
                state.push_entry(entry);
            }
        }

        self.release(unit)
    }

    async fn rollback(&self, unit: Self::Unit) -> StoreResult<()> {
        self.release(unit)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check_online()
    }
}

#[async_trait]
impl AccountStore for MemoryLedgerStore {
    async fn get_account_for_update(
        &self,
        player_id: &str,
        unit: &mut Self::Unit,
    ) -> StoreResult<Option<Account>> {
        self.check_online()?;
        self.lock(LockKey::Account(player_id.to_string()), unit).await?;
        self.current_account(player_id, unit)
    }

    async fn adjust_balance(
        &self,
        player_id: &str,
        delta: Decimal,
        unit: &mut Self::Unit,
    ) -> StoreResult<()> {
        self.check_online()?;
        self.check_fail_point(FailPoint::AdjustBalance)?;
        self.lock(LockKey::Account(player_id.to_string()), unit).await?;

        let mut account = self
            .current_account(player_id, unit)?
            .ok_or_else(|| StoreError::Missing(format!("account {player_id}")))?;
        account.balance = account
            .balance
            .checked_add(delta)
            .ok_or_else(|| StoreError::OutOfRange(format!("balance of account {player_id}")))?;
        account.updated_at = Utc::now();
        unit.accounts.insert(player_id.to_string(), account);
        Ok(())
    }

    async fn create_account(&self, account: &Account, unit: &mut Self::Unit) -> StoreResult<()> {
        self.check_online()?;
        self.lock(LockKey::Account(account.player_id.clone()), unit)
            .await?;

        let taken = {
            let state = self.state.lock().map_err(poisoned)?;
            state
                .accounts
                .values()
                .chain(unit.accounts.values())
                .any(|existing| {
                    existing.player_id == account.player_id
                        || existing.wallet_id == account.wallet_id
                })
        };
        if taken {
            return Err(StoreError::Conflict(Conflict::Account(
                account.player_id.clone(),
            )));
        }

        unit.accounts
            .insert(account.player_id.clone(), account.clone());
        Ok(())
    }

    async fn get_account(&self, player_id: &str) -> StoreResult<Option<Account>> {
        self.check_online()?;
        let state = self.state.lock().map_err(poisoned)?;
        Ok(state.accounts.get(player_id).cloned())
    }

    async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        self.check_online()?;
        let mut accounts: Vec<Account> = {
            let state = self.state.lock().map_err(poisoned)?;
            state.accounts.values().cloned().collect()
        };
        accounts.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.player_id.cmp(&b.player_id))
        });
        Ok(accounts)
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn get_entry_for_update(
        &self,
        key: EntryKey<'_>,
        unit: &mut Self::Unit,
    ) -> StoreResult<Option<LedgerEntry>> {
        self.check_online()?;
        let key = LockKey::from(key);
        self.lock(key.clone(), unit).await?;

        if let Some(entry) = unit.staged_entry(&key) {
            return Ok(Some(entry.clone()));
        }
        let state = self.state.lock().map_err(poisoned)?;
        Ok(state.find(&key).cloned())
    }

    async fn append_entry(&self, entry: &LedgerEntry, unit: &mut Self::Unit) -> StoreResult<()> {
        self.check_online()?;
        self.check_fail_point(FailPoint::AppendEntry)?;

        let request_key = LockKey::Request(entry.request_id.clone());
        let (round_id, wallet_id, kind) = round_index(entry);
        let round_key = LockKey::Round(round_id, wallet_id, kind);

        let conflict = {
            let state = self.state.lock().map_err(poisoned)?;
            if !state.accounts.contains_key(&entry.player_id)
                && !unit.accounts.contains_key(&entry.player_id)
            {
                return Err(StoreError::Missing(format!("account {}", entry.player_id)));
            }
            if state.find(&request_key).is_some() || unit.staged_entry(&request_key).is_some() {
                Some(Conflict::RequestId(entry.request_id.clone()))
            } else if state.find(&round_key).is_some() || unit.staged_entry(&round_key).is_some()
            {
                Some(Conflict::Round {
                    round_id: entry.round_id.clone(),
                    wallet_id: entry.wallet_id.clone(),
                })
            } else {
                None
            }
        };
        if let Some(conflict) = conflict {
            return Err(StoreError::Conflict(conflict));
        }

        unit.entries.push(entry.clone());
        Ok(())
    }

    async fn list_entries(&self, player_id: &str, limit: i64) -> StoreResult<Vec<LedgerEntry>> {
        self.check_online()?;
        let limit = usize::try_from(limit).unwrap_or(0);
        let state = self.state.lock().map_err(poisoned)?;
        Ok(state
            .entries
            .iter()
            .rev()
            .filter(|entry| entry.player_id == player_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(player: &str, balance: i64) -> Account {
        Account::new(player, format!("w-{player}"), Decimal::from(balance), "INR")
    }

    fn entry(request_id: &str, round_id: &str, kind: EntryKind) -> LedgerEntry {
        LedgerEntry {
            request_id: request_id.to_string(),
            player_id: "p1".to_string(),
            wallet_id: "w-p1".to_string(),
            round_id: round_id.to_string(),
            session_id: "s1".to_string(),
            game_code: "slots".to_string(),
            kind,
            amount: Decimal::from(10),
            currency: "INR".to_string(),
            created_at: Utc::now(),
        }
    }

    fn store() -> MemoryLedgerStore {
        MemoryLedgerStore::new().with_accounts([account("p1", 100)])
    }

    #[tokio::test]
    async fn test_commit_applies_staged_writes() {
        let store = store();
        let mut unit = store.begin_unit().await.unwrap();
        store
            .append_entry(&entry("r1", "round1", EntryKind::Bet), &mut unit)
            .await
            .unwrap();
        store
            .adjust_balance("p1", Decimal::from(-10), &mut unit)
            .await
            .unwrap();

        // Not visible until commit
        assert!(store.entries().unwrap().is_empty());
        store.commit(unit).await.unwrap();

        let account = store.get_account("p1").await.unwrap().unwrap();
        assert_eq!(account.balance, Decimal::from(90));
        assert_eq!(store.entries().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_unit_discards_writes() {
        let store = store();
        {
            let mut unit = store.begin_unit().await.unwrap();
            store
                .adjust_balance("p1", Decimal::from(-10), &mut unit)
                .await
                .unwrap();
        }
        let account = store.get_account("p1").await.unwrap().unwrap();
        assert_eq!(account.balance, Decimal::from(100));
    }

    #[tokio::test]
    async fn test_staged_entry_visible_within_unit() {
        let store = store();
        let mut unit = store.begin_unit().await.unwrap();
        let bet = entry("r1", "round1", EntryKind::Bet);
        store.append_entry(&bet, &mut unit).await.unwrap();

        let found = store
            .get_entry_for_update(EntryKey::Request("r1"), &mut unit)
            .await
            .unwrap();
        assert_eq!(found, Some(bet));
    }

    #[tokio::test]
    async fn test_append_rejects_duplicates() {
        let store = store();
        let mut unit = store.begin_unit().await.unwrap();
        store
            .append_entry(&entry("r1", "round1", EntryKind::Bet), &mut unit)
            .await
            .unwrap();
        store.commit(unit).await.unwrap();

        let mut unit = store.begin_unit().await.unwrap();
        let err = store
            .append_entry(&entry("r1", "round2", EntryKind::Bet), &mut unit)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(Conflict::RequestId(_))));

        let err = store
            .append_entry(&entry("r2", "round1", EntryKind::Bet), &mut unit)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(Conflict::Round { .. })));
    }

    #[tokio::test]
    async fn test_absent_key_lock_blocks_second_unit() {
        let store = MemoryLedgerStore::new()
            .with_accounts([account("p1", 100)])
            .with_lock_timeout(Duration::from_millis(50));

        let mut first = store.begin_unit().await.unwrap();
        assert!(
            store
                .get_entry_for_update(EntryKey::Request("r9"), &mut first)
                .await
                .unwrap()
                .is_none()
        );

        let mut second = store.begin_unit().await.unwrap();
        let err = store
            .get_entry_for_update(EntryKey::Request("r9"), &mut second)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout(_)));

        store.rollback(first).await.unwrap();
        assert!(
            store
                .get_entry_for_update(EntryKey::Request("r9"), &mut second)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_fail_point_fires_once() {
        let store = store();
        store.fail_next(FailPoint::AdjustBalance);

        let mut unit = store.begin_unit().await.unwrap();
        assert!(
            store
                .adjust_balance("p1", Decimal::ONE, &mut unit)
                .await
                .is_err()
        );
        assert!(
            store
                .adjust_balance("p1", Decimal::ONE, &mut unit)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_offline_store_rejects_calls() {
        let store = store();
        store.set_offline(true);
        assert!(matches!(
            store.ping().await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.begin_unit().await.is_err());

        store.set_offline(false);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_adjust_balance_past_max_is_out_of_range() {
        let store = MemoryLedgerStore::new()
            .with_accounts([Account::new("p1", "w-p1", Decimal::MAX, "INR")]);
        let mut unit = store.begin_unit().await.unwrap();

        let err = store
            .adjust_balance("p1", Decimal::ONE, &mut unit)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OutOfRange(_)));

        store.rollback(unit).await.unwrap();
        let account = store.get_account("p1").await.unwrap().unwrap();
        assert_eq!(account.balance, Decimal::MAX);
    }

    #[tokio::test]
    async fn test_create_account_rejects_taken_wallet() {
        let store = store();
        let mut unit = store.begin_unit().await.unwrap();
        let clash = Account::new("p2", "w-p1", Decimal::ZERO, "INR");
        let err = store.create_account(&clash, &mut unit).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(Conflict::Account(_))));
    }

    #[tokio::test]
    async fn test_list_entries_newest_first_with_limit() {
        let store = store();
        let mut unit = store.begin_unit().await.unwrap();
        for i in 0..3 {
            store
                .append_entry(
                    &entry(&format!("r{i}"), &format!("round{i}"), EntryKind::Bet),
                    &mut unit,
                )
                .await
                .unwrap();
        }
        store.commit(unit).await.unwrap();

        let listed = store.list_entries("p1", 2).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|e| e.request_id.as_str()).collect();
        assert_eq!(ids, vec!["r2", "r1"]);
    }
}
