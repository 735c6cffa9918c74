use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use sea_orm::DatabaseConnection;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    Account, EngineError, ResultEngine,
    store::{DatabaseStore, LedgerStore},
};

mod accounts;
mod balances;
mod budgets;
mod categories;
mod debts;
mod health;
mod transactions;

pub use accounts::AccountRemoval;
pub use balances::BalanceCheck;
pub use transactions::{CategorySpend, TransactionPage, TransactionQuery, TransactionSummary};

const DEFAULT_PAGE_SIZE: u64 = 50;

/// One async mutex per account id. Mutations of an account hold its guard
/// from the balance read until the store commits.
#[derive(Debug, Default)]
struct AccountLocks {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl AccountLocks {
    async fn acquire(&self, account_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(account_id).or_default())
        };
        lock.lock_owned().await
    }

    /// Drops the entry of a deleted account. Holders of its guard keep their
    /// own handle until they release it.
    fn forget(&self, account_id: Uuid) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.remove(&account_id);
    }

    #[cfg(test)]
    fn tracks(&self, account_id: Uuid) -> bool {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.contains_key(&account_id)
    }
}

#[derive(Debug)]
pub struct Engine {
    store: Arc<dyn LedgerStore>,
    locks: AccountLocks,
    page_size: u64,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    async fn lock_account(&self, account_id: Uuid) -> OwnedMutexGuard<()> {
        self.locks.acquire(account_id).await
    }

    /// Loads an account of `user_id`. Accounts of other users are reported as
    /// missing.
    async fn owned_account(&self, user_id: &str, account_id: Uuid) -> ResultEngine<Account> {
        self.store
            .account(account_id)
            .await?
            .filter(|account| account.is_owned_by(user_id))
            .ok_or_else(|| EngineError::NotFound("account".to_string()))
    }

    /// Like [`owned_account`](Self::owned_account), refusing inactive accounts.
    async fn writable_account(&self, user_id: &str, account_id: Uuid) -> ResultEngine<Account> {
        let account = self.owned_account(user_id, account_id).await?;
        if !account.active {
            return Err(EngineError::InvalidInput(format!(
                "account {account_id} is inactive"
            )));
        }
        Ok(account)
    }

    async fn account_ids(
        &self,
        user_id: &str,
        include_inactive: bool,
    ) -> ResultEngine<Vec<Uuid>> {
        Ok(self
            .store
            .accounts_for_user(user_id, include_inactive)
            .await?
            .into_iter()
            .map(|account| account.id)
            .collect())
    }
}

/// Log rejections callers may want to see in the operator logs.
fn log_rejection(operation: &str, err: &EngineError) {
    match err {
        EngineError::InsufficientFunds(reason) | EngineError::Conflict(reason) => {
            tracing::warn!(operation, reason = %reason, "mutation rejected");
        }
        _ => {}
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    store: Option<Arc<dyn LedgerStore>>,
    page_size: Option<u64>,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.store = Some(Arc::new(DatabaseStore::new(db)));
        self
    }

    /// Use any storage adapter instead of a database connection.
    pub fn store(mut self, store: Arc<dyn LedgerStore>) -> EngineBuilder {
        self.store = Some(store);
        self
    }

    pub fn page_size(mut self, page_size: u64) -> EngineBuilder {
        self.page_size = Some(page_size);
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        let store = self
            .store
            .ok_or_else(|| EngineError::InvalidInput("engine needs a store".to_string()))?;
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Err(EngineError::InvalidInput(
                "page size must be > 0".to_string(),
            ));
        }
        Ok(Engine {
            store,
            locks: AccountLocks::default(),
            page_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewAccountCmd, store::MemoryStore};

    async fn engine() -> Engine {
        Engine::builder()
            .store(Arc::new(MemoryStore::new()))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn deleted_account_releases_its_lock() {
        let engine = engine().await;
        let account = engine
            .create_account(NewAccountCmd::new("alice", "Wallet"))
            .await
            .unwrap();

        engine.reactivate_account("alice", account.id).await.unwrap();
        assert!(engine.locks.tracks(account.id));

        let removal = engine.remove_account("alice", account.id).await.unwrap();
        assert_eq!(removal, AccountRemoval::Deleted);
        assert!(!engine.locks.tracks(account.id));
    }

    #[tokio::test]
    async fn forgotten_lock_is_recreated_on_demand() {
        let locks = AccountLocks::default();
        let id = Uuid::new_v4();

        let guard = locks.acquire(id).await;
        locks.forget(id);
        assert!(!locks.tracks(id));
        drop(guard);

        let _again = locks.acquire(id).await;
        assert!(locks.tracks(id));
    }
}
