//! In-process store.
//!
//! All state sits behind one `RwLock`; every write takes the write lock for
//! its whole check-then-apply sequence, which makes each port call atomic.

use std::{
    cmp::Reverse,
    collections::HashMap,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    Account, Budget, Category, Debt, EngineError, MoneyCents, ResultEngine, Transaction,
};

use super::{
    AccountStore, BalanceChange, BudgetStore, CategoryStore, DebtStore, TransactionCursor,
    TransactionFilter, TransactionStore,
};

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<Uuid, Account>,
    categories: HashMap<Uuid, Category>,
    transactions: HashMap<Uuid, Transaction>,
    budgets: HashMap<Uuid, Budget>,
    debts: HashMap<Uuid, Debt>,
}

impl MemoryState {
    /// Validates a balance compare-and-set without applying it.
    fn check_balance(&self, change: &BalanceChange) -> ResultEngine<()> {
        let account = self
            .accounts
            .get(&change.account_id)
            .ok_or_else(|| EngineError::NotFound("account".to_string()))?;
        if account.balance != change.expected {
            return Err(EngineError::Conflict(format!(
                "balance of account {} changed concurrently",
                change.account_id
            )));
        }
        Ok(())
    }

    fn apply_balance(&mut self, change: &BalanceChange) {
        if let Some(account) = self.accounts.get_mut(&change.account_id) {
            account.balance = change.new;
        }
    }
}

/// Store keeping everything in memory. Intended for tests and tooling.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn sorted_by_end_date_desc<T: Clone>(
    items: Vec<&T>,
    end: impl Fn(&T) -> chrono::NaiveDate,
) -> Vec<T> {
    let mut items: Vec<T> = items.into_iter().cloned().collect();
    items.sort_by_key(|item| Reverse(end(item)));
    items
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert_account(&self, account: &Account) -> ResultEngine<()> {
        let mut state = self.write();
        if state.accounts.contains_key(&account.id) {
            return Err(EngineError::Conflict(format!(
                "account {} already present",
                account.id
            )));
        }
        state.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn account(&self, id: Uuid) -> ResultEngine<Option<Account>> {
        Ok(self.read().accounts.get(&id).cloned())
    }

    async fn accounts_for_user(
        &self,
        user_id: &str,
        include_inactive: bool,
    ) -> ResultEngine<Vec<Account>> {
        let state = self.read();
        let mut accounts: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| a.user_id == user_id && (include_inactive || a.active))
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(accounts)
    }

    async fn update_account(&self, account: &Account) -> ResultEngine<()> {
        let mut state = self.write();
        let stored = state
            .accounts
            .get_mut(&account.id)
            .ok_or_else(|| EngineError::NotFound("account".to_string()))?;
        stored.name = account.name.clone();
        stored.active = account.active;
        Ok(())
    }

    async fn delete_account(&self, id: Uuid) -> ResultEngine<()> {
        self.write()
            .accounts
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound("account".to_string()))
    }

    async fn account_has_dependents(&self, id: Uuid) -> ResultEngine<bool> {
        let state = self.read();
        Ok(state.transactions.values().any(|t| t.account_id == id)
            || state.budgets.values().any(|b| b.account_id == id)
            || state.debts.values().any(|d| d.account_id == id))
    }

    async fn swap_balance(&self, change: BalanceChange) -> ResultEngine<()> {
        let mut state = self.write();
        state.check_balance(&change)?;
        state.apply_balance(&change);
        Ok(())
    }
}

#[async_trait]
impl CategoryStore for MemoryStore {
    async fn insert_category(&self, category: &Category) -> ResultEngine<()> {
        let mut state = self.write();
        if state
            .categories
            .values()
            .any(|c| c.name_norm == category.name_norm)
        {
            return Err(EngineError::Conflict(format!(
                "category \"{}\" already present",
                category.name
            )));
        }
        state.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn category(&self, id: Uuid) -> ResultEngine<Option<Category>> {
        Ok(self.read().categories.get(&id).cloned())
    }

    async fn category_by_key(&self, name_norm: &str) -> ResultEngine<Option<Category>> {
        Ok(self
            .read()
            .categories
            .values()
            .find(|c| c.name_norm == name_norm)
            .cloned())
    }

    async fn categories(&self) -> ResultEngine<Vec<Category>> {
        let mut categories: Vec<Category> = self.read().categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name_norm.cmp(&b.name_norm));
        Ok(categories)
    }

    async fn update_category(&self, category: &Category) -> ResultEngine<()> {
        let mut state = self.write();
        if state
            .categories
            .values()
            .any(|c| c.id != category.id && c.name_norm == category.name_norm)
        {
            return Err(EngineError::Conflict(format!(
                "category \"{}\" already present",
                category.name
            )));
        }
        let stored = state
            .categories
            .get_mut(&category.id)
            .ok_or_else(|| EngineError::NotFound("category".to_string()))?;
        *stored = category.clone();
        Ok(())
    }

    async fn delete_category(&self, id: Uuid) -> ResultEngine<()> {
        self.write()
            .categories
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound("category".to_string()))
    }

    async fn category_in_use(&self, id: Uuid) -> ResultEngine<bool> {
        Ok(self
            .read()
            .transactions
            .values()
            .any(|t| t.category_id == id))
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn transaction(&self, id: Uuid) -> ResultEngine<Option<Transaction>> {
        Ok(self.read().transactions.get(&id).cloned())
    }

    async fn insert_transaction(
        &self,
        tx: &Transaction,
        change: BalanceChange,
    ) -> ResultEngine<()> {
        let mut state = self.write();
        state.check_balance(&change)?;
        if state.transactions.contains_key(&tx.id) {
            return Err(EngineError::Conflict(format!(
                "transaction {} already present",
                tx.id
            )));
        }
        state.apply_balance(&change);
        state.transactions.insert(tx.id, tx.clone());
        Ok(())
    }

    async fn replace_transaction(
        &self,
        tx: &Transaction,
        change: BalanceChange,
    ) -> ResultEngine<()> {
        let mut state = self.write();
        state.check_balance(&change)?;
        if !state.transactions.contains_key(&tx.id) {
            return Err(EngineError::NotFound("transaction".to_string()));
        }
        state.apply_balance(&change);
        state.transactions.insert(tx.id, tx.clone());
        Ok(())
    }

    async fn delete_transaction(&self, id: Uuid, change: BalanceChange) -> ResultEngine<()> {
        let mut state = self.write();
        state.check_balance(&change)?;
        if state.transactions.remove(&id).is_none() {
            return Err(EngineError::NotFound("transaction".to_string()));
        }
        state.apply_balance(&change);
        Ok(())
    }

    async fn transactions_page(
        &self,
        accounts: &[Uuid],
        filter: &TransactionFilter,
        after: Option<&TransactionCursor>,
        limit: u64,
    ) -> ResultEngine<Vec<Transaction>> {
        let state = self.read();
        let mut matches: Vec<&Transaction> = state
            .transactions
            .values()
            .filter(|tx| filter.matches(accounts, tx))
            .filter(|tx| after.is_none_or(|cursor| cursor.precedes(tx)))
            .collect();
        matches.sort_by_key(|tx| Reverse((tx.occurred_at, tx.id)));
        Ok(matches
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn sum_amounts(
        &self,
        accounts: &[Uuid],
        filter: &TransactionFilter,
    ) -> ResultEngine<MoneyCents> {
        Ok(self
            .read()
            .transactions
            .values()
            .filter(|tx| filter.matches(accounts, tx))
            .map(|tx| tx.amount)
            .sum())
    }
}

#[async_trait]
impl BudgetStore for MemoryStore {
    async fn insert_budget(&self, budget: &Budget) -> ResultEngine<()> {
        self.write().budgets.insert(budget.id, budget.clone());
        Ok(())
    }

    async fn budget(&self, id: Uuid) -> ResultEngine<Option<Budget>> {
        Ok(self.read().budgets.get(&id).cloned())
    }

    async fn budgets_for_accounts(&self, accounts: &[Uuid]) -> ResultEngine<Vec<Budget>> {
        let state = self.read();
        let budgets = state
            .budgets
            .values()
            .filter(|b| accounts.contains(&b.account_id))
            .collect();
        Ok(sorted_by_end_date_desc(budgets, |b: &Budget| b.end_date))
    }

    async fn update_budget(&self, budget: &Budget) -> ResultEngine<()> {
        let mut state = self.write();
        let stored = state
            .budgets
            .get_mut(&budget.id)
            .ok_or_else(|| EngineError::NotFound("budget".to_string()))?;
        *stored = budget.clone();
        Ok(())
    }

    async fn delete_budget(&self, id: Uuid) -> ResultEngine<()> {
        self.write()
            .budgets
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound("budget".to_string()))
    }
}

#[async_trait]
impl DebtStore for MemoryStore {
    async fn insert_debt(&self, debt: &Debt) -> ResultEngine<()> {
        self.write().debts.insert(debt.id, debt.clone());
        Ok(())
    }

    async fn debt(&self, id: Uuid) -> ResultEngine<Option<Debt>> {
        Ok(self.read().debts.get(&id).cloned())
    }

    async fn debts_for_accounts(&self, accounts: &[Uuid]) -> ResultEngine<Vec<Debt>> {
        let state = self.read();
        let debts = state
            .debts
            .values()
            .filter(|d| accounts.contains(&d.account_id))
            .collect();
        Ok(sorted_by_end_date_desc(debts, |d: &Debt| d.end_date))
    }

    async fn update_debt(&self, debt: &Debt) -> ResultEngine<()> {
        let mut state = self.write();
        let stored = state
            .debts
            .get_mut(&debt.id)
            .ok_or_else(|| EngineError::NotFound("debt".to_string()))?;
        *stored = debt.clone();
        Ok(())
    }

    async fn delete_debt(&self, id: Uuid) -> ResultEngine<()> {
        self.write()
            .debts
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound("debt".to_string()))
    }
}
