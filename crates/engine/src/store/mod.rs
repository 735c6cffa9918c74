//! Storage port of the engine.
//!
//! Each entity has its own async trait exposing exactly the reads and writes
//! the engine needs. [`LedgerStore`] is the union the engine is built on; it
//! is implemented for every type implementing all entity traits.
//!
//! Balance-affecting writes take a [`BalanceChange`]: the store must apply the
//! row change and the balance update in one atomic unit, and only if the
//! stored balance still equals `expected` (otherwise `Conflict`).

use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Account, Budget, Category, Debt, EngineError, MoneyCents, ResultEngine, Transaction,
    TransactionKind,
    util::{end_of_day_exclusive, start_of_day},
};

mod database;
mod memory;

pub use database::DatabaseStore;
pub use memory::MemoryStore;

/// Compare-and-set of an account balance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BalanceChange {
    pub account_id: Uuid,
    pub expected: MoneyCents,
    pub new: MoneyCents,
}

/// Filters for listing transactions.
///
/// `from` is inclusive and `to` is exclusive (`[from, to)`), both in UTC.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    /// Restrict to one account; otherwise every account of the caller.
    pub account_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub kind: Option<TransactionKind>,
    pub category_id: Option<Uuid>,
}

impl TransactionFilter {
    #[must_use]
    pub fn for_account(account_id: Uuid) -> Self {
        Self {
            account_id: Some(account_id),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    #[must_use]
    pub fn since(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: TransactionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn category(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    /// Restrict to one calendar month (`month` is 1-based).
    pub fn month(self, year: i32, month: u32) -> ResultEngine<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| EngineError::InvalidInput(format!("invalid month {year}-{month}")))?;
        let last = first
            .checked_add_months(chrono::Months::new(1))
            .and_then(|next| next.pred_opt())
            .ok_or_else(|| EngineError::InvalidInput(format!("invalid month {year}-{month}")))?;
        debug_assert_eq!(last.month(), month);
        Ok(self.between(start_of_day(first), end_of_day_exclusive(last)))
    }

    /// `true` when the date range cannot match anything.
    pub fn is_empty_range(&self) -> bool {
        matches!((self.from, self.to), (Some(from), Some(to)) if from >= to)
    }

    /// In-process evaluation, equivalent to the SQL the database store builds.
    pub fn matches(&self, accounts: &[Uuid], tx: &Transaction) -> bool {
        accounts.contains(&tx.account_id)
            && self.account_id.is_none_or(|id| id == tx.account_id)
            && self.from.is_none_or(|from| tx.occurred_at >= from)
            && self.to.is_none_or(|to| tx.occurred_at < to)
            && self.kind.is_none_or(|kind| kind == tx.kind)
            && self.category_id.is_none_or(|id| id == tx.category_id)
    }
}

/// Position in the `(occurred_at DESC, id DESC)` order of transactions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCursor {
    pub occurred_at: DateTime<Utc>,
    pub id: Uuid,
}

impl TransactionCursor {
    pub fn after(tx: &Transaction) -> Self {
        Self {
            occurred_at: tx.occurred_at,
            id: tx.id,
        }
    }

    /// `true` if `tx` comes strictly after this cursor in listing order.
    pub fn precedes(&self, tx: &Transaction) -> bool {
        (tx.occurred_at, tx.id) < (self.occurred_at, self.id)
    }

    pub fn encode(&self) -> ResultEngine<String> {
        let bytes = serde_json::to_vec(self)
            .map_err(|_| EngineError::InvalidCursor("invalid transactions cursor".to_string()))?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn decode(input: &str) -> ResultEngine<Self> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(input.as_bytes())
            .map_err(|_| EngineError::InvalidCursor("invalid transactions cursor".to_string()))?;
        serde_json::from_slice::<Self>(&bytes)
            .map_err(|_| EngineError::InvalidCursor("invalid transactions cursor".to_string()))
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert_account(&self, account: &Account) -> ResultEngine<()>;
    async fn account(&self, id: Uuid) -> ResultEngine<Option<Account>>;
    async fn accounts_for_user(
        &self,
        user_id: &str,
        include_inactive: bool,
    ) -> ResultEngine<Vec<Account>>;
    /// Persists name and active flag. The balance is never written here.
    async fn update_account(&self, account: &Account) -> ResultEngine<()>;
    async fn delete_account(&self, id: Uuid) -> ResultEngine<()>;
    /// Whether any transaction, budget or debt references the account.
    async fn account_has_dependents(&self, id: Uuid) -> ResultEngine<bool>;
    async fn swap_balance(&self, change: BalanceChange) -> ResultEngine<()>;
}

#[async_trait]
pub trait CategoryStore: Send + Sync {
    /// `Conflict` if a category with the same normalized name exists.
    async fn insert_category(&self, category: &Category) -> ResultEngine<()>;
    async fn category(&self, id: Uuid) -> ResultEngine<Option<Category>>;
    async fn category_by_key(&self, name_norm: &str) -> ResultEngine<Option<Category>>;
    async fn categories(&self) -> ResultEngine<Vec<Category>>;
    async fn update_category(&self, category: &Category) -> ResultEngine<()>;
    async fn delete_category(&self, id: Uuid) -> ResultEngine<()>;
    async fn category_in_use(&self, id: Uuid) -> ResultEngine<bool>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn transaction(&self, id: Uuid) -> ResultEngine<Option<Transaction>>;
    async fn insert_transaction(&self, tx: &Transaction, change: BalanceChange)
    -> ResultEngine<()>;
    async fn replace_transaction(
        &self,
        tx: &Transaction,
        change: BalanceChange,
    ) -> ResultEngine<()>;
    /// `NotFound` if the transaction is already gone.
    async fn delete_transaction(&self, id: Uuid, change: BalanceChange) -> ResultEngine<()>;
    /// Up to `limit` matches in `(occurred_at DESC, id DESC)` order, starting
    /// after `after` when given.
    async fn transactions_page(
        &self,
        accounts: &[Uuid],
        filter: &TransactionFilter,
        after: Option<&TransactionCursor>,
        limit: u64,
    ) -> ResultEngine<Vec<Transaction>>;
    async fn sum_amounts(
        &self,
        accounts: &[Uuid],
        filter: &TransactionFilter,
    ) -> ResultEngine<MoneyCents>;
}

#[async_trait]
pub trait BudgetStore: Send + Sync {
    async fn insert_budget(&self, budget: &Budget) -> ResultEngine<()>;
    async fn budget(&self, id: Uuid) -> ResultEngine<Option<Budget>>;
    /// Ordered by end date, latest first.
    async fn budgets_for_accounts(&self, accounts: &[Uuid]) -> ResultEngine<Vec<Budget>>;
    async fn update_budget(&self, budget: &Budget) -> ResultEngine<()>;
    async fn delete_budget(&self, id: Uuid) -> ResultEngine<()>;
}

#[async_trait]
pub trait DebtStore: Send + Sync {
    async fn insert_debt(&self, debt: &Debt) -> ResultEngine<()>;
    async fn debt(&self, id: Uuid) -> ResultEngine<Option<Debt>>;
    /// Ordered by end date, latest first.
    async fn debts_for_accounts(&self, accounts: &[Uuid]) -> ResultEngine<Vec<Debt>>;
    async fn update_debt(&self, debt: &Debt) -> ResultEngine<()>;
    async fn delete_debt(&self, id: Uuid) -> ResultEngine<()>;
}

/// Everything the engine needs from storage.
pub trait LedgerStore:
    AccountStore + CategoryStore + TransactionStore + BudgetStore + DebtStore + std::fmt::Debug
{
}

impl<T> LedgerStore for T where
    T: AccountStore + CategoryStore + TransactionStore + BudgetStore + DebtStore + std::fmt::Debug
{
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn tx_at(account_id: Uuid, secs: i64) -> Transaction {
        Transaction::new(
            account_id,
            Uuid::new_v4(),
            TransactionKind::Expense,
            MoneyCents::new(100),
            Utc.timestamp_opt(secs, 0).unwrap(),
            String::new(),
        )
        .unwrap()
    }

    #[test]
    fn cursor_round_trips_and_rejects_garbage() {
        let cursor = TransactionCursor {
            occurred_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            id: Uuid::new_v4(),
        };
        let encoded = cursor.encode().unwrap();
        assert_eq!(TransactionCursor::decode(&encoded).unwrap(), cursor);
        assert!(matches!(
            TransactionCursor::decode("not a cursor"),
            Err(EngineError::InvalidCursor(_))
        ));
    }

    #[test]
    fn filter_range_is_half_open() {
        let account = Uuid::new_v4();
        let filter = TransactionFilter::for_account(account).between(
            Utc.timestamp_opt(100, 0).unwrap(),
            Utc.timestamp_opt(200, 0).unwrap(),
        );
        assert!(filter.matches(&[account], &tx_at(account, 100)));
        assert!(!filter.matches(&[account], &tx_at(account, 200)));
        assert!(!filter.matches(&[], &tx_at(account, 150)));
    }

    #[test]
    fn month_filter_covers_the_whole_month() {
        let filter = TransactionFilter::default().month(2024, 2).unwrap();
        assert_eq!(
            filter.from,
            Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            filter.to,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
        assert!(TransactionFilter::default().month(2024, 13).is_err());
    }

    #[test]
    fn cursor_orders_newest_first() {
        let account = Uuid::new_v4();
        let newer = tx_at(account, 200);
        let older = tx_at(account, 100);
        let cursor = TransactionCursor::after(&newer);
        assert!(cursor.precedes(&older));
        assert!(!cursor.precedes(&newer));
    }
}
