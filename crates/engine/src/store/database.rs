//! SQL store on top of sea-orm.
//!
//! Balance-affecting writes run inside one DB transaction: the conditional
//! `UPDATE accounts SET balance = new WHERE id = ? AND balance = expected`
//! goes first and the row change only follows when it matched.

use async_trait::async_trait;
use sea_orm::{
    Condition, ConnectionTrait, DatabaseConnection, DbErr, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait, prelude::*, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    Account, Budget, Category, Debt, EngineError, MoneyCents, ResultEngine, Transaction, accounts,
    budgets, categories, debts, transactions,
};

use super::{
    AccountStore, BalanceChange, BudgetStore, CategoryStore, DebtStore, TransactionCursor,
    TransactionFilter, TransactionStore,
};

/// Run a block inside a DB transaction, committing on success. Dropping the
/// transaction on error rolls it back.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.db.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

#[derive(Debug, Clone)]
pub struct DatabaseStore {
    db: DatabaseConnection,
}

impl DatabaseStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn not_updated(entity: &'static str) -> impl FnOnce(DbErr) -> EngineError {
    move |err| match err {
        DbErr::RecordNotUpdated => EngineError::NotFound(entity.to_string()),
        other => EngineError::Database(other),
    }
}

async fn swap_balance_in<C: ConnectionTrait>(
    conn: &C,
    change: &BalanceChange,
) -> ResultEngine<()> {
    let result = accounts::Entity::update_many()
        .col_expr(accounts::Column::Balance, Expr::value(change.new.cents()))
        .filter(accounts::Column::Id.eq(change.account_id))
        .filter(accounts::Column::Balance.eq(change.expected.cents()))
        .exec(conn)
        .await?;
    if result.rows_affected == 1 {
        return Ok(());
    }
    match accounts::Entity::find_by_id(change.account_id).one(conn).await? {
        Some(_) => Err(EngineError::Conflict(format!(
            "balance of account {} changed concurrently",
            change.account_id
        ))),
        None => Err(EngineError::NotFound("account".to_string())),
    }
}

trait ApplyTransactionFilter: QueryFilter + Sized {
    fn apply_filter(self, accounts: &[Uuid], filter: &TransactionFilter) -> Self;
}

impl<T> ApplyTransactionFilter for T
where
    T: QueryFilter + Sized,
{
    fn apply_filter(mut self, accounts: &[Uuid], filter: &TransactionFilter) -> Self {
        self = self.filter(transactions::Column::AccountId.is_in(accounts.iter().copied()));
        if let Some(account_id) = filter.account_id {
            self = self.filter(transactions::Column::AccountId.eq(account_id));
        }
        if let Some(from) = filter.from {
            self = self.filter(transactions::Column::OccurredAt.gte(from));
        }
        if let Some(to) = filter.to {
            self = self.filter(transactions::Column::OccurredAt.lt(to));
        }
        if let Some(kind) = filter.kind {
            self = self.filter(transactions::Column::Kind.eq(kind.as_str()));
        }
        if let Some(category_id) = filter.category_id {
            self = self.filter(transactions::Column::CategoryId.eq(category_id));
        }
        self
    }
}

#[async_trait]
impl AccountStore for DatabaseStore {
    async fn insert_account(&self, account: &Account) -> ResultEngine<()> {
        accounts::ActiveModel::from(account).insert(&self.db).await?;
        Ok(())
    }

    async fn account(&self, id: Uuid) -> ResultEngine<Option<Account>> {
        Ok(accounts::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Account::from))
    }

    async fn accounts_for_user(
        &self,
        user_id: &str,
        include_inactive: bool,
    ) -> ResultEngine<Vec<Account>> {
        let mut query = accounts::Entity::find().filter(accounts::Column::UserId.eq(user_id));
        if !include_inactive {
            query = query.filter(accounts::Column::Active.eq(true));
        }
        let models = query
            .order_by_asc(accounts::Column::Name)
            .order_by_asc(accounts::Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Account::from).collect())
    }

    async fn update_account(&self, account: &Account) -> ResultEngine<()> {
        let result = accounts::Entity::update_many()
            .col_expr(accounts::Column::Name, Expr::value(account.name.clone()))
            .col_expr(accounts::Column::Active, Expr::value(account.active))
            .filter(accounts::Column::Id.eq(account.id))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(EngineError::NotFound("account".to_string()));
        }
        Ok(())
    }

    async fn delete_account(&self, id: Uuid) -> ResultEngine<()> {
        let result = accounts::Entity::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(EngineError::NotFound("account".to_string()));
        }
        Ok(())
    }

    async fn account_has_dependents(&self, id: Uuid) -> ResultEngine<bool> {
        let transactions = transactions::Entity::find()
            .filter(transactions::Column::AccountId.eq(id))
            .count(&self.db)
            .await?;
        let budgets = budgets::Entity::find()
            .filter(budgets::Column::AccountId.eq(id))
            .count(&self.db)
            .await?;
        let debts = debts::Entity::find()
            .filter(debts::Column::AccountId.eq(id))
            .count(&self.db)
            .await?;
        Ok(transactions + budgets + debts > 0)
    }

    async fn swap_balance(&self, change: BalanceChange) -> ResultEngine<()> {
        with_tx!(self, |db_tx| swap_balance_in(&db_tx, &change).await)
    }
}

#[async_trait]
impl CategoryStore for DatabaseStore {
    async fn insert_category(&self, category: &Category) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            let existing = categories::Entity::find()
                .filter(categories::Column::NameNorm.eq(category.name_norm.as_str()))
                .one(&db_tx)
                .await?;
            if existing.is_some() {
                return Err(EngineError::Conflict(format!(
                    "category \"{}\" already present",
                    category.name
                )));
            }
            categories::ActiveModel::from(category).insert(&db_tx).await?;
            Ok(())
        })
    }

    async fn category(&self, id: Uuid) -> ResultEngine<Option<Category>> {
        Ok(categories::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Category::from))
    }

    async fn category_by_key(&self, name_norm: &str) -> ResultEngine<Option<Category>> {
        Ok(categories::Entity::find()
            .filter(categories::Column::NameNorm.eq(name_norm))
            .one(&self.db)
            .await?
            .map(Category::from))
    }

    async fn categories(&self) -> ResultEngine<Vec<Category>> {
        let models = categories::Entity::find()
            .order_by_asc(categories::Column::NameNorm)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Category::from).collect())
    }

    async fn update_category(&self, category: &Category) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            let clash = categories::Entity::find()
                .filter(categories::Column::NameNorm.eq(category.name_norm.as_str()))
                .filter(categories::Column::Id.ne(category.id))
                .one(&db_tx)
                .await?;
            if clash.is_some() {
                return Err(EngineError::Conflict(format!(
                    "category \"{}\" already present",
                    category.name
                )));
            }
            categories::ActiveModel::from(category)
                .update(&db_tx)
                .await
                .map_err(not_updated("category"))?;
            Ok(())
        })
    }

    async fn delete_category(&self, id: Uuid) -> ResultEngine<()> {
        let result = categories::Entity::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(EngineError::NotFound("category".to_string()));
        }
        Ok(())
    }

    async fn category_in_use(&self, id: Uuid) -> ResultEngine<bool> {
        let count = transactions::Entity::find()
            .filter(transactions::Column::CategoryId.eq(id))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }
}

#[async_trait]
impl TransactionStore for DatabaseStore {
    async fn transaction(&self, id: Uuid) -> ResultEngine<Option<Transaction>> {
        transactions::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Transaction::try_from)
            .transpose()
    }

    async fn insert_transaction(
        &self,
        tx: &Transaction,
        change: BalanceChange,
    ) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            swap_balance_in(&db_tx, &change).await?;
            transactions::ActiveModel::from(tx).insert(&db_tx).await?;
            Ok(())
        })
    }

    async fn replace_transaction(
        &self,
        tx: &Transaction,
        change: BalanceChange,
    ) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            swap_balance_in(&db_tx, &change).await?;
            transactions::ActiveModel::from(tx)
                .update(&db_tx)
                .await
                .map_err(not_updated("transaction"))?;
            Ok(())
        })
    }

    async fn delete_transaction(&self, id: Uuid, change: BalanceChange) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            swap_balance_in(&db_tx, &change).await?;
            let result = transactions::Entity::delete_by_id(id).exec(&db_tx).await?;
            if result.rows_affected == 0 {
                return Err(EngineError::NotFound("transaction".to_string()));
            }
            Ok(())
        })
    }

    async fn transactions_page(
        &self,
        accounts: &[Uuid],
        filter: &TransactionFilter,
        after: Option<&TransactionCursor>,
        limit: u64,
    ) -> ResultEngine<Vec<Transaction>> {
        if accounts.is_empty() || limit == 0 || filter.is_empty_range() {
            return Ok(Vec::new());
        }
        let mut query = transactions::Entity::find()
            .apply_filter(accounts, filter)
            .order_by_desc(transactions::Column::OccurredAt)
            .order_by_desc(transactions::Column::Id)
            .limit(limit);
        if let Some(cursor) = after {
            query = query.filter(
                Condition::any()
                    .add(transactions::Column::OccurredAt.lt(cursor.occurred_at))
                    .add(
                        Condition::all()
                            .add(transactions::Column::OccurredAt.eq(cursor.occurred_at))
                            .add(transactions::Column::Id.lt(cursor.id)),
                    ),
            );
        }
        query
            .all(&self.db)
            .await?
            .into_iter()
            .map(Transaction::try_from)
            .collect()
    }

    async fn sum_amounts(
        &self,
        accounts: &[Uuid],
        filter: &TransactionFilter,
    ) -> ResultEngine<MoneyCents> {
        if accounts.is_empty() || filter.is_empty_range() {
            return Ok(MoneyCents::ZERO);
        }
        let total: Option<Option<i64>> = transactions::Entity::find()
            .apply_filter(accounts, filter)
            .select_only()
            .column_as(Expr::col(transactions::Column::Amount).sum(), "total")
            .into_tuple::<Option<i64>>()
            .one(&self.db)
            .await?;
        Ok(MoneyCents::new(total.flatten().unwrap_or(0)))
    }
}

#[async_trait]
impl BudgetStore for DatabaseStore {
    async fn insert_budget(&self, budget: &Budget) -> ResultEngine<()> {
        budgets::ActiveModel::from(budget).insert(&self.db).await?;
        Ok(())
    }

    async fn budget(&self, id: Uuid) -> ResultEngine<Option<Budget>> {
        Ok(budgets::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Budget::from))
    }

    async fn budgets_for_accounts(&self, accounts: &[Uuid]) -> ResultEngine<Vec<Budget>> {
        if accounts.is_empty() {
            return Ok(Vec::new());
        }
        let models = budgets::Entity::find()
            .filter(budgets::Column::AccountId.is_in(accounts.iter().copied()))
            .order_by_desc(budgets::Column::EndDate)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Budget::from).collect())
    }

    async fn update_budget(&self, budget: &Budget) -> ResultEngine<()> {
        budgets::ActiveModel::from(budget)
            .update(&self.db)
            .await
            .map_err(not_updated("budget"))?;
        Ok(())
    }

    async fn delete_budget(&self, id: Uuid) -> ResultEngine<()> {
        let result = budgets::Entity::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(EngineError::NotFound("budget".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DebtStore for DatabaseStore {
    async fn insert_debt(&self, debt: &Debt) -> ResultEngine<()> {
        debts::ActiveModel::try_from(debt)?.insert(&self.db).await?;
        Ok(())
    }

    async fn debt(&self, id: Uuid) -> ResultEngine<Option<Debt>> {
        debts::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Debt::try_from)
            .transpose()
    }

    async fn debts_for_accounts(&self, accounts: &[Uuid]) -> ResultEngine<Vec<Debt>> {
        if accounts.is_empty() {
            return Ok(Vec::new());
        }
        debts::Entity::find()
            .filter(debts::Column::AccountId.is_in(accounts.iter().copied()))
            .order_by_desc(debts::Column::EndDate)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Debt::try_from)
            .collect()
    }

    async fn update_debt(&self, debt: &Debt) -> ResultEngine<()> {
        debts::ActiveModel::try_from(debt)?
            .update(&self.db)
            .await
            .map_err(not_updated("debt"))?;
        Ok(())
    }

    async fn delete_debt(&self, id: Uuid) -> ResultEngine<()> {
        let result = debts::Entity::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(EngineError::NotFound("debt".to_string()));
        }
        Ok(())
    }
}
