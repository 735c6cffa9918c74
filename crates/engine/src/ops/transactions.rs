use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    ApplyTransactionCmd, EngineError, MoneyCents, ResultEngine, ReviseTransactionCmd, Transaction,
    TransactionKind,
    store::{BalanceChange, TransactionCursor, TransactionFilter},
    transactions::ensure_positive_amount,
    util::normalize_text,
};

use super::{Engine, log_rejection};

/// One page of [`Engine::list_transactions_page`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPage {
    pub items: Vec<Transaction>,
    /// Opaque cursor for the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategorySpend {
    pub category_id: Uuid,
    pub category_name: String,
    pub total: MoneyCents,
    /// Share of the total expense, 0–100.
    pub percentage: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub income: MoneyCents,
    pub expense: MoneyCents,
    pub net: MoneyCents,
    pub transaction_count: usize,
    /// Expenses grouped by category, largest first.
    pub expense_by_category: Vec<CategorySpend>,
}

/// Lazy, restartable sequence of transactions matching a filter.
///
/// Rows are pulled from the store one page at a time, newest first
/// (`occurred_at DESC, id DESC`). The set of visible accounts is fixed when
/// the query is created.
#[derive(Debug)]
pub struct TransactionQuery<'a> {
    engine: &'a Engine,
    accounts: Vec<Uuid>,
    filter: TransactionFilter,
    buffer: VecDeque<Transaction>,
    cursor: Option<TransactionCursor>,
    exhausted: bool,
}

impl TransactionQuery<'_> {
    /// Next matching transaction, fetching another page when needed.
    pub async fn next(&mut self) -> ResultEngine<Option<Transaction>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill().await?;
        }
        Ok(self.buffer.pop_front())
    }

    /// Rewind to the newest match. The next call to [`next`](Self::next)
    /// reads the store again.
    pub fn restart(&mut self) {
        self.buffer.clear();
        self.cursor = None;
        self.exhausted = false;
    }

    /// Drains the remaining matches.
    pub async fn collect_all(mut self) -> ResultEngine<Vec<Transaction>> {
        let mut out = Vec::new();
        while let Some(tx) = self.next().await? {
            out.push(tx);
        }
        Ok(out)
    }

    async fn fill(&mut self) -> ResultEngine<()> {
        let page_size = self.engine.page_size;
        let page = self
            .engine
            .store
            .transactions_page(&self.accounts, &self.filter, self.cursor.as_ref(), page_size)
            .await?;
        if (page.len() as u64) < page_size {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.cursor = Some(TransactionCursor::after(last));
        }
        self.buffer.extend(page);
        Ok(())
    }
}

fn validate_filter(filter: &TransactionFilter) -> ResultEngine<()> {
    if filter.is_empty_range() {
        return Err(EngineError::InvalidInput(
            "invalid range: from must be < to".to_string(),
        ));
    }
    Ok(())
}

impl Engine {
    /// Records an income or expense and moves the account balance by its
    /// signed impact.
    ///
    /// Fails with `InsufficientFunds` when the balance would drop below
    /// zero; nothing is persisted in that case.
    pub async fn apply_transaction(&self, cmd: ApplyTransactionCmd) -> ResultEngine<Transaction> {
        let tx = Transaction::new(
            cmd.account_id,
            cmd.category_id,
            cmd.kind,
            cmd.amount,
            cmd.occurred_at,
            normalize_text(&cmd.description),
        )?;
        self.require_category(cmd.category_id).await?;

        let _guard = self.lock_account(cmd.account_id).await;
        let account = self.writable_account(&cmd.user_id, cmd.account_id).await?;
        let result = async {
            let balance = account.balance_after(tx.signed_impact())?;
            self.store
                .insert_transaction(
                    &tx,
                    BalanceChange {
                        account_id: account.id,
                        expected: account.balance,
                        new: balance,
                    },
                )
                .await?;
            Ok::<_, EngineError>(balance)
        }
        .await;

        match result {
            Ok(balance) => {
                tracing::info!(
                    account_id = %account.id,
                    transaction_id = %tx.id,
                    kind = tx.kind.as_str(),
                    amount = %tx.amount,
                    balance = %balance,
                    "transaction applied"
                );
                Ok(tx)
            }
            Err(err) => {
                log_rejection("apply_transaction", &err);
                Err(err)
            }
        }
    }

    /// Changes amount, kind, category, date or description of a transaction.
    ///
    /// The balance moves by the difference between the new and the old signed
    /// impact; `InsufficientFunds` leaves both untouched.
    pub async fn revise_transaction(&self, cmd: ReviseTransactionCmd) -> ResultEngine<Transaction> {
        if let Some(amount) = cmd.amount {
            ensure_positive_amount(amount)?;
        }
        if let Some(category_id) = cmd.category_id {
            self.require_category(category_id).await?;
        }

        let current = self.owned_transaction(&cmd.user_id, cmd.transaction_id).await?;
        let _guard = self.lock_account(current.account_id).await;
        // Re-read under the lock: the row may have changed or vanished.
        let current = self.owned_transaction(&cmd.user_id, cmd.transaction_id).await?;
        let account = self.writable_account(&cmd.user_id, current.account_id).await?;

        let mut revised = current.clone();
        if let Some(amount) = cmd.amount {
            revised.amount = amount;
        }
        if let Some(kind) = cmd.kind {
            revised.kind = kind;
        }
        if let Some(category_id) = cmd.category_id {
            revised.category_id = category_id;
        }
        if let Some(occurred_at) = cmd.occurred_at {
            revised.occurred_at = occurred_at;
        }
        if let Some(description) = &cmd.description {
            revised.description = normalize_text(description);
        }

        let result = async {
            let delta = revised.signed_impact() - current.signed_impact();
            let balance = account.balance_after(delta)?;
            self.store
                .replace_transaction(
                    &revised,
                    BalanceChange {
                        account_id: account.id,
                        expected: account.balance,
                        new: balance,
                    },
                )
                .await?;
            Ok::<_, EngineError>(balance)
        }
        .await;

        match result {
            Ok(balance) => {
                tracing::info!(
                    account_id = %account.id,
                    transaction_id = %revised.id,
                    balance = %balance,
                    "transaction revised"
                );
                Ok(revised)
            }
            Err(err) => {
                log_rejection("revise_transaction", &err);
                Err(err)
            }
        }
    }

    /// Removes a transaction and reverts its effect on the balance.
    ///
    /// Retracting an income whose money was already spent would leave the
    /// account negative and fails with `InsufficientFunds`. Returns the
    /// removed transaction.
    pub async fn retract_transaction(
        &self,
        user_id: &str,
        transaction_id: Uuid,
    ) -> ResultEngine<Transaction> {
        let current = self.owned_transaction(user_id, transaction_id).await?;
        let _guard = self.lock_account(current.account_id).await;
        let current = self.owned_transaction(user_id, transaction_id).await?;
        let account = self.writable_account(user_id, current.account_id).await?;

        let result = async {
            let balance = account.balance_after(-current.signed_impact())?;
            self.store
                .delete_transaction(
                    current.id,
                    BalanceChange {
                        account_id: account.id,
                        expected: account.balance,
                        new: balance,
                    },
                )
                .await?;
            Ok::<_, EngineError>(balance)
        }
        .await;

        match result {
            Ok(balance) => {
                tracing::info!(
                    account_id = %account.id,
                    transaction_id = %current.id,
                    balance = %balance,
                    "transaction retracted"
                );
                Ok(current)
            }
            Err(err) => {
                log_rejection("retract_transaction", &err);
                Err(err)
            }
        }
    }

    pub async fn transaction(
        &self,
        user_id: &str,
        transaction_id: Uuid,
    ) -> ResultEngine<Transaction> {
        self.owned_transaction(user_id, transaction_id).await
    }

    /// Starts a lazy query over the transactions of `user_id`.
    ///
    /// With `filter.account_id` set the account must belong to the user.
    pub async fn query_transactions(
        &self,
        user_id: &str,
        filter: TransactionFilter,
    ) -> ResultEngine<TransactionQuery<'_>> {
        validate_filter(&filter)?;
        let accounts = self.visible_accounts(user_id, &filter).await?;
        Ok(TransactionQuery {
            engine: self,
            accounts,
            filter,
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: false,
        })
    }

    /// Cursor-based pagination over the same order as
    /// [`query_transactions`](Self::query_transactions).
    pub async fn list_transactions_page(
        &self,
        user_id: &str,
        filter: &TransactionFilter,
        limit: u64,
        cursor: Option<&str>,
    ) -> ResultEngine<TransactionPage> {
        validate_filter(filter)?;
        if limit == 0 {
            return Err(EngineError::InvalidInput("limit must be > 0".to_string()));
        }
        let after = cursor.map(TransactionCursor::decode).transpose()?;
        let accounts = self.visible_accounts(user_id, filter).await?;

        let mut items = self
            .store
            .transactions_page(&accounts, filter, after.as_ref(), limit.saturating_add(1))
            .await?;
        let has_more = items.len() as u64 > limit;
        items.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

        let next_cursor = match items.last() {
            Some(last) if has_more => Some(TransactionCursor::after(last).encode()?),
            _ => None,
        };
        Ok(TransactionPage { items, next_cursor })
    }

    /// Income, expense and per-category expense breakdown of the matching
    /// transactions.
    pub async fn transaction_summary(
        &self,
        user_id: &str,
        filter: TransactionFilter,
    ) -> ResultEngine<TransactionSummary> {
        let mut query = self.query_transactions(user_id, filter).await?;

        let mut income = MoneyCents::ZERO;
        let mut expense = MoneyCents::ZERO;
        let mut transaction_count = 0;
        let mut by_category: HashMap<Uuid, MoneyCents> = HashMap::new();
        while let Some(tx) = query.next().await? {
            transaction_count += 1;
            match tx.kind {
                TransactionKind::Income => income += tx.amount,
                TransactionKind::Expense => {
                    expense += tx.amount;
                    *by_category.entry(tx.category_id).or_default() += tx.amount;
                }
            }
        }

        let mut expense_by_category = Vec::with_capacity(by_category.len());
        for (category_id, total) in by_category {
            let category_name = match self.store.category(category_id).await? {
                Some(category) => category.name,
                None => category_id.to_string(),
            };
            let percentage = if expense.is_positive() {
                total.to_f64() / expense.to_f64() * 100.0
            } else {
                0.0
            };
            expense_by_category.push(CategorySpend {
                category_id,
                category_name,
                total,
                percentage,
            });
        }
        expense_by_category.sort_by(|a, b| {
            b.total
                .cmp(&a.total)
                .then_with(|| a.category_name.cmp(&b.category_name))
        });

        tracing::debug!(user_id, transaction_count, "transaction summary computed");
        Ok(TransactionSummary {
            income,
            expense,
            net: income - expense,
            transaction_count,
            expense_by_category,
        })
    }

    async fn owned_transaction(
        &self,
        user_id: &str,
        transaction_id: Uuid,
    ) -> ResultEngine<Transaction> {
        let tx = self
            .store
            .transaction(transaction_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("transaction".to_string()))?;
        match self.owned_account(user_id, tx.account_id).await {
            Ok(_) => Ok(tx),
            Err(EngineError::NotFound(_)) => Err(EngineError::NotFound("transaction".to_string())),
            Err(err) => Err(err),
        }
    }

    /// Accounts a transaction listing may read: the filtered account, or
    /// every account of the user (inactive included).
    async fn visible_accounts(
        &self,
        user_id: &str,
        filter: &TransactionFilter,
    ) -> ResultEngine<Vec<Uuid>> {
        match filter.account_id {
            Some(account_id) => Ok(vec![self.owned_account(user_id, account_id).await?.id]),
            None => self.account_ids(user_id, true).await,
        }
    }
}
