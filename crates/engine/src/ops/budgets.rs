use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    Budget, BudgetPatch, BudgetProgress, EngineError, MoneyCents, NewBudgetCmd, ResultEngine,
    TransactionKind,
    store::TransactionFilter,
    util::{end_of_day_exclusive, ensure_date_order, normalize_text, start_of_day},
};

use super::Engine;

fn ensure_budget_amount(amount: MoneyCents) -> ResultEngine<()> {
    if !amount.is_positive() {
        return Err(EngineError::InvalidInput(
            "budget amount must be > 0".to_string(),
        ));
    }
    Ok(())
}

impl Engine {
    pub async fn create_budget(&self, cmd: NewBudgetCmd) -> ResultEngine<Budget> {
        ensure_budget_amount(cmd.amount)?;
        ensure_date_order(cmd.start_date, cmd.end_date)?;
        let account = self.writable_account(&cmd.user_id, cmd.account_id).await?;

        let budget = Budget {
            id: Uuid::new_v4(),
            account_id: account.id,
            amount: cmd.amount,
            description: normalize_text(&cmd.description),
            start_date: cmd.start_date,
            end_date: cmd.end_date,
        };
        self.store.insert_budget(&budget).await?;
        tracing::info!(budget_id = %budget.id, account_id = %account.id, "budget created");
        Ok(budget)
    }

    pub async fn budget(&self, user_id: &str, budget_id: Uuid) -> ResultEngine<Budget> {
        self.owned_budget(user_id, budget_id).await
    }

    /// Budgets of one account, latest end date first.
    pub async fn budgets_for_account(
        &self,
        user_id: &str,
        account_id: Uuid,
    ) -> ResultEngine<Vec<Budget>> {
        let account = self.owned_account(user_id, account_id).await?;
        self.store.budgets_for_accounts(&[account.id]).await
    }

    /// Budgets of the user's active accounts whose date range contains today.
    pub async fn active_budgets(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> ResultEngine<Vec<Budget>> {
        let accounts = self.account_ids(user_id, false).await?;
        let today = now.date_naive();
        let mut budgets = self.store.budgets_for_accounts(&accounts).await?;
        budgets.retain(|budget| budget.is_active_on(today));
        Ok(budgets)
    }

    pub async fn update_budget(
        &self,
        user_id: &str,
        budget_id: Uuid,
        patch: BudgetPatch,
    ) -> ResultEngine<Budget> {
        let mut budget = self.owned_budget(user_id, budget_id).await?;
        if let Some(amount) = patch.amount {
            ensure_budget_amount(amount)?;
            budget.amount = amount;
        }
        if let Some(description) = &patch.description {
            budget.description = normalize_text(description);
        }
        if let Some(start_date) = patch.start_date {
            budget.start_date = start_date;
        }
        if let Some(end_date) = patch.end_date {
            budget.end_date = end_date;
        }
        ensure_date_order(budget.start_date, budget.end_date)?;

        self.store.update_budget(&budget).await?;
        tracing::info!(budget_id = %budget.id, "budget updated");
        Ok(budget)
    }

    pub async fn delete_budget(&self, user_id: &str, budget_id: Uuid) -> ResultEngine<()> {
        let budget = self.owned_budget(user_id, budget_id).await?;
        self.store.delete_budget(budget.id).await?;
        tracing::info!(budget_id = %budget.id, "budget deleted");
        Ok(())
    }

    /// Progress of a budget at `now`, from the expenses recorded on its
    /// account between the start date and the end of `min(today, end_date)`.
    pub async fn budget_progress(
        &self,
        user_id: &str,
        budget_id: Uuid,
        now: DateTime<Utc>,
    ) -> ResultEngine<BudgetProgress> {
        let budget = self.owned_budget(user_id, budget_id).await?;
        let (from, to) = budget.spend_window(now);
        let spent = self.budget_spend(&budget, from, to).await?;
        let progress = budget.progress(spent, now);
        tracing::debug!(
            budget_id = %budget.id,
            spent = %progress.spent,
            status = ?progress.status,
            "budget progress computed"
        );
        Ok(progress)
    }

    /// Expenses of the budget's account over its whole date range.
    pub(super) async fn budget_total_spend(&self, budget: &Budget) -> ResultEngine<MoneyCents> {
        self.budget_spend(
            budget,
            start_of_day(budget.start_date),
            end_of_day_exclusive(budget.end_date),
        )
        .await
    }

    async fn budget_spend(
        &self,
        budget: &Budget,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ResultEngine<MoneyCents> {
        let filter = TransactionFilter::for_account(budget.account_id)
            .kind(TransactionKind::Expense)
            .between(from, to);
        self.store
            .sum_amounts(&[budget.account_id], &filter)
            .await
    }

    async fn owned_budget(&self, user_id: &str, budget_id: Uuid) -> ResultEngine<Budget> {
        let budget = self
            .store
            .budget(budget_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("budget".to_string()))?;
        match self.owned_account(user_id, budget.account_id).await {
            Ok(_) => Ok(budget),
            Err(EngineError::NotFound(_)) => Err(EngineError::NotFound("budget".to_string())),
            Err(err) => Err(err),
        }
    }
}
