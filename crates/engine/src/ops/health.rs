use chrono::{DateTime, Utc};

use crate::{
    HEALTH_WINDOW_MONTHS, HealthFigures, HealthReport, MoneyCents, ResultEngine, TransactionKind,
    store::TransactionFilter,
    util::{first_day_of_month_back, start_of_day},
};

use super::Engine;

impl Engine {
    /// Financial health of `user_id` at `now`.
    ///
    /// Income and expenses count from the first day of the month two months
    /// before `now` onward. Balances, debts and budgets cover every account
    /// of the user, inactive ones included.
    pub async fn health_score(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> ResultEngine<HealthReport> {
        let accounts = self.store.accounts_for_user(user_id, true).await?;
        let account_ids: Vec<_> = accounts.iter().map(|account| account.id).collect();

        let window_start = first_day_of_month_back(now, HEALTH_WINDOW_MONTHS - 1);
        let window = TransactionFilter::default().since(start_of_day(window_start));
        let income = self
            .store
            .sum_amounts(&account_ids, &window.clone().kind(TransactionKind::Income))
            .await?;
        let expense = self
            .store
            .sum_amounts(&account_ids, &window.kind(TransactionKind::Expense))
            .await?;

        let total_balance = accounts.iter().map(|account| account.balance).sum();

        let monthly_debt_payments = self
            .store
            .debts_for_accounts(&account_ids)
            .await?
            .iter()
            .map(|debt| debt.monthly_payment)
            .sum();

        let budgets = self.store.budgets_for_accounts(&account_ids).await?;
        let total_budgeted = budgets.iter().map(|budget| budget.amount).sum();
        let mut total_budget_spent = MoneyCents::ZERO;
        for budget in &budgets {
            total_budget_spent += self.budget_total_spend(budget).await?;
        }

        let report = HealthReport::compute(HealthFigures {
            window_start,
            income,
            expense,
            total_balance,
            monthly_debt_payments,
            budget_count: budgets.len(),
            total_budgeted,
            total_budget_spent,
        });
        tracing::debug!(
            user_id,
            total_score = report.total_score,
            level = ?report.health_level,
            "health score computed"
        );
        Ok(report)
    }
}
