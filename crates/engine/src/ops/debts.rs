use uuid::Uuid;

use crate::{
    Debt, DebtCapacity, DebtPatch, EngineError, MoneyCents, NewDebtCmd, PaymentPlanEntry,
    ResultEngine,
    debts::rate_to_basis_points,
    util::{ensure_date_order, normalize_text},
};

use super::Engine;

fn ensure_non_negative(amount: MoneyCents, label: &str) -> ResultEngine<()> {
    if amount.is_negative() {
        return Err(EngineError::InvalidInput(format!("{label} must be >= 0")));
    }
    Ok(())
}

fn validate_debt(debt: &Debt) -> ResultEngine<()> {
    ensure_non_negative(debt.amount, "debt amount")?;
    ensure_non_negative(debt.principal_amount, "principal amount")?;
    ensure_non_negative(debt.monthly_payment, "monthly payment")?;
    rate_to_basis_points(debt.interest_rate)?;
    ensure_date_order(debt.start_date, debt.end_date)
}

impl Engine {
    pub async fn create_debt(&self, cmd: NewDebtCmd) -> ResultEngine<Debt> {
        let account = self.writable_account(&cmd.user_id, cmd.account_id).await?;
        let debt = Debt {
            id: Uuid::new_v4(),
            account_id: account.id,
            amount: cmd.amount,
            principal_amount: cmd.principal_amount,
            interest_rate: cmd.interest_rate,
            monthly_payment: cmd.monthly_payment,
            start_date: cmd.start_date,
            end_date: cmd.end_date,
            status: cmd.status,
            kind: normalize_text(&cmd.kind),
            purpose: normalize_text(&cmd.purpose),
        };
        validate_debt(&debt)?;

        self.store.insert_debt(&debt).await?;
        tracing::info!(debt_id = %debt.id, account_id = %account.id, "debt created");
        Ok(debt)
    }

    pub async fn debt(&self, user_id: &str, debt_id: Uuid) -> ResultEngine<Debt> {
        self.owned_debt(user_id, debt_id).await
    }

    /// Debts of one account, latest end date first.
    pub async fn debts_for_account(
        &self,
        user_id: &str,
        account_id: Uuid,
    ) -> ResultEngine<Vec<Debt>> {
        let account = self.owned_account(user_id, account_id).await?;
        self.store.debts_for_accounts(&[account.id]).await
    }

    /// Debts with status `active` on the user's active accounts.
    pub async fn active_debts(&self, user_id: &str) -> ResultEngine<Vec<Debt>> {
        let accounts = self.account_ids(user_id, false).await?;
        let mut debts = self.store.debts_for_accounts(&accounts).await?;
        debts.retain(Debt::is_active);
        Ok(debts)
    }

    pub async fn update_debt(
        &self,
        user_id: &str,
        debt_id: Uuid,
        patch: DebtPatch,
    ) -> ResultEngine<Debt> {
        let mut debt = self.owned_debt(user_id, debt_id).await?;
        if let Some(amount) = patch.amount {
            debt.amount = amount;
        }
        if let Some(principal_amount) = patch.principal_amount {
            debt.principal_amount = principal_amount;
        }
        if let Some(interest_rate) = patch.interest_rate {
            debt.interest_rate = interest_rate;
        }
        if let Some(monthly_payment) = patch.monthly_payment {
            debt.monthly_payment = monthly_payment;
        }
        if let Some(start_date) = patch.start_date {
            debt.start_date = start_date;
        }
        if let Some(end_date) = patch.end_date {
            debt.end_date = end_date;
        }
        if let Some(status) = patch.status {
            debt.status = status;
        }
        if let Some(kind) = &patch.kind {
            debt.kind = normalize_text(kind);
        }
        if let Some(purpose) = &patch.purpose {
            debt.purpose = normalize_text(purpose);
        }
        validate_debt(&debt)?;

        self.store.update_debt(&debt).await?;
        tracing::info!(debt_id = %debt.id, status = debt.status.as_str(), "debt updated");
        Ok(debt)
    }

    pub async fn delete_debt(&self, user_id: &str, debt_id: Uuid) -> ResultEngine<()> {
        let debt = self.owned_debt(user_id, debt_id).await?;
        self.store.delete_debt(debt.id).await?;
        tracing::info!(debt_id = %debt.id, "debt deleted");
        Ok(())
    }

    /// Amortization schedule of a debt; see [`Debt::payment_plan`].
    pub async fn payment_plan(
        &self,
        user_id: &str,
        debt_id: Uuid,
    ) -> ResultEngine<Vec<PaymentPlanEntry>> {
        let debt = self.owned_debt(user_id, debt_id).await?;
        let plan = debt.payment_plan()?;
        tracing::debug!(debt_id = %debt.id, entries = plan.len(), "payment plan generated");
        Ok(plan)
    }

    /// Debt-to-income analysis over the active debts of the user's active
    /// accounts.
    pub async fn debt_capacity(
        &self,
        user_id: &str,
        monthly_income: MoneyCents,
    ) -> ResultEngine<DebtCapacity> {
        let debts = self.active_debts(user_id).await?;
        let capacity = DebtCapacity::compute(&debts, monthly_income)?;
        tracing::debug!(
            user_id,
            ratio = %capacity.debt_to_income_ratio,
            status = ?capacity.status,
            "debt capacity computed"
        );
        Ok(capacity)
    }

    async fn owned_debt(&self, user_id: &str, debt_id: Uuid) -> ResultEngine<Debt> {
        let debt = self
            .store
            .debt(debt_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("debt".to_string()))?;
        match self.owned_account(user_id, debt.account_id).await {
            Ok(_) => Ok(debt),
            Err(EngineError::NotFound(_)) => Err(EngineError::NotFound("debt".to_string())),
            Err(err) => Err(err),
        }
    }
}
