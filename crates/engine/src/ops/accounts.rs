use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Account, ApplyTransactionCmd, EngineError, NewAccountCmd, ResultEngine,
    transactions::ensure_positive_amount, util::normalize_required_name,
};

use super::Engine;

/// What [`Engine::remove_account`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRemoval {
    /// The account still owns history, so it was only marked inactive.
    Deactivated,
    Deleted,
}

impl Engine {
    /// Opens an account with a zero balance.
    ///
    /// An opening balance is recorded as an income transaction on the new
    /// account, so the balance stays equal to the sum of its transactions.
    /// If recording it fails the account is deleted again.
    pub async fn create_account(&self, cmd: NewAccountCmd) -> ResultEngine<Account> {
        let name = normalize_required_name(&cmd.name, "account")?;
        if let Some(opening) = &cmd.opening_balance {
            ensure_positive_amount(opening.amount)?;
            self.require_category(opening.category_id).await?;
        }

        let account = Account::new(cmd.user_id.clone(), name);
        self.store.insert_account(&account).await?;
        tracing::info!(account_id = %account.id, user_id = %account.user_id, "account created");

        let Some(opening) = cmd.opening_balance else {
            return Ok(account);
        };
        let opened = self
            .apply_transaction(
                ApplyTransactionCmd::income(
                    cmd.user_id.as_str(),
                    account.id,
                    opening.category_id,
                    opening.amount,
                    opening.occurred_at,
                )
                .description("Opening balance"),
            )
            .await;
        if let Err(err) = opened {
            self.discard_account(account.id).await;
            return Err(err);
        }
        self.owned_account(&cmd.user_id, account.id).await
    }

    /// Removes an account whose opening balance could not be recorded.
    async fn discard_account(&self, account_id: Uuid) {
        match self.store.delete_account(account_id).await {
            Ok(()) => {
                self.locks.forget(account_id);
                tracing::info!(%account_id, "account discarded after failed opening balance");
            }
            Err(err) => {
                tracing::warn!(%account_id, error = %err, "failed to discard account");
            }
        }
    }

    pub async fn account(&self, user_id: &str, account_id: Uuid) -> ResultEngine<Account> {
        self.owned_account(user_id, account_id).await
    }

    /// Accounts of `user_id` ordered by name.
    pub async fn accounts(
        &self,
        user_id: &str,
        include_inactive: bool,
    ) -> ResultEngine<Vec<Account>> {
        self.store.accounts_for_user(user_id, include_inactive).await
    }

    pub async fn rename_account(
        &self,
        user_id: &str,
        account_id: Uuid,
        name: &str,
    ) -> ResultEngine<Account> {
        let name = normalize_required_name(name, "account")?;
        let mut account = self.owned_account(user_id, account_id).await?;
        account.name = name;
        self.store.update_account(&account).await?;
        tracing::info!(account_id = %account.id, "account renamed");
        Ok(account)
    }

    /// Reactivates an account previously deactivated by
    /// [`remove_account`](Self::remove_account).
    pub async fn reactivate_account(
        &self,
        user_id: &str,
        account_id: Uuid,
    ) -> ResultEngine<Account> {
        let _guard = self.lock_account(account_id).await;
        let mut account = self.owned_account(user_id, account_id).await?;
        if !account.active {
            account.active = true;
            self.store.update_account(&account).await?;
            tracing::info!(account_id = %account.id, "account reactivated");
        }
        Ok(account)
    }

    /// Deletes an account without history; otherwise marks it inactive so
    /// its transactions, budgets and debts stay readable.
    pub async fn remove_account(
        &self,
        user_id: &str,
        account_id: Uuid,
    ) -> ResultEngine<AccountRemoval> {
        let _guard = self.lock_account(account_id).await;
        let mut account = self.owned_account(user_id, account_id).await?;

        if self.store.account_has_dependents(account.id).await? {
            if account.active {
                account.active = false;
                self.store.update_account(&account).await?;
            }
            tracing::info!(account_id = %account.id, "account deactivated");
            return Ok(AccountRemoval::Deactivated);
        }

        if !account.balance.is_zero() {
            return Err(EngineError::InvalidInput(format!(
                "account {} has balance {} without transactions",
                account.id, account.balance
            )));
        }
        self.store.delete_account(account.id).await?;
        self.locks.forget(account.id);
        tracing::info!(account_id = %account.id, "account deleted");
        Ok(AccountRemoval::Deleted)
    }
}
