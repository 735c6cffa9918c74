use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Account, EngineError, MoneyCents, ResultEngine, TransactionKind,
    store::{BalanceChange, TransactionFilter},
};

use super::Engine;

/// Stored balance of an account next to the one derived from its ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceCheck {
    pub account_id: Uuid,
    pub stored: MoneyCents,
    pub derived: MoneyCents,
}

impl BalanceCheck {
    pub fn is_consistent(&self) -> bool {
        self.stored == self.derived
    }

    pub fn drift(&self) -> MoneyCents {
        self.stored - self.derived
    }
}

impl Engine {
    async fn derived_balance(&self, account: &Account) -> ResultEngine<MoneyCents> {
        let accounts = [account.id];
        let income = self
            .store
            .sum_amounts(
                &accounts,
                &TransactionFilter::for_account(account.id).kind(TransactionKind::Income),
            )
            .await?;
        let expense = self
            .store
            .sum_amounts(
                &accounts,
                &TransactionFilter::for_account(account.id).kind(TransactionKind::Expense),
            )
            .await?;
        Ok(income - expense)
    }

    /// Compares the stored balance with the sum of the account's signed
    /// transaction impacts.
    pub async fn verify_balance(
        &self,
        user_id: &str,
        account_id: Uuid,
    ) -> ResultEngine<BalanceCheck> {
        let _guard = self.lock_account(account_id).await;
        let account = self.owned_account(user_id, account_id).await?;
        let derived = self.derived_balance(&account).await?;
        let check = BalanceCheck {
            account_id,
            stored: account.balance,
            derived,
        };
        if !check.is_consistent() {
            tracing::warn!(
                account_id = %account_id,
                stored = %check.stored,
                derived = %check.derived,
                "balance drift detected"
            );
        }
        Ok(check)
    }

    /// Rewrites the stored balance from the ledger and returns the check made
    /// before the rewrite.
    pub async fn recompute_balance(
        &self,
        user_id: &str,
        account_id: Uuid,
    ) -> ResultEngine<BalanceCheck> {
        let _guard = self.lock_account(account_id).await;
        let account = self.owned_account(user_id, account_id).await?;
        let derived = self.derived_balance(&account).await?;
        if derived.is_negative() {
            return Err(EngineError::InvalidInput(format!(
                "ledger of account {account_id} sums to {derived}"
            )));
        }
        if derived != account.balance {
            self.store
                .swap_balance(BalanceChange {
                    account_id,
                    expected: account.balance,
                    new: derived,
                })
                .await?;
            tracing::info!(
                account_id = %account_id,
                previous = %account.balance,
                balance = %derived,
                "balance recomputed"
            );
        }
        Ok(BalanceCheck {
            account_id,
            stored: account.balance,
            derived,
        })
    }
}
