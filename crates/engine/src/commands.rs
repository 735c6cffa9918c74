//! Command structs for engine operations.
//!
//! These types group parameters for write operations, keeping call sites
//! readable and avoiding long argument lists. Every command carries the id of
//! the calling user; entities owned by someone else are reported as missing.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{DebtStatus, MoneyCents, TransactionKind};

/// Open a new account.
#[derive(Clone, Debug)]
pub struct NewAccountCmd {
    pub user_id: String,
    pub name: String,
    /// Recorded as an income transaction so the balance stays derivable.
    pub opening_balance: Option<OpeningBalance>,
}

#[derive(Clone, Debug)]
pub struct OpeningBalance {
    pub amount: MoneyCents,
    pub category_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

impl NewAccountCmd {
    #[must_use]
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            opening_balance: None,
        }
    }

    #[must_use]
    pub fn opening_balance(
        mut self,
        amount: MoneyCents,
        category_id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        self.opening_balance = Some(OpeningBalance {
            amount,
            category_id,
            occurred_at,
        });
        self
    }
}

/// Record a new income or expense on an account.
#[derive(Clone, Debug)]
pub struct ApplyTransactionCmd {
    pub user_id: String,
    pub account_id: Uuid,
    pub category_id: Uuid,
    pub kind: TransactionKind,
    pub amount: MoneyCents,
    pub occurred_at: DateTime<Utc>,
    pub description: String,
}

impl ApplyTransactionCmd {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        account_id: Uuid,
        category_id: Uuid,
        kind: TransactionKind,
        amount: MoneyCents,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            account_id,
            category_id,
            kind,
            amount,
            occurred_at,
            description: String::new(),
        }
    }

    #[must_use]
    pub fn income(
        user_id: impl Into<String>,
        account_id: Uuid,
        category_id: Uuid,
        amount: MoneyCents,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            user_id,
            account_id,
            category_id,
            TransactionKind::Income,
            amount,
            occurred_at,
        )
    }

    #[must_use]
    pub fn expense(
        user_id: impl Into<String>,
        account_id: Uuid,
        category_id: Uuid,
        amount: MoneyCents,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            user_id,
            account_id,
            category_id,
            TransactionKind::Expense,
            amount,
            occurred_at,
        )
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Change an existing transaction. Absent fields keep their current value.
#[derive(Clone, Debug, Default)]
pub struct ReviseTransactionCmd {
    pub user_id: String,
    pub transaction_id: Uuid,
    pub amount: Option<MoneyCents>,
    pub kind: Option<TransactionKind>,
    pub category_id: Option<Uuid>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

impl ReviseTransactionCmd {
    #[must_use]
    pub fn new(user_id: impl Into<String>, transaction_id: Uuid) -> Self {
        Self {
            user_id: user_id.into(),
            transaction_id,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn amount(mut self, amount: MoneyCents) -> Self {
        self.amount = Some(amount);
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: TransactionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn category_id(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Clone, Debug)]
pub struct NewBudgetCmd {
    pub user_id: String,
    pub account_id: Uuid,
    pub amount: MoneyCents,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Partial budget update. Absent fields keep their current value.
#[derive(Clone, Debug, Default)]
pub struct BudgetPatch {
    pub amount: Option<MoneyCents>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Clone, Debug)]
pub struct NewDebtCmd {
    pub user_id: String,
    pub account_id: Uuid,
    pub amount: MoneyCents,
    pub principal_amount: MoneyCents,
    /// Annual rate in percent.
    pub interest_rate: Decimal,
    pub monthly_payment: MoneyCents,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: DebtStatus,
    pub kind: String,
    pub purpose: String,
}

/// Partial debt update. Absent fields keep their current value.
#[derive(Clone, Debug, Default)]
pub struct DebtPatch {
    pub amount: Option<MoneyCents>,
    pub principal_amount: Option<MoneyCents>,
    pub interest_rate: Option<Decimal>,
    pub monthly_payment: Option<MoneyCents>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<DebtStatus>,
    pub kind: Option<String>,
    pub purpose: Option<String>,
}
