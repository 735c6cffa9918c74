//! Budgets and budget progress.
//!
//! A budget caps the expenses of one account between two calendar dates. It
//! never touches the account balance; its progress is derived from the
//! ledger on every read.

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    MoneyCents,
    util::{end_of_day_exclusive, months_between, start_of_day},
};

/// Budgets spanning at least this many whole months are long-term.
const LONG_TERM_MONTHS: u32 = 12;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: MoneyCents,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    InProgress,
    Completed,
    Exceeded,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BudgetProgress {
    pub budget: Budget,
    pub spent: MoneyCents,
    pub remaining: MoneyCents,
    /// Share of the budget already spent, capped at 100.
    pub progress_percentage: f64,
    pub is_long_term: bool,
    pub days_remaining: i64,
    pub status: BudgetStatus,
}

impl Budget {
    /// `[from, to)` range of expenses counted toward the budget at `now`:
    /// from the start date through the end of `min(today, end_date)`.
    ///
    /// The range is empty (`from >= to`) while the budget has not started.
    pub fn spend_window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let last_day = now.date_naive().min(self.end_date);
        (
            start_of_day(self.start_date),
            end_of_day_exclusive(last_day),
        )
    }

    /// The budget is over once today reaches its end date.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now.date_naive() >= self.end_date
    }

    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        self.start_date <= day && day <= self.end_date
    }

    pub fn is_long_term(&self) -> bool {
        months_between(self.start_date, self.end_date) >= LONG_TERM_MONTHS
    }

    /// Derive progress from the expenses already summed over
    /// [`spend_window`](Self::spend_window).
    pub fn progress(&self, spent: MoneyCents, now: DateTime<Utc>) -> BudgetProgress {
        let remaining = (self.amount - spent).max(MoneyCents::ZERO);

        let progress_percentage = if self.amount.is_positive() {
            (spent.to_f64() / self.amount.to_f64() * 100.0).min(100.0)
        } else if spent.is_positive() {
            100.0
        } else {
            0.0
        };

        let status = if self.has_ended(now) {
            if spent <= self.amount {
                BudgetStatus::Completed
            } else {
                BudgetStatus::Exceeded
            }
        } else if spent >= self.amount && (self.amount.is_positive() || spent.is_positive()) {
            BudgetStatus::Exceeded
        } else {
            BudgetStatus::InProgress
        };

        let days_remaining = (start_of_day(self.end_date) - now).num_days().max(0);

        BudgetProgress {
            budget: self.clone(),
            spent,
            remaining,
            progress_percentage,
            is_long_term: self.is_long_term(),
            days_remaining,
            status,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "budgets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: i64,
    pub description: String,
    pub start_date: Date,
    pub end_date: Date,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::AccountId",
        to = "super::accounts::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Accounts,
}

impl Related<super::accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Accounts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Budget> for ActiveModel {
    fn from(value: &Budget) -> Self {
        Self {
            id: ActiveValue::Set(value.id),
            account_id: ActiveValue::Set(value.account_id),
            amount: ActiveValue::Set(value.amount.cents()),
            description: ActiveValue::Set(value.description.clone()),
            start_date: ActiveValue::Set(value.start_date),
            end_date: ActiveValue::Set(value.end_date),
        }
    }
}

impl From<Model> for Budget {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            account_id: model.account_id,
            amount: MoneyCents::new(model.amount),
            description: model.description,
            start_date: model.start_date,
            end_date: model.end_date,
        }
    }
}
