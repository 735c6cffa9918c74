//! Debts, amortization schedules and debt capacity.
//!
//! A debt is an obligation tracked next to an account. It never changes the
//! account balance; the planner only correlates it with income.

use chrono::{Months, NaiveDate};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use sea_orm::entity::{ActiveValue, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, ResultEngine, util::months_between};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebtStatus {
    Active,
    Paid,
    Overdue,
    Refinanced,
}

impl DebtStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Refinanced => "refinanced",
        }
    }
}

impl TryFrom<&str> for DebtStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "active" => Ok(Self::Active),
            "paid" => Ok(Self::Paid),
            "overdue" => Ok(Self::Overdue),
            "refinanced" => Ok(Self::Refinanced),
            other => Err(EngineError::InvalidInput(format!(
                "invalid debt status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Debt {
    pub id: Uuid,
    pub account_id: Uuid,
    /// Total amount owed (principal plus expected interest and fees).
    pub amount: MoneyCents,
    pub principal_amount: MoneyCents,
    /// Annual rate in percent (`12.5` means 12.5% a year), at most two decimals.
    pub interest_rate: Decimal,
    pub monthly_payment: MoneyCents,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: DebtStatus,
    pub kind: String,
    pub purpose: String,
}

/// One row of an amortization schedule. Amounts are in major units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPlanEntry {
    /// 1-based position of the payment in the schedule.
    pub payment_number: u32,
    pub date: NaiveDate,
    pub payment: Decimal,
    pub principal_portion: Decimal,
    pub interest_portion: Decimal,
    pub remaining_balance: Decimal,
}

impl Debt {
    pub fn is_active(&self) -> bool {
        self.status == DebtStatus::Active
    }

    pub fn term_months(&self) -> u32 {
        months_between(self.start_date, self.end_date)
    }

    pub fn monthly_rate(&self) -> Decimal {
        self.interest_rate / Decimal::ONE_HUNDRED / Decimal::from(12)
    }

    /// Month-by-month split of the fixed payment into interest and principal.
    ///
    /// Runs for at most [`term_months`](Self::term_months) entries and stops
    /// after the payment that clears the principal. The remaining balance is
    /// floored at zero. A payment below the interest grows the balance; if it
    /// outgrows `Decimal` the plan fails with `InvalidInput`.
    pub fn payment_plan(&self) -> ResultEngine<Vec<PaymentPlanEntry>> {
        let total_months = self.term_months();
        let monthly_rate = self.monthly_rate();
        let payment = self.monthly_payment.to_decimal();
        let mut remaining = self.principal_amount.to_decimal();
        let mut plan = Vec::with_capacity(total_months as usize);

        for index in 0..total_months {
            if remaining <= Decimal::ZERO {
                break;
            }
            let interest_portion = remaining
                .checked_mul(monthly_rate)
                .ok_or_else(plan_overflow)?;
            let principal_portion = payment
                .checked_sub(interest_portion)
                .ok_or_else(plan_overflow)?;
            remaining = remaining
                .checked_sub(principal_portion)
                .ok_or_else(plan_overflow)?
                .max(Decimal::ZERO);

            let date = self
                .start_date
                .checked_add_months(Months::new(index))
                .ok_or_else(|| {
                    EngineError::InvalidInput("payment date out of range".to_string())
                })?;

            plan.push(PaymentPlanEntry {
                payment_number: index + 1,
                date,
                payment,
                principal_portion,
                interest_portion,
                remaining_balance: remaining,
            });
        }

        Ok(plan)
    }
}

fn plan_overflow() -> EngineError {
    EngineError::InvalidInput("payment plan overflows".to_string())
}

/// Rates are stored as basis points (hundredths of a percent).
pub(crate) fn rate_to_basis_points(rate: Decimal) -> ResultEngine<i64> {
    if rate.is_sign_negative() {
        return Err(EngineError::InvalidInput(
            "interest rate must be >= 0".to_string(),
        ));
    }
    let scaled = rate * Decimal::ONE_HUNDRED;
    if scaled.fract() != Decimal::ZERO {
        return Err(EngineError::InvalidInput(
            "interest rate supports at most two decimals".to_string(),
        ));
    }
    scaled
        .to_i64()
        .ok_or_else(|| EngineError::InvalidInput("interest rate too large".to_string()))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityStatus {
    Healthy,
    Caution,
    Overleveraged,
}

/// Debt-to-income analysis over a set of debts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtCapacity {
    pub total_debts: MoneyCents,
    pub monthly_debt_payments: MoneyCents,
    pub debt_to_income_ratio: Decimal,
    pub max_recommended_debt: Decimal,
    pub remaining_capacity: Decimal,
    pub status: CapacityStatus,
}

impl DebtCapacity {
    /// Share of monthly income that may go to debt payments.
    pub fn max_ratio() -> Decimal {
        Decimal::new(35, 2)
    }

    /// Ratios up to this are healthy.
    pub fn healthy_ratio() -> Decimal {
        Decimal::new(25, 2)
    }

    /// Computes capacity from the `active` debts in `debts`.
    pub fn compute(debts: &[Debt], monthly_income: MoneyCents) -> ResultEngine<Self> {
        if !monthly_income.is_positive() {
            return Err(EngineError::InvalidInput(
                "monthly income must be > 0".to_string(),
            ));
        }

        let active = debts.iter().filter(|debt| debt.is_active());
        let (total_debts, monthly_debt_payments) = active.fold(
            (MoneyCents::ZERO, MoneyCents::ZERO),
            |(total, monthly), debt| (total + debt.amount, monthly + debt.monthly_payment),
        );

        let income = monthly_income.to_decimal();
        let debt_to_income_ratio = monthly_debt_payments.to_decimal() / income;
        let max_recommended_debt = income * Self::max_ratio();
        let remaining_capacity = max_recommended_debt - monthly_debt_payments.to_decimal();

        let status = if debt_to_income_ratio <= Self::healthy_ratio() {
            CapacityStatus::Healthy
        } else if debt_to_income_ratio <= Self::max_ratio() {
            CapacityStatus::Caution
        } else {
            CapacityStatus::Overleveraged
        };

        Ok(Self {
            total_debts,
            monthly_debt_payments,
            debt_to_income_ratio,
            max_recommended_debt,
            remaining_capacity,
            status,
        })
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "debts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: i64,
    pub principal_amount: i64,
    pub interest_rate_bps: i64,
    pub monthly_payment: i64,
    pub start_date: Date,
    pub end_date: Date,
    pub status: String,
    pub kind: String,
    pub purpose: String,
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

impl TryFrom<&Debt> for ActiveModel {
    type Error = EngineError;

    fn try_from(value: &Debt) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ActiveValue::Set(value.id),
            account_id: ActiveValue::Set(value.account_id),
            amount: ActiveValue::Set(value.amount.cents()),
            principal_amount: ActiveValue::Set(value.principal_amount.cents()),
            interest_rate_bps: ActiveValue::Set(rate_to_basis_points(value.interest_rate)?),
            monthly_payment: ActiveValue::Set(value.monthly_payment.cents()),
            start_date: ActiveValue::Set(value.start_date),
            end_date: ActiveValue::Set(value.end_date),
            status: ActiveValue::Set(value.status.as_str().to_string()),
            kind: ActiveValue::Set(value.kind.clone()),
            purpose: ActiveValue::Set(value.purpose.clone()),
        })
    }
}

impl TryFrom<Model> for Debt {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            account_id: model.account_id,
            amount: MoneyCents::new(model.amount),
            principal_amount: MoneyCents::new(model.principal_amount),
            interest_rate: Decimal::new(model.interest_rate_bps, 2),
            monthly_payment: MoneyCents::new(model.monthly_payment),
            start_date: model.start_date,
            end_date: model.end_date,
            status: DebtStatus::try_from(model.status.as_str())?,
            kind: model.kind,
            purpose: model.purpose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn loan(principal: i64, rate: Decimal, payment: i64, months: u32) -> Debt {
        let start = date(2025, 1, 10);
        Debt {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            amount: MoneyCents::units(principal),
            principal_amount: MoneyCents::units(principal),
            interest_rate: rate,
            monthly_payment: MoneyCents::units(payment),
            start_date: start,
            end_date: start.checked_add_months(Months::new(months)).unwrap(),
            status: DebtStatus::Active,
            kind: "personal".to_string(),
            purpose: "laptop".to_string(),
        }
    }

    #[test]
    fn first_entry_splits_interest_and_principal() {
        let plan = loan(1200, Decimal::from(12), 105, 12).payment_plan().unwrap();
        let first = &plan[0];
        assert_eq!(first.payment_number, 1);
        assert_eq!(first.date, date(2025, 1, 10));
        assert_eq!(first.payment, Decimal::from(105));
        assert_eq!(first.interest_portion, Decimal::from(12));
        assert_eq!(first.principal_portion, Decimal::from(93));
        assert_eq!(first.remaining_balance, Decimal::from(1107));
        assert_eq!(plan[1].date, date(2025, 2, 10));
    }

    #[test]
    fn plan_stops_once_balance_is_cleared() {
        let plan = loan(300, Decimal::ZERO, 100, 12).payment_plan().unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[2].remaining_balance, Decimal::ZERO);
    }

    #[test]
    fn plan_never_exceeds_term_or_goes_negative() {
        let plan = loan(1000, Decimal::new(2450, 2), 10, 6).payment_plan().unwrap();
        assert_eq!(plan.len(), 6);

        let plan = loan(1000, Decimal::from(5), 999, 24).payment_plan().unwrap();
        assert!(plan.len() <= 24);
        assert!(plan.iter().all(|e| e.remaining_balance >= Decimal::ZERO));
        assert_eq!(plan.last().unwrap().remaining_balance, Decimal::ZERO);
    }

    #[test]
    fn unpaid_interest_overflow_is_an_error() {
        let debt = loan(1_000_000, Decimal::from(100), 0, 1200);
        let err = debt.payment_plan().unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidInput("payment plan overflows".to_string())
        );
    }

    #[test]
    fn payment_below_interest_grows_the_balance() {
        let plan = loan(1000, Decimal::from(12), 0, 3).payment_plan().unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].principal_portion, Decimal::from(-10));
        assert_eq!(plan[0].remaining_balance, Decimal::from(1010));
        assert!(plan[2].remaining_balance > plan[1].remaining_balance);
    }

    #[test]
    fn partial_final_month_is_truncated() {
        let mut debt = loan(1200, Decimal::ZERO, 10, 12);
        debt.end_date = date(2026, 1, 9);
        assert_eq!(debt.term_months(), 11);
        assert_eq!(debt.payment_plan().unwrap().len(), 11);
    }

    #[test]
    fn capacity_ratio_bands() {
        let debts = vec![loan(5000, Decimal::ZERO, 200, 24)];
        let capacity = DebtCapacity::compute(&debts, MoneyCents::units(1000)).unwrap();
        assert_eq!(capacity.debt_to_income_ratio, Decimal::new(2, 1));
        assert_eq!(capacity.status, CapacityStatus::Healthy);
        assert_eq!(capacity.max_recommended_debt, Decimal::from(350));
        assert_eq!(capacity.remaining_capacity, Decimal::from(150));
        assert_eq!(capacity.total_debts, MoneyCents::units(5000));

        let capacity = DebtCapacity::compute(&debts, MoneyCents::units(600)).unwrap();
        assert_eq!(capacity.status, CapacityStatus::Caution);

        let capacity = DebtCapacity::compute(&debts, MoneyCents::units(500)).unwrap();
        assert_eq!(capacity.status, CapacityStatus::Overleveraged);
    }

    #[test]
    fn capacity_ignores_inactive_debts() {
        let mut paid = loan(5000, Decimal::ZERO, 400, 24);
        paid.status = DebtStatus::Paid;
        let capacity = DebtCapacity::compute(&[paid], MoneyCents::units(1000)).unwrap();
        assert_eq!(capacity.monthly_debt_payments, MoneyCents::ZERO);
        assert_eq!(capacity.status, CapacityStatus::Healthy);
    }

    #[test]
    fn capacity_requires_positive_income() {
        let err = DebtCapacity::compute(&[], MoneyCents::ZERO).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn basis_points_reject_extra_precision() {
        assert_eq!(rate_to_basis_points(Decimal::new(1250, 2)).unwrap(), 1250);
        assert!(rate_to_basis_points(Decimal::new(12345, 3)).is_err());
        assert!(rate_to_basis_points(Decimal::from(-1)).is_err());
    }
}
