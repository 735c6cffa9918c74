//! Financial health score.
//!
//! Five sub-scores in `[0, 1]` are averaged into a 0–100 composite. The
//! figures they are computed from travel with the report so callers can
//! explain the score (or hand it to a suggestion generator as context).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::MoneyCents;

/// Length of the trailing window, in calendar months (current month included).
pub const HEALTH_WINDOW_MONTHS: u32 = 3;

/// Share of average monthly income debt payments may take before the debt
/// sub-score reaches zero.
const SUSTAINABLE_DEBT_SHARE: f64 = 0.3;

const HIGH_THRESHOLD: f64 = 0.86;
const MEDIUM_THRESHOLD: f64 = 0.60;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    High,
    Medium,
    Low,
}

/// Aggregates the score is computed from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthFigures {
    pub window_start: NaiveDate,
    /// Income over the window.
    pub income: MoneyCents,
    /// Expenses over the window.
    pub expense: MoneyCents,
    /// Sum of the balances of every account of the user.
    pub total_balance: MoneyCents,
    pub monthly_debt_payments: MoneyCents,
    pub budget_count: usize,
    pub total_budgeted: MoneyCents,
    /// Expenses inside each budget's own date range, summed over budgets.
    pub total_budget_spent: MoneyCents,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthScores {
    pub income_ratio: f64,
    /// Always 1: bills carry no due date or on-time flag to score against.
    pub bills: f64,
    pub savings_buffer: f64,
    pub debt_sustainability: f64,
    pub budget_adherence: f64,
}

impl HealthScores {
    fn all(&self) -> [f64; 5] {
        [
            self.income_ratio,
            self.bills,
            self.savings_buffer,
            self.debt_sustainability,
            self.budget_adherence,
        ]
    }

    pub fn mean(&self) -> f64 {
        let all = self.all();
        all.iter().sum::<f64>() / all.len() as f64
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub scores: HealthScores,
    /// Rounded mean of the sub-scores on a 0–100 scale.
    pub total_score: u8,
    pub health_level: HealthLevel,
    pub figures: HealthFigures,
}

impl HealthReport {
    pub fn compute(figures: HealthFigures) -> Self {
        let income = figures.income.to_f64();
        let expense = figures.expense.to_f64();
        let window = f64::from(HEALTH_WINDOW_MONTHS);

        let income_ratio = if income > 0.0 {
            if expense > 0.0 {
                (income / expense).min(1.0)
            } else {
                1.0
            }
        } else {
            0.0
        };

        let avg_monthly_expense = expense / window;
        let savings_buffer = if avg_monthly_expense > 0.0 {
            (figures.total_balance.to_f64() / (window * avg_monthly_expense)).min(1.0)
        } else {
            1.0
        };

        let avg_monthly_income = income / window;
        let debt_sustainability = if avg_monthly_income > 0.0 {
            (1.0 - figures.monthly_debt_payments.to_f64()
                / (SUSTAINABLE_DEBT_SHARE * avg_monthly_income))
                .max(0.0)
        } else {
            1.0
        };

        let budget_adherence = if figures.budget_count > 0 && figures.total_budget_spent.is_positive()
        {
            (figures.total_budgeted.to_f64() / figures.total_budget_spent.to_f64()).min(1.0)
        } else {
            1.0
        };

        let scores = HealthScores {
            income_ratio,
            bills: 1.0,
            savings_buffer,
            debt_sustainability,
            budget_adherence,
        };

        let mean = scores.mean();
        let health_level = if mean >= HIGH_THRESHOLD {
            HealthLevel::High
        } else if mean >= MEDIUM_THRESHOLD {
            HealthLevel::Medium
        } else {
            HealthLevel::Low
        };
        let total_score = (mean * 100.0).round().clamp(0.0, 100.0) as u8;

        Self {
            scores,
            total_score,
            health_level,
            figures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn figures() -> HealthFigures {
        HealthFigures {
            window_start: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            income: MoneyCents::units(3000),
            expense: MoneyCents::units(1500),
            total_balance: MoneyCents::units(1500),
            monthly_debt_payments: MoneyCents::ZERO,
            budget_count: 0,
            total_budgeted: MoneyCents::ZERO,
            total_budget_spent: MoneyCents::ZERO,
        }
    }

    #[test]
    fn balanced_finances_score_high() {
        let report = HealthReport::compute(figures());
        assert_eq!(report.scores.income_ratio, 1.0);
        assert_eq!(report.scores.savings_buffer, 1.0);
        assert_eq!(report.scores.debt_sustainability, 1.0);
        assert_eq!(report.total_score, 100);
        assert_eq!(report.health_level, HealthLevel::High);
    }

    #[test]
    fn no_income_zeroes_income_ratio() {
        let mut f = figures();
        f.income = MoneyCents::ZERO;
        let report = HealthReport::compute(f);
        assert_eq!(report.scores.income_ratio, 0.0);
        assert_eq!(report.scores.debt_sustainability, 1.0);
        assert_eq!(report.total_score, 80);
        assert_eq!(report.health_level, HealthLevel::Medium);
    }

    #[test]
    fn heavy_debt_and_overspent_budgets_score_low() {
        let mut f = figures();
        f.income = MoneyCents::units(900);
        f.expense = MoneyCents::units(1800);
        f.total_balance = MoneyCents::units(450);
        f.monthly_debt_payments = MoneyCents::units(180);
        f.budget_count = 2;
        f.total_budgeted = MoneyCents::units(100);
        f.total_budget_spent = MoneyCents::units(400);
        let report = HealthReport::compute(f);
        assert_eq!(report.scores.income_ratio, 0.5);
        assert_eq!(report.scores.savings_buffer, 0.25);
        assert_eq!(report.scores.debt_sustainability, 0.0);
        assert_eq!(report.scores.budget_adherence, 0.25);
        assert_eq!(report.total_score, 40);
        assert_eq!(report.health_level, HealthLevel::Low);
    }

    #[test]
    fn budgets_without_spend_adhere() {
        let mut f = figures();
        f.budget_count = 1;
        f.total_budgeted = MoneyCents::units(100);
        let report = HealthReport::compute(f);
        assert_eq!(report.scores.budget_adherence, 1.0);
    }
}
