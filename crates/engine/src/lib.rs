//! Ledger and financial analytics engine.
//!
//! The [`Engine`] keeps per-user accounts whose balances always equal the sum
//! of their transactions' signed impacts, and derives budget progress, debt
//! payment plans and a financial health score from that ledger.
//!
//! Storage sits behind the [`store::LedgerStore`] port; use
//! [`EngineBuilder::database`] for SQLite through sea-orm or
//! [`EngineBuilder::store`] for any other adapter (such as
//! [`store::MemoryStore`]).

pub use accounts::Account;
pub use budgets::{Budget, BudgetProgress, BudgetStatus};
pub use categories::{Category, DEFAULT_CATEGORIES};
pub use commands::{
    ApplyTransactionCmd, BudgetPatch, DebtPatch, NewAccountCmd, NewBudgetCmd, NewDebtCmd,
    OpeningBalance, ReviseTransactionCmd,
};
pub use debts::{CapacityStatus, Debt, DebtCapacity, DebtStatus, PaymentPlanEntry};
pub use error::EngineError;
pub use health::{HEALTH_WINDOW_MONTHS, HealthFigures, HealthLevel, HealthReport, HealthScores};
pub use money::MoneyCents;
pub use ops::{
    AccountRemoval, BalanceCheck, CategorySpend, Engine, EngineBuilder, TransactionPage,
    TransactionQuery, TransactionSummary,
};
pub use store::{TransactionCursor, TransactionFilter};
pub use transactions::{Transaction, TransactionKind};
pub use util::months_between;

mod accounts;
mod budgets;
mod categories;
mod commands;
mod debts;
mod error;
mod health;
mod money;
mod ops;
pub mod store;
mod transactions;
mod util;

type ResultEngine<T> = Result<T, EngineError>;
