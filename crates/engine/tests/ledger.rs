use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database};

use engine::{
    AccountRemoval, ApplyTransactionCmd, Engine, EngineError, MoneyCents, NewAccountCmd,
    ReviseTransactionCmd, Transaction, TransactionFilter, TransactionKind,
    store::{
        AccountStore, BalanceChange, DatabaseStore, MemoryStore, TransactionStore,
    },
};
use migration::MigratorTrait;
use uuid::Uuid;

const ALICE: &str = "alice";
const BOB: &str = "bob";

fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
}

fn cents(units: i64) -> MoneyCents {
    MoneyCents::units(units)
}

async fn memory_engine() -> Engine {
    Engine::builder()
        .store(Arc::new(MemoryStore::new()))
        .build()
        .await
        .unwrap()
}

async fn sqlite_engine() -> Engine {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    Engine::builder().database(db).build().await.unwrap()
}

struct Fixture {
    engine: Engine,
    category: Uuid,
    account: Uuid,
}

/// Engine with a "Salary" category and an account of alice holding `opening`.
async fn fixture(engine: Engine, opening: i64) -> Fixture {
    let category = engine.create_category("Salary").await.unwrap().id;
    let mut cmd = NewAccountCmd::new(ALICE, "Main");
    if opening > 0 {
        cmd = cmd.opening_balance(cents(opening), category, at(2025, 1, 1, 8));
    }
    let account = engine.create_account(cmd).await.unwrap().id;
    Fixture {
        engine,
        category,
        account,
    }
}

impl Fixture {
    async fn balance(&self) -> MoneyCents {
        self.engine
            .account(ALICE, self.account)
            .await
            .unwrap()
            .balance
    }

    async fn apply(
        &self,
        kind: TransactionKind,
        units: i64,
        occurred_at: DateTime<Utc>,
    ) -> Result<Transaction, EngineError> {
        self.engine
            .apply_transaction(ApplyTransactionCmd::new(
                ALICE,
                self.account,
                self.category,
                kind,
                cents(units),
                occurred_at,
            ))
            .await
    }

    async fn all_transactions(&self) -> Vec<Transaction> {
        self.engine
            .query_transactions(ALICE, TransactionFilter::for_account(self.account))
            .await
            .unwrap()
            .collect_all()
            .await
            .unwrap()
    }

    async fn assert_balance_matches_ledger(&self) {
        let derived: MoneyCents = self
            .all_transactions()
            .await
            .iter()
            .map(Transaction::signed_impact)
            .sum();
        assert_eq!(self.balance().await, derived);
        let check = self
            .engine
            .verify_balance(ALICE, self.account)
            .await
            .unwrap();
        assert!(check.is_consistent());
    }
}

async fn overdraft_is_rejected(engine: Engine) {
    let fx = fixture(engine, 100).await;
    let err = fx
        .apply(TransactionKind::Expense, 150, at(2025, 1, 2, 9))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));
    assert_eq!(fx.balance().await, cents(100));
    assert_eq!(fx.all_transactions().await.len(), 1);
}

#[tokio::test]
async fn overdraft_is_rejected_in_memory() {
    overdraft_is_rejected(memory_engine().await).await;
}

#[tokio::test]
async fn overdraft_is_rejected_in_sqlite() {
    overdraft_is_rejected(sqlite_engine().await).await;
}

async fn apply_then_retract_restores_balance(engine: Engine) {
    let fx = fixture(engine, 100).await;
    let income = fx
        .apply(TransactionKind::Income, 50, at(2025, 1, 2, 9))
        .await
        .unwrap();
    assert_eq!(fx.balance().await, cents(150));

    let removed = fx
        .engine
        .retract_transaction(ALICE, income.id)
        .await
        .unwrap();
    assert_eq!(removed.id, income.id);
    assert_eq!(fx.balance().await, cents(100));
    fx.assert_balance_matches_ledger().await;

    let err = fx
        .engine
        .retract_transaction(ALICE, income.id)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::NotFound("transaction".to_string()));
}

#[tokio::test]
async fn apply_then_retract_restores_balance_in_memory() {
    apply_then_retract_restores_balance(memory_engine().await).await;
}

#[tokio::test]
async fn apply_then_retract_restores_balance_in_sqlite() {
    apply_then_retract_restores_balance(sqlite_engine().await).await;
}

async fn revise_moves_balance_by_delta(engine: Engine) {
    let fx = fixture(engine, 100).await;
    let expense = fx
        .apply(TransactionKind::Expense, 40, at(2025, 1, 3, 9))
        .await
        .unwrap();
    assert_eq!(fx.balance().await, cents(60));

    let revised = fx
        .engine
        .revise_transaction(
            ReviseTransactionCmd::new(ALICE, expense.id)
                .amount(cents(70))
                .description("groceries"),
        )
        .await
        .unwrap();
    assert_eq!(revised.amount, cents(70));
    assert_eq!(revised.description, "groceries");
    assert_eq!(fx.balance().await, cents(30));

    let err = fx
        .engine
        .revise_transaction(ReviseTransactionCmd::new(ALICE, expense.id).amount(cents(120)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));
    assert_eq!(fx.balance().await, cents(30));
    let stored = fx.engine.transaction(ALICE, expense.id).await.unwrap();
    assert_eq!(stored.amount, cents(70));

    fx.engine
        .revise_transaction(ReviseTransactionCmd::new(ALICE, expense.id).kind(TransactionKind::Income))
        .await
        .unwrap();
    assert_eq!(fx.balance().await, cents(170));
    fx.assert_balance_matches_ledger().await;
}

#[tokio::test]
async fn revise_moves_balance_by_delta_in_memory() {
    revise_moves_balance_by_delta(memory_engine().await).await;
}

#[tokio::test]
async fn revise_moves_balance_by_delta_in_sqlite() {
    revise_moves_balance_by_delta(sqlite_engine().await).await;
}

async fn retracting_spent_income_is_rejected(engine: Engine) {
    let fx = fixture(engine, 0).await;
    let income = fx
        .apply(TransactionKind::Income, 50, at(2025, 1, 2, 9))
        .await
        .unwrap();
    fx.apply(TransactionKind::Expense, 40, at(2025, 1, 3, 9))
        .await
        .unwrap();

    let err = fx
        .engine
        .retract_transaction(ALICE, income.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));
    assert_eq!(fx.balance().await, cents(10));
    assert_eq!(fx.all_transactions().await.len(), 2);
}

#[tokio::test]
async fn retracting_spent_income_is_rejected_in_memory() {
    retracting_spent_income_is_rejected(memory_engine().await).await;
}

#[tokio::test]
async fn retracting_spent_income_is_rejected_in_sqlite() {
    retracting_spent_income_is_rejected(sqlite_engine().await).await;
}

#[tokio::test]
async fn balance_tracks_ledger_over_mixed_mutations() {
    let fx = fixture(memory_engine().await, 500).await;
    let mut ids = Vec::new();
    for (day, kind, units) in [
        (2, TransactionKind::Expense, 120),
        (3, TransactionKind::Income, 80),
        (4, TransactionKind::Expense, 200),
        (5, TransactionKind::Expense, 900),
        (6, TransactionKind::Income, 15),
    ] {
        if let Ok(tx) = fx.apply(kind, units, at(2025, 2, day, 12)).await {
            ids.push(tx.id);
        }
        fx.assert_balance_matches_ledger().await;
    }
    assert_eq!(ids.len(), 4);

    fx.engine
        .revise_transaction(ReviseTransactionCmd::new(ALICE, ids[0]).amount(cents(20)))
        .await
        .unwrap();
    fx.assert_balance_matches_ledger().await;
    fx.engine.retract_transaction(ALICE, ids[2]).await.unwrap();
    fx.assert_balance_matches_ledger().await;
    assert_eq!(fx.balance().await, cents(500 - 20 + 80 + 15));
}

#[tokio::test]
async fn invalid_amounts_and_unknown_references_are_rejected() {
    let fx = fixture(memory_engine().await, 100).await;

    let err = fx
        .apply(TransactionKind::Income, 0, at(2025, 1, 2, 9))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let err = fx
        .engine
        .apply_transaction(ApplyTransactionCmd::expense(
            ALICE,
            fx.account,
            Uuid::new_v4(),
            cents(10),
            at(2025, 1, 2, 9),
        ))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::NotFound("category".to_string()));

    let err = fx
        .engine
        .apply_transaction(ApplyTransactionCmd::income(
            ALICE,
            Uuid::new_v4(),
            fx.category,
            cents(10),
            at(2025, 1, 2, 9),
        ))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::NotFound("account".to_string()));
    assert_eq!(fx.balance().await, cents(100));
}

#[tokio::test]
async fn other_users_cannot_see_or_touch_an_account() {
    let fx = fixture(sqlite_engine().await, 100).await;
    let tx = fx
        .apply(TransactionKind::Expense, 10, at(2025, 1, 2, 9))
        .await
        .unwrap();

    assert_eq!(
        fx.engine.account(BOB, fx.account).await.unwrap_err(),
        EngineError::NotFound("account".to_string())
    );
    assert_eq!(
        fx.engine.transaction(BOB, tx.id).await.unwrap_err(),
        EngineError::NotFound("transaction".to_string())
    );
    assert_eq!(
        fx.engine.retract_transaction(BOB, tx.id).await.unwrap_err(),
        EngineError::NotFound("transaction".to_string())
    );
    let err = fx
        .engine
        .apply_transaction(ApplyTransactionCmd::income(
            BOB,
            fx.account,
            fx.category,
            cents(10),
            at(2025, 1, 2, 9),
        ))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::NotFound("account".to_string()));
    assert!(fx.engine.accounts(BOB, true).await.unwrap().is_empty());
    assert_eq!(fx.balance().await, cents(90));
}

async fn removing_accounts(engine: Engine) {
    let fx = fixture(engine, 100).await;
    let removal = fx.engine.remove_account(ALICE, fx.account).await.unwrap();
    assert_eq!(removal, AccountRemoval::Deactivated);
    assert!(fx.engine.accounts(ALICE, false).await.unwrap().is_empty());
    assert_eq!(fx.engine.accounts(ALICE, true).await.unwrap().len(), 1);

    let err = fx
        .apply(TransactionKind::Income, 10, at(2025, 1, 2, 9))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let account = fx
        .engine
        .reactivate_account(ALICE, fx.account)
        .await
        .unwrap();
    assert!(account.active);

    let empty = fx
        .engine
        .create_account(NewAccountCmd::new(ALICE, "Spare"))
        .await
        .unwrap();
    let removal = fx.engine.remove_account(ALICE, empty.id).await.unwrap();
    assert_eq!(removal, AccountRemoval::Deleted);
    assert_eq!(
        fx.engine.account(ALICE, empty.id).await.unwrap_err(),
        EngineError::NotFound("account".to_string())
    );
}

#[tokio::test]
async fn removing_accounts_in_memory() {
    removing_accounts(memory_engine().await).await;
}

#[tokio::test]
async fn removing_accounts_in_sqlite() {
    removing_accounts(sqlite_engine().await).await;
}

#[tokio::test]
async fn account_names_are_required() {
    let engine = memory_engine().await;
    let err = engine
        .create_account(NewAccountCmd::new(ALICE, "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
    let account = engine
        .create_account(NewAccountCmd::new(ALICE, "  Wallet "))
        .await
        .unwrap();
    assert_eq!(account.name, "Wallet");
    assert_eq!(account.balance, MoneyCents::ZERO);
}

async fn category_lifecycle(engine: Engine) {
    let food = engine.create_category("Food").await.unwrap();
    let err = engine.create_category("  food ").await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
    assert_eq!(engine.category_by_name("FOOD").await.unwrap().id, food.id);

    let categories = engine.ensure_default_categories().await.unwrap();
    assert_eq!(categories.len(), 9);
    assert_eq!(engine.ensure_default_categories().await.unwrap().len(), 9);

    let account = engine
        .create_account(NewAccountCmd::new(ALICE, "Main").opening_balance(
            cents(10),
            food.id,
            at(2025, 1, 1, 8),
        ))
        .await
        .unwrap();
    assert_eq!(account.balance, cents(10));

    let err = engine.delete_category(food.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    let other = engine.category_by_name("Other").await.unwrap();
    let renamed = engine.rename_category(other.id, "Misc").await.unwrap();
    assert_eq!(renamed.name_norm, "misc");
    let err = engine.rename_category(other.id, "Housing").await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    engine.delete_category(other.id).await.unwrap();
    assert_eq!(engine.categories().await.unwrap().len(), 8);
}

#[tokio::test]
async fn category_lifecycle_in_memory() {
    category_lifecycle(memory_engine().await).await;
}

#[tokio::test]
async fn category_lifecycle_in_sqlite() {
    category_lifecycle(sqlite_engine().await).await;
}

async fn query_pages_through_everything_once(engine: Engine) {
    let fx = fixture(engine, 1000).await;
    for day in 1..=9 {
        fx.apply(TransactionKind::Expense, day, at(2025, 3, day as u32, 10))
            .await
            .unwrap();
    }
    // Same instant: ties are broken by id.
    for _ in 0..3 {
        fx.apply(TransactionKind::Income, 5, at(2025, 3, 4, 10))
            .await
            .unwrap();
    }

    let mut expected = fx.all_transactions().await;
    assert_eq!(expected.len(), 13);
    expected.sort_by_key(|tx| std::cmp::Reverse((tx.occurred_at, tx.id)));

    let mut query = fx
        .engine
        .query_transactions(ALICE, TransactionFilter::default())
        .await
        .unwrap();
    let mut seen = Vec::new();
    while let Some(tx) = query.next().await.unwrap() {
        seen.push(tx);
    }
    assert_eq!(seen, expected);

    query.restart();
    assert_eq!(query.next().await.unwrap().as_ref(), expected.first());

    let mut paged = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = fx
            .engine
            .list_transactions_page(ALICE, &TransactionFilter::default(), 4, cursor.as_deref())
            .await
            .unwrap();
        assert!(page.items.len() <= 4);
        paged.extend(page.items);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    assert_eq!(paged, expected);

    let err = fx
        .engine
        .list_transactions_page(ALICE, &TransactionFilter::default(), 4, Some("garbage!"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidCursor(_)));
}

#[tokio::test]
async fn query_pages_through_everything_once_in_memory() {
    let engine = Engine::builder()
        .store(Arc::new(MemoryStore::new()))
        .page_size(3)
        .build()
        .await
        .unwrap();
    query_pages_through_everything_once(engine).await;
}

#[tokio::test]
async fn query_pages_through_everything_once_in_sqlite() {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db)
        .page_size(3)
        .build()
        .await
        .unwrap();
    query_pages_through_everything_once(engine).await;
}

async fn query_filters(engine: Engine) {
    let fx = fixture(engine, 1000).await;
    let rent = fx.engine.create_category("Rent").await.unwrap().id;
    fx.apply(TransactionKind::Expense, 10, at(2025, 1, 31, 23))
        .await
        .unwrap();
    fx.apply(TransactionKind::Expense, 20, at(2025, 2, 1, 0))
        .await
        .unwrap();
    fx.engine
        .apply_transaction(ApplyTransactionCmd::expense(
            ALICE,
            fx.account,
            rent,
            cents(300),
            at(2025, 2, 15, 9),
        ))
        .await
        .unwrap();
    fx.apply(TransactionKind::Income, 40, at(2025, 3, 1, 0))
        .await
        .unwrap();

    let february = fx
        .engine
        .query_transactions(ALICE, TransactionFilter::default().month(2025, 2).unwrap())
        .await
        .unwrap()
        .collect_all()
        .await
        .unwrap();
    let amounts: Vec<_> = february.iter().map(|tx| tx.amount).collect();
    assert_eq!(amounts, vec![cents(300), cents(20)]);

    let half_open = fx
        .engine
        .query_transactions(
            ALICE,
            TransactionFilter::for_account(fx.account)
                .between(at(2025, 2, 1, 0), at(2025, 3, 1, 0)),
        )
        .await
        .unwrap()
        .collect_all()
        .await
        .unwrap();
    assert_eq!(half_open, february);

    let income = fx
        .engine
        .query_transactions(ALICE, TransactionFilter::default().kind(TransactionKind::Income))
        .await
        .unwrap()
        .collect_all()
        .await
        .unwrap();
    assert_eq!(income.len(), 2);

    let rent_only = fx
        .engine
        .query_transactions(ALICE, TransactionFilter::default().category(rent))
        .await
        .unwrap()
        .collect_all()
        .await
        .unwrap();
    assert_eq!(rent_only.len(), 1);
    assert_eq!(rent_only[0].amount, cents(300));

    let err = fx
        .engine
        .query_transactions(
            ALICE,
            TransactionFilter::default().between(at(2025, 3, 1, 0), at(2025, 2, 1, 0)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let summary = fx
        .engine
        .transaction_summary(ALICE, TransactionFilter::default().month(2025, 2).unwrap())
        .await
        .unwrap();
    assert_eq!(summary.income, MoneyCents::ZERO);
    assert_eq!(summary.expense, cents(320));
    assert_eq!(summary.net, -cents(320));
    assert_eq!(summary.transaction_count, 2);
    assert_eq!(summary.expense_by_category.len(), 2);
    assert_eq!(summary.expense_by_category[0].category_name, "Rent");
    assert_eq!(summary.expense_by_category[0].total, cents(300));
    assert_eq!(summary.expense_by_category[1].total, cents(20));
}

#[tokio::test]
async fn query_filters_in_memory() {
    query_filters(memory_engine().await).await;
}

#[tokio::test]
async fn query_filters_in_sqlite() {
    query_filters(sqlite_engine().await).await;
}

/// Ten racing expenses of 30 against a balance of 100: exactly three land.
async fn racing_expenses_never_overdraw(engine: Engine) {
    let fx = fixture(engine, 100).await;
    let engine = Arc::new(fx.engine);

    let mut tasks = tokio::task::JoinSet::new();
    for hour in 0..10 {
        let engine = Arc::clone(&engine);
        let (account, category) = (fx.account, fx.category);
        tasks.spawn(async move {
            engine
                .apply_transaction(ApplyTransactionCmd::expense(
                    ALICE,
                    account,
                    category,
                    MoneyCents::units(30),
                    at(2025, 1, 2, hour),
                ))
                .await
        });
    }

    let mut applied = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(_) => applied += 1,
            Err(err) => assert!(matches!(err, EngineError::InsufficientFunds(_))),
        }
    }
    assert_eq!(applied, 3);

    let account = engine.account(ALICE, fx.account).await.unwrap();
    assert_eq!(account.balance, cents(10));
    let check = engine.verify_balance(ALICE, fx.account).await.unwrap();
    assert!(check.is_consistent());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_expenses_never_overdraw_in_memory() {
    racing_expenses_never_overdraw(memory_engine().await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_expenses_never_overdraw_in_sqlite() {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder().database(db).build().await.unwrap();
    racing_expenses_never_overdraw(engine).await;
}

#[tokio::test]
async fn failed_opening_balance_leaves_no_account() {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    db.execute_unprepared(
        "CREATE TRIGGER reject_transactions BEFORE INSERT ON transactions \
         BEGIN SELECT RAISE(ABORT, 'transactions are frozen'); END;",
    )
    .await
    .unwrap();
    let engine = Engine::builder().database(db).build().await.unwrap();
    let category = engine.create_category("Salary").await.unwrap().id;

    let err = engine
        .create_account(NewAccountCmd::new(ALICE, "Main").opening_balance(
            cents(100),
            category,
            at(2025, 1, 1, 8),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Database(_)));
    assert!(engine.accounts(ALICE, true).await.unwrap().is_empty());
}

#[tokio::test]
async fn recompute_repairs_a_drifted_balance() {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::builder()
        .store(store.clone())
        .build()
        .await
        .unwrap();
    let fx = fixture(engine, 100).await;

    store
        .swap_balance(BalanceChange {
            account_id: fx.account,
            expected: cents(100),
            new: cents(999),
        })
        .await
        .unwrap();

    let check = fx.engine.verify_balance(ALICE, fx.account).await.unwrap();
    assert!(!check.is_consistent());
    assert_eq!(check.drift(), cents(899));

    let check = fx
        .engine
        .recompute_balance(ALICE, fx.account)
        .await
        .unwrap();
    assert_eq!(check.stored, cents(999));
    assert_eq!(check.derived, cents(100));
    assert_eq!(fx.balance().await, cents(100));
}

#[tokio::test]
async fn stores_refuse_stale_balance_writes() {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let database = DatabaseStore::new(db.clone());
    let engine = Engine::builder().database(db).build().await.unwrap();
    let fx = fixture(engine, 100).await;

    let stale = Transaction::new(
        fx.account,
        fx.category,
        TransactionKind::Expense,
        cents(10),
        at(2025, 1, 2, 9),
        String::new(),
    )
    .unwrap();
    let err = database
        .insert_transaction(
            &stale,
            BalanceChange {
                account_id: fx.account,
                expected: cents(50),
                new: cents(40),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
    assert!(database.transaction(stale.id).await.unwrap().is_none());
    assert_eq!(fx.balance().await, cents(100));

    let memory = MemoryStore::new();
    let err = memory
        .swap_balance(BalanceChange {
            account_id: Uuid::new_v4(),
            expected: MoneyCents::ZERO,
            new: cents(1),
        })
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::NotFound("account".to_string()));
}
