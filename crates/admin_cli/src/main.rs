use std::error::Error;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use engine::{
    ApplyTransactionCmd, BudgetPatch, Category, DebtPatch, DebtStatus, Engine, MoneyCents,
    NewAccountCmd, NewBudgetCmd, NewDebtCmd, ReviseTransactionCmd, TransactionFilter,
    TransactionKind,
};
use migration::MigratorTrait;
use rust_decimal::Decimal;
use sea_orm::{Database, DatabaseConnection};
use serde::Serialize;
use uuid::Uuid;

mod settings;

type CliResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

#[derive(Parser, Debug)]
#[command(name = "ledgerline")]
#[command(about = "Personal ledger with budgets, debt plans and a health score")]
struct Cli {
    /// Settings file (defaults to `ledgerline.toml` when present).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Database connection string, overriding the configured database.
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Id of the user the command acts for.
    #[arg(long, global = true, env = "LEDGERLINE_USER", default_value = "local")]
    user: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Account(Account),
    Category(CategoryGroup),
    Tx(Tx),
    Budget(Budget),
    Debt(Debt),
    Health(Health),
}

#[derive(Args, Debug)]
struct Account {
    #[command(subcommand)]
    command: AccountCommand,
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    Create(AccountCreateArgs),
    List {
        /// Include deactivated accounts.
        #[arg(long)]
        all: bool,
    },
    Show {
        id: Uuid,
    },
    Rename {
        id: Uuid,
        #[arg(long)]
        name: String,
    },
    /// Delete the account, or deactivate it when it has history.
    Remove {
        id: Uuid,
    },
    Reactivate {
        id: Uuid,
    },
    /// Compare the stored balance with the transaction log.
    Verify {
        id: Uuid,
    },
    /// Rewrite the stored balance from the transaction log.
    Recompute {
        id: Uuid,
    },
}

#[derive(Args, Debug)]
struct AccountCreateArgs {
    #[arg(long)]
    name: String,
    /// Opening balance, recorded as an income.
    #[arg(long, requires = "category")]
    opening: Option<MoneyCents>,
    /// Category (name or id) of the opening balance.
    #[arg(long)]
    category: Option<String>,
}

#[derive(Args, Debug)]
struct CategoryGroup {
    #[command(subcommand)]
    command: CategoryCommand,
}

#[derive(Subcommand, Debug)]
enum CategoryCommand {
    List,
    Create { name: String },
    Rename { id: Uuid, name: String },
    Delete { id: Uuid },
    /// Create the default categories that are missing.
    Defaults,
}

#[derive(Args, Debug)]
struct Tx {
    #[command(subcommand)]
    command: TxCommand,
}

#[derive(Subcommand, Debug)]
enum TxCommand {
    Add(TxAddArgs),
    Revise(TxReviseArgs),
    Retract {
        id: Uuid,
    },
    Show {
        id: Uuid,
    },
    List(TxListArgs),
    Summary(TxFilterArgs),
}

#[derive(Args, Debug)]
struct TxAddArgs {
    #[arg(long)]
    account: Uuid,
    #[arg(long, value_parser = parse_kind)]
    kind: TransactionKind,
    #[arg(long)]
    amount: MoneyCents,
    /// Category name or id.
    #[arg(long)]
    category: String,
    /// RFC 3339 timestamp; defaults to now.
    #[arg(long)]
    date: Option<DateTime<Utc>>,
    #[arg(long, default_value = "")]
    description: String,
}

#[derive(Args, Debug)]
struct TxReviseArgs {
    id: Uuid,
    #[arg(long)]
    amount: Option<MoneyCents>,
    #[arg(long, value_parser = parse_kind)]
    kind: Option<TransactionKind>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    date: Option<DateTime<Utc>>,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
struct TxFilterArgs {
    #[arg(long)]
    account: Option<Uuid>,
    /// Calendar month as `YYYY-MM`; conflicts with `--from`/`--to`.
    #[arg(long, conflicts_with_all = ["from", "to"])]
    month: Option<String>,
    /// Inclusive lower bound (RFC 3339).
    #[arg(long)]
    from: Option<DateTime<Utc>>,
    /// Exclusive upper bound (RFC 3339).
    #[arg(long)]
    to: Option<DateTime<Utc>>,
    #[arg(long, value_parser = parse_kind)]
    kind: Option<TransactionKind>,
    #[arg(long)]
    category: Option<String>,
}

#[derive(Args, Debug)]
struct TxListArgs {
    #[command(flatten)]
    filter: TxFilterArgs,
    #[arg(long, default_value_t = 20)]
    limit: u64,
    /// Cursor returned by the previous page.
    #[arg(long)]
    cursor: Option<String>,
}

#[derive(Args, Debug)]
struct Budget {
    #[command(subcommand)]
    command: BudgetCommand,
}

#[derive(Subcommand, Debug)]
enum BudgetCommand {
    Create(BudgetCreateArgs),
    /// Budgets of one account, or the currently active ones.
    List {
        #[arg(long, required_unless_present = "active")]
        account: Option<Uuid>,
        #[arg(long)]
        active: bool,
    },
    Show {
        id: Uuid,
    },
    Progress {
        id: Uuid,
    },
    Update(BudgetUpdateArgs),
    Delete {
        id: Uuid,
    },
}

#[derive(Args, Debug)]
struct BudgetCreateArgs {
    #[arg(long)]
    account: Uuid,
    #[arg(long)]
    amount: MoneyCents,
    #[arg(long)]
    start: NaiveDate,
    #[arg(long)]
    end: NaiveDate,
    #[arg(long, default_value = "")]
    description: String,
}

#[derive(Args, Debug)]
struct BudgetUpdateArgs {
    id: Uuid,
    #[arg(long)]
    amount: Option<MoneyCents>,
    #[arg(long)]
    start: Option<NaiveDate>,
    #[arg(long)]
    end: Option<NaiveDate>,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
struct Debt {
    #[command(subcommand)]
    command: DebtCommand,
}

#[derive(Subcommand, Debug)]
enum DebtCommand {
    Create(DebtCreateArgs),
    /// Debts of one account, or the active ones.
    List {
        #[arg(long, required_unless_present = "active")]
        account: Option<Uuid>,
        #[arg(long)]
        active: bool,
    },
    Show {
        id: Uuid,
    },
    /// Month-by-month amortization schedule.
    Plan {
        id: Uuid,
    },
    /// Debt-to-income analysis for a monthly income.
    Capacity {
        #[arg(long)]
        income: MoneyCents,
    },
    Update(DebtUpdateArgs),
    Delete {
        id: Uuid,
    },
}

#[derive(Args, Debug)]
struct DebtCreateArgs {
    #[arg(long)]
    account: Uuid,
    #[arg(long)]
    amount: MoneyCents,
    #[arg(long)]
    principal: MoneyCents,
    /// Annual interest rate in percent.
    #[arg(long)]
    rate: Decimal,
    #[arg(long)]
    payment: MoneyCents,
    #[arg(long)]
    start: NaiveDate,
    #[arg(long)]
    end: NaiveDate,
    #[arg(long, value_parser = parse_status, default_value = "active")]
    status: DebtStatus,
    #[arg(long = "type", default_value = "")]
    kind: String,
    #[arg(long, default_value = "")]
    purpose: String,
}

#[derive(Args, Debug)]
struct DebtUpdateArgs {
    id: Uuid,
    #[arg(long)]
    amount: Option<MoneyCents>,
    #[arg(long)]
    principal: Option<MoneyCents>,
    #[arg(long)]
    rate: Option<Decimal>,
    #[arg(long)]
    payment: Option<MoneyCents>,
    #[arg(long)]
    start: Option<NaiveDate>,
    #[arg(long)]
    end: Option<NaiveDate>,
    #[arg(long, value_parser = parse_status)]
    status: Option<DebtStatus>,
    #[arg(long = "type")]
    kind: Option<String>,
    #[arg(long)]
    purpose: Option<String>,
}

#[derive(Args, Debug)]
struct Health {
    #[command(subcommand)]
    command: HealthCommand,
}

#[derive(Subcommand, Debug)]
enum HealthCommand {
    /// Health score over the last three calendar months.
    Score,
}

fn parse_kind(raw: &str) -> Result<TransactionKind, String> {
    TransactionKind::try_from(raw.to_lowercase().as_str()).map_err(|err| err.to_string())
}

fn parse_status(raw: &str) -> Result<DebtStatus, String> {
    DebtStatus::try_from(raw.to_lowercase().as_str()).map_err(|err| err.to_string())
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn connect_db(database_url: &str) -> CliResult<DatabaseConnection> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

/// Accepts a category id or a category name.
async fn resolve_category(engine: &Engine, raw: &str) -> CliResult<Category> {
    let category = match raw.parse::<Uuid>() {
        Ok(id) => engine.category(id).await?,
        Err(_) => engine.category_by_name(raw).await?,
    };
    Ok(category)
}

async fn build_filter(engine: &Engine, args: &TxFilterArgs) -> CliResult<TransactionFilter> {
    let mut filter = TransactionFilter {
        account_id: args.account,
        from: args.from,
        to: args.to,
        kind: args.kind,
        category_id: None,
    };
    if let Some(month) = &args.month {
        let first = NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d")
            .map_err(|_| format!("invalid month: {month} (expected YYYY-MM)"))?;
        filter = filter.month(first.year(), first.month())?;
    }
    if let Some(category) = &args.category {
        filter = filter.category(resolve_category(engine, category).await?.id);
    }
    Ok(filter)
}

async fn run_account(engine: &Engine, user: &str, command: AccountCommand) -> CliResult<()> {
    match command {
        AccountCommand::Create(args) => {
            let mut cmd = NewAccountCmd::new(user, args.name);
            if let (Some(amount), Some(category)) = (args.opening, args.category.as_deref()) {
                let category = resolve_category(engine, category).await?;
                cmd = cmd.opening_balance(amount, category.id, Utc::now());
            }
            print_json(&engine.create_account(cmd).await?)
        }
        AccountCommand::List { all } => print_json(&engine.accounts(user, all).await?),
        AccountCommand::Show { id } => print_json(&engine.account(user, id).await?),
        AccountCommand::Rename { id, name } => {
            print_json(&engine.rename_account(user, id, &name).await?)
        }
        AccountCommand::Remove { id } => print_json(&engine.remove_account(user, id).await?),
        AccountCommand::Reactivate { id } => {
            print_json(&engine.reactivate_account(user, id).await?)
        }
        AccountCommand::Verify { id } => print_json(&engine.verify_balance(user, id).await?),
        AccountCommand::Recompute { id } => {
            print_json(&engine.recompute_balance(user, id).await?)
        }
    }
}

async fn run_category(engine: &Engine, command: CategoryCommand) -> CliResult<()> {
    match command {
        CategoryCommand::List => print_json(&engine.categories().await?),
        CategoryCommand::Create { name } => print_json(&engine.create_category(&name).await?),
        CategoryCommand::Rename { id, name } => {
            print_json(&engine.rename_category(id, &name).await?)
        }
        CategoryCommand::Delete { id } => {
            engine.delete_category(id).await?;
            println!("deleted category: {id}");
            Ok(())
        }
        CategoryCommand::Defaults => print_json(&engine.ensure_default_categories().await?),
    }
}

async fn run_tx(engine: &Engine, user: &str, command: TxCommand) -> CliResult<()> {
    match command {
        TxCommand::Add(args) => {
            let category = resolve_category(engine, &args.category).await?;
            let cmd = ApplyTransactionCmd::new(
                user,
                args.account,
                category.id,
                args.kind,
                args.amount,
                args.date.unwrap_or_else(Utc::now),
            )
            .description(args.description);
            print_json(&engine.apply_transaction(cmd).await?)
        }
        TxCommand::Revise(args) => {
            let mut cmd = ReviseTransactionCmd::new(user, args.id);
            if let Some(amount) = args.amount {
                cmd = cmd.amount(amount);
            }
            if let Some(kind) = args.kind {
                cmd = cmd.kind(kind);
            }
            if let Some(category) = &args.category {
                cmd = cmd.category_id(resolve_category(engine, category).await?.id);
            }
            if let Some(date) = args.date {
                cmd = cmd.occurred_at(date);
            }
            if let Some(description) = args.description {
                cmd = cmd.description(description);
            }
            print_json(&engine.revise_transaction(cmd).await?)
        }
        TxCommand::Retract { id } => print_json(&engine.retract_transaction(user, id).await?),
        TxCommand::Show { id } => print_json(&engine.transaction(user, id).await?),
        TxCommand::List(args) => {
            let filter = build_filter(engine, &args.filter).await?;
            let page = engine
                .list_transactions_page(user, &filter, args.limit, args.cursor.as_deref())
                .await?;
            print_json(&page)
        }
        TxCommand::Summary(args) => {
            let filter = build_filter(engine, &args).await?;
            print_json(&engine.transaction_summary(user, filter).await?)
        }
    }
}

async fn run_budget(engine: &Engine, user: &str, command: BudgetCommand) -> CliResult<()> {
    match command {
        BudgetCommand::Create(args) => {
            let cmd = NewBudgetCmd {
                user_id: user.to_string(),
                account_id: args.account,
                amount: args.amount,
                description: args.description,
                start_date: args.start,
                end_date: args.end,
            };
            print_json(&engine.create_budget(cmd).await?)
        }
        BudgetCommand::List { account, active } => {
            let budgets = match account {
                Some(account) if !active => engine.budgets_for_account(user, account).await?,
                _ => engine.active_budgets(user, Utc::now()).await?,
            };
            print_json(&budgets)
        }
        BudgetCommand::Show { id } => print_json(&engine.budget(user, id).await?),
        BudgetCommand::Progress { id } => {
            print_json(&engine.budget_progress(user, id, Utc::now()).await?)
        }
        BudgetCommand::Update(args) => {
            let patch = BudgetPatch {
                amount: args.amount,
                description: args.description,
                start_date: args.start,
                end_date: args.end,
            };
            print_json(&engine.update_budget(user, args.id, patch).await?)
        }
        BudgetCommand::Delete { id } => {
            engine.delete_budget(user, id).await?;
            println!("deleted budget: {id}");
            Ok(())
        }
    }
}

async fn run_debt(engine: &Engine, user: &str, command: DebtCommand) -> CliResult<()> {
    match command {
        DebtCommand::Create(args) => {
            let cmd = NewDebtCmd {
                user_id: user.to_string(),
                account_id: args.account,
                amount: args.amount,
                principal_amount: args.principal,
                interest_rate: args.rate,
                monthly_payment: args.payment,
                start_date: args.start,
                end_date: args.end,
                status: args.status,
                kind: args.kind,
                purpose: args.purpose,
            };
            print_json(&engine.create_debt(cmd).await?)
        }
        DebtCommand::List { account, active } => {
            let debts = match account {
                Some(account) if !active => engine.debts_for_account(user, account).await?,
                _ => engine.active_debts(user).await?,
            };
            print_json(&debts)
        }
        DebtCommand::Show { id } => print_json(&engine.debt(user, id).await?),
        DebtCommand::Plan { id } => print_json(&engine.payment_plan(user, id).await?),
        DebtCommand::Capacity { income } => print_json(&engine.debt_capacity(user, income).await?),
        DebtCommand::Update(args) => {
            let patch = DebtPatch {
                amount: args.amount,
                principal_amount: args.principal,
                interest_rate: args.rate,
                monthly_payment: args.payment,
                start_date: args.start,
                end_date: args.end,
                status: args.status,
                kind: args.kind,
                purpose: args.purpose,
            };
            print_json(&engine.update_debt(user, args.id, patch).await?)
        }
        DebtCommand::Delete { id } => {
            engine.delete_debt(user, id).await?;
            println!("deleted debt: {id}");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();
    let settings = settings::Settings::new(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(format!(
            "ledgerline={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let database_url = cli
        .database_url
        .clone()
        .unwrap_or_else(|| settings.database.url());
    tracing::debug!(database_url = %database_url, "connecting");
    let db = connect_db(&database_url).await?;

    let engine = Engine::builder()
        .database(db)
        .page_size(settings.engine.page_size)
        .build()
        .await?;

    let user = cli.user.as_str();
    match cli.command {
        Command::Account(Account { command }) => run_account(&engine, user, command).await,
        Command::Category(CategoryGroup { command }) => run_category(&engine, command).await,
        Command::Tx(Tx { command }) => run_tx(&engine, user, command).await,
        Command::Budget(Budget { command }) => run_budget(&engine, user, command).await,
        Command::Debt(Debt { command }) => run_debt(&engine, user, command).await,
        Command::Health(Health {
            command: HealthCommand::Score,
        }) => print_json(&engine.health_score(user, Utc::now()).await?),
    }
}
