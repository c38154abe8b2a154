use std::path::PathBuf;
use std::process;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone};
use chrono_tz::Tz;
use clap::{Parser, Subcommand, ValueEnum};

use submon_lib::config::{self, AppConfig, LogConfig};
use submon_lib::expiry::ExpiryCalculator;
use submon_lib::overview::{client_overview, ClientStatus, SortOrder};
use submon_lib::storage::StoreHandle;
use submon_lib::store::SubscriptionStore;
use submon_lib::{
    create_category, create_client, delete_category, delete_client, AppError, NewCategory,
    NewClient, SubscriptionDuration,
};

#[derive(Debug, Parser)]
#[command(name = "submon", about = "Track client subscriptions and their renewals", version)]
struct Cli {
    /// Directory holding the stored collections. Overrides SUBMON_DATA_DIR.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// IANA timezone used for calendar arithmetic. Overrides SUBMON_TZ.
    #[arg(long, global = true)]
    tz: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Manage service categories.
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Manage clients and inspect their subscription status.
    #[command(subcommand)]
    Client(ClientCommand),
}

#[derive(Debug, Subcommand)]
enum CategoryCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    List {
        #[arg(long)]
        json: bool,
    },
    /// Remove a category. Clients referencing it are kept.
    Delete { id: String },
}

#[derive(Debug, Subcommand)]
enum ClientCommand {
    Add {
        #[arg(long)]
        name: String,
        /// Category id.
        #[arg(long)]
        category: String,
        #[arg(long, value_enum)]
        duration: DurationArg,
        /// Start date as YYYY-MM-DD (local midnight) or RFC 3339. Defaults to now.
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        amount: Option<f64>,
    },
    /// Show every client with its expiry status.
    List {
        #[arg(long, value_enum, default_value_t = SortArg::Expiry)]
        sort: SortArg,
        /// Emit the status rows as JSON instead of the table view.
        #[arg(long)]
        json: bool,
    },
    Delete { id: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DurationArg {
    Week,
    Month,
    Year,
}

impl From<DurationArg> for SubscriptionDuration {
    fn from(value: DurationArg) -> Self {
        match value {
            DurationArg::Week => SubscriptionDuration::OneWeek,
            DurationArg::Month => SubscriptionDuration::OneMonth,
            DurationArg::Year => SubscriptionDuration::OneYear,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortArg {
    Name,
    Expiry,
}

impl From<SortArg> for SortOrder {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Name => SortOrder::Name,
            SortArg::Expiry => SortOrder::Expiry,
        }
    }
}

fn main() {
    let guard = match submon_lib::logging::init(&LogConfig::from_env()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Warning: logging unavailable: {err:#}");
            None
        }
    };

    let cli = Cli::parse();
    tracing::debug!(target: "submon", event = "cli_start", commit = submon_lib::build_commit());
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            1
        }
    };
    drop(guard);
    process::exit(code);
}

fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let data_dir = cli.data_dir.clone();
    let tz = cli.tz.clone();
    AppConfig::from_lookup(|key| match key {
        config::DATA_DIR_ENV => data_dir
            .as_ref()
            .map(|dir| dir.display().to_string())
            .or_else(|| std::env::var(key).ok()),
        config::TZ_ENV => tz.clone().or_else(|| std::env::var(key).ok()),
        _ => std::env::var(key).ok(),
    })
    .map_err(describe)
}

fn describe(err: AppError) -> anyhow::Error {
    anyhow!("{} ({})", err.message(), err.code())
}

fn run(cli: Cli) -> Result<i32> {
    let config = resolve_config(&cli)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;

    runtime.block_on(async move {
        let storage = StoreHandle::file(&config.data_dir)
            .map_err(AppError::from)
            .map_err(describe)
            .with_context(|| format!("open data directory {}", config.data_dir.display()))?;
        let store = SubscriptionStore::open(storage).await;
        match cli.command {
            Commands::Category(cmd) => handle_category(&store, cmd).await,
            Commands::Client(cmd) => handle_client(&store, &config, cmd).await,
        }
    })
}

async fn handle_category(store: &SubscriptionStore, command: CategoryCommand) -> Result<i32> {
    match command {
        CategoryCommand::Add { name, description } => {
            let category = create_category(store, &NewCategory { name, description })
                .await
                .map_err(describe)?;
            println!("{}", category.id);
            Ok(0)
        }
        CategoryCommand::List { json } => {
            let categories = store.categories();
            if json {
                let out = serde_json::to_string_pretty(categories.as_slice())
                    .context("serialize categories")?;
                println!("{out}");
            } else if categories.is_empty() {
                println!("No categories yet.");
            } else {
                println!("{:<38} {:<24} Description", "ID", "Name");
                for category in categories.iter() {
                    println!(
                        "{:<38} {:<24} {}",
                        category.id,
                        category.name,
                        category.description.as_deref().unwrap_or("-")
                    );
                }
            }
            Ok(0)
        }
        CategoryCommand::Delete { id } => match delete_category(store, &id).await.map_err(describe)? {
            Some(removed) => {
                println!("Deleted category {}", removed.name);
                Ok(0)
            }
            None => {
                eprintln!("No category with id {id}");
                Ok(1)
            }
        },
    }
}

async fn handle_client(
    store: &SubscriptionStore,
    config: &AppConfig,
    command: ClientCommand,
) -> Result<i32> {
    match command {
        ClientCommand::Add {
            name,
            category,
            duration,
            start,
            email,
            phone,
            notes,
            amount,
        } => {
            let start_ms = match start.as_deref() {
                Some(raw) => parse_start(raw, config.timezone)?,
                None => store.now_ms(),
            };
            let input = NewClient {
                name,
                email,
                phone,
                category_id: category,
                subscription_start_date: start_ms,
                subscription_duration: duration.into(),
                notes,
                amount_paid: amount,
            };
            let client = create_client(store, &input).await.map_err(describe)?;
            println!("{}", client.id);
            Ok(0)
        }
        ClientCommand::List { sort, json } => {
            let calculator = ExpiryCalculator::new(config.timezone);
            let rows = client_overview(
                &store.snapshot(),
                &calculator,
                store.now_ms(),
                sort.into(),
                config.due_soon_days,
            );
            if json {
                let out = serde_json::to_string_pretty(&rows).context("serialize client status")?;
                println!("{out}");
            } else {
                print_client_table(&rows, calculator.timezone());
            }
            Ok(0)
        }
        ClientCommand::Delete { id } => match delete_client(store, &id).await.map_err(describe)? {
            Some(removed) => {
                println!("Deleted client {}", removed.name);
                Ok(0)
            }
            None => {
                eprintln!("No client with id {id}");
                Ok(1)
            }
        },
    }
}

fn parse_start(raw: &str, tz: Tz) -> Result<i64> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.timestamp_millis());
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("parse start date {raw:?} (expected YYYY-MM-DD or RFC 3339)"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("start date {raw:?} out of range"))?;
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .ok_or_else(|| anyhow!("start date {raw:?} does not exist in {tz}"))
}

fn print_client_table(rows: &[ClientStatus], tz: Tz) {
    if rows.is_empty() {
        println!("No clients yet.");
        return;
    }
    println!(
        "{:<38} {:<20} {:<16} {:<10} {:<12} Status",
        "ID", "Name", "Category", "Plan", "Expires"
    );
    for row in rows {
        let expires = tz
            .timestamp_millis_opt(row.expires_at)
            .single()
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<38} {:<20} {:<16} {:<10} {:<12} {}",
            row.client.id,
            row.client.name,
            row.category_name.as_deref().unwrap_or("-"),
            row.client.subscription_duration.as_str(),
            expires,
            row.label
        );
    }
}
