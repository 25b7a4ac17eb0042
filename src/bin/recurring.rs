use std::{
    error::Error,
    fs::OpenOptions,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::{Arc, Mutex},
};

use clap::{Parser, Subcommand};
use rusqlite::Connection;
use serde::Serialize;
use time::{Date, macros::format_description};
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use recurring_ledger::{
    DeleteMode, LedgerStore, RuleDraft, RuleId, SQLiteLedgerStore, UpdateMode, UserID,
    create_rule, delete_rule, initialize_db, today_in_timezone, update_rule,
};

/// Manage recurring expenses and the ledger entries they generate.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long, env = "DB_PATH")]
    db_path: PathBuf,

    /// The canonical name of the local timezone, e.g. "Pacific/Auckland".
    ///
    /// Used to decide which entries are in the past.
    #[arg(long, env = "LOCAL_TIMEZONE", default_value = "Etc/UTC")]
    timezone: String,

    /// The currency for rules that do not specify one.
    #[arg(long, env = "DEFAULT_CURRENCY", default_value = "usd")]
    default_currency: String,

    /// The ID of the user that owns the rules.
    #[arg(long, default_value_t = 1)]
    user_id: i64,

    /// Use this date (YYYY-MM-DD) as today instead of the current date.
    #[arg(long, value_parser = parse_date)]
    today: Option<Date>,

    /// Also write debug logs to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a recurring rule and generate its entries.
    Create(RuleArgs),
    /// Edit a rule and regenerate its entries.
    Update {
        /// The ID of the rule to edit.
        rule_id: RuleId,

        /// Only regenerate entries after today, keeping past entries as they are.
        #[arg(long)]
        future_only: bool,

        #[command(flatten)]
        rule: RuleArgs,
    },
    /// Delete a rule and its entries.
    Delete {
        /// The ID of the rule to delete.
        rule_id: RuleId,

        /// Only delete entries after today, keeping past entries as they are.
        #[arg(long)]
        future_only: bool,
    },
    /// List the user's rules.
    Rules,
    /// List the entries generated from a rule.
    Entries {
        /// The ID of the rule.
        rule_id: RuleId,
    },
}

#[derive(clap::Args, Debug)]
struct RuleArgs {
    /// A short description of the expense, e.g. "Rent".
    #[arg(long)]
    name: String,

    /// The amount of each occurrence.
    #[arg(long, allow_hyphen_values = true)]
    amount: f64,

    /// The currency code, e.g. "nzd".
    #[arg(long)]
    currency: Option<String>,

    /// The category of the expense.
    #[arg(long)]
    category: String,

    /// A tag for the expense. May be repeated.
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// The date of the first occurrence (YYYY-MM-DD).
    #[arg(long, value_parser = parse_date)]
    start: Date,

    /// One of daily, weekly, monthly or yearly.
    #[arg(long)]
    interval: String,

    /// The number of occurrences, 0 for open-ended.
    #[arg(long, default_value_t = 0)]
    occurrences: u32,
}

impl From<RuleArgs> for RuleDraft {
    fn from(args: RuleArgs) -> Self {
        RuleDraft {
            name: args.name,
            amount: args.amount,
            currency: args.currency,
            category: args.category,
            tags: args.tags,
            start_date: Some(args.start),
            interval: args.interval,
            occurrence_count: args.occurrences,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(error) = setup_logging(args.log_file.as_deref()) {
        print_error(format!("could not set up logging: {error}"));
        return ExitCode::FAILURE;
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            print_error(error);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let connection = Connection::open(&args.db_path)?;
    initialize_db(&connection)?;
    let store = SQLiteLedgerStore::new(Arc::new(Mutex::new(connection)));

    let user_id = UserID::new(args.user_id);
    let today = || match args.today {
        Some(date) => Ok(date),
        None => today_in_timezone(&args.timezone),
    };

    match args.command {
        Command::Create(rule) => {
            let fields = RuleDraft::from(rule).validate(&args.default_currency)?;
            let rule = create_rule(&store, user_id, fields)?;
            print_json(&rule)
        }
        Command::Update {
            rule_id,
            future_only,
            rule,
        } => {
            let fields = RuleDraft::from(rule).validate(&args.default_currency)?;
            let mode = if future_only {
                UpdateMode::ReplaceFutureOnly
            } else {
                UpdateMode::ReplaceAll
            };
            let summary = update_rule(&store, user_id, rule_id, fields, mode, today()?)?;
            print_json(&summary)
        }
        Command::Delete {
            rule_id,
            future_only,
        } => {
            let mode = if future_only {
                DeleteMode::RemoveFutureOnly
            } else {
                DeleteMode::RemoveAll
            };
            let summary = delete_rule(&store, user_id, rule_id, mode, today()?)?;
            print_json(&summary)
        }
        Command::Rules => print_json(&store.get_rules(user_id)?),
        Command::Entries { rule_id } => print_json(&store.get_entries_by_rule(user_id, rule_id)?),
    }
}

fn parse_date(text: &str) -> Result<Date, time::error::Parse> {
    Date::parse(text, format_description!("[year]-[month]-[day]"))
}

fn print_json(value: &impl Serialize) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);

    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG`, and optionally everything at debug
/// level and above to `log_file`.
fn setup_logging(log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let stderr_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    let debug_log = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;

            Some(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_log)
        .with(debug_log)
        .init();

    Ok(())
}

fn print_error(error: impl ToString) {
    eprintln!(
        "\x1b[31;1m{}\x1b[0m",
        capitalise_first_char(&error.to_string())
    )
}

/// From https://crates.io/crates/capitalize
fn capitalise_first_char(string: &str) -> String {
    let mut chars = string.chars();
    let Some(first) = chars.next() else {
        return String::with_capacity(0);
    };
    first.to_uppercase().chain(chars).collect()
}
