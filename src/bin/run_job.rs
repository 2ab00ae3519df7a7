use std::{error::Error, path::PathBuf};

use clap::{Parser, Subcommand};
use time::{Date, OffsetDateTime, format_description::well_known::Iso8601};

use ledger_engine::{
    DEFAULT_CONCURRENCY, Engine, EngineConfig, Job, TransactionType, UserId, setup_logging,
    summarize_by_category,
};

/// Run a single ledger_engine job, or a category summary, and print the result as JSON.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the ledger SQLite database.
    #[arg(long)]
    db_path: PathBuf,

    /// The maximum number of records a job works on at once.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// File path to write debug logs to.
    #[arg(long, default_value = "debug.log")]
    log_path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a job once, as if triggered now.
    Job {
        /// The job to run.
        #[arg(value_enum)]
        job: Job,
    },
    /// Total a user's transactions of one type by category.
    Summary {
        /// The user to summarize.
        #[arg(long)]
        user_id: i64,

        /// Summarize expenses instead of income.
        #[arg(long)]
        expenses: bool,

        /// The first date to include, e.g. 2025-01-01.
        #[arg(long, value_parser = parse_date, requires = "to")]
        from: Option<Date>,

        /// The last date to include, e.g. 2025-12-31.
        #[arg(long, value_parser = parse_date, requires = "from")]
        to: Option<Date>,
    },
}

fn parse_date(value: &str) -> Result<Date, time::error::Parse> {
    Date::parse(value, &Iso8601::DATE)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    setup_logging(&args.log_path)?;

    let config = EngineConfig {
        concurrency: args.concurrency,
        ..EngineConfig::new(args.db_path)
    };
    let engine = Engine::open(&config)?;

    let output = match args.command {
        Command::Job { job } => {
            let report = engine.run(job, OffsetDateTime::now_utc()).await?;
            serde_json::to_string_pretty(&report)?
        }
        Command::Summary {
            user_id,
            expenses,
            from,
            to,
        } => {
            let kind = if expenses {
                TransactionType::Expense
            } else {
                TransactionType::Income
            };
            let date_range = from.zip(to).map(|(from, to)| from..=to);

            let connection = engine
                .db_connection()
                .lock()
                .map_err(|_| ledger_engine::Error::DatabaseLockError)?;
            let summary = summarize_by_category(UserId::new(user_id), kind, date_range, &connection)?;
            serde_json::to_string_pretty(&summary)?
        }
    };

    println!("{output}");

    Ok(())
}
